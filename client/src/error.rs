use tonsig_core::DecodeError;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Indexer returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Get-method `{method}` exited with code {exit_code}")]
    GetMethod { method: String, exit_code: i64 },
    #[error("Malformed get-method stack: {0}")]
    Stack(String),
    #[error("URL parse error")]
    UrlParse(#[from] url::ParseError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ureq::Error> for ClientError {
    fn from(value: ureq::Error) -> Self {
        match value {
            ureq::Error::Status(status, response) => Self::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            other => Self::Http(other.to_string()),
        }
    }
}
