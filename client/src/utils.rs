use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tonsig_core::boc::BOC_MAGIC;
use tonsig_core::{Cell, CheckOptions};

use crate::toncenter::MAINNET_ENDPOINT;

pub const TEMPLATES_DIR: &str = "templates";

/// Default location of the verifier configuration.
pub const DEFAULT_CONFIG_PATH: &str = "templates/verifier_config.json";

/// Indexer access and check toggles for `tonsig verify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerifierConfig {
    /// toncenter v3 base URL.
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Per-call timeout, applied to HTTP requests and to each checker step.
    pub call_timeout_secs: u64,
    /// Number of recent transactions to scan.
    pub history_limit: usize,
    pub check_getters: bool,
    pub scan_history: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            endpoint: MAINNET_ENDPOINT.to_string(),
            api_key: None,
            call_timeout_secs: 10,
            history_limit: 20,
            check_getters: true,
            scan_history: true,
        }
    }
}

impl VerifierConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            check_getters: self.check_getters,
            scan_history: self.scan_history,
            call_timeout: self.call_timeout(),
        }
    }
}

/// Reads JSON-encoded input (configuration, etc.) from the given `path`.
pub fn load_input_data<P, T>(path: P) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            anyhow::bail!(
                "Config file {:?} not found.
                Please create a verifier_config.json in /{}",
                path,
                TEMPLATES_DIR
            );
        }
        Err(e) => return Err(e).context(format!("opening file {:?}", path)),
    };
    serde_json::from_reader(file).with_context(|| format!("parsing JSON from {:?}", path))
}

/// Writes JSON-encoded `data` to the given `path`,
/// creating parent directories as needed.
pub fn save_report<P, T>(path: P, data: &T) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("creating file {:?}", path))?;
    serde_json::to_writer_pretty(file, data)
        .with_context(|| format!("serializing to JSON to {:?}", path))
}

/// Decodes a single-root BoC given as raw bytes, hex text or base64 text.
pub fn parse_boc_bytes(bytes: &[u8]) -> anyhow::Result<Cell> {
    if bytes.starts_with(&BOC_MAGIC.to_be_bytes()) {
        return Cell::from_boc(bytes).context("decoding binary BoC");
    }
    let text = std::str::from_utf8(bytes).context("BoC file is neither binary nor text")?;
    let text: String = text.split_whitespace().collect();
    let raw = match hex::decode(&text) {
        Ok(raw) => raw,
        Err(_) => STANDARD.decode(&text).context("BoC text is neither hex nor base64")?,
    };
    Cell::from_boc(&raw).context("decoding BoC")
}

/// Reads a BoC file; see [`parse_boc_bytes`] for accepted encodings.
pub fn read_boc_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Cell> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    parse_boc_bytes(&bytes).with_context(|| format!("loading BoC from {:?}", path))
}

#[cfg(test)]
mod tests {
    use tonsig_core::interface::VERIFIER_CONFIG_PATH;

    use super::*;

    #[test]
    fn boc_encodings() {
        let cell = Cell::empty();
        let boc = cell.to_boc();
        assert_eq!(parse_boc_bytes(&boc).unwrap(), cell);
        assert_eq!(parse_boc_bytes(hex::encode(&boc).as_bytes()).unwrap(), cell);
        let b64 = format!("{}\n", cell.to_base64());
        assert_eq!(parse_boc_bytes(b64.as_bytes()).unwrap(), cell);
        assert!(parse_boc_bytes(b"definitely not a boc").is_err());
    }

    #[test]
    fn config_defaults() {
        let config: VerifierConfig =
            serde_json::from_str(r#"{ "api_key": "k", "history_limit": 5 }"#).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.endpoint, MAINNET_ENDPOINT);
        let options = config.check_options();
        assert!(options.check_getters && options.scan_history);
        assert_eq!(options.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn template_parses() {
        let config: VerifierConfig = load_input_data(VERIFIER_CONFIG_PATH).unwrap();
        assert_eq!(config, VerifierConfig::default());
    }

    #[test]
    fn missing_config() {
        let err = load_input_data::<_, VerifierConfig>("/nonexistent/verifier_config.json")
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
