//! [`ChainReader`] backed by the toncenter v3 indexer API.

use std::time::Duration;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tonsig_core::dict::parse_dict;
use tonsig_core::state::SIGNER_INDEX_BITS;
use tonsig_core::{
    AccountState, AccountStatus, Address, Cell, ChainReader, MessageRecord, MultisigGetterData,
    TransactionRecord,
};
use tracing::{debug, instrument, trace};
use url::Url;

use crate::error::{ClientError, Result};

/// Default public endpoint.
pub const MAINNET_ENDPOINT: &str = "https://toncenter.com/api/v3/";

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
struct AccountResponse {
    status: String,
    #[serde(default)]
    balance: Option<String>,
    code: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    hash: String,
    lt: String,
    in_msg: Option<RawMessage>,
    #[serde(default)]
    out_msgs: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    source: Option<String>,
    destination: Option<String>,
    message_content: Option<RawContent>,
    init_state: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunGetMethodResponse {
    exit_code: i64,
    #[serde(default)]
    stack: Vec<StackEntry>,
}

#[derive(Debug, Deserialize)]
struct StackEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<Value>,
}

/// A decoded TVM stack entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackValue {
    Num(BigInt),
    Cell(Cell),
    Null,
}

impl StackValue {
    fn from_entry(entry: &StackEntry) -> Result<Self> {
        let text = || {
            entry
                .value
                .as_ref()
                .and_then(Value::as_str)
                .ok_or_else(|| ClientError::Stack(format!("`{}` entry without a value", entry.kind)))
        };
        match entry.kind.as_str() {
            "num" => parse_num(text()?).map(Self::Num),
            "cell" | "slice" => Ok(Self::Cell(Cell::from_base64(text()?)?)),
            "null" => Ok(Self::Null),
            other => Err(ClientError::Stack(format!("unsupported entry type `{other}`"))),
        }
    }

    fn into_num(self) -> Result<BigInt> {
        match self {
            Self::Num(n) => Ok(n),
            other => Err(ClientError::Stack(format!("expected a number, got {other:?}"))),
        }
    }

    fn into_cell(self) -> Result<Option<Cell>> {
        match self {
            Self::Cell(c) => Ok(Some(c)),
            Self::Null => Ok(None),
            other => Err(ClientError::Stack(format!("expected a cell, got {other:?}"))),
        }
    }
}

/// Parses toncenter's `0x`-prefixed, optionally negative hex integers.
fn parse_num(s: &str) -> Result<BigInt> {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (Sign::Minus, rest),
        None => (Sign::Plus, s),
    };
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    let magnitude = BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| ClientError::Stack(format!("invalid number `{s}`")))?;
    Ok(BigInt::from_biguint(sign, magnitude))
}

fn format_num(n: &BigUint) -> String {
    format!("0x{}", n.to_str_radix(16))
}

fn parse_account(resp: AccountResponse) -> Result<AccountState> {
    let status = resp
        .status
        .parse::<AccountStatus>()
        .map_err(ClientError::UnexpectedResponse)?;
    let balance = match resp.balance.as_deref() {
        Some(b) => b
            .parse::<BigUint>()
            .map_err(|e| ClientError::UnexpectedResponse(format!("balance `{b}`: {e}")))?,
        None => BigUint::default(),
    };
    Ok(AccountState {
        status,
        code: resp.code,
        data: resp.data,
        balance,
    })
}

fn nonexistent() -> AccountState {
    AccountState {
        status: AccountStatus::Nonexist,
        code: None,
        data: None,
        balance: BigUint::default(),
    }
}

fn convert_message(msg: RawMessage) -> MessageRecord {
    MessageRecord {
        source: msg.source,
        destination: msg.destination,
        body: msg.message_content.and_then(|c| c.body),
        init_state: msg.init_state.and_then(|c| c.body),
    }
}

fn parse_transactions(resp: TransactionsResponse) -> Result<Vec<TransactionRecord>> {
    resp.transactions
        .into_iter()
        .map(|tx| {
            let lt = tx
                .lt
                .parse::<u64>()
                .map_err(|e| ClientError::UnexpectedResponse(format!("lt `{}`: {e}", tx.lt)))?;
            Ok(TransactionRecord {
                hash: tx.hash,
                lt,
                in_msg: tx.in_msg.map(convert_message),
                out_msgs: tx.out_msgs.into_iter().map(convert_message).collect(),
            })
        })
        .collect()
}

fn parse_stack(method: &str, resp: RunGetMethodResponse) -> Result<Vec<StackValue>> {
    if resp.exit_code != 0 && resp.exit_code != 1 {
        return Err(ClientError::GetMethod {
            method: method.to_string(),
            exit_code: resp.exit_code,
        });
    }
    resp.stack.iter().map(StackValue::from_entry).collect()
}

fn address_dict(cell: Option<Cell>) -> Result<Vec<Address>> {
    let Some(root) = cell else {
        return Ok(Vec::new());
    };
    let dict = parse_dict(&root, SIGNER_INDEX_BITS, |s| s.load_address())?;
    Ok(dict.into_values().collect())
}

/// Maps `(next_order_seqno, threshold, signers, proposers)`.
pub fn multisig_data_from_stack(stack: Vec<StackValue>) -> Result<MultisigGetterData> {
    let [seqno, threshold, signers, proposers]: [StackValue; 4] = stack
        .try_into()
        .map_err(|s: Vec<_>| ClientError::Stack(format!("expected 4 entries, got {}", s.len())))?;

    let threshold = threshold.into_num()?;
    let threshold = threshold
        .to_u8()
        .ok_or_else(|| ClientError::Stack(format!("threshold {threshold} out of range")))?;
    Ok(MultisigGetterData {
        next_order_seqno: seqno.into_num()?,
        threshold,
        signers: address_dict(signers.into_cell()?)?,
        proposers: address_dict(proposers.into_cell()?)?,
    })
}

/// Maps the single address slice returned by `get_order_address`.
pub fn address_from_stack(stack: Vec<StackValue>) -> Result<Address> {
    let cell = stack
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Stack("empty stack".into()))?
        .into_cell()?
        .ok_or_else(|| ClientError::Stack("null address".into()))?;
    let mut slice = cell.parse();
    let address = slice.load_address()?;
    slice.end_parse()?;
    Ok(address)
}

/// HTTP reader for toncenter v3.
///
/// Requests are blocking (`ureq`) and run on tokio's blocking pool.
#[derive(Clone)]
pub struct ToncenterReader {
    base: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
    history_limit: usize,
}

impl ToncenterReader {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
        history_limit: usize,
    ) -> Result<Self> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            base,
            api_key,
            agent,
            history_limit,
        })
    }

    fn request(&self, method: &str, path: &str) -> Result<ureq::Request> {
        let url = self.base.join(path)?;
        let mut req = self.agent.request(method, url.as_str());
        if let Some(key) = &self.api_key {
            req = req.set(API_KEY_HEADER, key);
        }
        Ok(req)
    }

    async fn get<T>(&self, path: &str, query: Vec<(&'static str, String)>) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut req = self.request("GET", path)?;
        for (k, v) in &query {
            req = req.query(k, v);
        }
        debug!(url = %req.url(), "GET");
        tokio::task::spawn_blocking(move || -> Result<T> {
            let resp = req.call()?;
            resp.into_json::<T>()
                .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
        })
        .await?
    }

    async fn run_get_method(
        &self,
        address: &Address,
        method: &str,
        stack: Value,
    ) -> Result<Vec<StackValue>> {
        let req = self.request("POST", "runGetMethod")?;
        let body = json!({
            "address": address.to_string(),
            "method": method,
            "stack": stack,
        });
        debug!(method, "runGetMethod");
        let resp = tokio::task::spawn_blocking(move || -> Result<RunGetMethodResponse> {
            let resp = req.send_json(body)?;
            resp.into_json::<RunGetMethodResponse>()
                .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
        })
        .await??;
        trace!(exit_code = resp.exit_code, entries = resp.stack.len(), "get-method result");
        parse_stack(method, resp)
    }
}

#[async_trait::async_trait]
impl ChainReader for ToncenterReader {
    #[instrument(skip(self, address), fields(address = %address))]
    async fn account_state(&self, address: &Address) -> anyhow::Result<AccountState> {
        let resp = self
            .get::<AccountResponse>("account", vec![("address", address.to_string())])
            .await;
        match resp {
            Ok(resp) => Ok(parse_account(resp)?),
            Err(ClientError::Status { status: 404, .. }) => Ok(nonexistent()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, address), fields(address = %address))]
    async fn transactions(&self, address: &Address) -> anyhow::Result<Vec<TransactionRecord>> {
        let query = vec![
            ("account", address.to_string()),
            ("limit", self.history_limit.to_string()),
            ("offset", "0".to_string()),
            ("sort", "desc".to_string()),
        ];
        let resp = self.get::<TransactionsResponse>("transactions", query).await?;
        Ok(parse_transactions(resp)?)
    }

    async fn multisig_data(&self, address: &Address) -> anyhow::Result<MultisigGetterData> {
        let stack = self
            .run_get_method(address, "get_multisig_data", json!([]))
            .await?;
        Ok(multisig_data_from_stack(stack)?)
    }

    async fn order_address(
        &self,
        address: &Address,
        order_id: &BigUint,
    ) -> anyhow::Result<Address> {
        let args = json!([{ "type": "num", "value": format_num(order_id) }]);
        let stack = self
            .run_get_method(address, "get_order_address", args)
            .await?;
        Ok(address_from_stack(stack)?)
    }
}
