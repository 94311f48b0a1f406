//! Cross-checks a deployed multisig wallet against a reference code
//! image and its own order history.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use num_bigint::BigUint;
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::address::Address;
use crate::cell::Cell;
use crate::derive::derive_address;
use crate::error::{CheckError, EventError};
use crate::interface::{AccountState, AccountStatus, MessageRecord, TransactionRecord};
use crate::order::{decode_execute_order, decode_new_order_message, op};
use crate::state::{decode_multisig_data, MultisigConfig, MultisigGetterData};
use crate::DecodeError;

/// Stage of [`ConsistencyChecker::verify`] an error belongs to.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStep {
    AccountState,
    Code,
    Data,
    Getters,
    Derivation,
    History,
}

impl fmt::Display for CheckStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccountState => "account state",
            Self::Code => "code",
            Self::Data => "data",
            Self::Getters => "getters",
            Self::Derivation => "address derivation",
            Self::History => "order history",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Compare `get_multisig_data` with the decoded data cell.
    pub check_getters: bool,
    /// Inspect recent transactions for order events.
    pub scan_history: bool,
    /// Upper bound for each individual reader call.
    pub call_timeout: Duration,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            check_getters: true,
            scan_history: true,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Read-only access to chain state.
///
/// Implementors fetch raw records; all decoding and comparison happens
/// in [`ConsistencyChecker`].
#[async_trait::async_trait]
pub trait ChainReader: Send + Sync {
    /// Current account snapshot.
    async fn account_state(&self, address: &Address) -> anyhow::Result<AccountState>;

    /// Recent transactions, in the order they should be reported.
    async fn transactions(&self, address: &Address) -> anyhow::Result<Vec<TransactionRecord>>;

    /// Runs the `get_multisig_data` getter.
    async fn multisig_data(&self, address: &Address) -> anyhow::Result<MultisigGetterData>;

    /// Runs the `get_order_address` getter for `order_id`.
    async fn order_address(
        &self,
        address: &Address,
        order_id: &BigUint,
    ) -> anyhow::Result<Address>;
}

#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "json", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEventKind {
    New,
    Execute,
}

#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "json", serde(tag = "status", rename_all = "lowercase"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ok {
        order_address: Address,
        #[cfg_attr(feature = "json", serde(with = "crate::serde::biguint_serde"))]
        order_id: BigUint,
    },
    Error {
        message: String,
    },
}

/// One recognised order transaction.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastOrderEvent {
    pub kind: OrderEventKind,
    pub tx_hash: String,
    pub outcome: EventOutcome,
}

/// Everything [`ConsistencyChecker::verify`] established.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub address: Address,
    pub status: AccountStatus,
    #[cfg_attr(feature = "json", serde(with = "crate::serde::biguint_serde"))]
    pub balance: BigUint,
    pub config: MultisigConfig,
    pub getters_checked: bool,
    pub derived_address: Address,
    /// Whether `derived_address` equals `address`. Advisory only.
    pub state_init_matches: bool,
    /// Order events in transaction feed order.
    pub last_orders: Vec<LastOrderEvent>,
}

fn fmt_list(addresses: &[Address]) -> String {
    let items: Vec<String> = addresses.iter().map(Address::to_string).collect();
    format!("[{}]", items.join(", "))
}

fn code_hash(cell: &Cell) -> String {
    hex::encode(cell.hash())
}

/// Runs the multisig consistency protocol against a [`ChainReader`].
pub struct ConsistencyChecker<R> {
    reader: R,
    expected_code: Cell,
    options: CheckOptions,
}

impl<R: ChainReader> ConsistencyChecker<R> {
    pub fn new(reader: R, expected_code: Cell, options: CheckOptions) -> Self {
        Self {
            reader,
            expected_code,
            options,
        }
    }

    /// Awaits one reader call under the configured timeout.
    async fn call<T, F>(&self, step: CheckStep, fut: F) -> Result<T, CheckError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.options.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CheckError::Reader {
                step,
                message: format!("{e:#}"),
            }),
            Err(_) => Err(CheckError::Cancelled { step }),
        }
    }

    /// Checks that `address` holds a well-formed multisig running the
    /// expected code, and reports what was found.
    ///
    /// # Errors
    ///
    /// Fails on the first hard precondition that does not hold; see
    /// [`CheckError`]. A derived address that differs from `address`
    /// and errors on individual history entries are reported, not raised.
    #[instrument(skip(self, address), fields(address = %address))]
    pub async fn verify(&self, address: &Address) -> Result<VerificationReport, CheckError> {
        let account = self
            .call(CheckStep::AccountState, self.reader.account_state(address))
            .await?;
        debug!(status = %account.status, "fetched account state");
        if account.status != AccountStatus::Active {
            return Err(CheckError::ContractNotActive {
                status: account.status.to_string(),
            });
        }

        self.check_code(&account)?;
        debug!("code matches");

        let config = self.decode_data(&account)?;
        debug!(
            threshold = config.threshold,
            signers = config.signers.len(),
            proposers = config.proposers.len(),
            "decoded multisig data"
        );

        if self.options.check_getters {
            self.check_getters(address, &config).await?;
            debug!("getters agree with stored data");
        }

        let derived_address =
            derive_address(&config, &self.expected_code).map_err(|source| CheckError::Decode {
                step: CheckStep::Derivation,
                source,
            })?;
        let state_init_matches = derived_address == *address;
        if !state_init_matches {
            warn!(derived = %derived_address, "state init does not reproduce the address");
        }

        let last_orders = if self.options.scan_history {
            self.scan_history(address).await?
        } else {
            Vec::new()
        };

        Ok(VerificationReport {
            address: *address,
            status: account.status,
            balance: account.balance,
            config,
            getters_checked: self.options.check_getters,
            derived_address,
            state_init_matches,
            last_orders,
        })
    }

    fn check_code(&self, account: &AccountState) -> Result<(), CheckError> {
        let expected = code_hash(&self.expected_code);
        let code = account.code_cell().map_err(|source| CheckError::Decode {
            step: CheckStep::Code,
            source,
        })?;
        match code {
            Some(code) if code == self.expected_code => Ok(()),
            other => Err(CheckError::CodeMismatch {
                expected,
                found: other.as_ref().map(code_hash),
            }),
        }
    }

    fn decode_data(&self, account: &AccountState) -> Result<MultisigConfig, CheckError> {
        let decode_err = |source| CheckError::Decode {
            step: CheckStep::Data,
            source,
        };
        let data = account
            .data_cell()
            .map_err(decode_err)?
            .ok_or_else(|| decode_err(DecodeError::InvalidBoc("account has no data".into())))?;
        let config = decode_multisig_data(&data).map_err(decode_err)?;
        config.validate().map_err(CheckError::InvalidState)?;
        Ok(config)
    }

    async fn check_getters(
        &self,
        address: &Address,
        config: &MultisigConfig,
    ) -> Result<(), CheckError> {
        let actual = self
            .call(CheckStep::Getters, self.reader.multisig_data(address))
            .await?;
        let expected = MultisigGetterData::expected_from(config);

        let mismatch = |field, expected: String, actual: String| CheckError::GetterMismatch {
            field,
            expected,
            actual,
        };
        if actual.next_order_seqno != expected.next_order_seqno {
            return Err(mismatch(
                "next_order_seqno",
                expected.next_order_seqno.to_string(),
                actual.next_order_seqno.to_string(),
            ));
        }
        if actual.threshold != expected.threshold {
            return Err(mismatch(
                "threshold",
                expected.threshold.to_string(),
                actual.threshold.to_string(),
            ));
        }
        if actual.signers != expected.signers {
            return Err(mismatch(
                "signers",
                fmt_list(&expected.signers),
                fmt_list(&actual.signers),
            ));
        }
        if actual.proposers != expected.proposers {
            return Err(mismatch(
                "proposers",
                fmt_list(&expected.proposers),
                fmt_list(&actual.proposers),
            ));
        }
        Ok(())
    }

    async fn scan_history(&self, address: &Address) -> Result<Vec<LastOrderEvent>, CheckError> {
        let txs = self
            .call(CheckStep::History, self.reader.transactions(address))
            .await?;
        debug!(count = txs.len(), "scanning transactions");

        let mut events = Vec::new();
        for tx in &txs {
            if let Some(event) = self.classify(address, tx).await? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Turns one transaction into an order event.
    ///
    /// Returns `Ok(None)` for transactions that carry no recognisable
    /// order op. Only a timed-out reader call is an error.
    pub async fn classify(
        &self,
        address: &Address,
        tx: &TransactionRecord,
    ) -> Result<Option<LastOrderEvent>, CheckError> {
        let Some(in_msg) = &tx.in_msg else {
            return Ok(None);
        };
        let body = match in_msg.body_cell() {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!(tx = %tx.hash, error = %e, "skipping unparsable body");
                return Ok(None);
            }
        };
        let kind = match body.parse().preload_uint(32).map(|v| v as u32) {
            Ok(op::NEW_ORDER) => OrderEventKind::New,
            Ok(op::EXECUTE) => OrderEventKind::Execute,
            _ => return Ok(None),
        };

        let result = match kind {
            OrderEventKind::New => self.check_new_order(address, tx).await,
            OrderEventKind::Execute => self.check_execute(address, in_msg, &body).await,
        };
        let outcome = match result {
            Ok((order_address, order_id)) => EventOutcome::Ok {
                order_address,
                order_id,
            },
            Err(EventError::Cancelled) => {
                return Err(CheckError::Cancelled {
                    step: CheckStep::History,
                })
            }
            Err(e) => {
                debug!(tx = %tx.hash, error = %e, "order event failed");
                EventOutcome::Error {
                    message: e.to_string(),
                }
            }
        };

        Ok(Some(LastOrderEvent {
            kind,
            tx_hash: tx.hash.clone(),
            outcome,
        }))
    }

    async fn lookup_order(
        &self,
        address: &Address,
        order_id: &BigUint,
    ) -> Result<Address, EventError> {
        match tokio::time::timeout(
            self.options.call_timeout,
            self.reader.order_address(address, order_id),
        )
        .await
        {
            Ok(Ok(order)) => Ok(order),
            Ok(Err(e)) => Err(EventError::Reader(format!("{e:#}"))),
            Err(_) => Err(EventError::Cancelled),
        }
    }

    /// The order contract must be the one the wallet itself derives for
    /// the order id.
    async fn check_execute(
        &self,
        address: &Address,
        in_msg: &MessageRecord,
        body: &Cell,
    ) -> Result<(Address, BigUint), EventError> {
        let execute = decode_execute_order(body)?;
        let source = in_msg.source_address()?.ok_or(EventError::MissingSource)?;
        let expected = self.lookup_order(address, &execute.order_id).await?;
        if source != expected {
            return Err(EventError::FakeOrder);
        }
        Ok((source, execute.order_id))
    }

    async fn check_new_order(
        &self,
        address: &Address,
        tx: &TransactionRecord,
    ) -> Result<(Address, BigUint), EventError> {
        let [out_msg] = tx.out_msgs.as_slice() else {
            return Err(EventError::UnexpectedOutMessages(tx.out_msgs.len()));
        };
        let order = decode_new_order_message(out_msg)?;
        let expected = self.lookup_order(address, &order.order_id).await?;
        if order.order_address != expected {
            return Err(EventError::FakeOrder);
        }
        Ok((order.order_address, order.order_id))
    }
}
