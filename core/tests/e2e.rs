use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use num_bigint::{BigInt, BigUint};
use tonsig_core::derive::{derive_address, state_init_cell};
use tonsig_core::dict::build_dict;
use tonsig_core::order::op;
use tonsig_core::state::encode_multisig_data;
use tonsig_core::{
    AccountState, AccountStatus, Address, Cell, CellBuilder, ChainReader, CheckError,
    CheckOptions, CheckStep, ConsistencyChecker, Dict, EventOutcome, MessageRecord,
    MultisigConfig, MultisigGetterData, OrderEventKind, StateInvariant, TransactionRecord,
    VerificationReport,
};

fn assert_err<T>(res: Result<T, CheckError>, expected: CheckError)
where
    T: std::fmt::Debug,
{
    match res {
        Err(e) => assert_eq!(e, expected),
        Ok(v) => panic!("Expected error, got Ok({v:?})"),
    }
}

fn addr(n: u8) -> Address {
    Address::new(0, [n; 32])
}

fn multisig_code() -> Cell {
    let mut b = CellBuilder::new();
    b.store_uint(0xff00_f4a4_13f4_bcf2, 64).unwrap();
    b.build().unwrap()
}

fn config() -> MultisigConfig {
    MultisigConfig::new(2, vec![addr(1), addr(2), addr(3)], vec![addr(4)], false)
}

#[derive(Default)]
struct MockReader {
    account: Option<AccountState>,
    getters: Option<MultisigGetterData>,
    txs: Vec<TransactionRecord>,
    orders: HashMap<BigUint, Address>,
    getter_delay: Option<Duration>,
    order_delay: Option<Duration>,
}

impl MockReader {
    fn for_config(config: &MultisigConfig, code: &Cell) -> Self {
        let data = encode_multisig_data(config).unwrap();
        Self {
            account: Some(AccountState {
                status: AccountStatus::Active,
                code: Some(code.to_base64()),
                data: Some(data.to_base64()),
                balance: BigUint::from(1_500_000_000u64),
            }),
            getters: Some(MultisigGetterData::expected_from(config)),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl ChainReader for MockReader {
    async fn account_state(&self, _address: &Address) -> anyhow::Result<AccountState> {
        self.account.clone().ok_or_else(|| anyhow!("account lookup failed"))
    }

    async fn transactions(&self, _address: &Address) -> anyhow::Result<Vec<TransactionRecord>> {
        Ok(self.txs.clone())
    }

    async fn multisig_data(&self, _address: &Address) -> anyhow::Result<MultisigGetterData> {
        if let Some(delay) = self.getter_delay {
            tokio::time::sleep(delay).await;
        }
        self.getters.clone().ok_or_else(|| anyhow!("getter failed"))
    }

    async fn order_address(
        &self,
        _address: &Address,
        order_id: &BigUint,
    ) -> anyhow::Result<Address> {
        if let Some(delay) = self.order_delay {
            tokio::time::sleep(delay).await;
        }
        self.orders
            .get(order_id)
            .copied()
            .ok_or_else(|| anyhow!("no order {order_id}"))
    }
}

async fn verify(reader: MockReader, address: &Address) -> Result<VerificationReport, CheckError> {
    ConsistencyChecker::new(reader, multisig_code(), CheckOptions::default())
        .verify(address)
        .await
}

fn body(bits: &[(u64, usize)]) -> Cell {
    let mut b = CellBuilder::new();
    for (value, width) in bits {
        b.store_uint(*value, *width).unwrap();
    }
    b.build().unwrap()
}

fn order_init_body() -> Cell {
    let signers = Dict::from([(0, addr(1)), (1, addr(2)), (2, addr(3))]);
    let signers = build_dict(&signers, 8, |b, a: &Address| {
        b.store_address(a).map(|_| ())
    })
    .unwrap()
    .unwrap();
    let actions = Dict::from([(0, Cell::empty())]);
    let actions = build_dict(&actions, 8, |b, c: &Cell| b.store_ref(c.clone()).map(|_| ()))
        .unwrap()
        .unwrap();

    let mut b = CellBuilder::new();
    b.store_uint(op::INIT as u64, 32)
        .unwrap()
        .store_uint(1, 64)
        .unwrap()
        .store_uint(2, 8)
        .unwrap()
        .store_ref(signers)
        .unwrap()
        .store_uint(1_900_000_000, 48)
        .unwrap()
        .store_ref(actions)
        .unwrap()
        .store_bit(false)
        .unwrap();
    b.build().unwrap()
}

fn new_order_tx(multisig: &Address, order_address: &Address, order_id: u64) -> TransactionRecord {
    let mut data = CellBuilder::new();
    data.store_address(multisig)
        .unwrap()
        .store_big_uint(&BigUint::from(order_id), 256)
        .unwrap();
    let init = state_init_cell(Cell::empty(), data.build().unwrap()).unwrap();

    TransactionRecord {
        hash: format!("new-{order_id}"),
        lt: 10,
        in_msg: Some(MessageRecord {
            source: Some(addr(1).to_string()),
            destination: Some(multisig.to_string()),
            body: Some(body(&[(op::NEW_ORDER as u64, 32), (1, 64)]).to_base64()),
            init_state: None,
        }),
        out_msgs: vec![MessageRecord {
            source: Some(multisig.to_string()),
            destination: Some(order_address.to_string()),
            body: Some(order_init_body().to_base64()),
            init_state: Some(init.to_base64()),
        }],
    }
}

fn execute_tx(hash: &str, source: &Address, order_id: u64) -> TransactionRecord {
    let mut b = CellBuilder::new();
    b.store_uint(op::EXECUTE as u64, 32)
        .unwrap()
        .store_uint(2, 64)
        .unwrap()
        .store_big_uint(&BigUint::from(order_id), 256)
        .unwrap();
    TransactionRecord {
        hash: hash.into(),
        lt: 20,
        in_msg: Some(MessageRecord {
            source: Some(source.to_string()),
            body: Some(b.build().unwrap().to_base64()),
            ..Default::default()
        }),
        out_msgs: Vec::new(),
    }
}

#[tokio::test]
async fn consistent_multisig() {
    let config = config();
    let code = multisig_code();
    let address = derive_address(&config, &code).unwrap();

    let report = verify(MockReader::for_config(&config, &code), &address)
        .await
        .unwrap();
    assert_eq!(report.address, address);
    assert_eq!(report.status, AccountStatus::Active);
    assert_eq!(report.config, config);
    assert!(report.getters_checked);
    assert_eq!(report.derived_address, address);
    assert!(report.state_init_matches);
    assert!(report.last_orders.is_empty());
}

#[tokio::test]
async fn inactive_contract() {
    let config = config();
    let mut reader = MockReader::for_config(&config, &multisig_code());
    if let Some(account) = reader.account.as_mut() {
        account.status = AccountStatus::Frozen;
    }
    assert_err(
        verify(reader, &addr(9)).await,
        CheckError::ContractNotActive {
            status: "frozen".into(),
        },
    );
}

#[tokio::test]
async fn code_checked_before_data() {
    let expected = multisig_code();
    let mut b = CellBuilder::new();
    b.store_uint(0xff00_f4a4_13f4_bcf3, 64).unwrap();
    let tampered = b.build().unwrap();

    let mut reader = MockReader::for_config(&config(), &tampered);
    // data that would fail to decode if it were ever reached
    if let Some(account) = reader.account.as_mut() {
        account.data = Some(body(&[(0b101, 3)]).to_base64());
    }
    assert_err(
        verify(reader, &addr(9)).await,
        CheckError::CodeMismatch {
            expected: hex::encode(expected.hash()),
            found: Some(hex::encode(tampered.hash())),
        },
    );

    let mut reader = MockReader::for_config(&config(), &expected);
    if let Some(account) = reader.account.as_mut() {
        account.code = None;
    }
    assert_err(
        verify(reader, &addr(9)).await,
        CheckError::CodeMismatch {
            expected: hex::encode(expected.hash()),
            found: None,
        },
    );
}

#[tokio::test]
async fn undecodable_data() {
    let mut reader = MockReader::for_config(&config(), &multisig_code());
    if let Some(account) = reader.account.as_mut() {
        account.data = Some(body(&[(0b101, 3)]).to_base64());
    }
    let err = verify(reader, &addr(9)).await.unwrap_err();
    assert!(matches!(
        err,
        CheckError::Decode {
            step: CheckStep::Data,
            ..
        }
    ));
}

#[tokio::test]
async fn arbitrary_seqno_must_be_zero() {
    let mut config = MultisigConfig::new(1, vec![addr(1)], vec![], true);
    config.next_order_seqno = BigUint::from(5u8);
    let reader = MockReader::for_config(&config, &multisig_code());
    assert_err(
        verify(reader, &addr(9)).await,
        CheckError::InvalidState(StateInvariant::ArbitrarySeqnoNotZero),
    );
}

#[tokio::test]
async fn getter_sentinel_mismatch() {
    let config = config();
    let mut reader = MockReader::for_config(&config, &multisig_code());
    if let Some(getters) = reader.getters.as_mut() {
        getters.next_order_seqno = BigInt::from(-1);
    }
    assert_err(
        verify(reader, &addr(9)).await,
        CheckError::GetterMismatch {
            field: "next_order_seqno",
            expected: "0".into(),
            actual: "-1".into(),
        },
    );

    let arbitrary = MultisigConfig::new(1, vec![addr(1)], vec![], true);
    let code = multisig_code();
    let address = derive_address(&arbitrary, &code).unwrap();
    let report = verify(MockReader::for_config(&arbitrary, &code), &address)
        .await
        .unwrap();
    assert!(report.config.allow_arbitrary_seqno);
}

#[tokio::test]
async fn getter_signer_mismatch() {
    let config = config();
    let mut reader = MockReader::for_config(&config, &multisig_code());
    if let Some(getters) = reader.getters.as_mut() {
        getters.signers.swap(0, 1);
    }
    let err = verify(reader, &addr(9)).await.unwrap_err();
    assert!(matches!(
        err,
        CheckError::GetterMismatch {
            field: "signers",
            ..
        }
    ));
}

#[tokio::test]
async fn getters_can_be_skipped() {
    let config = config();
    let code = multisig_code();
    let mut reader = MockReader::for_config(&config, &code);
    reader.getters = None;
    let options = CheckOptions {
        check_getters: false,
        ..Default::default()
    };
    let report = ConsistencyChecker::new(reader, code, options)
        .verify(&addr(9))
        .await
        .unwrap();
    assert!(!report.getters_checked);
}

#[tokio::test]
async fn state_init_mismatch_is_advisory() {
    let mut config = config();
    let code = multisig_code();
    let address = derive_address(&config, &code).unwrap();

    // a wallet that has processed orders still derives to its address
    config.next_order_seqno = BigUint::from(3u8);
    let report = verify(MockReader::for_config(&config, &code), &address)
        .await
        .unwrap();
    assert!(report.state_init_matches);

    let elsewhere = addr(0xee);
    let report = verify(MockReader::for_config(&config, &code), &elsewhere)
        .await
        .unwrap();
    assert!(!report.state_init_matches);
    assert_eq!(report.derived_address, address);
}

#[tokio::test]
async fn history_scan() {
    let config = config();
    let code = multisig_code();
    let address = derive_address(&config, &code).unwrap();
    let order_address = addr(0x0d);

    let mut reader = MockReader::for_config(&config, &code);
    reader.orders.insert(BigUint::from(0u8), order_address);
    reader.txs = vec![
        new_order_tx(&address, &order_address, 0),
        execute_tx("exec-fake", &addr(0x66), 0),
        TransactionRecord {
            hash: "short".into(),
            lt: 30,
            in_msg: Some(MessageRecord {
                body: Some(body(&[(0xabcd, 16)]).to_base64()),
                ..Default::default()
            }),
            out_msgs: Vec::new(),
        },
    ];

    let report = verify(reader, &address).await.unwrap();
    assert_eq!(report.last_orders.len(), 2);

    let first = &report.last_orders[0];
    assert_eq!(first.kind, OrderEventKind::New);
    assert_eq!(first.tx_hash, "new-0");
    assert_eq!(
        first.outcome,
        EventOutcome::Ok {
            order_address,
            order_id: BigUint::from(0u8),
        }
    );

    let second = &report.last_orders[1];
    assert_eq!(second.kind, OrderEventKind::Execute);
    assert_eq!(
        second.outcome,
        EventOutcome::Error {
            message: "fake order".into()
        }
    );
}

#[tokio::test]
async fn history_event_errors() {
    let config = config();
    let code = multisig_code();
    let address = derive_address(&config, &code).unwrap();
    let order_address = addr(0x0d);

    let mut no_out = new_order_tx(&address, &order_address, 1);
    no_out.out_msgs.clear();
    let mut unknown = execute_tx("unknown", &order_address, 0);
    if let Some(msg) = unknown.in_msg.as_mut() {
        msg.body = Some(body(&[(0x1234_5678, 32)]).to_base64());
    }
    let garbage = TransactionRecord {
        hash: "garbage".into(),
        in_msg: Some(MessageRecord {
            body: Some("!!".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut reader = MockReader::for_config(&config, &code);
    reader.orders.insert(BigUint::from(0u8), order_address);
    reader.txs = vec![
        execute_tx("exec-ok", &order_address, 0),
        no_out,
        unknown,
        garbage,
        execute_tx("exec-missing", &order_address, 7),
    ];

    let report = verify(reader, &address).await.unwrap();
    let outcomes: Vec<_> = report
        .last_orders
        .iter()
        .map(|e| (e.tx_hash.as_str(), e.outcome.clone()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (
                "exec-ok",
                EventOutcome::Ok {
                    order_address,
                    order_id: BigUint::from(0u8)
                }
            ),
            (
                "new-1",
                EventOutcome::Error {
                    message: "expected exactly one outbound message, found 0".into()
                }
            ),
            (
                "exec-missing",
                EventOutcome::Error {
                    message: "reader failed: no order 7".into()
                }
            ),
        ]
    );
}

#[tokio::test]
async fn history_can_be_skipped() {
    let config = config();
    let code = multisig_code();
    let mut reader = MockReader::for_config(&config, &code);
    reader.txs = vec![execute_tx("exec", &addr(1), 0)];
    let options = CheckOptions {
        scan_history: false,
        ..Default::default()
    };
    let report = ConsistencyChecker::new(reader, code, options)
        .verify(&addr(9))
        .await
        .unwrap();
    assert!(report.last_orders.is_empty());
}

#[tokio::test]
async fn reader_failure() {
    let reader = MockReader::default();
    let err = verify(reader, &addr(9)).await.unwrap_err();
    assert_eq!(
        err,
        CheckError::Reader {
            step: CheckStep::AccountState,
            message: "account lookup failed".into(),
        }
    );
}

#[tokio::test]
async fn slow_reader_is_cancelled() {
    let config = config();
    let code = multisig_code();
    let options = CheckOptions {
        call_timeout: Duration::from_millis(20),
        ..Default::default()
    };

    let mut reader = MockReader::for_config(&config, &code);
    reader.getter_delay = Some(Duration::from_secs(5));
    assert_err(
        ConsistencyChecker::new(reader, code.clone(), options.clone())
            .verify(&addr(9))
            .await,
        CheckError::Cancelled {
            step: CheckStep::Getters,
        },
    );

    let mut reader = MockReader::for_config(&config, &code);
    reader.order_delay = Some(Duration::from_secs(5));
    reader.txs = vec![execute_tx("exec", &addr(1), 0)];
    assert_err(
        ConsistencyChecker::new(reader, code, options)
            .verify(&addr(9))
            .await,
        CheckError::Cancelled {
            step: CheckStep::History,
        },
    );
}
