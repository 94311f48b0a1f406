pub use toncenter::ToncenterReader;
use tonsig_core::{Address, ConsistencyChecker, VerificationReport};

pub mod error;
pub mod toncenter;
pub mod utils;

use utils::VerifierConfig;

/// Verifier wired to the toncenter indexer.
pub struct TonsigClient {
    pub checker: ConsistencyChecker<ToncenterReader>,
}

impl TonsigClient {
    pub fn new(config: &VerifierConfig, expected_code: tonsig_core::Cell) -> error::Result<Self> {
        let reader = ToncenterReader::new(
            &config.endpoint,
            config.api_key.clone(),
            config.call_timeout(),
            config.history_limit,
        )?;
        Ok(Self {
            checker: ConsistencyChecker::new(reader, expected_code, config.check_options()),
        })
    }

    pub async fn verify(&self, address: &Address) -> anyhow::Result<VerificationReport> {
        Ok(self.checker.verify(address).await?)
    }
}
