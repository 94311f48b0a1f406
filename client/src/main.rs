use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use serde_json::json;
use tonsig_client::utils::{
    load_input_data, read_boc_file, save_report, VerifierConfig, DEFAULT_CONFIG_PATH,
};
use tonsig_client::TonsigClient;
use tonsig_core::derive::derive_address;
use tonsig_core::state::decode_multisig_data;
use tonsig_core::Address;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            address,
            code,
            config,
            endpoint,
            api_key,
            timeout,
            limit,
            no_getters,
            no_history,
            out,
        } => {
            let mut config: VerifierConfig = load_input_data(&config)?;
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            if api_key.is_some() {
                config.api_key = api_key;
            }
            if let Some(timeout) = timeout {
                config.call_timeout_secs = timeout;
            }
            if let Some(limit) = limit {
                config.history_limit = limit;
            }
            config.check_getters &= !no_getters;
            config.scan_history &= !no_history;

            let code = read_boc_file(&code)?;
            let client = TonsigClient::new(&config, code)?;
            let report = client.verify(&address).await?;
            tracing::info!(
                state_init_matches = report.state_init_matches,
                events = report.last_orders.len(),
                "Multisig verified"
            );

            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(out) = out {
                save_report(&out, &report)?;
            }
        }
        Commands::Decode { data } => {
            let data = read_boc_file(&data)?;
            let config = decode_multisig_data(&data)?;
            let violations: Vec<String> =
                config.violations().iter().map(ToString::to_string).collect();
            let output = json!({ "config": config, "violations": violations });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Derive { data, code } => {
            let config = decode_multisig_data(&read_boc_file(&data)?)?;
            let code = read_boc_file(&code)?;
            let address = derive_address(&config, &code)?;
            println!("{}", json!({ "address": address.to_string() }));
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "tonsig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a deployed multisig against a reference code BoC.
    Verify {
        /// Raw (`0:<hex>`) or user-friendly wallet address.
        #[arg(short, long)]
        address: Address,

        /// Reference code BoC (binary, hex or base64).
        #[arg(long, value_parser, value_hint = ValueHint::FilePath)]
        code: PathBuf,

        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_CONFIG_PATH,
            value_hint = ValueHint::FilePath)]
        config: PathBuf,

        #[arg(long, value_hint = ValueHint::Url)]
        endpoint: Option<String>,

        #[arg(long, env = "TONCENTER_API_KEY")]
        api_key: Option<String>,

        /// Per-call timeout in seconds.
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Number of recent transactions to scan.
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        no_getters: bool,

        #[arg(long)]
        no_history: bool,

        /// Also write the JSON report here.
        #[arg(short, long, value_parser, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    /// Decode a multisig data BoC and list broken invariants.
    Decode {
        #[arg(short, long, value_parser, value_hint = ValueHint::FilePath)]
        data: PathBuf,
    },
    /// Derive the deployment address from a data BoC and a code BoC.
    Derive {
        #[arg(short, long, value_parser, value_hint = ValueHint::FilePath)]
        data: PathBuf,

        #[arg(long, value_parser, value_hint = ValueHint::FilePath)]
        code: PathBuf,
    },
}
