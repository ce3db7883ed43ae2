//! chainagent CLI: run detection agents against chain data.
//!
//! Usage:
//! ```bash
//! CHAINAGENT_PASSPHRASE=… chainagent init
//! chainagent run live
//! chainagent run range 19000000 19000100 --max-in-flight 8
//! chainagent run tx 0xabc…
//! chainagent run file blocks.jsonl --output findings.jsonl
//! chainagent publish --manifest agent.json --image ./agent
//! ```

mod commands;
mod keyfile;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use chainagent_core::settings::CONFIG_FILENAME;
use chainagent_core::{Settings, SourceMode};

#[derive(Parser)]
#[command(name = "chainagent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run detection agents against live, historical or recorded chain data", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Settings file
    #[arg(long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the keystore with an encrypted keyfile, and a settings template
    Init {
        #[command(flatten)]
        key: PassphraseArg,
    },

    /// Feed chain events to the configured agents
    Run {
        #[command(flatten)]
        tuning: RunArgs,

        #[command(subcommand)]
        mode: ModeArg,
    },

    /// Sign an agent manifest with the keyfile and upload it to the storage gateway
    Publish {
        /// Agent manifest (JSON, must contain `name`)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Build and push the agent image from this context first
        #[arg(long)]
        image: Option<PathBuf>,

        /// Container CLI used for the image
        #[arg(long, default_value = "docker")]
        container_cli: String,

        #[command(flatten)]
        key: PassphraseArg,
    },
}

#[derive(Args, Debug)]
struct PassphraseArg {
    /// Keyfile passphrase
    #[arg(long, env = "CHAINAGENT_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Per-agent invocation deadline in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Events dispatched concurrently
    #[arg(long, global = true)]
    pub max_in_flight: Option<usize>,

    /// Blocks held back to restore order in live mode
    #[arg(long, global = true)]
    pub reorder_window: Option<usize>,

    /// Also write every run entry as JSON lines to this file
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Print a line for events without findings
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum ModeArg {
    /// Follow new blocks until interrupted
    Live,
    /// A single block
    Block { number: u64 },
    /// Blocks `start..=end`
    Range { start: u64, end: u64 },
    /// A single transaction
    Tx { hash: String },
    /// Blocks recorded as JSON lines
    File { path: PathBuf },
}

impl From<ModeArg> for SourceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Live => SourceMode::Live,
            ModeArg::Block { number } => SourceMode::Block(number),
            ModeArg::Range { start, end } => SourceMode::Range { start, end },
            ModeArg::Tx { hash } => SourceMode::Transaction(hash),
            ModeArg::File { path } => SourceMode::File(path),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    logging::init_tracing(&logging::LogConfig::new(
        cli.debug || settings.debug,
        cli.json_logs,
    ));

    let keystore = chainagent_core::settings::keystore_dir();
    match cli.command {
        Commands::Init { key } => {
            commands::init::run(&keystore, &cli.config, key.passphrase.as_deref())
        }
        Commands::Run { tuning, mode } => {
            commands::run::run(&settings, &tuning, mode.into()).await
        }
        Commands::Publish { manifest, image, container_cli, key } => {
            let Some(passphrase) = key.passphrase else {
                anyhow::bail!("publishing needs the keyfile passphrase (--passphrase or CHAINAGENT_PASSPHRASE)");
            };
            let signer = keyfile::get_keyfile(&keystore, &passphrase)?;
            let build = image.as_deref().map(|context| commands::publish::ImageBuild {
                context,
                program: &container_cli,
            });
            commands::publish::run(&settings, &manifest, &signer, build).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_range_with_tuning() {
        let cli = Cli::try_parse_from([
            "chainagent", "run", "--max-in-flight", "8", "range", "100", "102", "--timeout-ms", "500",
        ])
        .unwrap();
        let Commands::Run { tuning, mode } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(tuning.max_in_flight, Some(8));
        assert_eq!(tuning.timeout_ms, Some(500));
        assert_eq!(
            SourceMode::from(mode),
            SourceMode::Range { start: 100, end: 102 }
        );
    }

    #[test]
    fn parses_tx_and_file_modes() {
        let cli = Cli::try_parse_from(["chainagent", "--debug", "run", "tx", "0xabc"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Run { mode: ModeArg::Tx { .. }, .. }));

        let cli = Cli::try_parse_from(["chainagent", "run", "file", "blocks.jsonl"]).unwrap();
        let Commands::Run { mode, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(SourceMode::from(mode), SourceMode::File("blocks.jsonl".into()));
    }

    #[test]
    fn run_requires_a_mode() {
        assert!(Cli::try_parse_from(["chainagent", "run"]).is_err());
        assert!(Cli::try_parse_from(["chainagent", "run", "block", "nope"]).is_err());
    }

    #[test]
    fn publish_takes_image_and_passphrase() {
        let cli = Cli::try_parse_from([
            "chainagent", "publish", "-m", "agent.json", "--image", "./agent", "--passphrase", "pw",
        ])
        .unwrap();
        let Commands::Publish { image, container_cli, key, .. } = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(image, Some(PathBuf::from("./agent")));
        assert_eq!(container_cli, "docker");
        assert_eq!(key.passphrase.as_deref(), Some("pw"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
