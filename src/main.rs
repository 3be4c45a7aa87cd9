use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use mailstash::config::read_config;
use mailstash::mail::capture::capture_stream;
use mailstash::mail::pipeline::{MessageContext, Pipeline, StageOutcome};

/// sysexits(3) temporary failure: the sending agent should retry delivery
/// of the whole message later.
const EX_TEMPFAIL: i32 = 75;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(
        short,
        long,
        env = "MAILSTASH_CONFIG",
        default_value = "mailstash.toml"
    )]
    /// Path to the main Mailstash configuration file
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one accepted message from standard input, archive it and
    /// record its metadata, then exit with a delivery code
    Deliver,
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,mailstash=info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = read_config(args.config_file)?;

    match args.command {
        Command::Deliver => {
            // storage clients are built once and shared for the process
            // lifetime, never reconstructed per message
            let store = config.storage.builder().build().await?;
            let pipeline = Pipeline::new(store, config.ingest);

            let raw = match capture_stream(tokio::io::stdin()).await {
                Ok(raw) => raw,
                Err(e) => {
                    // a truncated message must never be archived as success
                    error!("stream capture failed: {}", e);
                    std::process::exit(EX_TEMPFAIL);
                }
            };

            let mut ctx = MessageContext::new(raw);
            match pipeline.run(&mut ctx).await {
                StageOutcome::Next | StageOutcome::Accept => {
                    info!(
                        message_id = ctx.archive_ref.as_ref().map(|r| r.message_id.as_str()),
                        "message accepted"
                    );
                }
                StageOutcome::SoftReject { reason } => {
                    error!(reason = %reason, "message soft-rejected, sender should retry");
                    std::process::exit(EX_TEMPFAIL);
                }
            }
        }
    }

    Ok(())
}
