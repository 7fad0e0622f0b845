//! Serves the dummy network over stdio, TCP or WebSocket.

use std::path::PathBuf;
use std::process::ExitCode;

use chatbridge_provider::{Provider, ProviderOptions};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dummy-provider", version, about = "chatbridge provider for the dummy network")]
struct Cli {
    /// Listen address: empty or `-` for stdio, `ws://` / `wss://` for
    /// WebSocket, otherwise TCP `host:port`.
    #[arg(long, default_value = "", env = "CHATBRIDGE_ADDR")]
    addr: String,

    /// Password required from every connection via `provider-auth`.
    #[arg(long, default_value = "", env = "CHATBRIDGE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Maximum concurrent connections.
    #[arg(long, default_value_t = 1)]
    max_conns: usize,

    /// The first connection sets the password.
    #[arg(long, default_value_t = false)]
    auto_password: bool,

    /// Exit when the last connection closes.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    auto_exit: bool,

    /// TLS certificate chain (PEM).
    #[arg(long)]
    cert: Option<PathBuf>,

    /// TLS private key (PEM).
    #[arg(long)]
    privkey: Option<PathBuf>,

    /// Seconds a peer gets to finish its TLS or WebSocket handshake.
    #[arg(long, default_value_t = 10)]
    handshake_timeout: u64,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn options(&self) -> ProviderOptions {
        ProviderOptions {
            addr: self.addr.clone(),
            password: self.password.clone(),
            max_conns: self.max_conns,
            auto_password: self.auto_password,
            auto_exit: self.auto_exit,
            cert_path: self.cert.clone(),
            private_key_path: self.privkey.clone(),
            handshake_timeout_secs: self.handshake_timeout,
        }
    }
}

/// Logs go to stderr: in stdio mode stdout is the protocol stream.
fn init_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dummy-provider starting");

    match Provider::run(chatbridge_dummy::PROTOCOL, cli.options(), chatbridge_dummy::new_service)
        .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
