//! overlaycore CLI entry point.
//!
//! This binary loads configuration and the long-term identity, then hands
//! off to an embedding application to supply the transport and peer-info
//! collaborators (§1 "Out of scope") and drive `Dispatcher::handle_transport_event`.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use overlaycore::config::Config;
use overlaycore::crypto::identity::Identity;
use overlaycore::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "overlaycore.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    use tracing_subscriber::{fmt, EnvFilter};
    fmt().with_env_filter(EnvFilter::new(&args.verbosity)).init();

    tracing::info!("starting overlaycore");

    let config = Config::load(&args.config)?;
    let hostkey_pem = fs::read_to_string(&config.hostkey)
        .map_err(|e| overlaycore::Error::KeyLoad(format!("reading {:?}: {e}", config.hostkey)))?;
    let identity = Identity::from_pkcs1_pem(&hostkey_pem)?;

    tracing::info!(peer_id = ?hex::encode(identity.peer_id()), "identity loaded");
    tracing::info!(
        total_quota_in = config.total_quota_in,
        total_quota_out = config.total_quota_out,
        "configuration loaded"
    );

    // A concrete `Transport` and `PeerInfoDirectory` are supplied by the
    // embedding application; this binary only proves config/identity load.
    tracing::warn!("no transport wired; exiting after startup checks");

    Ok(())
}
