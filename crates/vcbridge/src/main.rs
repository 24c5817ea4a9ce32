use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use vcbridge::auth::{AuthDetails, Profile, AUTH_FILE, OFFLINE_NAME};
use vcbridge::bridge::Bridge;
use vcbridge::chat::{ChatVoice, DetachedChat};
use vcbridge::config::Config;

#[derive(Parser)]
#[command(name = "vcbridge", about = "Bridges a game voice chat into a chat-service voice channel")]
struct Args {
    /// Game server hostname or IP
    host: String,

    /// Game server port
    #[arg(short, long, default_value_t = 25565)]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vcbridge=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env(args.host, args.port)?;

    let profile = resolve_profile(&config)?;
    info!(name = %profile.name, "using game profile");

    // The chat-service backend plugs in here; the detached stand-in keeps
    // the game side running without one.
    let chat: Arc<Mutex<dyn ChatVoice>> = Arc::new(Mutex::new(DetachedChat));

    let bridge = Bridge::new(chat)?;
    let _capture = bridge.capture_sink();

    info!(host = %config.host, port = config.port, "starting bridge");
    bridge.run(&config.host, config.port, profile).await
}

/// Pick the login identity: the saved game account when the login flow is
/// configured and has run, the fixed offline profile otherwise.
fn resolve_profile(config: &Config) -> Result<Profile> {
    if config.msa_client_id.is_none() {
        return Ok(Profile::offline(OFFLINE_NAME));
    }

    match AuthDetails::load(Path::new(AUTH_FILE)) {
        Ok(details) => {
            info!(name = %details.name, "loaded saved game account");
            Profile::from_saved(&details)
        }
        Err(e) => {
            warn!("no usable saved account ({e:#}); using the offline profile");
            Ok(Profile::offline(OFFLINE_NAME))
        }
    }
}
