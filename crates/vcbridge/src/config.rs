//! Runtime configuration. Environment variables are read once here and
//! handed to the rest of the bridge by parameter, never looked up ambiently.

use anyhow::{bail, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Game server hostname or IP.
    pub host: String,
    /// Game server port.
    pub port: u16,
    /// Chat service bot token.
    pub bot_token: String,
    /// Application id for the game-account login flow, when one is set up.
    pub msa_client_id: Option<String>,
    /// Redirect URL registered for that application.
    pub msa_redirect_url: Option<String>,
}

impl Config {
    /// Build the configuration from the CLI arguments and process
    /// environment. A missing bot token is a fatal setup error.
    pub fn from_env(host: String, port: u16) -> Result<Self> {
        let bot_token = read_var("BOT_TOKEN");
        Self::new(host, port, bot_token, read_var("MSA_CLIENT_ID"), read_var("MSA_REDIRECT_URL"))
    }

    pub fn new(
        host: String,
        port: u16,
        bot_token: Option<String>,
        msa_client_id: Option<String>,
        msa_redirect_url: Option<String>,
    ) -> Result<Self> {
        let Some(bot_token) = bot_token.filter(|t| !t.is_empty()) else {
            bail!("no chat service bot token provided; set BOT_TOKEN");
        };
        Ok(Self { host, port, bot_token, msa_client_id, msa_redirect_url })
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
