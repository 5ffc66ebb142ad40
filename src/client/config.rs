use crate::server::MIN_MTU;
use anyhow::Context;
use serde::Deserialize;
use std::fs::File;

fn default_connect_timeout() -> u64 {
    5
}

/// Client settings, loaded from a JSON file
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Server address as host:port
    pub remote_addr: String,
    /// Server public key, hex encoded
    pub remote_key: String,
    /// Our secret key, hex encoded
    pub secret: String,
    pub mtu: u16,
    /// Seconds to wait for the handshake reply
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

pub fn load(path: &str) -> anyhow::Result<ClientConfig> {
    let file = File::open(path).with_context(|| format!("cannot open config file {:?}", path))?;
    let config: ClientConfig =
        serde_json::from_reader(file).with_context(|| format!("cannot parse {:?}", path))?;
    config.validate()?;
    Ok(config)
}

impl ClientConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.remote_addr.is_empty() {
            anyhow::bail!("config.remote_addr is empty");
        }
        if self.remote_key.is_empty() {
            anyhow::bail!("config.remote_key is empty");
        }
        if self.secret.is_empty() {
            anyhow::bail!("config.secret is empty");
        }
        if self.mtu <= MIN_MTU || self.mtu > 1500 {
            anyhow::bail!(
                "config.mtu must be in ({}..1500), got {}",
                MIN_MTU,
                self.mtu
            );
        }
        Ok(())
    }
}
