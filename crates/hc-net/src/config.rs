use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

use hc_vault::Key;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::ConnectionError;

/// Connection settings as entered by the user
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub preshared_key_text: String,
    /// Ends a stalled handshake after this many seconds. `None` waits forever.
    #[serde(default)]
    pub handshake_timeout_secs: Option<u64>,
}

impl Drop for Config {
    fn drop(&mut self) {
        self.preshared_key_text.zeroize();
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("preshared_key_text", &"<redacted>")
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .finish()
    }
}

/// Settings that passed validation, ready to open a connection with
#[derive(Debug)]
pub struct ValidatedConfig {
    pub addr: SocketAddr,
    pub preshared_key: Key,
    pub handshake_timeout: Option<Duration>,
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16, preshared_key_text: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            preshared_key_text: preshared_key_text.into(),
            handshake_timeout_secs: None,
        }
    }

    pub fn with_handshake_timeout(mut self, secs: u64) -> Self {
        self.handshake_timeout_secs = Some(secs);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConnectionError> {
        serde_json::from_str(json)
            .map_err(|e| ConnectionError::TransportInit(format!("invalid config: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, ConnectionError> {
        serde_json::to_string(self)
            .map_err(|e| ConnectionError::TransportInit(format!("invalid config: {}", e)))
    }

    /// Host must be a dotted IPv4 address or `localhost`, the port non-zero, the key non-empty
    pub fn validate(&self) -> Result<ValidatedConfig, ConnectionError> {
        let ip = match self.host.trim() {
            "localhost" => Ipv4Addr::LOCALHOST,
            host => host.parse::<Ipv4Addr>().map_err(|_| {
                ConnectionError::TransportInit(format!("invalid host {:?}", self.host))
            })?,
        };
        if self.port == 0 {
            Err(ConnectionError::TransportInit("port must be non-zero".to_string()))?
        }
        if self.preshared_key_text.is_empty() {
            Err(ConnectionError::TransportInit(
                "pre-shared key must not be empty".to_string(),
            ))?
        }
        Ok(ValidatedConfig {
            addr: SocketAddr::V4(SocketAddrV4::new(ip, self.port)),
            preshared_key: Key::from_text(&self.preshared_key_text, "pre-shared key"),
            handshake_timeout: self.handshake_timeout_secs.map(Duration::from_secs),
        })
    }
}
