//! Relay settings

use chat_shared::{DEFAULT_HOST, DEFAULT_PORT, READ_CAP};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Maximum bytes taken from a connection per read; longer messages are
    /// relayed as several fragments.
    pub read_cap: usize,
    /// Prefix relayed text with the sender's identity (`Client 1: hello`).
    pub attribute_senders: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            read_cap: READ_CAP,
            attribute_senders: false,
        }
    }
}

impl RelayConfig {
    /// `host:port` in the form `TcpListener::bind` accepts.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
