//! Wire-level pieces shared by the chat server and client.
//!
//! The protocol is deliberately bare: text over a TCP stream with no
//! delimiter and no length prefix. A read returns whatever bytes are
//! available, up to a fixed cap, and each such chunk is treated as one
//! message. Anything longer than the cap arrives as several fragments.

use std::fmt;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12345;

/// Upper bound for a single read on either side of the connection.
pub const READ_CAP: usize = 1024;

const CLIENT_ID_PREFIX: &str = "Client ";
const DEPARTURE_SUFFIX: &str = " has left the chat.";

/// Identity assigned by the server to each accepted connection
///
/// Rendered as `Client N`, where N comes from a per-process counter that
/// starts at 1 and never repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CLIENT_ID_PREFIX, self.0)
    }
}

/// Text sent to the remaining peers when `client` leaves.
pub fn departure_notice(client: &str) -> String {
    format!("{}{}", client, DEPARTURE_SUFFIX)
}

/// Returns the departed client's identity if `text` is a departure notice.
///
/// The part before the suffix must be exactly `Client N`, so relayed chat
/// that merely ends with the notice text is not mistaken for one.
pub fn departed_client(text: &str) -> Option<&str> {
    text.strip_suffix(DEPARTURE_SUFFIX).filter(|client| {
        client
            .strip_prefix(CLIENT_ID_PREFIX)
            .map_or(false, |number| number.parse::<u64>().is_ok())
    })
}

/// Prefixes relayed text with its sender, e.g. `Client 1: hello`.
pub fn attributed(sender: &ClientId, text: &str) -> String {
    format!("{}: {}", sender, text)
}

/// Reads one chunk of at most `buf.len()` bytes and decodes it as text.
///
/// Returns `Ok(None)` on an orderly close. Invalid UTF-8, including a
/// multi-byte character split across two chunks, is replaced rather than
/// rejected.
pub async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let n = reader.read(buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned()))
}

/// Errors surfaced by the server and client crates
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    #[error("server closed the connection before sending an identity")]
    MissingIdentity,
    #[error("connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Io(#[from] io::Error),
}
