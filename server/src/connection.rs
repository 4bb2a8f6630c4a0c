//! Write side of an accepted connection.
//!
//! The read half stays with the connection's handler task; this type is what
//! the registry and the broadcaster share. Writes are serialized through an
//! internal mutex so two broadcasts never interleave bytes on one socket.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};

pub type ConnectionWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_CONNECTION_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a connection, used as the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(u64);

/// Write half of one client socket, shared by the registry and broadcasts
pub struct Connection {
    key: ConnectionKey,
    peer: Option<SocketAddr>,
    writer: Mutex<ConnectionWriter>,
}

impl Connection {
    /// Wraps `writer` and gives it a fresh `ConnectionKey`.
    pub fn new<W>(writer: W, peer: Option<SocketAddr>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            key: ConnectionKey(NEXT_CONNECTION_KEY.fetch_add(1, Ordering::Relaxed)),
            peer,
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Registry key; stable for the life of the connection.
    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    /// Remote address, when the connection came from a TCP accept.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Writes `text` and flushes it.
    pub async fn send(&self, text: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        write_text(&mut writer, text).await
    }

    /// Takes the write lock without sending anything yet.
    ///
    /// Used by the accept loop to make the identity handoff the first
    /// payload on the wire: broadcasts queue behind the returned guard.
    pub async fn lock_writer(&self) -> MutexGuard<'_, ConnectionWriter> {
        self.writer.lock().await
    }

    /// Shuts down the write side. Errors are irrelevant at this point.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Writes `text` through an already-locked writer and flushes it.
pub async fn write_text(writer: &mut ConnectionWriter, text: &str) -> io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
