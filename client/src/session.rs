//! Client side of the relay connection
//!
//! A session has two duties that run independently: `submit` writes user
//! input to the server from whatever task calls it, and a spawned receive
//! loop turns every chunk the server sends into a `SessionEvent`. The receive
//! loop never touches the presentation layer; it only enqueues.

use chat_shared::{departed_client, read_chunk, RelayError};
use log::{debug, info};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Something the receive loop observed on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MessageReceived(String),
    PeerDeparted(String),
    /// The server closed the connection or it failed; nothing follows.
    Closed,
}

impl SessionEvent {
    fn from_chunk(text: String) -> Self {
        if departed_client(&text).is_some() {
            SessionEvent::PeerDeparted(text)
        } else {
            SessionEvent::MessageReceived(text)
        }
    }
}

pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// A connected client: its identity, a send path, and a background reader
///
/// Incoming chunks arrive on the `SessionEvents` queue returned by `connect`.
pub struct ChatSession {
    identity: String,
    local_addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    closed: Arc<AtomicBool>,
    receiver: JoinHandle<()>,
}

impl ChatSession {
    /// Connects to `server` and waits for the identity handoff.
    pub async fn connect(
        server: &str,
        read_cap: usize,
    ) -> Result<(Self, SessionEvents), RelayError> {
        let stream = TcpStream::connect(server)
            .await
            .map_err(|source| RelayError::Connect {
                addr: server.to_string(),
                source,
            })?;
        let local_addr = stream.local_addr()?;
        let (mut reader, writer) = stream.into_split();

        let mut buf = vec![0u8; read_cap.max(1)];
        let identity = read_chunk(&mut reader, &mut buf)
            .await?
            .ok_or(RelayError::MissingIdentity)?;
        info!("Connected to {} as {}", server, identity);

        let closed = Arc::new(AtomicBool::new(false));
        let (events, receiver_events) = mpsc::unbounded_channel();
        let receiver = tokio::spawn(receive_loop(reader, buf, events, Arc::clone(&closed)));

        Ok((
            ChatSession {
                identity,
                local_addr,
                writer: Mutex::new(writer),
                closed,
                receiver,
            },
            receiver_events,
        ))
    }

    /// The identity the server assigned to this connection.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Local end of the TCP connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True once either side has ended the session.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends `text` to the server.
    ///
    /// Whitespace-only input is not sent and yields `Ok(false)`. Once the
    /// session has ended every call fails with `ConnectionClosed`.
    pub async fn submit(&self, text: &str) -> Result<bool, RelayError> {
        if self.is_closed() {
            return Err(RelayError::ConnectionClosed);
        }
        if text.trim().is_empty() {
            return Ok(false);
        }

        let mut writer = self.writer.lock().await;
        let sent = match writer.write_all(text.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("Send failed, ending session: {}", e);
                self.closed.store(true, Ordering::Release);
                Err(RelayError::ConnectionClosed)
            }
        }
    }

    /// Ends the session from this side.
    ///
    /// The write half is shut down; the server answers by closing its side,
    /// which finishes the receive loop with `SessionEvent::Closed`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown after close failed: {}", e);
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop<R>(
    mut reader: R,
    mut buf: Vec<u8>,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match read_chunk(&mut reader, &mut buf).await {
            Ok(Some(text)) => {
                if events.send(SessionEvent::from_chunk(text)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                info!("Connection to server lost: {}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::Release);
    let _ = events.send(SessionEvent::Closed);
}
