//! TCP listener and accept loop

use crate::broadcast::Broadcaster;
use crate::config::RelayConfig;
use crate::connection::{write_text, Connection};
use crate::events::{publish, EventReceiver, EventSender, ServerEvent};
use crate::handler::ConnectionHandler;
use crate::registry::ClientRegistry;
use chat_shared::{ClientId, RelayError};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Chat relay bound to a listening socket
pub struct Server {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    broadcaster: Arc<Broadcaster>,
    events: EventSender,
    config: RelayConfig,
}

impl Server {
    /// Binds the configured address.
    ///
    /// Also returns the receiving end of the server's event stream; dropping
    /// it simply discards the events.
    pub async fn bind(config: RelayConfig) -> Result<(Self, EventReceiver), RelayError> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", addr);

        let (events, receiver) = mpsc::unbounded_channel();
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), events.clone()));

        Ok((
            Server {
                listener,
                registry,
                broadcaster,
                events,
                config,
            },
            receiver,
        ))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until the listener fails.
    ///
    /// Each connection is registered, told its identity, and handed to its
    /// own task. An accept error ends the loop and is returned to the caller.
    pub async fn run(self) -> Result<(), RelayError> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    return Err(RelayError::Accept(e));
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to disable Nagle for {}: {}", peer, e);
            }

            self.admit(stream, peer).await;
        }
    }

    async fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let (reader, writer) = stream.into_split();
        self.hand_off(reader, writer, Some(peer)).await;
    }

    /// Registers a connection, writes its identity, and starts its handler.
    ///
    /// The identity goes out while the connection's write lock is held, so no
    /// broadcast can reach the socket first. If that write fails the client
    /// departs like any other and no handler is started. Returns the identity
    /// of a client whose handler is now running.
    async fn hand_off<R, W>(
        &self,
        reader: R,
        writer: W,
        peer: Option<SocketAddr>,
    ) -> Option<ClientId>
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = Arc::new(Connection::new(writer, peer));

        let (client_id, handoff) = {
            let mut writer = connection.lock_writer().await;
            let client_id = self.registry.register(Arc::clone(&connection)).await;
            let handoff = write_text(&mut writer, &client_id.to_string()).await;
            (client_id, handoff)
        };

        if let Err(e) = handoff {
            warn!("Failed to send identity to {} at {:?}: {}", client_id, peer, e);
            // Off the accept loop: notice writes may block on a slow peer
            let broadcaster = Arc::clone(&self.broadcaster);
            tokio::spawn(async move {
                broadcaster.depart(&connection).await;
            });
            return None;
        }

        publish(&self.events, ServerEvent::ClientJoined { client_id, peer });
        self.spawn_handler(reader, connection, client_id);
        Some(client_id)
    }

    fn spawn_handler<R>(&self, reader: R, connection: Arc<Connection>, client_id: ClientId)
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        let handler = ConnectionHandler::new(
            reader,
            connection,
            client_id,
            Arc::clone(&self.broadcaster),
            self.events.clone(),
        )
        .with_read_cap(self.config.read_cap)
        .with_attribution(self.config.attribute_senders);

        tokio::spawn(handler.run());
    }
}
