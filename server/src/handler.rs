//! Per-connection receive loop

use crate::broadcast::Broadcaster;
use crate::connection::Connection;
use crate::events::{publish, EventSender, ServerEvent};
use chat_shared::{attributed, read_chunk, ClientId};
use log::{debug, info};
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Owns the read half of one accepted connection
///
/// Every chunk read from the socket is relayed to the other clients as it
/// arrives. A zero-byte read and a read error end the loop the same way: the
/// connection is unregistered and the remaining peers get a departure notice.
pub struct ConnectionHandler<R> {
    reader: R,
    connection: Arc<Connection>,
    client_id: ClientId,
    broadcaster: Arc<Broadcaster>,
    events: EventSender,
    read_cap: usize,
    attribute_senders: bool,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Handler for an already registered connection, with the default read
    /// cap and no sender attribution.
    pub fn new(
        reader: R,
        connection: Arc<Connection>,
        client_id: ClientId,
        broadcaster: Arc<Broadcaster>,
        events: EventSender,
    ) -> Self {
        Self {
            reader,
            connection,
            client_id,
            broadcaster,
            events,
            read_cap: chat_shared::READ_CAP,
            attribute_senders: false,
        }
    }

    /// Largest chunk read and relayed at once. Zero is treated as one.
    pub fn with_read_cap(mut self, read_cap: usize) -> Self {
        self.read_cap = read_cap.max(1);
        self
    }

    /// Prefix relayed text with `Client N: ` when enabled.
    pub fn with_attribution(mut self, attribute_senders: bool) -> Self {
        self.attribute_senders = attribute_senders;
        self
    }

    /// Relays messages until the connection closes, then cleans up.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; self.read_cap];

        loop {
            match read_chunk(&mut self.reader, &mut buf).await {
                Ok(Some(text)) => self.relay(text).await,
                Ok(None) => {
                    info!("Connection closed by {}", self.client_id);
                    break;
                }
                Err(e) => {
                    info!("Lost connection to {}: {}", self.client_id, e);
                    break;
                }
            }
        }

        if self.broadcaster.depart(&self.connection).await.is_none() {
            debug!("{} was already removed by a failed write", self.client_id);
        }
    }

    async fn relay(&self, text: String) {
        debug!("{} sent {} bytes", self.client_id, text.len());

        let outgoing = if self.attribute_senders {
            attributed(&self.client_id, &text)
        } else {
            text.clone()
        };

        publish(
            &self.events,
            ServerEvent::MessageRelayed {
                client_id: self.client_id,
                text,
            },
        );

        let report = self
            .broadcaster
            .broadcast(&outgoing, Some(self.connection.key()))
            .await;
        debug!(
            "Message from {} delivered to {} clients",
            self.client_id, report.delivered
        );
    }
}
