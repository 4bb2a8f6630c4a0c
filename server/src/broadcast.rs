//! Fan-out of messages to registered connections
//!
//! Delivery runs in two phases. The first phase writes the message to every
//! connection in a registry snapshot and only records which writes failed.
//! The second phase, with no lock held, unregisters and closes each failed
//! connection. Departure notices for the peers that were actually removed are
//! queued and go through the same two phases, so a notice that hits another
//! dead socket produces a further notice instead of recursing.

use crate::connection::{Connection, ConnectionKey};
use crate::events::{publish, EventSender, ServerEvent};
use crate::registry::ClientRegistry;
use chat_shared::{departure_notice, ClientId};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;

/// Outcome of one `broadcast` call, including any notices it triggered
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Successful writes of the broadcast text
    pub delivered: usize,
    /// Clients removed because a write to them failed, in removal order
    pub departed: Vec<ClientId>,
}

/// Sends text to registered clients and removes the ones that fail
///
/// Every departure, whether found by a failed write or reported by a
/// connection handler, goes through here so it is announced exactly once.
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
    events: EventSender,
}

impl Broadcaster {
    /// Departures are published to `events` as they happen.
    pub fn new(registry: Arc<ClientRegistry>, events: EventSender) -> Self {
        Self { registry, events }
    }

    /// The registry this broadcaster delivers to.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Sends `text` to every registered connection except `exclude`.
    pub async fn broadcast(&self, text: &str, exclude: Option<ConnectionKey>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut queue = VecDeque::new();

        let failed = self.deliver(text, exclude, &mut report.delivered).await;
        self.clean_up(failed, &mut queue, &mut report.departed).await;
        self.drain(queue, &mut report.departed).await;

        report
    }

    /// Removes `connection` after its reader saw a close or an error.
    ///
    /// Announces the departure only if this call performed the removal, so a
    /// handler and a broadcaster racing on the same dead peer yield a single
    /// notice. Returns the departed identity when that happened here.
    pub async fn depart(&self, connection: &Arc<Connection>) -> Option<ClientId> {
        let client_id = self.registry.unregister(connection.key()).await?;
        connection.close().await;
        publish(&self.events, ServerEvent::ClientDeparted { client_id });

        let mut departed = vec![client_id];
        let mut queue = VecDeque::new();
        queue.push_back((departure_notice(&client_id.to_string()), connection.key()));
        self.drain(queue, &mut departed).await;

        Some(client_id)
    }

    /// Phase one: write to every snapshot entry, collecting failures.
    async fn deliver(
        &self,
        text: &str,
        exclude: Option<ConnectionKey>,
        delivered: &mut usize,
    ) -> Vec<Arc<Connection>> {
        let recipients = self.registry.snapshot().await;
        let mut failed = Vec::new();

        for (connection, client_id) in recipients {
            if Some(connection.key()) == exclude {
                continue;
            }

            match connection.send(text).await {
                Ok(()) => *delivered += 1,
                Err(e) => {
                    warn!("Failed to send to {}: {}", client_id, e);
                    failed.push(connection);
                }
            }
        }

        failed
    }

    /// Phase two: unregister failed connections and queue their notices.
    async fn clean_up(
        &self,
        failed: Vec<Arc<Connection>>,
        queue: &mut VecDeque<(String, ConnectionKey)>,
        departed: &mut Vec<ClientId>,
    ) {
        for connection in failed {
            match self.registry.unregister(connection.key()).await {
                Some(client_id) => {
                    info!("{} dropped after a failed write", client_id);
                    connection.close().await;
                    publish(&self.events, ServerEvent::ClientDeparted { client_id });
                    queue.push_back((departure_notice(&client_id.to_string()), connection.key()));
                    departed.push(client_id);
                }
                None => debug!("{:?} already cleaned up elsewhere", connection.key()),
            }
        }
    }

    /// Delivers queued departure notices until no new failures appear.
    async fn drain(
        &self,
        mut queue: VecDeque<(String, ConnectionKey)>,
        departed: &mut Vec<ClientId>,
    ) {
        while let Some((notice, exclude)) = queue.pop_front() {
            let mut delivered = 0;
            let failed = self.deliver(&notice, Some(exclude), &mut delivered).await;
            debug!("Departure notice reached {} clients", delivered);
            self.clean_up(failed, &mut queue, departed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventReceiver;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream};
    use tokio::sync::mpsc;

    /// Writer standing in for a socket whose peer is gone
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_broadcaster() -> (Arc<Broadcaster>, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let registry = Arc::new(ClientRegistry::new());
        (Arc::new(Broadcaster::new(registry, events)), receiver)
    }

    async fn join(broadcaster: &Broadcaster) -> (Arc<Connection>, ClientId, DuplexStream) {
        let (local, remote) = tokio::io::duplex(4096);
        let connection = Arc::new(Connection::new(local, None));
        let client_id = broadcaster.registry().register(Arc::clone(&connection)).await;
        (connection, client_id, remote)
    }

    async fn join_dead(broadcaster: &Broadcaster) -> (Arc<Connection>, ClientId) {
        let connection = Arc::new(Connection::new(BrokenPipe, None));
        let client_id = broadcaster.registry().register(Arc::clone(&connection)).await;
        (connection, client_id)
    }

    /// Reads everything that arrives before the stream goes quiet.
    async fn received<R: AsyncRead + Unpin>(reader: &mut R) -> String {
        let mut collected = Vec::new();
        let mut buf = [0u8; 1024];
        while let Ok(Ok(n)) =
            tokio::time::timeout(Duration::from_millis(50), reader.read(&mut buf)).await
        {
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(collected).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let (broadcaster, _events) = test_broadcaster();
        let (sender, _, mut sender_remote) = join(&broadcaster).await;
        let (_b, _, mut b_remote) = join(&broadcaster).await;
        let (_c, _, mut c_remote) = join(&broadcaster).await;

        let report = broadcaster.broadcast("hello", Some(sender.key())).await;

        assert_eq!(report.delivered, 2);
        assert!(report.departed.is_empty());
        assert_eq!(received(&mut b_remote).await, "hello");
        assert_eq!(received(&mut c_remote).await, "hello");
        assert_eq!(received(&mut sender_remote).await, "");
    }

    #[tokio::test]
    async fn test_broadcast_without_exclusion_reaches_everyone() {
        let (broadcaster, _events) = test_broadcaster();
        let (_a, _, mut a_remote) = join(&broadcaster).await;
        let (_b, _, mut b_remote) = join(&broadcaster).await;

        let report = broadcaster.broadcast("announcement", None).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(received(&mut a_remote).await, "announcement");
        assert_eq!(received(&mut b_remote).await, "announcement");
    }

    #[tokio::test]
    async fn test_failed_write_does_not_block_others() {
        let (broadcaster, mut events) = test_broadcaster();
        let (sender, _, _sender_remote) = join(&broadcaster).await;
        let (_dead, dead_id) = join_dead(&broadcaster).await;
        let (_live, _, mut live_remote) = join(&broadcaster).await;

        let report = broadcaster.broadcast("hello", Some(sender.key())).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.departed, vec![dead_id]);
        assert_eq!(broadcaster.registry().len().await, 2);
        assert_eq!(
            received(&mut live_remote).await,
            "helloClient 2 has left the chat."
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ServerEvent::ClientDeparted { client_id: dead_id }
        );
    }

    #[tokio::test]
    async fn test_sender_receives_departure_notice() {
        let (broadcaster, _events) = test_broadcaster();
        let (sender, _, mut sender_remote) = join(&broadcaster).await;
        join_dead(&broadcaster).await;

        broadcaster.broadcast("hello", Some(sender.key())).await;

        assert_eq!(received(&mut sender_remote).await, "Client 2 has left the chat.");
    }

    #[tokio::test]
    async fn test_notice_to_another_dead_peer_cascades() {
        let (broadcaster, _events) = test_broadcaster();
        let (sender, _, mut sender_remote) = join(&broadcaster).await;
        let (_first, first_id) = join_dead(&broadcaster).await;
        let (_second, second_id) = join_dead(&broadcaster).await;

        let report = broadcaster.broadcast("hello", Some(sender.key())).await;

        assert_eq!(report.departed, vec![first_id, second_id]);
        assert_eq!(broadcaster.registry().roster().await, vec![ClientId::new(1)]);
        assert_eq!(
            received(&mut sender_remote).await,
            "Client 2 has left the chat.Client 3 has left the chat."
        );
    }

    #[tokio::test]
    async fn test_depart_announces_once() {
        let (broadcaster, mut events) = test_broadcaster();
        let (leaving, leaving_id, _leaving_remote) = join(&broadcaster).await;
        let (_stay, _, mut stay_remote) = join(&broadcaster).await;

        assert_eq!(broadcaster.depart(&leaving).await, Some(leaving_id));
        assert_eq!(broadcaster.depart(&leaving).await, None);

        assert_eq!(received(&mut stay_remote).await, "Client 1 has left the chat.");
        assert_eq!(
            events.try_recv().unwrap(),
            ServerEvent::ClientDeparted {
                client_id: leaving_id
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_depart_closes_connection() {
        let (broadcaster, _events) = test_broadcaster();
        let (leaving, _, mut leaving_remote) = join(&broadcaster).await;

        broadcaster.depart(&leaving).await;

        let mut buf = Vec::new();
        assert_eq!(leaving_remote.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_yield_single_notice() {
        let (broadcaster, _events) = test_broadcaster();
        let (a, _, mut a_remote) = join(&broadcaster).await;
        let (b, _, mut b_remote) = join(&broadcaster).await;
        let (_dead, dead_id) = join_dead(&broadcaster).await;

        let from_a = {
            let broadcaster = Arc::clone(&broadcaster);
            let key = a.key();
            tokio::spawn(async move { broadcaster.broadcast("from a", Some(key)).await })
        };
        let from_b = {
            let broadcaster = Arc::clone(&broadcaster);
            let key = b.key();
            tokio::spawn(async move { broadcaster.broadcast("from b", Some(key)).await })
        };

        let report_a = from_a.await.unwrap();
        let report_b = from_b.await.unwrap();

        let mut departed = report_a.departed;
        departed.extend(report_b.departed);
        assert_eq!(departed, vec![dead_id]);

        let notice = "Client 3 has left the chat.";
        let at_a = received(&mut a_remote).await;
        let at_b = received(&mut b_remote).await;
        assert_eq!(at_a.matches(notice).count(), 1);
        assert_eq!(at_b.matches(notice).count(), 1);
        assert_eq!(at_a.matches("from b").count(), 1);
        assert_eq!(at_b.matches("from a").count(), 1);
    }
}
