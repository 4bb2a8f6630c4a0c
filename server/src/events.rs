//! Events published by connection tasks for the server's own chat history.
//!
//! Background tasks never render anything themselves; they push one of these
//! onto an unbounded channel and a single consumer decides what to display.

use chat_shared::{departure_notice, ClientId};
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Something that happened to a client, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ClientJoined {
        client_id: ClientId,
        peer: Option<SocketAddr>,
    },
    MessageRelayed {
        client_id: ClientId,
        text: String,
    },
    ClientDeparted {
        client_id: ClientId,
    },
}

impl ServerEvent {
    /// The line shown in the server's chat history, if this event has one.
    pub fn history_line(&self) -> Option<String> {
        match self {
            ServerEvent::ClientJoined { .. } => None,
            ServerEvent::MessageRelayed { client_id, text } => {
                Some(format!("{}: {}", client_id, text))
            }
            ServerEvent::ClientDeparted { client_id } => {
                Some(departure_notice(&client_id.to_string()))
            }
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Publishes `event`, ignoring the case where nobody is listening.
pub(crate) fn publish(events: &EventSender, event: ServerEvent) {
    let _ = events.send(event);
}
