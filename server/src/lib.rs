//! # Chat Relay Server
//!
//! Accepts TCP connections, gives each one a `Client N` identity and relays
//! every message a client sends to all the other connected clients.
//!
//! ## Module Organization
//!
//! ### Registry (`registry`)
//! The only shared mutable state: which connections are live and which
//! identity each holds. Its lock is private and never held across I/O.
//!
//! ### Connection (`connection`)
//! The write half of a socket plus a per-connection write lock, so two
//! broadcasts never interleave bytes on the same client.
//!
//! ### Broadcaster (`broadcast`)
//! Two-phase fan-out: deliver to a registry snapshot, then clean up the
//! connections whose writes failed and announce their departure. The
//! registry's `unregister` decides which caller gets to announce, so a dead
//! peer is reported exactly once no matter how many tasks notice it.
//!
//! ### Connection Handler (`handler`)
//! One task per client reading capped chunks and relaying them. A close and
//! a read error are treated alike.
//!
//! ### Network (`network`)
//! Binds the listener and runs the accept loop. The identity handoff is
//! written while the new connection's write lock is held, so it is always
//! the first payload the client sees.
//!
//! ### Events (`events`)
//! Typed notifications for the server's own chat history. Tasks only
//! publish; a single consumer renders.
//!
//! ## Wire Behaviour
//!
//! Text is relayed unframed. A read takes at most `read_cap` bytes and each
//! read is relayed as one message, so anything longer than the cap reaches
//! peers as several fragments and nothing is reassembled.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use chat_server::{RelayConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (server, mut events) = Server::bind(RelayConfig::default()).await?;
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             if let Some(line) = event.history_line() {
//!                 println!("{}", line);
//!             }
//!         }
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod events;
pub mod handler;
pub mod network;
pub mod registry;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use config::RelayConfig;
pub use connection::{Connection, ConnectionKey};
pub use events::ServerEvent;
pub use network::Server;
pub use registry::ClientRegistry;
