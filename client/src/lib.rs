//! # Chat Client Library
//!
//! Client side of the chat relay: connecting, receiving the identity the
//! server hands out, sending user input and delivering whatever the server
//! relays to a presentation layer.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Owns the connection. `submit` is the send path; a background receive loop
//! turns incoming chunks into `SessionEvent`s on a queue. When the server
//! closes the connection the loop ends and later sends fail with
//! `RelayError::ConnectionClosed`. There is no reconnection.
//!
//! ### Console Module (`console`)
//! The `Presenter` trait and a terminal implementation. `console::run` is the
//! single consumer of session events and the only code that writes to the
//! view.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use chat_client::console::{self, ConsoleView};
//! use chat_client::session::ChatSession;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (session, events) = ChatSession::connect("127.0.0.1:12345", 1024).await?;
//!     println!("You are {}", session.identity());
//!
//!     let mut view = ConsoleView::new(std::io::stdout());
//!     let stdin = BufReader::new(tokio::io::stdin());
//!     console::run(&session, events, stdin, &mut view).await?;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod session;

pub use console::{ConsoleView, Presenter};
pub use session::{ChatSession, SessionEvent};
