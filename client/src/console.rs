//! Terminal presentation for a chat session
//!
//! All display work happens on the task that calls `run`: it reads lines
//! from the input, submits them through the session, and drains the session's
//! event queue into a `Presenter`. Nothing else writes to the view.

use crate::session::{ChatSession, SessionEvent, SessionEvents};
use chat_shared::RelayError;
use log::warn;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const QUIT_COMMAND: &str = "/quit";

/// What the relay needs from whatever displays the conversation
pub trait Presenter {
    fn message_received(&mut self, text: &str);
    fn peer_departed(&mut self, text: &str);
    /// Local echo of a message this client sent.
    fn message_sent(&mut self, identity: &str, text: &str);
    fn session_ended(&mut self);
}

impl SessionEvent {
    pub fn present<P: Presenter + ?Sized>(&self, presenter: &mut P) {
        match self {
            SessionEvent::MessageReceived(text) => presenter.message_received(text),
            SessionEvent::PeerDeparted(text) => presenter.peer_departed(text),
            SessionEvent::Closed => presenter.session_ended(),
        }
    }
}

/// Line-oriented view writing to any `Write` sink
pub struct ConsoleView<W> {
    out: W,
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!("Failed to write to console: {}", e);
        }
    }
}

impl<W: Write> Presenter for ConsoleView<W> {
    fn message_received(&mut self, text: &str) {
        self.line(text);
    }

    fn peer_departed(&mut self, text: &str) {
        self.line(&format!("*** {}", text));
    }

    fn message_sent(&mut self, identity: &str, text: &str) {
        self.line(&format!("{}: {}", identity, text));
    }

    fn session_ended(&mut self) {
        self.line("*** disconnected from server");
    }
}

/// Drives one session until the input ends, `/quit` is entered, or the
/// server goes away.
pub async fn run<I, P>(
    session: &ChatSession,
    mut events: SessionEvents,
    input: I,
    presenter: &mut P,
) -> Result<(), RelayError>
where
    I: AsyncBufRead + Unpin,
    P: Presenter,
{
    let mut lines = input.lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    event.present(presenter);
                    if event == SessionEvent::Closed {
                        break;
                    }
                }
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == QUIT_COMMAND => break,
                Some(line) => match session.submit(&line).await {
                    Ok(true) => presenter.message_sent(session.identity(), &line),
                    Ok(false) => {}
                    Err(RelayError::ConnectionClosed) => {
                        presenter.session_ended();
                        break;
                    }
                    Err(e) => return Err(e),
                },
                None => break,
            },
        }
    }

    session.close().await;
    Ok(())
}
