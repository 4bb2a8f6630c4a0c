use chat_server::events::EventReceiver;
use chat_server::{RelayConfig, Server, ServerEvent};
use chat_shared::{DEFAULT_HOST, DEFAULT_PORT, READ_CAP};
use clap::Parser;
use log::{debug, info};

/// Chat relay server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Maximum bytes relayed per read; longer messages arrive in fragments
    #[clap(short, long, default_value_t = READ_CAP)]
    read_cap: usize,
    /// Prefix relayed messages with the sender's identity
    #[clap(short, long)]
    attribute_senders: bool,
}

/// Parses arguments, starts the relay, and prints the chat history until
/// the listener fails or Ctrl+C is pressed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = RelayConfig {
        host: args.host,
        port: args.port,
        read_cap: args.read_cap,
        attribute_senders: args.attribute_senders,
    };

    let (server, events) = Server::bind(config).await?;
    info!("Chat server ready on {}", server.local_addr()?);

    let history = tokio::spawn(print_history(events));

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down...");
        }
    }

    history.abort();
    Ok(())
}

/// Single consumer of server events, standing in for the chat history view.
async fn print_history(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        if let ServerEvent::ClientJoined { client_id, peer } = &event {
            debug!("{} joined from {:?}", client_id, peer);
        }
        if let Some(line) = event.history_line() {
            println!("{}", line);
        }
    }
}
