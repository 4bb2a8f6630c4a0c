use chat_client::console::{self, ConsoleView};
use chat_client::session::ChatSession;
use chat_shared::{DEFAULT_HOST, DEFAULT_PORT, READ_CAP};
use clap::Parser;
use log::info;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Maximum bytes taken from the server per read
    #[arg(short = 'r', long, default_value_t = READ_CAP)]
    read_cap: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server = args
        .server
        .unwrap_or_else(|| format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT));

    info!("Connecting to: {}", server);
    let (session, events) = match ChatSession::connect(&server, args.read_cap).await {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("Connection failed: {}", e);
            return Err(e.into());
        }
    };

    println!(
        "*** connected as {} (local port {})",
        session.identity(),
        session.local_addr().port()
    );
    println!("*** type a message and press Enter, /quit to leave");

    let mut view = ConsoleView::new(std::io::stdout());
    let stdin = BufReader::new(tokio::io::stdin());
    console::run(&session, events, stdin, &mut view).await?;

    Ok(())
}
