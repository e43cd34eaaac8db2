use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use budgetline::api::run_http_server;
use budgetline::store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "budgetline",
    about = "Household budget engine: automatic minimums, schedule-driven generation, replication"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// SQLite database path; an in-memory database is used when omitted.
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port, db } => {
            let store = match &db {
                Some(path) => Store::open(path),
                None => Store::open_in_memory(),
            };
            let store = match store {
                Ok(store) => store,
                Err(e) => {
                    eprintln!("Failed to open database: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = run_http_server(port, store).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
