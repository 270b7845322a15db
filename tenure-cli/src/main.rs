mod handlers;
mod server;

use clap::{Args, Parser, Subcommand};
use tenure_core::client::parse_lock_key;
use tenure_core::types::LockClientOptions;

#[derive(Parser)]
#[command(
    name = "tenure",
    about = "tenure: lease-based distributed locks over a conditional-write store",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Storage backend: "memory" or "sqlite:<path>"
    #[arg(long, default_value = "memory", env = "TENURE_STORAGE")]
    storage: String,

    /// Lock table name
    #[arg(long, default_value = "locks", env = "TENURE_TABLE")]
    table: String,

    /// Owner name written into acquired locks (defaults to tenure-<pid>)
    #[arg(long, env = "TENURE_OWNER")]
    owner: Option<String>,
}

impl StoreArgs {
    fn client_options(&self) -> LockClientOptions {
        let owner = self
            .owner
            .clone()
            .unwrap_or_else(|| format!("tenure-{}", std::process::id()));
        LockClientOptions::new(self.table.clone(), owner)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP lock service
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[command(flatten)]
        store: StoreArgs,

        /// Lease duration in milliseconds
        #[arg(long, default_value = "20000")]
        lease_ms: u64,

        /// Heartbeat period in milliseconds (must be shorter than the lease)
        #[arg(long, default_value = "5000")]
        heartbeat_ms: u64,

        /// Track fencing sequence numbers across acquisitions
        #[arg(long)]
        sequence_ids: bool,

        /// Release every held lock on shutdown
        #[arg(long)]
        release_on_close: bool,
    },

    /// Print who holds a lock, as JSON. Key format: "partition" or "partition#sort"
    Owner {
        key: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            store,
            lease_ms,
            heartbeat_ms,
            sequence_ids,
            release_on_close,
        } => {
            let options = LockClientOptions {
                lease_duration_ms: lease_ms,
                heartbeat_period_ms: heartbeat_ms,
                sequence_id_tracking: sequence_ids,
                release_locks_on_close: release_on_close,
                ..store.client_options()
            };
            if let Err(e) = server::run(&host, port, &store.storage, options).await {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Owner { key, store } => {
            let options = LockClientOptions {
                create_heartbeat_background_thread: false,
                ..store.client_options()
            };
            let result = server::create_client(&store.storage, options)
                .and_then(|client| client.get_lock_owner_info(&parse_lock_key(&key)));
            match result {
                Ok(info) => match serde_json::to_string_pretty(&info) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("failed to encode owner info: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Version => {
            println!("tenure {}", env!("CARGO_PKG_VERSION"));
            println!("Lease-based distributed locks over conditional writes");
        }
    }
}
