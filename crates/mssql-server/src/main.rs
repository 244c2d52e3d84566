//! `tds-lite`: serve SQLite databases over TDS.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mssql_server::{DEFAULT_LISTEN_ADDR, Server, ServerConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "tds-lite", version, about = "TDS server backed by SQLite")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// Directory holding one SQLite file per database. In-memory when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Database used when a login does not name one.
    #[arg(long, default_value = "master")]
    database: String,

    /// Server name reported in messages and @@VERSION.
    #[arg(long, default_value = "TdsLite")]
    server_name: String,

    /// Maximum concurrent connections, 0 for no limit.
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Largest request in bytes; bigger ones drop the connection.
    #[arg(long, default_value_t = mssql_codec::DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// Iteration cap for WHILE loops.
    #[arg(long, default_value_t = 10_000)]
    max_loop_iterations: usize,

    /// Tracing filter, overrides RUST_LOG.
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_tracing(filter: Option<&str>) {
    let filter = filter
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_filter.as_deref());

    let mut config = ServerConfig::new()
        .listen_addr(args.listen)
        .default_database(args.database)
        .server_name(args.server_name)
        .max_connections(args.max_connections)
        .max_message_size(args.max_message_size)
        .max_loop_iterations(args.max_loop_iterations);
    if let Some(dir) = args.data_dir {
        config = config.data_dir(dir);
    }

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            handle.shutdown();
        }
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped with an error");
            ExitCode::FAILURE
        }
    }
}
