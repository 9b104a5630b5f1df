use anyhow::Result;
use axum::Router;
use clap::Parser;
use docsearch::ScoringConfig;
use docsearch_server::{build_app, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index file path
    #[arg(long, default_value = "./searchindex.js")]
    index: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Give up loading the index after this many seconds
    #[arg(long, default_value_t = 30)]
    load_timeout_secs: u64,
    /// Score multiplier for title matches
    #[arg(long, default_value_t = 3.0)]
    title_boost: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig {
        index_path: args.index,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
        load_timeout: Duration::from_secs(args.load_timeout_secs),
        scoring: ScoringConfig { title_boost: args.title_boost, ..Default::default() },
    };
    let app: Router = build_app(config).await?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
