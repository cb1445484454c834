//! Canvas sequencing server

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "sequencer-server")]
#[command(about = "Orders canvas mutations per project and fans them out", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "SEQUENCER_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sequencer_server=info,realtime=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let listener = TcpListener::bind(&cli.addr).await?;
    info!("Sequencing server listening on: {}", cli.addr);

    sequencer_server::serve(listener).await
}
