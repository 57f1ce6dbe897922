use clap::Parser;
use tracing_subscriber::EnvFilter;

use overlay_hub::config::HubConfig;
use overlay_hub::supervisor;

#[derive(Parser, Debug)]
#[command(name = "overlay-hubd", about = "Signaling and membership hub for a peer-to-peer VLAN overlay")]
struct Args {
    #[arg(long, env = "HUB_PORT")]
    port: Option<u16>,

    #[arg(long, env = "HUB_DB_PATH")]
    db_path: Option<String>,

    #[arg(long, env = "HUB_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = HubConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    supervisor::run(config).await
}
