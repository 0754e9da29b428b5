use anyhow::Result;
use clap::Parser;
use hubmirror::config::load_config;
use hubmirror::gateway::{self, GatewayState};
use hubmirror::mirror::MirrorStore;
use hubmirror::platforms::default_http_client;
use hubmirror::reply::{HttpReplyEngine, NullReplyEngine, ReplyEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hubmirror")]
#[command(about = "Social webhook dispatch and conversation mirror")]
#[command(version = hubmirror::VERSION)]
struct Cli {
    /// Path to the configuration file (defaults to ./hubmirror.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let store = Arc::new(MirrorStore::new(&config.store.db_path)?);
    for account in &config.whatsapp.accounts {
        store.upsert_waba_account(
            &account.owner_id,
            &account.waba_id,
            &account.phone_number_id,
        )?;
    }
    if !config.whatsapp.accounts.is_empty() {
        info!(
            "registered {} whatsapp business account(s)",
            config.whatsapp.accounts.len()
        );
    }

    let reply: Arc<dyn ReplyEngine> = match &config.reply.endpoint {
        Some(endpoint) => {
            info!("reply engine at {}", endpoint);
            Arc::new(HttpReplyEngine::new(default_http_client(), endpoint.clone()))
        }
        None => {
            warn!("no reply endpoint configured, bot replies disabled");
            Arc::new(NullReplyEngine)
        }
    };

    gateway::start(Arc::new(GatewayState::new(config, store, reply))).await
}
