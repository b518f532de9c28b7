use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ethnum::U256;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::filter::EnvFilter;

use relay_auction::config::Config;
use relay_auction::header::Header;
use relay_auction::node::Node;
use relay_auction::round::Auction;
use relay_auction::store::MemoryStore;
use relay_auction::token::MemoryToken;
use relay_auction::app;

/// Relay auction node over an in-memory header store
#[derive(Debug, Parser)]
#[command(name = "relay-auction", version)]
pub struct Args {
    /// JSON config file. Defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Raw 80-byte genesis header, hex encoded.
    #[arg(long)]
    pub genesis: String,

    #[arg(long, default_value_t = 0)]
    pub genesis_height: u64,

    /// Rounds of reward minted to the auction's holding address at start.
    #[arg(long, default_value_t = 0)]
    pub reward_pool: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = match std::env::var_os("RUST_LOG") {
        Some(_) => EnvFilter::try_from_default_env().context("invalid `RUST_LOG`")?,
        None => EnvFilter::new("info"),
    };
    tracing_subscriber::fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Config::from_json(&json)?
        }
        None => Config::default(),
    };
    let bytes = hex::decode(args.genesis.trim()).context("genesis is not hex")?;
    let genesis = Header::parse(&bytes)?;

    let store = MemoryStore::new(genesis, args.genesis_height);
    let bid_token = MemoryToken::new("Bid", "1");
    let mut reward_token = MemoryToken::new("Reward", "1");
    let pool = config
        .reward_amount
        .checked_mul(U256::from(args.reward_pool))
        .context("reward pool overflows")?;
    reward_token.mint(&config.auction, pool);
    tracing::info!(
        round_length = config.round_length,
        genesis = %hex::encode(genesis.digest()),
        height = args.genesis_height,
        "auction starting"
    );

    let auction = Auction::new(config, store, bid_token, reward_token)?;
    let node = Arc::new(Node::new(auction));
    let mut events = node.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::error!(error = %e, "unprintable event"),
                },
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "event printer lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    app::serve(node, args.listen).await?;
    Ok(())
}
