//! procedure runner
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use polymesh_core::{AssetId, Balance, Ticker};
use procedure_engine::procedures::{
    AssetDocument, CreateAsset, CreateAssetParams, CreateVenue, CreateVenueParams, RenameAsset,
    RenameAssetParams, ReserveTicker, ReserveTickerParams, VenueType,
};
use procedure_engine::config::ClientConfig;
use procedure_engine::{ChainClient, ChainEntities, Context, Procedure, Verdict};
use serde::Serialize;

/// Polymesh procedure runner CLI
#[derive(Parser, Debug)]
#[command(
    name = "polymesh-procedures",
    about = "Prepares and runs Polymesh procedures against a node"
)]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    /// Only check authorization and estimate fees, without submitting anything
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reserve a ticker, or extend the signer's reservation
    ReserveTicker {
        /// Ticker to reserve
        #[arg(long)]
        ticker: Ticker,
        /// Extend an existing reservation instead
        #[arg(long)]
        extend: bool,
    },
    /// Create an asset, reserving its ticker first when needed
    CreateAsset {
        /// Ticker of the asset
        #[arg(long)]
        ticker: Ticker,
        /// Asset name
        #[arg(long)]
        name: String,
        /// Allow fractional balances
        #[arg(long)]
        divisible: bool,
        /// Asset type variant
        #[arg(long, default_value = "EquityCommon")]
        asset_type: String,
        /// Units to issue to the default portfolio
        #[arg(long)]
        initial_supply: Option<Balance>,
        /// Document to attach, as `name=uri` (repeatable)
        #[arg(long = "document", value_parser = parse_document)]
        documents: Vec<AssetDocument>,
    },
    /// Rename an asset
    RenameAsset {
        /// Asset id (0x prefixed hex)
        #[arg(long)]
        asset: AssetId,
        /// New name
        #[arg(long)]
        name: String,
    },
    /// Create a settlement venue
    CreateVenue {
        /// Venue description
        #[arg(long)]
        description: String,
        /// What the venue is used for
        #[arg(long, value_enum, default_value_t = VenueKind::Other)]
        venue_type: VenueKind,
    },
}

/// Command line spelling of [`VenueType`]
#[derive(Clone, Copy, Debug, ValueEnum)]
enum VenueKind {
    Other,
    Distribution,
    Sto,
    Exchange,
}

impl From<VenueKind> for VenueType {
    fn from(kind: VenueKind) -> Self {
        match kind {
            VenueKind::Other => VenueType::Other,
            VenueKind::Distribution => VenueType::Distribution,
            VenueKind::Sto => VenueType::Sto,
            VenueKind::Exchange => VenueType::Exchange,
        }
    }
}

fn parse_document(s: &str) -> Result<AssetDocument, String> {
    let (name, uri) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=uri, got {s}"))?;
    Ok(AssetDocument {
        name: name.into(),
        uri: uri.into(),
    })
}

async fn execute<P>(ctx: &Context, procedure: P, params: P::Params, dry_run: bool) -> anyhow::Result<()>
where
    P: Procedure,
    P::Output: Serialize,
{
    if dry_run {
        let verdict = ctx.check_authorization(&procedure, &params).await?;
        if let Verdict::Denied(reasons) = &verdict {
            warn!("⛔ Signer is not authorized");
            println!("{}", serde_json::to_string_pretty(reasons)?);
            return Ok(());
        }
        let queue = ctx.prepare(&procedure, params).await?;
        let fees = queue.total_fees().await?;
        let report = serde_json::json!({
            "transactions": queue
                .transactions()
                .iter()
                .map(|transaction| transaction.tags().iter().map(ToString::to_string).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
            "fees": fees,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let queue = ctx.prepare(&procedure, params).await?;
    let mut events = queue.on_status_change();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("🔄 Transaction {} is now {:?}", event.transaction, event.status);
        }
    });

    let output = queue.run().await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger with fallback to info if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("🚀 Starting procedure runner...");

    let client: Arc<dyn ChainClient> = Arc::new(cli.client.connect().await?);
    let entities = ChainEntities::new(Arc::clone(&client));
    let actor = entities.signer().await?;
    match actor.identity {
        Some(did) => info!("🟢 Signing as {} of identity {did}", actor.account),
        None => warn!("🟡 Signing key {} is not attached to an identity", actor.account),
    }
    let ctx = Context::new(client, Arc::new(entities), actor);

    match cli.command {
        Command::ReserveTicker { ticker, extend } => {
            let params = ReserveTickerParams {
                ticker,
                extend_period: extend,
            };
            execute(&ctx, ReserveTicker, params, cli.dry_run).await
        }
        Command::CreateAsset {
            ticker,
            name,
            divisible,
            asset_type,
            initial_supply,
            documents,
        } => {
            let params = CreateAssetParams {
                ticker,
                name,
                divisible,
                asset_type,
                documents,
                initial_supply,
            };
            execute(&ctx, CreateAsset, params, cli.dry_run).await
        }
        Command::RenameAsset { asset, name } => {
            execute(&ctx, RenameAsset, RenameAssetParams { asset, name }, cli.dry_run).await
        }
        Command::CreateVenue {
            description,
            venue_type,
        } => {
            let params = CreateVenueParams {
                description,
                venue_type: venue_type.into(),
            };
            execute(&ctx, CreateVenue, params, cli.dry_run).await
        }
    }
}
