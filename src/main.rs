/// mtd-sync - MTD metadata synchronization
///
/// Pulls acquisition frameworks and datasets from the MTD metadata service
/// into the local store, either once from the command line or on demand
/// through the HTTP trigger server.
use anyhow::Result;
use clap::{Parser, Subcommand};
use mtd_sync::{config::SyncConfig, context::AppContext, server};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[clap(name = "mtd-sync")]
#[clap(about = "Synchronize MTD acquisition frameworks and datasets")]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one synchronization, instance-wide or for a single user
    Sync {
        /// Only synchronize the metadata of this user
        #[clap(long)]
        id_role: Option<i64>,

        /// With --id-role, only synchronize this local acquisition framework
        #[clap(long, requires = "id_role")]
        id_af: Option<i64>,
    },
    /// Serve the HTTP trigger endpoints
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SyncConfig::from_env()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mtd_sync={},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ctx = AppContext::new(config).await?;

    match cli.command {
        Command::Sync { id_role, id_af } => {
            let report = match id_role {
                Some(id_role) => ctx.sync.sync_for_user(id_role, id_af).await?,
                None => ctx.sync.sync_all().await?,
            };
            if report.is_clean() {
                info!("Synchronization done");
            } else {
                warn!(
                    "Synchronization done: {} skipped entities, {} skipped actors, {} provisioning failures",
                    report.skipped.len(),
                    report.skipped_actors.len(),
                    report.provisioning_failures.len()
                );
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve => server::serve(ctx).await?,
    }

    Ok(())
}
