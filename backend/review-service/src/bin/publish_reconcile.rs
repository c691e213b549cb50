/// Publish reconciliation tool.
///
/// With no arguments, prints one JSON line per asset whose publish claim is
/// held with no recorded platform identifier (an upload that timed out with
/// an unknown outcome).
///
/// `publish-reconcile release <asset_id>` releases the claim once the
/// operator has verified the upload never reached the platform, so the
/// producer can publish again.
///
/// Reads the same environment as review-service.
use anyhow::{bail, Context};
use review_service::{AppState, Config};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let state = AppState::build(&config, pool).await?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => {
            let pending = state.workflow.unreconciled_publishes().await?;
            for asset in &pending {
                println!(
                    "{}",
                    serde_json::json!({
                        "asset_id": asset.id,
                        "workspace_id": asset.workspace_id,
                        "claimed_at": asset.publish_claimed_at,
                        "source": asset.source_ref(),
                    })
                );
            }
            tracing::info!(count = pending.len(), "unreconciled publishes listed");
        }
        ["release", asset_id] => {
            let asset_id = Uuid::parse_str(asset_id).context("asset_id must be a UUID")?;
            if !state.workflow.release_publish_claim(asset_id).await? {
                bail!("asset {asset_id} has no releasable publish claim");
            }
            println!("released publish claim on {asset_id}");
        }
        _ => bail!("usage: publish-reconcile [release <asset_id>]"),
    }

    Ok(())
}
