//! Watch an operator inbox: load the roster, open the push subscription and
//! log every event as it is applied.
//!
//! Configuration comes from the environment (or `.env`):
//! `CRM_API_URL`, `CRM_TOKEN`, `CRM_TENANT_ID`, `CRM_DEFAULT_CHANNEL`,
//! `CRM_REQUEST_TIMEOUT_SECS` and `RUST_LOG`.

use crm_gateway::{CrmClient, EnvToken, GatewayConfig};
use inbox_sync::{connect, EventEffect, SyncConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn describe(effect: &EventEffect) -> String {
    match effect {
        EventEffect::ForeignTenant { tenant_id } => format!("dropped event for tenant {}", tenant_id),
        EventEffect::CustomerUpdated {
            customer_id,
            applied,
        } => format!("customer {} updated (applied: {})", customer_id, applied),
        EventEffect::InboundMessage {
            customer_id,
            message_id,
            roster,
            ..
        } => format!(
            "message {} from customer {} ({:?})",
            message_id, customer_id, roster
        ),
        EventEffect::MessageSeen {
            customer_id,
            applied,
        } => format!("customer {} read (applied: {})", customer_id, applied),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("inbox_sync=info,crm_gateway=info")),
        )
        .init();

    let gateway = GatewayConfig::from_env();
    let sync = SyncConfig::from_env()?;
    info!(
        "Watching inbox for tenant {} at {}",
        sync.tenant_id, gateway.base_url
    );

    let client = CrmClient::new(gateway, EnvToken::default())?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = connect(client, sync, move |effect| {
        let _ = tx.send(describe(effect));
    })
    .await?;

    let snapshot = session.store().snapshot().await;
    info!(
        "Roster loaded: {} customers, {} unread",
        snapshot.roster.len(),
        snapshot.total_unread
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = rx.recv() => match line {
                Some(line) => info!("{}", line),
                None => {
                    warn!("Push subscription closed");
                    break;
                }
            }
        }
    }

    session.close().await?;
    Ok(())
}
