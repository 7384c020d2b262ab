pub mod browse;
pub mod membership;
pub mod qr;
pub mod seed;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use campus_connect::{
    CampusClient, ClientConfig, LogReminders, MembershipPhase, MembershipState, User, model::Record,
};

/// How long to wait for the first snapshot of a user document.
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn connect(config: &ClientConfig) -> Result<CampusClient> {
    CampusClient::connect(config, Arc::new(LogReminders))
        .await
        .with_context(|| format!("Failed to connect to {}", config.redis.url))
}

/// Subscribes the membership store to `identity` and waits for its first snapshot.
pub async fn signed_in(client: &CampusClient, identity: &str) -> Result<MembershipState> {
    client
        .membership()
        .subscribe(identity)
        .await
        .with_context(|| format!("Failed to subscribe to {}/{identity}", User::COLLECTION))?;
    let mut state = client.membership().watch();
    let synced = {
        let current = tokio::time::timeout(SYNC_TIMEOUT, state.wait_for(|s| s.phase == MembershipPhase::Synced))
            .await
            .context("Timed out waiting for the user document")?
            .context("Membership store stopped")?;
        MembershipState::clone(&current)
    };
    if synced.user.is_none() {
        anyhow::bail!("No user document for {identity}");
    }
    Ok(synced)
}
