//! Work done by the maintenance flush: persisting staged cache words and
//! recomputing role holders.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chain::cache::WordCache;
use crate::chain::maintenance::FlushTask;
use crate::common::{PlayerId, RoleId, RoleKind, ServerId};
use crate::store::Store;

/// Desired holders of a role, sent to the transport to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSync {
    pub server_id: ServerId,
    pub kind: RoleKind,
    pub role_id: RoleId,
    pub holders: Vec<PlayerId>,
}

pub struct Housekeeping {
    cache: Arc<WordCache>,
    store: Store,
    roles_tx: Option<mpsc::UnboundedSender<RoleSync>>,
    karma_threshold: f64,
    accuracy_threshold: f64,
}

impl Housekeeping {
    pub fn new(
        cache: Arc<WordCache>,
        store: Store,
        roles_tx: Option<mpsc::UnboundedSender<RoleSync>>,
        karma_threshold: f64,
        accuracy_threshold: f64,
    ) -> Self {
        Self {
            cache,
            store,
            roles_tx,
            karma_threshold,
            accuracy_threshold,
        }
    }

    async fn run(&self) -> anyhow::Result<()> {
        let staged = self.cache.staged_len().await;
        let added = self.cache.flush_staged().await?;
        debug!(staged, added, "Word cache flushed");

        let Some(roles_tx) = &self.roles_tx else {
            return Ok(());
        };

        let mut synced = 0;
        for server in self.store.load_servers().await? {
            if let Some(role_id) = server.reliable_role {
                let holders = self
                    .store
                    .reliable_members(server.server_id, self.karma_threshold, self.accuracy_threshold)
                    .await?;
                synced += send(roles_tx, server.server_id, RoleKind::Reliable, role_id, holders);
            }
            if let Some(role_id) = server.failed_role {
                let mut holders: Vec<PlayerId> = self
                    .store
                    .chain_states(server.server_id)
                    .await?
                    .into_iter()
                    .filter_map(|state| state.failed_member)
                    .collect();
                holders.sort_unstable();
                holders.dedup();
                synced += send(roles_tx, server.server_id, RoleKind::Failed, role_id, holders);
            }
        }
        if synced > 0 {
            info!(roles = synced, "Queued role synchronisation");
        }
        Ok(())
    }
}

fn send(
    tx: &mpsc::UnboundedSender<RoleSync>,
    server_id: ServerId,
    kind: RoleKind,
    role_id: RoleId,
    holders: Vec<PlayerId>,
) -> usize {
    let sync = RoleSync {
        server_id,
        kind,
        role_id,
        holders,
    };
    match tx.send(sync) {
        Ok(()) => 1,
        Err(_) => {
            warn!(server_id, "Role sync receiver closed");
            0
        }
    }
}

impl FlushTask for Housekeeping {
    fn flush(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.run())
    }
}
