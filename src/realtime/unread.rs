// Per-peer unread counts, always computed from the store (no cache)

use futures::future::try_join_all;
use log::debug;
use std::sync::Arc;

use super::RealtimeHub;
use crate::models::{Identity, PeerSummary};
use crate::store::{MessageStore, StoreError, UserDirectory};

#[derive(Clone)]
pub struct UnreadAggregator {
    hub: RealtimeHub,
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn UserDirectory>,
}

impl UnreadAggregator {
    pub fn new(hub: RealtimeHub, store: Arc<dyn MessageStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { hub, store, directory }
    }

    /// Messages from `peer` to `viewer` that are not read yet.
    pub async fn unread_count(&self, viewer: &Identity, peer: &Identity) -> Result<usize, StoreError> {
        self.store.count_unread(viewer, peer).await
    }

    /// Every other user in the directory with its unread count and presence.
    pub async fn peer_summaries(&self, viewer: &Identity) -> Result<Vec<PeerSummary>, StoreError> {
        let peers: Vec<_> = self
            .directory
            .list_users()
            .await?
            .into_iter()
            .filter(|profile| &profile.identity != viewer)
            .collect();

        let counts = try_join_all(
            peers
                .iter()
                .map(|profile| self.unread_count(viewer, &profile.identity)),
        )
        .await?;
        debug!("Computed unread counts for {} peer(s) of {}", peers.len(), viewer);

        Ok(peers
            .into_iter()
            .zip(counts)
            .map(|(profile, unread_count)| {
                let presence = self.hub.presence(&profile.identity);
                PeerSummary {
                    profile,
                    unread_count,
                    presence,
                }
            })
            .collect())
    }
}
