//! Periodic reload of `Status` from the relational store, driven by
//! the slow ticker loop.

use super::Status;
use crate::error::Result;
use crate::ra::RelationalAdapter;
use tracing::info;

impl Status {
    /// Reloads filesystems and quota tokens from the relational store.
    /// Invoked at startup and on `glb.reloadfsquotas`.
    pub async fn reload_fs_and_quotas(&self, ra: &RelationalAdapter) -> Result<()> {
        let filesystems = ra.list_filesystems().await?;
        let pools = ra.list_pools().await?;
        let tokens = ra.list_quota_tokens().await?;
        info!(
            filesystems = filesystems.len(),
            pools = pools.len(),
            tokens = tokens.len(),
            "reloaded filesystems, pools, and quota tokens"
        );
        self.replace_pools(pools);
        self.replace_filesystems(filesystems);
        self.replace_quota_tokens(tokens);
        self.notify_queues();
        Ok(())
    }
}
