//! Ancestor directory size propagation.

use super::connection::RelationalAdapter;
use crate::error::Result;
use crate::model::{ExtendedStat, FileId};

/// Default depth below which ancestor directories stop being updated,
/// to avoid contention on top-level directories like `/dpm/<vo>/home`.
pub const DEFAULT_DIRSPACEREPORTDEPTH: u32 = 6;

impl RelationalAdapter {
    /// Walks ancestors of `file` from the file upward, then updates the
    /// sizes of ancestors at depths `max(0, depth-3) .. max(0,
    /// depth-1-report_depth)` by `delta` bytes. `delta` may be negative
    /// (used on delete). The top levels near root are deliberately
    /// skipped to avoid write contention on heavily shared directories.
    pub async fn add_filesize_to_dirs(
        &self,
        file: &ExtendedStat,
        delta: i64,
        report_depth: u32,
    ) -> Result<()> {
        let mut ancestors: Vec<FileId> = Vec::new();
        let mut cur = self.get_stat_by_fileid(file.parent_fileid).await?;
        ancestors.push(cur.fileid);
        while !cur.is_root() {
            cur = self.get_stat_by_fileid(cur.parent_fileid).await?;
            ancestors.push(cur.fileid);
        }
        let depth = ancestors.len();
        let lo = depth.saturating_sub(3);
        let hi = depth.saturating_sub(1).saturating_sub(report_depth as usize);
        // `hi` is exclusive-from-the-top of the depth-counted walk;
        // translate to an inclusive index range into `ancestors`
        // (index 0 = file's immediate parent, i.e. depth 1).
        if lo >= ancestors.len() {
            return Ok(());
        }
        let hi = hi.min(ancestors.len());
        if lo >= hi {
            return Ok(());
        }
        // All ancestors in the window move together under one
        // transaction, so a partial update never becomes visible.
        let mut tx = self.pool.begin().await?;
        for fileid in &ancestors[lo..hi] {
            sqlx::query("UPDATE file_metadata SET size = GREATEST(size + $1, 0) WHERE fileid = $2")
                .bind(delta)
                .bind(fileid.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Depth-window arithmetic is exercised directly; DB-backed behavior
    // is covered by the integration tests in dome-server/tests since it
    // needs a populated namespace tree.
    #[test]
    fn depth_window_skips_top_levels_for_shallow_paths() {
        // A file two levels deep (ancestors = [parent, root]) has
        // depth 2; lo = max(0, 2-3) = 0, hi = max(0, 2-1-6) = 0, so the
        // window is empty and no ancestor is touched — root and
        // near-root directories never get a direct size update for
        // typical LFN depths.
        let depth = 2usize;
        let lo = depth.saturating_sub(3);
        let hi = depth.saturating_sub(1).saturating_sub(6);
        assert_eq!(lo, 0);
        assert_eq!(hi, 0);
    }
}
