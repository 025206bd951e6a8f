//! Put-placement engine (PP): candidate filesystem selection, weighted
//! random pick, and PFN construction for put/putdone orchestration.

use crate::error::{DomeError, Result};
use crate::model::{Filesystem, PoolType};
use crate::status::Status;
use rand::Rng;

/// Hints a caller may supply to `pick_filesystems`; at most one of
/// `pool`/`host` may be set.
#[derive(Debug, Clone, Default)]
pub struct PlacementHints {
    pub pool: Option<String>,
    pub host: Option<String>,
    pub fs: Option<String>,
}

pub struct PlacementEngine {
    pub minfreespace_mb: i64,
}

impl PlacementEngine {
    pub fn new(minfreespace_mb: i64) -> Self {
        Self { minfreespace_mb }
    }

    /// Filters the live filesystem list by hints and by
    /// `is_good_for_write()`. Returns candidates still eligible after
    /// the minimum-free-space filter and, if `existing_replica_hosts`
    /// is non-empty (additional-replica placement), after removing any
    /// filesystem already holding a replica of the LFN.
    pub fn candidates(
        &self,
        status: &Status,
        hints: &PlacementHints,
        existing_replica_servers: &[String],
    ) -> Result<Vec<Filesystem>> {
        if hints.pool.is_some() && hints.host.is_some() {
            return Err(DomeError::BadRequest(
                "only one of pool or host may be specified".into(),
            ));
        }

        let mut candidates: Vec<Filesystem> = status
            .filesystems()
            .into_iter()
            .filter(|f| f.is_good_for_write())
            .filter(|f| hints.pool.as_deref().map(|p| p == f.poolname).unwrap_or(true))
            .filter(|f| hints.host.as_deref().map(|h| h == f.server).unwrap_or(true))
            .filter(|f| hints.fs.as_deref().map(|fs| fs == f.fs).unwrap_or(true))
            .collect();

        candidates.retain(|f| !existing_replica_servers.contains(&f.server));

        let threshold_bytes = |f: &Filesystem| -> i64 {
            status
                .pool(&f.poolname)
                .map(|p| p.defsize)
                .unwrap_or(self.minfreespace_mb * 1024 * 1024)
        };

        candidates.retain(|f| {
            let threshold = threshold_bytes(f);
            let is_volatile = status
                .pool(&f.poolname)
                .map(|p| p.stype == PoolType::Volatile)
                .unwrap_or(false);
            let measured = if is_volatile { f.physicalsize } else { f.freespace };
            measured >= threshold
        });

        Ok(candidates)
    }

    /// Weighted random pick among survivors using `freespace` (MiB) as
    /// the weight: scan in order of decreasing freespace, return the
    /// first whose cumulative weight exceeds the draw.
    pub fn weighted_pick<'a>(&self, candidates: &'a [Filesystem]) -> Result<&'a Filesystem> {
        if candidates.is_empty() {
            return Err(DomeError::NoSpace(
                "no filesystem has enough free space for this write".into(),
            ));
        }
        let mut sorted: Vec<&Filesystem> = candidates.iter().collect();
        sorted.sort_by(|a, b| b.freespace.cmp(&a.freespace));
        let weights: Vec<i64> = sorted.iter().map(|f| (f.freespace / (1024 * 1024)).max(1)).collect();
        let total: i64 = weights.iter().sum();
        let mut r = rand::thread_rng().gen_range(0..total.max(1));
        for (fs, w) in sorted.iter().zip(weights.iter()) {
            if r < *w {
                return Ok(fs);
            }
            r -= w;
        }
        Ok(sorted[0])
    }

    /// `<fs>/<vo>/<YYYY-MM-DD>/<basename>.<globalputcount>.<unixtime>`.
    /// The VO is token #4 (0-indexed) of the LFN path; fails if the LFN
    /// has fewer than 5 components.
    pub fn build_pfn(fs_root: &str, lfn: &str, putcount: i32, now_unix: i64, today: &str) -> Result<String> {
        let comps: Vec<&str> = lfn.split('/').filter(|c| !c.is_empty()).collect();
        if comps.len() < 5 {
            return Err(DomeError::Unprocessable(format!(
                "lfn {lfn} has fewer than 5 path components"
            )));
        }
        let vo = comps[3];
        let basename = comps.last().unwrap();
        Ok(format!(
            "{fs_root}/{vo}/{today}/{basename}.{putcount}.{now_unix}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FsActivityStatus, FsStaticStatus};

    fn fs(server: &str, pool: &str, free_mb: i64) -> Filesystem {
        Filesystem {
            server: server.into(),
            fs: format!("/srv/{server}"),
            poolname: pool.into(),
            status: FsStaticStatus::Active,
            activitystatus: Some(FsActivityStatus::Online),
            freespace: free_mb * 1024 * 1024,
            physicalsize: free_mb * 1024 * 1024 * 2,
        }
    }

    #[test]
    fn build_pfn_rejects_short_lfn() {
        let err = PlacementEngine::build_pfn("/srv/fs1", "/dpm/example.org/f", 1, 1000, "2026-07-28");
        assert!(err.is_err());
    }

    #[test]
    fn build_pfn_uses_fourth_component_as_vo() {
        let pfn = PlacementEngine::build_pfn(
            "/srv/fs1",
            "/dpm/example.org/home/vo1/f",
            7,
            1690000000,
            "2026-07-28",
        )
        .unwrap();
        assert_eq!(pfn, "/srv/fs1/vo1/2026-07-28/f.7.1690000000");
    }

    #[test]
    fn weighted_pick_on_empty_candidates_is_no_space() {
        let engine = PlacementEngine::new(4096);
        let err = engine.weighted_pick(&[]).unwrap_err();
        matches!(err, DomeError::NoSpace(_));
    }

    #[test]
    fn weighted_pick_only_returns_candidates_given() {
        let engine = PlacementEngine::new(4096);
        let candidates = vec![fs("hostX", "poolA", 20_000)];
        let picked = engine.weighted_pick(&candidates).unwrap();
        assert_eq!(picked.server, "hostX");
    }

    #[test]
    fn candidates_rejects_both_pool_and_host_hints() {
        let status = Status::new("head.example.org");
        let engine = PlacementEngine::new(4096);
        let hints = PlacementHints {
            pool: Some("poolA".into()),
            host: Some("hostX".into()),
            fs: None,
        };
        assert!(engine.candidates(&status, &hints, &[]).is_err());
    }
}
