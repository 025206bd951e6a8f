//! Admission predicates over `Status`.

use super::Status;
use crate::model::{FsActivityStatus, PoolType, QuotaToken};

impl Status {
    /// Sums `physicalsize` and `freespace` across a pool's filesystems.
    pub fn get_pool_spaces(&self, poolname: &str) -> (i64, i64) {
        self.filesystems()
            .into_iter()
            .filter(|f| f.poolname == poolname)
            .fold((0, 0), |(phys, free), f| (phys + f.physicalsize, free + f.freespace))
    }

    /// `LfnMatchesAnyCanPullFS(lfn, out fs)`: true if any filesystem of
    /// a Volatile pool is compatible with the LFN's quota-token, and its
    /// physical capacity is non-trivial (here: nonzero).
    pub fn lfn_matches_any_can_pull_fs(&self, lfn: &str) -> Option<crate::model::Filesystem> {
        let token = self.which_quotatoken_for_lfn(lfn)?;
        self.filesystems()
            .into_iter()
            .filter(|f| f.poolname == token.poolname)
            .find(|f| {
                f.is_good_for_write()
                    && self
                        .pool(&f.poolname)
                        .map(|p| p.stype == PoolType::Volatile)
                        .unwrap_or(false)
                    && f.physicalsize > 0
            })
    }

    /// `whichQuotatokenForLfn(lfn, out token)`: ascend the LFN directory
    /// components; first token whose `path` is a prefix wins; ties
    /// broken by first in the multimap (here: vector order).
    pub fn which_quotatoken_for_lfn(&self, lfn: &str) -> Option<QuotaToken> {
        let tokens = self.quota_tokens();
        let mut best: Option<QuotaToken> = None;
        for token in tokens {
            if lfn == token.path || lfn.starts_with(&format!("{}/", token.path)) {
                match &best {
                    Some(b) if b.path.len() >= token.path.len() => {}
                    _ => best = Some(token),
                }
            }
        }
        best
    }

    /// `canwriteintoQuotatoken(req, token)`: true iff the request's
    /// resolved gids intersect `token.groupsforwrite`, or
    /// `groupsforwrite` is empty (permissive default).
    pub fn canwrite_into_quotatoken(&self, gids: &[i64], token: &QuotaToken) -> bool {
        token.group_can_write(gids)
    }

    /// `fitsInQuotatoken(token, size)`: the token has at least `size`
    /// bytes of remaining allowance.
    pub fn fits_in_quotatoken(&self, token: &QuotaToken, size: i64) -> bool {
        token.fits(size)
    }

    pub fn is_filesystem_online(&self, server: &str, fs: &str) -> bool {
        self.filesystems()
            .iter()
            .find(|f| f.server == server && f.fs == fs)
            .map(|f| f.activity() == FsActivityStatus::Online)
            .unwrap_or(false)
    }

    /// `PfnMatchesFS(server, pfn, fs)`: true iff `server` owns a
    /// filesystem whose root is a path-prefix of `pfn` on a component
    /// boundary (either `pfn` equals the root exactly, or the root is
    /// followed by `/`).
    pub fn pfn_matches_fs(&self, server: &str, pfn: &str) -> Option<crate::model::Filesystem> {
        self.filesystems().into_iter().find(|f| {
            f.server == server
                && pfn.starts_with(&f.fs)
                && (pfn.len() == f.fs.len() || pfn.as_bytes()[f.fs.len()] == b'/')
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FsStaticStatus, Pool};

    fn token(path: &str, pool: &str) -> QuotaToken {
        QuotaToken {
            s_token: format!("tok-{path}"),
            u_token: path.trim_start_matches('/').replace('/', "-"),
            poolname: pool.into(),
            path: path.into(),
            t_space: 1_000_000,
            u_space: 0,
            groupsforwrite: vec![],
            s_uid: 0,
            s_gid: 0,
        }
    }

    #[test]
    fn which_quotatoken_prefers_longest_prefix() {
        let st = Status::new("head.example.org");
        st.replace_quota_tokens(vec![
            token("/dpm/example.org/home", "poolA"),
            token("/dpm/example.org/home/vo1", "poolB"),
        ]);
        let found = st
            .which_quotatoken_for_lfn("/dpm/example.org/home/vo1/f")
            .unwrap();
        assert_eq!(found.poolname, "poolB");
    }

    #[test]
    fn pool_spaces_sum_across_filesystems() {
        let st = Status::new("head.example.org");
        st.replace_pools(vec![Pool {
            poolname: "poolA".into(),
            defsize: 0,
            stype: PoolType::Permanent,
        }]);
        st.replace_filesystems(vec![
            crate::model::Filesystem {
                server: "hostX".into(),
                fs: "/srv/fs1".into(),
                poolname: "poolA".into(),
                status: FsStaticStatus::Active,
                activitystatus: None,
                freespace: 100,
                physicalsize: 200,
            },
            crate::model::Filesystem {
                server: "hostY".into(),
                fs: "/srv/fs1".into(),
                poolname: "poolA".into(),
                status: FsStaticStatus::Active,
                activitystatus: None,
                freespace: 50,
                physicalsize: 80,
            },
        ]);
        let (phys, free) = st.get_pool_spaces("poolA");
        assert_eq!(phys, 280);
        assert_eq!(free, 150);
    }
}
