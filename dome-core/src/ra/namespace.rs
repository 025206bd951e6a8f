//! Namespace primitives: create, stat, rename, symlink, directory
//! streaming.

use super::connection::RelationalAdapter;
use crate::error::{DomeError, Result};
use crate::model::{ExtendedStat, FileId, FileStatus};
use sqlx::Row;

/// Symlink resolution gives up after this many hops.
const MAX_SYMLINK_DEPTH: u32 = 16;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_stat(row: &sqlx::postgres::PgRow) -> ExtendedStat {
    ExtendedStat {
        fileid: FileId(row.get("fileid")),
        parent_fileid: FileId(row.get("parent_fileid")),
        name: row.get("name"),
        mode: row.get::<i32, _>("mode") as u32,
        uid: row.get("uid"),
        gid: row.get("gid"),
        size: row.get("size"),
        nlink: row.get("nlink"),
        atime: row.get("atime"),
        mtime: row.get("mtime"),
        ctime: row.get("ctime"),
        status: match row.get::<i16, _>("status") {
            1 => FileStatus::Migrated,
            _ => FileStatus::Online,
        },
        acl: row.get("acl"),
        xattrs: row.get("xattrs"),
        csumtype: row.try_get("csumtype").ok(),
        csumvalue: row.try_get("csumvalue").ok(),
    }
}

impl RelationalAdapter {
    /// Allocates the next fileid via `SELECT ... FOR UPDATE`, increment,
    /// `UPDATE`. The singleton row is seeded with 1 by the migration,
    /// so the first-ever insert observes id 1 there (the root takes it
    /// by direct seed, so ordinary allocations start from 2).
    pub async fn allocate_fileid(&self) -> Result<FileId> {
        let mut tx = self.pool.begin().await?;
        let next: i64 = sqlx::query_scalar("SELECT next_fileid FROM unique_id FOR UPDATE")
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE unique_id SET next_fileid = $1")
            .bind(next + 1)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(FileId(next))
    }

    pub async fn get_stat_by_fileid(&self, fileid: FileId) -> Result<ExtendedStat> {
        let row = sqlx::query("SELECT * FROM file_metadata WHERE fileid = $1")
            .bind(fileid.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("fileid {fileid}")))?;
        Ok(row_to_stat(&row))
    }

    pub async fn get_stat_by_parent_fileid(
        &self,
        parent: FileId,
        name: &str,
    ) -> Result<ExtendedStat> {
        let row = sqlx::query("SELECT * FROM file_metadata WHERE parent_fileid = $1 AND name = $2")
            .bind(parent.0)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("{parent}/{name}")))?;
        Ok(row_to_stat(&row))
    }

    pub async fn get_parent(&self, fileid: FileId) -> Result<ExtendedStat> {
        let child = self.get_stat_by_fileid(fileid).await?;
        self.get_stat_by_fileid(child.parent_fileid).await
    }

    pub async fn read_link(&self, fileid: FileId) -> Result<String> {
        let target: Option<String> = sqlx::query_scalar("SELECT target FROM symlinks WHERE fileid = $1")
            .bind(fileid.0)
            .fetch_optional(&self.pool)
            .await?;
        target.ok_or_else(|| DomeError::NotFound(format!("fileid {fileid} is not a symlink")))
    }

    /// Walks an absolute LFN component by component from root, handling
    /// `.`, `..`, and symlinks (16-level loop cap).
    pub async fn get_stat_by_lfn(&self, lfn: &str) -> Result<ExtendedStat> {
        if !lfn.starts_with('/') {
            return Err(DomeError::BadRequest(format!("lfn must be absolute: {lfn}")));
        }
        let mut cur = self.get_stat_by_fileid(ROOT_FILEID_ON_DISK).await?;
        let mut depth = 0u32;
        for comp in lfn.split('/').filter(|c| !c.is_empty()) {
            if comp == "." {
                continue;
            }
            if comp == ".." {
                cur = self.get_parent(cur.fileid).await.unwrap_or(cur);
                continue;
            }
            cur = self.get_stat_by_parent_fileid(cur.fileid, comp).await?;
            // Resolve intermediate symlinks.
            while cur.mode & crate::model::namespace::libc_s_ifmt::S_IFMT
                == crate::model::namespace::libc_s_ifmt::S_IFLNK
            {
                depth += 1;
                if depth > MAX_SYMLINK_DEPTH {
                    return Err(DomeError::Unprocessable(format!(
                        "symlink loop resolving {lfn}"
                    )));
                }
                let target = self.read_link(cur.fileid).await?;
                cur = if target.starts_with('/') {
                    Box::pin(self.get_stat_by_lfn(&target)).await?
                } else {
                    self.get_stat_by_parent_fileid(cur.parent_fileid, &target)
                        .await?
                };
            }
        }
        Ok(cur)
    }

    /// Inserts the `file_metadata` row and bumps the parent's `nlink`
    /// against an already-open transaction. Shared by `insert_entry`
    /// (which opens and commits its own transaction) and `symlink`
    /// (which needs the `symlinks` row insert in the same transaction).
    async fn insert_entry_in(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        fileid: FileId,
        parent: FileId,
        name: &str,
        mode: u32,
        uid: i64,
        gid: i64,
        t: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO file_metadata
               (fileid, parent_fileid, name, mode, uid, gid, size, nlink, atime, mtime, ctime, status, acl, xattrs)
               VALUES ($1, $2, $3, $4, $5, $6, 0, 1, $7, $7, $7, 0, '', '{}')"#,
        )
        .bind(fileid.0)
        .bind(parent.0)
        .bind(name)
        .bind(mode as i32)
        .bind(uid)
        .bind(gid)
        .bind(t)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                DomeError::Conflict(format!("{name} already exists"))
            }
            other => DomeError::from(other),
        })?;
        // Parent linkage: bump nlink and refresh mtime/ctime under the same transaction.
        sqlx::query("UPDATE file_metadata SET nlink = nlink + 1, mtime = $1, ctime = $1 WHERE fileid = $2")
            .bind(t)
            .bind(parent.0)
            .execute(&mut *tx)
            .await?;
        Ok(())
    }

    async fn insert_entry(
        &self,
        parent: FileId,
        name: &str,
        mode: u32,
        uid: i64,
        gid: i64,
    ) -> Result<ExtendedStat> {
        let fileid = self.allocate_fileid().await?;
        let t = now();
        let mut tx = self.pool.begin().await?;
        Self::insert_entry_in(&mut tx, fileid, parent, name, mode, uid, gid, t).await?;
        tx.commit().await?;
        self.get_stat_by_fileid(fileid).await
    }

    /// Creates a directory with the given mode under `parent`.
    pub async fn makedir(
        &self,
        parent: FileId,
        name: &str,
        mode: u32,
        uid: i64,
        gid: i64,
    ) -> Result<ExtendedStat> {
        self.insert_entry(parent, name, mode | crate::model::namespace::libc_s_ifmt::S_IFDIR, uid, gid)
            .await
    }

    /// Creates a regular file entry (no replica) under `parent`.
    pub async fn createfile(
        &self,
        parent: FileId,
        name: &str,
        mode: u32,
        uid: i64,
        gid: i64,
    ) -> Result<ExtendedStat> {
        self.insert_entry(parent, name, mode | crate::model::namespace::libc_s_ifmt::S_IFREG, uid, gid)
            .await
    }

    pub async fn symlink(
        &self,
        parent: FileId,
        name: &str,
        target: &str,
        uid: i64,
        gid: i64,
    ) -> Result<ExtendedStat> {
        let fileid = self.allocate_fileid().await?;
        let t = now();
        let mut tx = self.pool.begin().await?;
        Self::insert_entry_in(
            &mut tx,
            fileid,
            parent,
            name,
            0o777 | crate::model::namespace::libc_s_ifmt::S_IFLNK,
            uid,
            gid,
            t,
        )
        .await?;
        sqlx::query("INSERT INTO symlinks (fileid, target) VALUES ($1, $2)")
            .bind(fileid.0)
            .bind(target)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.get_stat_by_fileid(fileid).await
    }

    /// Ensures every directory component of `path` exists under `root`,
    /// creating missing ones with the given mode/uid/gid, returning the
    /// final directory's stat. Used by the put-placement engine's
    /// `mkdir -p` registration step.
    pub async fn mkdir_p(
        &self,
        root: FileId,
        path: &str,
        mode: u32,
        uid: i64,
        gid: i64,
    ) -> Result<ExtendedStat> {
        let mut cur = self.get_stat_by_fileid(root).await?;
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            cur = match self.get_stat_by_parent_fileid(cur.fileid, comp).await {
                Ok(existing) => existing,
                Err(DomeError::NotFound(_)) => self.makedir(cur.fileid, comp, mode, uid, gid).await?,
                Err(other) => return Err(other),
            };
        }
        Ok(cur)
    }

    /// Unlinks a non-directory entry. Directories must be empty
    /// (enforced by the `removedir` handler checking `nlink`).
    pub async fn unlink(&self, fileid: FileId) -> Result<()> {
        let stat = self.get_stat_by_fileid(fileid).await?;
        let t = now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM file_metadata WHERE fileid = $1")
            .bind(fileid.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE file_metadata SET nlink = GREATEST(nlink - 1, 0), mtime = $1, ctime = $1 WHERE fileid = $2")
            .bind(t)
            .bind(stat.parent_fileid.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Renames/moves an entry to a new parent/name; a plain rename
    /// within one directory and a cross-directory move are the same
    /// primitive here.
    pub async fn rename(&self, fileid: FileId, new_parent: FileId, new_name: &str) -> Result<()> {
        let stat = self.get_stat_by_fileid(fileid).await?;
        let t = now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE file_metadata SET parent_fileid = $1, name = $2, mtime = $3, ctime = $3 WHERE fileid = $4")
            .bind(new_parent.0)
            .bind(new_name)
            .bind(t)
            .bind(fileid.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                    DomeError::Conflict(format!("{new_name} already exists"))
                }
                other => DomeError::from(other),
            })?;
        if new_parent != stat.parent_fileid {
            sqlx::query("UPDATE file_metadata SET nlink = nlink + 1, mtime = $1, ctime = $1 WHERE fileid = $2")
                .bind(t)
                .bind(new_parent.0)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE file_metadata SET nlink = GREATEST(nlink - 1, 0), mtime = $1, ctime = $1 WHERE fileid = $2")
                .bind(t)
                .bind(stat.parent_fileid.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_size(&self, fileid: FileId, size: i64) -> Result<()> {
        sqlx::query("UPDATE file_metadata SET size = $1, mtime = $2 WHERE fileid = $3")
            .bind(size)
            .bind(now())
            .bind(fileid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_mode(&self, fileid: FileId, mode: u32) -> Result<()> {
        let kept_type = {
            let stat = self.get_stat_by_fileid(fileid).await?;
            stat.mode & crate::model::namespace::libc_s_ifmt::S_IFMT
        };
        sqlx::query("UPDATE file_metadata SET mode = $1, ctime = $2 WHERE fileid = $3")
            .bind((mode & 0o7777 | kept_type) as i32)
            .bind(now())
            .bind(fileid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_owner(&self, fileid: FileId, uid: i64, gid: i64) -> Result<()> {
        sqlx::query("UPDATE file_metadata SET uid = $1, gid = $2, ctime = $3 WHERE fileid = $4")
            .bind(uid)
            .bind(gid)
            .bind(now())
            .bind(fileid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sets the legacy short checksum fields on the LFN entry itself
    /// (as opposed to on a replica).
    pub async fn set_checksum(&self, fileid: FileId, csumtype: &str, csumvalue: &str) -> Result<()> {
        sqlx::query("UPDATE file_metadata SET csumtype = $1, csumvalue = $2, ctime = $3 WHERE fileid = $4")
            .bind(csumtype)
            .bind(csumvalue)
            .bind(now())
            .bind(fileid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_extended_attributes(&self, fileid: FileId, xattrs_json: &str) -> Result<()> {
        sqlx::query("UPDATE file_metadata SET xattrs = $1, ctime = $2 WHERE fileid = $3")
            .bind(xattrs_json)
            .bind(now())
            .bind(fileid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn utime(&self, fileid: FileId, atime: i64, mtime: i64) -> Result<()> {
        sqlx::query("UPDATE file_metadata SET atime = $1, mtime = $2 WHERE fileid = $3")
            .bind(atime)
            .bind(mtime)
            .bind(fileid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_acl(&self, fileid: FileId, acl: &str) -> Result<()> {
        sqlx::query("UPDATE file_metadata SET acl = $1, ctime = $2 WHERE fileid = $3")
            .bind(acl)
            .bind(now())
            .bind(fileid.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Streaming directory listing, ordered by `name ASC`.
    /// `opendir`/`readdirx`/`closedir` collapse naturally into one call
    /// over an async stream in Rust; there is no separate handle to leak.
    pub async fn readdir(&self, dir: FileId) -> Result<Vec<ExtendedStat>> {
        let rows = sqlx::query("SELECT * FROM file_metadata WHERE parent_fileid = $1 ORDER BY name ASC")
            .bind(dir.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_stat).collect())
    }
}

/// The root entry's own fileid as seeded by the migration. Distinct
/// from `ROOT_FILEID` (0), which is the *parent pointer* root entries
/// carry per the namespace invariant.
const ROOT_FILEID_ON_DISK: FileId = FileId(1);
