//! Replica primitives: add/update/delete, lookup by id/rfn/fileid.

use super::connection::RelationalAdapter;
use crate::error::{DomeError, Result};
use crate::model::{FileId, Replica, ReplicaId, ReplicaStatus, ReplicaType};
use sqlx::Row;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn status_code(s: ReplicaStatus) -> &'static str {
    match s {
        ReplicaStatus::Available => "A",
        ReplicaStatus::BeingPopulated => "P",
        ReplicaStatus::ToBeDeleted => "D",
    }
}

fn status_from_code(c: &str) -> ReplicaStatus {
    match c {
        "A" => ReplicaStatus::Available,
        "D" => ReplicaStatus::ToBeDeleted,
        _ => ReplicaStatus::BeingPopulated,
    }
}

fn type_code(t: ReplicaType) -> &'static str {
    match t {
        ReplicaType::Volatile => "V",
        ReplicaType::Permanent => "P",
        ReplicaType::LogicalOnly => "L",
    }
}

fn type_from_code(c: &str) -> ReplicaType {
    match c {
        "V" => ReplicaType::Volatile,
        "L" => ReplicaType::LogicalOnly,
        _ => ReplicaType::Permanent,
    }
}

fn row_to_replica(row: &sqlx::postgres::PgRow) -> Replica {
    Replica {
        replicaid: ReplicaId(row.get("replicaid")),
        fileid: FileId(row.get("fileid")),
        server: row.get("server"),
        pfn: row.get("pfn"),
        pool: row.get("pool"),
        filesystem: row.get("filesystem"),
        setname: row.get("setname"),
        status: status_from_code(row.get::<String, _>("status").as_str()),
        type_: type_from_code(row.get::<String, _>("type").as_str()),
        atime: row.get("atime"),
        ptime: row.get("ptime"),
        ltime: row.get("ltime"),
        nbaccesses: row.get("nbaccesses"),
        xattrs: row.get("xattrs"),
        checksum_type: row.try_get("checksum_type").ok(),
        checksum_value: row.try_get("checksum_value").ok(),
    }
}

impl RelationalAdapter {
    /// Inserts a new replica, always in `BeingPopulated` at creation
    /// time per the put-placement engine's registration step.
    pub async fn add_replica(
        &self,
        fileid: FileId,
        server: &str,
        pfn: &str,
        pool: &str,
        filesystem: &str,
        setname: &str,
        type_: ReplicaType,
    ) -> Result<Replica> {
        let t = now();
        let row = sqlx::query(
            r#"INSERT INTO file_replica
               (fileid, server, pfn, pool, filesystem, setname, status, type, atime, ptime, ltime, nbaccesses, xattrs)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $9, 0, '{}')
               RETURNING *"#,
        )
        .bind(fileid.0)
        .bind(server)
        .bind(pfn)
        .bind(pool)
        .bind(filesystem)
        .bind(setname)
        .bind(status_code(ReplicaStatus::BeingPopulated))
        .bind(type_code(type_))
        .bind(t)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                DomeError::Conflict(format!("replica {server}:{pfn} already exists"))
            }
            other => DomeError::from(other),
        })?;
        Ok(row_to_replica(&row))
    }

    pub async fn update_replica(
        &self,
        replicaid: ReplicaId,
        status: ReplicaStatus,
        checksum_type: Option<&str>,
        checksum_value: Option<&str>,
    ) -> Result<Replica> {
        let row = sqlx::query(
            r#"UPDATE file_replica SET status = $1, checksum_type = COALESCE($2, checksum_type),
               checksum_value = COALESCE($3, checksum_value), ltime = $4
               WHERE replicaid = $5 RETURNING *"#,
        )
        .bind(status_code(status))
        .bind(checksum_type)
        .bind(checksum_value)
        .bind(now())
        .bind(replicaid.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DomeError::NotFound(format!("replica {replicaid}")))?;
        Ok(row_to_replica(&row))
    }

    pub async fn del_replica(&self, replicaid: ReplicaId) -> Result<Replica> {
        let row = sqlx::query("DELETE FROM file_replica WHERE replicaid = $1 RETURNING *")
            .bind(replicaid.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("replica {replicaid}")))?;
        Ok(row_to_replica(&row))
    }

    pub async fn get_replicas(&self, fileid: FileId) -> Result<Vec<Replica>> {
        let rows = sqlx::query("SELECT * FROM file_replica WHERE fileid = $1 ORDER BY replicaid ASC")
            .bind(fileid.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_replica).collect())
    }

    pub async fn get_replica_by_id(&self, replicaid: ReplicaId) -> Result<Replica> {
        let row = sqlx::query("SELECT * FROM file_replica WHERE replicaid = $1")
            .bind(replicaid.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("replica {replicaid}")))?;
        Ok(row_to_replica(&row))
    }

    pub async fn get_replica_by_rfn(&self, server: &str, pfn: &str) -> Result<Replica> {
        let row = sqlx::query("SELECT * FROM file_replica WHERE server = $1 AND pfn = $2")
            .bind(server)
            .bind(pfn)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("replica {server}:{pfn}")))?;
        Ok(row_to_replica(&row))
    }

    /// Number of non-`LogicalOnly` replicas a file has, used to
    /// validate the `nlink` invariant in tests.
    pub async fn count_physical_replicas(&self, fileid: FileId) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT count(*) FROM file_replica WHERE fileid = $1 AND type <> 'L'")
            .bind(fileid.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
