//! CRUD over pools, filesystems, quota tokens, users, and groups.
//! These back the Status reload (`ST::tick`) and the `dome_*` CRUD
//! verbs (addpool, modifyfs, setquotatoken, newuser, …).

use super::connection::RelationalAdapter;
use crate::error::{DomeError, Result};
use crate::model::{
    Filesystem, FsStaticStatus, Group, GroupId, Pool, PoolType, QuotaToken, User, UserId,
};
use sqlx::Row;

fn pool_type_code(t: PoolType) -> &'static str {
    match t {
        PoolType::Permanent => "P",
        PoolType::Volatile => "V",
    }
}

fn pool_type_from_code(c: &str) -> PoolType {
    if c == "V" {
        PoolType::Volatile
    } else {
        PoolType::Permanent
    }
}

fn fs_status_code(s: FsStaticStatus) -> &'static str {
    match s {
        FsStaticStatus::Active => "Active",
        FsStaticStatus::Disabled => "Disabled",
        FsStaticStatus::ReadOnly => "ReadOnly",
    }
}

fn fs_status_from_code(c: &str) -> FsStaticStatus {
    match c {
        "Disabled" => FsStaticStatus::Disabled,
        "ReadOnly" => FsStaticStatus::ReadOnly,
        _ => FsStaticStatus::Active,
    }
}

impl RelationalAdapter {
    pub async fn list_pools(&self) -> Result<Vec<Pool>> {
        let rows = sqlx::query("SELECT * FROM pool ORDER BY poolname ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Pool {
                poolname: r.get("poolname"),
                defsize: r.get("defsize"),
                stype: pool_type_from_code(r.get::<String, _>("stype").as_str()),
            })
            .collect())
    }

    pub async fn add_pool(&self, poolname: &str, defsize: i64, stype: PoolType) -> Result<()> {
        sqlx::query("INSERT INTO pool (poolname, defsize, stype) VALUES ($1, $2, $3)")
            .bind(poolname)
            .bind(defsize)
            .bind(pool_type_code(stype))
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                    DomeError::Conflict(format!("pool {poolname} already exists"))
                }
                other => DomeError::from(other),
            })?;
        Ok(())
    }

    pub async fn modify_pool(&self, poolname: &str, defsize: Option<i64>, stype: Option<PoolType>) -> Result<()> {
        let rows = sqlx::query(
            "UPDATE pool SET defsize = COALESCE($1, defsize), stype = COALESCE($2, stype) WHERE poolname = $3",
        )
        .bind(defsize)
        .bind(stype.map(pool_type_code))
        .bind(poolname)
        .execute(&self.pool)
        .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("pool {poolname}")));
        }
        Ok(())
    }

    pub async fn rm_pool(&self, poolname: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM pool WHERE poolname = $1")
            .bind(poolname)
            .execute(&self.pool)
            .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("pool {poolname}")));
        }
        Ok(())
    }

    pub async fn list_filesystems(&self) -> Result<Vec<Filesystem>> {
        let rows = sqlx::query("SELECT * FROM fs ORDER BY server ASC, fs ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Filesystem {
                server: r.get("server"),
                fs: r.get("fs"),
                poolname: r.get("poolname"),
                status: fs_status_from_code(r.get::<String, _>("status").as_str()),
                activitystatus: None,
                freespace: r.get("freespace"),
                physicalsize: r.get("physicalsize"),
            })
            .collect())
    }

    pub async fn add_fs_to_pool(&self, server: &str, fs: &str, poolname: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO fs (server, fs, poolname, status, freespace, physicalsize) VALUES ($1, $2, $3, 'Active', 0, 0)",
        )
        .bind(server)
        .bind(fs)
        .bind(poolname)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                DomeError::Conflict(format!("filesystem {server}:{fs} already exists"))
            }
            other => DomeError::from(other),
        })?;
        Ok(())
    }

    pub async fn modify_fs(&self, server: &str, fs: &str, status: Option<FsStaticStatus>, poolname: Option<&str>) -> Result<()> {
        let rows = sqlx::query(
            "UPDATE fs SET status = COALESCE($1, status), poolname = COALESCE($2, poolname) WHERE server = $3 AND fs = $4",
        )
        .bind(status.map(fs_status_code))
        .bind(poolname)
        .bind(server)
        .bind(fs)
        .execute(&self.pool)
        .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("filesystem {server}:{fs}")));
        }
        Ok(())
    }

    pub async fn rm_fs(&self, server: &str, fs: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM fs WHERE server = $1 AND fs = $2")
            .bind(server)
            .bind(fs)
            .execute(&self.pool)
            .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("filesystem {server}:{fs}")));
        }
        Ok(())
    }

    pub async fn update_fs_space(&self, server: &str, fs: &str, freespace: i64, physicalsize: i64) -> Result<()> {
        sqlx::query("UPDATE fs SET freespace = $1, physicalsize = $2 WHERE server = $3 AND fs = $4")
            .bind(freespace)
            .bind(physicalsize)
            .bind(server)
            .bind(fs)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_quota_tokens(&self) -> Result<Vec<QuotaToken>> {
        let rows = sqlx::query("SELECT * FROM space_reserv ORDER BY path ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_quota_token).collect())
    }

    pub async fn set_quota_token(&self, token: &QuotaToken) -> Result<()> {
        let groups = token
            .groupsforwrite
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(",");
        sqlx::query(
            r#"INSERT INTO space_reserv (s_token, u_token, poolname, path, t_space, u_space, groupsforwrite, s_uid, s_gid)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(&token.s_token)
        .bind(&token.u_token)
        .bind(&token.poolname)
        .bind(&token.path)
        .bind(token.t_space)
        .bind(token.u_space)
        .bind(groups)
        .bind(token.s_uid)
        .bind(token.s_gid)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                DomeError::Conflict(format!("quota token for {} on {} already exists", token.path, token.poolname))
            }
            other => DomeError::from(other),
        })?;
        Ok(())
    }

    pub async fn get_quota_token(&self, s_token: &str) -> Result<QuotaToken> {
        let row = sqlx::query("SELECT * FROM space_reserv WHERE s_token = $1")
            .bind(s_token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("quota token {s_token}")))?;
        Ok(row_to_quota_token(&row))
    }

    pub async fn mod_quota_token(&self, s_token: &str, t_space: Option<i64>, groupsforwrite: Option<Vec<i64>>) -> Result<()> {
        let groups = groupsforwrite
            .map(|g| g.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(","));
        let rows = sqlx::query(
            "UPDATE space_reserv SET t_space = COALESCE($1, t_space), groupsforwrite = COALESCE($2, groupsforwrite) WHERE s_token = $3",
        )
        .bind(t_space)
        .bind(groups)
        .bind(s_token)
        .execute(&self.pool)
        .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("quota token {s_token}")));
        }
        Ok(())
    }

    pub async fn del_quota_token(&self, s_token: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM space_reserv WHERE s_token = $1")
            .bind(s_token)
            .execute(&self.pool)
            .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("quota token {s_token}")));
        }
        Ok(())
    }

    /// Adjusts `u_space` by `delta` bytes (positive = consume, negative
    /// = free), the legacy per-token accounting column kept for interop
    /// with existing quota dashboards.
    pub async fn addto_quotatoken_uspace(&self, setname: &str, delta: i64) -> Result<()> {
        sqlx::query("UPDATE space_reserv SET u_space = GREATEST(u_space + $1, 0) WHERE u_token = $2")
            .bind(delta)
            .bind(setname)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, username: &str) -> Result<User> {
        let row = sqlx::query("SELECT * FROM user_metadata WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("user {username}")))?;
        Ok(User {
            userid: UserId(row.get("userid")),
            username: row.get("username"),
            banned: row.get("banned"),
            xattrs: row.get("xattrs"),
        })
    }

    /// Creates a user record, or returns the existing one — used for
    /// auto-provisioning unknown DNs during authorization.
    pub async fn new_user_or_get(&self, username: &str) -> Result<User> {
        let row = sqlx::query(
            r#"INSERT INTO user_metadata (username, banned, xattrs) VALUES ($1, false, '{}')
               ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
               RETURNING *"#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(User {
            userid: UserId(row.get("userid")),
            username: row.get("username"),
            banned: row.get("banned"),
            xattrs: row.get("xattrs"),
        })
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM user_metadata WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("user {username}")));
        }
        Ok(())
    }

    pub async fn update_user_banned(&self, username: &str, banned: bool) -> Result<()> {
        let rows = sqlx::query("UPDATE user_metadata SET banned = $1 WHERE username = $2")
            .bind(banned)
            .bind(username)
            .execute(&self.pool)
            .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("user {username}")));
        }
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM user_metadata ORDER BY username ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| User {
                userid: UserId(r.get("userid")),
                username: r.get("username"),
                banned: r.get("banned"),
                xattrs: r.get("xattrs"),
            })
            .collect())
    }

    pub async fn get_group(&self, groupname: &str) -> Result<Group> {
        let row = sqlx::query("SELECT * FROM grp WHERE groupname = $1")
            .bind(groupname)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomeError::NotFound(format!("group {groupname}")))?;
        Ok(Group {
            groupid: GroupId(row.get("groupid")),
            groupname: row.get("groupname"),
            banned: row.get("banned"),
            xattrs: row.get("xattrs"),
        })
    }

    pub async fn new_group(&self, groupname: &str) -> Result<Group> {
        let row = sqlx::query(
            "INSERT INTO grp (groupname, banned, xattrs) VALUES ($1, false, '{}') RETURNING *",
        )
        .bind(groupname)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                DomeError::Conflict(format!("group {groupname} already exists"))
            }
            other => DomeError::from(other),
        })?;
        Ok(Group {
            groupid: GroupId(row.get("groupid")),
            groupname: row.get("groupname"),
            banned: row.get("banned"),
            xattrs: row.get("xattrs"),
        })
    }

    pub async fn update_group_banned(&self, groupname: &str, banned: bool) -> Result<()> {
        let rows = sqlx::query("UPDATE grp SET banned = $1 WHERE groupname = $2")
            .bind(banned)
            .bind(groupname)
            .execute(&self.pool)
            .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("group {groupname}")));
        }
        Ok(())
    }

    pub async fn delete_group(&self, groupname: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM grp WHERE groupname = $1")
            .bind(groupname)
            .execute(&self.pool)
            .await?;
        if rows.rows_affected() == 0 {
            return Err(DomeError::NotFound(format!("group {groupname}")));
        }
        Ok(())
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query("SELECT * FROM grp ORDER BY groupname ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Group {
                groupid: GroupId(r.get("groupid")),
                groupname: r.get("groupname"),
                banned: r.get("banned"),
                xattrs: r.get("xattrs"),
            })
            .collect())
    }
}

fn row_to_quota_token(row: &sqlx::postgres::PgRow) -> QuotaToken {
    let groups_raw: String = row.get("groupsforwrite");
    let groupsforwrite = groups_raw
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect();
    QuotaToken {
        s_token: row.get("s_token"),
        u_token: row.get("u_token"),
        poolname: row.get("poolname"),
        path: row.get("path"),
        t_space: row.get("t_space"),
        u_space: row.get("u_space"),
        groupsforwrite,
        s_uid: row.get("s_uid"),
        s_gid: row.get("s_gid"),
    }
}
