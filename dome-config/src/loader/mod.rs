pub mod error;

use crate::constants::*;
use crate::models::raw::FileConfig;
use crate::models::{
    AuthConfig, Config, ConfigMetadata, DbConfig, DiskChecksumConfig, DiskConfig,
    DiskFilepullerConfig, FcgiConfig, GlbConfig, HeadConfig, HeadFilepullerConfig, HeadnodeConfig,
    MdcacheConfig, NodeRole, PutConfig, QueueConfig, RestclientConfig, TaskConfig,
};
use crate::util::*;
use error::ConfigLoadError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loads `dome`'s configuration: a TOML file for the stable, checked-in
/// settings, an optional `.env` for secrets and per-deployment
/// overrides, and environment variables on top of both. Environment
/// variables always win, matching the precedence order most daemons in
/// this family use.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Loads `.env` (if present) via `dotenvy`, then the TOML file (if
    /// a path was given or `DOME_CONFIG` is set), then resolves
    /// environment-variable overrides and defaults.
    pub fn load(self) -> Result<Config, ConfigLoadError> {
        let env_file_loaded = dotenvy::dotenv().is_ok();

        let config_path = self
            .config_path
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));

        let file = match &config_path {
            Some(path) => read_file_config(path)?,
            None => FileConfig::default(),
        };

        let config = resolve(file, config_path.clone(), env_file_loaded)?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Fully-defaulted config for a given role, with no TOML file or
/// environment overrides applied. Exists for integration tests that
/// need an `AppState` without writing a config file to disk; disk-role
/// defaults fill in a placeholder `domeurl` since that field is
/// otherwise required at load time.
pub fn defaults_for_role(role: NodeRole) -> Config {
    let mut file = FileConfig::default();
    file.glb.role = Some(match role {
        NodeRole::Head => "head",
        NodeRole::Disk => "disk",
    }.to_string());
    if role == NodeRole::Disk {
        file.disk.headnode.domeurl = Some("https://head.example.org/domehead".to_string());
    }
    resolve(file, None, false).expect("defaulted config always resolves")
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigLoadError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn resolve(
    file: FileConfig,
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
) -> Result<Config, ConfigLoadError> {
    let role_str = env_str("DOME_GLB_ROLE")
        .or(file.glb.role)
        .unwrap_or_else(|| "head".to_string());
    let role = NodeRole::parse(&role_str).ok_or_else(|| ConfigLoadError::InvalidValue {
        key: "glb.role".into(),
        message: format!("expected \"head\" or \"disk\", got {role_str:?}"),
    })?;

    let glb = GlbConfig {
        role,
        hostname: env_str("DOME_GLB_HOSTNAME")
            .or(file.glb.hostname)
            .or_else(|| env_str("HOSTNAME"))
            .unwrap_or_else(|| "localhost".to_string()),
        workers: env_u32("DOME_GLB_WORKERS").or(file.glb.workers).unwrap_or(DEFAULT_WORKERS),
        tickfreq: Duration::from_secs(
            env_duration_secs("DOME_GLB_TICKFREQ")
                .map(|d| d.as_secs())
                .or(file.glb.tickfreq)
                .unwrap_or(DEFAULT_TICKFREQ_SECS),
        ),
        fcgi: FcgiConfig {
            listenport: env_u16("DOME_GLB_FCGI_LISTENPORT")
                .or(file.glb.fcgi.listenport)
                .unwrap_or(DEFAULT_FCGI_LISTENPORT),
        },
        auth: AuthConfig {
            authorize_dn: env_csv("DOME_GLB_AUTH_AUTHORIZE_DN").unwrap_or(file.glb.auth.authorize_dn),
        },
        restclient: RestclientConfig {
            conn_timeout: Duration::from_secs(
                file.glb.restclient.conn_timeout.unwrap_or(DEFAULT_RESTCLIENT_CONN_TIMEOUT_SECS),
            ),
            ops_timeout: Duration::from_secs(
                file.glb.restclient.ops_timeout.unwrap_or(DEFAULT_RESTCLIENT_OPS_TIMEOUT_SECS),
            ),
            ssl_check: env_bool("DOME_GLB_RESTCLIENT_SSL_CHECK")
                .or(file.glb.restclient.ssl_check)
                .unwrap_or(DEFAULT_RESTCLIENT_SSL_CHECK),
            ca_path: file.glb.restclient.ca_path,
            cli_private_key: file.glb.restclient.cli_private_key,
            cli_certificate: file.glb.restclient.cli_certificate,
            poolsize: file.glb.restclient.poolsize.unwrap_or(DEFAULT_RESTCLIENT_POOLSIZE),
        },
        reloadfsquotas: Duration::from_secs(file.glb.reloadfsquotas.unwrap_or(DEFAULT_RELOADFSQUOTAS_SECS)),
        fscheckinterval: Duration::from_secs(file.glb.fscheckinterval.unwrap_or(DEFAULT_FSCHECKINTERVAL_SECS)),
        task: TaskConfig {
            maxrunningtime: Duration::from_secs(
                file.glb.task.maxrunningtime.unwrap_or(DEFAULT_TASK_MAXRUNNINGTIME_SECS),
            ),
            purgetime: Duration::from_secs(file.glb.task.purgetime.unwrap_or(DEFAULT_TASK_PURGETIME_SECS)),
        },
        put: PutConfig {
            minfreespace_mb: env_i64("DOME_GLB_PUT_MINFREESPACE_MB")
                .or(file.glb.put.minfreespace_mb)
                .unwrap_or(DEFAULT_PUT_MINFREESPACE_MB),
        },
        dirspacereportdepth: file.glb.dirspacereportdepth.unwrap_or(DEFAULT_DIRSPACEREPORTDEPTH),
    };

    let password = env_str(ENV_DB_PASSWORD).or(file.head.db.password).or(
        file.head
            .db
            .password_file
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .map(|s| s.trim().to_string()),
    );

    let head = HeadConfig {
        db: DbConfig {
            host: env_str("DOME_HEAD_DB_HOST").or(file.head.db.host).unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            user: env_str("DOME_HEAD_DB_USER").or(file.head.db.user).unwrap_or_else(|| "dome".to_string()),
            password,
            port: env_u16("DOME_HEAD_DB_PORT").or(file.head.db.port).unwrap_or(DEFAULT_DB_PORT),
            poolsz: file.head.db.poolsz.unwrap_or(DEFAULT_DB_POOLSZ),
            dbname: file.head.db.dbname.unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
        },
        checksum: QueueConfig {
            maxtotal: file.head.checksum.maxtotal.unwrap_or(DEFAULT_CHECKSUM_MAXTOTAL),
            maxpernode: file.head.checksum.maxpernode.unwrap_or(DEFAULT_CHECKSUM_MAXPERNODE),
            qtmout: file.head.checksum.qtmout.unwrap_or(DEFAULT_CHECKSUM_QTMOUT),
        },
        filepulls: QueueConfig {
            maxtotal: file.head.filepulls.maxtotal.unwrap_or(DEFAULT_FILEPULLS_MAXTOTAL),
            maxpernode: file.head.filepulls.maxpernode.unwrap_or(DEFAULT_FILEPULLS_MAXPERNODE),
            qtmout: file.head.filepulls.qtmout.unwrap_or(DEFAULT_FILEPULLS_QTMOUT),
        },
        filepuller: HeadFilepullerConfig {
            stathook: file.head.filepuller.stathook,
            stathooktimeout: Duration::from_secs(
                file.head.filepuller.stathooktimeout.unwrap_or(DEFAULT_STATHOOKTIMEOUT_SECS),
            ),
        },
    };

    let disk = DiskConfig {
        headnode: HeadnodeConfig {
            domeurl: env_str("DOME_DISK_HEADNODE_DOMEURL").or(file.disk.headnode.domeurl),
        },
        filepuller: DiskFilepullerConfig {
            pullhook: file.disk.filepuller.pullhook,
        },
        checksum: DiskChecksumConfig {
            binary: file.disk.checksum.binary,
        },
    };

    if role == NodeRole::Disk && disk.headnode.domeurl.is_none() {
        return Err(ConfigLoadError::Missing("disk.headnode.domeurl".into()));
    }

    let mdcache = MdcacheConfig {
        maxitems: file.mdcache.maxitems.unwrap_or(DEFAULT_MDCACHE_MAXITEMS),
        itemttl: file.mdcache.itemttl.unwrap_or(DEFAULT_MDCACHE_ITEMTTL_SECS),
        itemmaxttl: file.mdcache.itemmaxttl.unwrap_or(DEFAULT_MDCACHE_ITEMMAXTTL_SECS),
        itemttl_negative: file.mdcache.itemttl_negative.unwrap_or(DEFAULT_MDCACHE_ITEMTTL_NEGATIVE_SECS),
    };

    Ok(Config {
        glb,
        head,
        disk,
        mdcache,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_to_head_role_with_expected_values() {
        let cfg = resolve(FileConfig::default(), None, false).unwrap();
        assert_eq!(cfg.glb.role, NodeRole::Head);
        assert_eq!(cfg.glb.workers, DEFAULT_WORKERS);
        assert_eq!(cfg.glb.put.minfreespace_mb, DEFAULT_PUT_MINFREESPACE_MB);
        assert_eq!(cfg.head.db.dbname, DEFAULT_DB_NAME);
    }

    #[test]
    fn disk_role_requires_domeurl() {
        let mut file = FileConfig::default();
        file.glb.role = Some("disk".into());
        let err = resolve(file, None, false).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Missing(_)));
    }

    #[test]
    fn loads_toml_file_and_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dome.toml");
        std::fs::write(
            &path,
            r#"
            [glb]
            role = "head"
            workers = 42

            [glb.put]
            minfreespace_mb = 8192
            "#,
        )
        .unwrap();
        let cfg = ConfigLoader::new().with_config_path(&path).load().unwrap();
        assert_eq!(cfg.glb.workers, 42);
        assert_eq!(cfg.glb.put.minfreespace_mb, 8192);
    }
}
