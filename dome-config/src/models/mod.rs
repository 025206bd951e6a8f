pub mod raw;

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Head,
    Disk,
}

impl NodeRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "head" => Some(Self::Head),
            "disk" => Some(Self::Disk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub glb: GlbConfig,
    pub head: HeadConfig,
    pub disk: DiskConfig,
    pub mdcache: MdcacheConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct GlbConfig {
    pub role: NodeRole,
    /// This node's own hostname, as it appears in the `fs` table's
    /// `server` column (head) or is reported to the head node in
    /// callbacks (disk).
    pub hostname: String,
    pub workers: u32,
    pub tickfreq: Duration,
    pub fcgi: FcgiConfig,
    pub auth: AuthConfig,
    pub restclient: RestclientConfig,
    pub reloadfsquotas: Duration,
    pub fscheckinterval: Duration,
    pub task: TaskConfig,
    pub put: PutConfig,
    pub dirspacereportdepth: u32,
}

#[derive(Debug, Clone)]
pub struct FcgiConfig {
    pub listenport: u16,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// DNs allowed to call privileged `dome_*` verbs; empty means every
    /// authenticated caller is treated as an ordinary user (no
    /// built-in superuser DN).
    pub authorize_dn: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RestclientConfig {
    pub conn_timeout: Duration,
    pub ops_timeout: Duration,
    pub ssl_check: bool,
    pub ca_path: Option<String>,
    pub cli_private_key: Option<String>,
    pub cli_certificate: Option<String>,
    pub poolsize: u32,
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub maxrunningtime: Duration,
    pub purgetime: Duration,
}

#[derive(Debug, Clone)]
pub struct PutConfig {
    pub minfreespace_mb: i64,
}

#[derive(Debug, Clone)]
pub struct HeadConfig {
    pub db: DbConfig,
    pub checksum: QueueConfig,
    pub filepulls: QueueConfig,
    pub filepuller: HeadFilepullerConfig,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub port: u16,
    pub poolsz: u32,
    pub dbname: String,
}

impl DbConfig {
    /// Composes a `postgres://` connection URL from the discrete
    /// fields, percent-encoding the password if present.
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) if !pw.is_empty() => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user, pw, self.host, self.port, self.dbname
            ),
            _ => format!(
                "postgres://{}@{}:{}/{}",
                self.user, self.host, self.port, self.dbname
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub maxtotal: u32,
    pub maxpernode: u32,
    pub qtmout: i64,
}

#[derive(Debug, Clone)]
pub struct HeadFilepullerConfig {
    pub stathook: Option<String>,
    pub stathooktimeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DiskConfig {
    pub headnode: HeadnodeConfig,
    pub filepuller: DiskFilepullerConfig,
    pub checksum: DiskChecksumConfig,
}

#[derive(Debug, Clone, Default)]
pub struct HeadnodeConfig {
    pub domeurl: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DiskFilepullerConfig {
    pub pullhook: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DiskChecksumConfig {
    /// Path to the checksum binary invoked as `<binary> <type> <pfn>`.
    pub binary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MdcacheConfig {
    pub maxitems: usize,
    pub itemttl: i64,
    pub itemmaxttl: i64,
    pub itemttl_negative: i64,
}

/// Provenance information, not part of the behavioral configuration
/// itself — useful for a startup log line and for `dome-server`'s
/// `/dome_getstatinfo`-adjacent diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<std::path::PathBuf>,
    pub env_file_loaded: bool,
}
