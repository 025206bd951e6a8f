//! Raw configuration as read from a TOML file: every field optional,
//! mirroring the on-disk shape exactly so a partially-specified file is
//! always valid. `dome_config::loader` overlays environment variables
//! on top of this and fills in defaults to produce a [`super::Config`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub glb: FileGlbConfig,
    #[serde(default)]
    pub head: FileHeadConfig,
    #[serde(default)]
    pub disk: FileDiskConfig,
    #[serde(default)]
    pub mdcache: FileMdcacheConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileGlbConfig {
    pub role: Option<String>,
    pub hostname: Option<String>,
    pub workers: Option<u32>,
    pub tickfreq: Option<u64>,
    pub reloadfsquotas: Option<u64>,
    pub fscheckinterval: Option<u64>,
    pub dirspacereportdepth: Option<u32>,
    #[serde(default)]
    pub fcgi: FileFcgiConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default)]
    pub restclient: FileRestclientConfig,
    #[serde(default)]
    pub task: FileTaskConfig,
    #[serde(default)]
    pub put: FilePutConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileFcgiConfig {
    pub listenport: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(default)]
    pub authorize_dn: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRestclientConfig {
    pub conn_timeout: Option<u64>,
    pub ops_timeout: Option<u64>,
    pub ssl_check: Option<bool>,
    pub ca_path: Option<String>,
    pub cli_private_key: Option<String>,
    pub cli_certificate: Option<String>,
    pub poolsize: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTaskConfig {
    pub maxrunningtime: Option<u64>,
    pub purgetime: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePutConfig {
    pub minfreespace_mb: Option<i64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileHeadConfig {
    #[serde(default)]
    pub db: FileDbConfig,
    #[serde(default)]
    pub checksum: FileQueueConfig,
    #[serde(default)]
    pub filepulls: FileQueueConfig,
    #[serde(default)]
    pub filepuller: FileHeadFilepullerConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDbConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub password_file: Option<String>,
    pub port: Option<u16>,
    pub poolsz: Option<u32>,
    pub dbname: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileQueueConfig {
    pub maxtotal: Option<u32>,
    pub maxpernode: Option<u32>,
    pub qtmout: Option<i64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileHeadFilepullerConfig {
    pub stathook: Option<String>,
    pub stathooktimeout: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDiskConfig {
    #[serde(default)]
    pub headnode: FileHeadnodeConfig,
    #[serde(default)]
    pub filepuller: FileDiskFilepullerConfig,
    #[serde(default)]
    pub checksum: FileDiskChecksumConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileHeadnodeConfig {
    pub domeurl: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDiskFilepullerConfig {
    pub pullhook: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDiskChecksumConfig {
    pub binary: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileMdcacheConfig {
    pub maxitems: Option<usize>,
    pub itemttl: Option<i64>,
    pub itemmaxttl: Option<i64>,
    pub itemttl_negative: Option<i64>,
}
