//! Hardcoded defaults for every recognized configuration key.

pub const DEFAULT_WORKERS: u32 = 300;
pub const DEFAULT_TICKFREQ_SECS: u64 = 10;
pub const DEFAULT_FCGI_LISTENPORT: u16 = 0;

pub const DEFAULT_RESTCLIENT_CONN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RESTCLIENT_OPS_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RESTCLIENT_SSL_CHECK: bool = true;
pub const DEFAULT_RESTCLIENT_POOLSIZE: u32 = 16;

pub const DEFAULT_RELOADFSQUOTAS_SECS: u64 = 60;
pub const DEFAULT_FSCHECKINTERVAL_SECS: u64 = 300;

pub const DEFAULT_TASK_MAXRUNNINGTIME_SECS: u64 = 3600;
pub const DEFAULT_TASK_PURGETIME_SECS: u64 = 600;

pub const DEFAULT_PUT_MINFREESPACE_MB: i64 = 4096;
pub const DEFAULT_DIRSPACEREPORTDEPTH: u32 = 6;

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_POOLSZ: u32 = 10;
pub const DEFAULT_DB_NAME: &str = "dome";

pub const DEFAULT_CHECKSUM_MAXTOTAL: u32 = 10;
pub const DEFAULT_CHECKSUM_MAXPERNODE: u32 = 2;
pub const DEFAULT_CHECKSUM_QTMOUT: i64 = 180;

pub const DEFAULT_FILEPULLS_MAXTOTAL: u32 = 10;
pub const DEFAULT_FILEPULLS_MAXPERNODE: u32 = 2;
pub const DEFAULT_FILEPULLS_QTMOUT: i64 = 180;

pub const DEFAULT_STATHOOKTIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MDCACHE_MAXITEMS: usize = 1_000_000;
pub const DEFAULT_MDCACHE_ITEMTTL_SECS: i64 = 60;
pub const DEFAULT_MDCACHE_ITEMMAXTTL_SECS: i64 = 300;
pub const DEFAULT_MDCACHE_ITEMTTL_NEGATIVE_SECS: i64 = 10;

/// Environment variable carrying the database password when it should
/// not be written to the TOML file (mirrors `DATABASE_URL`-style
/// secret injection).
pub const ENV_DB_PASSWORD: &str = "DOME_DB_PASSWORD";
pub const ENV_CONFIG_PATH: &str = "DOME_CONFIG";
