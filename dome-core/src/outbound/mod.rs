//! Outbound client pool (OCP): a process-wide, rustls-backed HTTP
//! client used for head-to-disk and head-to-head calls (space probes,
//! checksum/pull dispatch to a remote daemon, third-party copy
//! handshakes).

use crate::error::{DomeError, Result};
use reqwest::{Certificate, Client, Identity};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OutboundConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// PEM-encoded client certificate + key, concatenated, for mutual
    /// TLS against peer daemons that require it.
    pub client_identity_pem: Option<Vec<u8>>,
    pub extra_root_certs_pem: Vec<Vec<u8>>,
    pub danger_accept_invalid_certs: bool,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            client_identity_pem: None,
            extra_root_certs_pem: Vec::new(),
            danger_accept_invalid_certs: false,
        }
    }
}

/// Thin wrapper around a single `reqwest::Client`, built once at
/// startup and cloned cheaply (it's an `Arc` internally) into every
/// handler and ticker that needs to call out.
#[derive(Clone)]
pub struct OutboundPool {
    client: Client,
}

impl OutboundPool {
    pub fn new(cfg: &OutboundConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.request_timeout)
            .danger_accept_invalid_certs(cfg.danger_accept_invalid_certs);

        if let Some(pem) = &cfg.client_identity_pem {
            let identity = Identity::from_pem(pem)
                .map_err(|e| DomeError::Internal(format!("invalid client identity: {e}")))?;
            builder = builder.identity(identity);
        }

        for pem in &cfg.extra_root_certs_pem {
            let cert = Certificate::from_pem(pem)
                .map_err(|e| DomeError::Internal(format!("invalid root certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| DomeError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.client.get(url).send().await?;
        let resp = resp.error_for_status().map_err(DomeError::from)?;
        Ok(resp.json::<T>().await?)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
        let resp = self.client.post(url).json(body).send().await?;
        let resp = resp.error_for_status().map_err(DomeError::from)?;
        Ok(resp.json::<T>().await?)
    }

    pub async fn post_empty<B: Serialize>(&self, url: &str, body: &B) -> Result<()> {
        let resp = self.client.post(url).json(body).send().await?;
        resp.error_for_status().map_err(DomeError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeouts() {
        let cfg = OutboundConfig::default();
        assert!(cfg.connect_timeout < cfg.request_timeout);
    }

    #[test]
    fn pool_builds_with_default_config() {
        let pool = OutboundPool::new(&OutboundConfig::default());
        assert!(pool.is_ok());
    }
}
