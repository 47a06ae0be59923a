//! The four gateway operations: validate, build, exchange, decode.
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::blob::{BlobStore, TempDirBlobStore};
use crate::client::{Exchange, XciClient};
use crate::command::{self, Interval, XciCommand};
use crate::config::Configuration;
use crate::decode::{decode, ResponseKind};
use crate::error::{GatewayError, Result};

/// Body returned by [`Gateway::health`] when snf-server answered.
pub const HEALTHY: &[u8] = br#"{"level":"info","msg":"snf-server is reachable"}"#;

/// Inputs of a scan as they arrive from the HTTP layer.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub file: Option<Vec<u8>>,
    pub ip: Option<String>,
    pub log_enabled: bool,
    pub xhdr_enabled: bool,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            file: None,
            ip: None,
            log_enabled: true,
            xhdr_enabled: false,
        }
    }
}

pub struct Gateway {
    exchange: Arc<dyn Exchange>,
    blobs: Arc<dyn BlobStore>,
}

impl Gateway {
    pub fn new(exchange: Arc<dyn Exchange>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { exchange, blobs }
    }

    /// TCP client and temp-dir blob store wired from `config`.
    pub fn from_config(config: &Configuration) -> Self {
        Self::new(
            Arc::new(XciClient::new(config)),
            Arc::new(TempDirBlobStore::new(&config.working_dir)),
        )
    }

    /// Store the upload, have snf-server scan it, and remove it again whatever the outcome.
    #[instrument(name = "scan", skip_all, fields(cid = %cid))]
    pub async fn scan(&self, cid: &str, req: ScanRequest) -> Result<Vec<u8>> {
        let file = req
            .file
            .filter(|file| !file.is_empty())
            .ok_or_else(|| GatewayError::caller("must include file to scan"))?;
        let ip = match req.ip.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(ip) => Some(parse_ip(ip)?),
        };

        let size = file.len();
        let path = self.blobs.store(file).await.inspect_err(|e| {
            error!(error = %e, "could not store upload");
        })?;
        info!(path = %path.display(), size, "stored upload");

        let cmd = XciCommand::Scan {
            file_path: path.clone(),
            ip,
            log_enabled: req.log_enabled,
            xhdr_enabled: req.xhdr_enabled,
        };
        let outcome = self.run(&cmd, ResponseKind::Scan, cid).await;

        if let Err(e) = self.blobs.delete(&path).await {
            warn!(path = %path.display(), error = %e, "failed to remove upload");
        }
        outcome
    }

    #[instrument(name = "testip", skip_all, fields(cid = %cid))]
    pub async fn test_ip(&self, cid: &str, ip: &str) -> Result<Vec<u8>> {
        let ip = ip.trim();
        if ip.is_empty() {
            return Err(GatewayError::caller("must include ip to search"));
        }
        let cmd = XciCommand::TestIp { ip: parse_ip(ip)? };
        self.run(&cmd, ResponseKind::TestIp, cid).await
    }

    #[instrument(name = "report", skip_all, fields(cid = %cid))]
    pub async fn report(&self, cid: &str, interval: &str) -> Result<Vec<u8>> {
        let interval = interval
            .trim()
            .parse::<Interval>()
            .map_err(GatewayError::Caller)?;
        self.run(&XciCommand::Report { interval }, ResponseKind::Report, cid)
            .await
    }

    /// Proves snf-server is reachable with a one-second report.
    #[instrument(name = "health", skip_all, fields(cid = %cid))]
    pub async fn health(&self, cid: &str) -> Result<Vec<u8>> {
        let cmd = XciCommand::Report {
            interval: Interval::Second,
        };
        self.run(&cmd, ResponseKind::Report, cid).await?;
        Ok(HEALTHY.to_vec())
    }

    async fn run(&self, cmd: &XciCommand, kind: ResponseKind, cid: &str) -> Result<Vec<u8>> {
        let xci = command::build(cmd);
        info!(op = cmd.name(), "exchanging xci command");
        let raw = self.exchange.exchange(&xci, cid).await.inspect_err(|e| {
            error!(op = cmd.name(), error = %e, "xci exchange failed");
        })?;
        info!(op = cmd.name(), bytes = raw.len(), "xci reply received");
        Ok(decode(&raw, kind, cid))
    }
}

/// Check that `ip` is an address literal; the caller's spelling is what gets sent.
fn parse_ip(ip: &str) -> Result<String> {
    ip.parse::<IpAddr>()
        .map(|_| ip.to_string())
        .map_err(|_| GatewayError::caller(format!("invalid ip address: {ip}")))
}
