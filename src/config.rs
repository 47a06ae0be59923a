use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// snifferfy — HTTP gateway in front of the snf-server XCI scanning engine.
///
/// Every option can also be set through the environment; flags win over variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "snifferfy", version, about, long_about = None)]
pub struct Configuration {
    /// Host name or address of the snf-server XCI listener.
    #[arg(long = "snf-host", env = "SNF_HOST", default_value = "localhost")]
    pub scanner_host: String,

    /// TCP port of the snf-server XCI listener.
    #[arg(long = "snf-port", env = "SNF_PORT", default_value_t = 9001)]
    pub scanner_port: u16,

    /// Connect timeout towards snf-server, in milliseconds.
    #[arg(long = "dial-timeout-ms", env = "SNF_DIAL_TIMEOUT_MS", default_value_t = 3_000)]
    pub dial_timeout_ms: u64,

    /// Upper bound for writing a command and reading its reply, in milliseconds.
    #[arg(long = "io-timeout-ms", env = "SNF_IO_TIMEOUT_MS", default_value_t = 30_000)]
    pub io_timeout_ms: u64,

    /// Directory shared with snf-server where uploads are stored while being scanned.
    #[arg(
        long = "working-dir",
        env = "SNIFFERFY_WORKING_DIR",
        default_value = "/usr/share/snf-server/storage/"
    )]
    pub working_dir: PathBuf,

    /// Address the HTTP API listens on.
    #[arg(long, env = "SNIFFERFY_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Largest accepted request body, in bytes.
    #[arg(
        long = "max-upload-bytes",
        env = "SNIFFERFY_MAX_UPLOAD_BYTES",
        default_value_t = 10 << 20
    )]
    pub max_upload_bytes: usize,

    /// Largest scanner reply kept, in bytes; anything past it is dropped like a cut-off read.
    #[arg(
        long = "max-reply-bytes",
        env = "SNF_MAX_REPLY_BYTES",
        default_value_t = 16 << 20
    )]
    pub max_reply_bytes: usize,

    /// Log filter directive (e.g. `info`, `snifferfy=debug`). `RUST_LOG` takes precedence.
    #[arg(long = "log-level", env = "SNIFFERFY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(
        long = "log-format",
        env = "SNIFFERFY_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    pub log_format: LogFormat,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            scanner_host: "localhost".into(),
            scanner_port: 9001,
            dial_timeout_ms: 3_000,
            io_timeout_ms: 30_000,
            working_dir: PathBuf::from("/usr/share/snf-server/storage/"),
            listen: "0.0.0.0:8080".into(),
            max_upload_bytes: 10 << 20,
            max_reply_bytes: 16 << 20,
            log_level: "info".into(),
            log_format: LogFormat::Text,
        }
    }
}

impl Configuration {
    pub fn scanner_addr(&self) -> String {
        format!("{}:{}", self.scanner_host, self.scanner_port)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Reject settings the gateway cannot run with. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.scanner_host.trim().is_empty() {
            bail!("snf host must not be empty");
        }
        if self.scanner_port == 0 {
            bail!("snf port must be between 1 and 65535");
        }
        if self.dial_timeout_ms == 0 || self.io_timeout_ms == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.max_reply_bytes == 0 {
            bail!("max reply bytes must be greater than zero");
        }
        let meta = std::fs::metadata(&self.working_dir).with_context(|| {
            format!(
                "working directory is not accessible: {}",
                self.working_dir.display()
            )
        })?;
        if !meta.is_dir() {
            bail!(
                "working directory is not a directory: {}",
                self.working_dir.display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cfg = Configuration::parse_from([
            "snifferfy",
            "--snf-host",
            "10.0.0.7",
            "--snf-port",
            "9100",
            "--dial-timeout-ms",
            "250",
            "--log-format",
            "json",
            "--max-reply-bytes",
            "4096",
        ]);
        assert_eq!(cfg.scanner_addr(), "10.0.0.7:9100");
        assert_eq!(cfg.dial_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.max_reply_bytes, 4096);
        assert_eq!(cfg.io_timeout_ms, 30_000);
    }

    #[test]
    fn validate_accepts_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Configuration {
            working_dir: dir.path().to_path_buf(),
            ..Configuration::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_directory_and_zero_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Configuration {
            working_dir: dir.path().join("nope"),
            ..Configuration::default()
        };
        assert!(missing.validate().is_err());

        let zero = Configuration {
            working_dir: dir.path().to_path_buf(),
            io_timeout_ms: 0,
            ..Configuration::default()
        };
        assert!(zero.validate().is_err());

        let no_reply = Configuration {
            working_dir: dir.path().to_path_buf(),
            max_reply_bytes: 0,
            ..Configuration::default()
        };
        assert!(no_reply.validate().is_err());
    }
}
