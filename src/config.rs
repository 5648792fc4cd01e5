//! Environment-driven settings, read once at startup.

use crate::crypto::EncryptionKey;
use crate::notify::SmtpSettings;
use crate::portal::{DEFAULT_LOGIN_URL, DEFAULT_USER_AGENT};
use anyhow::Context;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_DASHBOARD_URL: &str = "https://whereyoustand.vercel.app";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub struct Config {
    pub portal_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub encryption_key: Option<EncryptionKey>,
    /// Present only when SMTP credentials are configured.
    pub smtp: Option<SmtpSettings>,
    pub dashboard_url: String,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let request_timeout = match get("MARKSYNCD_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("MARKSYNCD_TIMEOUT_SECS is not a number: {}", raw))?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let encryption_key = get("MARKSYNCD_ENCRYPTION_KEY")
            .map(|raw| EncryptionKey::from_base64(&raw))
            .transpose()
            .context("MARKSYNCD_ENCRYPTION_KEY is invalid")?;

        let smtp = match (get("MARKSYNCD_SMTP_USERNAME"), get("MARKSYNCD_SMTP_PASSWORD")) {
            (Some(username), Some(password)) => {
                let port = match get("MARKSYNCD_SMTP_PORT") {
                    Some(raw) => raw
                        .parse()
                        .with_context(|| format!("MARKSYNCD_SMTP_PORT is not a port: {}", raw))?,
                    None => DEFAULT_SMTP_PORT,
                };
                Some(SmtpSettings {
                    host: get("MARKSYNCD_SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.into()),
                    port,
                    from: get("MARKSYNCD_SMTP_FROM").unwrap_or_else(|| username.clone()),
                    username,
                    password,
                    timeout: request_timeout,
                })
            }
            _ => None,
        };

        Ok(Config {
            portal_url: get("MARKSYNCD_PORTAL_URL").unwrap_or_else(|| DEFAULT_LOGIN_URL.into()),
            user_agent: get("MARKSYNCD_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.into()),
            request_timeout,
            encryption_key,
            smtp,
            dashboard_url: get("MARKSYNCD_DASHBOARD_URL")
                .unwrap_or_else(|| DEFAULT_DASHBOARD_URL.into()),
            log_level: get("MARKSYNCD_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
            log_dir: get("MARKSYNCD_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Settings safe to hand back over IPC. Secrets are reduced to presence flags.
    pub fn redacted(&self) -> serde_json::Value {
        json!({
            "portalUrl": self.portal_url,
            "userAgent": self.user_agent,
            "requestTimeoutSecs": self.request_timeout.as_secs(),
            "encryptionKey": self.encryption_key.is_some(),
            "smtp": self.smtp.as_ref().map(|s| json!({
                "host": s.host,
                "port": s.port,
                "from": s.from,
                "username": s.username,
                "password": "<redacted>",
            })),
            "dashboardUrl": self.dashboard_url,
            "logLevel": self.log_level,
            "logDir": self.log_dir.as_ref().map(|p| p.to_string_lossy().to_string()),
        })
    }
}
