//! Process configuration
//!
//! Read once from the environment at startup; there is no hot reload.

use crate::relay::RelayConfig;
use crate::transport::browser::DEFAULT_WEB_URL;
use crate::transport::{BrowserMode, BrowserOptions};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_PATH: &str = "./session";
const DEFAULT_RELAY_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub relay: RelayConfig,
    pub browser: BrowserOptions,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let relay = RelayConfig {
            enabled: get("HELPDESK_ENABLED").as_deref() == Some("true"),
            endpoint: get("HELPDESK_API_URL"),
            pinned_connection: get("HELPDESK_CONNECTION_ID"),
            timeout: Duration::from_secs(
                get("HELPDESK_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_RELAY_TIMEOUT_SECS),
            ),
        };

        let mode = match get("PUPPETEER_WS_ENDPOINT").or_else(|| get("BROWSER_WS_ENDPOINT")) {
            Some(ws_endpoint) => BrowserMode::Remote { ws_endpoint },
            None => BrowserMode::Launch {
                executable: get("PUPPETEER_EXECUTABLE_PATH").map(PathBuf::from),
            },
        };

        let browser = BrowserOptions {
            mode,
            session_root: PathBuf::from(
                get("WA_SESSION_PATH").unwrap_or_else(|| DEFAULT_SESSION_PATH.to_string()),
            ),
            web_url: DEFAULT_WEB_URL.to_string(),
        };

        Self {
            port,
            relay,
            browser,
        }
    }

    /// One-line description of how browsers are obtained, for the startup log
    pub fn browser_summary(&self) -> &'static str {
        match &self.browser.mode {
            BrowserMode::Remote { .. } => "remote Chromium via WebSocket endpoint",
            BrowserMode::Launch {
                executable: Some(_),
            } => "custom Chromium executable path",
            BrowserMode::Launch { executable: None } => "local Chromium",
        }
    }
}
