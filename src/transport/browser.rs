//! Browser-automation transport
//!
//! Drives the network's web client in a Chromium instance per connection,
//! either launched locally (profile under the session root) or attached
//! through a remote DevTools WebSocket endpoint. A watcher task polls the
//! page and turns what it sees into transport events.

use super::{
    EventSink, MediaPayload, SentMessage, Transport, TransportError, TransportFactory,
};
use crate::chat_target;
use crate::connection::{InboundMessage, SessionInfo};
use async_trait::async_trait;
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    element::Element,
    fetcher::{BrowserFetcher, BrowserFetcherOptions},
    Handler, Page,
};
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WEB_URL: &str = "https://web.whatsapp.com";

/// Page poll interval for the watcher
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a send may wait for the compose UI
const SEND_TIMEOUT: Duration = Duration::from_secs(45);

const ELEMENT_POLL: Duration = Duration::from_millis(250);

const LAUNCH_ARGS: [&str; 6] = [
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
];

/// The web client refuses headless user agents
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const COMPOSE_BOX: &str = r#"footer div[contenteditable="true"]"#;
const SEND_BUTTON: &str = r#"span[data-icon="send"]"#;

/// Reports QR, readiness and drains messages collected by a mutation observer
const PROBE_JS: &str = r#"(() => {
  const w = window;
  if (!w.__qsInbox) {
    w.__qsInbox = [];
    w.__qsSeen = new Set();
    const collect = (root) => {
      if (!root.querySelectorAll) return;
      const rows = root.matches && root.matches('[data-id]') ? [root] : [];
      root.querySelectorAll('[data-id]').forEach((r) => rows.push(r));
      for (const row of rows) {
        const dataId = row.getAttribute('data-id') || '';
        if (w.__qsSeen.has(dataId) || !row.querySelector('.message-in')) continue;
        const parts = dataId.split('_');
        if (parts.length < 3 || parts[0] !== 'false') continue;
        w.__qsSeen.add(dataId);
        const text = row.querySelector('span.selectable-text');
        w.__qsInbox.push({ from: parts[1], body: text ? text.innerText : '', id: parts[2] });
      }
    };
    new MutationObserver((mutations) => {
      for (const m of mutations) m.addedNodes.forEach(collect);
    }).observe(document.body, { childList: true, subtree: true });
  }
  const qr = document.querySelector('div[data-ref]');
  return {
    qr: qr ? qr.getAttribute('data-ref') : null,
    ready: !!document.querySelector('#pane-side'),
    inbox: w.__qsInbox.splice(0),
  };
})()"#;

const SESSION_JS: &str = r#"(() => {
  const strip = (v) => (v || '').replace(/"/g, '');
  const wid = strip(localStorage.getItem('last-wid-md') || localStorage.getItem('last-wid'));
  const pushname = strip(localStorage.getItem('WAPushname'));
  return {
    phone: wid.split('@')[0].split(':')[0],
    pushname: pushname || null,
    platform: navigator.platform || null,
  };
})()"#;

const LOGOUT_JS: &str = r"(async () => {
  localStorage.clear();
  if (indexedDB.databases) {
    const dbs = await indexedDB.databases();
    dbs.forEach((db) => indexedDB.deleteDatabase(db.name));
  }
  return true;
})()";

/// How the browser is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserMode {
    /// Launch a local Chromium, optionally from an explicit executable
    Launch { executable: Option<PathBuf> },
    /// Attach to an already running browser
    Remote { ws_endpoint: String },
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub mode: BrowserMode,
    /// Root for per-connection browser profiles
    pub session_root: PathBuf,
    pub web_url: String,
}

impl BrowserOptions {
    /// Profile directory for a connection; holds the persisted login
    pub fn profile_dir(&self, connection_id: &str) -> PathBuf {
        self.session_root.join(format!("session-{connection_id}"))
    }

    fn fetcher_cache_dir(&self) -> PathBuf {
        self.session_root.join(".chromium")
    }
}

/// Builds one [`BrowserTransport`] per connection
pub struct BrowserTransportFactory {
    options: Arc<BrowserOptions>,
}

impl BrowserTransportFactory {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

impl TransportFactory for BrowserTransportFactory {
    fn create(&self, connection_id: &str) -> Arc<dyn Transport> {
        Arc::new(BrowserTransport::new(connection_id, self.options.clone()))
    }
}

struct LiveBrowser {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    watcher_task: JoinHandle<()>,
}

impl LiveBrowser {
    async fn shutdown(mut self, mode: &BrowserMode) -> Result<(), TransportError> {
        self.watcher_task.abort();
        let result = match mode {
            // Leave a shared remote browser running, only drop our tab
            BrowserMode::Remote { .. } => self
                .page
                .close()
                .await
                .map(|_| ())
                .map_err(|e| TransportError::Operation(format!("Closing page failed: {e}"))),
            BrowserMode::Launch { .. } => match self.browser.close().await {
                Ok(_) => {
                    let _ = self.browser.wait().await;
                    Ok(())
                }
                Err(e) => Err(TransportError::Operation(format!("Closing browser failed: {e}"))),
            },
        };
        self.handler_task.abort();
        result
    }
}

/// Store a freshly started browser unless the transport was destroyed while
/// it was starting. A discarded browser is handed back for teardown.
fn install_or_discard<T>(
    slot: &mut Option<T>,
    started: T,
    cancel: &CancellationToken,
) -> Option<T> {
    if cancel.is_cancelled() {
        return Some(started);
    }
    *slot = Some(started);
    None
}

pub struct BrowserTransport {
    connection_id: String,
    options: Arc<BrowserOptions>,
    live: Mutex<Option<LiveBrowser>>,
    /// Held for the whole of `initialize` so `destroy` can wait out a launch
    startup: Mutex<()>,
    /// Sends navigate the page, so only one may run at a time
    send_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl BrowserTransport {
    pub fn new(connection_id: &str, options: Arc<BrowserOptions>) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            options,
            live: Mutex::new(None),
            startup: Mutex::new(()),
            send_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    fn browser_config(
        profile_dir: &Path,
        executable: Option<&Path>,
    ) -> Result<BrowserConfig, TransportError> {
        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .no_sandbox()
            .user_data_dir(profile_dir)
            .arg(format!("--user-agent={USER_AGENT}"));

        for arg in LAUNCH_ARGS {
            builder = builder.arg(arg);
        }

        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(TransportError::Launch)
    }

    async fn launch_with(
        profile_dir: &Path,
        executable: Option<&Path>,
    ) -> Result<(Browser, Handler), TransportError> {
        let config = Self::browser_config(profile_dir, executable)?;
        Browser::launch(config)
            .await
            .map_err(|e| TransportError::Launch(e.to_string()))
    }

    /// Launch a local browser.
    ///
    /// Without an explicit executable, tries system Chrome first and falls
    /// back to a Chromium downloaded into the session root.
    async fn launch_local(
        &self,
        executable: Option<&Path>,
    ) -> Result<(Browser, Handler), TransportError> {
        let profile_dir = self.options.profile_dir(&self.connection_id);
        tokio::fs::create_dir_all(&profile_dir).await.map_err(|e| {
            TransportError::Launch(format!(
                "Failed to create profile dir {}: {e}",
                profile_dir.display()
            ))
        })?;

        if executable.is_some() {
            return Self::launch_with(&profile_dir, executable).await;
        }

        match Self::launch_with(&profile_dir, None).await {
            Ok(launched) => return Ok(launched),
            Err(e) => {
                tracing::info!(
                    connection_id = %self.connection_id,
                    "System Chrome not available ({e}), trying fetcher..."
                );
            }
        }

        let cache_dir = self.options.fetcher_cache_dir();
        tokio::fs::create_dir_all(&cache_dir).await.map_err(|e| {
            TransportError::Launch(format!(
                "Failed to create cache dir {}: {e}",
                cache_dir.display()
            ))
        })?;

        let fetcher_opts = BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .map_err(|e| TransportError::Launch(format!("Fetcher config error: {e}")))?;

        let info = BrowserFetcher::new(fetcher_opts)
            .fetch()
            .await
            .map_err(|e| TransportError::Launch(format!("Chrome download failed: {e:#}")))?;

        tracing::info!("Using Chrome at {:?}", info.executable_path);
        Self::launch_with(&profile_dir, Some(&info.executable_path)).await
    }

    async fn current_page(&self) -> Result<Page, TransportError> {
        self.live
            .lock()
            .await
            .as_ref()
            .map(|live| live.page.clone())
            .ok_or_else(|| TransportError::Operation("Browser is not running".to_string()))
    }

    /// Open the chat for an individual chat id and wait for the compose box
    async fn open_chat(
        &self,
        page: &Page,
        chat_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        if chat_target::looks_like_group(chat_id) {
            return Err(TransportError::Unsupported(
                "group chats cannot be opened by the browser transport".to_string(),
            ));
        }
        let url = send_url(&self.options.web_url, chat_id, text)?;
        page.goto(url.as_str())
            .await
            .map_err(|e| TransportError::Operation(format!("Navigation failed: {e}")))?;
        wait_for_element(page, COMPOSE_BOX, SEND_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for BrowserTransport {
    async fn initialize(&self, events: EventSink) -> Result<(), TransportError> {
        let _startup = self.startup.lock().await;
        if self.cancel.is_cancelled() {
            return Err(destroyed_during_startup());
        }

        let (mut browser, mut handler) = match &self.options.mode {
            BrowserMode::Launch { executable } => {
                self.launch_local(executable.as_deref()).await?
            }
            BrowserMode::Remote { ws_endpoint } => Browser::connect(ws_endpoint.as_str())
                .await
                .map_err(|e| {
                    TransportError::Launch(format!("Remote browser connect failed: {e}"))
                })?,
        };

        let connection_id = self.connection_id.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(connection_id = %connection_id, "CDP handler error: {e}");
                }
            }
        });

        let page = match browser.new_page(self.options.web_url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(TransportError::Launch(format!("Failed to open web client: {e}")));
            }
        };

        let watcher_task = tokio::spawn(watch_page(
            self.connection_id.clone(),
            page.clone(),
            events,
            self.cancel.child_token(),
        ));

        let started = LiveBrowser {
            browser,
            page,
            handler_task,
            watcher_task,
        };
        let discarded = install_or_discard(&mut *self.live.lock().await, started, &self.cancel);
        if let Some(live) = discarded {
            tracing::info!(
                connection_id = %self.connection_id,
                "Destroyed while starting, closing browser"
            );
            if let Err(e) = live.shutdown(&self.options.mode).await {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "Discarding browser failed"
                );
            }
            return Err(destroyed_during_startup());
        }
        Ok(())
    }

    async fn session_info(&self) -> Result<SessionInfo, TransportError> {
        let page = self.current_page().await?;
        let probe: SessionProbe = page
            .evaluate(SESSION_JS)
            .await
            .map_err(|e| TransportError::Operation(format!("Session probe failed: {e}")))?
            .into_value()
            .map_err(|e| TransportError::Operation(format!("Session probe unreadable: {e}")))?;

        if probe.phone.is_empty() {
            return Err(TransportError::Operation(
                "Session details not available yet".to_string(),
            ));
        }
        Ok(SessionInfo {
            display_name: probe.pushname,
            phone_number: probe.phone,
            platform: probe.platform,
        })
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<SentMessage, TransportError> {
        let _guard = self.send_lock.lock().await;
        let page = self.current_page().await?;
        self.open_chat(&page, chat_id, Some(body)).await?;
        click(&page, SEND_BUTTON).await?;
        Ok(sent_now())
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        caption: &str,
    ) -> Result<SentMessage, TransportError> {
        let _guard = self.send_lock.lock().await;
        let page = self.current_page().await?;
        self.open_chat(&page, chat_id, None).await?;

        page.evaluate(paste_file_js(media, caption)?)
            .await
            .map_err(|e| TransportError::Operation(format!("Attaching file failed: {e}")))?;
        click(&page, SEND_BUTTON).await?;
        Ok(sent_now())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        let page = self.current_page().await?;
        page.evaluate(LOGOUT_JS)
            .await
            .map_err(|e| TransportError::Operation(format!("Logout failed: {e}")))?;
        page.reload()
            .await
            .map_err(|e| TransportError::Operation(format!("Reload after logout failed: {e}")))?;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.cancel.cancel();
        // A launch in flight sees the cancellation and closes its own browser;
        // waiting for it means no browser outlives this call
        let _startup = self.startup.lock().await;
        let Some(live) = self.live.lock().await.take() else {
            return Ok(());
        };
        live.shutdown(&self.options.mode).await
    }
}

/// Page state as reported by [`PROBE_JS`]
#[derive(Debug, Default, Deserialize)]
struct PageProbe {
    qr: Option<String>,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    inbox: Vec<ProbedMessage>,
}

#[derive(Debug, Deserialize)]
struct ProbedMessage {
    from: String,
    body: String,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionProbe {
    phone: String,
    pushname: Option<String>,
    platform: Option<String>,
}

/// What the watcher reports after comparing a probe with the previous one
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageSignal {
    Qr(String),
    Authenticated,
    Ready,
    LoggedOut,
    Message(InboundMessage),
}

/// Tracks page state between probes
#[derive(Debug, Default)]
struct PageWatch {
    last_qr: Option<String>,
    ready: bool,
}

impl PageWatch {
    fn observe(&mut self, probe: PageProbe) -> Vec<PageSignal> {
        let mut signals = Vec::new();

        if self.ready {
            if probe.qr.is_some() && !probe.ready {
                // The login screen came back: the phone unlinked us
                self.ready = false;
                self.last_qr = None;
                signals.push(PageSignal::LoggedOut);
                return signals;
            }
        } else if probe.ready {
            self.ready = true;
            self.last_qr = None;
            signals.push(PageSignal::Authenticated);
            signals.push(PageSignal::Ready);
        } else if let Some(qr) = probe.qr {
            if self.last_qr.as_deref() != Some(qr.as_str()) {
                self.last_qr = Some(qr.clone());
                signals.push(PageSignal::Qr(qr));
            }
        }

        if self.ready {
            signals.extend(probe.inbox.into_iter().map(|m| {
                PageSignal::Message(InboundMessage {
                    from: m.from,
                    body: m.body,
                    timestamp: None,
                    id: m.id,
                })
            }));
        }
        signals
    }
}

async fn watch_page(
    connection_id: String,
    page: Page,
    events: EventSink,
    cancel: CancellationToken,
) {
    let mut watch = PageWatch::default();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let probe = match page.evaluate(PROBE_JS).await {
            Ok(result) => result.into_value::<PageProbe>().unwrap_or_default(),
            Err(e) => {
                if watch.ready {
                    events.disconnected(format!("Page unavailable: {e}")).await;
                    break;
                }
                tracing::debug!(connection_id = %connection_id, error = %e, "Page probe failed");
                continue;
            }
        };

        for signal in watch.observe(probe) {
            match signal {
                PageSignal::Qr(payload) => events.qr_issued(payload).await,
                PageSignal::Authenticated => events.authenticated().await,
                PageSignal::Ready => events.ready().await,
                PageSignal::LoggedOut => events.disconnected("LOGOUT").await,
                PageSignal::Message(message) => events.message_received(message).await,
            }
        }
    }
    tracing::debug!(connection_id = %connection_id, "Page watcher stopped");
}

/// Deep link that opens a chat, optionally with prefilled text
fn send_url(
    web_url: &str,
    chat_id: &str,
    text: Option<&str>,
) -> Result<reqwest::Url, TransportError> {
    let phone: String = chat_id
        .trim_end_matches(chat_target::INDIVIDUAL_SUFFIX)
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let base = format!("{}/send", web_url.trim_end_matches('/'));
    let mut params = vec![("phone", phone.as_str())];
    if let Some(text) = text {
        params.push(("text", text));
    }
    reqwest::Url::parse_with_params(&base, &params)
        .map_err(|e| TransportError::Operation(format!("Invalid web client URL: {e}")))
}

/// Script that pastes a file into the compose box and fills the caption
fn paste_file_js(media: &MediaPayload, caption: &str) -> Result<String, TransportError> {
    let literal = |v: &str| {
        serde_json::to_string(v)
            .map_err(|e| TransportError::Operation(format!("Encoding file failed: {e}")))
    };
    let data = literal(&media.data)?;
    let mime = literal(&media.mimetype)?;
    let name = literal(media.filename.as_deref().unwrap_or("file"))?;
    let caption = literal(caption)?;

    Ok(format!(
        r#"(async () => {{
  const box = document.querySelector('{COMPOSE_BOX}');
  const bytes = Uint8Array.from(atob({data}), (c) => c.charCodeAt(0));
  const file = new File([bytes], {name}, {{ type: {mime} }});
  const transfer = new DataTransfer();
  transfer.items.add(file);
  box.focus();
  box.dispatchEvent(new ClipboardEvent('paste', {{ clipboardData: transfer, bubbles: true }}));
  await new Promise((r) => setTimeout(r, 1500));
  if ({caption}) document.execCommand('insertText', false, {caption});
  return true;
}})()"#
    ))
}

async fn wait_for_element(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<Element, TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        match page.find_element(selector).await {
            Ok(element) => return Ok(element),
            Err(_) if Instant::now() < deadline => tokio::time::sleep(ELEMENT_POLL).await,
            Err(e) => {
                return Err(TransportError::Operation(format!(
                    "Timed out after {timeout:?} waiting for {selector}: {e}"
                )))
            }
        }
    }
}

async fn click(page: &Page, selector: &str) -> Result<(), TransportError> {
    let element = wait_for_element(page, selector, SEND_TIMEOUT).await?;
    element
        .click()
        .await
        .map_err(|e| TransportError::Operation(format!("Click on {selector} failed: {e}")))?;
    Ok(())
}

fn destroyed_during_startup() -> TransportError {
    TransportError::Launch("destroyed during startup".to_string())
}

fn sent_now() -> SentMessage {
    SentMessage {
        id: uuid::Uuid::new_v4().simple().to_string().to_uppercase(),
        timestamp: chrono::Utc::now().timestamp(),
    }
}
