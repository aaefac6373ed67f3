// src/surface/cdp.rs

//! Chrome DevTools Protocol backend.
//!
//! Attaches to a browser started with `--remote-debugging-port`, creates one
//! target per surface and drives pages with `Runtime.evaluate`. Document loads
//! are detected by polling `performance.timeOrigin` together with
//! `document.readyState`. Tab pinning has no protocol equivalent and is a
//! logged no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Browser, LiveState, OpenOptions, PageAction, PageLoad, PageSnapshot, Surface};
use crate::error::{AppError, Result};
use crate::models::CdpConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>>;

/// Serializes the page with the DOM properties markup does not carry.
const SNAPSHOT_JS: &str = r#"(() => {
  const loc = (el) => {
    const parts = [];
    while (el && el.nodeType === 1) {
      const tag = el.tagName.toLowerCase();
      if (tag === 'html') { parts.unshift('html'); break; }
      let i = 1;
      for (let s = el.previousElementSibling; s; s = s.previousElementSibling) i++;
      parts.unshift(tag + ':nth-child(' + i + ')');
      el = el.parentElement;
    }
    return parts.join(' > ');
  };
  const live = {};
  document.querySelectorAll('input, select, textarea, button, label, a, td, h2, h3, h4, [role="tab"], [role="tabpanel"], .tab-pane, .btn-toggle').forEach((el) => {
    const state = { hidden: el.getClientRects().length === 0 };
    if (el.matches('input, select, textarea, button')) state.disabled = !!el.disabled;
    if (el.matches('input[type="checkbox"], input[type="radio"]')) state.checked = !!el.checked;
    if (el.matches('input, select, textarea')) state.value = el.value;
    live[loc(el)] = state;
  });
  return {
    url: location.href,
    origin: String(performance.timeOrigin),
    html: document.documentElement.outerHTML,
    live,
  };
})()"#;

const LOAD_STATE_JS: &str =
    "({ url: location.href, ready: document.readyState, origin: String(performance.timeOrigin) })";

/// `(locator, kind, value)`; returns false when the element is gone.
const ACTION_JS: &str = r#"((loc, kind, value) => {
  const el = document.querySelector(loc);
  if (!el) return false;
  const fire = (t) => {
    t.dispatchEvent(new Event('input', { bubbles: true }));
    t.dispatchEvent(new Event('change', { bubbles: true }));
  };
  if (kind === 'click') { el.click(); return true; }
  if (kind === 'toggle') {
    const label = el.closest('label');
    (label && label !== el ? label : el).click();
    fire(el.matches('label') ? (el.control || el) : el);
    return true;
  }
  if (kind === 'set') {
    const proto = el instanceof HTMLSelectElement ? HTMLSelectElement.prototype
      : el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
      : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
    fire(el);
    return true;
  }
  if (kind === 'highlight') {
    el.style.outline = '3px solid #22c55e';
    el.style.outlineOffset = '2px';
    el.style.boxShadow = '0 0 12px rgba(34, 197, 94, 0.5)';
    return true;
  }
  return false;
})"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    web_socket_debugger_url: String,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    url: String,
    origin: String,
    html: String,
    #[serde(default)]
    live: HashMap<String, LiveState>,
}

#[derive(Debug, Deserialize)]
struct LoadState {
    url: String,
    ready: String,
    origin: String,
}

/// One browser-level websocket shared by every surface.
struct Connection {
    sink: tokio::sync::Mutex<WsSink>,
    pending: Pending,
    next_request: AtomicU64,
    timeout: Duration,
    receiver: JoinHandle<()>,
}

impl Connection {
    async fn connect(config: &CdpConfig) -> Result<Self> {
        let endpoint = config.endpoint.trim_end_matches('/');
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let version: VersionInfo = client
            .get(format!("{endpoint}/json/version"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        log::info!("Connecting to {}", version.web_socket_debugger_url);

        let (stream, _) = tokio_tungstenite::connect_async(version.web_socket_debugger_url.as_str()).await?;
        let (sink, source) = stream.split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let receiver = tokio::spawn(Self::receive_loop(source, pending.clone()));

        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            pending,
            next_request: AtomicU64::new(1),
            timeout: Duration::from_secs(config.request_timeout_secs),
            receiver,
        })
    }

    async fn receive_loop(mut source: WsSource, pending: Pending) {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        log::warn!("Unparsable DevTools message");
                        continue;
                    };
                    // Events carry no id and are not consumed.
                    let Some(id) = value.get("id").and_then(Value::as_u64) else {
                        continue;
                    };
                    let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
                    if let Some(waiter) = waiter {
                        let result = match value.get("error") {
                            Some(error) => Err(error
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("protocol error")
                                .to_string()),
                            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                        };
                        let _ = waiter.send(result);
                    }
                }
                Ok(Message::Close(_)) => {
                    log::info!("DevTools websocket closed");
                    break;
                }
                Err(e) => {
                    log::error!("DevTools websocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
        if let Ok(mut pending) = pending.lock() {
            pending.clear();
        }
    }

    async fn call(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
        let id = self.next_request.fetch_add(1, Ordering::SeqCst);
        let mut request = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            request["sessionId"] = Value::String(session_id.to_string());
        }

        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }
        {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(request.to_string().into())).await?;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(AppError::surface(method, message)),
            Ok(Err(_)) => Err(AppError::surface(method, "connection closed")),
            Err(_) => {
                if let Ok(mut pending) = self.pending.lock() {
                    pending.remove(&id);
                }
                Err(AppError::surface(method, "request timed out"))
            }
        }
    }

    /// Evaluate an expression in the page and return its value.
    async fn evaluate(&self, session_id: &str, expression: &str) -> Result<Value> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
                Some(session_id),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script exception");
            return Err(AppError::surface("Runtime.evaluate", text));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Opens DevTools targets as surfaces.
pub struct CdpBrowser {
    connection: Arc<Connection>,
    next_id: AtomicU64,
    load_poll: Duration,
}

impl CdpBrowser {
    pub async fn connect(config: &CdpConfig) -> Result<Self> {
        Ok(Self {
            connection: Arc::new(Connection::connect(config).await?),
            next_id: AtomicU64::new(1),
            load_poll: Duration::from_millis(config.load_poll_ms),
        })
    }
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn open(&self, url: &str, options: OpenOptions) -> Result<Arc<dyn Surface>> {
        let created = self
            .connection
            .call(
                "Target.createTarget",
                json!({ "url": url, "background": !options.active }),
                None,
            )
            .await?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| AppError::surface("Target.createTarget", "missing targetId"))?
            .to_string();

        let attached = self
            .connection
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| AppError::surface("Target.attachToTarget", "missing sessionId"))?
            .to_string();

        if options.pinned {
            log::debug!("Pinning is not available over DevTools; target {} stays unpinned", target_id);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (loads, _) = watch::channel(None);
        let surface = Arc::new(CdpSurface {
            id,
            target_id,
            session_id,
            connection: self.connection.clone(),
            loads,
            closed: AtomicBool::new(false),
        });
        tokio::spawn(poll_loads(surface.clone(), self.load_poll));
        log::info!("Opened target {} for surface {}", surface.target_id, id);
        Ok(surface)
    }
}

pub struct CdpSurface {
    id: u64,
    target_id: String,
    session_id: String,
    connection: Arc<Connection>,
    loads: watch::Sender<Option<PageLoad>>,
    closed: AtomicBool,
}

impl CdpSurface {
    fn load_id(&self, origin: &str) -> String {
        format!("cdp-{}-{}", self.target_id, origin)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::surface(format!("surface {}", self.id), "surface is closed"));
        }
        Ok(())
    }
}

/// Emit a [`PageLoad`] whenever a new document reaches `complete`.
async fn poll_loads(surface: Arc<CdpSurface>, every: Duration) {
    let mut last_origin = String::new();
    let mut seq = 0;
    let mut ticker = tokio::time::interval(every);
    while !surface.closed.load(Ordering::SeqCst) {
        ticker.tick().await;
        let state = match surface
            .connection
            .evaluate(&surface.session_id, LOAD_STATE_JS)
            .await
            .and_then(|v| Ok(serde_json::from_value::<LoadState>(v)?))
        {
            Ok(state) => state,
            Err(e) => {
                log::debug!("Load poll on surface {} failed: {}", surface.id, e);
                continue;
            }
        };
        if state.ready == "complete" && state.origin != last_origin {
            seq += 1;
            last_origin = state.origin;
            let load = PageLoad {
                seq,
                url: state.url,
                load_id: surface.load_id(&last_origin),
            };
            log::debug!("Surface {} loaded {}", surface.id, load.url);
            surface.loads.send_replace(Some(load));
        }
    }
}

#[async_trait]
impl Surface for CdpSurface {
    fn id(&self) -> u64 {
        self.id
    }

    async fn snapshot(&self) -> Result<PageSnapshot> {
        self.ensure_open()?;
        let raw: RawSnapshot =
            serde_json::from_value(self.connection.evaluate(&self.session_id, SNAPSHOT_JS).await?)?;
        Ok(PageSnapshot {
            url: raw.url,
            load_id: self.load_id(&raw.origin),
            html: raw.html,
            live: raw.live,
        })
    }

    async fn perform(&self, action: PageAction) -> Result<()> {
        self.ensure_open()?;
        let (kind, value) = match &action {
            PageAction::Click(_) => ("click", ""),
            PageAction::Toggle(_) => ("toggle", ""),
            PageAction::SetValue { value, .. } => ("set", value.as_str()),
            PageAction::Highlight(_) => ("highlight", ""),
        };
        let expression = format!(
            "{ACTION_JS}({}, {}, {})",
            serde_json::to_string(action.locator())?,
            serde_json::to_string(kind)?,
            serde_json::to_string(value)?,
        );
        let done = self.connection.evaluate(&self.session_id, &expression).await?;
        if done != Value::Bool(true) {
            return Err(AppError::surface(
                format!("surface {}", self.id),
                format!("no element at {}", action.locator()),
            ));
        }
        Ok(())
    }

    fn loads(&self) -> watch::Receiver<Option<PageLoad>> {
        self.loads.subscribe()
    }

    async fn focus(&self) -> Result<()> {
        self.ensure_open()?;
        self.connection
            .call("Target.activateTarget", json!({ "targetId": self.target_id }), None)
            .await?;
        Ok(())
    }

    async fn set_pinned(&self, pinned: bool) -> Result<()> {
        log::debug!("Ignoring pinned={} for target {}", pinned, self.target_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connection
            .call("Target.closeTarget", json!({ "targetId": self.target_id }), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_payload_shape() {
        let raw: RawSnapshot = serde_json::from_value(json!({
            "url": "https://site.test/user/Home",
            "origin": "1717200000000.5",
            "html": "<html></html>",
            "live": { "html > body:nth-child(2) > input:nth-child(1)": { "checked": true, "hidden": false } }
        }))
        .unwrap();
        let state = raw.live.values().next().unwrap();
        assert_eq!(state.checked, Some(true));
        assert_eq!(state.value, None);
    }

    #[test]
    fn test_action_expression_quotes_arguments() {
        let locator = r#"html > body:nth-child(2) > input[name="a"]"#;
        let expression = format!(
            "{ACTION_JS}({}, {}, {})",
            serde_json::to_string(locator).unwrap(),
            serde_json::to_string("set").unwrap(),
            serde_json::to_string("2024-06-01").unwrap(),
        );
        assert!(expression.ends_with(r#"("html > body:nth-child(2) > input[name=\"a\"]", "set", "2024-06-01")"#));
    }
}
