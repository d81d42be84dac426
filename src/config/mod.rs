use crate::options::EndOfDataPolicy;
use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EnvConfig {
    pub api_url: String,
}

impl EnvConfig {
    pub fn new() -> Self {
        // We support BOTH `window.ENV.API_URL` (documented) and
        // `window.ENV.api_url` (legacy) for compatibility.
        if let Some(url) = env_string("API_URL").or_else(|| env_string("api_url")) {
            return Self { api_url: url };
        }

        Self {
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables for the polling, notification and paging engines.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    /// Task poller period.
    pub poll_interval_ms: u32,
    /// How long an unlocked toast stays in the display queue.
    pub message_ttl_ms: u32,
    /// Page size for autocomplete sources.
    pub page_size: u32,
    /// Distance from the end of a scroll container that counts as "at the end".
    pub scroll_threshold_px: f64,
    pub end_of_data: EndOfDataPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            message_ttl_ms: 3000,
            page_size: 20,
            scroll_threshold_px: 1.0,
            end_of_data: EndOfDataPolicy::EmptyPage,
        }
    }
}

impl SyncConfig {
    /// Defaults, overridden by numeric `window.ENV` keys when present.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u32("POLL_INTERVAL_MS") {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = env_u32("MESSAGE_TTL_MS") {
            cfg.message_ttl_ms = v;
        }
        if let Some(v) = env_u32("PAGE_SIZE") {
            cfg.page_size = v;
        }
        cfg.apply_bounds()
    }

    fn apply_bounds(mut self) -> Self {
        // A zero period would spin the poller and a zero page size never advances.
        self.poll_interval_ms = self.poll_interval_ms.max(100);
        self.page_size = self.page_size.max(1);
        self
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env_string(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(target_arch = "wasm32")]
fn env_string(key: &str) -> Option<String> {
    let env = web_sys::window()?.get("ENV")?;
    if env.is_undefined() || !env.is_object() {
        return None;
    }
    let value = js_sys::Reflect::get(&env, &key.into()).ok()?;
    value
        .as_string()
        .or_else(|| value.as_f64().map(|n| n.to_string()))
}

#[cfg(not(target_arch = "wasm32"))]
fn env_string(_key: &str) -> Option<String> {
    None
}
