use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

pub(crate) const DEFAULT_API_PREFIX: &str = "/api";
pub(crate) const DEFAULT_DEBOUNCE_MS: i32 = 500;

/// Runtime configuration injected into the page at render time.
///
/// The server renders `window.ENV` (and a `csrf-token` meta tag) before the
/// wasm bundle boots; nothing here is persisted by the client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct EnvConfig {
    pub api_url: String,
    pub api_prefix: String,
    pub csrf_token: Option<String>,
    pub debounce_ms: i32,
}

impl EnvConfig {
    pub fn new() -> Self {
        let mut cfg = Self::fallback();

        if let Some(window) = web_sys::window() {
            if let Some(env) = window.get("ENV") {
                if !env.is_undefined() && env.is_object() {
                    // `API_URL` is the documented key; `api_url` is still emitted by older templates.
                    if let Some(url) = read_string(&env, "API_URL").or_else(|| read_string(&env, "api_url")) {
                        cfg.api_url = url;
                    }
                    if let Some(prefix) = read_string(&env, "API_PREFIX") {
                        cfg.api_prefix = prefix;
                    }
                    if let Some(token) = read_string(&env, "CSRF_TOKEN") {
                        cfg.csrf_token = Some(token);
                    }
                    if let Some(ms) = js_sys::Reflect::get(&env, &"DEBOUNCE_MS".into())
                        .ok()
                        .and_then(|v| v.as_f64())
                    {
                        cfg.debounce_ms = ms as i32;
                    }
                }
            }

            // reqwest only accepts absolute URLs, so "same origin" means the page's own origin.
            if let Ok(origin) = window.location().origin() {
                cfg = cfg.with_origin(&origin);
            }

            if cfg.csrf_token.is_none() {
                cfg.csrf_token = window
                    .document()
                    .and_then(|d| d.query_selector("meta[name=\"csrf-token\"]").ok().flatten())
                    .and_then(|m| m.get_attribute("content"));
            }
        }

        cfg.csrf_token = cfg.csrf_token.filter(|t| !t.trim().is_empty());
        cfg
    }

    pub fn fallback() -> Self {
        Self {
            api_url: String::new(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            csrf_token: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }

    /// Fills a blank `api_url` with the page origin; an explicit one is kept.
    pub fn with_origin(mut self, origin: &str) -> Self {
        if self.api_url.trim().is_empty() {
            self.api_url = origin.trim_end_matches('/').to_string();
        }
        self
    }

    /// Absolute root every gateway endpoint is appended to.
    pub fn api_root(&self) -> String {
        format!(
            "{}{}",
            self.api_url.trim_end_matches('/'),
            normalize_prefix(&self.api_prefix)
        )
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn read_string(obj: &JsValue, key: &str) -> Option<String> {
    js_sys::Reflect::get(obj, &key.into())
        .ok()
        .and_then(|v| v.as_string())
}

fn normalize_prefix(prefix: &str) -> String {
    let p = prefix.trim().trim_end_matches('/');
    if p.is_empty() {
        String::new()
    } else if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiClient, Method};

    #[test]
    fn api_root_joins_url_and_prefix() {
        let mut cfg = EnvConfig::fallback();
        cfg.api_url = "https://dash.example.com/".to_string();
        cfg.api_prefix = "api/v1/".to_string();
        assert_eq!(cfg.api_root(), "https://dash.example.com/api/v1");
    }

    #[test]
    fn fallback_is_relative_until_an_origin_is_known() {
        let cfg = EnvConfig::fallback();
        assert_eq!(cfg.api_root(), "/api");
        assert!(cfg.csrf_token.is_none());
        assert_eq!(cfg.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn blank_api_url_resolves_against_page_origin() {
        let cfg = EnvConfig::fallback().with_origin("https://dash.example.com/");
        assert_eq!(cfg.api_root(), "https://dash.example.com/api");

        let client = ApiClient::from_config(&cfg);
        let prepared = client
            .prepare(Method::Get, "/productivity/tasks", None)
            .expect("prepared");
        let built = reqwest::Client::new()
            .request(reqwest::Method::GET, &prepared.url)
            .build()
            .expect("absolute url is sendable");
        assert_eq!(built.url().as_str(), "https://dash.example.com/api/productivity/tasks");
    }

    #[test]
    fn explicit_api_url_wins_over_origin() {
        let mut cfg = EnvConfig::fallback();
        cfg.api_url = "https://api.example.com".to_string();
        let cfg = cfg.with_origin("https://dash.example.com");
        assert_eq!(cfg.api_root(), "https://api.example.com/api");
    }

    #[test]
    fn empty_prefix_is_allowed() {
        let mut cfg = EnvConfig::fallback();
        cfg.api_url = "http://localhost:8000".to_string();
        cfg.api_prefix = String::new();
        assert_eq!(cfg.api_root(), "http://localhost:8000");
    }
}
