use crate::config::EnvConfig;
use crate::models::Envelope;
use thiserror::Error;

pub(crate) const CSRF_HEADER: &str = "X-CSRFToken";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub(crate) enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request body. JSON bodies get a JSON content type; multipart bodies are sent
/// as-is so the browser can set the boundary.
pub(crate) enum Payload {
    Json(serde_json::Value),
    Multipart(reqwest::multipart::Form),
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

impl From<reqwest::multipart::Form> for Payload {
    fn from(f: reqwest::multipart::Form) -> Self {
        Payload::Multipart(f)
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Payload::Multipart(_) => f.write_str("Multipart(..)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub(crate) enum GatewayError {
    /// The page was rendered without a forgery-protection token.
    #[error("missing CSRF token, refusing to send {method} {endpoint}")]
    MissingCsrfToken { method: Method, endpoint: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    /// `success: false` from the server.
    #[error("{message}")]
    Rejected {
        message: String,
        errors: Option<serde_json::Value>,
    },
}

impl GatewayError {
    /// Precondition failures are programming/page errors, not something a user can retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::MissingCsrfToken { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_) | GatewayError::Http { .. } | GatewayError::Decode(_)
        )
    }

    /// Text suitable for a notice or an inline modal error.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Rejected { message, .. } if !message.trim().is_empty() => message.clone(),
            GatewayError::Rejected { .. } => "The server rejected the request".to_string(),
            GatewayError::Http { message, .. } if !message.trim().is_empty() => message.clone(),
            _ => "Could not reach the server. Please try again.".to_string(),
        }
    }
}

pub(crate) type GatewayResult<T> = Result<T, GatewayError>;

type SuccessFn = Box<dyn FnOnce(&Envelope)>;
type FailureFn = Box<dyn FnOnce(&GatewayError)>;

/// Optional hooks run before the request future resolves.
#[derive(Default)]
pub(crate) struct Callbacks {
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
}

impl Callbacks {
    pub fn on_success(mut self, f: impl FnOnce(&Envelope) + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnOnce(&GatewayError) + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }
}

/// A request that passed the precondition check and is ready to hit the network.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub csrf_token: String,
    pub payload: Option<Payload>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ApiClient {
    pub(crate) api_root: String,
    pub(crate) csrf_token: Option<String>,
}

impl ApiClient {
    pub fn new(api_root: String, csrf_token: Option<String>) -> Self {
        Self {
            api_root,
            csrf_token,
        }
    }

    pub fn from_config(cfg: &EnvConfig) -> Self {
        Self::new(cfg.api_root(), cfg.csrf_token.clone())
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim_start_matches('/');
        format!("{}/{}", self.api_root.trim_end_matches('/'), endpoint)
    }

    /// Fails before anything is sent when the page carries no token.
    pub fn prepare(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<Payload>,
    ) -> GatewayResult<PreparedRequest> {
        let Some(token) = self.csrf_token.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Err(GatewayError::MissingCsrfToken {
                method,
                endpoint: endpoint.to_string(),
            });
        };

        Ok(PreparedRequest {
            method,
            url: self.url_for(endpoint),
            csrf_token: token.to_string(),
            payload,
        })
    }

    /// Sends a request and settles the envelope.
    ///
    /// Every failure (transport, status, decode, `success: false`) comes back as `Err`,
    /// after `on_failure` has run or the failure has been logged.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<Payload>,
        callbacks: Callbacks,
    ) -> GatewayResult<Envelope> {
        let prepared = match self.prepare(method, endpoint, payload) {
            Ok(p) => p,
            Err(e) => {
                log::error!("{e}");
                return Err(e);
            }
        };

        log::debug!("{} {}", prepared.method, prepared.url);
        settle(send(prepared).await, callbacks)
    }

    pub async fn get(&self, endpoint: &str) -> GatewayResult<Envelope> {
        self.request(Method::Get, endpoint, None, Callbacks::default()).await
    }

    pub async fn post(&self, endpoint: &str, payload: impl Into<Payload>) -> GatewayResult<Envelope> {
        self.request(Method::Post, endpoint, Some(payload.into()), Callbacks::default())
            .await
    }

    pub async fn patch(&self, endpoint: &str, payload: impl Into<Payload>) -> GatewayResult<Envelope> {
        self.request(Method::Patch, endpoint, Some(payload.into()), Callbacks::default())
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> GatewayResult<Envelope> {
        self.request(Method::Delete, endpoint, None, Callbacks::default())
            .await
    }
}

async fn send(prepared: PreparedRequest) -> GatewayResult<Envelope> {
    let client = reqwest::Client::new();
    let mut req = client
        .request(prepared.method.as_reqwest(), &prepared.url)
        .header(CSRF_HEADER, prepared.csrf_token)
        .header("Accept", "application/json");

    req = match prepared.payload {
        Some(Payload::Json(body)) => req.json(&body),
        Some(Payload::Multipart(form)) => req.multipart(form),
        None => req,
    };

    let res = req
        .send()
        .await
        .map_err(|e| GatewayError::Network(e.to_string()))?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| GatewayError::Network(e.to_string()))?;

    decode_response(status.as_u16(), status.is_success(), &body)
}

/// Maps a raw status/body pair onto the envelope contract.
pub(crate) fn decode_response(status: u16, is_success: bool, body: &str) -> GatewayResult<Envelope> {
    let parsed = serde_json::from_str::<Envelope>(body);

    if !is_success {
        // Error pages sometimes still carry an envelope; prefer its message.
        let message = match parsed {
            Ok(env) if !env.message.trim().is_empty() => env.message,
            _ => body.trim().to_string(),
        };
        return Err(GatewayError::Http { status, message });
    }

    parsed.map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Runs the callbacks for an outcome and hands it back.
pub(crate) fn settle(outcome: GatewayResult<Envelope>, callbacks: Callbacks) -> GatewayResult<Envelope> {
    let outcome = outcome.and_then(|env| {
        if env.success {
            Ok(env)
        } else {
            Err(GatewayError::Rejected {
                message: env.message,
                errors: env.errors,
            })
        }
    });

    match outcome {
        Ok(env) => {
            if let Some(f) = callbacks.on_success {
                f(&env);
            }
            Ok(env)
        }
        Err(e) => {
            match callbacks.on_failure {
                Some(f) => f(&e),
                None if e.is_transport() => log::error!("{e}"),
                None => log::warn!("{e}"),
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ok_envelope() -> Envelope {
        Envelope {
            success: true,
            message: "Saved".to_string(),
            data: Some(serde_json::json!({"id": 3})),
            errors: None,
        }
    }

    #[test]
    fn request_without_token_fails_before_sending() {
        let client = ApiClient::new("/api".to_string(), None);
        let err = client
            .prepare(Method::Delete, "/productivity/tasks/1", None)
            .expect_err("token is required");
        assert!(err.is_fatal());
        assert!(matches!(err, GatewayError::MissingCsrfToken { method: Method::Delete, .. }));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let client = ApiClient::new("/api".to_string(), Some("  ".to_string()));
        assert!(client.prepare(Method::Get, "/x", None).is_err());
    }

    #[test]
    fn prepare_builds_url_under_api_root() {
        let client = ApiClient::new("https://h/api/".to_string(), Some("tok".to_string()));
        let p = client
            .prepare(Method::Patch, "/health/metrics/4", Some(serde_json::json!({"value": 1}).into()))
            .expect("prepared");
        assert_eq!(p.url, "https://h/api/health/metrics/4");
        assert_eq!(p.csrf_token, "tok");
        assert!(matches!(p.payload, Some(Payload::Json(_))));
    }

    #[test]
    fn method_display_is_uppercase() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn settle_success_runs_on_success() {
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let cb = Callbacks::default().on_success(move |env| {
            *seen2.borrow_mut() = Some(env.message.clone());
        });

        let env = settle(Ok(ok_envelope()), cb).expect("success");
        assert_eq!(env.message, "Saved");
        assert_eq!(seen.borrow().as_deref(), Some("Saved"));
    }

    #[test]
    fn settle_business_failure_runs_on_failure_and_still_rejects() {
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let cb = Callbacks::default()
            .on_success(|_| panic!("must not run"))
            .on_failure(move |e| {
                *seen2.borrow_mut() = Some(e.user_message());
            });

        let env = Envelope {
            success: false,
            message: "Name taken".to_string(),
            data: None,
            errors: Some(serde_json::json!({"name": "taken"})),
        };
        let err = settle(Ok(env), cb).expect_err("business failure rejects");
        assert_eq!(seen.borrow().as_deref(), Some("Name taken"));
        assert!(matches!(err, GatewayError::Rejected { errors: Some(_), .. }));
    }

    #[test]
    fn settle_without_on_failure_still_rejects() {
        let err = settle(Err(GatewayError::Network("offline".to_string())), Callbacks::default())
            .expect_err("transport failure rejects");
        assert!(err.is_transport());
    }

    #[test]
    fn transport_failures_share_the_failure_callback() {
        let count = Rc::new(RefCell::new(0));
        for outcome in [
            Err(GatewayError::Network("x".to_string())),
            decode_response(500, false, "boom"),
            decode_response(200, true, "<html>"),
        ] {
            let c = count.clone();
            let cb = Callbacks::default().on_failure(move |_| *c.borrow_mut() += 1);
            assert!(settle(outcome, cb).is_err());
        }
        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn decode_prefers_envelope_message_on_error_status() {
        let err = decode_response(400, false, r#"{"success": false, "message": "Bad date"}"#)
            .expect_err("non-2xx");
        assert_eq!(
            err,
            GatewayError::Http {
                status: 400,
                message: "Bad date".to_string()
            }
        );
        assert_eq!(err.user_message(), "Bad date");
    }

    #[test]
    fn decode_success_body() {
        let env = decode_response(200, true, r#"{"success": true, "message": "ok", "data": [1]}"#)
            .expect("decodes");
        assert!(env.success);
        assert_eq!(env.data, Some(serde_json::json!([1])));
    }
}
