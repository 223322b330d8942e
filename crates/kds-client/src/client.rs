//! Resilient request client.
//!
//! `request_json` never returns `Err`: every call ends in a [`RequestOutcome`]
//! whose `ok` flag is decided by the business payload (`response_code == "1"`)
//! on top of a 2xx transport result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::credentials::CredentialProvider;
use crate::payload::{business_code, is_success_payload, parse_body, response_message};
use crate::policy::{AttemptReport, RetryPolicy};
use crate::transport::{
    HttpTransport, Method, OutboundRequest, RawResponse, ReqwestTransport, TransportError,
};

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "x-ps365-token";
/// Query parameter carrying the session token when requested.
pub const TOKEN_QUERY_PARAM: &str = "token";
/// Body object the token is merged into on POST.
pub const CREDENTIALS_FIELD: &str = "api_credentials";

/// Per-call overrides. Unset fields fall back to the client's [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub include_token_header: bool,
    pub attach_token_in_query: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            retries: None,
            timeout: None,
            cancel: None,
            include_token_header: true,
            attach_token_in_query: false,
        }
    }
}

impl RequestOptions {
    pub fn retries(mut self, n: u32) -> Self {
        self.retries = Some(n);
        self
    }

    pub fn timeout(mut self, t: Duration) -> Self {
        self.timeout = Some(t);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn include_token_header(mut self, yes: bool) -> Self {
        self.include_token_header = yes;
        self
    }

    pub fn attach_token_in_query(mut self, yes: bool) -> Self {
        self.attach_token_in_query = yes;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub ok: bool,
    /// Last HTTP status seen; 0 when no response was ever obtained.
    pub status: u16,
    pub attempts: u32,
    /// `"(<code>) <message>"` when `ok` is false.
    pub error: Option<String>,
    /// Last parsed payload (`{}` when none).
    pub data: Value,
    /// The caller's cancellation token fired. Never retried.
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct RequestClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Result of one attempt, before the retry decision.
enum Attempt {
    Response { status: u16, reason: String, data: Value },
    Transport(TransportError),
}

impl RequestClient {
    /// Client over the production `reqwest` transport.
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_transport(base_url, Arc::new(ReqwestTransport::new()), credentials)
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            credentials,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &BTreeMap<String, String>,
        opts: &RequestOptions,
    ) -> RequestOutcome {
        let cancel = opts.cancel.clone().unwrap_or_default();
        let retries = opts.retries.unwrap_or(self.policy.retries);
        let timeout = opts.timeout.unwrap_or(self.policy.timeout);
        let max_attempts = retries.saturating_add(1);

        let req = match self.build_request(method, path, body, query, opts) {
            Ok(req) => req,
            Err(msg) => return failed(0, 0, None, msg, Value::Object(Map::new())),
        };

        let mut attempts = 0u32;
        let mut last: Option<Attempt> = None;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return cancelled_outcome(attempts, last);
            }
            attempts = attempt + 1;
            debug!(method = method.as_str(), path, attempt = attempts, "upstream request");

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                r = tokio::time::timeout(timeout, self.transport.send(req.clone())) => {
                    r.unwrap_or(Err(TransportError::Timeout))
                }
            };

            let current = match sent {
                Err(TransportError::Cancelled) => return cancelled_outcome(attempts, last),
                Err(e) => Attempt::Transport(e),
                Ok(resp) => classify(resp),
            };

            let retry = match &current {
                Attempt::Transport(_) => self.policy.should_retry(AttemptReport {
                    status: None,
                    transport_failed: true,
                    payload: None,
                }),
                Attempt::Response { status, data, .. } => {
                    if is_ok(*status, data) {
                        return RequestOutcome {
                            ok: true,
                            status: *status,
                            attempts,
                            error: None,
                            data: data.clone(),
                            cancelled: false,
                        };
                    }
                    self.policy.should_retry(AttemptReport {
                        status: Some(*status),
                        transport_failed: false,
                        payload: Some(data),
                    })
                }
            };
            last = Some(current);

            if !retry || attempts >= max_attempts {
                break;
            }

            let delay = self.policy.backoff_delay(attempt);
            warn!(
                path,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "upstream attempt failed; backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled_outcome(attempts, last),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        exhausted(attempts, last)
    }

    /// POST and return the payload whatever its business code.
    pub async fn post_json(&self, path: &str, body: &Value, opts: &RequestOptions) -> Value {
        self.request_json(Method::Post, path, Some(body), &BTreeMap::new(), opts)
            .await
            .data
    }

    /// GET and return the payload whatever its business code.
    pub async fn get_json(
        &self,
        path: &str,
        query: &BTreeMap<String, String>,
        opts: &RequestOptions,
    ) -> Value {
        self.request_json(Method::Get, path, None, query, opts)
            .await
            .data
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &BTreeMap<String, String>,
        opts: &RequestOptions,
    ) -> Result<OutboundRequest, String> {
        let token = self.credentials.token().filter(|t| !t.is_empty());

        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = reqwest::Url::parse(&raw)
            .map_err(|e| format!("invalid url '{raw}': {e}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
            if opts.attach_token_in_query && !query.contains_key(TOKEN_QUERY_PARAM) {
                if let Some(t) = &token {
                    pairs.append_pair(TOKEN_QUERY_PARAM, t);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let mut headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ];
        if opts.include_token_header {
            if let Some(t) = &token {
                headers.push((TOKEN_HEADER.to_string(), t.clone()));
            }
        }

        let body = match method {
            Method::Get => None,
            Method::Post => {
                let mut payload = body.cloned().unwrap_or_else(|| Value::Object(Map::new()));
                if let Some(t) = &token {
                    merge_token(&mut payload, t);
                }
                Some(payload.to_string())
            }
        };

        Ok(OutboundRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }
}

/// Set `api_credentials.token`, keeping any other credential fields.
fn merge_token(payload: &mut Value, token: &str) {
    let Value::Object(obj) = payload else {
        return;
    };
    let creds = obj
        .entry(CREDENTIALS_FIELD)
        .or_insert_with(|| Value::Object(Map::new()));
    if !creds.is_object() {
        *creds = Value::Object(Map::new());
    }
    if let Value::Object(c) = creds {
        c.insert("token".to_string(), Value::String(token.to_string()));
    }
}

fn classify(resp: RawResponse) -> Attempt {
    Attempt::Response {
        status: resp.status,
        data: parse_body(&resp.body),
        reason: resp.reason,
    }
}

fn is_ok(status: u16, data: &Value) -> bool {
    (200..300).contains(&status) && is_success_payload(data)
}

fn exhausted(attempts: u32, last: Option<Attempt>) -> RequestOutcome {
    match last {
        Some(Attempt::Response {
            status,
            reason,
            data,
        }) => {
            let msg = response_message(&data)
                .or_else(|| (!reason.is_empty()).then_some(reason))
                .unwrap_or_else(|| "Unknown error".to_string());
            let code = business_code(&data);
            failed(status, attempts, code, msg, data)
        }
        Some(Attempt::Transport(e)) => {
            failed(0, attempts, None, e.to_string(), Value::Object(Map::new()))
        }
        None => failed(
            0,
            attempts,
            None,
            "Unknown error".to_string(),
            Value::Object(Map::new()),
        ),
    }
}

fn failed(
    status: u16,
    attempts: u32,
    code: Option<String>,
    msg: String,
    data: Value,
) -> RequestOutcome {
    let code = code
        .or_else(|| (status != 0).then(|| status.to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    RequestOutcome {
        ok: false,
        status,
        attempts,
        error: Some(format!("({code}) {msg}")),
        data,
        cancelled: false,
    }
}

fn cancelled_outcome(attempts: u32, last: Option<Attempt>) -> RequestOutcome {
    let (status, data) = match last {
        Some(Attempt::Response { status, data, .. }) => (status, data),
        _ => (0, Value::Object(Map::new())),
    };
    RequestOutcome {
        ok: false,
        status,
        attempts,
        error: Some(format!("(unknown) {}", TransportError::Cancelled)),
        data,
        cancelled: true,
    }
}
