//! A provider that evaluates flags remotely over the OpenFeature Remote Evaluation Protocol.
use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use url::Url;

use crate::{
    config::{self, ConfigLookup, ProcessEnv},
    ofrep::{EvaluationFailure, EvaluationRequest, EvaluationSuccess},
    Error, ErrorCode, EvaluationContext, EvaluationError, FeatureProvider, FlagValue,
    ProviderMetadata, ProviderStatus, ResolutionDetail, Result,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Back-off applied after a `429` response without a usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Upper bound on the back-off requested by a `Retry-After` header.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

const EVALUATE_PATH: [&str; 4] = ["ofrep", "v1", "evaluate", "flags"];

/// Configuration of [`OfrepProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfrepProviderConfig {
    base_url: String,
    timeout: Duration,
    headers: Vec<(String, String)>,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl OfrepProviderConfig {
    /// Create a configuration for the OFREP service at `base_url` (e.g.,
    /// `"https://flags.example.com"`).
    pub fn from_base_url(base_url: impl Into<String>) -> OfrepProviderConfig {
        OfrepProviderConfig {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            headers: Vec::new(),
            api_key: None,
            bearer_token: None,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// `OFREP_ENDPOINT` is required. `OFREP_TIMEOUT_MS`, `OFREP_API_KEY`, `OFREP_BEARER_TOKEN`,
    /// and `OFREP_HEADERS` (`name=value,name2=value2`) are optional.
    pub fn from_env() -> Result<OfrepProviderConfig> {
        OfrepProviderConfig::from_lookup(&ProcessEnv)
    }

    pub fn from_lookup(lookup: &impl ConfigLookup) -> Result<OfrepProviderConfig> {
        let base_url = config::var(lookup, "OFREP_ENDPOINT").ok_or_else(|| {
            Error::InvalidConfiguration("OFREP_ENDPOINT is required".to_owned())
        })?;
        Url::parse(&base_url).map_err(Error::InvalidBaseUrl)?;

        Ok(OfrepProviderConfig {
            base_url,
            timeout: config::parse_millis(lookup, "OFREP_TIMEOUT_MS")?.unwrap_or(DEFAULT_TIMEOUT),
            headers: config::parse_pairs(lookup, "OFREP_HEADERS")?,
            api_key: config::var(lookup, "OFREP_API_KEY"),
            bearer_token: config::var(lookup, "OFREP_BEARER_TOKEN"),
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sent as `X-API-Key`.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sent as `Authorization: Bearer <token>`.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if let Some(token) = &self.bearer_token {
            headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
        }
        if let Some(api_key) = &self.api_key {
            headers.push(("X-API-Key".to_owned(), api_key.clone()));
        }
        headers
    }
}

/// A single OFREP evaluation request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// JSON-encoded [`EvaluationRequest`].
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportResponse {
    pub status: u16,
    /// Value of the `Retry-After` header, if any.
    pub retry_after: Option<String>,
    pub body: Vec<u8>,
}

/// Sends OFREP requests. [`ReqwestTransport`] is the HTTP implementation.
pub trait OfrepTransport: Send + Sync {
    fn post(&self, request: TransportRequest) -> Result<TransportResponse>;
}

impl<F: Fn(TransportRequest) -> Result<TransportResponse> + Send + Sync> OfrepTransport for F {
    fn post(&self, request: TransportRequest) -> Result<TransportResponse> {
        self(request)
    }
}

/// Blocking HTTP transport.
pub struct ReqwestTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<ReqwestTransport> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(ReqwestTransport { client })
    }
}

impl OfrepTransport for ReqwestTransport {
    fn post(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self
            .client
            .post(request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|it| it.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes()?.to_vec();

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Evaluates flags by calling an OFREP service for every evaluation.
///
/// After a `429 Too Many Requests` response, the provider serves errors without contacting the
/// service until the `Retry-After` interval has passed.
pub struct OfrepProvider {
    base_url: Url,
    headers: Vec<(String, String)>,
    transport: Box<dyn OfrepTransport>,
    retry_at: Mutex<Option<Instant>>,
}

impl OfrepProvider {
    /// Create a provider that talks HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUrl`] if the configured URL cannot be parsed, or
    /// [`Error::Network`] if the HTTP client cannot be created.
    pub fn new(config: OfrepProviderConfig) -> Result<OfrepProvider> {
        let transport = ReqwestTransport::new(config.timeout)?;
        OfrepProvider::with_transport(config, transport)
    }

    /// Create a provider that sends requests through `transport`.
    pub fn with_transport(
        config: OfrepProviderConfig,
        transport: impl OfrepTransport + 'static,
    ) -> Result<OfrepProvider> {
        let base_url = Url::parse(&config.base_url).map_err(Error::InvalidBaseUrl)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfiguration(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        Ok(OfrepProvider {
            base_url,
            headers: config.request_headers(),
            transport: Box::new(transport),
            retry_at: Mutex::new(None),
        })
    }

    fn evaluation_url(&self, flag_key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(EVALUATE_PATH)
                .push(flag_key);
        }
        url
    }

    /// Return the instant until which requests are suspended, if it is still in the future.
    fn rate_limited_until(&self, now: Instant) -> Option<Instant> {
        let mut retry_at = self
            .retry_at
            .lock()
            .expect("thread holding rate limit lock should not panic");
        match *retry_at {
            Some(at) if at > now => Some(at),
            _ => {
                *retry_at = None;
                None
            }
        }
    }

    fn evaluate<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        match self.fetch(flag_key, context) {
            Ok(detail) => detail.into_typed(default_value),
            Err(error) => ResolutionDetail::from_error(default_value, error),
        }
    }

    fn fetch(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> std::result::Result<ResolutionDetail<serde_json::Value>, EvaluationError> {
        if let Some(until) = self.rate_limited_until(Instant::now()) {
            return Err(EvaluationError::general(format!(
                "rate limited, retrying in {}s",
                until.saturating_duration_since(Instant::now()).as_secs()
            )));
        }

        let body = serde_json::to_vec(&EvaluationRequest {
            context: context.flatten(),
        })
        .map_err(|err| EvaluationError::general(format!("failed to encode request: {err}")))?;

        log::trace!(target: "openfeature", flag_key; "sending OFREP evaluation request");
        let response = self
            .transport
            .post(TransportRequest {
                url: self.evaluation_url(flag_key),
                headers: self.headers.clone(),
                body,
            })
            .map_err(|err| {
                log::warn!(target: "openfeature", flag_key; "OFREP request failed: {}", err);
                EvaluationError::general(format!("request failed: {err}"))
            })?;

        match response.status {
            200 => {
                let success = serde_json::from_slice::<EvaluationSuccess>(&response.body)
                    .map_err(|err| {
                        EvaluationError::new(
                            ErrorCode::ParseError,
                            format!("invalid evaluation response: {err}"),
                        )
                    })?;
                let mut detail = ResolutionDetail::new(success.value).with_reason(success.reason);
                detail.variant = success.variant;
                detail.flag_metadata = success.metadata.unwrap_or_default();
                Ok(detail)
            }
            400 => Err(match failure_body(&response.body) {
                Some(failure) => EvaluationError {
                    code: failure.error_code,
                    message: failure.error_details,
                },
                None => EvaluationError::general("bad request"),
            }),
            401 | 403 => {
                log::warn!(target: "openfeature", status = response.status; "OFREP request was not authorized. Check your credentials");
                Err(EvaluationError::general("unauthorized"))
            }
            404 => Err(match failure_body(&response.body).and_then(|it| it.error_details) {
                Some(details) => EvaluationError::new(ErrorCode::FlagNotFound, details),
                None => EvaluationError::flag_not_found(flag_key),
            }),
            429 => {
                let delay = retry_after(response.retry_after.as_deref(), Utc::now());
                let now = Instant::now();
                let until = now
                    .checked_add(delay)
                    .unwrap_or_else(|| now + DEFAULT_RETRY_AFTER);
                log::warn!(target: "openfeature", retry_after_secs = delay.as_secs(); "OFREP service is rate limiting requests");
                *self
                    .retry_at
                    .lock()
                    .expect("thread holding rate limit lock should not panic") =
                    Some(until);
                Err(EvaluationError::general("rate limited"))
            }
            status => Err(EvaluationError::general(format!(
                "unexpected response status {status}"
            ))),
        }
    }
}

fn failure_body(body: &[u8]) -> Option<EvaluationFailure> {
    serde_json::from_slice(body).ok()
}

/// Interpret a `Retry-After` header: either a number of seconds or an HTTP date.
///
/// The result never exceeds [`MAX_RETRY_AFTER`].
fn retry_after(value: Option<&str>, now: DateTime<Utc>) -> Duration {
    let Some(value) = value.map(str::trim) else {
        return DEFAULT_RETRY_AFTER;
    };
    let delay = if let Ok(seconds) = value.parse::<u64>() {
        Duration::from_secs(seconds)
    } else {
        match DateTime::parse_from_rfc2822(value) {
            Ok(date) => (date.with_timezone(&Utc) - now)
                .to_std()
                .unwrap_or(Duration::ZERO),
            Err(_) => DEFAULT_RETRY_AFTER,
        }
    };
    delay.min(MAX_RETRY_AFTER)
}

impl FeatureProvider for OfrepProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new("OFREP Provider")
    }

    /// `Error` while requests are suspended after a `429` response.
    fn status(&self) -> ProviderStatus {
        match self.rate_limited_until(Instant::now()) {
            Some(_) => ProviderStatus::Error,
            None => ProviderStatus::Ready,
        }
    }

    fn resolve_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> ResolutionDetail<bool> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_string_value(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> ResolutionDetail<String> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_integer_value(
        &self,
        flag_key: &str,
        default_value: i64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<i64> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<f64> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_object_value(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: &EvaluationContext,
    ) -> ResolutionDetail<serde_json::Value> {
        self.evaluate(flag_key, default_value, context)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{
        retry_after, OfrepProvider, OfrepProviderConfig, TransportRequest, TransportResponse,
        DEFAULT_RETRY_AFTER, MAX_RETRY_AFTER,
    };
    use crate::{
        Error, ErrorCode, EvaluationContext, FeatureProvider, ProviderStatus, Reason, Result,
    };

    type Requests = Arc<Mutex<Vec<TransportRequest>>>;

    fn respond(status: u16, body: serde_json::Value) -> TransportResponse {
        TransportResponse {
            status,
            retry_after: None,
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    /// Provider whose transport always answers with `response` and records requests.
    fn provider(config: OfrepProviderConfig, response: TransportResponse) -> (OfrepProvider, Requests) {
        let requests = Requests::default();
        let recorded = requests.clone();
        let provider = OfrepProvider::with_transport(config, move |request: TransportRequest| -> Result<_> {
            recorded.lock().unwrap().push(request);
            Ok(response.clone())
        })
        .unwrap();
        (provider, requests)
    }

    fn config() -> OfrepProviderConfig {
        OfrepProviderConfig::from_base_url("https://flags.example.com/")
    }

    #[test]
    fn sends_context_and_headers() {
        let (provider, requests) = provider(
            config().bearer_token("secret").header("X-Tenant", "acme"),
            respond(200, json!({"key": "dark mode", "value": true, "reason": "STATIC"})),
        );

        provider.resolve_boolean_value(
            "dark mode",
            false,
            &EvaluationContext::new()
                .with_targeting_key("user-1")
                .with_attribute("plan", "pro"),
        );

        let requests = requests.lock().unwrap();
        assert_eq!(
            requests[0].url.as_str(),
            "https://flags.example.com/ofrep/v1/evaluate/flags/dark%20mode"
        );
        assert_eq!(
            requests[0].headers,
            [
                ("X-Tenant".to_owned(), "acme".to_owned()),
                ("Authorization".to_owned(), "Bearer secret".to_owned()),
            ]
        );
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            json!({"context": {"targetingKey": "user-1", "plan": "pro"}})
        );
    }

    #[test]
    fn field_mapping() {
        let cases = [
            (
                respond(
                    200,
                    json!({
                        "key": "color",
                        "value": "red",
                        "reason": "TARGETING_MATCH",
                        "variant": "warm",
                        "metadata": {"team": "web"}
                    }),
                ),
                "red",
                Some(Reason::TargetingMatch),
                None,
            ),
            (
                respond(200, json!({"key": "color", "value": 7, "reason": "STATIC"})),
                "default",
                Some(Reason::Error),
                Some(ErrorCode::TypeMismatch),
            ),
            (
                respond(200, json!({"unexpected": true})),
                "default",
                Some(Reason::Error),
                Some(ErrorCode::ParseError),
            ),
            (
                respond(400, json!({"errorCode": "TARGETING_KEY_MISSING"})),
                "default",
                Some(Reason::Error),
                Some(ErrorCode::TargetingKeyMissing),
            ),
            (
                respond(401, json!({})),
                "default",
                Some(Reason::Error),
                Some(ErrorCode::General),
            ),
            (
                respond(403, json!({})),
                "default",
                Some(Reason::Error),
                Some(ErrorCode::General),
            ),
            (
                respond(404, json!({"errorCode": "FLAG_NOT_FOUND"})),
                "default",
                Some(Reason::Error),
                Some(ErrorCode::FlagNotFound),
            ),
            (
                respond(500, json!({})),
                "default",
                Some(Reason::Error),
                Some(ErrorCode::General),
            ),
        ];

        for (response, value, reason, error) in cases {
            let status = response.status;
            let (provider, _) = provider(config(), response);

            let detail =
                provider.resolve_string_value("color", "default".to_owned(), &EvaluationContext::new());

            assert_eq!(detail.value, value, "status {status}");
            assert_eq!(detail.reason, reason, "status {status}");
            assert_eq!(detail.error_code(), error, "status {status}");
        }
    }

    #[test]
    fn success_keeps_variant_and_metadata() {
        let (provider, _) = provider(
            config(),
            respond(
                200,
                json!({"key": "limit", "value": 3, "reason": "SPLIT", "variant": "small", "metadata": {"v": 2}}),
            ),
        );

        let detail = provider.resolve_float_value("limit", 0.0, &EvaluationContext::new());

        assert_eq!(detail.value, 3.0);
        assert_eq!(detail.variant.as_deref(), Some("small"));
        assert_eq!(detail.reason, Some(Reason::Split));
        assert_eq!(detail.flag_metadata.get("v"), Some(&json!(2)));
    }

    #[test]
    fn transport_failure_is_general() {
        let provider = OfrepProvider::with_transport(config(), |_: TransportRequest| -> Result<_> {
            Err(Error::from(std::io::Error::other("connection refused")))
        })
        .unwrap();

        let detail = provider.resolve_boolean_value("flag", true, &EvaluationContext::new());

        assert!(detail.value);
        assert_eq!(detail.error_code(), Some(ErrorCode::General));
    }

    #[test]
    fn rate_limit_suspends_requests() {
        let (provider, requests) = provider(
            config(),
            TransportResponse {
                status: 429,
                retry_after: Some("120".to_owned()),
                body: Vec::new(),
            },
        );

        let first = provider.resolve_boolean_value("flag", false, &EvaluationContext::new());
        let second = provider.resolve_boolean_value("flag", false, &EvaluationContext::new());

        assert_eq!(first.error_code(), Some(ErrorCode::General));
        assert_eq!(second.error_code(), Some(ErrorCode::General));
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert_eq!(provider.status(), ProviderStatus::Error);
    }

    #[test]
    fn retry_after_formats() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 0, 0).unwrap();

        assert_eq!(retry_after(Some("30"), now), Duration::from_secs(30));
        assert_eq!(
            retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT"), now),
            Duration::from_secs(28 * 60)
        );
        assert_eq!(
            retry_after(Some("Wed, 21 Oct 2015 06:00:00 GMT"), now),
            Duration::ZERO
        );
        assert_eq!(retry_after(Some("soon"), now), DEFAULT_RETRY_AFTER);
        assert_eq!(retry_after(None, now), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn retry_after_is_capped() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 0, 0).unwrap();

        assert_eq!(
            retry_after(Some("18446744073709551615"), now),
            MAX_RETRY_AFTER
        );
        assert_eq!(
            retry_after(Some("Fri, 31 Dec 9999 23:59:59 GMT"), now),
            MAX_RETRY_AFTER
        );
    }

    #[test]
    fn huge_retry_after_does_not_panic() {
        let (provider, requests) = provider(
            config(),
            TransportResponse {
                status: 429,
                retry_after: Some("18446744073709551615".to_owned()),
                body: Vec::new(),
            },
        );

        let first = provider.resolve_boolean_value("flag", false, &EvaluationContext::new());
        let second = provider.resolve_boolean_value("flag", false, &EvaluationContext::new());

        assert_eq!(first.error_code(), Some(ErrorCode::General));
        assert!(!second.value);
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert_eq!(provider.status(), ProviderStatus::Error);
    }

    #[test]
    fn config_from_lookup() {
        let vars = HashMap::from([
            ("OFREP_ENDPOINT", "https://flags.example.com"),
            ("OFREP_TIMEOUT_MS", "500"),
            ("OFREP_API_KEY", "key"),
            ("OFREP_HEADERS", "X-A=1, X-B=2"),
        ]);
        let lookup = |name: &str| vars.get(name).map(|it| it.to_string());

        let config = OfrepProviderConfig::from_lookup(&lookup).unwrap();

        assert_eq!(
            config,
            OfrepProviderConfig::from_base_url("https://flags.example.com")
                .timeout(Duration::from_millis(500))
                .api_key("key")
                .header("X-A", "1")
                .header("X-B", "2")
        );

        assert!(matches!(
            OfrepProviderConfig::from_lookup(&|_: &str| None::<String>),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            OfrepProviderConfig::from_lookup(&|_: &str| Some("not a url".to_owned())),
            Err(Error::InvalidBaseUrl(_))
        ));
    }
}
