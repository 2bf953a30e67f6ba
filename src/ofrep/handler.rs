use std::sync::Arc;

use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use serde::Serialize;

use crate::{Client, ErrorCode, EvaluationContext, EvaluationOptions, Reason};

use super::{EvaluationFailure, EvaluationRequest, EvaluationSuccess};

pub const DEFAULT_PATH_PREFIX: &str = "/ofrep/v1/evaluate/flags/";

/// Options of [`OfrepHandler`].
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    disable_method_check: bool,
    disable_path_check: bool,
    path_prefix: String,
}

impl Default for HandlerOptions {
    fn default() -> HandlerOptions {
        HandlerOptions {
            disable_method_check: false,
            disable_path_check: false,
            path_prefix: DEFAULT_PATH_PREFIX.to_owned(),
        }
    }
}

impl HandlerOptions {
    pub fn new() -> HandlerOptions {
        HandlerOptions::default()
    }

    /// Accept any HTTP method, not only `POST`.
    pub fn disable_method_check(mut self) -> Self {
        self.disable_method_check = true;
        self
    }

    /// Accept any path. The flag key is then the last path segment.
    pub fn disable_path_check(mut self) -> Self {
        self.disable_path_check = true;
        self
    }

    /// Path prefix preceding the flag key. Defaults to [`DEFAULT_PATH_PREFIX`].
    pub fn path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = path_prefix.into();
        self
    }
}

/// Serves OFREP single-flag evaluations from a [`Client`].
///
/// The handler works on plain [`http`] types, so it can be mounted in any HTTP server.
///
/// # Examples
/// ```
/// # use openfeature_contrib::Client;
/// # use openfeature_contrib::ofrep::{HandlerOptions, OfrepHandler};
/// # use openfeature_contrib::providers::{InMemoryFlag, InMemoryProvider};
/// let client = Client::new(InMemoryProvider::new([(
///     "dark-mode".to_owned(),
///     InMemoryFlag::new("on", [("on", true)]),
/// )]));
/// let handler = OfrepHandler::new(client, HandlerOptions::default());
///
/// let request = http::Request::post("/ofrep/v1/evaluate/flags/dark-mode")
///     .body(br#"{"context":{"targetingKey":"user-1"}}"#.to_vec())
///     .unwrap();
/// let response = handler.handle(request);
/// assert_eq!(response.status(), http::StatusCode::OK);
/// ```
pub struct OfrepHandler {
    client: Arc<Client>,
    options: HandlerOptions,
}

impl OfrepHandler {
    pub fn new(client: impl Into<Arc<Client>>, options: HandlerOptions) -> OfrepHandler {
        OfrepHandler {
            client: client.into(),
            options,
        }
    }

    pub fn handle(&self, request: Request<Vec<u8>>) -> Response<Vec<u8>> {
        if !self.options.disable_method_check && request.method() != Method::POST {
            let mut response = empty_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let Some(flag_key) = self.flag_key(request.uri().path()) else {
            return empty_response(StatusCode::NOT_FOUND);
        };
        if flag_key.is_empty() {
            return failure(
                StatusCode::NOT_FOUND,
                None,
                ErrorCode::FlagNotFound,
                "flag key is missing".to_owned(),
            );
        }

        let context = match parse_context(request.body()) {
            Ok(context) => context,
            Err(details) => {
                log::debug!(target: "openfeature", flag_key; "rejecting malformed OFREP request: {}", details);
                return failure(
                    StatusCode::BAD_REQUEST,
                    Some(flag_key),
                    ErrorCode::ParseError,
                    details,
                );
            }
        };

        let details = self.client.get_details(
            flag_key,
            serde_json::Value::Null,
            Some(&context),
            &EvaluationOptions::default(),
        );

        match details.error {
            None => json_response(
                StatusCode::OK,
                &EvaluationSuccess {
                    key: details.flag_key,
                    value: details.value,
                    reason: details.reason.unwrap_or(Reason::Unknown),
                    variant: details.variant,
                    metadata: (!details.flag_metadata.is_empty()).then_some(details.flag_metadata),
                },
            ),
            Some(error) => match error.code {
                ErrorCode::FlagNotFound
                | ErrorCode::InvalidContext
                | ErrorCode::TargetingKeyMissing => failure(
                    StatusCode::NOT_FOUND,
                    Some(flag_key),
                    ErrorCode::FlagNotFound,
                    error.details(),
                ),
                _ => failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some(flag_key),
                    ErrorCode::General,
                    error.details(),
                ),
            },
        }
    }

    /// Extract the flag key from the request path. Returns `None` if the path is not served.
    fn flag_key<'a>(&self, path: &'a str) -> Option<&'a str> {
        match path.strip_prefix(self.options.path_prefix.as_str()) {
            Some(key) => Some(key),
            None if self.options.disable_path_check => {
                Some(path.rsplit('/').next().unwrap_or_default())
            }
            None => None,
        }
    }
}

/// Parse the request body into an evaluation context. An empty body is an empty context.
fn parse_context(body: &[u8]) -> Result<EvaluationContext, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(EvaluationContext::new());
    }
    let request = serde_json::from_slice::<EvaluationRequest>(body)
        .map_err(|err| format!("invalid request body: {err}"))?;
    EvaluationContext::from_flattened(&request.context).map_err(|err| err.details())
}

fn failure(
    status: StatusCode,
    flag_key: Option<&str>,
    error_code: ErrorCode,
    error_details: String,
) -> Response<Vec<u8>> {
    json_response(
        status,
        &EvaluationFailure {
            key: flag_key.map(str::to_owned),
            error_code,
            error_details: Some(error_details),
        },
    )
}

fn json_response(status: StatusCode, body: &impl Serialize) -> Response<Vec<u8>> {
    match serde_json::to_vec(body) {
        Ok(body) => {
            let mut response = Response::new(body);
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(err) => {
            log::warn!(target: "openfeature", "failed to serialize OFREP response: {}", err);
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty_response(status: StatusCode) -> Response<Vec<u8>> {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = status;
    response
}
