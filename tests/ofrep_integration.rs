//! An OFREP provider talking to an OFREP handler in the same process.
use std::sync::Arc;

use openfeature_contrib::{
    ofrep::{HandlerOptions, OfrepHandler},
    providers::{
        ofrep::{TransportRequest, TransportResponse},
        InMemoryFlag, InMemoryProvider, OfrepProvider, OfrepProviderConfig,
    },
    Client, ErrorCode, EvaluationContext, EvaluationOptions, Reason,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn server() -> OfrepHandler {
    let provider = InMemoryProvider::new([
        (
            "new-checkout".to_owned(),
            InMemoryFlag::new("off", [("on", true), ("off", false)]).with_context_evaluator(
                |context| {
                    (context.attribute("plan").and_then(|it| it.as_str()) == Some("pro"))
                        .then(|| "on".to_owned())
                },
            ),
        ),
        (
            "banner-color".to_owned(),
            InMemoryFlag::new("blue", [("blue", "0000ff")]).with_metadata("team", "web"),
        ),
        (
            "broken".to_owned(),
            InMemoryFlag::new("missing", [("present", 1)]),
        ),
    ]);
    OfrepHandler::new(Client::new(provider), HandlerOptions::default())
}

/// Client whose OFREP provider is served in-process by `handler`.
fn client(handler: OfrepHandler) -> Client {
    let handler = Arc::new(handler);
    let transport = move |request: TransportRequest| -> openfeature_contrib::Result<TransportResponse> {
        let mut builder = http::Request::post(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = handler.handle(builder.body(request.body).unwrap());
        Ok(TransportResponse {
            status: response.status().as_u16(),
            retry_after: response
                .headers()
                .get(http::header::RETRY_AFTER)
                .and_then(|it| it.to_str().ok())
                .map(str::to_owned),
            body: response.into_body(),
        })
    };
    let provider = OfrepProvider::with_transport(
        OfrepProviderConfig::from_base_url("http://localhost:8016").bearer_token("token"),
        transport,
    )
    .unwrap();
    Client::new(provider)
}

#[test]
fn evaluates_through_handler() {
    init();
    let client = client(server());
    let pro = EvaluationContext::new()
        .with_targeting_key("user-1")
        .with_attribute("plan", "pro");

    let details = client.get_details("new-checkout", false, Some(&pro), &EvaluationOptions::default());
    assert!(details.value);
    assert_eq!(details.variant.as_deref(), Some("on"));
    assert_eq!(details.reason, Some(Reason::TargetingMatch));

    assert!(!client.get_boolean_value("new-checkout", true, None));

    let color = client.get_details(
        "banner-color",
        String::new(),
        None,
        &EvaluationOptions::default(),
    );
    assert_eq!(color.value, "0000ff");
    assert_eq!(color.reason, Some(Reason::Static));
    assert_eq!(color.flag_metadata.get("team"), Some(&serde_json::json!("web")));
}

#[test]
fn maps_errors_through_handler() {
    init();
    let client = client(server());
    let options = EvaluationOptions::default();

    let missing = client.get_details("missing", 5_i64, None, &options);
    assert_eq!(missing.value, 5);
    assert_eq!(missing.error_code(), Some(ErrorCode::FlagNotFound));

    let mismatch = client.get_details("banner-color", true, None, &options);
    assert!(mismatch.value);
    assert_eq!(mismatch.error_code(), Some(ErrorCode::TypeMismatch));

    let broken = client.get_details("broken", 0_i64, None, &options);
    assert_eq!(broken.error_code(), Some(ErrorCode::General));
}
