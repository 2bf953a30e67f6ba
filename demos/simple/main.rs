use std::sync::Arc;

use openfeature_contrib::{
    hooks::{RegexValidator, ValidatorHook},
    multi::{MultiProvider, ProviderEntry, Strategy},
    providers::{EnvVarProvider, EnvVarProviderConfig, InMemoryFlag, InMemoryProvider},
    CacheConfig, CachedProvider, Client, EvaluationContext, EvaluationOptions,
};

pub fn main() -> openfeature_contrib::Result<()> {
    // Configure env_logger to see evaluation logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("openfeature")).init();

    // Local overrides take precedence over flags defined in environment variables, e.g.:
    //
    //   ENV_PROVIDER_PREFIX=FLAG_
    //   FLAG_banner-color='{"defaultVariant":"blue","variants":[{"name":"blue","value":"0000ff"}]}'
    let overrides = InMemoryProvider::new([(
        "new-checkout".to_owned(),
        InMemoryFlag::new("off", [("on", true), ("off", false)]).with_context_evaluator(
            |context| (context.targeting_key() == Some("test-subject")).then(|| "on".to_owned()),
        ),
    )]);
    let from_env = EnvVarProvider::new(EnvVarProviderConfig::from_env()?);

    let provider = MultiProvider::new(
        [
            ProviderEntry::new(overrides).with_name("overrides"),
            ProviderEntry::new(from_env).with_name("env"),
        ],
        Strategy::FirstMatch,
    )?;
    let client = Client::new(CachedProvider::new(provider, CacheConfig::from_env()?)).with_name("simple");

    if let Err(err) = client.initialize() {
        println!("error initializing provider: {err}");
    }

    let context = EvaluationContext::new()
        .with_targeting_key("test-subject")
        .with_attribute("name", "<your name>");

    let checkout = client.get_details("new-checkout", false, Some(&context), &EvaluationOptions::default());
    println!("{}", serde_json::to_string_pretty(&checkout).unwrap());

    // Only accept hex color codes for the banner.
    let options = EvaluationOptions {
        hooks: vec![Arc::new(ValidatorHook::new(RegexValidator::hex()))],
        ..EvaluationOptions::default()
    };
    let color = client.get_details("banner-color", "ffffff".to_owned(), Some(&context), &options);
    println!("{}", serde_json::to_string_pretty(&color).unwrap());

    client.shutdown();
    Ok(())
}
