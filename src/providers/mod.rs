//! Providers shipped with the crate.
mod from_env;
mod in_memory;
pub mod ofrep;

pub use from_env::{EnvVarProvider, EnvVarProviderConfig, KeyMapper};
pub use in_memory::{ContextEvaluator, FlagState, InMemoryFlag, InMemoryProvider};
pub use ofrep::{OfrepProvider, OfrepProviderConfig, OfrepTransport, ReqwestTransport};
