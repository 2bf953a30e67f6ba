//! Providers, hooks, and tools for vendor-neutral feature flag evaluation.
//!
//! # Overview
//!
//! Flags are evaluated through a [`Client`], which wraps a [`FeatureProvider`]. A provider adapts
//! one flag backend: it maps the [`EvaluationContext`] into the backend's shape, asks the
//! backend, and maps the answer back into a [`ResolutionDetail`] carrying the value, variant,
//! reason, and error. The client runs [hooks](hooks::Hook) around every evaluation.
//!
//! The crate ships the following providers and tools:
//! - [`providers::InMemoryProvider`], [`providers::EnvVarProvider`], and
//!   [`providers::OfrepProvider`] (remote evaluation over OFREP).
//! - [`multi::MultiProvider`] combines several providers under one strategy while keeping each
//!   provider's hooks isolated from the others.
//! - [`CachedProvider`] caches evaluation results in process, with TTL and LRU eviction.
//! - [`hooks::ValidatorHook`] rejects evaluated values that fail validation.
//! - [`ofrep::OfrepHandler`] serves flag evaluations over HTTP using the OFREP wire format.
//!
//! # Error Handling
//!
//! Flag evaluation never fails. When something goes wrong, the caller-supplied default value is
//! returned, and the reason is reported as an [`EvaluationError`] with one of a fixed set of
//! [`ErrorCode`]s.
//!
//! Configuring providers and tools can fail; these errors are represented by the [`Error`] enum.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages
//! under the `openfeature` target. Consider integrating a `log`-compatible logger implementation
//! for better visibility into evaluations.
//!
//! # Examples
//!
//! A runnable example can be found in the `demos/simple` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]

mod attributes;
mod cache;
mod client;
mod config;
mod context;
mod error;
mod provider;
mod resolution;
mod value;

pub mod hooks;
pub mod multi;
pub mod ofrep;
pub mod providers;

pub use attributes::{AttributeValue, Attributes};
pub use cache::{CacheConfig, CachedProvider, EvaluationCache, DEFAULT_MAX_SIZE, DEFAULT_TTL};
pub use client::{Client, ClientMetadata, EvaluationOptions};
pub use config::{ConfigLookup, ProcessEnv};
pub use context::{EvaluationContext, TARGETING_KEY};
pub use error::{Error, ErrorCode, EvaluationError, Result};
pub use provider::{FeatureProvider, ProviderMetadata, ProviderStatus};
pub use resolution::{EvaluationDetails, FlagMetadata, Reason, ResolutionDetail};
pub use value::{FlagType, FlagValue};
