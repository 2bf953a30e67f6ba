//! Environment-variable configuration helpers.
//!
//! Every `from_env()` constructor in this crate has a `from_lookup()` twin that takes the lookup
//! function explicitly, so configuration can be loaded from any key-value source (and tested
//! without touching the process environment).
use std::{str::FromStr, time::Duration};

use crate::{Error, Result};

/// Lookup of a configuration variable by name.
pub trait ConfigLookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<F: Fn(&str) -> Option<String>> ConfigLookup for F {
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Reads variables from the process environment.
pub struct ProcessEnv;

impl ConfigLookup for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Get a variable, treating empty values as unset.
pub(crate) fn var(lookup: &impl ConfigLookup, name: &str) -> Option<String> {
    lookup
        .lookup(name)
        .map(|it| it.trim().to_owned())
        .filter(|it| !it.is_empty())
}

pub(crate) fn parse<T: FromStr>(lookup: &impl ConfigLookup, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    var(lookup, name)
        .map(|raw| {
            raw.parse::<T>().map_err(|err| {
                Error::InvalidConfiguration(format!("{name}={raw:?} is invalid: {err}"))
            })
        })
        .transpose()
}

pub(crate) fn parse_bool(lookup: &impl ConfigLookup, name: &str) -> Result<Option<bool>> {
    var(lookup, name)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::InvalidConfiguration(format!(
                "{name}={raw:?} is not a boolean"
            ))),
        })
        .transpose()
}

pub(crate) fn parse_millis(lookup: &impl ConfigLookup, name: &str) -> Result<Option<Duration>> {
    Ok(parse::<u64>(lookup, name)?.map(Duration::from_millis))
}

/// Parse `name=value,name2=value2` pairs.
pub(crate) fn parse_pairs(lookup: &impl ConfigLookup, name: &str) -> Result<Vec<(String, String)>> {
    let Some(raw) = var(lookup, name) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .filter(|it| !it.trim().is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_owned(), value.trim().to_owned()))
            }
            _ => Err(Error::InvalidConfiguration(format!(
                "{name} entry {pair:?} is not of the form name=value"
            ))),
        })
        .collect()
}
