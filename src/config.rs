//! Environment-driven settings for the invoker binary.
//!
//! | Variable         | Default | Meaning                                          |
//! |------------------|---------|--------------------------------------------------|
//! | `OBJECT_STORE`   | `local` | `local` or `http`                                |
//! | `STORE_ROOT`     | `.`     | bucket parent directory for `local`              |
//! | `STORE_ENDPOINT` |         | base URL for `http` (required there)             |
//! | `TOP_N`          | `5`     | number of groups reported                        |
//! | `NULL_VALUES`    |         | comma-separated cell tokens read as absent       |

use crate::{
    handler::{StepOptions, DEFAULT_TOP_N},
    table::{null_regex, LoadOptions},
};
use anyhow::{anyhow, bail, Context, Result};
use std::{env, path::PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Local { root: PathBuf },
    Http { endpoint: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store: StoreConfig,
    pub top_n: usize,
    /// `None` keeps the built-in token set.
    pub null_values: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::Local { root: PathBuf::from(".") },
            top_n: DEFAULT_TOP_N,
            null_values: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store = match get("OBJECT_STORE").as_deref().map(str::trim) {
            None | Some("local") => StoreConfig::Local {
                root: get("STORE_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            },
            Some("http") => StoreConfig::Http {
                endpoint: get("STORE_ENDPOINT")
                    .ok_or_else(|| anyhow!("STORE_ENDPOINT must be set when OBJECT_STORE=http"))?,
            },
            Some(other) => bail!("unknown OBJECT_STORE {:?}; expected `local` or `http`", other),
        };

        let top_n = match get("TOP_N") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("TOP_N must be a positive integer, got {:?}", raw))?,
            None => DEFAULT_TOP_N,
        };
        if top_n == 0 {
            bail!("TOP_N must be at least 1");
        }

        let null_values = get("NULL_VALUES")
            .map(|raw| raw.split(',').map(|t| t.trim().to_string()).collect());

        Ok(Self {
            store,
            top_n,
            null_values,
        })
    }

    pub fn step_options(&self) -> Result<StepOptions> {
        let mut load = LoadOptions::default();
        if let Some(tokens) = &self.null_values {
            load.null_values = null_regex(tokens.iter().map(String::as_str))
                .context("compiling NULL_VALUES")?;
        }
        Ok(StepOptions {
            top_n: self.top_n,
            load,
        })
    }
}
