// Copyright 2023 - 2024 Martin Pool

//! Load `mutation-matrix.toml`, giving defaults that [`crate::options::Options`]
//! then layers CLI flags on top of.

use std::str::FromStr;

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Deserialize;

/// On-disk configuration, all fields optional so an absent file (or an
/// absent field) falls back to the built-in default in [`crate::options::Options`].
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Multiply the baseline test duration by this factor to get the
    /// per-mutation timeout (spec.md §5: default 1.25).
    pub timeout_multiplier: Option<f64>,

    /// Add this many seconds to the multiplied baseline duration (spec.md
    /// §5: default 4).
    pub timeout_constant_secs: Option<u64>,

    /// Maximum mutations per work unit; 0 means unbounded (spec.md §4.3).
    pub unit_size: Option<usize>,

    /// Controller-level worker pool size.
    pub threads: Option<usize>,

    /// Enable full-matrix research mode by default.
    pub full_matrix_research_mode: Option<bool>,
}

impl Config {
    pub fn read_file(path: &Utf8Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {path}"))?;
        Config::from_str(&text).with_context(|| format!("parse config file {path}"))
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Config> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indoc::indoc;

    #[test]
    fn empty_config_is_all_none() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parses_known_fields() {
        let config = Config::from_str(indoc! {r#"
            timeout_multiplier = 2.0
            timeout_constant_secs = 10
            unit_size = 25
            threads = 4
            full_matrix_research_mode = true
        "#})
        .unwrap();
        assert_eq!(config.timeout_multiplier, Some(2.0));
        assert_eq!(config.timeout_constant_secs, Some(10));
        assert_eq!(config.unit_size, Some(25));
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.full_matrix_research_mode, Some(true));
    }

    #[test]
    fn rejects_unknown_fields() {
        Config::from_str("bogus_field = 1").unwrap_err();
    }
}
