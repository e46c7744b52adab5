//! Per-agent `key:value` configuration file (spec §6).
//!
//! Malformed or missing keys are non-fatal (§7 "Config"): a parse problem is
//! logged and the default for that key is retained, never aborting the
//! agent.

use std::str::FromStr;

use crate::{
    DEFAULT_BACKTRACKING_DEPTH, DEFAULT_EXCLUDE_ZERO_POSTERIOR, DEFAULT_INV_PLAYTIME_FACTOR,
    DEFAULT_LIKELIHOOD_POWER_FACTOR, DEFAULT_MAX_NUM_PROBES, DEFAULT_NUM_HYPERBRANCHES,
    DEFAULT_NUM_HYPERGAMES, DEFAULT_NUM_OP_PROBES, DEFAULT_SHOULD_BRANCH,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub num_hypergames: usize,
    pub num_hyperbranches: usize,
    pub max_num_probes: usize,
    pub num_op_probes: usize,
    pub backtracking_depth: usize,
    pub likelihood_power_factor: f64,
    pub should_branch: bool,
    pub inv_playtime_factor: u32,
    /// whether a hypergame with posterior probability 0 is skipped entirely
    /// by the Move Evaluator rather than counted as a 0 contribution.
    pub exclude_zero_posterior: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_hypergames: DEFAULT_NUM_HYPERGAMES,
            num_hyperbranches: DEFAULT_NUM_HYPERBRANCHES,
            max_num_probes: DEFAULT_MAX_NUM_PROBES,
            num_op_probes: DEFAULT_NUM_OP_PROBES,
            backtracking_depth: DEFAULT_BACKTRACKING_DEPTH,
            likelihood_power_factor: DEFAULT_LIKELIHOOD_POWER_FACTOR,
            should_branch: DEFAULT_SHOULD_BRANCH,
            inv_playtime_factor: DEFAULT_INV_PLAYTIME_FACTOR,
            exclude_zero_posterior: DEFAULT_EXCLUDE_ZERO_POSTERIOR,
        }
    }
}

impl Config {
    /// parse a `key:value`-per-line config file, falling back to defaults
    /// for any key that is missing or fails to parse.
    pub fn parse(contents: &str) -> Self {
        let mut config = Self::default();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                log::warn!("config line {}: missing ':' separator, ignoring", lineno + 1);
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if let Err(msg) = config.apply(key, value) {
                log::warn!("config line {}: {msg}, keeping default", lineno + 1);
            }
        }
        config
    }

    /// read and parse a config file from disk; any IO failure logs a
    /// warning and returns `Config::default()` (spec §7 "Config").
    pub fn load(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) => {
                log::warn!("could not read config file {path:?}: {err}, using defaults");
                Self::default()
            }
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "numHyperGames" => self.num_hypergames = parse(value)?,
            "numHyperBranches" => self.num_hyperbranches = parse(value)?,
            "maxNumProbes" => self.max_num_probes = parse(value)?,
            "numOPProbes" => self.num_op_probes = parse(value)?,
            "backtrackingDepth" => self.backtracking_depth = parse(value)?,
            "likelihoodPowerFactor" => self.likelihood_power_factor = parse(value)?,
            "shouldBranch" => self.should_branch = parse(value)?,
            "invPlaytimeFactor" => self.inv_playtime_factor = parse(value)?,
            "excludeZeroPosteriorHypergames" => self.exclude_zero_posterior = parse(value)?,
            other => return Err(format!("unrecognised key {other:?}")),
        }
        Ok(())
    }
}

fn parse<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("could not parse {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognised_keys() {
        let config = Config::parse(
            "numHyperGames: 32\nnumOPProbes:4\nshouldBranch: true\nlikelihoodPowerFactor: 2.5\n",
        );
        assert_eq!(config.num_hypergames, 32);
        assert_eq!(config.num_op_probes, 4);
        assert!(config.should_branch);
        assert_eq!(config.likelihood_power_factor, 2.5);
    }

    #[test]
    fn falls_back_to_defaults_on_malformed_lines() {
        let config = Config::parse("not a key value line\nnumHyperGames: oops\n");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let config = Config::parse("# a comment\n\nnumHyperGames: 5\n");
        assert_eq!(config.num_hypergames, 5);
    }
}
