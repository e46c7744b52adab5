//! Crate error kinds (spec §7).
//!
//! Failures inside the kernel are non-throwing: every fallible operation
//! returns a [`HyperResult`], and any failure that crosses the Controller
//! boundary is absorbed into the agent's best-effort legal move rather than
//! propagated as an exception (§7 "Propagation").

use std::fmt;

pub type HyperResult<T> = Result<T, HyperError>;

#[derive(Debug)]
pub enum HyperError {
    /// missing or malformed config file. Logged; defaults retained.
    Config(String),
    /// a call into the external Rules Engine failed. Fatal to the turn.
    Rules(anyhow::Error),
    /// the play clock elapsed before a turn could complete normally.
    Timeout,
    /// the population became and stayed empty after every replenishment
    /// attempt within the update budget.
    ConsistencyExhausted,
    /// a sampler bug: a frame was pushed onto a Model that already had a
    /// frame at that step. Recovered by ignoring the redundant push.
    DuplicateFrame,
}

impl fmt::Display for HyperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Rules(err) => write!(f, "rules engine error: {err}"),
            Self::Timeout => write!(f, "play clock elapsed"),
            Self::ConsistencyExhausted => write!(f, "hypergame population exhausted"),
            Self::DuplicateFrame => write!(f, "duplicate frame pushed onto model"),
        }
    }
}

impl std::error::Error for HyperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rules(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for HyperError {
    fn from(err: anyhow::Error) -> Self {
        Self::Rules(err)
    }
}
