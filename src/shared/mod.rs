//! Shared newtypes used across all modules.
//!
//! These types are serialization-transparent: they serialize/deserialize identically
//! to the raw strings the feed sends, so they can be used directly in wire types
//! without conversion overhead.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::str::FromStr;

// ─── CoinId ──────────────────────────────────────────────────────────────────

/// Newtype for coin identifiers (e.g. `"bitcoin"`, `"ethereum"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoinId(String);

impl CoinId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CoinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CoinId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CoinId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl FromStr for CoinId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CoinId(s.to_string()))
    }
}

impl Serialize for CoinId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CoinId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(CoinId(s))
    }
}

// ─── ScreenId ────────────────────────────────────────────────────────────────

/// Identity of a UI consumer lifecycle that declares interest in coins.
///
/// Any stable string works: a route name, a route plus an instance counter, etc.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScreenId(String);

impl ScreenId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScreenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScreenId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScreenId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ─── Utilities ───────────────────────────────────────────────────────────────

/// Deduplicate and sort coin ids so frames and snapshots are deterministic.
pub fn normalize_coin_ids<I>(ids: I) -> Vec<CoinId>
where
    I: IntoIterator<Item = CoinId>,
{
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}
