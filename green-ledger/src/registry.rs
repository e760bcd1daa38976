//! Code registry: redeemable codes and their point values
//!
//! Contents are fixed for a given build or configuration. Lookups are
//! case-insensitive; every code is stored in canonical form.

use crate::{Error, Result};
use std::collections::BTreeMap;

/// Codes shipped with the portal demo
const DEMO_CODES: &[(&str, u64)] = &[
    ("CLEAN10", 10),
    ("CLEAN20", 20),
    ("CLEAN100", 100),
    ("ECO2024", 50),
    ("GREEN25", 25),
];

/// Canonical form of a code: trimmed and upper-cased
pub fn canonicalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Read-only mapping from canonical code to point value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegistry {
    codes: BTreeMap<String, u64>,
}

impl CodeRegistry {
    /// Build a registry, rejecting zero values, empty codes and collisions
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: AsRef<str>,
    {
        let mut codes = BTreeMap::new();

        for (raw, value) in entries {
            let code = canonicalize(raw.as_ref());
            if code.is_empty() {
                return Err(Error::Config("registry contains an empty code".to_string()));
            }
            if value == 0 {
                return Err(Error::Config(format!("code {} must have a positive value", code)));
            }
            if codes.insert(code.clone(), value).is_some() {
                return Err(Error::Config(format!("code {} is defined twice", code)));
            }
        }

        Ok(Self { codes })
    }

    /// Registry with the demo codes
    pub fn demo() -> Self {
        Self {
            codes: DEMO_CODES
                .iter()
                .map(|(code, value)| (code.to_string(), *value))
                .collect(),
        }
    }

    /// Value of a code, if registered. Input is canonicalized first.
    pub fn lookup(&self, code: &str) -> Option<u64> {
        self.codes.get(&canonicalize(code)).copied()
    }

    /// All entries in code order
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.codes.iter().map(|(code, value)| (code.as_str(), *value))
    }

    /// Number of registered codes
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::demo()
    }
}
