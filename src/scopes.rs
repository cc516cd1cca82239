// ABOUTME: Scope set parsing and comparison for OAuth tokens and clients
// ABOUTME: Space-separated wire format with subset and intersection helpers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use std::collections::BTreeSet;

/// An ordered set of scope strings.
///
/// Scopes travel as a space-separated string on the wire (RFC 6749 Section 3.3)
/// and are compared as sets everywhere else. `BTreeSet` keeps the serialized
/// form deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Parse a space-separated scope string; empty/whitespace input yields an empty set
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split_whitespace()
                .map(std::string::ToString::to_string)
                .collect(),
        )
    }

    /// Serialize back to the space-separated wire format
    #[must_use]
    pub fn to_scope_string(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(" ")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check membership of a single scope
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// True when every scope in `self` is also granted by `other`
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Scopes present in both sets
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    /// Iterate over the scopes in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_scope_string())
    }
}
