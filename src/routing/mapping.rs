//! Rule pattern to circuit mapping.
//!
//! # Responsibilities
//! - Derive a stable circuit identity from each rule pattern
//! - Resolve a request URI to the circuit of the first matching rule
//! - Report mappings that disappeared when the rule set changes
//!
//! # Design Decisions
//! - Identity = SHA-256 of the pattern text, so unchanged patterns keep
//!   their circuit across reloads and across gateway instances
//! - Ordered linear scan; first match wins for overlapping patterns
//! - The live mapping is swapped atomically, lookups never block

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::routing::matcher::Rule;

/// A rule pattern together with the identity of its circuit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PatternAndCircuitHash {
    pattern: String,
    hash: String,
}

impl PatternAndCircuitHash {
    pub fn from_pattern(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let hash = format!("{:x}", Sha256::digest(pattern.as_bytes()));
        Self { pattern, hash }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for PatternAndCircuitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

#[derive(Debug)]
struct MappedRule {
    rule: Rule,
    circuit: PatternAndCircuitHash,
}

/// Maps request URIs to circuits.
#[derive(Debug, Default)]
pub struct RulePatternToCircuitMapping {
    entries: ArcSwap<Vec<MappedRule>>,
}

impl RulePatternToCircuitMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mapping with one computed from `rules`.
    ///
    /// Returns the circuits that were mapped before and are not anymore.
    pub fn update(&self, rules: &[Rule]) -> Vec<PatternAndCircuitHash> {
        let mut seen = HashSet::new();
        let next: Vec<MappedRule> = rules
            .iter()
            .filter(|rule| seen.insert(rule.url_pattern().to_string()))
            .map(|rule| MappedRule {
                rule: rule.clone(),
                circuit: PatternAndCircuitHash::from_pattern(rule.url_pattern()),
            })
            .collect();

        let previous = self.entries.swap(Arc::new(next));
        previous
            .iter()
            .filter(|old| !seen.contains(old.circuit.pattern()))
            .map(|old| old.circuit.clone())
            .collect()
    }

    /// Circuit of the first rule matching `uri`.
    pub fn resolve(&self, uri: &str) -> Option<PatternAndCircuitHash> {
        self.entries
            .load()
            .iter()
            .find(|entry| entry.rule.matches(uri))
            .map(|entry| entry.circuit.clone())
    }

    /// All currently mapped circuits, in rule order.
    pub fn circuits(&self) -> Vec<PatternAndCircuitHash> {
        self.entries.load().iter().map(|e| e.circuit.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}
