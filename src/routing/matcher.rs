//! Rule pattern matching.
//!
//! # Design Decisions
//! - A rule pattern is a regular expression that must match the whole URI
//! - Patterns are compiled once when the rule set is loaded
//! - Rules compare equal by pattern text

use regex::Regex;

use crate::config::schema::RuleConfig;

/// A resolved routing rule, as delivered by the rule provider.
#[derive(Debug, Clone)]
pub struct Rule {
    name: Option<String>,
    url_pattern: String,
    regex: Regex,
}

impl Rule {
    /// Compile a rule from its URL pattern.
    pub fn new(url_pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let url_pattern = url_pattern.into();
        let regex = Regex::new(&format!("^(?:{})$", url_pattern))?;
        Ok(Self {
            name: None,
            url_pattern,
            regex,
        })
    }

    /// Compile a rule from its configuration entry.
    pub fn from_config(config: &RuleConfig) -> Result<Self, regex::Error> {
        let mut rule = Self::new(config.url_pattern.clone())?;
        rule.name = config.name.clone();
        Ok(rule)
    }

    /// Compile all configured rules, preserving their order.
    pub fn compile_all(configs: &[RuleConfig]) -> Result<Vec<Self>, regex::Error> {
        configs.iter().map(Self::from_config).collect()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn url_pattern(&self) -> &str {
        &self.url_pattern
    }

    /// Returns true if the pattern matches the entire URI.
    pub fn matches(&self, uri: &str) -> bool {
        self.regex.is_match(uri)
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.url_pattern == other.url_pattern
    }
}

impl Eq for Rule {}
