use regex::Regex;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct NameFilter {
    patterns: Vec<Regex>,
}

impl NameFilter {
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut patterns = Vec::new();
        for raw in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            patterns.push(compile(raw)?);
        }
        Ok(NameFilter { patterns })
    }

    /// A filter with no patterns accepts everything.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| ConfigError::InvalidGlob {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
