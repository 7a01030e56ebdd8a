//! Validation domain types

use serde::{Deserialize, Serialize};

/// Identifier of the validator rule that produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// A required field is missing, empty or of the wrong kind
    MalformedSpec,
    /// The generator document matched no known spec shape
    UnrecognizedSpec,
    /// The spec declares no transformation step
    MissingTransform,
    /// The schedule is neither `manual`, an `@`-macro nor a five-field cron
    InvalidSchedule,
    /// The generated code does not compile
    SyntaxError,
    /// The code references a table or file the spec does not declare
    UndeclaredResource,
    /// The code drops, truncates or deletes without being asked to
    DestructiveOperation,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::MalformedSpec => "malformed_spec",
            Rule::UnrecognizedSpec => "unrecognized_spec",
            Rule::MissingTransform => "missing_transform",
            Rule::InvalidSchedule => "invalid_schedule",
            Rule::SyntaxError => "syntax_error",
            Rule::UndeclaredResource => "undeclared_resource",
            Rule::DestructiveOperation => "destructive_operation",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validator finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: Rule,
    pub message: String,
    /// Offending fragment (resource name, statement, field path)
    pub fragment: Option<String>,
}

impl Violation {
    pub fn new(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
            fragment: None,
        }
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "[{}] {} ({})", self.rule, self.message, fragment),
            None => write!(f, "[{}] {}", self.rule, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_serializes_rule_as_snake_case() {
        let violation = Violation::new(Rule::UndeclaredResource, "table not declared")
            .with_fragment("customers");
        let value = serde_json::to_value(&violation).unwrap();
        assert_eq!(value["rule"], "undeclared_resource");
        assert_eq!(value["fragment"], "customers");
    }

    #[test]
    fn test_violation_display() {
        let violation = Violation::new(Rule::SyntaxError, "unexpected symbol");
        assert_eq!(violation.to_string(), "[syntax_error] unexpected symbol");
    }
}
