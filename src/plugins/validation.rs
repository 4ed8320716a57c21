//! Composable argument validation for tool handlers.
//!
//! A small rule library plugins can layer in front of their handlers:
//! per-field rules accumulated through a builder, a `validate` pass over the
//! argument object, and a `validated` wrapper that runs validation before
//! the wrapped handler. The kernel itself never applies this toolkit; it is
//! an optional collaborator for plugin authors.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::errors::ValidationError;
use crate::plugins::ToolHandler;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.+-]+@[\w-]+(\.[\w-]+)+$").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://\S+$").unwrap());

/// A single-field rule.
#[derive(Debug, Clone)]
enum Rule {
    Required,
    TypeString,
    TypeNumber,
    TypeBoolean,
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Email,
    Url,
    OneOf(Vec<Value>),
    Pattern(Regex),
}

/// Accumulates rules for one field.
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    rules: Vec<Rule>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.rules.push(Rule::Required);
        self
    }

    pub fn string(mut self) -> Self {
        self.rules.push(Rule::TypeString);
        self
    }

    pub fn number(mut self) -> Self {
        self.rules.push(Rule::TypeNumber);
        self
    }

    pub fn boolean(mut self) -> Self {
        self.rules.push(Rule::TypeBoolean);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.rules.push(Rule::MinLength(len));
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.rules.push(Rule::MaxLength(len));
        self
    }

    pub fn min(mut self, value: f64) -> Self {
        self.rules.push(Rule::Min(value));
        self
    }

    pub fn max(mut self, value: f64) -> Self {
        self.rules.push(Rule::Max(value));
        self
    }

    pub fn email(mut self) -> Self {
        self.rules.push(Rule::Email);
        self
    }

    pub fn url(mut self) -> Self {
        self.rules.push(Rule::Url);
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.rules.push(Rule::OneOf(values));
        self
    }

    /// Matches the field's string value against a regular expression.
    /// Invalid patterns are rejected here rather than at validation time.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.rules.push(Rule::Pattern(Regex::new(pattern)?));
        Ok(self)
    }
}

/// Validates a JSON argument object field by field.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    fields: Vec<(String, FieldRules)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rules for one field. Fields are checked in insertion order.
    pub fn field(mut self, name: impl Into<String>, rules: FieldRules) -> Self {
        self.fields.push((name.into(), rules));
        self
    }

    /// Runs every rule, failing on the first violation.
    pub fn validate(&self, params: &Value) -> Result<(), ValidationError> {
        for (field, rules) in &self.fields {
            let value = params.get(field);
            for rule in &rules.rules {
                check_rule(field, value, rule)?;
            }
        }
        Ok(())
    }
}

fn check_rule(field: &str, value: Option<&Value>, rule: &Rule) -> Result<(), ValidationError> {
    let present = value.is_some_and(|v| !v.is_null());

    if let Rule::Required = rule {
        if !present {
            return Err(ValidationError::new(field, Value::Null, "value is required"));
        }
        return Ok(());
    }

    // Every other rule passes vacuously on an absent field; `required`
    // decides whether absence itself is an error.
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(());
    };

    let fail = |message: &str| {
        Err(ValidationError::new(field, value.clone(), message))
    };

    match rule {
        Rule::Required => unreachable!("handled above"),
        Rule::TypeString => {
            if !value.is_string() {
                return fail("expected a string");
            }
        }
        Rule::TypeNumber => {
            if !value.is_number() {
                return fail("expected a number");
            }
        }
        Rule::TypeBoolean => {
            if !value.is_boolean() {
                return fail("expected a boolean");
            }
        }
        Rule::MinLength(len) => {
            let Some(s) = value.as_str() else {
                return fail("expected a string");
            };
            if s.chars().count() < *len {
                return fail(&format!("must be at least {} characters", len));
            }
        }
        Rule::MaxLength(len) => {
            let Some(s) = value.as_str() else {
                return fail("expected a string");
            };
            if s.chars().count() > *len {
                return fail(&format!("must be at most {} characters", len));
            }
        }
        Rule::Min(bound) => {
            let Some(n) = value.as_f64() else {
                return fail("expected a number");
            };
            if n < *bound {
                return fail(&format!("must be at least {}", bound));
            }
        }
        Rule::Max(bound) => {
            let Some(n) = value.as_f64() else {
                return fail("expected a number");
            };
            if n > *bound {
                return fail(&format!("must be at most {}", bound));
            }
        }
        Rule::Email => {
            let ok = value.as_str().is_some_and(|s| EMAIL_RE.is_match(s));
            if !ok {
                return fail("expected an email address");
            }
        }
        Rule::Url => {
            let ok = value.as_str().is_some_and(|s| URL_RE.is_match(s));
            if !ok {
                return fail("expected a url");
            }
        }
        Rule::OneOf(allowed) => {
            if !allowed.contains(value) {
                return fail("value is not one of the allowed options");
            }
        }
        Rule::Pattern(re) => {
            let ok = value.as_str().is_some_and(|s| re.is_match(s));
            if !ok {
                return fail(&format!("must match pattern {}", re.as_str()));
            }
        }
    }
    Ok(())
}

/// Wraps a handler so validation runs before it; a violation short-circuits
/// with the validation failure and the handler is not invoked.
pub fn validated(validator: Validator, handler: ToolHandler) -> ToolHandler {
    let validator = Arc::new(validator);
    Arc::new(move |params, ctx| {
        let validator = Arc::clone(&validator);
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            validator.validate(&params)?;
            handler(params, ctx).await
        })
    })
}
