//! Inclusion conditions for declared tasks.
//!
//! A declared entry may carry a `condition` expression; entries whose
//! condition evaluates to false are treated exactly like entries that are
//! absent from the document. The expression grammar is deliberately small:
//!
//! - `true` / `false` literals
//! - a bare variable name, truthy when set to anything other than the
//!   empty string, `0`, or `false`
//! - `variable == "literal"` / `variable != "literal"` (single or double
//!   quotes)
//!
//! Anything else fails evaluation rather than silently picking a side.

use std::collections::BTreeMap;

/// Evaluates a condition expression to a boolean.
///
/// Implementations decide where variable values come from; the shipped
/// [`ContextConditionEvaluator`] reads them from an explicit key/value map.
pub trait ConditionEvaluator {
    /// Evaluate `expression`, erroring on malformed input.
    fn evaluate(&self, expression: &str) -> Result<bool, ConditionError>;
}

/// A condition expression that could not be evaluated.
#[derive(Debug, thiserror::Error)]
#[error("cannot evaluate `{condition}`: {reason}")]
pub struct ConditionError {
    /// The offending expression, verbatim.
    pub condition: String,
    /// What was wrong with it.
    pub reason: String,
}

impl ConditionError {
    fn new(condition: &str, reason: impl Into<String>) -> Self {
        Self {
            condition: condition.to_string(),
            reason: reason.into(),
        }
    }
}

/// [`ConditionEvaluator`] over an explicit string-to-string context map.
///
/// Variables not present in the map compare as the empty string and are
/// falsy when used bare.
#[derive(Debug, Default, Clone)]
pub struct ContextConditionEvaluator {
    context: BTreeMap<String, String>,
}

impl ContextConditionEvaluator {
    /// Build an evaluator over the given context variables.
    pub fn new(context: BTreeMap<String, String>) -> Self {
        Self { context }
    }

    fn lookup(&self, name: &str) -> &str {
        self.context.get(name).map(String::as_str).unwrap_or("")
    }
}

impl ConditionEvaluator for ContextConditionEvaluator {
    fn evaluate(&self, expression: &str) -> Result<bool, ConditionError> {
        let expr = expression.trim();
        if expr.is_empty() {
            return Err(ConditionError::new(expression, "empty expression"));
        }
        match expr {
            "true" => return Ok(true),
            "false" => return Ok(false),
            _ => {}
        }

        if let Some((lhs, negated, rhs)) = split_comparison(expr) {
            let variable = lhs.trim();
            if !is_identifier(variable) {
                return Err(ConditionError::new(
                    expression,
                    format!("left-hand side `{variable}` is not a variable name"),
                ));
            }
            let literal = unquote(rhs.trim()).ok_or_else(|| {
                ConditionError::new(expression, "right-hand side must be a quoted string")
            })?;
            let equal = self.lookup(variable) == literal;
            return Ok(equal != negated);
        }

        if is_identifier(expr) {
            return Ok(truthy(self.lookup(expr)));
        }
        Err(ConditionError::new(expression, "unrecognized expression"))
    }
}

/// Split at the first `==` or `!=`, whichever comes first.
fn split_comparison(expr: &str) -> Option<(&str, bool, &str)> {
    let eq = expr.find("==");
    let ne = expr.find("!=");
    let (idx, negated) = match (eq, ne) {
        (Some(e), Some(n)) if n < e => (n, true),
        (Some(e), _) => (e, false),
        (None, Some(n)) => (n, true),
        (None, None) => return None,
    };
    Some((&expr[..idx], negated, &expr[idx + 2..]))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Strip matching single or double quotes; rejects embedded quote chars.
fn unquote(s: &str) -> Option<&str> {
    let quote = s.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let inner = s.strip_prefix(quote)?.strip_suffix(quote)?;
    if inner.contains(quote) {
        return None;
    }
    Some(inner)
}

fn truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && value != "false"
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn evaluator(pairs: &[(&str, &str)]) -> ContextConditionEvaluator {
        let context = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ContextConditionEvaluator::new(context)
    }

    #[test]
    fn boolean_literals() {
        let eval = ContextConditionEvaluator::default();
        assert!(eval.evaluate("true").expect("true"));
        assert!(!eval.evaluate("false").expect("false"));
        assert!(eval.evaluate("  true  ").expect("trimmed"));
    }

    #[test]
    fn bare_variable_truthiness() {
        let eval = evaluator(&[
            ("featureEnabled", "1"),
            ("emptyVar", ""),
            ("zeroVar", "0"),
            ("falseVar", "false"),
        ]);
        assert!(eval.evaluate("featureEnabled").expect("set"));
        assert!(!eval.evaluate("emptyVar").expect("empty"));
        assert!(!eval.evaluate("zeroVar").expect("zero"));
        assert!(!eval.evaluate("falseVar").expect("false string"));
        assert!(!eval.evaluate("neverSet").expect("missing"));
    }

    #[test]
    fn equality_both_quote_styles() {
        let eval = evaluator(&[("environment", "production")]);
        assert!(eval.evaluate("environment == \"production\"").expect("dq"));
        assert!(eval.evaluate("environment == 'production'").expect("sq"));
        assert!(!eval.evaluate("environment == 'staging'").expect("other"));
    }

    #[test]
    fn inequality() {
        let eval = evaluator(&[("environment", "production")]);
        assert!(!eval.evaluate("environment != 'production'").expect("same"));
        assert!(eval.evaluate("environment != 'staging'").expect("differs"));
    }

    #[test]
    fn missing_variable_compares_as_empty() {
        let eval = ContextConditionEvaluator::default();
        assert!(eval.evaluate("stage == ''").expect("empty match"));
        assert!(eval.evaluate("stage != 'production'").expect("ne"));
    }

    #[test]
    fn malformed_expressions_error() {
        let eval = ContextConditionEvaluator::default();
        for expr in [
            "",
            "   ",
            "stage == production",
            "stage ==",
            "1 == '1'",
            "stage == 'mixed\"",
            "a && b",
            "not-an-ident!",
        ] {
            assert!(eval.evaluate(expr).is_err(), "should reject {expr:?}");
        }
    }

    #[test]
    fn error_carries_the_expression() {
        let eval = ContextConditionEvaluator::default();
        let err = eval.evaluate("stage == bare").expect_err("malformed");
        let rendered = err.to_string();
        assert!(rendered.contains("stage == bare"), "got: {rendered}");
    }
}
