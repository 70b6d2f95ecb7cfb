//! Template substitution and the restricted condition-expression language
//! (spec §4.3, §REDESIGN FLAGS: "encode the supported placeholders and
//! operators explicitly as an interpreted mini-AST rather than regex
//! substitution; refuse anything outside the grammar with a warning").
//!
//! Two independent little languages live here:
//! - placeholder substitution inside action `config` (`{{firstName}}`, ...)
//! - the `expression` condition grammar (`{{actions.<id>.status}} == "success"`)

use std::collections::HashMap;

use crate::types::{ActionOutcome, ActionResult, ExecutionContext};

/// Substitute every `{{placeholder}}` occurrence in `value` (recursively
/// through objects/arrays) using `ctx` and the results of previously
/// completed actions. Missing values substitute the empty string.
pub fn substitute(value: &serde_json::Value, ctx: &ExecutionContext, results: &HashMap<String, ActionResult>) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(substitute_str(s, ctx, results)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| substitute(v, ctx, results)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), substitute(v, ctx, results))).collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(input: &str, ctx: &ExecutionContext, results: &HashMap<String, ActionResult>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str("{{");
            rest = after;
            continue;
        };
        let placeholder = after[..end].trim();
        out.push_str(&resolve_placeholder(placeholder, ctx, results).unwrap_or_default());
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve_placeholder(name: &str, ctx: &ExecutionContext, results: &HashMap<String, ActionResult>) -> Option<String> {
    match name {
        "firstName" => ctx.guest_first_name.clone(),
        "lastName" => ctx.guest_last_name.clone(),
        "roomNumber" => ctx.room_number.clone(),
        "arrivalDate" => ctx.arrival_date.clone(),
        "departureDate" => ctx.departure_date.clone(),
        "ruleId" => Some(ctx.rule_id.clone()),
        "ruleName" => Some(ctx.rule_name.clone()),
        _ => resolve_action_lookup(name, results),
    }
}

/// Parses `actions.<id>.status` and `actions.<id>.output.<field>` lookups
/// shared by both substitution and condition evaluation.
fn resolve_action_lookup(path: &str, results: &HashMap<String, ActionResult>) -> Option<String> {
    let rest = path.strip_prefix("actions.")?;
    let (action_id, field) = rest.split_once('.')?;
    let result = results.get(action_id)?;
    match field {
        "status" => Some(status_str(result.outcome).to_string()),
        _ => {
            let output_field = field.strip_prefix("output.")?;
            result
                .output
                .get(output_field)
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        }
    }
}

fn status_str(outcome: ActionOutcome) -> &'static str {
    match outcome {
        ActionOutcome::Success => "success",
        ActionOutcome::Failed => "failed",
        ActionOutcome::Skipped => "skipped",
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Lookup(String),
    Literal(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Eq,
    Ne,
}

/// Evaluate a restricted `expression` condition: `<term> (== | !=) <term>`,
/// or a bare lookup treated as a null-check (`{{actions.a1.output.x}} != null`).
/// Anything outside this grammar returns `None` (unevaluable) — the caller
/// defaults to `true` with a logged warning per spec §4.3.
pub fn eval_expression(expr: &str, results: &HashMap<String, ActionResult>) -> Option<bool> {
    let expr = expr.trim();
    for (token, op) in [("!=", Op::Ne), ("==", Op::Eq)] {
        if let Some((lhs, rhs)) = expr.split_once(token) {
            let left = parse_term(lhs.trim())?;
            let right = parse_term(rhs.trim())?;
            return Some(compare(&left, &right, results, op));
        }
    }
    // bare lookup: truthy iff it resolves to a non-null value
    let term = parse_term(expr)?;
    match term {
        Term::Lookup(path) => Some(resolve_action_lookup(&path, results).is_some()),
        Term::Literal(_) => Some(true),
        Term::Null => Some(false),
    }
}

fn parse_term(raw: &str) -> Option<Term> {
    if raw == "null" {
        return Some(Term::Null);
    }
    if let Some(stripped) = raw.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
        return Some(Term::Lookup(stripped.trim().to_string()));
    }
    if (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
        || (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
    {
        return Some(Term::Literal(raw[1..raw.len() - 1].to_string()));
    }
    None
}

fn compare(left: &Term, right: &Term, results: &HashMap<String, ActionResult>, op: Op) -> bool {
    let resolve = |t: &Term| -> Option<String> {
        match t {
            Term::Lookup(path) => resolve_action_lookup(path, results),
            Term::Literal(s) => Some(s.clone()),
            Term::Null => None,
        }
    };
    let equal = resolve(left) == resolve(right);
    match op {
        Op::Eq => equal,
        Op::Ne => !equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            rule_id: "rul_1".to_string(),
            rule_name: "Pre-arrival welcome".to_string(),
            guest_first_name: Some("Ada".to_string()),
            room_number: Some("502".to_string()),
            ..Default::default()
        }
    }

    fn result(id: &str, outcome: ActionOutcome) -> ActionResult {
        ActionResult {
            action_id: id.to_string(),
            outcome,
            output: serde_json::json!({"messageId": "m1"}),
            error: None,
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let config = serde_json::json!({"body": "Hi {{firstName}}, room {{roomNumber}} is ready"});
        let out = substitute(&config, &ctx(), &HashMap::new());
        assert_eq!(out["body"], "Hi Ada, room 502 is ready");
    }

    #[test]
    fn missing_placeholder_becomes_empty_string() {
        let config = serde_json::json!("Dear {{lastName}}");
        let out = substitute(&config, &ctx(), &HashMap::new());
        assert_eq!(out, "Dear ");
    }

    #[test]
    fn substitutes_action_output_lookup() {
        let mut results = HashMap::new();
        results.insert("a1".to_string(), result("a1", ActionOutcome::Success));
        let config = serde_json::json!("id={{actions.a1.output.messageId}}");
        let out = substitute(&config, &ctx(), &results);
        assert_eq!(out, "id=m1");
    }

    #[test]
    fn status_equality_expression() {
        let mut results = HashMap::new();
        results.insert("a1".to_string(), result("a1", ActionOutcome::Success));
        assert_eq!(eval_expression(r#"{{actions.a1.status}} == "success""#, &results), Some(true));
        assert_eq!(eval_expression(r#"{{actions.a1.status}} == "failed""#, &results), Some(false));
    }

    #[test]
    fn null_check_expression() {
        let mut results = HashMap::new();
        results.insert("a1".to_string(), result("a1", ActionOutcome::Success));
        assert_eq!(eval_expression("{{actions.a1.output.missing}} != null", &results), Some(false));
        assert_eq!(eval_expression("{{actions.a1.output.messageId}} != null", &results), Some(true));
    }

    #[test]
    fn unparseable_expression_is_unevaluable() {
        assert_eq!(eval_expression("actions.a1.status ~~ weird", &HashMap::new()), None);
    }
}
