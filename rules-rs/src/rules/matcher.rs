//! Restriction evaluation
//!
//! Tests a rule's condition against an incoming message's properties.
//! Evaluation is pure and side-effect-free: a missing property or an invalid
//! pattern is a non-match, never an error.

use crate::rules::types::{MatchType, PropertyOp, Restriction};
use crate::store::types::StoredMessage;
use regex::Regex;

/// Evaluate a restriction against a message.
pub fn matches(restriction: &Restriction, message: &StoredMessage) -> bool {
    match restriction {
        Restriction::True => true,
        Restriction::False => false,
        Restriction::Not { restriction } => !matches(restriction, message),
        Restriction::And { restrictions } => {
            // Short-circuits on the first definitive false
            restrictions.iter().all(|r| matches(r, message))
        }
        Restriction::Or { restrictions } => restrictions.iter().any(|r| matches(r, message)),
        Restriction::Exists { property } => message.property(property).is_some(),
        Restriction::Content {
            property,
            match_type,
            case_sensitive,
            value,
        } => match message.property(property) {
            Some(prop) => content_matches(prop, match_type, *case_sensitive, value),
            None => false,
        },
        Restriction::Property {
            property,
            op,
            value,
        } => match message.property(property) {
            Some(prop) => property_matches(prop, op, value),
            None => false,
        },
        Restriction::Size { over, size } => {
            if *over {
                message.size > *size as i64
            } else {
                message.size < *size as i64
            }
        }
    }
}

/// String content test. For array-valued properties (e.g. recipients) any
/// element matching is a match.
fn content_matches(
    prop: &serde_json::Value,
    match_type: &MatchType,
    case_sensitive: bool,
    pattern: &str,
) -> bool {
    match prop {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .any(|s| string_matches(s, match_type, case_sensitive, pattern)),
        serde_json::Value::String(s) => string_matches(s, match_type, case_sensitive, pattern),
        other => string_matches(&other.to_string(), match_type, case_sensitive, pattern),
    }
}

fn string_matches(value: &str, match_type: &MatchType, case_sensitive: bool, pattern: &str) -> bool {
    let (value, pattern) = if case_sensitive {
        (value.to_string(), pattern.to_string())
    } else {
        (value.to_lowercase(), pattern.to_lowercase())
    };

    match match_type {
        MatchType::Is => value == pattern,
        MatchType::Contains => value.contains(&pattern),
        MatchType::Prefix => value.starts_with(&pattern),
        MatchType::Regex => match Regex::new(&pattern) {
            Ok(re) => re.is_match(&value),
            Err(_) => false,
        },
    }
}

/// Typed comparison. Numbers compare numerically, strings lexically; a type
/// mismatch is a non-match.
fn property_matches(prop: &serde_json::Value, op: &PropertyOp, value: &serde_json::Value) -> bool {
    use std::cmp::Ordering;

    let ordering = if let (Some(a), Some(b)) = (prop.as_i64(), value.as_i64()) {
        a.partial_cmp(&b)
    } else if let (Some(a), Some(b)) = (prop.as_f64(), value.as_f64()) {
        a.partial_cmp(&b)
    } else if let (Some(a), Some(b)) = (prop.as_str(), value.as_str()) {
        Some(a.cmp(b))
    } else if let (Some(a), Some(b)) = (prop.as_bool(), value.as_bool()) {
        Some(a.cmp(&b))
    } else {
        None
    };

    let Some(ordering) = ordering else {
        return matches!(op, PropertyOp::Ne);
    };

    match op {
        PropertyOp::Eq => ordering == Ordering::Equal,
        PropertyOp::Ne => ordering != Ordering::Equal,
        PropertyOp::Lt => ordering == Ordering::Less,
        PropertyOp::Le => ordering != Ordering::Greater,
        PropertyOp::Gt => ordering == Ordering::Greater,
        PropertyOp::Ge => ordering != Ordering::Less,
    }
}
