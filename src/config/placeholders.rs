//! Placeholder resolution for merged configuration trees.
//!
//! String leaves may defer their value to a later lookup:
//! - `@reference:<path>` copies the value found at a dotted path in the same tree
//! - `@environment:<prefix>:<VAR>[:<type>[:array]]` reads a process environment
//!   variable and coerces it to `<type>`
//!
//! Resolution is best-effort. Anything that cannot be resolved keeps its
//! literal string value.

use super::tree::{Segment, TreePath, is_truthy};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};
use tracing::trace;

const REFERENCE_MARKER: &str = "@reference:";
const ENVIRONMENT_MARKER: &str = "@environment:";

/// Target type for an environment value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Number,
    Object,
    Timestamp,
    /// Recognized but not converted.
    Regex,
    /// Unspecified or unknown: the raw string is kept.
    Text,
}

impl ValueKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "bool" | "boolean" => ValueKind::Bool,
            "number" => ValueKind::Number,
            "object" => ValueKind::Object,
            "date" | "time" | "datetime" | "timestamp" => ValueKind::Timestamp,
            "regex" => ValueKind::Regex,
            _ => ValueKind::Text,
        }
    }

    /// Convert a raw string, falling back to the string itself on failure.
    pub fn coerce(&self, raw: &str) -> Value {
        let converted = match self {
            ValueKind::Bool => Some(Value::Bool(raw.eq_ignore_ascii_case("true"))),
            ValueKind::Number => parse_leading_integer(raw),
            ValueKind::Object => serde_json::from_str(raw).ok(),
            ValueKind::Timestamp => parse_timestamp(raw).map(|ts| Value::String(ts.to_rfc3339())),
            ValueKind::Regex | ValueKind::Text => None,
        };
        converted.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

/// An environment variable lookup parsed from an `@environment:` spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLookup {
    pub prefix: String,
    pub var: String,
    pub kind: ValueKind,
    pub array: bool,
}

impl EnvLookup {
    /// Read and coerce the variable. `None` if it is unset or empty.
    pub fn resolve(&self) -> Option<Value> {
        let raw = std::env::var(&self.var).ok().filter(|v| !v.is_empty())?;
        if self.array {
            Some(Value::Array(
                raw.split(',').map(|item| self.kind.coerce(item)).collect(),
            ))
        } else {
            Some(self.kind.coerce(&raw))
        }
    }
}

/// A deferred lookup encoded in a string leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Reference(TreePath),
    Environment(EnvLookup),
}

impl Placeholder {
    /// Parse a string leaf. Plain strings and malformed specs yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        if !value.starts_with('@') {
            return None;
        }

        if let Some(path) = value.strip_prefix(REFERENCE_MARKER) {
            return TreePath::parse(path).map(Placeholder::Reference);
        }

        let spec = value.strip_prefix(ENVIRONMENT_MARKER)?;
        let mut fields = spec.split(':');
        let prefix = fields.next().unwrap_or_default();
        let var = fields.next().filter(|v| !v.is_empty())?;
        let kind = fields.next().map(ValueKind::from_str).unwrap_or(ValueKind::Text);
        let array = fields.next() == Some("array");

        Some(Placeholder::Environment(EnvLookup {
            prefix: prefix.to_string(),
            var: var.to_string(),
            kind,
            array,
        }))
    }

    /// Resolve against `tree`. `None` leaves the placeholder untouched.
    pub fn resolve(&self, tree: &Value) -> Option<Value> {
        match self {
            Placeholder::Reference(path) => path.get(tree).filter(|v| is_truthy(v)).cloned(),
            Placeholder::Environment(lookup) => lookup.resolve(),
        }
    }
}

/// Resolve every placeholder in `config`.
///
/// Leaves are visited depth-first, pre-order (mapping keys in document order)
/// and replaced in place, so a reference observes earlier leaves already resolved.
pub fn resolve_placeholders(mut config: Value) -> Value {
    let mut leaves = Vec::new();
    collect_string_leaves(&config, &TreePath::root(), &mut leaves);

    for path in leaves {
        let Some(Value::String(current)) = path.get(&config) else {
            continue;
        };
        let Some(placeholder) = Placeholder::parse(current) else {
            continue;
        };
        if let Some(resolved) = placeholder.resolve(&config) {
            trace!(path = %path, "Resolved placeholder");
            path.set(&mut config, resolved);
        }
    }

    config
}

fn collect_string_leaves(node: &Value, path: &TreePath, out: &mut Vec<TreePath>) {
    match node {
        Value::String(_) => out.push(path.clone()),
        Value::Object(map) => {
            for (key, child) in map {
                collect_string_leaves(child, &path.child(Segment::Key(key.clone())), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_string_leaves(child, &path.child(Segment::Index(index)), out);
            }
        }
        _ => {}
    }
}

/// Integer prefix of `raw`, following the lenient rules of JavaScript's `parseInt`:
/// leading whitespace, an optional sign, `0x` for hex, then digits up to the
/// first non-digit.
fn parse_leading_integer(raw: &str) -> Option<Value> {
    let s = raw.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, s) = match s.get(..2) {
        Some("0x") | Some("0X") => (16, &s[2..]),
        _ => (10, s),
    };

    let digits_len = s
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map_or(s.len(), |(i, _)| i);
    let digits = &s[..digits_len];
    if digits.is_empty() {
        return None;
    }

    match i64::from_str_radix(digits, radix) {
        Ok(n) => Some(Value::Number(Number::from(if negative { -n } else { n }))),
        Err(_) => {
            // Too large for i64: approximate like a double would.
            let magnitude = digits
                .chars()
                .filter_map(|c| c.to_digit(radix))
                .fold(0f64, |acc, d| acc * f64::from(radix) + f64::from(d));
            Number::from_f64(if negative { -magnitude } else { magnitude }).map(Value::Number)
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reference() {
        let placeholder = Placeholder::parse("@reference:server.host").unwrap();
        assert_eq!(
            placeholder,
            Placeholder::Reference(TreePath::parse("server.host").unwrap())
        );
    }

    #[test]
    fn test_parse_environment_fields() {
        let placeholder = Placeholder::parse("@environment:APP:TAGS:string:array").unwrap();
        assert_eq!(
            placeholder,
            Placeholder::Environment(EnvLookup {
                prefix: "APP".into(),
                var: "TAGS".into(),
                kind: ValueKind::Text,
                array: true,
            })
        );
    }

    #[test]
    fn test_parse_ignores_plain_and_malformed() {
        assert!(Placeholder::parse("plain").is_none());
        assert!(Placeholder::parse("@someone").is_none());
        assert!(Placeholder::parse("@reference:").is_none());
        assert!(Placeholder::parse("@environment:ONLY_PREFIX").is_none());
        assert!(Placeholder::parse("@environment:P::number").is_none());
    }

    #[test]
    fn test_reference_resolves_sibling() {
        let config = json!({"base": "hello", "alias": "@reference:base"});
        assert_eq!(
            resolve_placeholders(config),
            json!({"base": "hello", "alias": "hello"})
        );
    }

    #[test]
    fn test_reference_missing_stays_literal() {
        let config = json!({"alias": "@reference:missing.path"});
        assert_eq!(resolve_placeholders(config.clone()), config);
    }

    #[test]
    fn test_reference_falsy_stays_literal() {
        let config = json!({"off": false, "zero": 0, "a": "@reference:off", "b": "@reference:zero"});
        assert_eq!(resolve_placeholders(config.clone()), config);
    }

    #[test]
    fn test_reference_copies_subtree_and_array_items() {
        let config = json!({
            "db": {"host": "h", "port": 1},
            "hosts": ["x", "y"],
            "copy": "@reference:db",
            "second": "@reference:hosts[1]"
        });
        let resolved = resolve_placeholders(config);
        assert_eq!(resolved["copy"], json!({"host": "h", "port": 1}));
        assert_eq!(resolved["second"], json!("y"));
    }

    #[test]
    fn test_reference_chain_sees_resolved_earlier_leaf() {
        let config = json!({"z": "v", "y": "@reference:z", "x": "@reference:y"});
        let resolved = resolve_placeholders(config);
        assert_eq!(resolved, json!({"z": "v", "y": "v", "x": "v"}));
    }

    #[test]
    fn test_parsed_yaml_resolves_in_document_order() {
        let yaml = "zone: eu-west\nregion: \"@reference:zone\"\nalias: \"@reference:region\"\n";
        let config = crate::config::cache::parse_content(std::path::Path::new("a.yaml"), yaml)
            .unwrap();

        let resolved = resolve_placeholders(config);

        assert_eq!(
            resolved,
            json!({"zone": "eu-west", "region": "eu-west", "alias": "eu-west"})
        );
    }

    #[test]
    fn test_reference_to_later_placeholder_copies_its_text() {
        let config = json!({"c": "@reference:b", "b": "@reference:a", "a": "v"});
        let resolved = resolve_placeholders(config);
        assert_eq!(resolved["c"], json!("@reference:a"));
        assert_eq!(resolved["b"], json!("v"));
    }

    #[test]
    fn test_placeholders_inside_arrays() {
        let config = json!({"name": "svc", "labels": ["static", "@reference:name"]});
        let resolved = resolve_placeholders(config);
        assert_eq!(resolved["labels"], json!(["static", "svc"]));
    }

    #[test]
    fn test_coerce_bool() {
        assert_eq!(ValueKind::Bool.coerce("TRUE"), json!(true));
        assert_eq!(ValueKind::Bool.coerce("yes"), json!(false));
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(ValueKind::Number.coerce("8080"), json!(8080));
        assert_eq!(ValueKind::Number.coerce("  42px"), json!(42));
        assert_eq!(ValueKind::Number.coerce("-7"), json!(-7));
        assert_eq!(ValueKind::Number.coerce("0x1A"), json!(26));
        assert_eq!(ValueKind::Number.coerce("abc"), json!("abc"));
    }

    #[test]
    fn test_coerce_object() {
        assert_eq!(ValueKind::Object.coerce(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(ValueKind::Object.coerce("{broken"), json!("{broken"));
    }

    #[test]
    fn test_coerce_timestamp() {
        assert_eq!(
            ValueKind::Timestamp.coerce("2024-03-01T10:00:00+02:00"),
            json!("2024-03-01T08:00:00+00:00")
        );
        assert_eq!(
            ValueKind::Timestamp.coerce("2024-03-01"),
            json!("2024-03-01T00:00:00+00:00")
        );
        assert_eq!(ValueKind::Timestamp.coerce("not a date"), json!("not a date"));
    }

    #[test]
    fn test_coerce_regex_and_unknown_pass_through() {
        assert_eq!(ValueKind::Regex.coerce("^a+$"), json!("^a+$"));
        assert_eq!(ValueKind::from_str("whatever").coerce("v"), json!("v"));
    }
}
