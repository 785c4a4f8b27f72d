//! # Ad-Hoc Coercion Entries
//!
//! The coercion registry bypasses schema validation for values whose
//! declared type has a registered validator/parser pair. The four
//! built-ins cover the well-known primitives; callers extend the registry
//! at pipeline construction time, with later registrations overwriting
//! earlier ones on identity collision.
//!
//! ## Ordering Invariant
//!
//! A parser is only ever invoked on a value its validator has accepted
//! (or for which validation is bypassed wholesale). Built-in parsers are
//! total anyway — a value they cannot interpret yields
//! [`Coerced::Absent`], never a panic — but the validator-before-parser
//! ordering is what keeps `Absent` from reaching callers.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::declared::DeclaredType;

/// Result of a coercion pass: either JSON (possibly rewritten), a parsed
/// native timestamp, or the undefined sentinel of a parser that could not
/// interpret its input.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// A JSON value, coerced or passed through.
    Json(Value),
    /// A parsed point in time.
    Timestamp(DateTime<Utc>),
    /// The undefined sentinel. Unreachable for built-in entries after
    /// their validator passed.
    Absent,
}

impl Coerced {
    /// Fold back into JSON: timestamps become RFC 3339 text, `Absent`
    /// becomes `null`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Timestamp(dt) => Value::String(dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)),
            Self::Absent => Value::Null,
        }
    }

    /// Borrow the inner JSON value, if this is [`Coerced::Json`].
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this is the undefined sentinel.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<Value> for Coerced {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

type ValidatorFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;
type ParserFn = Box<dyn Fn(&Value) -> Coerced + Send + Sync>;

/// A validator/parser pair for one declared-type identity.
///
/// The validator returns a failure message, or `None` when the value is
/// acceptable. The parser performs the actual coercion.
pub struct CoercionEntry {
    validator: ValidatorFn,
    parser: ParserFn,
}

impl CoercionEntry {
    /// Build an entry from a validator and a parser closure.
    pub fn new(
        validator: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
        parser: impl Fn(&Value) -> Coerced + Send + Sync + 'static,
    ) -> Self {
        Self {
            validator: Box::new(validator),
            parser: Box::new(parser),
        }
    }

    /// Run the validator. `None` means the value is acceptable.
    pub fn validate(&self, value: &Value) -> Option<String> {
        (self.validator)(value)
    }

    /// Run the parser. Must only be called on validator-accepted values
    /// (or when validation is bypassed wholesale).
    pub fn parse(&self, value: &Value) -> Coerced {
        (self.parser)(value)
    }
}

impl fmt::Debug for CoercionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoercionEntry").finish_non_exhaustive()
    }
}

/// Declared-type identity → coercion entry, with exact-identity lookup.
#[derive(Debug)]
pub struct CoercionRegistry {
    entries: HashMap<DeclaredType, CoercionEntry>,
}

impl CoercionRegistry {
    /// A registry seeded with the four built-in entries.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(DeclaredType::Text, text_entry());
        registry.insert(DeclaredType::Number, number_entry());
        registry.insert(DeclaredType::Bool, bool_entry());
        registry.insert(DeclaredType::Timestamp, timestamp_entry());
        registry
    }

    /// A registry with no entries at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an entry. Overwrites any existing entry for the same
    /// identity — later registration wins.
    pub fn insert(&mut self, identity: DeclaredType, entry: CoercionEntry) {
        self.entries.insert(identity, entry);
    }

    /// Exact-identity lookup.
    pub fn lookup(&self, identity: &DeclaredType) -> Option<&CoercionEntry> {
        self.entries.get(identity)
    }

    /// Whether an entry exists for the identity.
    pub fn contains(&self, identity: &DeclaredType) -> bool {
        self.entries.contains_key(identity)
    }
}

impl Default for CoercionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Numeric coercion. Numbers are themselves, booleans map to 0/1, and
/// strings parse as finite floats after trimming. Null, blank strings,
/// arrays, and objects are not numeric.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// The boolean literal table: `"true"`, `"1"`, `true`, `1` and their
/// false-side counterparts. Anything else is not a boolean.
pub fn boolean_literal(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(true),
            Some(x) if x == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Timestamp coercion: numeric values are epoch milliseconds, strings are
/// RFC 3339. Out-of-range instants and unparseable text are rejected.
pub fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(millis) = numeric_value(value) {
        return Utc.timestamp_millis_opt(millis as i64).single();
    }
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Display on Value is compact JSON, which is what composite
        // values become; strings are special-cased above to avoid the
        // surrounding quotes.
        other => other.to_string(),
    }
}

fn number_from_f64(x: f64) -> Value {
    if x.fract() == 0.0 && x >= i64::MIN as f64 && x <= i64::MAX as f64 {
        Value::Number(serde_json::Number::from(x as i64))
    } else {
        serde_json::Number::from_f64(x)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn text_entry() -> CoercionEntry {
    CoercionEntry::new(
        |v| v.is_null().then(|| "Data should be string".to_string()),
        |v| Coerced::Json(Value::String(stringify(v))),
    )
}

fn number_entry() -> CoercionEntry {
    CoercionEntry::new(
        |v| numeric_value(v).is_none().then(|| "Data should be number".to_string()),
        |v| match numeric_value(v) {
            Some(x) => Coerced::Json(number_from_f64(x)),
            None => Coerced::Absent,
        },
    )
}

fn bool_entry() -> CoercionEntry {
    CoercionEntry::new(
        |v| boolean_literal(v).is_none().then(|| "Data should be boolean".to_string()),
        |v| match boolean_literal(v) {
            Some(b) => Coerced::Json(Value::Bool(b)),
            None => Coerced::Absent,
        },
    )
}

fn timestamp_entry() -> CoercionEntry {
    CoercionEntry::new(
        |v| {
            timestamp_value(v)
                .is_none()
                .then(|| "Data should be 'date' format".to_string())
        },
        |v| match timestamp_value(v) {
            Some(dt) => Coerced::Timestamp(dt),
            None => Coerced::Absent,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn entry(identity: &DeclaredType) -> &'static CoercionEntry {
        // One shared builtin registry for the table tests.
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<CoercionRegistry> = OnceLock::new();
        REGISTRY
            .get_or_init(CoercionRegistry::builtin)
            .lookup(identity)
            .expect("builtin entry")
    }

    #[test]
    fn test_string_rejects_null() {
        let e = entry(&DeclaredType::Text);
        assert_eq!(e.validate(&Value::Null), Some("Data should be string".into()));
        assert_eq!(e.validate(&json!("ok")), None);
    }

    #[test]
    fn test_string_parser_stringifies() {
        let e = entry(&DeclaredType::Text);
        assert_eq!(e.parse(&json!(false)), Coerced::Json(json!("false")));
        assert_eq!(e.parse(&json!(123)), Coerced::Json(json!("123")));
        assert_eq!(e.parse(&json!("kept")), Coerced::Json(json!("kept")));
        assert_eq!(e.parse(&json!([1, 2])), Coerced::Json(json!("[1,2]")));
    }

    #[test]
    fn test_number_coercion_table() {
        let e = entry(&DeclaredType::Number);
        assert_eq!(e.validate(&json!("123")), None);
        assert_eq!(e.parse(&json!("123")), Coerced::Json(json!(123)));
        assert_eq!(e.parse(&json!(false)), Coerced::Json(json!(0)));
        assert_eq!(e.parse(&json!("1.5")), Coerced::Json(json!(1.5)));
        assert_eq!(
            e.validate(&json!("abc")),
            Some("Data should be number".into())
        );
        assert_eq!(e.validate(&json!(null)), Some("Data should be number".into()));
        assert_eq!(e.validate(&json!("")), Some("Data should be number".into()));
        assert_eq!(e.validate(&json!({})), Some("Data should be number".into()));
    }

    #[test]
    fn test_number_rejects_non_finite_strings() {
        let e = entry(&DeclaredType::Number);
        assert!(e.validate(&json!("NaN")).is_some());
        assert!(e.validate(&json!("inf")).is_some());
    }

    #[test]
    fn test_boolean_truth_table() {
        let e = entry(&DeclaredType::Bool);
        for v in [json!("true"), json!("1"), json!(true), json!(1)] {
            assert_eq!(e.validate(&v), None, "{v} should be boolean");
            assert_eq!(e.parse(&v), Coerced::Json(json!(true)), "{v} should parse true");
        }
        for v in [json!("false"), json!("0"), json!(false), json!(0)] {
            assert_eq!(e.validate(&v), None, "{v} should be boolean");
            assert_eq!(e.parse(&v), Coerced::Json(json!(false)), "{v} should parse false");
        }
        for v in [json!("yes"), json!(2), json!(null), json!("TRUE"), json!([])] {
            assert_eq!(
                e.validate(&v),
                Some("Data should be boolean".into()),
                "{v} should be rejected"
            );
            assert!(e.parse(&v).is_absent());
        }
    }

    #[test]
    fn test_timestamp_from_epoch_millis() {
        let e = entry(&DeclaredType::Timestamp);
        assert_eq!(e.validate(&json!(0)), None);
        let Coerced::Timestamp(dt) = e.parse(&json!(1_700_000_000_000_i64)) else {
            panic!("expected timestamp");
        };
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_timestamp_from_rfc3339_text() {
        let e = entry(&DeclaredType::Timestamp);
        assert_eq!(e.validate(&json!("2026-01-15T12:30:45Z")), None);
        let Coerced::Timestamp(dt) = e.parse(&json!("2026-01-15T12:30:45+05:00")) else {
            panic!("expected timestamp");
        };
        assert_eq!(dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true), "2026-01-15T07:30:45Z");
    }

    #[test]
    fn test_timestamp_numeric_string_uses_millis() {
        let e = entry(&DeclaredType::Timestamp);
        let Coerced::Timestamp(dt) = e.parse(&json!("86400000")) else {
            panic!("expected timestamp");
        };
        assert_eq!(dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true), "1970-01-02T00:00:00Z");
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        let e = entry(&DeclaredType::Timestamp);
        assert_eq!(
            e.validate(&json!("not a date")),
            Some("Data should be 'date' format".into())
        );
        assert!(e.validate(&json!({})).is_some());
    }

    #[test]
    fn test_custom_entry_overwrites_builtin() {
        let mut registry = CoercionRegistry::builtin();
        registry.insert(
            DeclaredType::Bool,
            CoercionEntry::new(|_| None, |_| Coerced::Json(json!(true))),
        );
        let e = registry.lookup(&DeclaredType::Bool).unwrap();
        assert_eq!(e.validate(&json!("anything")), None);
    }

    #[test]
    fn test_coerced_into_value() {
        assert_eq!(Coerced::Json(json!(1)).into_value(), json!(1));
        assert_eq!(Coerced::Absent.into_value(), Value::Null);
        let dt = Utc.timestamp_millis_opt(0).single().unwrap();
        assert_eq!(
            Coerced::Timestamp(dt).into_value(),
            json!("1970-01-01T00:00:00Z")
        );
    }

    proptest! {
        #[test]
        fn prop_boolean_rejects_alphabetic_strings(s in "[a-zA-Z]{2,12}") {
            prop_assume!(s != "true" && s != "false");
            let e = entry(&DeclaredType::Bool);
            prop_assert!(e.validate(&json!(s)).is_some());
        }

        #[test]
        fn prop_number_roundtrips_integer_strings(n in any::<i32>()) {
            let e = entry(&DeclaredType::Number);
            let v = json!(n.to_string());
            prop_assert!(e.validate(&v).is_none());
            prop_assert_eq!(e.parse(&v), Coerced::Json(json!(n as i64)));
        }

        #[test]
        fn prop_failed_validation_never_precedes_parse(s in "[!-~]{0,8}") {
            // The pipeline contract: parse only runs after validate
            // accepts. For the boolean entry the two agree exactly.
            let e = entry(&DeclaredType::Bool);
            let v = json!(s);
            prop_assert_eq!(e.validate(&v).is_none(), !e.parse(&v).is_absent());
        }
    }
}
