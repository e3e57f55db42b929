// Copyright 2024 OctoFlow Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Canonical value universe for expression evaluation
//!
//! Every expression evaluates to a `FlowValue`: null, boolean, IEEE-754
//! double, string, array or object. Collections are capability wrappers:
//! a value may be backed by an owned collection or by external data (for
//! example a template mapping) without a deep copy in either direction.
//! Comparison follows JavaScript abstract semantics with one deliberate
//! deviation: string comparison is case-insensitive (upper-cased).

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::core::memory::{string_cost, MIN_OBJECT_SIZE};

/// The six kinds of canonical values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Null
    Null,
    /// Boolean
    Boolean,
    /// IEEE-754 double
    Number,
    /// String
    String,
    /// Ordered sequence of values
    Array,
    /// Case-insensitive, order-preserving mapping
    Object,
}

/// Read-only array capability
///
/// External collections participate in evaluation by satisfying this
/// contract; conversion to a `FlowValue` never copies the items.
pub trait ArrayCompat: fmt::Debug {
    /// Number of items
    fn len(&self) -> usize;

    /// Item at `index`, or `None` past the end
    fn get(&self, index: usize) -> Option<FlowValue>;

    /// Whether the array is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable address of the underlying storage, used for reference equality
    fn identity(&self) -> usize {
        self as *const Self as *const () as usize
    }

    /// Whether this is a transient wildcard result rather than a real array
    fn is_filtered(&self) -> bool {
        false
    }
}

/// Read-only object capability with case-insensitive keys
pub trait ObjectCompat: fmt::Debug {
    /// Number of pairs
    fn len(&self) -> usize;

    /// Whether `key` exists (case-insensitive)
    fn contains_key(&self, key: &str) -> bool;

    /// Value for `key` (case-insensitive)
    fn get(&self, key: &str) -> Option<FlowValue>;

    /// Keys in insertion order
    fn keys(&self) -> Vec<Rc<str>>;

    /// Whether the object is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable address of the underlying storage, used for reference equality
    fn identity(&self) -> usize {
        self as *const Self as *const () as usize
    }
}

/// The collection capability of a value, when it has one
#[derive(Debug, Clone)]
pub enum Collection {
    /// Array capability
    Array(Rc<dyn ArrayCompat>),
    /// Object capability
    Object(Rc<dyn ObjectCompat>),
}

/// A canonical value
#[derive(Debug, Clone)]
pub enum FlowValue {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE-754 double
    Number(f64),
    /// String
    String(Rc<str>),
    /// Array capability
    Array(Rc<dyn ArrayCompat>),
    /// Object capability
    Object(Rc<dyn ObjectCompat>),
}

impl FlowValue {
    /// Create a string value
    pub fn string(value: impl Into<Rc<str>>) -> Self {
        Self::String(value.into())
    }

    /// The kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Number(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
        }
    }

    /// Human-readable kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            ValueKind::Null => "Null",
            ValueKind::Boolean => "Boolean",
            ValueKind::Number => "Number",
            ValueKind::String => "String",
            ValueKind::Array => "Array",
            ValueKind::Object => "Object",
        }
    }

    /// Whether the value is a primitive (not a collection)
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Array(_) | Self::Object(_))
    }

    /// The collection capability, when this value is a collection
    pub fn collection(&self) -> Option<Collection> {
        match self {
            Self::Array(array) => Some(Collection::Array(array.clone())),
            Self::Object(object) => Some(Collection::Object(object.clone())),
            _ => None,
        }
    }

    /// JavaScript truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::String(value) => !value.is_empty(),
            Self::Array(_) | Self::Object(_) => true,
        }
    }

    /// Inverse of [`is_truthy`](Self::is_truthy)
    pub fn is_falsy(&self) -> bool {
        !self.is_truthy()
    }

    /// Abstract conversion to a number
    ///
    /// Null converts to 0, booleans to 0/1, strings through the standard
    /// number parse (NaN on failure). Collections never convert.
    pub fn convert_to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Boolean(value) => {
                if *value {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(value) => *value,
            Self::String(value) => parse_number(value),
            Self::Array(_) | Self::Object(_) => f64::NAN,
        }
    }

    /// Display-string conversion used by `format`, `join` and traces
    ///
    /// Collections are not coerced to their contents; they render as the
    /// kind name.
    pub fn convert_to_display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Boolean(value) => {
                if *value {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Self::Number(value) => number_to_string(*value),
            Self::String(value) => value.to_string(),
            Self::Array(_) => "Array".to_string(),
            Self::Object(_) => "Object".to_string(),
        }
    }

    /// Approximate byte cost of this value
    ///
    /// `deep` traverses collections once through their capabilities; shallow
    /// accounts only the head.
    pub fn byte_size(&self, deep: bool) -> usize {
        fn shallow(value: &FlowValue) -> usize {
            match value {
                FlowValue::String(s) => string_cost(s),
                _ => MIN_OBJECT_SIZE,
            }
        }

        if !deep {
            return shallow(self);
        }
        let mut total = 0usize;
        let mut pending = vec![self.clone()];
        while let Some(value) = pending.pop() {
            total = total.saturating_add(shallow(&value));
            match &value {
                FlowValue::Array(array) => {
                    for index in 0..array.len() {
                        if let Some(item) = array.get(index) {
                            pending.push(item);
                        }
                    }
                }
                FlowValue::Object(object) => {
                    for key in object.keys() {
                        total = total.saturating_add(string_cost(&key));
                        if let Some(item) = object.get(&key) {
                            pending.push(item);
                        }
                    }
                }
                _ => {}
            }
        }
        total
    }

    /// Deep conversion from a JSON tree into owned canonical values
    pub fn from_json(value: &serde_json::Value) -> FlowValue {
        match value {
            serde_json::Value::Null => FlowValue::Null,
            serde_json::Value::Bool(b) => FlowValue::Boolean(*b),
            serde_json::Value::Number(n) => FlowValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => FlowValue::string(s.as_str()),
            serde_json::Value::Array(items) => {
                let mut array = ArrayValue::new();
                for item in items {
                    array.push(FlowValue::from_json(item));
                }
                FlowValue::Array(Rc::new(array))
            }
            serde_json::Value::Object(map) => {
                let mut object = ObjectValue::new();
                for (key, item) in map {
                    // case-insensitive duplicates keep the first pair
                    if !object.contains_key(key) {
                        object.push(key.as_str(), FlowValue::from_json(item));
                    }
                }
                FlowValue::Object(Rc::new(object))
            }
        }
    }

    /// Deep conversion into a JSON tree; NaN and infinities become null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FlowValue::Null => serde_json::Value::Null,
            FlowValue::Boolean(b) => serde_json::Value::Bool(*b),
            FlowValue::Number(n) => {
                // keep integral values as JSON integers
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    serde_json::Value::Number(serde_json::Number::from(*n as i64))
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            FlowValue::String(s) => serde_json::Value::String(s.to_string()),
            FlowValue::Array(array) => {
                let mut items = Vec::with_capacity(array.len());
                for index in 0..array.len() {
                    items.push(array.get(index).unwrap_or(FlowValue::Null).to_json());
                }
                serde_json::Value::Array(items)
            }
            FlowValue::Object(object) => {
                let mut map = serde_json::Map::new();
                for key in object.keys() {
                    let value = object.get(&key).unwrap_or(FlowValue::Null);
                    map.insert(key.to_string(), value.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

impl PartialEq for FlowValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a.identity() == b.identity(),
            (Self::Object(a), Self::Object(b)) => a.identity() == b.identity(),
            _ => false,
        }
    }
}

impl From<bool> for FlowValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for FlowValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FlowValue {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

/// Owned array value
#[derive(Debug, Default)]
pub struct ArrayValue {
    items: Vec<FlowValue>,
}

impl ArrayValue {
    /// Create an empty array
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item; valid only before the array is shared
    pub fn push(&mut self, value: FlowValue) {
        self.items.push(value);
    }
}

impl FromIterator<FlowValue> for ArrayValue {
    fn from_iter<T: IntoIterator<Item = FlowValue>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl ArrayCompat for ArrayValue {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<FlowValue> {
        self.items.get(index).cloned()
    }
}

/// Owned object value: insertion order preserved, lookup case-insensitive
/// through a lazily built upper-cased index
#[derive(Debug, Default)]
pub struct ObjectValue {
    pairs: Vec<(Rc<str>, FlowValue)>,
    index: RefCell<Option<FxHashMap<String, usize>>>,
}

impl ObjectValue {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair; the caller guarantees case-insensitive uniqueness
    pub fn push(&mut self, key: impl Into<Rc<str>>, value: FlowValue) {
        self.pairs.push((key.into(), value));
        // any previously built index is stale
        *self.index.borrow_mut() = None;
    }

    fn lookup(&self, key: &str) -> Option<usize> {
        let mut index = self.index.borrow_mut();
        let map = index.get_or_insert_with(|| {
            let mut map = FxHashMap::default();
            for (position, (key, _)) in self.pairs.iter().enumerate() {
                map.entry(key.to_uppercase()).or_insert(position);
            }
            map
        });
        map.get(&key.to_uppercase()).copied()
    }
}

impl ObjectCompat for ObjectValue {
    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn get(&self, key: &str) -> Option<FlowValue> {
        self.lookup(key).map(|position| self.pairs[position].1.clone())
    }

    fn keys(&self) -> Vec<Rc<str>> {
        self.pairs.iter().map(|(key, _)| key.clone()).collect()
    }
}

/// Transient array produced by a wildcard index
///
/// A filtered array is a real array for traversal purposes but keeps its
/// own marker so a subsequent index operator cascades over the items
/// instead of selecting one of them.
#[derive(Debug, Default)]
pub struct FilteredArray {
    items: Vec<FlowValue>,
}

impl FilteredArray {
    /// Create an empty filtered array
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item
    pub fn push(&mut self, value: FlowValue) {
        self.items.push(value);
    }
}

impl ArrayCompat for FilteredArray {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<FlowValue> {
        self.items.get(index).cloned()
    }

    fn is_filtered(&self) -> bool {
        true
    }
}

/// Parse a number the way the abstract conversion does
///
/// Leading/trailing whitespace is ignored; the empty string is 0; anything
/// the standard float parse rejects is NaN.
pub fn parse_number(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Canonical number-to-string conversion
///
/// Integral values print without a decimal point; `-0` prints as `"0"`;
/// NaN and the infinities print as their literal names.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return format!("{}", value as i64);
    }
    format!("{value}")
}

/// Result of coercing two operands for an abstract comparison
enum CoercedPair {
    Strings(String, String),
    Numbers(f64, f64),
    Identity(bool),
    Incomparable,
}

fn coerce_pair(left: &FlowValue, right: &FlowValue) -> CoercedPair {
    match (left, right) {
        (FlowValue::Array(a), FlowValue::Array(b)) => {
            CoercedPair::Identity(a.identity() == b.identity())
        }
        (FlowValue::Object(a), FlowValue::Object(b)) => {
            CoercedPair::Identity(a.identity() == b.identity())
        }
        (FlowValue::Array(_) | FlowValue::Object(_), _)
        | (_, FlowValue::Array(_) | FlowValue::Object(_)) => CoercedPair::Incomparable,
        (FlowValue::String(a), FlowValue::String(b)) => {
            CoercedPair::Strings(a.to_uppercase(), b.to_uppercase())
        }
        _ => CoercedPair::Numbers(left.convert_to_number(), right.convert_to_number()),
    }
}

/// Abstract equality after two-sided coercion
pub fn abstract_equal(left: &FlowValue, right: &FlowValue) -> bool {
    match coerce_pair(left, right) {
        CoercedPair::Strings(a, b) => a == b,
        CoercedPair::Numbers(a, b) => a == b,
        CoercedPair::Identity(equal) => equal,
        CoercedPair::Incomparable => false,
    }
}

/// Abstract less-than after two-sided coercion
pub fn abstract_less_than(left: &FlowValue, right: &FlowValue) -> bool {
    match coerce_pair(left, right) {
        CoercedPair::Strings(a, b) => a < b,
        CoercedPair::Numbers(a, b) => a < b,
        _ => false,
    }
}

/// Abstract greater-than after two-sided coercion
pub fn abstract_greater_than(left: &FlowValue, right: &FlowValue) -> bool {
    match coerce_pair(left, right) {
        CoercedPair::Strings(a, b) => a > b,
        CoercedPair::Numbers(a, b) => a > b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array_of(items: Vec<FlowValue>) -> FlowValue {
        FlowValue::Array(Rc::new(items.into_iter().collect::<ArrayValue>()))
    }

    #[test]
    fn test_truthiness() {
        assert!(FlowValue::Null.is_falsy());
        assert!(FlowValue::Boolean(false).is_falsy());
        assert!(FlowValue::Number(0.0).is_falsy());
        assert!(FlowValue::Number(-0.0).is_falsy());
        assert!(FlowValue::Number(f64::NAN).is_falsy());
        assert!(FlowValue::string("").is_falsy());
        assert!(FlowValue::Boolean(true).is_truthy());
        assert!(FlowValue::Number(0.5).is_truthy());
        assert!(FlowValue::string("x").is_truthy());
        assert!(array_of(vec![]).is_truthy());
    }

    #[test]
    fn test_number_string_coercion() {
        assert!(abstract_equal(
            &FlowValue::Number(1.0),
            &FlowValue::string("1")
        ));
        assert!(abstract_equal(
            &FlowValue::string("2.5"),
            &FlowValue::Number(2.5)
        ));
        assert!(!abstract_equal(
            &FlowValue::Number(1.0),
            &FlowValue::string("abc")
        ));
    }

    #[test]
    fn test_string_compare_ignores_case() {
        assert!(abstract_equal(
            &FlowValue::string("Hello"),
            &FlowValue::string("HELLO")
        ));
        assert!(abstract_less_than(
            &FlowValue::string("apple"),
            &FlowValue::string("BANANA")
        ));
    }

    #[test]
    fn test_null_and_bool_coerce_to_numbers() {
        assert!(abstract_equal(&FlowValue::Null, &FlowValue::Number(0.0)));
        assert!(abstract_equal(
            &FlowValue::Boolean(true),
            &FlowValue::Number(1.0)
        ));
        assert!(abstract_equal(
            &FlowValue::Boolean(false),
            &FlowValue::string("0")
        ));
    }

    #[test]
    fn test_nan_equals_nothing() {
        let nan = FlowValue::Number(f64::NAN);
        assert!(!abstract_equal(&nan, &nan));
        assert!(!abstract_less_than(&nan, &FlowValue::Number(1.0)));
        assert!(!abstract_greater_than(&nan, &FlowValue::Number(1.0)));
    }

    #[test]
    fn test_collection_equality_is_identity() {
        let a = array_of(vec![FlowValue::Number(1.0)]);
        let b = array_of(vec![FlowValue::Number(1.0)]);
        assert!(abstract_equal(&a, &a.clone()));
        assert!(!abstract_equal(&a, &b));
        assert!(!abstract_equal(&a, &FlowValue::string("Array")));
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(-42.0), "-42");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1"), 1.0);
        assert_eq!(parse_number("  2.5  "), 2.5);
        assert_eq!(parse_number(""), 0.0);
        assert!(parse_number("abc").is_nan());
    }

    #[test]
    fn test_object_case_insensitive_lookup() {
        let mut object = ObjectValue::new();
        object.push("Name", FlowValue::string("build"));
        object.push("Steps", FlowValue::Number(3.0));
        assert!(object.contains_key("name"));
        assert!(object.contains_key("NAME"));
        assert_eq!(
            object.get("steps"),
            Some(FlowValue::Number(3.0))
        );
        assert_eq!(object.get("missing"), None);
        let keys: Vec<String> = object.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["Name".to_string(), "Steps".to_string()]);
    }

    #[test]
    fn test_byte_size_deep_counts_children() {
        let value = array_of(vec![FlowValue::string("ab"), FlowValue::Number(1.0)]);
        let shallow = value.byte_size(false);
        let deep = value.byte_size(true);
        assert_eq!(shallow, MIN_OBJECT_SIZE);
        assert_eq!(deep, MIN_OBJECT_SIZE + string_cost("ab") + MIN_OBJECT_SIZE);
    }

    #[test]
    fn test_json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a":1,"b":[true,null],"c":"x"}"#).unwrap();
        let value = FlowValue::from_json(&json);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_filtered_array_marker() {
        let filtered = FilteredArray::new();
        assert!(filtered.is_filtered());
        let owned = ArrayValue::new();
        assert!(!ArrayCompat::is_filtered(&owned));
    }
}
