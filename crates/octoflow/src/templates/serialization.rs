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

//! Persisted token form
//!
//! Tokens serialize to a compact tagged JSON layout: every non-scalar
//! carries an integer `type` field, optional `file`/`line`/`col`, and one
//! payload field. Scalars without provenance serialize as bare JSON
//! primitives and round-trip back to the corresponding literal kind. The
//! integer tags are part of the wire format and must never change.

use serde::ser::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::rc::Rc;

use crate::core::error::{FlowError, Result, SourceLocation};
use crate::core::error_code::EX0016;

use super::token::{TemplateToken, TokenMeta};

/// `type` tag for string tokens
pub const TOKEN_TYPE_STRING: u8 = 0;
/// `type` tag for sequence tokens
pub const TOKEN_TYPE_SEQUENCE: u8 = 1;
/// `type` tag for mapping tokens
pub const TOKEN_TYPE_MAPPING: u8 = 2;
/// `type` tag for basic-expression tokens
pub const TOKEN_TYPE_BASIC_EXPRESSION: u8 = 3;
/// `type` tag for insert-expression tokens
pub const TOKEN_TYPE_INSERT_EXPRESSION: u8 = 4;
/// `type` tag for boolean tokens
pub const TOKEN_TYPE_BOOLEAN: u8 = 5;
/// `type` tag for number tokens
pub const TOKEN_TYPE_NUMBER: u8 = 6;
/// `type` tag for null tokens
pub const TOKEN_TYPE_NULL: u8 = 7;

fn tagged(token_type: u8, meta: TokenMeta) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("type".to_string(), json!(token_type));
    if let Some(file_id) = meta.file_id {
        map.insert("file".to_string(), json!(file_id));
    }
    if let Some(location) = meta.location {
        map.insert("line".to_string(), json!(location.line));
        map.insert("col".to_string(), json!(location.column));
    }
    map
}

fn number_value(value: f64) -> Value {
    // integral values persist as JSON integers so bare primitives
    // round-trip byte-for-byte
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(serde_json::Number::from(value as i64));
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn has_meta(meta: TokenMeta) -> bool {
    meta.file_id.is_some() || meta.location.is_some()
}

/// Serialize a token into the persisted JSON layout
pub fn serialize_token(token: &TemplateToken) -> Value {
    match token {
        TemplateToken::Null(t) => {
            if has_meta(t.meta) {
                Value::Object(tagged(TOKEN_TYPE_NULL, t.meta))
            } else {
                Value::Null
            }
        }
        TemplateToken::Boolean(t) => {
            if has_meta(t.meta) {
                let mut map = tagged(TOKEN_TYPE_BOOLEAN, t.meta);
                map.insert("bool".to_string(), Value::Bool(t.value));
                Value::Object(map)
            } else {
                Value::Bool(t.value)
            }
        }
        TemplateToken::Number(t) => {
            if has_meta(t.meta) {
                let mut map = tagged(TOKEN_TYPE_NUMBER, t.meta);
                map.insert("num".to_string(), number_value(t.value));
                Value::Object(map)
            } else {
                number_value(t.value)
            }
        }
        TemplateToken::String(t) => {
            if has_meta(t.meta) {
                let mut map = tagged(TOKEN_TYPE_STRING, t.meta);
                map.insert("lit".to_string(), Value::String(t.value.to_string()));
                Value::Object(map)
            } else {
                Value::String(t.value.to_string())
            }
        }
        TemplateToken::Sequence(t) => {
            let mut map = tagged(TOKEN_TYPE_SEQUENCE, t.meta);
            let entries: Vec<Value> = t.entries.iter().map(|e| serialize_token(e)).collect();
            map.insert("seq".to_string(), Value::Array(entries));
            Value::Object(map)
        }
        TemplateToken::Mapping(t) => {
            let mut map = tagged(TOKEN_TYPE_MAPPING, t.meta);
            let pairs: Vec<Value> = t
                .pairs
                .iter()
                .map(|(key, value)| {
                    json!({
                        "key": serialize_token(key),
                        "value": serialize_token(value),
                    })
                })
                .collect();
            map.insert("map".to_string(), Value::Array(pairs));
            Value::Object(map)
        }
        TemplateToken::BasicExpression(t) => {
            let mut map = tagged(TOKEN_TYPE_BASIC_EXPRESSION, t.meta);
            map.insert("expr".to_string(), Value::String(t.expression.to_string()));
            Value::Object(map)
        }
        TemplateToken::InsertExpression(t) => {
            Value::Object(tagged(TOKEN_TYPE_INSERT_EXPRESSION, t.meta))
        }
    }
}

impl Serialize for TemplateToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_token(self).serialize(serializer)
    }
}

fn invalid(message: impl Into<String>) -> FlowError {
    FlowError::system(EX0016, message)
}

fn read_meta(map: &Map<String, Value>) -> TokenMeta {
    let file_id = map.get("file").and_then(Value::as_u64).map(|v| v as u32);
    let line = map.get("line").and_then(Value::as_u64);
    let column = map.get("col").and_then(Value::as_u64);
    let location = match (line, column) {
        (Some(line), Some(column)) => Some(SourceLocation::new(line as u32, column as u32)),
        _ => None,
    };
    TokenMeta::new(file_id, location)
}

/// Deserialize a token from the persisted JSON layout
pub fn deserialize_token(value: &Value) -> Result<Rc<TemplateToken>> {
    match value {
        Value::Null => Ok(TemplateToken::null(TokenMeta::default())),
        Value::Bool(b) => Ok(TemplateToken::boolean(TokenMeta::default(), *b)),
        Value::Number(n) => Ok(TemplateToken::number(
            TokenMeta::default(),
            n.as_f64().unwrap_or(f64::NAN),
        )),
        Value::String(s) => Ok(TemplateToken::string(TokenMeta::default(), s.as_str())),
        Value::Object(map) => {
            let token_type = map
                .get("type")
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid("Persisted token is missing its 'type' tag"))?;
            let meta = read_meta(map);
            match token_type as u8 {
                TOKEN_TYPE_NULL => Ok(TemplateToken::null(meta)),
                TOKEN_TYPE_BOOLEAN => {
                    let value = map
                        .get("bool")
                        .and_then(Value::as_bool)
                        .ok_or_else(|| invalid("Boolean token is missing 'bool'"))?;
                    Ok(TemplateToken::boolean(meta, value))
                }
                TOKEN_TYPE_NUMBER => {
                    let value = match map.get("num") {
                        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
                        _ => f64::NAN,
                    };
                    Ok(TemplateToken::number(meta, value))
                }
                TOKEN_TYPE_STRING => {
                    let value = map
                        .get("lit")
                        .and_then(Value::as_str)
                        .ok_or_else(|| invalid("String token is missing 'lit'"))?;
                    Ok(TemplateToken::string(meta, value))
                }
                TOKEN_TYPE_SEQUENCE => {
                    let entries = map
                        .get("seq")
                        .and_then(Value::as_array)
                        .ok_or_else(|| invalid("Sequence token is missing 'seq'"))?;
                    let mut children = Vec::with_capacity(entries.len());
                    for entry in entries {
                        children.push(deserialize_token(entry)?);
                    }
                    Ok(TemplateToken::sequence(meta, children))
                }
                TOKEN_TYPE_MAPPING => {
                    let pairs = map
                        .get("map")
                        .and_then(Value::as_array)
                        .ok_or_else(|| invalid("Mapping token is missing 'map'"))?;
                    let mut children = Vec::with_capacity(pairs.len());
                    for pair in pairs {
                        let pair = pair
                            .as_object()
                            .ok_or_else(|| invalid("Mapping pair must be an object"))?;
                        let key = pair
                            .get("key")
                            .ok_or_else(|| invalid("Mapping pair is missing 'key'"))?;
                        let value = pair
                            .get("value")
                            .ok_or_else(|| invalid("Mapping pair is missing 'value'"))?;
                        children.push((deserialize_token(key)?, deserialize_token(value)?));
                    }
                    Ok(TemplateToken::mapping(meta, children))
                }
                TOKEN_TYPE_BASIC_EXPRESSION => {
                    let expression = map
                        .get("expr")
                        .and_then(Value::as_str)
                        .ok_or_else(|| invalid("Expression token is missing 'expr'"))?;
                    Ok(TemplateToken::basic_expression(meta, expression))
                }
                TOKEN_TYPE_INSERT_EXPRESSION => Ok(TemplateToken::insert_expression(meta)),
                other => Err(invalid(format!("Unknown token type tag {other}"))),
            }
        }
        Value::Array(_) => Err(invalid("A bare JSON array is not a valid persisted token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_with_position() -> TokenMeta {
        TokenMeta::new(Some(1), Some(SourceLocation::new(3, 5)))
    }

    #[test]
    fn test_bare_primitives_round_trip() {
        for raw in ["null", "true", "42", "\"text\""] {
            let value: Value = serde_json::from_str(raw).unwrap();
            let token = deserialize_token(&value).unwrap();
            assert_eq!(serialize_token(&token), value, "round trip of {raw}");
        }
    }

    #[test]
    fn test_type_tags() {
        let token = TemplateToken::sequence(
            TokenMeta::default(),
            vec![TemplateToken::basic_expression(
                TokenMeta::default(),
                "github.sha",
            )],
        );
        let value = serialize_token(&token);
        assert_eq!(value["type"], json!(1));
        assert_eq!(value["seq"][0]["type"], json!(3));
        assert_eq!(value["seq"][0]["expr"], json!("github.sha"));
    }

    #[test]
    fn test_mapping_layout() {
        let token = TemplateToken::mapping(
            TokenMeta::default(),
            vec![(
                TemplateToken::string(TokenMeta::default(), "a"),
                TemplateToken::number(TokenMeta::default(), 1.0),
            )],
        );
        let value = serialize_token(&token);
        assert_eq!(value["type"], json!(2));
        assert_eq!(value["map"][0]["key"], json!("a"));
        assert_eq!(value["map"][0]["value"], json!(1));
    }

    #[test]
    fn test_provenance_fields() {
        let token = TemplateToken::string(meta_with_position(), "x");
        let value = serialize_token(&token);
        assert_eq!(value["type"], json!(0));
        assert_eq!(value["file"], json!(1));
        assert_eq!(value["line"], json!(3));
        assert_eq!(value["col"], json!(5));
        assert_eq!(value["lit"], json!("x"));

        let round_tripped = deserialize_token(&value).unwrap();
        assert_eq!(round_tripped.meta(), meta_with_position());
    }

    #[test]
    fn test_insert_expression_layout() {
        let token = TemplateToken::insert_expression(TokenMeta::default());
        let value = serialize_token(&token);
        assert_eq!(value, json!({"type": 4}));
        let round_tripped = deserialize_token(&value).unwrap();
        assert!(matches!(
            &*round_tripped,
            TemplateToken::InsertExpression(_)
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = deserialize_token(&json!({"type": 99})).unwrap_err();
        assert_eq!(err.error_code(), EX0016);
    }

    #[test]
    fn test_nested_round_trip() {
        let raw = json!({
            "type": 2,
            "map": [
                {"key": "steps", "value": {"type": 1, "seq": ["build", {"type": 3, "expr": "parameters.extra"}]}},
                {"key": "enabled", "value": true}
            ]
        });
        let token = deserialize_token(&raw).unwrap();
        assert_eq!(serialize_token(&token), raw);
    }
}
