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

//! Object-event source over a parsed JSON tree
//!
//! `serde_json` does not retain source positions, so events carry none.

use serde_json::Value;

use crate::core::error::{FlowError, Result};
use crate::core::error_code::EX0016;

use super::{EventMeta, ObjectReader, ScalarEvent, ScalarValue};

enum Frame<'a> {
    Array(std::slice::Iter<'a, Value>),
    Object {
        iter: serde_json::map::Iter<'a>,
        pending: Option<&'a Value>,
    },
}

#[derive(Clone, Copy)]
enum Event<'a> {
    Scalar(&'a Value),
    Key(&'a str),
    SequenceStart(&'a Vec<Value>),
    MappingStart(&'a serde_json::Map<String, Value>),
    SequenceEnd,
    MappingEnd,
    End,
}

/// Drives object events from a `serde_json::Value`
pub struct JsonObjectReader<'a> {
    started: bool,
    current: Event<'a>,
    stack: Vec<Frame<'a>>,
}

impl<'a> JsonObjectReader<'a> {
    /// Create a source over `root`
    pub fn new(root: &'a Value) -> Self {
        Self {
            started: false,
            current: classify(root),
            stack: Vec::new(),
        }
    }

    /// Advance to the next event produced by the innermost open scope
    fn step(&mut self) {
        self.current = match self.stack.last_mut() {
            None => Event::End,
            Some(Frame::Array(iter)) => match iter.next() {
                Some(value) => classify(value),
                None => Event::SequenceEnd,
            },
            Some(Frame::Object { iter, pending }) => {
                if let Some(value) = pending.take() {
                    classify(value)
                } else {
                    match iter.next() {
                        Some((key, value)) => {
                            *pending = Some(value);
                            Event::Key(key)
                        }
                        None => Event::MappingEnd,
                    }
                }
            }
        };
    }
}

fn classify(value: &Value) -> Event<'_> {
    match value {
        Value::Array(items) => Event::SequenceStart(items),
        Value::Object(map) => Event::MappingStart(map),
        _ => Event::Scalar(value),
    }
}

fn scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Null => ScalarValue::Null,
        Value::Bool(b) => ScalarValue::Boolean(*b),
        Value::Number(n) => ScalarValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => ScalarValue::String(s.clone()),
        _ => ScalarValue::Null,
    }
}

impl ObjectReader for JsonObjectReader<'_> {
    fn validate_start(&mut self) -> Result<()> {
        if self.started {
            return Err(FlowError::system(
                EX0016,
                "The object reader was already started",
            ));
        }
        self.started = true;
        Ok(())
    }

    fn allow_literal(&mut self) -> Result<Option<ScalarEvent>> {
        let value = match self.current {
            Event::Scalar(value) => scalar(value),
            Event::Key(key) => ScalarValue::String(key.to_string()),
            _ => return Ok(None),
        };
        self.step();
        Ok(Some(ScalarEvent {
            value,
            meta: EventMeta::default(),
        }))
    }

    fn allow_sequence_start(&mut self) -> Result<Option<EventMeta>> {
        if let Event::SequenceStart(items) = self.current {
            self.stack.push(Frame::Array(items.iter()));
            self.step();
            return Ok(Some(EventMeta::default()));
        }
        Ok(None)
    }

    fn allow_sequence_end(&mut self) -> bool {
        if matches!(self.current, Event::SequenceEnd) {
            self.stack.pop();
            self.step();
            return true;
        }
        false
    }

    fn allow_mapping_start(&mut self) -> Result<Option<EventMeta>> {
        if let Event::MappingStart(map) = self.current {
            self.stack.push(Frame::Object {
                iter: map.iter(),
                pending: None,
            });
            self.step();
            return Ok(Some(EventMeta::default()));
        }
        Ok(None)
    }

    fn allow_mapping_end(&mut self) -> bool {
        if matches!(self.current, Event::MappingEnd) {
            self.stack.pop();
            self.step();
            return true;
        }
        false
    }

    fn validate_end(&mut self) -> Result<()> {
        if !self.started || !matches!(self.current, Event::End) {
            return Err(FlowError::system(
                EX0016,
                "The object reader did not reach the end of the document",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_document() {
        let document: Value = serde_json::from_str("42").unwrap();
        let mut reader = JsonObjectReader::new(&document);
        reader.validate_start().unwrap();
        let event = reader.allow_literal().unwrap().unwrap();
        assert_eq!(event.value, ScalarValue::Number(42.0));
        reader.validate_end().unwrap();
    }

    #[test]
    fn test_nested_document_event_order() {
        let document: Value = serde_json::from_str(r#"{"a": [1, 2], "b": null}"#).unwrap();
        let mut reader = JsonObjectReader::new(&document);
        reader.validate_start().unwrap();

        assert!(reader.allow_mapping_start().unwrap().is_some());
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::String("a".to_string())
        );
        assert!(reader.allow_sequence_start().unwrap().is_some());
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::Number(1.0)
        );
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::Number(2.0)
        );
        // not yet at the end of the mapping
        assert!(!reader.allow_mapping_end());
        assert!(reader.allow_sequence_end());
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::String("b".to_string())
        );
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::Null
        );
        assert!(reader.allow_mapping_end());
        reader.validate_end().unwrap();
    }

    #[test]
    fn test_mismatched_shape_returns_none() {
        let document: Value = serde_json::from_str("[1]").unwrap();
        let mut reader = JsonObjectReader::new(&document);
        reader.validate_start().unwrap();
        assert!(reader.allow_literal().unwrap().is_none());
        assert!(reader.allow_mapping_start().unwrap().is_none());
        assert!(reader.allow_sequence_start().unwrap().is_some());
    }

    #[test]
    fn test_premature_end_rejected() {
        let document: Value = serde_json::from_str("[1]").unwrap();
        let mut reader = JsonObjectReader::new(&document);
        reader.validate_start().unwrap();
        reader.allow_sequence_start().unwrap();
        assert!(reader.validate_end().is_err());
    }
}
