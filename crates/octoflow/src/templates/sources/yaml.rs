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

//! Object-event source over a YAML document
//!
//! The document is tokenized with saphyr-parser's streaming events, never a
//! materialized tree. At the event level an alias is a single event, so the
//! collected stream stays linear in the document text; anchors and aliases
//! are rejected outright at parse time, which is what makes
//! "billion laughs"-style amplification impossible — resolving an alias is
//! precisely the step that multiplies a document beyond its own size.
//! Mapping keys are coerced to strings; literal events carry line/column.

use saphyr_parser::{Event, Parser, ScalarStyle, Span as YamlSpan, SpannedEventReceiver};

use crate::core::error::{FlowError, Result};
use crate::core::error_code::{EX0016, EX0017};

use super::{EventMeta, ObjectReader, ScalarEvent, ScalarValue};

/// One collected event with its source position
#[derive(Debug, Clone)]
enum YamlEvent {
    Scalar { value: ScalarValue, meta: EventMeta },
    SequenceStart { meta: EventMeta },
    SequenceEnd,
    MappingStart { meta: EventMeta },
    MappingEnd,
}

/// Where the next node lands within the enclosing scope
enum Scope {
    Sequence,
    MappingKey,
    MappingValue,
}

#[derive(Default)]
struct EventCollector {
    events: Vec<YamlEvent>,
    scopes: Vec<Scope>,
    rejected: Option<&'static str>,
}

impl EventCollector {
    /// Flip the enclosing mapping between key and value position; returns
    /// whether the node about to be emitted is a mapping key
    fn enter_node(&mut self) -> bool {
        match self.scopes.last_mut() {
            Some(scope @ Scope::MappingKey) => {
                *scope = Scope::MappingValue;
                true
            }
            Some(scope @ Scope::MappingValue) => {
                *scope = Scope::MappingKey;
                false
            }
            _ => false,
        }
    }

    fn reject(&mut self, feature: &'static str) {
        if self.rejected.is_none() {
            self.rejected = Some(feature);
        }
    }
}

impl SpannedEventReceiver<'_> for EventCollector {
    fn on_event(&mut self, event: Event<'_>, span: YamlSpan) {
        if self.rejected.is_some() {
            return;
        }
        let meta = EventMeta {
            line: Some(span.start.line() as u32),
            column: Some(span.start.col() as u32 + 1),
        };
        match event {
            Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart(_)
            | Event::DocumentEnd
            | Event::Nothing => {}
            Event::Alias(_) => self.reject("alias"),
            Event::Scalar(value, style, anchor, _tag) => {
                if anchor != 0 {
                    self.reject("anchor");
                    return;
                }
                let is_key = self.enter_node();
                let value = if is_key {
                    // keys are coerced to their string form
                    ScalarValue::String(value.into_owned())
                } else {
                    resolve_plain_scalar(&value, style)
                };
                self.events.push(YamlEvent::Scalar { value, meta });
            }
            Event::SequenceStart(anchor, _tag) => {
                if anchor != 0 {
                    self.reject("anchor");
                    return;
                }
                self.enter_node();
                self.scopes.push(Scope::Sequence);
                self.events.push(YamlEvent::SequenceStart { meta });
            }
            Event::SequenceEnd => {
                self.scopes.pop();
                self.events.push(YamlEvent::SequenceEnd);
            }
            Event::MappingStart(anchor, _tag) => {
                if anchor != 0 {
                    self.reject("anchor");
                    return;
                }
                self.enter_node();
                self.scopes.push(Scope::MappingKey);
                self.events.push(YamlEvent::MappingStart { meta });
            }
            Event::MappingEnd => {
                self.scopes.pop();
                self.events.push(YamlEvent::MappingEnd);
            }
        }
    }
}

/// YAML core-schema resolution for plain scalars; quoted and block scalars
/// are always strings
fn resolve_plain_scalar(value: &str, style: ScalarStyle) -> ScalarValue {
    if !matches!(style, ScalarStyle::Plain) {
        return ScalarValue::String(value.to_string());
    }
    match value {
        "" | "~" | "null" | "Null" | "NULL" => return ScalarValue::Null,
        "true" | "True" | "TRUE" => return ScalarValue::Boolean(true),
        "false" | "False" | "FALSE" => return ScalarValue::Boolean(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return ScalarValue::Number(f64::INFINITY)
        }
        "-.inf" | "-.Inf" | "-.INF" => return ScalarValue::Number(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return ScalarValue::Number(f64::NAN),
        _ => {}
    }
    let numeric_shape = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        && value.chars().any(|c| c.is_ascii_digit());
    if numeric_shape {
        if let Ok(number) = value.parse::<f64>() {
            return ScalarValue::Number(number);
        }
    }
    ScalarValue::String(value.to_string())
}

/// Drives object events from YAML text
#[derive(Debug)]
pub struct YamlObjectReader {
    events: Vec<YamlEvent>,
    position: usize,
    started: bool,
}

impl YamlObjectReader {
    /// Parse `document` into an event stream
    ///
    /// Fails when the text is not valid YAML or when it declares an anchor
    /// or alias (both are disabled).
    pub fn from_str(document: &str) -> Result<Self> {
        let mut collector = EventCollector::default();
        Parser::new_from_str(document)
            .load(&mut collector, false)
            .map_err(|error| {
                FlowError::system(EX0017, format!("The document is not valid YAML: {error}"))
            })?;
        if let Some(feature) = collector.rejected {
            return Err(FlowError::system(
                EX0017,
                format!("The document declares a YAML {feature}; anchors and aliases are disabled"),
            ));
        }
        let mut events = collector.events;
        if events.is_empty() {
            // an empty document reads as a single null
            events.push(YamlEvent::Scalar {
                value: ScalarValue::Null,
                meta: EventMeta::default(),
            });
        }
        Ok(Self {
            events,
            position: 0,
            started: false,
        })
    }

    fn current(&self) -> Option<&YamlEvent> {
        self.events.get(self.position)
    }
}

impl ObjectReader for YamlObjectReader {
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
        let Some(YamlEvent::Scalar { value, meta }) = self.current() else {
            return Ok(None);
        };
        let event = ScalarEvent {
            value: value.clone(),
            meta: *meta,
        };
        self.position += 1;
        Ok(Some(event))
    }

    fn allow_sequence_start(&mut self) -> Result<Option<EventMeta>> {
        let Some(YamlEvent::SequenceStart { meta }) = self.current() else {
            return Ok(None);
        };
        let meta = *meta;
        self.position += 1;
        Ok(Some(meta))
    }

    fn allow_sequence_end(&mut self) -> bool {
        if matches!(self.current(), Some(YamlEvent::SequenceEnd)) {
            self.position += 1;
            return true;
        }
        false
    }

    fn allow_mapping_start(&mut self) -> Result<Option<EventMeta>> {
        let Some(YamlEvent::MappingStart { meta }) = self.current() else {
            return Ok(None);
        };
        let meta = *meta;
        self.position += 1;
        Ok(Some(meta))
    }

    fn allow_mapping_end(&mut self) -> bool {
        if matches!(self.current(), Some(YamlEvent::MappingEnd)) {
            self.position += 1;
            return true;
        }
        false
    }

    fn validate_end(&mut self) -> Result<()> {
        if !self.started || self.position != self.events.len() {
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
    fn test_yaml_event_order() {
        let mut reader = YamlObjectReader::from_str("steps:\n  - build\n  - test\n").unwrap();
        reader.validate_start().unwrap();
        assert!(reader.allow_mapping_start().unwrap().is_some());
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::String("steps".to_string())
        );
        assert!(reader.allow_sequence_start().unwrap().is_some());
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::String("build".to_string())
        );
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::String("test".to_string())
        );
        assert!(reader.allow_sequence_end());
        assert!(reader.allow_mapping_end());
        reader.validate_end().unwrap();
    }

    #[test]
    fn test_yaml_scalar_types() {
        let mut reader = YamlObjectReader::from_str("a: 1\nb: true\nc: null\nd: '5'\n").unwrap();
        reader.validate_start().unwrap();
        reader.allow_mapping_start().unwrap();
        let mut values = Vec::new();
        while let Some(event) = reader.allow_literal().unwrap() {
            values.push(event.value);
        }
        assert_eq!(
            values,
            vec![
                ScalarValue::String("a".to_string()),
                ScalarValue::Number(1.0),
                ScalarValue::String("b".to_string()),
                ScalarValue::Boolean(true),
                ScalarValue::String("c".to_string()),
                ScalarValue::Null,
                ScalarValue::String("d".to_string()),
                ScalarValue::String("5".to_string()),
            ]
        );
        assert!(reader.allow_mapping_end());
    }

    #[test]
    fn test_non_string_keys_coerce() {
        let mut reader = YamlObjectReader::from_str("1: a\ntrue: b\n").unwrap();
        reader.validate_start().unwrap();
        reader.allow_mapping_start().unwrap();
        assert_eq!(
            reader.allow_literal().unwrap().unwrap().value,
            ScalarValue::String("1".to_string())
        );
    }

    #[test]
    fn test_literal_positions() {
        let mut reader = YamlObjectReader::from_str("a: 1\nb: 2\n").unwrap();
        reader.validate_start().unwrap();
        reader.allow_mapping_start().unwrap();
        let key = reader.allow_literal().unwrap().unwrap();
        assert_eq!(key.meta.line, Some(1));
        assert_eq!(key.meta.column, Some(1));
        let value = reader.allow_literal().unwrap().unwrap();
        assert_eq!(value.meta.line, Some(1));
        assert_eq!(value.meta.column, Some(4));
        let key = reader.allow_literal().unwrap().unwrap();
        assert_eq!(key.meta.line, Some(2));
    }

    #[test]
    fn test_alias_rejected() {
        let err = YamlObjectReader::from_str("base: &b [1, 2]\ncopy: *b\n").unwrap_err();
        assert_eq!(err.error_code(), EX0017);
        assert!(err.to_string().contains("disabled"), "{err}");
    }

    #[test]
    fn test_anchor_rejected_even_without_alias() {
        let err = YamlObjectReader::from_str("base: &b 1\n").unwrap_err();
        assert_eq!(err.error_code(), EX0017);
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let err = YamlObjectReader::from_str("a: [1, 2\n").unwrap_err();
        assert_eq!(err.error_code(), EX0017);
    }

    #[test]
    fn test_empty_document_is_null() {
        let mut reader = YamlObjectReader::from_str("").unwrap();
        reader.validate_start().unwrap();
        let event = reader.allow_literal().unwrap().unwrap();
        assert_eq!(event.value, ScalarValue::Null);
        reader.validate_end().unwrap();
    }

    #[test]
    fn test_quoted_ambiguous_scalars_stay_strings() {
        let mut reader =
            YamlObjectReader::from_str("a: 'true'\nb: \"null\"\nc: nan\n").unwrap();
        reader.validate_start().unwrap();
        reader.allow_mapping_start().unwrap();
        let mut values = Vec::new();
        while let Some(event) = reader.allow_literal().unwrap() {
            values.push(event.value);
        }
        // quoted forms never resolve; a bare `nan` is not a core-schema
        // number either
        assert_eq!(values[1], ScalarValue::String("true".to_string()));
        assert_eq!(values[3], ScalarValue::String("null".to_string()));
        assert_eq!(values[5], ScalarValue::String("nan".to_string()));
    }
}
