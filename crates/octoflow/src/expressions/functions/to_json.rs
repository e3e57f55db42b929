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

//! `toJson(value)`: serialize a canonical value as indented JSON
//!
//! The traversal is non-recursive (an ancestor frame stack) and every
//! appended segment is charged before the next one is produced, so a value
//! whose serialization would exceed the memory budget fails early instead
//! of materializing.

use std::rc::Rc;

use crate::core::error::{FlowError, Result};
use crate::core::error_code::EX0012;
use crate::core::memory::string_cost;

use super::super::ast::FunctionNode;
use super::super::evaluator::{EvaluationContext, ResultMemory};
use super::super::value::{
    number_to_string, ArrayCompat, Collection, FlowValue, ObjectCompat,
};

pub(crate) fn evaluate(
    context: &mut EvaluationContext,
    node: &FunctionNode,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let value = node.arguments[0].eval(context, level + 1)?;
    let json = write_json(&value, context.options.max_memory)?;
    let memory = ResultMemory::total(string_cost(&json));
    Ok((FlowValue::string(json.as_str()), memory))
}

struct Writer {
    output: String,
    charged: usize,
    max_bytes: usize,
}

impl Writer {
    fn append(&mut self, segment: &str) -> Result<()> {
        self.charged = self
            .charged
            .saturating_add(2 * segment.encode_utf16().count());
        if self.charged > self.max_bytes {
            return Err(FlowError::evaluation(
                EX0012,
                "Maximum allowed memory exceeded",
            ));
        }
        self.output.push_str(segment);
        Ok(())
    }
}

enum Frame {
    Array {
        array: Rc<dyn ArrayCompat>,
        index: usize,
    },
    Object {
        object: Rc<dyn ObjectCompat>,
        keys: Vec<Rc<str>>,
        index: usize,
    },
}

enum Action {
    Item {
        first: bool,
        key: Option<Rc<str>>,
        value: FlowValue,
    },
    Close {
        bracket: char,
    },
}

/// Serialize `value` with two-space indentation per depth
pub(crate) fn write_json(value: &FlowValue, max_bytes: usize) -> Result<String> {
    let mut writer = Writer {
        output: String::new(),
        charged: 0,
        max_bytes,
    };
    let mut stack: Vec<Frame> = Vec::new();

    if let Some(frame) = open_value(&mut writer, value)? {
        stack.push(frame);
    }

    loop {
        let depth = stack.len();
        let action = match stack.last_mut() {
            None => break,
            Some(Frame::Array { array, index }) => {
                if *index < array.len() {
                    let first = *index == 0;
                    let item = array.get(*index).unwrap_or(FlowValue::Null);
                    *index += 1;
                    Action::Item {
                        first,
                        key: None,
                        value: item,
                    }
                } else {
                    Action::Close { bracket: ']' }
                }
            }
            Some(Frame::Object {
                object,
                keys,
                index,
            }) => {
                if *index < keys.len() {
                    let first = *index == 0;
                    let key = keys[*index].clone();
                    let item = object.get(&key).unwrap_or(FlowValue::Null);
                    *index += 1;
                    Action::Item {
                        first,
                        key: Some(key),
                        value: item,
                    }
                } else {
                    Action::Close { bracket: '}' }
                }
            }
        };

        match action {
            Action::Item { first, key, value } => {
                if !first {
                    writer.append(",")?;
                }
                writer.append("\n")?;
                writer.append(&"  ".repeat(depth))?;
                if let Some(key) = key {
                    writer.append(&json_string(&key))?;
                    writer.append(": ")?;
                }
                if let Some(frame) = open_value(&mut writer, &value)? {
                    stack.push(frame);
                }
            }
            Action::Close { bracket } => {
                writer.append("\n")?;
                writer.append(&"  ".repeat(depth - 1))?;
                writer.append(&bracket.to_string())?;
                stack.pop();
            }
        }
    }

    Ok(writer.output)
}

/// Write a primitive, or open a composite and return its frame
fn open_value(writer: &mut Writer, value: &FlowValue) -> Result<Option<Frame>> {
    match value.collection() {
        None => {
            writer.append(&primitive_json(value))?;
            Ok(None)
        }
        Some(Collection::Array(array)) => {
            if array.is_empty() {
                writer.append("[]")?;
                Ok(None)
            } else {
                writer.append("[")?;
                Ok(Some(Frame::Array { array, index: 0 }))
            }
        }
        Some(Collection::Object(object)) => {
            let keys = object.keys();
            if keys.is_empty() {
                writer.append("{}")?;
                Ok(None)
            } else {
                writer.append("{")?;
                Ok(Some(Frame::Object {
                    object,
                    keys,
                    index: 0,
                }))
            }
        }
    }
}

fn primitive_json(value: &FlowValue) -> String {
    match value {
        FlowValue::Null => "null".to_string(),
        FlowValue::Boolean(b) => b.to_string(),
        FlowValue::Number(n) => number_to_string(*n),
        FlowValue::String(s) => json_string(s),
        // collections are handled by the caller
        FlowValue::Array(_) | FlowValue::Object(_) => "{}".to_string(),
    }
}

/// JSON-encode a string
fn json_string(value: &str) -> String {
    let mut output = String::with_capacity(value.len() + 2);
    output.push('"');
    for c in value.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
    output.push('"');
    output
}
