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

//! `join(items, separator)`
//!
//! An array joins the string forms of its items; a primitive returns its
//! own string form; an object joins to the empty string. The separator
//! defaults to `,` and falls back to `,` when a non-primitive is supplied.

use crate::core::error::Result;
use crate::core::memory::string_cost;

use super::super::ast::FunctionNode;
use super::super::evaluator::{EvaluationContext, ResultMemory};
use super::super::value::{Collection, FlowValue};

pub(crate) fn evaluate(
    context: &mut EvaluationContext,
    node: &FunctionNode,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let items = node.arguments[0].eval(context, level + 1)?;

    let separator = if node.arguments.len() > 1 {
        let value = node.arguments[1].eval(context, level + 1)?;
        if value.is_primitive() {
            value.convert_to_display_string()
        } else {
            ",".to_string()
        }
    } else {
        ",".to_string()
    };

    let result = match items.collection() {
        Some(Collection::Array(array)) => {
            let mut output = String::new();
            for position in 0..array.len() {
                if position > 0 {
                    output.push_str(&separator);
                }
                if let Some(item) = array.get(position) {
                    output.push_str(&item.convert_to_display_string());
                }
            }
            output
        }
        Some(Collection::Object(_)) => String::new(),
        None => items.convert_to_display_string(),
    };

    let memory = ResultMemory::total(string_cost(&result));
    Ok((FlowValue::string(result.as_str()), memory))
}
