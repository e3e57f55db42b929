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

//! `fromJson(text)`: parse JSON into canonical values
//!
//! The full size of the produced tree is reported as the result's memory,
//! flagged total so the evaluator can trim the depth ledger.

use crate::core::error::{FlowError, Result};
use crate::core::error_code::EX0011;

use super::super::ast::FunctionNode;
use super::super::evaluator::{EvaluationContext, ResultMemory};
use super::super::value::FlowValue;

pub(crate) fn evaluate(
    context: &mut EvaluationContext,
    node: &FunctionNode,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let input = node.arguments[0].eval(context, level + 1)?;
    let FlowValue::String(text) = &input else {
        return Err(FlowError::evaluation(
            EX0011,
            format!(
                "The value supplied to fromJson must be a string, found {}",
                input.kind_name()
            ),
        ));
    };

    let json: serde_json::Value = serde_json::from_str(text).map_err(|error| {
        FlowError::evaluation(EX0011, format!("Error parsing fromJson input. {error}"))
    })?;

    let result = FlowValue::from_json(&json);
    let bytes = result.byte_size(true);
    Ok((
        result,
        ResultMemory {
            bytes: Some(bytes),
            is_total: true,
        },
    ))
}
