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

//! `contains(search, item)`
//!
//! On a primitive: case-insensitive substring search over the string forms.
//! On an array: abstract equality against any element. Anything else is
//! `false`.

use crate::core::error::Result;

use super::super::ast::FunctionNode;
use super::super::evaluator::{EvaluationContext, ResultMemory};
use super::super::value::{abstract_equal, Collection, FlowValue};

pub(crate) fn evaluate(
    context: &mut EvaluationContext,
    node: &FunctionNode,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let search = node.arguments[0].eval(context, level + 1)?;

    let found = if search.is_primitive() {
        let item = node.arguments[1].eval(context, level + 1)?;
        let haystack = search.convert_to_display_string().to_uppercase();
        let needle = item.convert_to_display_string().to_uppercase();
        haystack.contains(&needle)
    } else if let Some(Collection::Array(array)) = search.collection() {
        let item = node.arguments[1].eval(context, level + 1)?;
        (0..array.len())
            .filter_map(|position| array.get(position))
            .any(|element| abstract_equal(&element, &item))
    } else {
        false
    };

    Ok((FlowValue::Boolean(found), ResultMemory::unknown()))
}

#[cfg(test)]
mod tests {
    use crate::core::trace::NoopTraceWriter;
    use crate::expressions::evaluator::{EvaluationOptions, ExpressionContext};
    use crate::expressions::parser::parse;
    use crate::expressions::value::FlowValue;

    fn eval(expression: &str) -> FlowValue {
        let bindings = ExpressionContext::new();
        let tree = parse(expression, &[], &[]).unwrap();
        let mut trace = NoopTraceWriter;
        tree.evaluate(&mut trace, &bindings, EvaluationOptions::default())
            .unwrap()
            .value
    }

    #[test]
    fn test_substring_search_is_case_insensitive() {
        assert_eq!(
            eval("contains('Hello World', 'WORLD')"),
            FlowValue::Boolean(true)
        );
        assert_eq!(
            eval("contains('Hello World', 'mars')"),
            FlowValue::Boolean(false)
        );
    }

    #[test]
    fn test_primitives_coerce_to_strings() {
        assert_eq!(eval("contains(12345, 234)"), FlowValue::Boolean(true));
        assert_eq!(eval("contains('true', true)"), FlowValue::Boolean(true));
    }

    #[test]
    fn test_array_membership() {
        assert_eq!(
            eval("contains(fromJson('[1, 2, 3]'), '2')"),
            FlowValue::Boolean(true)
        );
        assert_eq!(
            eval("contains(fromJson('[1, 2, 3]'), 4)"),
            FlowValue::Boolean(false)
        );
    }

    #[test]
    fn test_object_is_false() {
        assert_eq!(
            eval("contains(fromJson('{\"a\":1}'), 'a')"),
            FlowValue::Boolean(false)
        );
    }
}
