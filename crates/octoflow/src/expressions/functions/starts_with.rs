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

//! `startsWith(search, prefix)`: both operands coerced to strings, compared
//! upper-cased

use crate::core::error::Result;

use super::super::ast::FunctionNode;
use super::super::evaluator::{EvaluationContext, ResultMemory};
use super::super::value::FlowValue;

pub(crate) fn evaluate(
    context: &mut EvaluationContext,
    node: &FunctionNode,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let search = node.arguments[0].eval(context, level + 1)?;
    let prefix = node.arguments[1].eval(context, level + 1)?;
    let search = search.convert_to_display_string().to_uppercase();
    let prefix = prefix.convert_to_display_string().to_uppercase();
    Ok((
        FlowValue::Boolean(search.starts_with(&prefix)),
        ResultMemory::unknown(),
    ))
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
    fn test_starts_with() {
        assert_eq!(
            eval("startsWith('Hello world', 'HELLO')"),
            FlowValue::Boolean(true)
        );
        assert_eq!(
            eval("startsWith('Hello world', 'world')"),
            FlowValue::Boolean(false)
        );
        assert_eq!(eval("startsWith(123, '12')"), FlowValue::Boolean(true));
    }
}
