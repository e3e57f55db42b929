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

//! `format(fmt, ...args)`
//!
//! `{N}` references the Nth argument; `{{` and `}}` escape literal braces.
//! A colon inside a placeholder starts a format specifier; the specifier
//! grammar is parsed but no specifier is currently accepted, so any
//! non-empty specifier raises an error. Arguments are stringified lazily,
//! on first reference.

use crate::core::error::{FlowError, Result};
use crate::core::error_code::{EX0009, EX0010};
use crate::core::memory::{string_cost, MemoryCounter};

use super::super::ast::FunctionNode;
use super::super::evaluator::{EvaluationContext, ResultMemory};
use super::super::value::FlowValue;

pub(crate) fn evaluate(
    context: &mut EvaluationContext,
    node: &FunctionNode,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let format_value = node.arguments[0].eval(context, level + 1)?;
    let format = format_value.convert_to_display_string();

    let argument_count = node.arguments.len() - 1;
    let mut evaluated: Vec<Option<String>> = vec![None; argument_count];
    let result = apply_format(&format, argument_count, |position| {
        match &evaluated[position] {
            Some(rendered) => Ok(rendered.clone()),
            None => {
                let value = node.arguments[position + 1].eval(context, level + 1)?;
                let rendered = value.convert_to_display_string();
                evaluated[position] = Some(rendered.clone());
                Ok(rendered)
            }
        }
    })?;

    let memory = ResultMemory::total(string_cost(&result));
    Ok((FlowValue::string(result.as_str()), memory))
}

/// Apply the `format` grammar over already-stringified arguments
///
/// This is the same grammar the function uses, exposed for callers that
/// render display names outside an evaluation. The result is charged to
/// `counter` before it is returned.
pub fn format_strings(counter: &mut MemoryCounter, format: &str, args: &[&str]) -> Result<String> {
    let result = apply_format(format, args.len(), |position| Ok(args[position].to_string()))?;
    counter.add_string(&result)?;
    Ok(result)
}

/// Walk the format grammar, resolving `{N}` through `resolve`
fn apply_format<F>(format: &str, argument_count: usize, mut resolve: F) -> Result<String>
where
    F: FnMut(usize) -> Result<String>,
{
    let chars: Vec<char> = format.chars().collect();
    let mut output = String::new();
    let mut position = 0usize;

    while position < chars.len() {
        match chars[position] {
            '{' if chars.get(position + 1) == Some(&'{') => {
                output.push('{');
                position += 2;
            }
            '}' if chars.get(position + 1) == Some(&'}') => {
                output.push('}');
                position += 2;
            }
            '{' => {
                position += 1;
                let digits_start = position;
                while matches!(chars.get(position), Some(c) if c.is_ascii_digit()) {
                    position += 1;
                }
                if position == digits_start {
                    return Err(invalid_format(format));
                }
                let index: usize = chars[digits_start..position]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| invalid_format(format))?;

                let mut specifier = String::new();
                if chars.get(position) == Some(&':') {
                    position += 1;
                    while matches!(chars.get(position), Some(c) if *c != '}') {
                        specifier.push(chars[position]);
                        position += 1;
                    }
                }
                if chars.get(position) != Some(&'}') {
                    return Err(invalid_format(format));
                }
                position += 1;

                if !specifier.is_empty() {
                    return Err(FlowError::evaluation(
                        EX0010,
                        format!("The format specifiers '{specifier}' are not valid"),
                    ));
                }
                if index >= argument_count {
                    return Err(FlowError::evaluation(
                        EX0009,
                        format!(
                            "The following format string references more arguments than were supplied: {format}"
                        ),
                    ));
                }
                output.push_str(&resolve(index)?);
            }
            '}' => return Err(invalid_format(format)),
            c => {
                output.push(c);
                position += 1;
            }
        }
    }
    Ok(output)
}

fn invalid_format(format: &str) -> FlowError {
    FlowError::evaluation(
        EX0009,
        format!("The following format string is invalid: {format}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trace::NoopTraceWriter;
    use crate::expressions::evaluator::{EvaluationOptions, ExpressionContext};
    use crate::expressions::parser::parse;

    fn eval(expression: &str) -> Result<FlowValue> {
        let bindings = ExpressionContext::new();
        let tree = parse(expression, &[], &[])?;
        let mut trace = NoopTraceWriter;
        Ok(tree
            .evaluate(&mut trace, &bindings, EvaluationOptions::default())?
            .value)
    }

    #[test]
    fn test_placeholders_and_escapes() {
        assert_eq!(
            eval("format('a {0} {1}{{!}}', 1, 'b')").unwrap(),
            FlowValue::string("a 1 b{!}")
        );
    }

    #[test]
    fn test_arguments_may_repeat() {
        assert_eq!(
            eval("format('{0}{1}{0}', 'a', 'b')").unwrap(),
            FlowValue::string("aba")
        );
    }

    #[test]
    fn test_null_renders_empty() {
        assert_eq!(eval("format('[{0}]', null)").unwrap(), FlowValue::string("[]"));
    }

    #[test]
    fn test_reference_beyond_arguments() {
        let err = eval("format('{1}', 'only')").unwrap_err();
        assert_eq!(err.error_code(), EX0009);
    }

    #[test]
    fn test_unbalanced_braces() {
        assert_eq!(eval("format('}')").unwrap_err().error_code(), EX0009);
        assert_eq!(eval("format('{')").unwrap_err().error_code(), EX0009);
        assert_eq!(eval("format('{a}')").unwrap_err().error_code(), EX0009);
    }

    #[test]
    fn test_specifier_rejected() {
        let err = eval("format('{0:N2}', 1)").unwrap_err();
        assert_eq!(err.error_code(), EX0010);
        assert!(err.to_string().contains("N2"));
    }

    #[test]
    fn test_format_strings_helper() {
        let mut counter = MemoryCounter::default();
        let result = format_strings(&mut counter, "{0} and {1}", &["a", "b"]).unwrap();
        assert_eq!(result, "a and b");
        assert!(counter.current_bytes() > 0);
    }
}
