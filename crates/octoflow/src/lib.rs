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

//! Expression language and schema-validated templating for workflow files
//!
//! octoflow parses and evaluates workflow templates: YAML/JSON documents
//! whose values may embed `${{ … }}` expressions. Three subsystems make up
//! the core:
//!
//! - an expression language (lexer, shunting-yard parser, evaluator with
//!   JavaScript-like abstract comparison semantics, and a catalog of
//!   built-in functions),
//! - a schema-validating template reader consuming an abstract object-event
//!   stream, and
//! - a just-in-time unraveler that lazily expands expressions and
//!   `${{ insert }}` directives as the caller walks the tree.
//!
//! A single memory and depth accounting layer bounds the worst-case cost of
//! every operation, so hostile templates cannot amplify their own size.

pub mod cli;
pub mod core;
pub mod expressions;
pub mod templates;

pub use crate::core::{
    BufferedTraceWriter, ErrorCode, FlowError, MemoryCounter, NoopTraceWriter, Result,
    SourceLocation, TraceWriter, TracingTraceWriter,
};
pub use expressions::{
    parse, validate_syntax, EvaluationOptions, EvaluationResult, ExpressionContext,
    ExpressionNode, FlowValue, FunctionInfo, NamedContextInfo,
};
pub use templates::{
    evaluate_template, internal_schema, read_template, JsonObjectReader, ObjectReader,
    TemplateContext, TemplateSchema, TemplateToken, TemplateUnraveler, YamlObjectReader,
};

/// Parse and evaluate one expression against named values
///
/// The convenience path for hosts that only need expression evaluation:
/// builds the parse context from the bindings, evaluates with default
/// options, and discards the trace.
pub fn evaluate_expression(
    expression: &str,
    bindings: &ExpressionContext,
) -> Result<FlowValue> {
    let named_contexts = bindings.named_context_infos();
    let functions = bindings.function_infos();
    let tree = parse(expression, &named_contexts, &functions)?;
    let mut trace = NoopTraceWriter;
    let result = tree.evaluate(&mut trace, bindings, EvaluationOptions::default())?;
    Ok(result.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_expression_convenience() {
        let mut bindings = ExpressionContext::new();
        bindings.add_named_value("env", FlowValue::from_json(&serde_json::json!({"ci": true})));
        let value = evaluate_expression("env.ci && 'yes' || 'no'", &bindings).unwrap();
        assert_eq!(value, FlowValue::string("yes"));
    }
}
