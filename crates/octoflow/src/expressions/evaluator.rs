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

//! Expression evaluation
//!
//! Evaluation is a recursive walk over the parsed tree. Each node reports
//! its result plus a memory hint; the hint is charged into a per-depth
//! ledger so that when a node's total size becomes knowable the columns of
//! its completed children are retroactively freed. The tracked total is
//! bounded by the live path's memory rather than everything traversed,
//! which is what keeps amplifying functions like `format` and `join` from
//! being billed once per parameter and once again at the result.

use rustc_hash::FxHashMap;
use std::any::Any;
use std::rc::Rc;

use crate::core::error::{FlowError, Result};
use crate::core::error_code::{EX0005, EX0012};
use crate::core::memory::{string_cost, DEFAULT_MAX_BYTES, MIN_OBJECT_SIZE};
use crate::core::trace::TraceWriter;

use super::ast::{
    CompareNode, CompareOperator, ExpressionNode, FunctionKind, FunctionNode, IndexNode,
    LiteralValue,
};
use super::functions;
use super::parser::{FunctionInfo, NamedContextInfo};
use super::value::{
    abstract_equal, abstract_greater_than, abstract_less_than, ArrayCompat, Collection,
    FilteredArray, FlowValue,
};

/// Budget for cached realized-trace strings
const TRACE_MAX_MEMORY: usize = 1024 * 1024;

/// Evaluation options
#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    /// Byte budget for the evaluation
    pub max_memory: usize,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            max_memory: DEFAULT_MAX_BYTES,
        }
    }
}

/// Host-registered extension function
pub type ExtensionFunction = Rc<dyn Fn(&ExpressionContext, &[FlowValue]) -> Result<FlowValue>>;

/// Host-supplied bindings available to an evaluation
#[derive(Default)]
pub struct ExpressionContext {
    named_values: Vec<(Rc<str>, FlowValue)>,
    functions: Vec<(FunctionInfo, ExtensionFunction)>,
    /// Opaque host state surfaced to extension functions
    pub state: Option<Rc<dyn Any>>,
}

impl ExpressionContext {
    /// Create empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`; later bindings win on name collision
    pub fn add_named_value(&mut self, name: impl Into<Rc<str>>, value: FlowValue) {
        self.named_values.push((name.into(), value));
    }

    /// Resolve a named value (case-insensitive)
    pub fn get_named_value(&self, name: &str) -> Option<&FlowValue> {
        self.named_values
            .iter()
            .rev()
            .find(|(bound, _)| bound.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Register an extension function
    pub fn add_function(&mut self, info: FunctionInfo, implementation: ExtensionFunction) {
        self.functions.push((info, implementation));
    }

    /// Resolve an extension function (case-insensitive)
    pub fn get_function(&self, name: &str) -> Option<&ExtensionFunction> {
        self.functions
            .iter()
            .rev()
            .find(|(info, _)| info.name.eq_ignore_ascii_case(name))
            .map(|(_, implementation)| implementation)
    }

    /// Parser infos for the bound named contexts
    pub fn named_context_infos(&self) -> Vec<NamedContextInfo> {
        self.named_values
            .iter()
            .map(|(name, _)| NamedContextInfo::new(name.clone()))
            .collect()
    }

    /// Parser infos for the registered extension functions
    pub fn function_infos(&self) -> Vec<FunctionInfo> {
        self.functions.iter().map(|(info, _)| info.clone()).collect()
    }
}

impl std::fmt::Debug for ExpressionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionContext")
            .field("named_values", &self.named_values)
            .field("functions", &self.functions.len())
            .finish()
    }
}

/// Result of a top-level evaluation
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// The canonical result value
    pub value: FlowValue,
}

impl EvaluationResult {
    /// Truthiness of the result
    pub fn is_truthy(&self) -> bool {
        self.value.is_truthy()
    }
}

/// Memory hint reported by a node's evaluation core
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMemory {
    /// Byte cost of the result; `None` means charge the default for its kind
    pub bytes: Option<usize>,
    /// Whether `bytes` covers the node's whole subtree, allowing the
    /// deeper depth columns to be trimmed
    pub is_total: bool,
}

impl ResultMemory {
    /// No hint: the caller charges the shallow default
    pub fn unknown() -> Self {
        Self::default()
    }

    /// A total accounting of the subtree
    pub fn total(bytes: usize) -> Self {
        Self {
            bytes: Some(bytes),
            is_total: true,
        }
    }
}

/// Per-evaluation byte ledger indexed by node depth
#[derive(Debug)]
pub(crate) struct EvaluationMemory {
    max_bytes: usize,
    total: usize,
    depths: Vec<usize>,
}

impl EvaluationMemory {
    fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            total: 0,
            depths: Vec::new(),
        }
    }

    /// Charge `bytes` at `depth`; `trim_depth` first frees every deeper
    /// column (the completed children whose size `bytes` now covers)
    pub(crate) fn add(&mut self, depth: usize, bytes: usize, trim_depth: bool) -> Result<()> {
        if trim_depth {
            for column in self.depths.iter_mut().skip(depth + 1) {
                self.total = self.total.saturating_sub(*column);
                *column = 0;
            }
        }
        if self.depths.len() <= depth {
            self.depths.resize(depth + 1, 0);
        }
        self.depths[depth] += bytes;
        self.total = self.total.saturating_add(bytes);
        if self.total > self.max_bytes {
            return Err(FlowError::evaluation(
                EX0012,
                "Maximum allowed memory exceeded",
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    fn total(&self) -> usize {
        self.total
    }
}

/// State threaded through one evaluation
pub struct EvaluationContext<'a> {
    pub(crate) trace: &'a mut dyn TraceWriter,
    pub(crate) bindings: &'a ExpressionContext,
    pub(crate) options: EvaluationOptions,
    pub(crate) memory: EvaluationMemory,
    trace_results: FxHashMap<usize, String>,
    trace_memory: usize,
}

impl<'a> EvaluationContext<'a> {
    fn new(
        trace: &'a mut dyn TraceWriter,
        bindings: &'a ExpressionContext,
        options: EvaluationOptions,
    ) -> Self {
        Self {
            trace,
            bindings,
            options,
            memory: EvaluationMemory::new(options.max_memory),
            trace_results: FxHashMap::default(),
            trace_memory: 0,
        }
    }

    fn trace_verbose(&mut self, level: usize, message: &str) {
        let mut line = ".".repeat(level * 2);
        line.push_str(message);
        self.trace.verbose(&line);
    }

    fn cache_trace_result(&mut self, node: &ExpressionNode, value: &FlowValue) {
        let rendered = realized_value(value);
        let cost = string_cost(&rendered);
        if self.trace_memory + cost <= TRACE_MAX_MEMORY {
            self.trace_memory += cost;
            self.trace_results.insert(node_key(node), rendered);
        }
    }
}

fn node_key(node: &ExpressionNode) -> usize {
    node as *const ExpressionNode as usize
}

/// Literal rendering of a value for traces and realized expressions
fn realized_value(value: &FlowValue) -> String {
    match value {
        FlowValue::Null => "null".to_string(),
        FlowValue::Boolean(b) => b.to_string(),
        FlowValue::Number(n) => super::value::number_to_string(*n),
        FlowValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        FlowValue::Array(_) => "Array".to_string(),
        FlowValue::Object(_) => "Object".to_string(),
    }
}

impl ExpressionNode {
    /// Evaluate the tree against the supplied bindings
    pub fn evaluate(
        &self,
        trace: &mut dyn TraceWriter,
        bindings: &ExpressionContext,
        options: EvaluationOptions,
    ) -> Result<EvaluationResult> {
        let mut context = EvaluationContext::new(trace, bindings, options);
        context.trace.info(&format!("Evaluating: {self}"));
        let value = self.eval(&mut context, 0)?;
        let realized = self.realized_expression(&context);
        if realized != self.to_string() {
            context.trace.info(&format!("Expanded: {realized}"));
        }
        context.trace.info(&format!("Result: {}", realized_value(&value)));
        Ok(EvaluationResult { value })
    }

    /// Evaluate one node at `level`
    pub(crate) fn eval(&self, context: &mut EvaluationContext, level: usize) -> Result<FlowValue> {
        context.trace_verbose(level, &format!("Evaluating {}:", self.trace_name()));
        let (value, memory) = self.evaluate_core(context, level)?;
        let bytes = memory.bytes.unwrap_or_else(|| value.byte_size(false));
        context.memory.add(level, bytes, memory.is_total)?;
        context.trace_verbose(level, &format!("=> {}", realized_value(&value)));
        if self.trace_fully_realized() {
            context.cache_trace_result(self, &value);
        }
        Ok(value)
    }

    /// Whether the node's realized result is cached for upstream traces
    fn trace_fully_realized(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    fn evaluate_core(
        &self,
        context: &mut EvaluationContext,
        level: usize,
    ) -> Result<(FlowValue, ResultMemory)> {
        match self {
            Self::Literal(node) => Ok((literal_to_value(&node.value), ResultMemory::unknown())),
            Self::Wildcard(_) => Ok((FlowValue::Null, ResultMemory::unknown())),
            Self::NoOp(_) => Ok((FlowValue::Null, ResultMemory::unknown())),
            Self::NamedContext(node) => {
                let value = context
                    .bindings
                    .get_named_value(&node.name)
                    .cloned()
                    .unwrap_or(FlowValue::Null);
                Ok((value, ResultMemory::unknown()))
            }
            Self::Index(node) => eval_index(node, context, level),
            Self::Not(node) => {
                let operand = node.operand.eval(context, level + 1)?;
                Ok((
                    FlowValue::Boolean(operand.is_falsy()),
                    ResultMemory::unknown(),
                ))
            }
            Self::And(node) => {
                let mut last = FlowValue::Boolean(true);
                for operand in &node.operands {
                    last = operand.eval(context, level + 1)?;
                    if last.is_falsy() {
                        break;
                    }
                }
                Ok((last, ResultMemory::unknown()))
            }
            Self::Or(node) => {
                let mut last = FlowValue::Boolean(false);
                for operand in &node.operands {
                    last = operand.eval(context, level + 1)?;
                    if last.is_truthy() {
                        break;
                    }
                }
                Ok((last, ResultMemory::unknown()))
            }
            Self::Compare(node) => eval_compare(node, context, level),
            Self::Function(node) => eval_function(node, context, level),
        }
    }

    /// Render the expression with evaluated function results spliced in
    fn realized_expression(&self, context: &EvaluationContext) -> String {
        if let Some(cached) = context.trace_results.get(&node_key(self)) {
            return cached.clone();
        }
        match self {
            Self::Index(node) => {
                let object = node.object.realized_expression(context);
                if node.via_dereference {
                    match &*node.index {
                        Self::Literal(literal) => {
                            if let LiteralValue::String(name) = &literal.value {
                                return format!("{object}.{name}");
                            }
                            format!("{object}[{}]", node.index.realized_expression(context))
                        }
                        Self::Wildcard(_) => format!("{object}.*"),
                        other => format!("{object}[{}]", other.realized_expression(context)),
                    }
                } else {
                    format!("{object}[{}]", node.index.realized_expression(context))
                }
            }
            Self::Not(node) => format!("!{}", node.operand.realized_expression(context)),
            Self::And(node) | Self::Or(node) => {
                let symbol = if matches!(self, Self::And(_)) { "&&" } else { "||" };
                let parts: Vec<String> = node
                    .operands
                    .iter()
                    .map(|operand| operand.realized_expression(context))
                    .collect();
                format!("({})", parts.join(&format!(" {symbol} ")))
            }
            Self::Compare(node) => format!(
                "{} {} {}",
                node.left.realized_expression(context),
                node.operator.symbol(),
                node.right.realized_expression(context)
            ),
            Self::Function(node) => {
                let arguments: Vec<String> = node
                    .arguments
                    .iter()
                    .map(|argument| argument.realized_expression(context))
                    .collect();
                format!("{}({})", node.name, arguments.join(", "))
            }
            other => other.to_string(),
        }
    }
}

fn literal_to_value(value: &LiteralValue) -> FlowValue {
    match value {
        LiteralValue::Null => FlowValue::Null,
        LiteralValue::Boolean(b) => FlowValue::Boolean(*b),
        LiteralValue::Number(n) => FlowValue::Number(*n),
        LiteralValue::String(s) => FlowValue::String(s.clone()),
    }
}

/// Convert a number index into an array position
fn index_to_position(index: &FlowValue, len: usize) -> Option<usize> {
    const MAX_INDEX: f64 = 2_147_483_648.0; // 2^31
    if let FlowValue::Number(n) = index {
        if n.is_nan() {
            return None;
        }
        let floored = n.floor();
        if floored < 0.0 || floored >= MAX_INDEX {
            return None;
        }
        let position = floored as usize;
        if position < len {
            return Some(position);
        }
    }
    None
}

fn filtered_memory(filtered: &FilteredArray) -> ResultMemory {
    ResultMemory {
        bytes: Some(MIN_OBJECT_SIZE + 8 * filtered.len()),
        is_total: false,
    }
}

fn eval_index(
    node: &IndexNode,
    context: &mut EvaluationContext,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let object = node.object.eval(context, level + 1)?;

    if matches!(&*node.index, ExpressionNode::Wildcard(_)) {
        let mut filtered = FilteredArray::new();
        match object.collection() {
            Some(Collection::Array(array)) if array.is_filtered() => {
                // wildcard over a filtered array flattens one more level
                for position in 0..array.len() {
                    let Some(item) = array.get(position) else { continue };
                    match item.collection() {
                        Some(Collection::Array(inner)) => {
                            for inner_position in 0..inner.len() {
                                if let Some(value) = inner.get(inner_position) {
                                    filtered.push(value);
                                }
                            }
                        }
                        Some(Collection::Object(inner)) => {
                            for key in inner.keys() {
                                if let Some(value) = inner.get(&key) {
                                    filtered.push(value);
                                }
                            }
                        }
                        None => {}
                    }
                }
            }
            Some(Collection::Array(array)) => {
                for position in 0..array.len() {
                    if let Some(value) = array.get(position) {
                        filtered.push(value);
                    }
                }
            }
            Some(Collection::Object(object)) => {
                for key in object.keys() {
                    if let Some(value) = object.get(&key) {
                        filtered.push(value);
                    }
                }
            }
            // wildcard on a non-collection degrades to an empty filtered
            // array so chains keep working
            None => {}
        }
        let memory = filtered_memory(&filtered);
        return Ok((FlowValue::Array(Rc::new(filtered)), memory));
    }

    let index = node.index.eval(context, level + 1)?;
    let result = match object.collection() {
        Some(Collection::Array(array)) if array.is_filtered() => {
            // a plain index over a filtered array maps across the items
            let mut filtered = FilteredArray::new();
            for position in 0..array.len() {
                let Some(item) = array.get(position) else { continue };
                match item.collection() {
                    Some(Collection::Object(inner)) => {
                        if let FlowValue::String(key) = &index {
                            if let Some(value) = inner.get(key) {
                                filtered.push(value);
                            }
                        }
                    }
                    Some(Collection::Array(inner)) => {
                        if let Some(inner_position) = index_to_position(&index, inner.len()) {
                            if let Some(value) = inner.get(inner_position) {
                                filtered.push(value);
                            }
                        }
                    }
                    None => {}
                }
            }
            let memory = filtered_memory(&filtered);
            return Ok((FlowValue::Array(Rc::new(filtered)), memory));
        }
        Some(Collection::Object(target)) => match &index {
            FlowValue::String(key) => target.get(key).unwrap_or(FlowValue::Null),
            _ => FlowValue::Null,
        },
        Some(Collection::Array(target)) => match index_to_position(&index, target.len()) {
            Some(position) => target.get(position).unwrap_or(FlowValue::Null),
            None => FlowValue::Null,
        },
        None => FlowValue::Null,
    };
    Ok((result, ResultMemory::unknown()))
}

fn eval_compare(
    node: &CompareNode,
    context: &mut EvaluationContext,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    let left = node.left.eval(context, level + 1)?;
    let right = node.right.eval(context, level + 1)?;
    let result = match node.operator {
        CompareOperator::Equal => abstract_equal(&left, &right),
        CompareOperator::NotEqual => !abstract_equal(&left, &right),
        CompareOperator::LessThan => abstract_less_than(&left, &right),
        CompareOperator::LessThanOrEqual => {
            abstract_less_than(&left, &right) || abstract_equal(&left, &right)
        }
        CompareOperator::GreaterThan => abstract_greater_than(&left, &right),
        CompareOperator::GreaterThanOrEqual => {
            abstract_greater_than(&left, &right) || abstract_equal(&left, &right)
        }
    };
    Ok((FlowValue::Boolean(result), ResultMemory::unknown()))
}

fn eval_function(
    node: &FunctionNode,
    context: &mut EvaluationContext,
    level: usize,
) -> Result<(FlowValue, ResultMemory)> {
    match node.kind {
        FunctionKind::Contains => functions::contains::evaluate(context, node, level),
        FunctionKind::EndsWith => functions::ends_with::evaluate(context, node, level),
        FunctionKind::Format => functions::format::evaluate(context, node, level),
        FunctionKind::FromJson => functions::from_json::evaluate(context, node, level),
        FunctionKind::Join => functions::join::evaluate(context, node, level),
        FunctionKind::StartsWith => functions::starts_with::evaluate(context, node, level),
        FunctionKind::ToJson => functions::to_json::evaluate(context, node, level),
        FunctionKind::Extension => {
            let mut arguments = Vec::with_capacity(node.arguments.len());
            for argument in &node.arguments {
                arguments.push(argument.eval(context, level + 1)?);
            }
            let implementation = context.bindings.get_function(&node.name).cloned().ok_or_else(|| {
                FlowError::evaluation(
                    EX0005,
                    format!("Unrecognized function: '{}'", node.name),
                )
            })?;
            let value = implementation.as_ref()(context.bindings, &arguments)?;
            Ok((value, ResultMemory::unknown()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trace::{BufferedTraceWriter, NoopTraceWriter};
    use crate::expressions::parser::parse;
    use crate::expressions::value::{ArrayValue, ObjectValue};

    fn eval_str(expression: &str, bindings: &ExpressionContext) -> FlowValue {
        let named = bindings.named_context_infos();
        let functions = bindings.function_infos();
        let tree = parse(expression, &named, &functions).unwrap();
        let mut trace = NoopTraceWriter;
        tree.evaluate(&mut trace, bindings, EvaluationOptions::default())
            .unwrap()
            .value
    }

    fn sample_bindings() -> ExpressionContext {
        let mut commits = ArrayValue::new();
        let mut first = ObjectValue::new();
        first.push("message", FlowValue::string("fix parser"));
        first.push("id", FlowValue::Number(1.0));
        let mut second = ObjectValue::new();
        second.push("message", FlowValue::string("add tests"));
        second.push("id", FlowValue::Number(2.0));
        commits.push(FlowValue::Object(Rc::new(first)));
        commits.push(FlowValue::Object(Rc::new(second)));

        let mut event = ObjectValue::new();
        event.push("commits", FlowValue::Array(Rc::new(commits)));
        event.push("name", FlowValue::string("push"));

        let mut github = ObjectValue::new();
        github.push("event", FlowValue::Object(Rc::new(event)));

        let mut bindings = ExpressionContext::new();
        bindings.add_named_value("github", FlowValue::Object(Rc::new(github)));
        bindings
    }

    #[test]
    fn test_dereference_and_index() {
        let bindings = sample_bindings();
        assert_eq!(
            eval_str("github.event.name", &bindings),
            FlowValue::string("push")
        );
        assert_eq!(
            eval_str("github['event']['name']", &bindings),
            FlowValue::string("push")
        );
        assert_eq!(
            eval_str("github.event.commits[1].message", &bindings),
            FlowValue::string("add tests")
        );
    }

    #[test]
    fn test_case_insensitive_property_lookup() {
        let bindings = sample_bindings();
        assert_eq!(
            eval_str("github.EVENT.Name", &bindings),
            FlowValue::string("push")
        );
    }

    #[test]
    fn test_missing_property_is_null() {
        let bindings = sample_bindings();
        assert_eq!(eval_str("github.missing", &bindings), FlowValue::Null);
        assert_eq!(
            eval_str("github.event.commits[99]", &bindings),
            FlowValue::Null
        );
        // indexing through null keeps returning null
        assert_eq!(eval_str("github.a.b.c", &bindings), FlowValue::Null);
    }

    #[test]
    fn test_wildcard_projection() {
        let bindings = sample_bindings();
        let value = eval_str("github.event.commits.*.message", &bindings);
        match value {
            FlowValue::Array(array) => {
                assert!(array.is_filtered());
                assert_eq!(array.len(), 2);
                assert_eq!(array.get(0), Some(FlowValue::string("fix parser")));
                assert_eq!(array.get(1), Some(FlowValue::string("add tests")));
            }
            other => panic!("expected filtered array, got {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_on_object() {
        let bindings = sample_bindings();
        let value = eval_str("github.event.*", &bindings);
        match value {
            FlowValue::Array(array) => assert_eq!(array.len(), 2),
            other => panic!("expected filtered array, got {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_on_scalar_degrades() {
        let bindings = sample_bindings();
        let value = eval_str("github.event.name.*", &bindings);
        match value {
            FlowValue::Array(array) => assert_eq!(array.len(), 0),
            other => panic!("expected filtered array, got {other:?}"),
        }
    }

    #[test]
    fn test_logical_operators_return_operands() {
        let bindings = sample_bindings();
        assert_eq!(
            eval_str("'' || 'fallback'", &bindings),
            FlowValue::string("fallback")
        );
        assert_eq!(eval_str("0 && 'never'", &bindings), FlowValue::Number(0.0));
        assert_eq!(
            eval_str("'a' && 'b' && 'c'", &bindings),
            FlowValue::string("c")
        );
        assert_eq!(eval_str("!''", &bindings), FlowValue::Boolean(true));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        // the second operand would error at evaluation (unknown extension
        // function), but short-circuit means it is never evaluated
        let mut bindings = ExpressionContext::new();
        bindings.add_function(
            FunctionInfo::new("boom", 0, 0),
            Rc::new(|_, _| {
                Err(FlowError::evaluation(
                    crate::core::error_code::EX0016,
                    "boom",
                ))
            }),
        );
        let named = bindings.named_context_infos();
        let functions = bindings.function_infos();
        let tree = parse("true || boom()", &named, &functions).unwrap();
        let mut trace = NoopTraceWriter;
        let result = tree
            .evaluate(&mut trace, &bindings, EvaluationOptions::default())
            .unwrap();
        assert_eq!(result.value, FlowValue::Boolean(true));
    }

    #[test]
    fn test_comparisons() {
        let bindings = ExpressionContext::new();
        assert_eq!(eval_str("1 == '1'", &bindings), FlowValue::Boolean(true));
        assert_eq!(eval_str("'apple' < 'BANANA'", &bindings), FlowValue::Boolean(true));
        assert_eq!(eval_str("2 >= 2", &bindings), FlowValue::Boolean(true));
        assert_eq!(eval_str("NaN == NaN", &bindings), FlowValue::Boolean(false));
        assert_eq!(eval_str("null == 0", &bindings), FlowValue::Boolean(true));
    }

    #[test]
    fn test_extension_function() {
        let mut bindings = ExpressionContext::new();
        bindings.add_function(
            FunctionInfo::new("double", 1, 1),
            Rc::new(|_, args| Ok(FlowValue::Number(args[0].convert_to_number() * 2.0))),
        );
        assert_eq!(eval_str("double(21)", &bindings), FlowValue::Number(42.0));
    }

    #[test]
    fn test_trace_output() {
        let bindings = ExpressionContext::new();
        let tree = parse("format('{0}', 1)", &[], &[]).unwrap();
        let mut trace = BufferedTraceWriter::new();
        tree.evaluate(&mut trace, &bindings, EvaluationOptions::default())
            .unwrap();
        let lines = trace.lines();
        assert_eq!(lines[0], "Evaluating: format('{0}', 1)");
        assert!(lines.iter().any(|line| line == "Result: '1'"));
    }

    #[test]
    fn test_memory_limit_enforced() {
        let bindings = ExpressionContext::new();
        let tree = parse("format('{0}{0}{0}{0}', 'aaaaaaaaaaaaaaaa')", &[], &[]).unwrap();
        let mut trace = NoopTraceWriter;
        let err = tree
            .evaluate(
                &mut trace,
                &bindings,
                EvaluationOptions { max_memory: 64 },
            )
            .unwrap_err();
        assert_eq!(err.error_code(), EX0012);
    }

    #[test]
    fn test_evaluation_memory_trim() {
        let mut memory = EvaluationMemory::new(1000);
        memory.add(0, 10, false).unwrap();
        memory.add(1, 100, false).unwrap();
        memory.add(2, 200, false).unwrap();
        assert_eq!(memory.total(), 310);
        // a total result at depth 1 frees the deeper columns
        memory.add(1, 50, true).unwrap();
        assert_eq!(memory.total(), 160);
    }
}
