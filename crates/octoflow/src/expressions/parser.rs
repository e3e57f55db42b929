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

//! Shunting-yard parser producing an expression tree
//!
//! Operator precedence (high to low): `.`/`[`/call `(` bind at 19, `!` at
//! 16, relational comparisons at 11, `==`/`!=` at 10, `&&` at 6, `||` at 5.
//! `!` is right-associative, everything else left-associative. Nested
//! same-operator `&&`/`||` chains are flattened into one n-ary node so
//! short-circuit evaluation walks a flat operand list.

use std::rc::Rc;

use crate::core::error::{FlowError, Result};
use crate::core::error_code::{EX0001, EX0002, EX0003, EX0004, EX0005, EX0006, EX0007, EX0008};

use super::ast::{ExpressionNode, FunctionKind, LiteralValue, NoOpNode, WildcardNode};
use super::lexer::{Lexer, Token, TokenKind};

/// Maximum allowed expression length in characters
pub const MAX_LENGTH: usize = 21000;

/// Maximum allowed expression tree depth
pub const MAX_DEPTH: usize = 50;

/// A named context the parser may resolve
#[derive(Debug, Clone)]
pub struct NamedContextInfo {
    /// Context name
    pub name: Rc<str>,
}

impl NamedContextInfo {
    /// Create an info record for `name`
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self { name: name.into() }
    }
}

/// An extension function the parser may resolve
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Function name
    pub name: Rc<str>,
    /// Minimum accepted parameter count
    pub min_parameters: usize,
    /// Maximum accepted parameter count
    pub max_parameters: usize,
}

impl FunctionInfo {
    /// Create an info record for `name` accepting `min..=max` parameters
    pub fn new(name: impl Into<Rc<str>>, min_parameters: usize, max_parameters: usize) -> Self {
        Self {
            name: name.into(),
            min_parameters,
            max_parameters,
        }
    }
}

/// The built-in function catalog: name, kind, min and max parameter counts
pub const WELL_KNOWN_FUNCTIONS: &[(&str, FunctionKind, usize, usize)] = &[
    ("contains", FunctionKind::Contains, 2, 2),
    ("endsWith", FunctionKind::EndsWith, 2, 2),
    ("format", FunctionKind::Format, 1, 255),
    ("fromJson", FunctionKind::FromJson, 1, 1),
    ("join", FunctionKind::Join, 1, 2),
    ("startsWith", FunctionKind::StartsWith, 2, 2),
    ("toJson", FunctionKind::ToJson, 1, 1),
];

/// Parse `expression` against the supplied named contexts and extension
/// functions; unknown identifiers are errors
pub fn parse(
    expression: &str,
    named_contexts: &[NamedContextInfo],
    functions: &[FunctionInfo],
) -> Result<ExpressionNode> {
    Parser::new(expression, Some((named_contexts, functions))).run()
}

/// Parse `expression` checking syntax only
///
/// Unknown named contexts become no-op nodes and unknown functions accept
/// any arity, so any well-formed expression parses.
pub fn validate_syntax(expression: &str) -> Result<ExpressionNode> {
    Parser::new(expression, None).run()
}

struct ResolvedFunction {
    kind: FunctionKind,
    name: Rc<str>,
    min_parameters: usize,
    max_parameters: usize,
}

struct OpEntry {
    token: Token,
    operand_base: usize,
    function: Option<ResolvedFunction>,
}

impl OpEntry {
    /// Binding strength; `None` marks group/index/call boundaries
    fn precedence(&self) -> Option<u8> {
        match self.token.kind {
            TokenKind::Dereference => Some(19),
            TokenKind::LogicalOperator => Some(match self.token.raw.as_str() {
                "!" => 16,
                "<" | "<=" | ">" | ">=" => 11,
                "==" | "!=" => 10,
                "&&" => 6,
                _ => 5,
            }),
            _ => None,
        }
    }
}

struct Parser<'a> {
    expression: &'a str,
    context: Option<(&'a [NamedContextInfo], &'a [FunctionInfo])>,
    operands: Vec<ExpressionNode>,
    operators: Vec<OpEntry>,
}

impl<'a> Parser<'a> {
    fn new(
        expression: &'a str,
        context: Option<(&'a [NamedContextInfo], &'a [FunctionInfo])>,
    ) -> Self {
        Self {
            expression,
            context,
            operands: Vec::new(),
            operators: Vec::new(),
        }
    }

    fn run(mut self) -> Result<ExpressionNode> {
        if self.expression.chars().count() > MAX_LENGTH {
            return Err(FlowError::parse(
                EX0003,
                format!("Exceeded max expression length {MAX_LENGTH}"),
                self.expression,
                None,
            ));
        }

        let mut lexer = Lexer::new(self.expression);
        while let Some(token) = lexer.next_token() {
            self.process(token)?;
        }

        if lexer.has_unclosed_tokens() {
            return Err(self.end_of_expression());
        }
        while let Some(entry) = self.operators.last() {
            if entry.precedence().is_none() {
                return Err(self.end_of_expression());
            }
            self.flush_top()?;
        }
        if self.operands.len() != 1 {
            return Err(self.end_of_expression());
        }
        let root = self.operands.pop().expect("single operand");

        if root.depth() > MAX_DEPTH {
            return Err(FlowError::parse(
                EX0004,
                format!("Exceeded max expression depth {MAX_DEPTH}"),
                self.expression,
                None,
            ));
        }
        Ok(root)
    }

    fn process(&mut self, token: Token) -> Result<()> {
        match token.kind {
            TokenKind::Unexpected => Err(self.unexpected_symbol(&token)),
            TokenKind::Null | TokenKind::Boolean | TokenKind::Number | TokenKind::String => {
                let value = token.value.clone().expect("literal token carries a value");
                self.operands.push(ExpressionNode::literal(value));
                Ok(())
            }
            TokenKind::PropertyName => {
                self.operands
                    .push(ExpressionNode::string_literal(token.raw.as_str()));
                Ok(())
            }
            TokenKind::Wildcard => {
                self.operands.push(ExpressionNode::Wildcard(WildcardNode));
                Ok(())
            }
            TokenKind::NamedContext => self.push_named_context(token),
            TokenKind::Function => self.push_function(token),
            TokenKind::StartGroup => {
                let operand_base = self.operands.len();
                self.operators.push(OpEntry {
                    token,
                    operand_base,
                    function: None,
                });
                Ok(())
            }
            TokenKind::StartIndex => {
                // `[` binds like a postfix operator: complete any pending
                // dereference chain before opening the marker
                self.flush_while(19, true)?;
                let operand_base = self.operands.len();
                self.operators.push(OpEntry {
                    token,
                    operand_base,
                    function: None,
                });
                Ok(())
            }
            TokenKind::StartParameters => Ok(()),
            TokenKind::Separator => {
                while matches!(self.operators.last(), Some(e) if e.precedence().is_some()) {
                    self.flush_top()?;
                }
                Ok(())
            }
            TokenKind::EndGroup => {
                while matches!(self.operators.last(), Some(e) if e.precedence().is_some()) {
                    self.flush_top()?;
                }
                match self.operators.pop() {
                    Some(entry) if entry.token.kind == TokenKind::StartGroup => Ok(()),
                    _ => Err(self.unexpected_symbol(&token)),
                }
            }
            TokenKind::EndIndex => {
                while matches!(self.operators.last(), Some(e) if e.precedence().is_some()) {
                    self.flush_top()?;
                }
                match self.operators.pop() {
                    Some(entry) if entry.token.kind == TokenKind::StartIndex => {
                        let index = self.pop_operand()?;
                        let object = self.pop_operand()?;
                        self.operands
                            .push(ExpressionNode::index(object, index, false));
                        Ok(())
                    }
                    _ => Err(self.unexpected_symbol(&token)),
                }
            }
            TokenKind::EndParameters => {
                while matches!(self.operators.last(), Some(e) if e.precedence().is_some()) {
                    self.flush_top()?;
                }
                match self.operators.pop() {
                    Some(OpEntry {
                        operand_base,
                        function: Some(function),
                        ..
                    }) => {
                        let arguments = self.operands.split_off(operand_base);
                        if arguments.len() < function.min_parameters {
                            return Err(FlowError::parse(
                                EX0007,
                                format!(
                                    "Too few parameters supplied. The function '{}' expects at least {}. {}",
                                    function.name,
                                    function.min_parameters,
                                    self.describe_position(token.index),
                                ),
                                self.expression,
                                Some(token.index + 1),
                            ));
                        }
                        if arguments.len() > function.max_parameters {
                            return Err(FlowError::parse(
                                EX0008,
                                format!(
                                    "Too many parameters supplied. The function '{}' expects at most {}. {}",
                                    function.name,
                                    function.max_parameters,
                                    self.describe_position(token.index),
                                ),
                                self.expression,
                                Some(token.index + 1),
                            ));
                        }
                        self.operands.push(ExpressionNode::function(
                            function.kind,
                            function.name,
                            arguments,
                        ));
                        Ok(())
                    }
                    _ => Err(self.unexpected_symbol(&token)),
                }
            }
            TokenKind::Dereference => {
                self.flush_while(19, true)?;
                let operand_base = self.operands.len();
                self.operators.push(OpEntry {
                    token,
                    operand_base,
                    function: None,
                });
                Ok(())
            }
            TokenKind::LogicalOperator => {
                let entry = OpEntry {
                    operand_base: self.operands.len(),
                    function: None,
                    token,
                };
                let precedence = entry.precedence().expect("logical operator has precedence");
                // `!` is right-associative
                let left_associative = entry.token.raw != "!";
                self.flush_while(precedence, left_associative)?;
                self.operators.push(entry);
                Ok(())
            }
        }
    }

    fn push_named_context(&mut self, token: Token) -> Result<()> {
        let node = match self.context {
            Some((named_contexts, _)) => {
                match named_contexts
                    .iter()
                    .find(|info| info.name.eq_ignore_ascii_case(&token.raw))
                {
                    Some(info) => ExpressionNode::named_context(info.name.clone()),
                    None => {
                        return Err(FlowError::parse(
                            EX0006,
                            format!(
                                "Unrecognized named-value: '{}'. {}",
                                token.raw,
                                self.describe_position(token.index)
                            ),
                            self.expression,
                            Some(token.index + 1),
                        ));
                    }
                }
            }
            None => ExpressionNode::NoOp(NoOpNode {
                name: Rc::from(token.raw.as_str()),
            }),
        };
        self.operands.push(node);
        Ok(())
    }

    fn push_function(&mut self, token: Token) -> Result<()> {
        let well_known = WELL_KNOWN_FUNCTIONS
            .iter()
            .find(|(name, _, _, _)| name.eq_ignore_ascii_case(&token.raw));
        let function = if let Some((name, kind, min, max)) = well_known {
            ResolvedFunction {
                kind: *kind,
                name: Rc::from(*name),
                min_parameters: *min,
                max_parameters: *max,
            }
        } else {
            match self.context {
                Some((_, functions)) => {
                    match functions
                        .iter()
                        .find(|info| info.name.eq_ignore_ascii_case(&token.raw))
                    {
                        Some(info) => ResolvedFunction {
                            kind: FunctionKind::Extension,
                            name: info.name.clone(),
                            min_parameters: info.min_parameters,
                            max_parameters: info.max_parameters,
                        },
                        None => {
                            return Err(FlowError::parse(
                                EX0005,
                                format!(
                                    "Unrecognized function: '{}'. {}",
                                    token.raw,
                                    self.describe_position(token.index)
                                ),
                                self.expression,
                                Some(token.index + 1),
                            ));
                        }
                    }
                }
                None => ResolvedFunction {
                    kind: FunctionKind::Extension,
                    name: Rc::from(token.raw.as_str()),
                    min_parameters: 0,
                    max_parameters: 255,
                },
            }
        };
        let operand_base = self.operands.len();
        self.operators.push(OpEntry {
            token,
            operand_base,
            function: Some(function),
        });
        Ok(())
    }

    /// Flush stacked operators that bind at least as tightly as `precedence`
    fn flush_while(&mut self, precedence: u8, left_associative: bool) -> Result<()> {
        loop {
            let flush = match self.operators.last().and_then(|e| e.precedence()) {
                Some(top) => top > precedence || (left_associative && top == precedence),
                None => false,
            };
            if !flush {
                return Ok(());
            }
            self.flush_top()?;
        }
    }

    fn flush_top(&mut self) -> Result<()> {
        let entry = self.operators.pop().expect("operator to flush");
        match entry.token.kind {
            TokenKind::Dereference => {
                let index = self.pop_operand()?;
                let object = self.pop_operand()?;
                self.operands.push(ExpressionNode::index(object, index, true));
            }
            TokenKind::LogicalOperator => match entry.token.raw.as_str() {
                "!" => {
                    let operand = self.pop_operand()?;
                    self.operands.push(ExpressionNode::Not(super::ast::NotNode {
                        operand: Box::new(operand),
                    }));
                }
                "&&" | "||" => {
                    let right = self.pop_operand()?;
                    let left = self.pop_operand()?;
                    let is_and = entry.token.raw == "&&";
                    self.operands.push(make_logical(is_and, left, right));
                }
                raw => {
                    let operator = match raw {
                        "==" => super::ast::CompareOperator::Equal,
                        "!=" => super::ast::CompareOperator::NotEqual,
                        "<" => super::ast::CompareOperator::LessThan,
                        "<=" => super::ast::CompareOperator::LessThanOrEqual,
                        ">" => super::ast::CompareOperator::GreaterThan,
                        _ => super::ast::CompareOperator::GreaterThanOrEqual,
                    };
                    let right = self.pop_operand()?;
                    let left = self.pop_operand()?;
                    self.operands
                        .push(ExpressionNode::Compare(super::ast::CompareNode {
                            operator,
                            left: Box::new(left),
                            right: Box::new(right),
                        }));
                }
            },
            _ => return Err(self.end_of_expression()),
        }
        Ok(())
    }

    fn pop_operand(&mut self) -> Result<ExpressionNode> {
        self.operands.pop().ok_or_else(|| self.end_of_expression())
    }

    fn describe_position(&self, index: usize) -> String {
        format!(
            "Located at position {} within expression: {}",
            index + 1,
            self.expression
        )
    }

    fn unexpected_symbol(&self, token: &Token) -> FlowError {
        FlowError::parse(
            EX0001,
            format!(
                "Unexpected symbol: '{}'. {}",
                token.raw,
                self.describe_position(token.index)
            ),
            self.expression,
            Some(token.index + 1),
        )
    }

    fn end_of_expression(&self) -> FlowError {
        FlowError::parse(
            EX0002,
            "Unexpected end of expression",
            self.expression,
            None,
        )
    }
}

/// Build an `&&`/`||` node, splicing in same-operator children
fn make_logical(is_and: bool, left: ExpressionNode, right: ExpressionNode) -> ExpressionNode {
    let mut operands = Vec::new();
    let mut absorb = |node: ExpressionNode, operands: &mut Vec<ExpressionNode>| match (is_and, node)
    {
        (true, ExpressionNode::And(inner)) => operands.extend(inner.operands),
        (false, ExpressionNode::Or(inner)) => operands.extend(inner.operands),
        (_, other) => operands.push(other),
    };
    absorb(left, &mut operands);
    absorb(right, &mut operands);
    let node = super::ast::LogicalNode { operands };
    if is_and {
        ExpressionNode::And(node)
    } else {
        ExpressionNode::Or(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::ast::CompareOperator;

    fn contexts(names: &[&str]) -> Vec<NamedContextInfo> {
        names.iter().map(|n| NamedContextInfo::new(*n)).collect()
    }

    fn parse_with(expression: &str, names: &[&str]) -> ExpressionNode {
        parse(expression, &contexts(names), &[]).unwrap()
    }

    #[test]
    fn test_dereference_builds_index_nodes() {
        let expr = parse_with("github.event.commits", &["github"]);
        assert_eq!(expr.to_string(), "github.event.commits");
        match &expr {
            ExpressionNode::Index(node) => {
                assert!(node.via_dereference);
                assert_eq!(node.object.to_string(), "github.event");
            }
            other => panic!("expected index node, got {other:?}"),
        }
    }

    #[test]
    fn test_bracket_index_after_dereference_chain() {
        let expr = parse_with("a.b[0]", &["a"]);
        match &expr {
            ExpressionNode::Index(node) => {
                assert!(!node.via_dereference);
                assert_eq!(node.object.to_string(), "a.b");
            }
            other => panic!("expected index node, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence_not_over_and_over_or() {
        let expr = parse_with("!true && false || true", &[]);
        match &expr {
            ExpressionNode::Or(node) => {
                assert_eq!(node.operands.len(), 2);
                assert!(matches!(node.operands[0], ExpressionNode::And(_)));
            }
            other => panic!("expected or node, got {other:?}"),
        }
    }

    #[test]
    fn test_logical_flattening() {
        let expr = parse_with("true && false && true && false", &[]);
        match &expr {
            ExpressionNode::And(node) => assert_eq!(node.operands.len(), 4),
            other => panic!("expected and node, got {other:?}"),
        }
    }

    #[test]
    fn test_comparison_binds_tighter_than_logical() {
        let expr = parse_with("1 < 2 && 3 == 3", &[]);
        match &expr {
            ExpressionNode::And(node) => {
                assert!(matches!(
                    &node.operands[0],
                    ExpressionNode::Compare(c) if c.operator == CompareOperator::LessThan
                ));
                assert!(matches!(
                    &node.operands[1],
                    ExpressionNode::Compare(c) if c.operator == CompareOperator::Equal
                ));
            }
            other => panic!("expected and node, got {other:?}"),
        }
    }

    #[test]
    fn test_function_arity_checks() {
        let err = parse("contains('a')", &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0007);
        let err = parse("toJson(1, 2)", &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0008);
        assert!(parse("format('x')", &[], &[]).is_ok());
    }

    #[test]
    fn test_function_names_case_insensitive() {
        let expr = parse("CONTAINS('a', 'b')", &[], &[]).unwrap();
        match expr {
            ExpressionNode::Function(node) => assert_eq!(node.kind, FunctionKind::Contains),
            other => panic!("expected function node, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_named_context() {
        let err = parse("missing.value", &contexts(&["github"]), &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0006);
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("nope(1)", &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0005);
    }

    #[test]
    fn test_syntax_only_mode_accepts_unknowns() {
        let expr = validate_syntax("missing.value && alsoMissing(1, 2)").unwrap();
        assert!(expr.depth() >= 2);
    }

    #[test]
    fn test_extension_function_resolution() {
        let functions = vec![FunctionInfo::new("hashFiles", 1, 255)];
        let expr = parse("hashFiles('**/*.lock')", &[], &functions).unwrap();
        match expr {
            ExpressionNode::Function(node) => {
                assert_eq!(node.kind, FunctionKind::Extension);
                assert_eq!(&*node.name, "hashFiles");
            }
            other => panic!("expected function node, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_symbol_position() {
        let err = parse("1 ~ 2", &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0001);
        assert!(err.to_string().contains("position 3"));
    }

    #[test]
    fn test_unclosed_expression() {
        let err = parse("(1 == 1", &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0002);
        let err = parse("", &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0002);
    }

    #[test]
    fn test_max_length() {
        let long = "a".repeat(MAX_LENGTH + 1);
        let err = parse(&long, &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), EX0003);
    }

    #[test]
    fn test_max_depth() {
        // nested groups do not add tree depth by themselves, so nest indexes
        let mut expression = String::from("a");
        for _ in 0..MAX_DEPTH {
            expression.push_str(".b");
        }
        let err = parse_with_result(&expression);
        assert_eq!(err.unwrap_err().error_code(), EX0004);

        fn parse_with_result(expression: &str) -> Result<ExpressionNode> {
            parse(expression, &contexts(&["a"]), &[])
        }
    }

    #[test]
    fn test_wildcard_parse() {
        let expr = parse_with("a.*.name", &["a"]);
        assert_eq!(expr.to_string(), "a.*.name");
    }

    #[test]
    fn test_group_overrides_precedence() {
        let expr = parse_with("!(true || false)", &[]);
        match expr {
            ExpressionNode::Not(node) => assert!(matches!(*node.operand, ExpressionNode::Or(_))),
            other => panic!("expected not node, got {other:?}"),
        }
    }
}
