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

//! Expression tree with one variant per node kind
//!
//! The tree is a closed sum: operators, literals, named contexts, wildcards
//! and function calls. Functions vary only in their evaluation core, so a
//! single `Function` variant carries the resolved kind.

use std::fmt;
use std::rc::Rc;

use super::value::number_to_string;

/// Any node of a parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Literal value (null, boolean, number or string)
    Literal(LiteralNode),

    /// Wildcard (`*`) in an index position
    Wildcard(WildcardNode),

    /// Reference to a host-supplied named context (e.g. `github`)
    NamedContext(NamedContextNode),

    /// Index access, covering both `a.b` and `a['b']`
    Index(IndexNode),

    /// Logical negation (`!`)
    Not(NotNode),

    /// N-ary short-circuit conjunction (`&&`)
    And(LogicalNode),

    /// N-ary short-circuit disjunction (`||`)
    Or(LogicalNode),

    /// Binary abstract comparison
    Compare(CompareNode),

    /// Function call
    Function(FunctionNode),

    /// Placeholder for an unresolved identifier in syntax-only parses
    NoOp(NoOpNode),
}

/// Literal payload
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Number literal, including `NaN` and the infinities
    Number(f64),
    /// Single-quoted string literal
    String(Rc<str>),
}

/// Literal node
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode {
    /// Literal value
    pub value: LiteralValue,
}

/// Wildcard node
#[derive(Debug, Clone, PartialEq)]
pub struct WildcardNode;

/// Named-context reference
#[derive(Debug, Clone, PartialEq)]
pub struct NamedContextNode {
    /// Context name as written
    pub name: Rc<str>,
}

/// Index access node
#[derive(Debug, Clone, PartialEq)]
pub struct IndexNode {
    /// The indexed value
    pub object: Box<ExpressionNode>,
    /// The index expression (a string literal for `a.b`)
    pub index: Box<ExpressionNode>,
    /// Whether the access was written with `.` rather than brackets
    pub via_dereference: bool,
}

/// Logical negation node
#[derive(Debug, Clone, PartialEq)]
pub struct NotNode {
    /// Negated operand
    pub operand: Box<ExpressionNode>,
}

/// N-ary logical node shared by `&&` and `||`
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalNode {
    /// Operands in source order; nested same-operator chains are flattened
    pub operands: Vec<ExpressionNode>,
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl CompareOperator {
    /// Short trace name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "le",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "ge",
        }
    }

    /// Source form
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

/// Comparison node
#[derive(Debug, Clone, PartialEq)]
pub struct CompareNode {
    /// Operator
    pub operator: CompareOperator,
    /// Left operand
    pub left: Box<ExpressionNode>,
    /// Right operand
    pub right: Box<ExpressionNode>,
}

/// Resolved function kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// `contains(a, b)`
    Contains,
    /// `endsWith(a, b)`
    EndsWith,
    /// `format(fmt, ...)`
    Format,
    /// `fromJson(s)`
    FromJson,
    /// `join(items, sep)`
    Join,
    /// `startsWith(a, b)`
    StartsWith,
    /// `toJson(v)`
    ToJson,
    /// Host-registered extension function, resolved by name at evaluation
    Extension,
}

/// Function call node
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    /// Resolved kind
    pub kind: FunctionKind,
    /// Function name as written
    pub name: Rc<str>,
    /// Argument expressions
    pub arguments: Vec<ExpressionNode>,
}

/// No-op node produced for unknown identifiers in syntax-only parses
#[derive(Debug, Clone, PartialEq)]
pub struct NoOpNode {
    /// The unresolved identifier
    pub name: Rc<str>,
}

impl ExpressionNode {
    /// Create a literal node
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(LiteralNode { value })
    }

    /// Create a string-literal node
    pub fn string_literal(value: impl Into<Rc<str>>) -> Self {
        Self::literal(LiteralValue::String(value.into()))
    }

    /// Create a named-context node
    pub fn named_context(name: impl Into<Rc<str>>) -> Self {
        Self::NamedContext(NamedContextNode { name: name.into() })
    }

    /// Create an index node
    pub fn index(object: ExpressionNode, index: ExpressionNode, via_dereference: bool) -> Self {
        Self::Index(IndexNode {
            object: Box::new(object),
            index: Box::new(index),
            via_dereference,
        })
    }

    /// Create a function node
    pub fn function(
        kind: FunctionKind,
        name: impl Into<Rc<str>>,
        arguments: Vec<ExpressionNode>,
    ) -> Self {
        Self::Function(FunctionNode {
            kind,
            name: name.into(),
            arguments,
        })
    }

    /// Short name used in verbose traces
    pub fn trace_name(&self) -> String {
        match self {
            Self::Literal(_) => "literal".to_string(),
            Self::Wildcard(_) => "wildcard".to_string(),
            Self::NamedContext(node) => node.name.to_string(),
            Self::Index(_) => "index".to_string(),
            Self::Not(_) => "not".to_string(),
            Self::And(_) => "and".to_string(),
            Self::Or(_) => "or".to_string(),
            Self::Compare(node) => node.operator.name().to_string(),
            Self::Function(node) => node.name.to_string(),
            Self::NoOp(_) => "noop".to_string(),
        }
    }

    /// Nesting depth of the tree rooted at this node
    pub fn depth(&self) -> usize {
        1 + match self {
            Self::Literal(_) | Self::Wildcard(_) | Self::NamedContext(_) | Self::NoOp(_) => 0,
            Self::Index(node) => node.object.depth().max(node.index.depth()),
            Self::Not(node) => node.operand.depth(),
            Self::And(node) | Self::Or(node) => {
                node.operands.iter().map(|n| n.depth()).max().unwrap_or(0)
            }
            Self::Compare(node) => node.left.depth().max(node.right.depth()),
            Self::Function(node) => node.arguments.iter().map(|n| n.depth()).max().unwrap_or(0),
        }
    }
}

/// Render a string literal in expression syntax, doubling embedded quotes
fn write_string_literal(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "'{}'", value.replace('\'', "''"))
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{}", number_to_string(*value)),
            Self::String(value) => write_string_literal(f, value),
        }
    }
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(node) => write!(f, "{}", node.value),
            Self::Wildcard(_) => write!(f, "*"),
            Self::NamedContext(node) => write!(f, "{}", node.name),
            Self::Index(node) => {
                if node.via_dereference {
                    match &*node.index {
                        Self::Literal(LiteralNode {
                            value: LiteralValue::String(name),
                        }) => write!(f, "{}.{}", node.object, name),
                        Self::Wildcard(_) => write!(f, "{}.*", node.object),
                        other => write!(f, "{}[{}]", node.object, other),
                    }
                } else {
                    write!(f, "{}[{}]", node.object, node.index)
                }
            }
            Self::Not(node) => write!(f, "!{}", node.operand),
            Self::And(node) => write_logical(f, "&&", &node.operands),
            Self::Or(node) => write_logical(f, "||", &node.operands),
            Self::Compare(node) => {
                write!(f, "{} {} {}", node.left, node.operator.symbol(), node.right)
            }
            Self::Function(node) => {
                write!(f, "{}(", node.name)?;
                for (position, argument) in node.arguments.iter().enumerate() {
                    if position > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                write!(f, ")")
            }
            Self::NoOp(node) => write!(f, "{}", node.name),
        }
    }
}

fn write_logical(
    f: &mut fmt::Formatter<'_>,
    symbol: &str,
    operands: &[ExpressionNode],
) -> fmt::Result {
    write!(f, "(")?;
    for (position, operand) in operands.iter().enumerate() {
        if position > 0 {
            write!(f, " {symbol} ")?;
        }
        write!(f, "{operand}")?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_dereference() {
        let expr = ExpressionNode::index(
            ExpressionNode::named_context("github"),
            ExpressionNode::string_literal("event"),
            true,
        );
        assert_eq!(expr.to_string(), "github.event");
    }

    #[test]
    fn test_display_bracket_index() {
        let expr = ExpressionNode::index(
            ExpressionNode::named_context("matrix"),
            ExpressionNode::literal(LiteralValue::Number(0.0)),
            false,
        );
        assert_eq!(expr.to_string(), "matrix[0]");
    }

    #[test]
    fn test_display_string_literal_escapes_quotes() {
        let expr = ExpressionNode::string_literal("it's");
        assert_eq!(expr.to_string(), "'it''s'");
    }

    #[test]
    fn test_display_function_call() {
        let expr = ExpressionNode::function(
            FunctionKind::Contains,
            "contains",
            vec![
                ExpressionNode::string_literal("abc"),
                ExpressionNode::string_literal("b"),
            ],
        );
        assert_eq!(expr.to_string(), "contains('abc', 'b')");
    }

    #[test]
    fn test_depth() {
        let leaf = ExpressionNode::named_context("a");
        assert_eq!(leaf.depth(), 1);
        let nested = ExpressionNode::index(
            ExpressionNode::index(
                ExpressionNode::named_context("a"),
                ExpressionNode::string_literal("b"),
                true,
            ),
            ExpressionNode::string_literal("c"),
            true,
        );
        assert_eq!(nested.depth(), 3);
    }
}
