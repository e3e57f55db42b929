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

//! The expression language: lexer, parser, values, evaluator and functions

pub mod ast;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{
    CompareNode, CompareOperator, ExpressionNode, FunctionKind, FunctionNode, IndexNode,
    LiteralNode, LiteralValue, LogicalNode, NamedContextNode, NotNode, WildcardNode,
};
pub use evaluator::{
    EvaluationOptions, EvaluationResult, ExpressionContext, ExtensionFunction, ResultMemory,
};
pub use functions::format_strings;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{
    parse, validate_syntax, FunctionInfo, NamedContextInfo, MAX_DEPTH, MAX_LENGTH,
    WELL_KNOWN_FUNCTIONS,
};
pub use value::{
    abstract_equal, abstract_greater_than, abstract_less_than, number_to_string, parse_number,
    ArrayCompat, ArrayValue, Collection, FilteredArray, FlowValue, ObjectCompat, ObjectValue,
    ValueKind,
};
