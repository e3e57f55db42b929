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

//! Lexer for the expression language
//!
//! Produces kind-tagged tokens with raw text, character index and, for
//! literals, a parsed value. Legality of each token given the previous one
//! is enforced here: an illegal sequence yields an `Unexpected` token rather
//! than an error, and the parser raises the error with the position.

use phf::phf_map;
use std::rc::Rc;

use super::ast::LiteralValue;

/// Token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `(` opening a group
    StartGroup,
    /// `[`
    StartIndex,
    /// `(` opening a function's parameter list
    StartParameters,
    /// `)` closing a group
    EndGroup,
    /// `]`
    EndIndex,
    /// `)` closing a parameter list
    EndParameters,
    /// `,`
    Separator,
    /// `.`
    Dereference,
    /// `*`
    Wildcard,
    /// `!`, `!=`, `==`, `<`, `<=`, `>`, `>=`, `&&`, `||`
    LogicalOperator,
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// Number literal, including signed, decimals, `NaN` and the infinities
    Number,
    /// Single-quoted string literal with `''` as the escape
    String,
    /// Identifier following `.`
    PropertyName,
    /// Identifier directly followed by `(`
    Function,
    /// Any other identifier
    NamedContext,
    /// An illegal character or sequence
    Unexpected,
}

/// A lexed token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind tag
    pub kind: TokenKind,
    /// Raw source text
    pub raw: String,
    /// 0-based character index of the first character
    pub index: usize,
    /// Parsed value for literal kinds
    pub value: Option<LiteralValue>,
}

impl Token {
    fn new(kind: TokenKind, raw: impl Into<String>, index: usize) -> Self {
        Self {
            kind,
            raw: raw.into(),
            index,
            value: None,
        }
    }

    fn with_value(kind: TokenKind, raw: impl Into<String>, index: usize, value: LiteralValue) -> Self {
        Self {
            kind,
            raw: raw.into(),
            index,
            value: Some(value),
        }
    }
}

enum Keyword {
    Null,
    True,
    False,
    NaN,
    Infinity,
}

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "null" => Keyword::Null,
    "true" => Keyword::True,
    "false" => Keyword::False,
    "NaN" => Keyword::NaN,
    "Infinity" => Keyword::Infinity,
};

/// Streaming lexer over an expression string
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    last_kind: Option<TokenKind>,
    unclosed: Vec<TokenKind>,
}

impl Lexer {
    /// Create a lexer over `expression`
    pub fn new(expression: &str) -> Self {
        Self {
            chars: expression.chars().collect(),
            position: 0,
            last_kind: None,
            unclosed: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    /// First non-whitespace character at or after `offset` from the cursor
    fn peek_past_whitespace(&self, offset: usize) -> Option<char> {
        let mut position = self.position + offset;
        while let Some(c) = self.chars.get(position) {
            if !c.is_whitespace() {
                return Some(*c);
            }
            position += 1;
        }
        None
    }

    fn is_identifier_start(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn is_identifier_continue(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    }

    /// Produce the next token, or `None` at end of input
    pub fn next_token(&mut self) -> Option<Token> {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.position += 1;
        }
        let start = self.position;
        let c = self.peek()?;

        let mut token = match c {
            '(' => {
                self.position += 1;
                if self.last_kind == Some(TokenKind::Function) {
                    Token::new(TokenKind::StartParameters, "(", start)
                } else {
                    Token::new(TokenKind::StartGroup, "(", start)
                }
            }
            ')' => {
                self.position += 1;
                match self.unclosed.last() {
                    Some(TokenKind::StartParameters) => {
                        Token::new(TokenKind::EndParameters, ")", start)
                    }
                    Some(TokenKind::StartGroup) => Token::new(TokenKind::EndGroup, ")", start),
                    _ => Token::new(TokenKind::Unexpected, ")", start),
                }
            }
            '[' => {
                self.position += 1;
                Token::new(TokenKind::StartIndex, "[", start)
            }
            ']' => {
                self.position += 1;
                if self.unclosed.last() == Some(&TokenKind::StartIndex) {
                    Token::new(TokenKind::EndIndex, "]", start)
                } else {
                    Token::new(TokenKind::Unexpected, "]", start)
                }
            }
            ',' => {
                self.position += 1;
                if self.unclosed.last() == Some(&TokenKind::StartParameters) {
                    Token::new(TokenKind::Separator, ",", start)
                } else {
                    Token::new(TokenKind::Unexpected, ",", start)
                }
            }
            '.' => {
                self.position += 1;
                Token::new(TokenKind::Dereference, ".", start)
            }
            '*' => {
                self.position += 1;
                Token::new(TokenKind::Wildcard, "*", start)
            }
            '!' => {
                self.position += 1;
                if self.peek() == Some('=') {
                    self.position += 1;
                    Token::new(TokenKind::LogicalOperator, "!=", start)
                } else {
                    Token::new(TokenKind::LogicalOperator, "!", start)
                }
            }
            '=' => {
                self.position += 1;
                if self.peek() == Some('=') {
                    self.position += 1;
                    Token::new(TokenKind::LogicalOperator, "==", start)
                } else {
                    Token::new(TokenKind::Unexpected, "=", start)
                }
            }
            '<' => {
                self.position += 1;
                if self.peek() == Some('=') {
                    self.position += 1;
                    Token::new(TokenKind::LogicalOperator, "<=", start)
                } else {
                    Token::new(TokenKind::LogicalOperator, "<", start)
                }
            }
            '>' => {
                self.position += 1;
                if self.peek() == Some('=') {
                    self.position += 1;
                    Token::new(TokenKind::LogicalOperator, ">=", start)
                } else {
                    Token::new(TokenKind::LogicalOperator, ">", start)
                }
            }
            '&' => {
                self.position += 1;
                if self.peek() == Some('&') {
                    self.position += 1;
                    Token::new(TokenKind::LogicalOperator, "&&", start)
                } else {
                    Token::new(TokenKind::Unexpected, "&", start)
                }
            }
            '|' => {
                self.position += 1;
                if self.peek() == Some('|') {
                    self.position += 1;
                    Token::new(TokenKind::LogicalOperator, "||", start)
                } else {
                    Token::new(TokenKind::Unexpected, "|", start)
                }
            }
            '\'' => self.read_string(start),
            c if c.is_ascii_digit() || c == '-' || c == '+' => self.read_number(start),
            c if Self::is_identifier_start(c) => self.read_identifier(start),
            other => {
                self.position += 1;
                Token::new(TokenKind::Unexpected, other.to_string(), start)
            }
        };

        if token.kind != TokenKind::Unexpected && !self.check_legality(&token) {
            token = Token::new(TokenKind::Unexpected, token.raw, token.index);
        }

        if token.kind != TokenKind::Unexpected {
            match token.kind {
                TokenKind::StartGroup | TokenKind::StartIndex | TokenKind::StartParameters => {
                    self.unclosed.push(token.kind);
                }
                TokenKind::EndGroup | TokenKind::EndIndex | TokenKind::EndParameters => {
                    self.unclosed.pop();
                }
                _ => {}
            }
        }

        self.last_kind = Some(token.kind);
        Some(token)
    }

    /// Whether any `(` or `[` remains open
    pub fn has_unclosed_tokens(&self) -> bool {
        !self.unclosed.is_empty()
    }

    fn read_string(&mut self, start: usize) -> Token {
        // opening quote
        self.position += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('\'') => {
                    if self.peek_at(1) == Some('\'') {
                        value.push('\'');
                        self.position += 2;
                    } else {
                        self.position += 1;
                        let raw: String = self.chars[start..self.position].iter().collect();
                        return Token::with_value(
                            TokenKind::String,
                            raw,
                            start,
                            LiteralValue::String(Rc::from(value.as_str())),
                        );
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.position += 1;
                }
                None => {
                    let raw: String = self.chars[start..self.position].iter().collect();
                    return Token::new(TokenKind::Unexpected, raw, start);
                }
            }
        }
    }

    fn read_number(&mut self, start: usize) -> Token {
        if matches!(self.peek(), Some('-' | '+')) {
            self.position += 1;
        }
        if matches!(self.peek(), Some(c) if Self::is_identifier_start(c)) {
            // signed keyword form: -Infinity, +Infinity, -NaN
            while matches!(self.peek(), Some(c) if Self::is_identifier_continue(c)) {
                self.position += 1;
            }
        } else {
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                self.position += 1;
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                self.position += 1;
                if matches!(self.peek(), Some('-' | '+')) {
                    self.position += 1;
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.position += 1;
                }
            }
        }
        let raw: String = self.chars[start..self.position].iter().collect();
        match raw.trim_start_matches('+').parse::<f64>() {
            Ok(value) => Token::with_value(TokenKind::Number, raw, start, LiteralValue::Number(value)),
            Err(_) => Token::new(TokenKind::Unexpected, raw, start),
        }
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        while matches!(self.peek(), Some(c) if Self::is_identifier_continue(c)) {
            self.position += 1;
        }
        let raw: String = self.chars[start..self.position].iter().collect();

        if let Some(keyword) = KEYWORDS.get(raw.as_str()) {
            return match keyword {
                Keyword::Null => Token::with_value(TokenKind::Null, raw, start, LiteralValue::Null),
                Keyword::True => {
                    Token::with_value(TokenKind::Boolean, raw, start, LiteralValue::Boolean(true))
                }
                Keyword::False => {
                    Token::with_value(TokenKind::Boolean, raw, start, LiteralValue::Boolean(false))
                }
                Keyword::NaN => {
                    Token::with_value(TokenKind::Number, raw, start, LiteralValue::Number(f64::NAN))
                }
                Keyword::Infinity => Token::with_value(
                    TokenKind::Number,
                    raw,
                    start,
                    LiteralValue::Number(f64::INFINITY),
                ),
            };
        }

        if self.last_kind == Some(TokenKind::Dereference) {
            Token::new(TokenKind::PropertyName, raw, start)
        } else if self.peek_past_whitespace(0) == Some('(') {
            Token::new(TokenKind::Function, raw, start)
        } else {
            Token::new(TokenKind::NamedContext, raw, start)
        }
    }

    /// Whether `token` may follow the previously produced token
    fn check_legality(&self, token: &Token) -> bool {
        let prev = self.last_kind;
        let value_start = matches!(
            prev,
            None | Some(
                TokenKind::StartGroup
                    | TokenKind::StartIndex
                    | TokenKind::StartParameters
                    | TokenKind::Separator
                    | TokenKind::LogicalOperator
            )
        );
        let value_end = matches!(
            prev,
            Some(
                TokenKind::EndGroup
                    | TokenKind::EndIndex
                    | TokenKind::EndParameters
                    | TokenKind::PropertyName
                    | TokenKind::NamedContext
                    | TokenKind::Wildcard
                    | TokenKind::Null
                    | TokenKind::Boolean
                    | TokenKind::Number
                    | TokenKind::String
            )
        );
        let dereference_base = matches!(
            prev,
            Some(
                TokenKind::EndGroup
                    | TokenKind::EndIndex
                    | TokenKind::EndParameters
                    | TokenKind::PropertyName
                    | TokenKind::NamedContext
                    | TokenKind::Wildcard
            )
        );

        match token.kind {
            TokenKind::StartGroup => value_start,
            TokenKind::StartIndex => dereference_base,
            TokenKind::StartParameters => prev == Some(TokenKind::Function),
            TokenKind::EndGroup | TokenKind::EndIndex => value_end,
            TokenKind::EndParameters => value_end || prev == Some(TokenKind::StartParameters),
            TokenKind::Separator => value_end,
            TokenKind::Dereference => dereference_base,
            TokenKind::Wildcard => {
                matches!(prev, Some(TokenKind::Dereference | TokenKind::StartIndex))
            }
            TokenKind::LogicalOperator => {
                if token.raw == "!" {
                    value_start
                } else {
                    value_end
                }
            }
            TokenKind::Null
            | TokenKind::Boolean
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::Function
            | TokenKind::NamedContext => value_start,
            TokenKind::PropertyName => prev == Some(TokenKind::Dereference),
            TokenKind::Unexpected => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(expression: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(expression);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token() {
            tokens.push(token);
        }
        tokens
    }

    fn kinds(expression: &str) -> Vec<TokenKind> {
        lex(expression).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_dereference_chain() {
        assert_eq!(
            kinds("github.event.commits"),
            vec![
                TokenKind::NamedContext,
                TokenKind::Dereference,
                TokenKind::PropertyName,
                TokenKind::Dereference,
                TokenKind::PropertyName,
            ]
        );
    }

    #[test]
    fn test_function_detection() {
        assert_eq!(
            kinds("contains('a', 'b')"),
            vec![
                TokenKind::Function,
                TokenKind::StartParameters,
                TokenKind::String,
                TokenKind::Separator,
                TokenKind::String,
                TokenKind::EndParameters,
            ]
        );
        // whitespace between the name and the parenthesis is tolerated
        assert_eq!(kinds("toJson (1)")[0], TokenKind::Function);
    }

    #[test]
    fn test_group_versus_parameters() {
        assert_eq!(
            kinds("(1)"),
            vec![TokenKind::StartGroup, TokenKind::Number, TokenKind::EndGroup]
        );
    }

    #[test]
    fn test_string_escape() {
        let tokens = lex("'it''s'");
        assert_eq!(tokens.len(), 1);
        assert_eq!(
            tokens[0].value,
            Some(LiteralValue::String(Rc::from("it's")))
        );
    }

    #[test]
    fn test_unterminated_string_is_unexpected() {
        let tokens = lex("'abc");
        assert_eq!(tokens[0].kind, TokenKind::Unexpected);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("-1.5e2");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, Some(LiteralValue::Number(-150.0)));

        let tokens = lex("-Infinity");
        assert_eq!(
            tokens[0].value,
            Some(LiteralValue::Number(f64::NEG_INFINITY))
        );

        let tokens = lex("NaN");
        assert_eq!(tokens[0].kind, TokenKind::Number);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(kinds("null")[0], TokenKind::Null);
        assert_eq!(kinds("true")[0], TokenKind::Boolean);
        // keywords are case-sensitive
        assert_eq!(kinds("Null")[0], TokenKind::NamedContext);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("1 <= 2 && true || !false"),
            vec![
                TokenKind::Number,
                TokenKind::LogicalOperator,
                TokenKind::Number,
                TokenKind::LogicalOperator,
                TokenKind::Boolean,
                TokenKind::LogicalOperator,
                TokenKind::LogicalOperator,
                TokenKind::Boolean,
            ]
        );
    }

    #[test]
    fn test_single_ampersand_is_unexpected() {
        assert_eq!(kinds("1 & 2")[1], TokenKind::Unexpected);
        assert_eq!(kinds("1 = 2")[1], TokenKind::Unexpected);
    }

    #[test]
    fn test_property_name_only_after_dereference() {
        // two identifiers in a row: the second is illegal
        assert_eq!(kinds("a b")[1], TokenKind::Unexpected);
    }

    #[test]
    fn test_wildcard_positions() {
        assert_eq!(
            kinds("a.*"),
            vec![
                TokenKind::NamedContext,
                TokenKind::Dereference,
                TokenKind::Wildcard
            ]
        );
        assert_eq!(
            kinds("a[*]"),
            vec![
                TokenKind::NamedContext,
                TokenKind::StartIndex,
                TokenKind::Wildcard,
                TokenKind::EndIndex
            ]
        );
        // a bare wildcard is illegal
        assert_eq!(kinds("*")[0], TokenKind::Unexpected);
    }

    #[test]
    fn test_mismatched_closers() {
        assert_eq!(kinds("(1]")[2], TokenKind::Unexpected);
        assert_eq!(kinds("a[1)")[3], TokenKind::Unexpected);
        assert_eq!(kinds(")")[0], TokenKind::Unexpected);
    }

    #[test]
    fn test_separator_only_inside_parameters() {
        assert_eq!(kinds("(1, 2)")[2], TokenKind::Unexpected);
    }

    #[test]
    fn test_unclosed_tracking() {
        let mut lexer = Lexer::new("(a[");
        while lexer.next_token().is_some() {}
        assert!(lexer.has_unclosed_tokens());
    }

    #[test]
    fn test_identifier_with_dashes() {
        let tokens = lex("inputs.my-input");
        assert_eq!(tokens[2].kind, TokenKind::PropertyName);
        assert_eq!(tokens[2].raw, "my-input");
    }

    #[test]
    fn test_token_positions() {
        let tokens = lex("a  == 'b'");
        assert_eq!(tokens[0].index, 0);
        assert_eq!(tokens[1].index, 3);
        assert_eq!(tokens[2].index, 6);
    }
}
