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

//! Template token tree
//!
//! Tokens are the reader's output and the unraveler's input: a tagged sum
//! over scalars, sequences, mappings and the two expression forms. Every
//! token carries optional provenance for diagnostics. Trees are immutable
//! once read; mappings and sequences expose the expression subsystem's
//! collection capabilities without copying.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::error::SourceLocation;
use crate::core::memory::{string_cost, MIN_OBJECT_SIZE};
use crate::expressions::value::{
    number_to_string, ArrayCompat, ArrayValue, FlowValue, ObjectCompat, ObjectValue,
};

/// Provenance carried by every token
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TokenMeta {
    /// Identifier of the source file in the context's file table
    pub file_id: Option<u32>,
    /// Line/column within the source file
    pub location: Option<SourceLocation>,
}

impl TokenMeta {
    /// Create provenance from its parts
    pub fn new(file_id: Option<u32>, location: Option<SourceLocation>) -> Self {
        Self { file_id, location }
    }
}

/// `null`
#[derive(Debug)]
pub struct NullToken {
    /// Provenance
    pub meta: TokenMeta,
}

/// `true` / `false`
#[derive(Debug)]
pub struct BooleanToken {
    /// Provenance
    pub meta: TokenMeta,
    /// The value
    pub value: bool,
}

/// IEEE-754 double
#[derive(Debug)]
pub struct NumberToken {
    /// Provenance
    pub meta: TokenMeta,
    /// The value
    pub value: f64,
}

/// String scalar
#[derive(Debug)]
pub struct StringToken {
    /// Provenance
    pub meta: TokenMeta,
    /// The value
    pub value: Rc<str>,
}

/// Ordered sequence of tokens
#[derive(Debug)]
pub struct SequenceToken {
    /// Provenance
    pub meta: TokenMeta,
    /// Items in declaration order
    pub entries: Vec<Rc<TemplateToken>>,
}

/// Ordered mapping of scalar keys to tokens
///
/// Keys are usually strings but may be expression tokens; lookup through
/// the object capability considers string keys only and is
/// case-insensitive via a lazily built upper-cased index.
#[derive(Debug)]
pub struct MappingToken {
    /// Provenance
    pub meta: TokenMeta,
    /// Pairs in declaration order
    pub pairs: Vec<(Rc<TemplateToken>, Rc<TemplateToken>)>,
    index: RefCell<Option<FxHashMap<String, usize>>>,
}

/// `${{ expression }}`
#[derive(Debug)]
pub struct BasicExpressionToken {
    /// Provenance
    pub meta: TokenMeta,
    /// The raw expression text between the markers, trimmed
    pub expression: Rc<str>,
}

/// `${{ insert }}` directive
#[derive(Debug)]
pub struct InsertExpressionToken {
    /// Provenance
    pub meta: TokenMeta,
}

/// Any node of a template token tree
#[derive(Debug)]
pub enum TemplateToken {
    /// Null scalar
    Null(NullToken),
    /// Boolean scalar
    Boolean(BooleanToken),
    /// Number scalar
    Number(NumberToken),
    /// String scalar
    String(StringToken),
    /// Sequence
    Sequence(SequenceToken),
    /// Mapping
    Mapping(MappingToken),
    /// Embedded expression
    BasicExpression(BasicExpressionToken),
    /// Insertion directive
    InsertExpression(InsertExpressionToken),
}

impl TemplateToken {
    /// Create a null token
    pub fn null(meta: TokenMeta) -> Rc<Self> {
        Rc::new(Self::Null(NullToken { meta }))
    }

    /// Create a boolean token
    pub fn boolean(meta: TokenMeta, value: bool) -> Rc<Self> {
        Rc::new(Self::Boolean(BooleanToken { meta, value }))
    }

    /// Create a number token
    pub fn number(meta: TokenMeta, value: f64) -> Rc<Self> {
        Rc::new(Self::Number(NumberToken { meta, value }))
    }

    /// Create a string token
    pub fn string(meta: TokenMeta, value: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(Self::String(StringToken {
            meta,
            value: value.into(),
        }))
    }

    /// Create a sequence token
    pub fn sequence(meta: TokenMeta, entries: Vec<Rc<TemplateToken>>) -> Rc<Self> {
        Rc::new(Self::Sequence(SequenceToken { meta, entries }))
    }

    /// Create a mapping token
    pub fn mapping(
        meta: TokenMeta,
        pairs: Vec<(Rc<TemplateToken>, Rc<TemplateToken>)>,
    ) -> Rc<Self> {
        Rc::new(Self::Mapping(MappingToken {
            meta,
            pairs,
            index: RefCell::new(None),
        }))
    }

    /// Create a basic-expression token
    pub fn basic_expression(meta: TokenMeta, expression: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(Self::BasicExpression(BasicExpressionToken {
            meta,
            expression: expression.into(),
        }))
    }

    /// Create an insert-expression token
    pub fn insert_expression(meta: TokenMeta) -> Rc<Self> {
        Rc::new(Self::InsertExpression(InsertExpressionToken { meta }))
    }

    /// The token's provenance
    pub fn meta(&self) -> TokenMeta {
        match self {
            Self::Null(t) => t.meta,
            Self::Boolean(t) => t.meta,
            Self::Number(t) => t.meta,
            Self::String(t) => t.meta,
            Self::Sequence(t) => t.meta,
            Self::Mapping(t) => t.meta,
            Self::BasicExpression(t) => t.meta,
            Self::InsertExpression(t) => t.meta,
        }
    }

    /// Human-readable kind name
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
            Self::BasicExpression(_) => "expression",
            Self::InsertExpression(_) => "directive",
        }
    }

    /// Whether the token is a scalar (including the expression forms)
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Sequence(_) | Self::Mapping(_))
    }

    /// Whether the token is a plain literal scalar
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Null(_) | Self::Boolean(_) | Self::Number(_) | Self::String(_)
        )
    }

    /// Whether the token is one of the expression forms
    pub fn is_expression(&self) -> bool {
        matches!(self, Self::BasicExpression(_) | Self::InsertExpression(_))
    }

    /// The string value when this is a string token
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(t) => Some(&t.value),
            _ => None,
        }
    }

    /// Scalar display form, used in diagnostics and literal fallbacks
    pub fn display_value(&self) -> String {
        match self {
            Self::Null(_) => String::new(),
            Self::Boolean(t) => t.value.to_string(),
            Self::Number(t) => number_to_string(t.value),
            Self::String(t) => t.value.to_string(),
            Self::Sequence(_) => "Sequence".to_string(),
            Self::Mapping(_) => "Mapping".to_string(),
            Self::BasicExpression(t) => format!("${{{{ {} }}}}", t.expression),
            Self::InsertExpression(_) => "${{ insert }}".to_string(),
        }
    }

    /// Approximate byte cost; `deep` traverses children once
    pub fn byte_size(&self, deep: bool) -> usize {
        fn shallow(token: &TemplateToken) -> usize {
            match token {
                TemplateToken::String(t) => MIN_OBJECT_SIZE + string_cost(&t.value),
                TemplateToken::BasicExpression(t) => MIN_OBJECT_SIZE + string_cost(&t.expression),
                _ => MIN_OBJECT_SIZE,
            }
        }

        if !deep {
            return shallow(self);
        }
        let mut total = 0usize;
        let mut pending: Vec<&TemplateToken> = vec![self];
        while let Some(token) = pending.pop() {
            total = total.saturating_add(shallow(token));
            match token {
                TemplateToken::Sequence(sequence) => {
                    for entry in &sequence.entries {
                        pending.push(entry);
                    }
                }
                TemplateToken::Mapping(mapping) => {
                    for (key, value) in &mapping.pairs {
                        pending.push(key);
                        pending.push(value);
                    }
                }
                _ => {}
            }
        }
        total
    }

    /// Convert a token into a canonical value without copying collections
    pub fn to_flow_value(token: &Rc<TemplateToken>) -> FlowValue {
        match &**token {
            Self::Null(_) => FlowValue::Null,
            Self::Boolean(t) => FlowValue::Boolean(t.value),
            Self::Number(t) => FlowValue::Number(t.value),
            Self::String(t) => FlowValue::String(t.value.clone()),
            Self::Sequence(_) => FlowValue::Array(Rc::new(SequenceCompat {
                token: token.clone(),
            })),
            Self::Mapping(_) => FlowValue::Object(Rc::new(MappingCompat {
                token: token.clone(),
            })),
            // expression tokens surface as their source text
            Self::BasicExpression(_) | Self::InsertExpression(_) => {
                FlowValue::string(token.display_value().as_str())
            }
        }
    }

    /// Deep conversion of a canonical value into a fresh token tree
    ///
    /// Created tokens inherit `meta` (the provenance of the expression that
    /// produced the value).
    pub fn from_flow_value(value: &FlowValue, meta: TokenMeta) -> Rc<TemplateToken> {
        match value {
            FlowValue::Null => Self::null(meta),
            FlowValue::Boolean(b) => Self::boolean(meta, *b),
            FlowValue::Number(n) => Self::number(meta, *n),
            FlowValue::String(s) => Self::string(meta, s.clone()),
            FlowValue::Array(array) => {
                let mut entries = Vec::with_capacity(array.len());
                for position in 0..array.len() {
                    let item = array.get(position).unwrap_or(FlowValue::Null);
                    entries.push(Self::from_flow_value(&item, meta));
                }
                Self::sequence(meta, entries)
            }
            FlowValue::Object(object) => {
                let mut pairs = Vec::new();
                for key in object.keys() {
                    let item = object.get(&key).unwrap_or(FlowValue::Null);
                    pairs.push((
                        Self::string(meta, key),
                        Self::from_flow_value(&item, meta),
                    ));
                }
                Self::mapping(meta, pairs)
            }
        }
    }
}

impl MappingToken {
    fn lookup(&self, key: &str) -> Option<usize> {
        let mut index = self.index.borrow_mut();
        let map = index.get_or_insert_with(|| {
            let mut map = FxHashMap::default();
            for (position, (pair_key, _)) in self.pairs.iter().enumerate() {
                if let TemplateToken::String(string_key) = &**pair_key {
                    map.entry(string_key.value.to_uppercase()).or_insert(position);
                }
            }
            map
        });
        map.get(&key.to_uppercase()).copied()
    }

    /// Value for a string key (case-insensitive)
    pub fn get(&self, key: &str) -> Option<Rc<TemplateToken>> {
        self.lookup(key).map(|position| self.pairs[position].1.clone())
    }
}

struct SequenceCompat {
    token: Rc<TemplateToken>,
}

impl std::fmt::Debug for SequenceCompat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SequenceCompat")
    }
}

impl SequenceCompat {
    fn sequence(&self) -> &SequenceToken {
        match &*self.token {
            TemplateToken::Sequence(sequence) => sequence,
            _ => unreachable!("SequenceCompat wraps a sequence token"),
        }
    }
}

impl ArrayCompat for SequenceCompat {
    fn len(&self) -> usize {
        self.sequence().entries.len()
    }

    fn get(&self, index: usize) -> Option<FlowValue> {
        self.sequence()
            .entries
            .get(index)
            .map(TemplateToken::to_flow_value)
    }

    fn identity(&self) -> usize {
        Rc::as_ptr(&self.token) as *const () as usize
    }
}

struct MappingCompat {
    token: Rc<TemplateToken>,
}

impl std::fmt::Debug for MappingCompat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MappingCompat")
    }
}

impl MappingCompat {
    fn mapping(&self) -> &MappingToken {
        match &*self.token {
            TemplateToken::Mapping(mapping) => mapping,
            _ => unreachable!("MappingCompat wraps a mapping token"),
        }
    }
}

impl ObjectCompat for MappingCompat {
    fn len(&self) -> usize {
        self.mapping().pairs.len()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.mapping().lookup(key).is_some()
    }

    fn get(&self, key: &str) -> Option<FlowValue> {
        self.mapping()
            .get(key)
            .map(|token| TemplateToken::to_flow_value(&token))
    }

    fn keys(&self) -> Vec<Rc<str>> {
        self.mapping()
            .pairs
            .iter()
            .filter_map(|(key, _)| match &**key {
                TemplateToken::String(string_key) => Some(string_key.value.clone()),
                _ => None,
            })
            .collect()
    }

    fn identity(&self) -> usize {
        Rc::as_ptr(&self.token) as *const () as usize
    }
}

/// Deep conversion of a token into owned canonical collections
///
/// Used when a result must outlive its backing token tree (for example the
/// CLI rendering a mapping into JSON). Expression tokens surface as their
/// source text; non-string mapping keys are skipped.
pub fn to_owned_flow_value(token: &Rc<TemplateToken>) -> FlowValue {
    match &**token {
        TemplateToken::Sequence(sequence) => {
            let mut array = ArrayValue::new();
            for entry in &sequence.entries {
                array.push(to_owned_flow_value(entry));
            }
            FlowValue::Array(Rc::new(array))
        }
        TemplateToken::Mapping(mapping) => {
            let mut object = ObjectValue::new();
            for (key, value) in &mapping.pairs {
                if let TemplateToken::String(string_key) = &**key {
                    if !object.contains_key(&string_key.value) {
                        object.push(string_key.value.clone(), to_owned_flow_value(value));
                    }
                }
            }
            FlowValue::Object(Rc::new(object))
        }
        _ => TemplateToken::to_flow_value(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::value::Collection;

    fn meta() -> TokenMeta {
        TokenMeta::default()
    }

    #[test]
    fn test_mapping_lookup_is_case_insensitive() {
        let mapping = TemplateToken::mapping(
            meta(),
            vec![
                (
                    TemplateToken::string(meta(), "Script"),
                    TemplateToken::string(meta(), "build"),
                ),
                (
                    TemplateToken::string(meta(), "name"),
                    TemplateToken::string(meta(), "Build it"),
                ),
            ],
        );
        let TemplateToken::Mapping(inner) = &*mapping else {
            panic!("expected mapping");
        };
        assert_eq!(inner.get("script").unwrap().as_str(), Some("build"));
        assert_eq!(inner.get("NAME").unwrap().as_str(), Some("Build it"));
        assert!(inner.get("missing").is_none());
    }

    #[test]
    fn test_token_as_object_capability() {
        let mapping = TemplateToken::mapping(
            meta(),
            vec![(
                TemplateToken::string(meta(), "count"),
                TemplateToken::number(meta(), 3.0),
            )],
        );
        let value = TemplateToken::to_flow_value(&mapping);
        let Some(Collection::Object(object)) = value.collection() else {
            panic!("expected object capability");
        };
        assert_eq!(object.len(), 1);
        assert_eq!(object.get("COUNT"), Some(FlowValue::Number(3.0)));
    }

    #[test]
    fn test_identity_is_stable_across_conversions() {
        let mapping = TemplateToken::mapping(meta(), vec![]);
        let first = TemplateToken::to_flow_value(&mapping);
        let second = TemplateToken::to_flow_value(&mapping);
        assert!(crate::expressions::abstract_equal(&first, &second));
    }

    #[test]
    fn test_from_flow_value_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"steps":[{"script":"lint"}],"count":2}"#).unwrap();
        let value = FlowValue::from_json(&json);
        let token = TemplateToken::from_flow_value(&value, meta());
        let TemplateToken::Mapping(mapping) = &*token else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs.len(), 2);
        let steps = mapping.get("steps").unwrap();
        let TemplateToken::Sequence(sequence) = &*steps else {
            panic!("expected sequence");
        };
        assert_eq!(sequence.entries.len(), 1);
    }

    #[test]
    fn test_byte_size() {
        let token = TemplateToken::string(meta(), "ab");
        assert_eq!(token.byte_size(false), MIN_OBJECT_SIZE + string_cost("ab"));

        let sequence = TemplateToken::sequence(
            meta(),
            vec![
                TemplateToken::string(meta(), "ab"),
                TemplateToken::null(meta()),
            ],
        );
        assert_eq!(sequence.byte_size(false), MIN_OBJECT_SIZE);
        assert_eq!(
            sequence.byte_size(true),
            MIN_OBJECT_SIZE + (MIN_OBJECT_SIZE + string_cost("ab")) + MIN_OBJECT_SIZE
        );
    }

    #[test]
    fn test_display_value() {
        assert_eq!(
            TemplateToken::basic_expression(meta(), "github.sha").display_value(),
            "${{ github.sha }}"
        );
        assert_eq!(
            TemplateToken::insert_expression(meta()).display_value(),
            "${{ insert }}"
        );
        assert_eq!(TemplateToken::number(meta(), 1.0).display_value(), "1");
    }
}
