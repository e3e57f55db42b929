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

//! Schema model
//!
//! A schema is a named set of definitions: scalar shapes with optional
//! predicates, sequences, mappings with well-known and loose properties,
//! and one-of unions. Every schema is seeded with the common definitions
//! (`any`, the scalars, `sequence`, `mapping`) so user schemas can
//! reference them without declaring them. User schemas are themselves
//! templates validated against the self-describing internal schema.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::core::error::{FlowError, Result};
use crate::core::error_code::EX0015;
use crate::expressions::parser::{FunctionInfo, NamedContextInfo};

use super::context::TemplateContext;
use super::internal_schema::internal_schema;
use super::reader::read_template;
use super::sources::{JsonObjectReader, ObjectReader};
use super::token::{MappingToken, TemplateToken};

/// The kinds a definition can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    /// Null scalar
    Null,
    /// Boolean scalar
    Boolean,
    /// Number scalar
    Number,
    /// String scalar
    String,
    /// Sequence of a declared item type
    Sequence,
    /// Mapping with well-known and/or loose properties
    Mapping,
    /// Union of referenced definitions
    OneOf,
}

/// Context lists shared by every definition kind
#[derive(Debug, Clone, Default)]
pub struct DefinitionContext {
    /// Optional description carried in the schema document
    pub description: Option<String>,
    /// Named contexts and function signatures allowed while reading
    pub reader: Vec<Rc<str>>,
    /// Named contexts and function signatures allowed while evaluating
    pub evaluator: Vec<Rc<str>>,
}

/// `null` definition
#[derive(Debug, Default)]
pub struct NullDefinition {
    /// Shared context lists
    pub context: DefinitionContext,
}

/// `boolean` definition
#[derive(Debug, Default)]
pub struct BooleanDefinition {
    /// Shared context lists
    pub context: DefinitionContext,
}

/// `number` definition
#[derive(Debug, Default)]
pub struct NumberDefinition {
    /// Shared context lists
    pub context: DefinitionContext,
}

/// `string` definition with optional predicates
///
/// `constant` and `require_non_empty` are mutually exclusive.
#[derive(Debug, Default)]
pub struct StringDefinition {
    /// Shared context lists
    pub context: DefinitionContext,
    /// Exact value the string must equal
    pub constant: Option<Rc<str>>,
    /// Whether `constant` compares case-insensitively
    pub ignore_case: bool,
    /// Whether the empty string is rejected
    pub require_non_empty: bool,
}

impl StringDefinition {
    /// Whether `value` satisfies the predicates
    pub fn is_match(&self, value: &str) -> bool {
        if let Some(constant) = &self.constant {
            if self.ignore_case {
                return constant.to_uppercase() == value.to_uppercase();
            }
            return &**constant == value;
        }
        if self.require_non_empty {
            return !value.is_empty();
        }
        true
    }
}

/// `sequence` definition
#[derive(Debug)]
pub struct SequenceDefinition {
    /// Shared context lists
    pub context: DefinitionContext,
    /// Definition name for the items
    pub item_type: Rc<str>,
}

/// One well-known mapping property
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    /// Definition name for the property value
    pub type_name: Rc<str>,
    /// Whether the property must be present
    pub required: bool,
}

/// `mapping` definition
///
/// At least one of `properties` and the loose key/value pair must be
/// defined; `properties: Some(vec![])` is "defined but empty".
#[derive(Debug, Default)]
pub struct MappingDefinition {
    /// Shared context lists
    pub context: DefinitionContext,
    /// Well-known properties in declaration order
    pub properties: Option<Vec<(Rc<str>, PropertyDefinition)>>,
    /// Definition name for keys not matching a well-known property
    pub loose_key_type: Option<Rc<str>>,
    /// Definition name for the values of loose keys
    pub loose_value_type: Option<Rc<str>>,
}

impl MappingDefinition {
    /// Look up a well-known property (case-insensitive)
    pub fn get_property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.as_ref().and_then(|properties| {
            properties
                .iter()
                .find(|(key, _)| key.to_uppercase() == name.to_uppercase())
                .map(|(_, property)| property)
        })
    }
}

/// `one-of` definition
#[derive(Debug)]
pub struct OneOfDefinition {
    /// Shared context lists
    pub context: DefinitionContext,
    /// Referenced definition names in declaration order
    pub one_of: Vec<Rc<str>>,
}

/// A schema definition
#[derive(Debug)]
pub enum Definition {
    /// Null scalar
    Null(NullDefinition),
    /// Boolean scalar
    Boolean(BooleanDefinition),
    /// Number scalar
    Number(NumberDefinition),
    /// String scalar
    String(StringDefinition),
    /// Sequence
    Sequence(SequenceDefinition),
    /// Mapping
    Mapping(MappingDefinition),
    /// Union
    OneOf(OneOfDefinition),
}

impl Definition {
    /// The definition's kind
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Null(_) => DefinitionKind::Null,
            Self::Boolean(_) => DefinitionKind::Boolean,
            Self::Number(_) => DefinitionKind::Number,
            Self::String(_) => DefinitionKind::String,
            Self::Sequence(_) => DefinitionKind::Sequence,
            Self::Mapping(_) => DefinitionKind::Mapping,
            Self::OneOf(_) => DefinitionKind::OneOf,
        }
    }

    /// The shared context lists
    pub fn context(&self) -> &DefinitionContext {
        match self {
            Self::Null(d) => &d.context,
            Self::Boolean(d) => &d.context,
            Self::Number(d) => &d.context,
            Self::String(d) => &d.context,
            Self::Sequence(d) => &d.context,
            Self::Mapping(d) => &d.context,
            Self::OneOf(d) => &d.context,
        }
    }

    /// Whether this is a scalar definition
    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind(),
            DefinitionKind::Null
                | DefinitionKind::Boolean
                | DefinitionKind::Number
                | DefinitionKind::String
        )
    }
}

/// Split context entries into named contexts and function signatures
///
/// An entry of the form `name(min,max)` declares a function; anything else
/// is a named context.
pub fn parse_context_entries(entries: &[Rc<str>]) -> (Vec<NamedContextInfo>, Vec<FunctionInfo>) {
    let mut named_contexts = Vec::new();
    let mut functions = Vec::new();
    for entry in entries {
        if let Some((name, tail)) = entry.split_once('(') {
            let arity: Vec<&str> = tail.trim_end_matches(')').split(',').collect();
            if arity.len() == 2 {
                if let (Ok(min), Ok(max)) = (
                    arity[0].trim().parse::<usize>(),
                    arity[1].trim().parse::<usize>(),
                ) {
                    functions.push(FunctionInfo::new(name.trim(), min, max));
                    continue;
                }
            }
            // malformed signature entries fall through as named contexts so
            // the schema author sees the failure at expression parse time
            named_contexts.push(NamedContextInfo::new(entry.clone()));
        } else {
            named_contexts.push(NamedContextInfo::new(entry.clone()));
        }
    }
    (named_contexts, functions)
}

/// A named, validated set of definitions
#[derive(Debug, Default)]
pub struct TemplateSchema {
    /// Schema version string, when the document declared one
    pub version: Option<String>,
    definitions: FxHashMap<String, Rc<Definition>>,
}

impl TemplateSchema {
    /// Create an empty schema (no common definitions; internal use)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema seeded with the common definitions
    ///
    /// `any`, `null`, `boolean`, `number`, `string`, `non-empty-string`,
    /// `sequence` (of any) and `mapping` (string keys to any) are available
    /// in every schema.
    pub fn with_common_definitions() -> Self {
        let mut schema = Self::new();
        let mut add = |name: &str, definition: Definition| {
            schema
                .definitions
                .insert(name.to_string(), Rc::new(definition));
        };
        add("null", Definition::Null(NullDefinition::default()));
        add("boolean", Definition::Boolean(BooleanDefinition::default()));
        add("number", Definition::Number(NumberDefinition::default()));
        add("string", Definition::String(StringDefinition::default()));
        add(
            "non-empty-string",
            Definition::String(StringDefinition {
                require_non_empty: true,
                ..StringDefinition::default()
            }),
        );
        add(
            "sequence",
            Definition::Sequence(SequenceDefinition {
                context: DefinitionContext::default(),
                item_type: Rc::from("any"),
            }),
        );
        add(
            "mapping",
            Definition::Mapping(MappingDefinition {
                loose_key_type: Some(Rc::from("string")),
                loose_value_type: Some(Rc::from("any")),
                ..MappingDefinition::default()
            }),
        );
        add(
            "any",
            Definition::OneOf(OneOfDefinition {
                context: DefinitionContext::default(),
                one_of: vec![
                    Rc::from("null"),
                    Rc::from("boolean"),
                    Rc::from("number"),
                    Rc::from("string"),
                    Rc::from("sequence"),
                    Rc::from("mapping"),
                ],
            }),
        );
        schema
    }

    /// Add a definition, rejecting duplicates
    pub fn add_definition(&mut self, name: impl Into<String>, definition: Definition) -> Result<()> {
        let name = name.into();
        if self.definitions.contains_key(&name) {
            return Err(FlowError::schema_definition(
                EX0015,
                format!("The definition '{name}' is already defined"),
                name,
            ));
        }
        self.definitions.insert(name, Rc::new(definition));
        Ok(())
    }

    /// Resolve a definition by name
    pub fn get_definition(&self, name: &str) -> Option<Rc<Definition>> {
        self.definitions.get(name).cloned()
    }

    /// All definition names (unordered)
    pub fn definition_names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    fn resolve(&self, name: &str, referenced_by: &str) -> Result<Rc<Definition>> {
        self.get_definition(name).ok_or_else(|| {
            FlowError::schema_definition(
                EX0015,
                format!("The definition '{referenced_by}' references the unknown type '{name}'"),
                referenced_by,
            )
        })
    }

    /// Cross-validate every definition
    pub fn validate(&self) -> Result<()> {
        let mut names: Vec<&String> = self.definitions.keys().collect();
        names.sort();
        for name in names {
            let definition = &self.definitions[name];
            self.validate_definition(name, definition)?;
        }
        Ok(())
    }

    fn validate_definition(&self, name: &str, definition: &Rc<Definition>) -> Result<()> {
        match &**definition {
            Definition::String(string) => {
                if string.constant.is_some() && string.require_non_empty {
                    return Err(FlowError::schema_definition(
                        EX0015,
                        format!(
                            "The definition '{name}' may not set both 'constant' and 'require-non-empty'"
                        ),
                        name,
                    ));
                }
            }
            Definition::Sequence(sequence) => {
                self.resolve(&sequence.item_type, name)?;
            }
            Definition::Mapping(mapping) => {
                if let Some(properties) = &mapping.properties {
                    for (_, property) in properties {
                        self.resolve(&property.type_name, name)?;
                    }
                }
                match (&mapping.loose_key_type, &mapping.loose_value_type) {
                    (None, None) => {
                        if mapping.properties.is_none() {
                            return Err(FlowError::schema_definition(
                                EX0015,
                                format!(
                                    "The definition '{name}' must define properties or a loose key type"
                                ),
                                name,
                            ));
                        }
                    }
                    (Some(loose_key), Some(loose_value)) => {
                        let key_definition = self.resolve(loose_key, name)?;
                        if self
                            .get_definitions_of_kind(&key_definition, DefinitionKind::String)
                            .is_empty()
                        {
                            return Err(FlowError::schema_definition(
                                EX0015,
                                format!(
                                    "The definition '{name}' loose key type '{loose_key}' must be a string"
                                ),
                                name,
                            ));
                        }
                        self.resolve(loose_value, name)?;
                    }
                    _ => {
                        return Err(FlowError::schema_definition(
                            EX0015,
                            format!(
                                "The definition '{name}' must define the loose key and value types together"
                            ),
                            name,
                        ));
                    }
                }
            }
            Definition::OneOf(one_of) => self.validate_one_of(name, one_of)?,
            _ => {}
        }
        Ok(())
    }

    fn validate_one_of(&self, name: &str, one_of: &OneOfDefinition) -> Result<()> {
        let error = |message: String| {
            Err(FlowError::schema_definition(EX0015, message, name))
        };

        let mut seen: Vec<&str> = Vec::new();
        let mut scalar_counts: FxHashMap<DefinitionKind, usize> = FxHashMap::default();
        let mut strings_without_constant = 0usize;
        let mut mappings: Vec<Rc<Definition>> = Vec::new();

        for reference in &one_of.one_of {
            if seen.iter().any(|s| *s == &**reference) {
                return error(format!(
                    "The definition '{name}' lists '{reference}' more than once"
                ));
            }
            seen.push(reference);
            let resolved = self.resolve(reference, name)?;
            if !resolved.context().reader.is_empty() {
                return error(format!(
                    "The one-of definition '{name}' may not reference '{reference}' which defines context"
                ));
            }
            match &*resolved {
                Definition::OneOf(_) => {
                    return error(format!(
                        "The one-of definition '{name}' may not reference the one-of '{reference}'"
                    ));
                }
                Definition::String(string) => {
                    if string.constant.is_none() {
                        strings_without_constant += 1;
                        if strings_without_constant > 1 {
                            return error(format!(
                                "The definition '{name}' may list at most one string without a constant"
                            ));
                        }
                    }
                }
                Definition::Mapping(_) => mappings.push(resolved.clone()),
                other => {
                    let count = scalar_counts.entry(other.kind()).or_insert(0);
                    *count += 1;
                    if *count > 1 {
                        return error(format!(
                            "The definition '{name}' may list at most one {:?} definition",
                            other.kind()
                        ));
                    }
                }
            }
        }

        if mappings.len() > 1 {
            for mapping in &mappings {
                let Definition::Mapping(mapping) = &**mapping else {
                    continue;
                };
                if mapping.loose_key_type.is_some() {
                    return error(format!(
                        "The definition '{name}' may not list multiple mappings when one declares loose keys"
                    ));
                }
                if mapping
                    .properties
                    .as_ref()
                    .map(|p| p.is_empty())
                    .unwrap_or(true)
                {
                    return error(format!(
                        "The definition '{name}' lists multiple mappings; each must declare properties to disambiguate"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Scalar definitions reachable from `definition`, expanding one-of once
    pub fn get_scalar_definitions(&self, definition: &Rc<Definition>) -> Vec<Rc<Definition>> {
        let mut result = Vec::new();
        match &**definition {
            Definition::OneOf(one_of) => {
                for reference in &one_of.one_of {
                    if let Some(resolved) = self.get_definition(reference) {
                        if resolved.is_scalar() {
                            result.push(resolved);
                        }
                    }
                }
            }
            _ if definition.is_scalar() => result.push(definition.clone()),
            _ => {}
        }
        result
    }

    /// Definitions of `kind` reachable from `definition`, expanding one-of
    /// once
    pub fn get_definitions_of_kind(
        &self,
        definition: &Rc<Definition>,
        kind: DefinitionKind,
    ) -> Vec<Rc<Definition>> {
        let mut result = Vec::new();
        match &**definition {
            Definition::OneOf(one_of) => {
                for reference in &one_of.one_of {
                    if let Some(resolved) = self.get_definition(reference) {
                        if resolved.kind() == kind {
                            result.push(resolved);
                        }
                    }
                }
            }
            _ if definition.kind() == kind => result.push(definition.clone()),
            _ => {}
        }
        result
    }

    /// Find `property` among the candidate mappings and filter the list
    ///
    /// Returns the property's value type from the first candidate defining
    /// it, and removes every candidate that does not define the property.
    /// When no candidate defines it, the list is left untouched.
    pub fn match_property_and_filter(
        &self,
        candidates: &mut Vec<Rc<Definition>>,
        property: &str,
    ) -> Option<Rc<str>> {
        let mut matched: Option<Rc<str>> = None;
        for candidate in candidates.iter() {
            if let Definition::Mapping(mapping) = &**candidate {
                if let Some(found) = mapping.get_property(property) {
                    matched = Some(found.type_name.clone());
                    break;
                }
            }
        }
        if matched.is_some() {
            candidates.retain(|candidate| match &**candidate {
                Definition::Mapping(mapping) => mapping.get_property(property).is_some(),
                _ => false,
            });
        }
        matched
    }

    /// Load and validate a user schema from an object-event source
    pub fn load(source: &mut dyn ObjectReader) -> Result<TemplateSchema> {
        let internal = internal_schema();
        let mut context = TemplateContext::new(internal);
        let result = read_template(&mut context, "template-schema", source, None)?;
        context.errors.check()?;
        let schema = Self::from_token(&result.value)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load and validate a user schema from JSON text
    pub fn load_json(text: &str) -> Result<TemplateSchema> {
        let document: serde_json::Value = serde_json::from_str(text)
            .map_err(|error| FlowError::schema(EX0015, format!("Invalid schema JSON: {error}")))?;
        let mut source = JsonObjectReader::new(&document);
        Self::load(&mut source)
    }

    /// Construct a schema from a token validated against the internal schema
    fn from_token(token: &Rc<TemplateToken>) -> Result<TemplateSchema> {
        let TemplateToken::Mapping(root) = &**token else {
            return Err(FlowError::schema(EX0015, "A schema must be a mapping"));
        };
        let mut schema = Self::with_common_definitions();
        for (key, value) in &root.pairs {
            match key.as_str() {
                Some("version") => {
                    schema.version = value.as_str().map(str::to_string);
                }
                Some("definitions") => {
                    let TemplateToken::Mapping(definitions) = &**value else {
                        return Err(FlowError::schema(EX0015, "'definitions' must be a mapping"));
                    };
                    for (name_token, definition_token) in &definitions.pairs {
                        let Some(name) = name_token.as_str() else {
                            return Err(FlowError::schema(
                                EX0015,
                                "Definition names must be strings",
                            ));
                        };
                        let definition = parse_definition(name, definition_token)?;
                        schema.add_definition(name, definition)?;
                    }
                }
                _ => {}
            }
        }
        Ok(schema)
    }
}

fn schema_error(name: &str, message: impl Into<String>) -> FlowError {
    FlowError::schema_definition(EX0015, message, name)
}

fn expect_mapping<'a>(
    name: &str,
    token: &'a Rc<TemplateToken>,
    what: &str,
) -> Result<&'a MappingToken> {
    match &**token {
        TemplateToken::Mapping(mapping) => Ok(mapping),
        _ => Err(schema_error(
            name,
            format!("The definition '{name}' {what} must be a mapping"),
        )),
    }
}

fn read_string_list(name: &str, token: &Rc<TemplateToken>, what: &str) -> Result<Vec<Rc<str>>> {
    let TemplateToken::Sequence(sequence) = &**token else {
        return Err(schema_error(
            name,
            format!("The definition '{name}' {what} must be a sequence of strings"),
        ));
    };
    let mut values = Vec::with_capacity(sequence.entries.len());
    for entry in &sequence.entries {
        match &**entry {
            TemplateToken::String(string) => values.push(string.value.clone()),
            _ => {
                return Err(schema_error(
                    name,
                    format!("The definition '{name}' {what} must contain only strings"),
                ))
            }
        }
    }
    Ok(values)
}

/// Parse one definition body from its schema token
fn parse_definition(name: &str, token: &Rc<TemplateToken>) -> Result<Definition> {
    let mapping = expect_mapping(name, token, "body")?;
    let mut context = DefinitionContext::default();
    let mut structure: Option<Definition> = None;

    for (key_token, value) in &mapping.pairs {
        let Some(key) = key_token.as_str() else {
            return Err(schema_error(name, "Definition keys must be strings"));
        };
        match key {
            "description" => {
                context.description = value.as_str().map(str::to_string);
            }
            "context" => {
                context.reader = read_string_list(name, value, "'context'")?;
            }
            "evaluator-context" => {
                context.evaluator = read_string_list(name, value, "'evaluator-context'")?;
            }
            "null" => {
                expect_mapping(name, value, "'null'")?;
                structure = Some(Definition::Null(NullDefinition::default()));
            }
            "boolean" => {
                expect_mapping(name, value, "'boolean'")?;
                structure = Some(Definition::Boolean(BooleanDefinition::default()));
            }
            "number" => {
                expect_mapping(name, value, "'number'")?;
                structure = Some(Definition::Number(NumberDefinition::default()));
            }
            "string" => {
                let body = expect_mapping(name, value, "'string'")?;
                let mut string = StringDefinition::default();
                for (property_key, property_value) in &body.pairs {
                    match property_key.as_str() {
                        Some("constant") => {
                            string.constant =
                                property_value.as_str().map(Rc::from);
                        }
                        Some("ignore-case") => {
                            if let TemplateToken::Boolean(b) = &**property_value {
                                string.ignore_case = b.value;
                            }
                        }
                        Some("require-non-empty") => {
                            if let TemplateToken::Boolean(b) = &**property_value {
                                string.require_non_empty = b.value;
                            }
                        }
                        _ => {}
                    }
                }
                structure = Some(Definition::String(string));
            }
            "sequence" => {
                let body = expect_mapping(name, value, "'sequence'")?;
                let item_type = body
                    .get("item-type")
                    .and_then(|t| t.as_str().map(Rc::from))
                    .ok_or_else(|| {
                        schema_error(
                            name,
                            format!("The definition '{name}' sequence must declare 'item-type'"),
                        )
                    })?;
                structure = Some(Definition::Sequence(SequenceDefinition {
                    context: DefinitionContext::default(),
                    item_type,
                }));
            }
            "mapping" => {
                let body = expect_mapping(name, value, "'mapping'")?;
                let mut mapping_definition = MappingDefinition::default();
                for (property_key, property_value) in &body.pairs {
                    match property_key.as_str() {
                        Some("properties") => {
                            let properties = expect_mapping(name, property_value, "'properties'")?;
                            let mut parsed = Vec::new();
                            for (property_name, property_type) in &properties.pairs {
                                let Some(property_name) = property_name.as_str() else {
                                    return Err(schema_error(
                                        name,
                                        "Property names must be strings",
                                    ));
                                };
                                parsed.push((
                                    Rc::from(property_name),
                                    parse_property(name, property_type)?,
                                ));
                            }
                            mapping_definition.properties = Some(parsed);
                        }
                        Some("loose-key-type") => {
                            mapping_definition.loose_key_type =
                                property_value.as_str().map(Rc::from);
                        }
                        Some("loose-value-type") => {
                            mapping_definition.loose_value_type =
                                property_value.as_str().map(Rc::from);
                        }
                        _ => {}
                    }
                }
                structure = Some(Definition::Mapping(mapping_definition));
            }
            "one-of" => {
                let references = read_string_list(name, value, "'one-of'")?;
                structure = Some(Definition::OneOf(OneOfDefinition {
                    context: DefinitionContext::default(),
                    one_of: references,
                }));
            }
            _ => {}
        }
    }

    let Some(mut definition) = structure else {
        return Err(schema_error(
            name,
            format!("The definition '{name}' does not declare a structure"),
        ));
    };
    match &mut definition {
        Definition::Null(d) => d.context = context,
        Definition::Boolean(d) => d.context = context,
        Definition::Number(d) => d.context = context,
        Definition::String(d) => d.context = context,
        Definition::Sequence(d) => d.context = context,
        Definition::Mapping(d) => d.context = context,
        Definition::OneOf(d) => d.context = context,
    }
    Ok(definition)
}

/// Parse a property value: a bare type name or `{type, required}`
fn parse_property(name: &str, token: &Rc<TemplateToken>) -> Result<PropertyDefinition> {
    match &**token {
        TemplateToken::String(string) => Ok(PropertyDefinition {
            type_name: string.value.clone(),
            required: false,
        }),
        TemplateToken::Mapping(mapping) => {
            let type_name = mapping
                .get("type")
                .and_then(|t| t.as_str().map(Rc::from))
                .ok_or_else(|| {
                    schema_error(name, format!("A property of '{name}' is missing 'type'"))
                })?;
            let required = mapping
                .get("required")
                .map(|t| matches!(&*t, TemplateToken::Boolean(b) if b.value))
                .unwrap_or(false);
            Ok(PropertyDefinition {
                type_name,
                required,
            })
        }
        _ => Err(schema_error(
            name,
            format!("A property of '{name}' must be a type name or a mapping"),
        )),
    }
}
