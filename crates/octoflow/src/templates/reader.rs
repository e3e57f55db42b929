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

//! Schema-validating template reader
//!
//! Consumes an object-event source and produces a token tree. Embedded
//! `${{ … }}` expressions are recognized and syntax-checked against the
//! definition's allowed context; `${{ insert }}` directives are recognized
//! in mapping-key position. Validation failures are collected on the
//! context and the offending sub-tree is skipped, so a single bad value
//! does not abort the read; memory and depth violations always do.

use std::rc::Rc;

use crate::core::error::{FlowError, Result, SourceLocation};
use crate::core::error_code::{EX0015, EX0016};
use crate::expressions::ast::{ExpressionNode, LiteralValue};
use crate::expressions::parser::parse as parse_expression;

use super::context::TemplateContext;
use super::schema::{parse_context_entries, Definition, DefinitionKind};
use super::sources::{EventMeta, ObjectReader, ScalarEvent, ScalarValue};
use super::token::{TemplateToken, TokenMeta};

const EXPRESSION_START: &str = "${{";
const EXPRESSION_END: &str = "}}";
const INSERT_DIRECTIVE: &str = "insert";

/// Result of reading one template
#[derive(Debug)]
pub struct ReadResult {
    /// The token tree
    pub value: Rc<TemplateToken>,
    /// Bytes charged to the memory counter while reading
    pub bytes: usize,
}

/// Read a template of `type_name` from `source`
///
/// Validation errors are collected on `context.errors`; the returned tree
/// reflects whatever could be read. The reported `bytes` belong to the
/// tree and should be handed to the unraveler for release when the tree is
/// replaced by its expansion.
pub fn read_template(
    context: &mut TemplateContext,
    type_name: &str,
    source: &mut dyn ObjectReader,
    file_name: Option<&str>,
) -> Result<ReadResult> {
    let root = context.schema.get_definition(type_name).ok_or_else(|| {
        FlowError::schema(
            EX0015,
            format!("The schema does not define the type '{type_name}'"),
        )
    })?;
    let file_id = file_name.map(|name| context.get_file_id(name));
    let bytes_before = context.memory.current_bytes();

    let value = {
        let mut reader = TemplateReader {
            context: &mut *context,
            source,
            file_id,
        };
        reader.source.validate_start()?;
        let info = DefinitionInfo::root(root);
        let value = reader.read_value(&info)?;
        reader.source.validate_end()?;
        value
    };

    let bytes = context.memory.current_bytes().saturating_sub(bytes_before);
    Ok(ReadResult { value, bytes })
}

/// A definition plus the allowed context accumulated along the path
#[derive(Clone)]
struct DefinitionInfo {
    definition: Rc<Definition>,
    allowed_context: Rc<Vec<Rc<str>>>,
}

impl DefinitionInfo {
    fn root(definition: Rc<Definition>) -> Self {
        let allowed_context = Rc::new(definition.context().reader.clone());
        Self {
            definition,
            allowed_context,
        }
    }

    fn child(&self, definition: Rc<Definition>) -> Self {
        let own = &definition.context().reader;
        let allowed_context = if own.is_empty() {
            self.allowed_context.clone()
        } else {
            let mut merged: Vec<Rc<str>> = (*self.allowed_context).clone();
            for entry in own {
                if !merged
                    .iter()
                    .any(|existing| existing.eq_ignore_ascii_case(entry))
                {
                    merged.push(entry.clone());
                }
            }
            Rc::new(merged)
        };
        Self {
            definition,
            allowed_context,
        }
    }
}

/// One scanned segment of a scalar value
enum Segment {
    Literal(String),
    Expression(String),
    Directive,
}

struct TemplateReader<'a> {
    context: &'a mut TemplateContext,
    source: &'a mut dyn ObjectReader,
    file_id: Option<u32>,
}

impl TemplateReader<'_> {
    fn token_meta(&self, event: EventMeta) -> TokenMeta {
        let location = match (event.line, event.column) {
            (Some(line), Some(column)) => Some(SourceLocation::new(line, column)),
            _ => None,
        };
        TokenMeta::new(self.file_id, location)
    }

    fn child_info(&self, parent: &DefinitionInfo, type_name: &str) -> DefinitionInfo {
        let definition = self
            .context
            .schema
            .get_definition(type_name)
            .or_else(|| self.context.schema.get_definition("any"))
            .unwrap_or_else(|| parent.definition.clone());
        parent.child(definition)
    }

    fn any_info(&self, parent: &DefinitionInfo) -> DefinitionInfo {
        self.child_info(parent, "any")
    }

    fn read_value(&mut self, info: &DefinitionInfo) -> Result<Rc<TemplateToken>> {
        if let Some(event) = self.source.allow_literal()? {
            let token = self.parse_scalar(event, info, false);
            if !token.is_expression() {
                self.validate_scalar(&token, info);
            }
            self.context.memory.add_token(&token, false)?;
            return Ok(token);
        }

        if let Some(event) = self.source.allow_sequence_start()? {
            let meta = self.token_meta(event);
            return self.read_sequence(meta, info);
        }

        if let Some(event) = self.source.allow_mapping_start()? {
            let meta = self.token_meta(event);
            return self.read_mapping(meta, info);
        }

        Err(FlowError::system(
            EX0016,
            "Expected a literal, a sequence start, or a mapping start",
        ))
    }

    fn validate_scalar(&mut self, token: &Rc<TemplateToken>, info: &DefinitionInfo) {
        let scalars = self
            .context
            .schema
            .get_scalar_definitions(&info.definition);
        let matched = scalars.iter().any(|definition| match (&**definition, &**token) {
            (Definition::Null(_), TemplateToken::Null(_)) => true,
            (Definition::Boolean(_), TemplateToken::Boolean(_)) => true,
            (Definition::Number(_), TemplateToken::Number(_)) => true,
            (Definition::String(string), TemplateToken::String(value)) => {
                string.is_match(&value.value)
            }
            _ => false,
        });
        if !matched {
            self.context.add_error(
                token.meta(),
                format!("Unexpected value '{}'", token.display_value()),
            );
        }
    }

    fn read_sequence(
        &mut self,
        meta: TokenMeta,
        info: &DefinitionInfo,
    ) -> Result<Rc<TemplateToken>> {
        self.context.memory.increment_depth()?;
        let mut entries = Vec::new();
        let sequences = self
            .context
            .schema
            .get_definitions_of_kind(&info.definition, DefinitionKind::Sequence);

        match sequences.first() {
            None => {
                self.context.add_error(meta, "A sequence was not expected");
                self.skip_sequence_remainder()?;
            }
            Some(sequence) => {
                let item_type = match &**sequence {
                    Definition::Sequence(definition) => definition.item_type.clone(),
                    _ => Rc::from("any"),
                };
                let item_info = self.child_info(&info.child(sequence.clone()), &item_type);
                loop {
                    if self.source.allow_sequence_end() {
                        break;
                    }
                    entries.push(self.read_value(&item_info)?);
                }
            }
        }

        self.context.memory.decrement_depth();
        let token = TemplateToken::sequence(meta, entries);
        self.context.memory.add_token(&token, false)?;
        Ok(token)
    }

    fn read_mapping(
        &mut self,
        meta: TokenMeta,
        info: &DefinitionInfo,
    ) -> Result<Rc<TemplateToken>> {
        self.context.memory.increment_depth()?;
        let mut pairs = Vec::new();
        let mut candidates = self
            .context
            .schema
            .get_definitions_of_kind(&info.definition, DefinitionKind::Mapping);

        if candidates.is_empty() {
            self.context.add_error(meta, "A mapping was not expected");
            self.skip_mapping_remainder()?;
        } else {
            let loose_only = candidates.len() == 1
                && match &*candidates[0] {
                    Definition::Mapping(mapping) => {
                        mapping.loose_key_type.is_some()
                            && mapping
                                .properties
                                .as_ref()
                                .map(|properties| properties.is_empty())
                                .unwrap_or(true)
                    }
                    _ => false,
                };
            if loose_only {
                let definition = candidates.remove(0);
                self.read_loose_pairs(&mut pairs, info, &definition)?;
            } else {
                self.read_well_known_pairs(&mut pairs, info, &mut candidates)?;
            }
        }

        self.context.memory.decrement_depth();
        let token = TemplateToken::mapping(meta, pairs);
        self.context.memory.add_token(&token, false)?;
        Ok(token)
    }

    fn read_loose_pairs(
        &mut self,
        pairs: &mut Vec<(Rc<TemplateToken>, Rc<TemplateToken>)>,
        info: &DefinitionInfo,
        definition: &Rc<Definition>,
    ) -> Result<()> {
        let Definition::Mapping(mapping) = &**definition else {
            return Err(FlowError::system(EX0016, "Expected a mapping definition"));
        };
        let mapping_info = info.child(definition.clone());
        let key_type = mapping.loose_key_type.clone().unwrap_or_else(|| Rc::from("string"));
        let value_type = mapping
            .loose_value_type
            .clone()
            .unwrap_or_else(|| Rc::from("any"));
        let key_info = self.child_info(&mapping_info, &key_type);
        let value_info = self.child_info(&mapping_info, &value_type);
        let mut seen: Vec<String> = Vec::new();

        loop {
            if self.source.allow_mapping_end() {
                return Ok(());
            }
            let Some(event) = self.source.allow_literal()? else {
                return Err(FlowError::system(EX0016, "Expected a mapping key"));
            };
            let key = self.parse_scalar(event, &mapping_info, true);
            self.context.memory.add_token(&key, false)?;

            if key.is_expression() {
                let value = {
                    let any = self.any_info(&mapping_info);
                    self.read_value(&any)?
                };
                pairs.push((key, value));
                continue;
            }

            let key_text = key.display_value();
            if seen.iter().any(|existing| *existing == key_text.to_uppercase()) {
                self.context
                    .add_error(key.meta(), format!("'{key_text}' is already defined"));
                self.skip_value()?;
                continue;
            }
            seen.push(key_text.to_uppercase());

            self.validate_scalar(&key, &key_info);
            let value = self.read_value(&value_info)?;
            pairs.push((key, value));
        }
    }

    fn read_well_known_pairs(
        &mut self,
        pairs: &mut Vec<(Rc<TemplateToken>, Rc<TemplateToken>)>,
        info: &DefinitionInfo,
        candidates: &mut Vec<Rc<Definition>>,
    ) -> Result<()> {
        let mapping_info = info.child(candidates[0].clone());
        let loose = match &*candidates[0] {
            Definition::Mapping(mapping) => mapping
                .loose_key_type
                .clone()
                .zip(mapping.loose_value_type.clone()),
            _ => None,
        };
        let mut seen: Vec<String> = Vec::new();
        let mut has_expression_key = false;

        loop {
            if self.source.allow_mapping_end() {
                break;
            }
            let Some(event) = self.source.allow_literal()? else {
                return Err(FlowError::system(EX0016, "Expected a mapping key"));
            };
            let key = self.parse_scalar(event, &mapping_info, true);
            self.context.memory.add_token(&key, false)?;

            if key.is_expression() {
                has_expression_key = true;
                let value = {
                    let any = self.any_info(&mapping_info);
                    self.read_value(&any)?
                };
                pairs.push((key, value));
                continue;
            }

            let key_text = key.display_value();
            if seen.iter().any(|existing| *existing == key_text.to_uppercase()) {
                self.context
                    .add_error(key.meta(), format!("'{key_text}' is already defined"));
                self.skip_value()?;
                continue;
            }
            seen.push(key_text.to_uppercase());

            let matched = self
                .context
                .schema
                .match_property_and_filter(candidates, &key_text);
            match matched {
                Some(type_name) => {
                    let value_info = self.child_info(&mapping_info, &type_name);
                    let value = self.read_value(&value_info)?;
                    pairs.push((key, value));
                }
                None => match &loose {
                    Some((loose_key, loose_value)) => {
                        let key_info = self.child_info(&mapping_info, loose_key);
                        self.validate_scalar(&key, &key_info);
                        let value_info = self.child_info(&mapping_info, loose_value);
                        let value = self.read_value(&value_info)?;
                        pairs.push((key, value));
                    }
                    None => {
                        self.context
                            .add_error(key.meta(), format!("Unexpected value '{key_text}'"));
                        self.skip_value()?;
                    }
                },
            }
        }

        if !has_expression_key {
            if candidates.len() > 1 {
                let hint = disambiguating_properties(candidates);
                self.context.add_error(
                    TokenMeta::new(self.file_id, None),
                    format!(
                        "There's not enough info to determine what you meant. Add one of these properties: {}",
                        hint.join(", ")
                    ),
                );
            } else if let Some(candidate) = candidates.first() {
                if let Definition::Mapping(mapping) = &**candidate {
                    if let Some(properties) = &mapping.properties {
                        for (name, property) in properties {
                            if property.required
                                && !seen.iter().any(|s| *s == name.to_uppercase())
                            {
                                self.context.add_error(
                                    TokenMeta::new(self.file_id, None),
                                    format!("Required property is missing: {name}"),
                                );
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Consume one value without validating it
    fn skip_value(&mut self) -> Result<()> {
        if self.source.allow_literal()?.is_some() {
            return Ok(());
        }
        if self.source.allow_sequence_start()?.is_some() {
            self.context.memory.increment_depth()?;
            self.skip_sequence_remainder()?;
            self.context.memory.decrement_depth();
            return Ok(());
        }
        if self.source.allow_mapping_start()?.is_some() {
            self.context.memory.increment_depth()?;
            self.skip_mapping_remainder()?;
            self.context.memory.decrement_depth();
            return Ok(());
        }
        Err(FlowError::system(EX0016, "Expected a value to skip"))
    }

    fn skip_sequence_remainder(&mut self) -> Result<()> {
        loop {
            if self.source.allow_sequence_end() {
                return Ok(());
            }
            self.skip_value()?;
        }
    }

    fn skip_mapping_remainder(&mut self) -> Result<()> {
        loop {
            if self.source.allow_mapping_end() {
                return Ok(());
            }
            // key then value
            self.skip_value()?;
            self.skip_value()?;
        }
    }

    /// Split a scalar into literal/expression segments and produce a token
    fn parse_scalar(
        &mut self,
        event: ScalarEvent,
        info: &DefinitionInfo,
        allow_directives: bool,
    ) -> Rc<TemplateToken> {
        let meta = self.token_meta(event.meta);
        let text = match event.value {
            ScalarValue::Null => return TemplateToken::null(meta),
            ScalarValue::Boolean(value) => return TemplateToken::boolean(meta, value),
            ScalarValue::Number(value) => return TemplateToken::number(meta, value),
            ScalarValue::String(text) => text,
        };

        if !text.contains(EXPRESSION_START) {
            return TemplateToken::string(meta, text.as_str());
        }

        let Some(segments) = self.split_segments(&text, meta) else {
            return TemplateToken::string(meta, text.as_str());
        };

        let has_expression = segments
            .iter()
            .any(|segment| !matches!(segment, Segment::Literal(_)));
        if !has_expression {
            return TemplateToken::string(meta, text.as_str());
        }
        if info.allowed_context.is_empty() {
            self.context
                .add_error(meta, "A template expression is not allowed in this context");
            return TemplateToken::string(meta, text.as_str());
        }

        let (named_contexts, functions) = parse_context_entries(&info.allowed_context);

        if segments.len() == 1 {
            match &segments[0] {
                Segment::Directive => {
                    if allow_directives {
                        return TemplateToken::insert_expression(meta);
                    }
                    self.context.add_error(
                        meta,
                        format!("The directive '{INSERT_DIRECTIVE}' is not allowed in this context"),
                    );
                    return TemplateToken::string(meta, text.as_str());
                }
                Segment::Expression(expression) => {
                    match parse_expression(expression, &named_contexts, &functions) {
                        Err(error) => {
                            self.context.add_flow_error(meta, &error);
                            return TemplateToken::string(meta, text.as_str());
                        }
                        Ok(ExpressionNode::Literal(literal)) => {
                            // `${{ 'literal' }}` collapses to the literal
                            if let LiteralValue::String(value) = &literal.value {
                                return TemplateToken::string(meta, value.clone());
                            }
                            return TemplateToken::basic_expression(meta, expression.as_str());
                        }
                        Ok(_) => {
                            return TemplateToken::basic_expression(meta, expression.as_str());
                        }
                    }
                }
                Segment::Literal(_) => unreachable!("has_expression checked above"),
            }
        }

        // multi-segment: rewrite as a single format() call
        let mut format_string = String::new();
        let mut arguments: Vec<&str> = Vec::new();
        for segment in &segments {
            match segment {
                Segment::Literal(literal) => {
                    let escaped = literal
                        .replace('\'', "''")
                        .replace('{', "{{")
                        .replace('}', "}}");
                    format_string.push_str(&escaped);
                }
                Segment::Expression(expression) => {
                    if let Err(error) = parse_expression(expression, &named_contexts, &functions) {
                        self.context.add_flow_error(meta, &error);
                        return TemplateToken::string(meta, text.as_str());
                    }
                    format_string.push('{');
                    format_string.push_str(&arguments.len().to_string());
                    format_string.push('}');
                    arguments.push(expression);
                }
                Segment::Directive => {
                    self.context.add_error(
                        meta,
                        format!("The directive '{INSERT_DIRECTIVE}' is not allowed in this context"),
                    );
                    return TemplateToken::string(meta, text.as_str());
                }
            }
        }
        let mut expression = format!("format('{format_string}'");
        for argument in arguments {
            expression.push_str(", ");
            expression.push_str(argument);
        }
        expression.push(')');
        TemplateToken::basic_expression(meta, expression)
    }

    /// Scan for `${{ … }}` segments, honoring single-quoted strings
    ///
    /// Returns `None` (with an error recorded) when an expression is left
    /// unclosed.
    fn split_segments(&mut self, text: &str, meta: TokenMeta) -> Option<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut rest = text;
        loop {
            match rest.find(EXPRESSION_START) {
                None => {
                    if !rest.is_empty() {
                        segments.push(Segment::Literal(rest.to_string()));
                    }
                    return Some(segments);
                }
                Some(start) => {
                    if start > 0 {
                        segments.push(Segment::Literal(rest[..start].to_string()));
                    }
                    let body_start = start + EXPRESSION_START.len();
                    match find_expression_end(&rest[body_start..]) {
                        None => {
                            self.context.add_error(
                                meta,
                                format!(
                                    "The expression is not closed. An expression must end with '{EXPRESSION_END}'"
                                ),
                            );
                            return None;
                        }
                        Some(end) => {
                            let body = rest[body_start..body_start + end].trim();
                            if body == INSERT_DIRECTIVE {
                                segments.push(Segment::Directive);
                            } else {
                                segments.push(Segment::Expression(body.to_string()));
                            }
                            rest = &rest[body_start + end + EXPRESSION_END.len()..];
                        }
                    }
                }
            }
        }
    }
}

/// Find the offset of the closing `}}`, skipping single-quoted strings
fn find_expression_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut position = 0usize;
    let mut in_string = false;
    while position < bytes.len() {
        if in_string {
            if bytes[position] == b'\'' {
                if bytes.get(position + 1) == Some(&b'\'') {
                    position += 2;
                    continue;
                }
                in_string = false;
            }
            position += 1;
            continue;
        }
        match bytes[position] {
            b'\'' => {
                in_string = true;
                position += 1;
            }
            b'}' if bytes.get(position + 1) == Some(&b'}') => return Some(position),
            _ => position += 1,
        }
    }
    None
}

/// Property names that would disambiguate the surviving candidates
fn disambiguating_properties(candidates: &[Rc<Definition>]) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for candidate in candidates {
        let Definition::Mapping(mapping) = &**candidate else {
            continue;
        };
        let Some(properties) = &mapping.properties else {
            continue;
        };
        for (name, _) in properties {
            let shared = candidates.iter().all(|other| match &**other {
                Definition::Mapping(other) => other.get_property(name).is_some(),
                _ => false,
            });
            if !shared && !result.iter().any(|existing| existing == &**name) {
                result.push(name.to_string());
            }
        }
    }
    result.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::schema::TemplateSchema;
    use crate::templates::serialization::serialize_token;
    use crate::templates::sources::YamlObjectReader;

    /// A small pipeline-flavored schema exercising every definition kind
    fn pipeline_schema() -> TemplateSchema {
        let schema = TemplateSchema::load_json(
            r#"{
                "version": "pipeline-v1",
                "definitions": {
                    "pipeline-root": {
                        "mapping": {
                            "properties": {
                                "steps": "steps",
                                "variables": "variables",
                                "name": "string"
                            }
                        }
                    },
                    "steps": {
                        "context": ["parameters"],
                        "sequence": {"item-type": "step"}
                    },
                    "step": {
                        "one-of": ["script-step", "task-step"]
                    },
                    "script-step": {
                        "mapping": {
                            "properties": {
                                "script": {"type": "non-empty-string", "required": true},
                                "name": "string"
                            }
                        }
                    },
                    "task-step": {
                        "mapping": {
                            "properties": {
                                "task": {"type": "non-empty-string", "required": true},
                                "inputs": "mapping",
                                "name": "string"
                            }
                        }
                    },
                    "variables": {
                        "context": ["parameters"],
                        "mapping": {
                            "loose-key-type": "non-empty-string",
                            "loose-value-type": "any"
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        schema
    }

    fn read_yaml(
        schema: TemplateSchema,
        type_name: &str,
        yaml: &str,
    ) -> (TemplateContext, Rc<TemplateToken>) {
        let mut context = TemplateContext::new(Rc::new(schema));
        let mut source = YamlObjectReader::from_str(yaml).unwrap();
        let result =
            read_template(&mut context, type_name, &mut source, Some("pipeline.yml")).unwrap();
        (context, result.value)
    }

    #[test]
    fn test_read_valid_pipeline() {
        let (context, token) = read_yaml(
            pipeline_schema(),
            "pipeline-root",
            "name: build\nsteps:\n  - script: make\n  - task: publish\n    inputs:\n      target: dist\n",
        );
        assert!(context.errors.is_empty(), "{:?}", context.errors.messages());
        let TemplateToken::Mapping(root) = &*token else {
            panic!("expected mapping root");
        };
        assert_eq!(root.pairs.len(), 2);
        let steps = root.get("steps").unwrap();
        let TemplateToken::Sequence(steps) = &*steps else {
            panic!("expected steps sequence");
        };
        assert_eq!(steps.entries.len(), 2);
    }

    #[test]
    fn test_unexpected_property() {
        let (context, _) = read_yaml(
            pipeline_schema(),
            "pipeline-root",
            "name: x\nbogus: y\n",
        );
        let messages = context.errors.messages().join("\n");
        assert!(messages.contains("Unexpected value 'bogus'"), "{messages}");
    }

    #[test]
    fn test_duplicate_key_is_diagnosed_and_dropped() {
        let (context, token) = read_yaml(
            pipeline_schema(),
            "variables",
            "a: 1\nA: 2\n",
        );
        let messages = context.errors.messages().join("\n");
        assert!(messages.contains("'A' is already defined"), "{messages}");
        let TemplateToken::Mapping(mapping) = &*token else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs.len(), 1);
    }

    #[test]
    fn test_required_property_missing() {
        let (context, _) = read_yaml(
            pipeline_schema(),
            "step",
            "name: incomplete\nscript: make\n",
        );
        assert!(context.errors.is_empty());

        let (context, _) = read_yaml(pipeline_schema(), "script-step", "name: incomplete\n");
        let messages = context.errors.messages().join("\n");
        assert!(
            messages.contains("Required property is missing: script"),
            "{messages}"
        );
    }

    #[test]
    fn test_one_of_disambiguation_hint() {
        let (context, _) = read_yaml(pipeline_schema(), "step", "name: which\n");
        let messages = context.errors.messages().join("\n");
        assert!(messages.contains("not enough info"), "{messages}");
        assert!(messages.contains("script"), "{messages}");
        assert!(messages.contains("task"), "{messages}");
    }

    #[test]
    fn test_sequence_not_expected() {
        let (context, _) = read_yaml(pipeline_schema(), "variables", "- a\n- b\n");
        let messages = context.errors.messages().join("\n");
        assert!(messages.contains("A sequence was not expected"), "{messages}");
    }

    #[test]
    fn test_expression_recognized_in_allowed_context() {
        let (context, token) = read_yaml(
            pipeline_schema(),
            "variables",
            "config: ${{ parameters.config }}\n",
        );
        assert!(context.errors.is_empty(), "{:?}", context.errors.messages());
        let TemplateToken::Mapping(mapping) = &*token else {
            panic!("expected mapping");
        };
        let value = &mapping.pairs[0].1;
        assert!(matches!(&**value, TemplateToken::BasicExpression(_)));
    }

    #[test]
    fn test_expression_rejected_without_context() {
        let (context, _) = read_yaml(
            pipeline_schema(),
            "pipeline-root",
            "name: ${{ parameters.name }}\n",
        );
        let messages = context.errors.messages().join("\n");
        assert!(
            messages.contains("A template expression is not allowed in this context"),
            "{messages}"
        );
    }

    #[test]
    fn test_unknown_named_context_in_expression() {
        let (context, _) = read_yaml(
            pipeline_schema(),
            "variables",
            "config: ${{ secrets.token }}\n",
        );
        let messages = context.errors.messages().join("\n");
        assert!(messages.contains("Unrecognized named-value"), "{messages}");
    }

    #[test]
    fn test_multi_segment_becomes_format_call() {
        let (context, token) = read_yaml(
            pipeline_schema(),
            "variables",
            "greeting: \"it's {a} ${{ parameters.x }}!\"\n",
        );
        assert!(context.errors.is_empty(), "{:?}", context.errors.messages());
        let TemplateToken::Mapping(mapping) = &*token else {
            panic!("expected mapping");
        };
        let TemplateToken::BasicExpression(expression) = &*mapping.pairs[0].1 else {
            panic!("expected expression value");
        };
        assert_eq!(
            &*expression.expression,
            "format('it''s {{a}} {0}!', parameters.x)"
        );
    }

    #[test]
    fn test_string_literal_expression_collapses() {
        let (context, token) = read_yaml(
            pipeline_schema(),
            "variables",
            "config: ${{ 'fixed' }}\n",
        );
        assert!(context.errors.is_empty());
        let TemplateToken::Mapping(mapping) = &*token else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs[0].1.as_str(), Some("fixed"));
    }

    #[test]
    fn test_insert_directive_in_loose_mapping() {
        let (context, token) = read_yaml(
            pipeline_schema(),
            "variables",
            "a: 1\n\"${{ insert }}\": ${{ parameters.extra }}\n",
        );
        assert!(context.errors.is_empty(), "{:?}", context.errors.messages());
        let TemplateToken::Mapping(mapping) = &*token else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs.len(), 2);
        assert!(matches!(
            &*mapping.pairs[1].0,
            TemplateToken::InsertExpression(_)
        ));
    }

    #[test]
    fn test_insert_directive_rejected_in_value_position() {
        let (context, _) = read_yaml(
            pipeline_schema(),
            "variables",
            "a: ${{ insert }}\n",
        );
        let messages = context.errors.messages().join("\n");
        assert!(
            messages.contains("The directive 'insert' is not allowed in this context"),
            "{messages}"
        );
    }

    #[test]
    fn test_unclosed_expression() {
        let (context, _) = read_yaml(
            pipeline_schema(),
            "variables",
            "a: ${{ parameters.x\n",
        );
        let messages = context.errors.messages().join("\n");
        assert!(messages.contains("The expression is not closed"), "{messages}");
    }

    #[test]
    fn test_closing_braces_inside_string_literal() {
        let (context, token) = read_yaml(
            pipeline_schema(),
            "variables",
            "a: ${{ format('}}{0}', parameters.x) }}\n",
        );
        assert!(context.errors.is_empty(), "{:?}", context.errors.messages());
        let TemplateToken::Mapping(mapping) = &*token else {
            panic!("expected mapping");
        };
        let TemplateToken::BasicExpression(expression) = &*mapping.pairs[0].1 else {
            panic!("expected expression value");
        };
        assert_eq!(&*expression.expression, "format('}}{0}', parameters.x)");
    }

    #[test]
    fn test_error_messages_carry_file_prefix() {
        let (context, _) = read_yaml(pipeline_schema(), "pipeline-root", "bogus: 1\n");
        assert!(context.errors.messages()[0].starts_with("pipeline.yml "));
    }

    #[test]
    fn test_bytes_reported() {
        let schema = pipeline_schema();
        let mut context = TemplateContext::new(Rc::new(schema));
        let mut source = YamlObjectReader::from_str("name: x\n").unwrap();
        let result =
            read_template(&mut context, "pipeline-root", &mut source, None).unwrap();
        assert!(result.bytes > 0);
        assert_eq!(context.memory.current_bytes(), result.bytes);
        assert_eq!(context.memory.current_depth(), 0);
        // the read tree serializes cleanly
        let _ = serialize_token(&result.value);
    }
}
