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

//! Just-in-time template unraveler
//!
//! A cursor over a token tree that lazily expands `${{ … }}` expressions
//! and `${{ insert }}` directives as the caller walks it. The cursor keeps
//! a stack of reader states, one per scope entered; every state charges its
//! token's byte cost and a depth level on creation and releases both on
//! removal, so the memory charged at any moment corresponds exactly to the
//! live path. A failed expression never aborts the traversal: it records a
//! validation error and substitutes per position (empty string, skipped
//! item, or omitted pair). Memory and depth violations always abort.

use std::rc::Rc;

use crate::core::error::{FlowError, Result};
use crate::core::error_code::EX0016;
use crate::expressions::evaluator::EvaluationOptions;
use crate::expressions::parser::parse as parse_expression;

use super::context::TemplateContext;
use super::token::{TemplateToken, TokenMeta};

/// Position within a sequence scope
#[derive(Debug, Clone, Copy, PartialEq)]
enum SequencePosition {
    Start,
    Item(usize),
    End,
}

/// Position within a mapping scope
#[derive(Debug, Clone, Copy, PartialEq)]
enum MappingPosition {
    Start,
    Key(usize),
    Value(usize),
    End,
}

enum ReaderState {
    Literal,
    Sequence {
        inline: bool,
        position: SequencePosition,
    },
    Mapping {
        inline: bool,
        position: MappingPosition,
    },
    BasicExpression,
    InsertExpression,
}

struct Frame {
    token: Rc<TemplateToken>,
    state: ReaderState,
    /// Shallow charge made when the frame was created
    bytes: usize,
    /// Deep charge of an evaluated substitution product, released with the
    /// frame
    remove_bytes: usize,
}

/// How a completed child hands control back to its parent scope
#[derive(Clone, Copy)]
enum Advance {
    /// The child was consumed in place
    Normal,
    /// The child stood in key position and its value must be skipped
    PastPair,
}

enum Step {
    Push(Rc<TemplateToken>),
    PopInline(Advance),
    Stay,
}

/// Cursor-driven lazy expansion over a token tree
pub struct TemplateUnraveler<'a> {
    context: &'a mut TemplateContext,
    stack: Vec<Frame>,
    initial_remove_bytes: usize,
}

impl<'a> TemplateUnraveler<'a> {
    /// Create a cursor over `template`
    ///
    /// `remove_bytes` is the byte cost charged when the template was read;
    /// it is released by [`read_end`](Self::read_end).
    pub fn new(
        context: &'a mut TemplateContext,
        template: Rc<TemplateToken>,
        remove_bytes: usize,
    ) -> Result<Self> {
        let mut unraveler = Self {
            context,
            stack: Vec::new(),
            initial_remove_bytes: remove_bytes,
        };
        unraveler.push_frame(template, 0)?;
        Ok(unraveler)
    }

    /// Consume a scalar if one is current
    ///
    /// With `expand` false, expression tokens surface as scalars.
    pub fn allow_scalar(&mut self, expand: bool) -> Result<Option<Rc<TemplateToken>>> {
        self.unravel(expand)?;
        let surface = match self.stack.last() {
            Some(frame) => matches!(
                frame.state,
                ReaderState::Literal | ReaderState::BasicExpression | ReaderState::InsertExpression
            ),
            None => false,
        };
        if !surface {
            return Ok(None);
        }
        let token = self.pop_frame().token;
        self.advance_parent(Advance::Normal)?;
        Ok(Some(token))
    }

    /// Consume a sequence start if one is current
    pub fn allow_sequence_start(&mut self, expand: bool) -> Result<Option<Rc<TemplateToken>>> {
        self.unravel(expand)?;
        let matches = match self.stack.last() {
            Some(Frame {
                state:
                    ReaderState::Sequence {
                        inline: false,
                        position: SequencePosition::Start,
                    },
                ..
            }) => true,
            _ => false,
        };
        if !matches {
            return Ok(None);
        }
        let token = self.stack.last().map(|f| f.token.clone());
        self.open_top_sequence()?;
        Ok(token)
    }

    /// Consume a sequence end if one is current
    pub fn allow_sequence_end(&mut self, expand: bool) -> Result<bool> {
        self.unravel(expand)?;
        let matches = matches!(
            self.stack.last(),
            Some(Frame {
                state: ReaderState::Sequence {
                    inline: false,
                    position: SequencePosition::End,
                },
                ..
            })
        );
        if !matches {
            return Ok(false);
        }
        self.pop_frame();
        self.advance_parent(Advance::Normal)?;
        Ok(true)
    }

    /// Consume a mapping start if one is current
    pub fn allow_mapping_start(&mut self, expand: bool) -> Result<Option<Rc<TemplateToken>>> {
        self.unravel(expand)?;
        let matches = matches!(
            self.stack.last(),
            Some(Frame {
                state: ReaderState::Mapping {
                    inline: false,
                    position: MappingPosition::Start,
                },
                ..
            })
        );
        if !matches {
            return Ok(None);
        }
        let token = self.stack.last().map(|f| f.token.clone());
        self.open_top_mapping()?;
        Ok(token)
    }

    /// Consume a mapping end if one is current
    pub fn allow_mapping_end(&mut self, expand: bool) -> Result<bool> {
        self.unravel(expand)?;
        let matches = matches!(
            self.stack.last(),
            Some(Frame {
                state: ReaderState::Mapping {
                    inline: false,
                    position: MappingPosition::End,
                },
                ..
            })
        );
        if !matches {
            return Ok(false);
        }
        self.pop_frame();
        self.advance_parent(Advance::Normal)?;
        Ok(true)
    }

    /// Assert the traversal is complete and release the template's bytes
    pub fn read_end(&mut self) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(FlowError::system(
                EX0016,
                "Expected the end of the template",
            ));
        }
        self.context
            .memory
            .subtract_bytes(self.initial_remove_bytes);
        self.initial_remove_bytes = 0;
        Ok(())
    }

    /// Require a mapping end at the current position
    pub fn read_mapping_end(&mut self) -> Result<()> {
        if !self.allow_mapping_end(false)? {
            return Err(FlowError::system(EX0016, "Expected the end of a mapping"));
        }
        Ok(())
    }

    /// Drop the current sequence item without reading it
    pub fn skip_sequence_item(&mut self) -> Result<()> {
        let parent_is_item = matches!(
            self.parent_state(),
            Some(ReaderState::Sequence {
                position: SequencePosition::Item(_),
                ..
            })
        );
        if !parent_is_item {
            return Err(FlowError::system(EX0016, "Expected a sequence item"));
        }
        self.pop_frame();
        self.advance_parent(Advance::Normal)
    }

    /// Drop the current mapping key, moving to its value
    pub fn skip_mapping_key(&mut self) -> Result<()> {
        let parent_is_key = matches!(
            self.parent_state(),
            Some(ReaderState::Mapping {
                position: MappingPosition::Key(_),
                ..
            })
        );
        if !parent_is_key {
            return Err(FlowError::system(EX0016, "Expected a mapping key"));
        }
        self.pop_frame();
        self.advance_parent(Advance::Normal)
    }

    /// Drop the current mapping value, moving to the next pair
    pub fn skip_mapping_value(&mut self) -> Result<()> {
        let parent_is_value = matches!(
            self.parent_state(),
            Some(ReaderState::Mapping {
                position: MappingPosition::Value(_),
                ..
            })
        );
        if !parent_is_value {
            return Err(FlowError::system(EX0016, "Expected a mapping value"));
        }
        self.pop_frame();
        self.advance_parent(Advance::Normal)
    }

    fn parent_state(&self) -> Option<&ReaderState> {
        if self.stack.len() < 2 {
            return None;
        }
        self.stack.get(self.stack.len() - 2).map(|f| &f.state)
    }

    fn push_frame(&mut self, token: Rc<TemplateToken>, remove_bytes: usize) -> Result<()> {
        let bytes = token.byte_size(false);
        self.context.memory.add_bytes(bytes)?;
        self.context.memory.increment_depth()?;
        let state = match &*token {
            TemplateToken::Sequence(_) => ReaderState::Sequence {
                inline: false,
                position: SequencePosition::Start,
            },
            TemplateToken::Mapping(_) => ReaderState::Mapping {
                inline: false,
                position: MappingPosition::Start,
            },
            TemplateToken::BasicExpression(_) => ReaderState::BasicExpression,
            TemplateToken::InsertExpression(_) => ReaderState::InsertExpression,
            _ => ReaderState::Literal,
        };
        self.stack.push(Frame {
            token,
            state,
            bytes,
            remove_bytes,
        });
        Ok(())
    }

    fn push_inline_frame(
        &mut self,
        token: Rc<TemplateToken>,
        remove_bytes: usize,
    ) -> Result<()> {
        self.push_frame(token, remove_bytes)?;
        let frame = self.stack.last_mut().expect("frame just pushed");
        match &mut frame.state {
            ReaderState::Sequence { inline, .. } => *inline = true,
            ReaderState::Mapping { inline, .. } => *inline = true,
            _ => {}
        }
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        let frame = self.stack.pop().expect("a frame to pop");
        self.context
            .memory
            .subtract_bytes(frame.bytes + frame.remove_bytes);
        self.context.memory.decrement_depth();
        frame
    }

    /// Move the parent scope forward after a completed child was popped
    fn advance_parent(&mut self, mut mode: Advance) -> Result<()> {
        loop {
            let step = {
                let Some(frame) = self.stack.last_mut() else {
                    // traversal complete
                    return Ok(());
                };
                match &mut frame.state {
                    ReaderState::Sequence { inline, position } => {
                        let index = match *position {
                            SequencePosition::Item(index) => index,
                            _ => {
                                return Err(FlowError::system(
                                    EX0016,
                                    "The cursor is in an invalid sequence state",
                                ))
                            }
                        };
                        let TemplateToken::Sequence(sequence) = &*frame.token else {
                            return Err(FlowError::system(EX0016, "Expected a sequence token"));
                        };
                        let next = index + 1;
                        if next < sequence.entries.len() {
                            *position = SequencePosition::Item(next);
                            Step::Push(sequence.entries[next].clone())
                        } else {
                            *position = SequencePosition::End;
                            if *inline {
                                Step::PopInline(Advance::Normal)
                            } else {
                                Step::Stay
                            }
                        }
                    }
                    ReaderState::Mapping { inline, position } => {
                        let TemplateToken::Mapping(mapping) = &*frame.token else {
                            return Err(FlowError::system(EX0016, "Expected a mapping token"));
                        };
                        match (*position, mode) {
                            (MappingPosition::Key(index), Advance::Normal) => {
                                *position = MappingPosition::Value(index);
                                Step::Push(mapping.pairs[index].1.clone())
                            }
                            (MappingPosition::Key(index), Advance::PastPair)
                            | (MappingPosition::Value(index), Advance::Normal) => {
                                let next = index + 1;
                                if next < mapping.pairs.len() {
                                    *position = MappingPosition::Key(next);
                                    Step::Push(mapping.pairs[next].0.clone())
                                } else {
                                    *position = MappingPosition::End;
                                    if *inline {
                                        Step::PopInline(Advance::PastPair)
                                    } else {
                                        Step::Stay
                                    }
                                }
                            }
                            _ => {
                                return Err(FlowError::system(
                                    EX0016,
                                    "The cursor is in an invalid mapping state",
                                ))
                            }
                        }
                    }
                    _ => {
                        return Err(FlowError::system(
                            EX0016,
                            "The cursor is in an invalid state",
                        ))
                    }
                }
            };
            match step {
                Step::Push(token) => return self.push_frame(token, 0),
                Step::Stay => return Ok(()),
                Step::PopInline(next_mode) => {
                    self.pop_frame();
                    mode = next_mode;
                }
            }
        }
    }

    /// Consume the start event of the top (non-inline) sequence frame
    fn open_top_sequence(&mut self) -> Result<()> {
        let first = {
            let frame = self.stack.last_mut().expect("a sequence frame");
            let TemplateToken::Sequence(sequence) = &*frame.token else {
                return Err(FlowError::system(EX0016, "Expected a sequence token"));
            };
            let ReaderState::Sequence { inline, position } = &mut frame.state else {
                return Err(FlowError::system(EX0016, "Expected a sequence state"));
            };
            if sequence.entries.is_empty() {
                *position = SequencePosition::End;
                if *inline {
                    self.pop_frame();
                    return self.advance_parent(Advance::Normal);
                }
                return Ok(());
            }
            *position = SequencePosition::Item(0);
            sequence.entries[0].clone()
        };
        self.push_frame(first, 0)
    }

    /// Consume the start event of the top mapping frame
    fn open_top_mapping(&mut self) -> Result<()> {
        let first = {
            let frame = self.stack.last_mut().expect("a mapping frame");
            let TemplateToken::Mapping(mapping) = &*frame.token else {
                return Err(FlowError::system(EX0016, "Expected a mapping token"));
            };
            let ReaderState::Mapping { inline, position } = &mut frame.state else {
                return Err(FlowError::system(EX0016, "Expected a mapping state"));
            };
            if mapping.pairs.is_empty() {
                *position = MappingPosition::End;
                if *inline {
                    let past_pair = Advance::PastPair;
                    self.pop_frame();
                    return self.advance_parent(past_pair);
                }
                return Ok(());
            }
            *position = MappingPosition::Key(0);
            mapping.pairs[0].0.clone()
        };
        self.push_frame(first, 0)
    }

    /// Expand expression frames at the cursor until a plain event is on top
    fn unravel(&mut self, expand: bool) -> Result<()> {
        if !expand {
            return Ok(());
        }
        loop {
            let top_state = match self.stack.last() {
                Some(frame) => match frame.state {
                    ReaderState::BasicExpression => 0,
                    ReaderState::InsertExpression => 1,
                    _ => return Ok(()),
                },
                None => return Ok(()),
            };
            if top_state == 0 {
                self.unravel_basic_expression()?;
            } else {
                self.unravel_insert_expression()?;
            }
        }
    }

    fn unravel_basic_expression(&mut self) -> Result<()> {
        let token = self
            .stack
            .last()
            .map(|f| f.token.clone())
            .expect("a basic expression frame");
        let meta = token.meta();
        let TemplateToken::BasicExpression(expression) = &*token else {
            return Err(FlowError::system(EX0016, "Expected an expression token"));
        };

        enum Parent {
            Root,
            SequenceItem,
            MappingKey,
            MappingValue,
        }
        let parent = match self.parent_state() {
            None => Parent::Root,
            Some(ReaderState::Sequence {
                position: SequencePosition::Item(_),
                ..
            }) => Parent::SequenceItem,
            Some(ReaderState::Mapping {
                position: MappingPosition::Key(_),
                ..
            }) => Parent::MappingKey,
            Some(ReaderState::Mapping {
                position: MappingPosition::Value(_),
                ..
            }) => Parent::MappingValue,
            _ => {
                return Err(FlowError::system(
                    EX0016,
                    "The cursor is in an invalid state",
                ))
            }
        };

        let evaluated = self.try_evaluate(meta, &expression.expression)?;
        match parent {
            Parent::Root => {
                let (product, bytes) = match evaluated {
                    Some(result) => result,
                    None => self.empty_string_product(meta)?,
                };
                self.pop_frame();
                self.push_frame(product, bytes)?;
            }
            Parent::SequenceItem => match evaluated {
                None => {
                    self.pop_frame();
                    self.advance_parent(Advance::Normal)?;
                }
                Some((product, bytes)) => match &*product {
                    // an undefined result removes the item
                    TemplateToken::Null(_) => {
                        self.context.memory.subtract_bytes(bytes);
                        self.pop_frame();
                        self.advance_parent(Advance::Normal)?;
                    }
                    // a sequence result is inlined at the current position
                    TemplateToken::Sequence(_) => {
                        self.pop_frame();
                        self.push_inline_frame(product.clone(), bytes)?;
                        self.open_top_sequence()?;
                    }
                    _ => {
                        self.pop_frame();
                        self.push_frame(product, bytes)?;
                    }
                },
            },
            Parent::MappingKey => match evaluated {
                None => {
                    // drop both the key and its value
                    self.pop_frame();
                    self.advance_parent(Advance::PastPair)?;
                }
                Some((product, bytes)) => {
                    if product.is_literal() {
                        let key = TemplateToken::string(meta, product.display_value().as_str());
                        let key_bytes = key.byte_size(true);
                        self.context.memory.subtract_bytes(bytes);
                        self.context.memory.add_bytes(key_bytes)?;
                        self.pop_frame();
                        self.push_frame(key, key_bytes)?;
                    } else {
                        self.context
                            .add_error(meta, "A mapping key must evaluate to a string");
                        self.context.memory.subtract_bytes(bytes);
                        self.pop_frame();
                        self.advance_parent(Advance::PastPair)?;
                    }
                }
            },
            Parent::MappingValue => {
                let (product, bytes) = match evaluated {
                    Some(result) => result,
                    None => self.empty_string_product(meta)?,
                };
                self.pop_frame();
                self.push_frame(product, bytes)?;
            }
        }
        Ok(())
    }

    fn unravel_insert_expression(&mut self) -> Result<()> {
        let meta = self
            .stack
            .last()
            .map(|f| f.token.meta())
            .expect("an insert frame");

        let key_index = match self.parent_state() {
            Some(ReaderState::Mapping {
                position: MappingPosition::Key(index),
                ..
            }) => Some(*index),
            _ => None,
        };
        let Some(key_index) = key_index else {
            // a misplaced directive degrades to its literal form
            self.context.add_error(
                meta,
                "The directive 'insert' is not allowed in this context",
            );
            let product = TemplateToken::string(meta, "${{ insert }}");
            let bytes = product.byte_size(true);
            self.context.memory.add_bytes(bytes)?;
            self.pop_frame();
            self.push_frame(product, bytes)?;
            return Ok(());
        };

        let value_token = {
            let parent = &self.stack[self.stack.len() - 2];
            let TemplateToken::Mapping(mapping) = &*parent.token else {
                return Err(FlowError::system(EX0016, "Expected a mapping token"));
            };
            mapping.pairs[key_index].1.clone()
        };

        let resolved: Option<(Rc<TemplateToken>, usize)> = match &*value_token {
            TemplateToken::Mapping(_) => Some((value_token.clone(), 0)),
            TemplateToken::BasicExpression(expression) => {
                match self.try_evaluate(meta, &expression.expression)? {
                    None => None,
                    Some((product, bytes)) => {
                        if matches!(&*product, TemplateToken::Mapping(_)) {
                            Some((product, bytes))
                        } else {
                            self.context.add_error(
                                meta,
                                format!(
                                    "The directive 'insert' requires a mapping, found a {}",
                                    product.kind_name()
                                ),
                            );
                            self.context.memory.subtract_bytes(bytes);
                            None
                        }
                    }
                }
            }
            other => {
                self.context.add_error(
                    meta,
                    format!(
                        "The directive 'insert' requires a mapping, found a {}",
                        other.kind_name()
                    ),
                );
                None
            }
        };

        match resolved {
            // merge the pairs into the enclosing mapping at this position
            Some((mapping_token, bytes)) => {
                self.pop_frame();
                self.push_inline_frame(mapping_token, bytes)?;
                self.open_top_mapping()?;
            }
            // the result omits the directive
            None => {
                self.pop_frame();
                self.advance_parent(Advance::PastPair)?;
            }
        }
        Ok(())
    }

    /// Evaluate an expression; recoverable failures are recorded and
    /// surfaced as `None`, fatal failures propagate
    fn try_evaluate(
        &mut self,
        meta: TokenMeta,
        expression: &str,
    ) -> Result<Option<(Rc<TemplateToken>, usize)>> {
        let named_contexts = self.context.expressions.named_context_infos();
        let functions = self.context.expressions.function_infos();
        let tree = match parse_expression(expression, &named_contexts, &functions) {
            Ok(tree) => tree,
            Err(error) => {
                self.context.add_flow_error(meta, &error);
                return Ok(None);
            }
        };

        let options = EvaluationOptions {
            max_memory: self.context.memory.max_bytes(),
        };
        let outcome = tree.evaluate(
            self.context.trace.as_mut(),
            &self.context.expressions,
            options,
        );
        let result = match outcome {
            Ok(result) => result,
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                self.context.add_flow_error(meta, &error);
                return Ok(None);
            }
        };

        let product = TemplateToken::from_flow_value(&result.value, meta);
        let bytes = product.byte_size(true);
        self.context.memory.add_bytes(bytes)?;
        Ok(Some((product, bytes)))
    }

    fn empty_string_product(&mut self, meta: TokenMeta) -> Result<(Rc<TemplateToken>, usize)> {
        let product = TemplateToken::string(meta, "");
        let bytes = product.byte_size(true);
        self.context.memory.add_bytes(bytes)?;
        Ok((product, bytes))
    }
}

/// Fully expand a template into a fresh token tree
///
/// Mapping keys produced more than once (for example by an insertion that
/// collides with an existing key) keep the first pair; later duplicates
/// are dropped silently. `remove_bytes` is released when the traversal
/// completes.
pub fn evaluate_template(
    context: &mut TemplateContext,
    template: &Rc<TemplateToken>,
    remove_bytes: usize,
) -> Result<Rc<TemplateToken>> {
    let mut unraveler = TemplateUnraveler::new(context, template.clone(), remove_bytes)?;
    let token = read_any(&mut unraveler)?;
    unraveler.read_end()?;
    Ok(token)
}

fn read_any(unraveler: &mut TemplateUnraveler) -> Result<Rc<TemplateToken>> {
    if let Some(scalar) = unraveler.allow_scalar(true)? {
        unraveler.context.memory.add_token(&scalar, false)?;
        return Ok(scalar);
    }

    if let Some(sequence) = unraveler.allow_sequence_start(true)? {
        let meta = sequence.meta();
        let mut entries = Vec::new();
        while !unraveler.allow_sequence_end(true)? {
            entries.push(read_any(unraveler)?);
        }
        let token = TemplateToken::sequence(meta, entries);
        unraveler.context.memory.add_token(&token, false)?;
        return Ok(token);
    }

    if let Some(mapping) = unraveler.allow_mapping_start(true)? {
        let meta = mapping.meta();
        let mut pairs = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        while !unraveler.allow_mapping_end(true)? {
            let Some(key) = unraveler.allow_scalar(true)? else {
                return Err(FlowError::system(EX0016, "Expected a mapping key"));
            };
            let key_text = key.display_value().to_uppercase();
            if seen.iter().any(|existing| *existing == key_text) {
                unraveler.skip_mapping_value()?;
                continue;
            }
            seen.push(key_text);
            let value = read_any(unraveler)?;
            unraveler.context.memory.add_token(&key, false)?;
            pairs.push((key, value));
        }
        let token = TemplateToken::mapping(meta, pairs);
        unraveler.context.memory.add_token(&token, false)?;
        return Ok(token);
    }

    Err(FlowError::system(EX0016, "Expected a template value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::FlowValue;
    use crate::templates::schema::TemplateSchema;
    use crate::templates::serialization::serialize_token;
    use serde_json::json;

    fn meta() -> TokenMeta {
        TokenMeta::default()
    }

    fn context_with(values: &[(&str, serde_json::Value)]) -> TemplateContext {
        let schema = Rc::new(TemplateSchema::with_common_definitions());
        let mut context = TemplateContext::new(schema);
        for (name, value) in values {
            context
                .expressions
                .add_named_value(*name, FlowValue::from_json(value));
        }
        context
    }

    fn expand(
        context: &mut TemplateContext,
        template: &Rc<TemplateToken>,
    ) -> Rc<TemplateToken> {
        evaluate_template(context, template, 0).unwrap()
    }

    #[test]
    fn test_scalar_passthrough() {
        let mut context = context_with(&[]);
        let template = TemplateToken::string(meta(), "plain");
        let result = expand(&mut context, &template);
        assert_eq!(result.as_str(), Some("plain"));
        assert!(context.errors.is_empty());
    }

    #[test]
    fn test_expression_expands_to_value() {
        let mut context = context_with(&[("parameters", json!({"name": "release"}))]);
        let template = TemplateToken::basic_expression(meta(), "parameters.name");
        let result = expand(&mut context, &template);
        assert_eq!(result.as_str(), Some("release"));
    }

    #[test]
    fn test_sequence_insertion_inlines_items() {
        // steps: [{script: build}, ${{ parameters.extra }}, {script: test}]
        let mut context = context_with(&[(
            "parameters",
            json!({"extra": [{"script": "lint"}, {"script": "package"}]}),
        )]);
        let template = TemplateToken::sequence(
            meta(),
            vec![
                TemplateToken::mapping(
                    meta(),
                    vec![(
                        TemplateToken::string(meta(), "script"),
                        TemplateToken::string(meta(), "build"),
                    )],
                ),
                TemplateToken::basic_expression(meta(), "parameters.extra"),
                TemplateToken::mapping(
                    meta(),
                    vec![(
                        TemplateToken::string(meta(), "script"),
                        TemplateToken::string(meta(), "test"),
                    )],
                ),
            ],
        );
        let result = expand(&mut context, &template);
        assert!(context.errors.is_empty(), "{:?}", context.errors.messages());
        let TemplateToken::Sequence(sequence) = &*result else {
            panic!("expected sequence");
        };
        let scripts: Vec<String> = sequence
            .entries
            .iter()
            .map(|entry| {
                let TemplateToken::Mapping(mapping) = &**entry else {
                    panic!("expected mapping item");
                };
                mapping.get("script").unwrap().display_value()
            })
            .collect();
        assert_eq!(scripts, vec!["build", "lint", "package", "test"]);
    }

    #[test]
    fn test_undefined_sequence_item_is_skipped() {
        let mut context = context_with(&[("parameters", json!({}))]);
        let template = TemplateToken::sequence(
            meta(),
            vec![
                TemplateToken::string(meta(), "a"),
                TemplateToken::basic_expression(meta(), "parameters.missing"),
                TemplateToken::string(meta(), "b"),
            ],
        );
        let result = expand(&mut context, &template);
        let TemplateToken::Sequence(sequence) = &*result else {
            panic!("expected sequence");
        };
        assert_eq!(sequence.entries.len(), 2);
    }

    #[test]
    fn test_scalar_expression_in_sequence_stays_single_item() {
        let mut context = context_with(&[("parameters", json!({"v": 7}))]);
        let template = TemplateToken::sequence(
            meta(),
            vec![TemplateToken::basic_expression(meta(), "parameters.v")],
        );
        let result = expand(&mut context, &template);
        let TemplateToken::Sequence(sequence) = &*result else {
            panic!("expected sequence");
        };
        assert_eq!(sequence.entries.len(), 1);
        assert!(matches!(&*sequence.entries[0], TemplateToken::Number(_)));
    }

    #[test]
    fn test_mapping_insertion_merges_in_place() {
        // variables: {a: 1, ${{ insert }}: ${{ parameters.extra }}, b: 2}
        // with extra = {c: 3, a: 9}
        let mut context = context_with(&[("parameters", json!({"extra": {"c": 3, "a": 9}}))]);
        let template = TemplateToken::mapping(
            meta(),
            vec![
                (
                    TemplateToken::string(meta(), "a"),
                    TemplateToken::number(meta(), 1.0),
                ),
                (
                    TemplateToken::insert_expression(meta()),
                    TemplateToken::basic_expression(meta(), "parameters.extra"),
                ),
                (
                    TemplateToken::string(meta(), "b"),
                    TemplateToken::number(meta(), 2.0),
                ),
            ],
        );
        let result = expand(&mut context, &template);
        assert!(context.errors.is_empty(), "{:?}", context.errors.messages());
        let TemplateToken::Mapping(mapping) = &*result else {
            panic!("expected mapping");
        };
        let pairs: Vec<(String, String)> = mapping
            .pairs
            .iter()
            .map(|(key, value)| (key.display_value(), value.display_value()))
            .collect();
        // existing `a` wins; `c` lands between `a` and `b`
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("c".to_string(), "3".to_string()),
                ("b".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_insert_of_non_mapping_is_omitted_with_error() {
        let mut context = context_with(&[("parameters", json!({"extra": [1, 2]}))]);
        let template = TemplateToken::mapping(
            meta(),
            vec![
                (
                    TemplateToken::insert_expression(meta()),
                    TemplateToken::basic_expression(meta(), "parameters.extra"),
                ),
                (
                    TemplateToken::string(meta(), "kept"),
                    TemplateToken::number(meta(), 1.0),
                ),
            ],
        );
        let result = expand(&mut context, &template);
        let messages = context.errors.messages().join("\n");
        assert!(messages.contains("requires a mapping"), "{messages}");
        let TemplateToken::Mapping(mapping) = &*result else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs.len(), 1);
        assert_eq!(mapping.pairs[0].0.display_value(), "kept");
    }

    #[test]
    fn test_failed_value_expression_substitutes_empty_string() {
        let mut context = context_with(&[]);
        let template = TemplateToken::mapping(
            meta(),
            vec![(
                TemplateToken::string(meta(), "name"),
                TemplateToken::basic_expression(meta(), "unknown.value"),
            )],
        );
        let result = expand(&mut context, &template);
        assert!(!context.errors.is_empty());
        let TemplateToken::Mapping(mapping) = &*result else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs[0].1.as_str(), Some(""));
    }

    #[test]
    fn test_expression_key_expands_to_string() {
        let mut context = context_with(&[("parameters", json!({"key": "dynamic"}))]);
        let template = TemplateToken::mapping(
            meta(),
            vec![(
                TemplateToken::basic_expression(meta(), "parameters.key"),
                TemplateToken::number(meta(), 5.0),
            )],
        );
        let result = expand(&mut context, &template);
        let TemplateToken::Mapping(mapping) = &*result else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs[0].0.as_str(), Some("dynamic"));
    }

    #[test]
    fn test_failed_key_expression_skips_pair() {
        let mut context = context_with(&[]);
        let template = TemplateToken::mapping(
            meta(),
            vec![
                (
                    TemplateToken::basic_expression(meta(), "unknown.key"),
                    TemplateToken::number(meta(), 5.0),
                ),
                (
                    TemplateToken::string(meta(), "kept"),
                    TemplateToken::number(meta(), 6.0),
                ),
            ],
        );
        let result = expand(&mut context, &template);
        assert!(!context.errors.is_empty());
        let TemplateToken::Mapping(mapping) = &*result else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.pairs.len(), 1);
        assert_eq!(mapping.pairs[0].0.display_value(), "kept");
    }

    #[test]
    fn test_no_expand_surfaces_expression_tokens() {
        let mut context = context_with(&[]);
        let template = TemplateToken::basic_expression(meta(), "parameters.x");
        let mut unraveler = TemplateUnraveler::new(&mut context, template, 0).unwrap();
        let scalar = unraveler.allow_scalar(false).unwrap().unwrap();
        assert!(matches!(&*scalar, TemplateToken::BasicExpression(_)));
        unraveler.read_end().unwrap();
    }

    #[test]
    fn test_depth_and_bytes_return_to_baseline() {
        let mut context = context_with(&[("parameters", json!({"extra": {"c": 3}}))]);
        let baseline = context.memory.current_bytes();

        let template = TemplateToken::mapping(
            meta(),
            vec![
                (
                    TemplateToken::string(meta(), "a"),
                    TemplateToken::number(meta(), 1.0),
                ),
                (
                    TemplateToken::insert_expression(meta()),
                    TemplateToken::basic_expression(meta(), "parameters.extra"),
                ),
            ],
        );
        let read_bytes = template.byte_size(true);
        context.memory.add_bytes(read_bytes).unwrap();

        let mut unraveler =
            TemplateUnraveler::new(&mut context, template, read_bytes).unwrap();
        // walk every event without keeping anything
        assert!(unraveler.allow_mapping_start(true).unwrap().is_some());
        loop {
            if unraveler.allow_mapping_end(true).unwrap() {
                break;
            }
            let key = unraveler.allow_scalar(true).unwrap();
            assert!(key.is_some());
            unraveler.skip_mapping_value().unwrap();
        }
        unraveler.read_end().unwrap();

        assert_eq!(context.memory.current_depth(), 0);
        assert_eq!(context.memory.current_bytes(), baseline);
    }

    #[test]
    fn test_expanded_tree_serializes() {
        let mut context = context_with(&[("parameters", json!({"n": 2}))]);
        let template = TemplateToken::sequence(
            meta(),
            vec![TemplateToken::basic_expression(meta(), "parameters.n")],
        );
        let result = expand(&mut context, &template);
        let value = serialize_token(&result);
        assert_eq!(value, json!({"type": 1, "seq": [2]}));
    }
}
