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

//! Per-operation template state: schema, memory, errors, trace and
//! expression bindings

use std::rc::Rc;

use crate::core::error::{FlowError, Result};
use crate::core::error_code::EX0014;
use crate::core::memory::MemoryCounter;
use crate::core::trace::{NoopTraceWriter, TraceWriter};
use crate::expressions::evaluator::ExpressionContext;

use super::schema::TemplateSchema;
use super::token::TokenMeta;

/// Default cap on collected validation errors
pub const MAX_ERRORS: usize = 10;

/// Default cap on a single validation message's length in characters
pub const MAX_MESSAGE_LENGTH: usize = 500;

/// One collected validation error
#[derive(Debug, Clone)]
pub struct TemplateValidationError {
    /// The (possibly truncated) message
    pub message: String,
}

/// Bounded collector for validation errors
///
/// Errors beyond the count cap are dropped; messages beyond the length cap
/// are truncated with a `[...]` marker.
#[derive(Debug)]
pub struct TemplateValidationErrors {
    errors: Vec<TemplateValidationError>,
    max_errors: usize,
    max_message_length: usize,
}

impl Default for TemplateValidationErrors {
    fn default() -> Self {
        Self {
            errors: Vec::new(),
            max_errors: MAX_ERRORS,
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }
}

impl TemplateValidationErrors {
    /// Create a collector with explicit caps
    pub fn new(max_errors: usize, max_message_length: usize) -> Self {
        Self {
            errors: Vec::new(),
            max_errors,
            max_message_length,
        }
    }

    /// Record a message, applying the count and length caps
    pub fn add(&mut self, message: impl Into<String>) {
        if self.errors.len() >= self.max_errors {
            return;
        }
        let mut message = message.into();
        if message.chars().count() > self.max_message_length {
            message = message.chars().take(self.max_message_length).collect();
            message.push_str("[...]");
        }
        self.errors.push(TemplateValidationError { message });
    }

    /// Number of collected errors
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    /// Whether no errors were collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The collected messages in order
    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }

    /// Discard all collected errors
    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Raise a combined error when anything was collected
    pub fn check(&self) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let combined = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Err(FlowError::Validation {
            error_code: EX0014,
            message: combined,
        })
    }
}

/// State for one template read/unravel operation
///
/// The schema is shared and immutable; everything else is owned by the
/// operation. Callers running evaluations in parallel threads give each its
/// own context.
pub struct TemplateContext {
    /// The validated schema in effect
    pub schema: Rc<TemplateSchema>,
    /// The single byte/depth counter shared by reader, evaluator and
    /// unraveler
    pub memory: MemoryCounter,
    /// Collected validation errors
    pub errors: TemplateValidationErrors,
    /// Trace sink
    pub trace: Box<dyn TraceWriter>,
    /// Named values and extension functions for embedded expressions
    pub expressions: ExpressionContext,
    file_names: Vec<Rc<str>>,
}

impl TemplateContext {
    /// Create a context over `schema` with default limits and no tracing
    pub fn new(schema: Rc<TemplateSchema>) -> Self {
        Self {
            schema,
            memory: MemoryCounter::default(),
            errors: TemplateValidationErrors::default(),
            trace: Box::new(NoopTraceWriter),
            expressions: ExpressionContext::new(),
            file_names: Vec::new(),
        }
    }

    /// Replace the trace sink
    pub fn with_trace(mut self, trace: Box<dyn TraceWriter>) -> Self {
        self.trace = trace;
        self
    }

    /// Replace the memory counter
    pub fn with_memory(mut self, memory: MemoryCounter) -> Self {
        self.memory = memory;
        self
    }

    /// Intern `name` in the file table and return its 1-based id
    pub fn get_file_id(&mut self, name: &str) -> u32 {
        if let Some(position) = self
            .file_names
            .iter()
            .position(|existing| existing.eq_ignore_ascii_case(name))
        {
            return position as u32 + 1;
        }
        self.file_names.push(Rc::from(name));
        self.file_names.len() as u32
    }

    /// Resolve a file id back to its name
    pub fn get_file_name(&self, file_id: u32) -> Option<Rc<str>> {
        if file_id == 0 {
            return None;
        }
        self.file_names.get(file_id as usize - 1).cloned()
    }

    /// The interned file names in id order
    pub fn file_table(&self) -> &[Rc<str>] {
        &self.file_names
    }

    /// `<fileName> (Line: L, Col: C) ` prefix for a token's provenance
    pub fn error_prefix(&self, meta: TokenMeta) -> String {
        let mut prefix = String::new();
        if let Some(name) = meta.file_id.and_then(|id| self.get_file_name(id)) {
            prefix.push_str(&name);
            prefix.push(' ');
        }
        if let Some(location) = meta.location {
            prefix.push_str(&location.to_string());
            prefix.push(' ');
        }
        prefix
    }

    /// Record a validation error against a token position
    pub fn add_error(&mut self, meta: TokenMeta, message: impl AsRef<str>) {
        let prefixed = format!("{}{}", self.error_prefix(meta), message.as_ref());
        self.errors.add(prefixed);
    }

    /// Record a recoverable engine error against a token position
    pub fn add_flow_error(&mut self, meta: TokenMeta, error: &FlowError) {
        self.add_error(meta, error.to_string());
    }
}

impl std::fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateContext")
            .field("memory", &self.memory)
            .field("errors", &self.errors)
            .field("files", &self.file_names)
            .finish()
    }
}
