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

//! Object-event sources consumed by the template reader
//!
//! A source is a single-pass cursor over a parsed document. Each `allow_*`
//! operation returns the value and advances when the current event matches,
//! or returns none so the reader can try another shape.

pub mod json;
pub mod yaml;

pub use json::JsonObjectReader;
pub use yaml::YamlObjectReader;

use crate::core::error::Result;

/// A scalar produced by a source
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// Number
    Number(f64),
    /// String
    String(String),
}

/// Position of an event within its source document, when available
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventMeta {
    /// Line number (1-based)
    pub line: Option<u32>,
    /// Column number (1-based)
    pub column: Option<u32>,
}

/// A literal event with its position
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarEvent {
    /// The scalar value
    pub value: ScalarValue,
    /// Position, when the source can report one
    pub meta: EventMeta,
}

/// Single-pass object-event source
pub trait ObjectReader {
    /// Must be called once, first
    fn validate_start(&mut self) -> Result<()>;

    /// Consume a literal if one is current
    fn allow_literal(&mut self) -> Result<Option<ScalarEvent>>;

    /// Consume a sequence start if one is current
    fn allow_sequence_start(&mut self) -> Result<Option<EventMeta>>;

    /// Consume a sequence end if one is current
    fn allow_sequence_end(&mut self) -> bool;

    /// Consume a mapping start if one is current
    fn allow_mapping_start(&mut self) -> Result<Option<EventMeta>>;

    /// Consume a mapping end if one is current
    fn allow_mapping_end(&mut self) -> bool;

    /// Must be called once, last
    fn validate_end(&mut self) -> Result<()>;
}
