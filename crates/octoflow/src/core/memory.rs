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

//! Byte and depth accounting shared by the reader, evaluator and unraveler
//!
//! One counter is threaded through every subsystem so a hostile template
//! cannot amplify its own size: every allocation visible to the caller is
//! charged before the value is exposed, and released when the owner lets go.

use super::error::{FlowError, Result};
use super::error_code::{EX0012, EX0013};
use crate::expressions::FlowValue;
use crate::templates::TemplateToken;

/// Default byte budget (10 MiB)
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Default nesting budget
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Minimum cost charged for any aggregate token or value
pub const MIN_OBJECT_SIZE: usize = 24;

/// Base cost of a string before its character data
pub const STRING_BASE_COST: usize = 26;

/// Approximate cost of a string: base plus two bytes per UTF-16 unit
pub fn string_cost(value: &str) -> usize {
    STRING_BASE_COST + 2 * value.encode_utf16().count()
}

/// Monotonic byte counter and depth guard
///
/// `current_bytes` never exceeds `max_bytes`; a violating `add_bytes` fails
/// without applying the charge. Depth is checked on every increment.
#[derive(Debug)]
pub struct MemoryCounter {
    current_bytes: usize,
    max_bytes: usize,
    current_depth: usize,
    max_depth: usize,
}

impl MemoryCounter {
    /// Create a counter with explicit limits, falling back to the defaults
    pub fn new(max_bytes: Option<usize>, max_depth: Option<usize>) -> Self {
        Self {
            current_bytes: 0,
            max_bytes: max_bytes.unwrap_or(DEFAULT_MAX_BYTES),
            current_depth: 0,
            max_depth: max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        }
    }

    /// Bytes currently accounted
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    /// The byte budget
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Current nesting depth
    pub fn current_depth(&self) -> usize {
        self.current_depth
    }

    /// The nesting budget
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Charge `bytes`, failing if the total would exceed the budget
    pub fn add_bytes(&mut self, bytes: usize) -> Result<()> {
        let new_total = self.current_bytes.saturating_add(bytes);
        if new_total > self.max_bytes {
            return Err(FlowError::evaluation(
                EX0012,
                "Maximum allowed memory exceeded",
            ));
        }
        self.current_bytes = new_total;
        Ok(())
    }

    /// Release previously charged bytes
    pub fn subtract_bytes(&mut self, bytes: usize) {
        self.current_bytes = self.current_bytes.saturating_sub(bytes);
    }

    /// Charge the cost of a string
    pub fn add_string(&mut self, value: &str) -> Result<()> {
        self.add_bytes(string_cost(value))
    }

    /// Charge the cost of a template token
    ///
    /// `deep` traverses children once; otherwise only the head node is
    /// accounted. Walking into an already-accounted token must use
    /// `deep = false` so no token is charged twice.
    pub fn add_token(&mut self, token: &TemplateToken, deep: bool) -> Result<()> {
        self.add_bytes(token.byte_size(deep))
    }

    /// Charge the cost of a canonical value
    pub fn add_value(&mut self, value: &FlowValue, deep: bool) -> Result<()> {
        self.add_bytes(value.byte_size(deep))
    }

    /// Enter a nesting level, failing beyond the depth budget
    pub fn increment_depth(&mut self) -> Result<()> {
        if self.current_depth >= self.max_depth {
            return Err(FlowError::evaluation(EX0013, "Maximum object depth exceeded"));
        }
        self.current_depth += 1;
        Ok(())
    }

    /// Leave a nesting level
    pub fn decrement_depth(&mut self) {
        self.current_depth = self.current_depth.saturating_sub(1);
    }
}

impl Default for MemoryCounter {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_cost_is_utf16_based() {
        assert_eq!(string_cost(""), 26);
        assert_eq!(string_cost("ab"), 30);
        // '𝄞' is one char but two UTF-16 units
        assert_eq!(string_cost("𝄞"), 30);
    }

    #[test]
    fn test_add_bytes_enforces_budget() {
        let mut counter = MemoryCounter::new(Some(100), None);
        counter.add_bytes(60).unwrap();
        counter.add_bytes(40).unwrap();
        let err = counter.add_bytes(1).unwrap_err();
        assert!(err.is_fatal());
        // the failed charge was not applied
        assert_eq!(counter.current_bytes(), 100);
    }

    #[test]
    fn test_subtract_restores_headroom() {
        let mut counter = MemoryCounter::new(Some(100), None);
        counter.add_bytes(100).unwrap();
        counter.subtract_bytes(30);
        counter.add_bytes(30).unwrap();
        assert_eq!(counter.current_bytes(), 100);
    }

    #[test]
    fn test_depth_guard() {
        let mut counter = MemoryCounter::new(None, Some(2));
        counter.increment_depth().unwrap();
        counter.increment_depth().unwrap();
        assert!(counter.increment_depth().is_err());
        counter.decrement_depth();
        counter.increment_depth().unwrap();
        assert_eq!(counter.current_depth(), 2);
    }
}
