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

//! Stable error codes for expression and template failures
//!
//! Every failure the engine can report carries an `ErrorCode`. The codes are
//! part of the CLI wire format (the `errorCode` response field), so existing
//! constants must never be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, numeric error code rendered as `EX0001`-style strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

/// Static description for an error code
#[derive(Debug, Clone, Copy)]
pub struct ErrorInfo {
    /// The code the info describes
    pub code: ErrorCode,
    /// Short human-readable description
    pub description: &'static str,
}

/// An unexpected symbol was found while lexing an expression
pub const EX0001: ErrorCode = ErrorCode::new(1);
/// The expression ended before a complete parse tree was produced
pub const EX0002: ErrorCode = ErrorCode::new(2);
/// The expression exceeds the maximum allowed length
pub const EX0003: ErrorCode = ErrorCode::new(3);
/// The expression tree exceeds the maximum allowed depth
pub const EX0004: ErrorCode = ErrorCode::new(4);
/// A function name could not be resolved
pub const EX0005: ErrorCode = ErrorCode::new(5);
/// A named context could not be resolved
pub const EX0006: ErrorCode = ErrorCode::new(6);
/// A function was called with fewer parameters than it accepts
pub const EX0007: ErrorCode = ErrorCode::new(7);
/// A function was called with more parameters than it accepts
pub const EX0008: ErrorCode = ErrorCode::new(8);
/// A format string is malformed or references a missing argument
pub const EX0009: ErrorCode = ErrorCode::new(9);
/// A format string carries a non-empty format specifier
pub const EX0010: ErrorCode = ErrorCode::new(10);
/// Input to `fromJson` is not valid JSON
pub const EX0011: ErrorCode = ErrorCode::new(11);
/// The maximum allowed memory was exceeded
pub const EX0012: ErrorCode = ErrorCode::new(12);
/// The maximum allowed object depth was exceeded
pub const EX0013: ErrorCode = ErrorCode::new(13);
/// One or more template validation errors were collected
pub const EX0014: ErrorCode = ErrorCode::new(14);
/// A schema document is malformed or internally inconsistent
pub const EX0015: ErrorCode = ErrorCode::new(15);
/// The engine was driven through an invalid state transition
pub const EX0016: ErrorCode = ErrorCode::new(16);
/// An input document is unreadable or uses a disabled feature
pub const EX0017: ErrorCode = ErrorCode::new(17);

impl ErrorCode {
    /// Create an error code from its numeric value
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric value of this code
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Static information about this code
    pub fn info(&self) -> ErrorInfo {
        let description = match self.0 {
            1 => "Unexpected symbol",
            2 => "Unexpected end of expression",
            3 => "Exceeded max expression length",
            4 => "Exceeded max expression depth",
            5 => "Unrecognized function",
            6 => "Unrecognized named context",
            7 => "Too few parameters supplied",
            8 => "Too many parameters supplied",
            9 => "Invalid format string",
            10 => "Invalid format specifiers",
            11 => "Invalid JSON",
            12 => "Maximum allowed memory exceeded",
            13 => "Maximum object depth exceeded",
            14 => "Template validation failed",
            15 => "Invalid schema",
            16 => "Invalid operation",
            17 => "Invalid document",
            _ => "Unknown error",
        };
        ErrorInfo {
            code: *self,
            description,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EX{:04}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        assert_eq!(EX0001.to_string(), "EX0001");
        assert_eq!(EX0012.to_string(), "EX0012");
    }

    #[test]
    fn test_info_lookup() {
        assert_eq!(EX0005.info().description, "Unrecognized function");
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
    }
}
