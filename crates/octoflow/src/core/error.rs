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

//! Core error types for expression parsing, evaluation and templating

use std::fmt;
use thiserror::Error;

use super::error_code::{ErrorCode, EX0012, EX0013};

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Source position within a template file
///
/// Line and column are 1-based. Object sources that cannot report positions
/// leave both unset on the tokens they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Line: {}, Col: {})", self.line, self.column)
    }
}

/// Error type shared by the expression and template subsystems
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// Expression parse failure with a 1-based character position
    #[error("{message}")]
    Parse {
        /// Error code
        error_code: ErrorCode,
        /// Human-readable message, already carrying position context
        message: String,
        /// Expression text being parsed
        expression: String,
        /// 1-based character position of the offending token
        position: Option<usize>,
    },

    /// Expression evaluation failure
    #[error("{message}")]
    Evaluation {
        /// Error code
        error_code: ErrorCode,
        /// Human-readable message
        message: String,
    },

    /// Combined template validation failure
    #[error("{message}")]
    Validation {
        /// Error code
        error_code: ErrorCode,
        /// All collected validation messages joined with newlines
        message: String,
    },

    /// Malformed or internally inconsistent schema
    #[error("{message}")]
    Schema {
        /// Error code
        error_code: ErrorCode,
        /// Human-readable message
        message: String,
        /// Name of the definition at fault, when known
        definition: Option<String>,
    },

    /// The engine was driven through an invalid state transition
    #[error("{message}")]
    System {
        /// Error code
        error_code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

impl FlowError {
    /// Create a parse error
    pub fn parse(
        error_code: ErrorCode,
        message: impl Into<String>,
        expression: impl Into<String>,
        position: Option<usize>,
    ) -> Self {
        Self::Parse {
            error_code,
            message: message.into(),
            expression: expression.into(),
            position,
        }
    }

    /// Create an evaluation error
    pub fn evaluation(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Evaluation {
            error_code,
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Schema {
            error_code,
            message: message.into(),
            definition: None,
        }
    }

    /// Create a schema error naming the definition at fault
    pub fn schema_definition(
        error_code: ErrorCode,
        message: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        Self::Schema {
            error_code,
            message: message.into(),
            definition: Some(definition.into()),
        }
    }

    /// Create a system error
    pub fn system(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            error_code,
            message: message.into(),
        }
    }

    /// The error code carried by this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Parse { error_code, .. } => *error_code,
            Self::Evaluation { error_code, .. } => *error_code,
            Self::Validation { error_code, .. } => *error_code,
            Self::Schema { error_code, .. } => *error_code,
            Self::System { error_code, .. } => *error_code,
        }
    }

    /// Whether this error must terminate the whole operation
    ///
    /// Memory and depth violations are never locally recoverable: a reader or
    /// unraveler that swallowed them would defeat the resource bounds.
    pub fn is_fatal(&self) -> bool {
        matches!(self.error_code(), c if c == EX0012 || c == EX0013)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error_code::{EX0001, EX0012};

    #[test]
    fn test_error_code_accessor() {
        let err = FlowError::parse(EX0001, "Unexpected symbol: '~'", "~", Some(1));
        assert_eq!(err.error_code(), EX0001);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_memory_errors_are_fatal() {
        let err = FlowError::evaluation(EX0012, "Maximum allowed memory exceeded");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation::new(3, 7);
        assert_eq!(loc.to_string(), "(Line: 3, Col: 7)");
    }
}
