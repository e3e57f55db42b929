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

//! Built-in schema used by the workflows binary
//!
//! The core is format-agnostic; this compact workflow schema is data the
//! binary feeds it. It covers the root mapping, a loose jobs mapping,
//! run/uses steps (a one-of disambiguated by property name), strategy and
//! env.

use crate::core::error::Result;
use crate::templates::TemplateSchema;

/// The embedded workflow schema document
pub const WORKFLOW_SCHEMA_JSON: &str = r#"{
    "version": "workflow-v1.0",
    "definitions": {
        "workflow-root": {
            "mapping": {
                "properties": {
                    "name": "string",
                    "on": "any",
                    "env": "env",
                    "jobs": {"type": "jobs", "required": true}
                }
            }
        },
        "jobs": {
            "mapping": {
                "loose-key-type": "non-empty-string",
                "loose-value-type": "job"
            }
        },
        "job": {
            "context": ["github", "inputs", "needs", "vars"],
            "mapping": {
                "properties": {
                    "name": "string-runtime",
                    "runs-on": "any",
                    "needs": "any",
                    "if": "string-runtime",
                    "env": "env",
                    "strategy": "strategy",
                    "steps": "steps"
                }
            }
        },
        "strategy": {
            "context": ["github", "inputs", "needs", "vars"],
            "mapping": {
                "properties": {
                    "matrix": "any",
                    "fail-fast": "boolean",
                    "max-parallel": "number"
                }
            }
        },
        "steps": {
            "context": ["github", "inputs", "needs", "vars", "matrix", "strategy", "steps", "env"],
            "sequence": {"item-type": "step"}
        },
        "step": {
            "one-of": ["run-step", "uses-step"]
        },
        "run-step": {
            "mapping": {
                "properties": {
                    "name": "string-runtime",
                    "id": "string",
                    "if": "string-runtime",
                    "run": {"type": "string-runtime", "required": true},
                    "shell": "string",
                    "working-directory": "string-runtime",
                    "env": "env"
                }
            }
        },
        "uses-step": {
            "mapping": {
                "properties": {
                    "name": "string-runtime",
                    "id": "string",
                    "if": "string-runtime",
                    "uses": {"type": "non-empty-string", "required": true},
                    "with": "env",
                    "env": "env"
                }
            }
        },
        "env": {
            "context": ["github", "inputs", "needs", "vars", "matrix", "strategy"],
            "mapping": {
                "loose-key-type": "non-empty-string",
                "loose-value-type": "string-runtime"
            }
        },
        "string-runtime": {
            "context": ["github", "inputs", "needs", "vars", "matrix", "strategy", "steps", "env"],
            "string": {}
        }
    }
}"#;

/// Load and validate the embedded workflow schema
pub fn load_workflow_schema() -> Result<TemplateSchema> {
    TemplateSchema::load_json(WORKFLOW_SCHEMA_JSON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_schema_loads() {
        let schema = load_workflow_schema().unwrap();
        assert_eq!(schema.version.as_deref(), Some("workflow-v1.0"));
        assert!(schema.get_definition("workflow-root").is_some());
        assert!(schema.get_definition("step").is_some());
    }
}
