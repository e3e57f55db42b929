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

//! The template stack: tokens, schema, reader, unraveler and sources

pub mod context;
pub mod internal_schema;
pub mod reader;
pub mod schema;
pub mod serialization;
pub mod sources;
pub mod token;
pub mod unraveler;

pub use context::{TemplateContext, TemplateValidationError, TemplateValidationErrors};
pub use internal_schema::internal_schema;
pub use reader::{read_template, ReadResult};
pub use schema::{
    parse_context_entries, Definition, DefinitionContext, DefinitionKind, MappingDefinition,
    OneOfDefinition, PropertyDefinition, SequenceDefinition, StringDefinition, TemplateSchema,
};
pub use serialization::{deserialize_token, serialize_token};
pub use sources::{
    EventMeta, JsonObjectReader, ObjectReader, ScalarEvent, ScalarValue, YamlObjectReader,
};
pub use token::{to_owned_flow_value, TemplateToken, TokenMeta};
pub use unraveler::{evaluate_template, TemplateUnraveler};
