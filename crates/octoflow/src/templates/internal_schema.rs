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

//! The self-describing internal schema
//!
//! User schemas are templates too; this hard-coded schema describes the
//! allowed shape of a schema document and is what `TemplateSchema::load`
//! validates against. It is built programmatically once per thread and is
//! afterwards read-only.

use std::rc::Rc;

use super::schema::{
    Definition, DefinitionContext, MappingDefinition, OneOfDefinition, PropertyDefinition,
    SequenceDefinition, TemplateSchema,
};

thread_local! {
    static INTERNAL_SCHEMA: Rc<TemplateSchema> = Rc::new(build_internal_schema());
}

/// The shared internal schema instance
pub fn internal_schema() -> Rc<TemplateSchema> {
    INTERNAL_SCHEMA.with(Rc::clone)
}

fn property(type_name: &str, required: bool) -> PropertyDefinition {
    PropertyDefinition {
        type_name: Rc::from(type_name),
        required,
    }
}

fn mapping(
    properties: Vec<(&str, PropertyDefinition)>,
    loose: Option<(&str, &str)>,
) -> Definition {
    Definition::Mapping(MappingDefinition {
        context: DefinitionContext::default(),
        properties: Some(
            properties
                .into_iter()
                .map(|(name, definition)| (Rc::from(name), definition))
                .collect(),
        ),
        loose_key_type: loose.map(|(key, _)| Rc::from(key)),
        loose_value_type: loose.map(|(_, value)| Rc::from(value)),
    })
}

/// Shared properties every definition body accepts
fn definition_common() -> Vec<(&'static str, PropertyDefinition)> {
    vec![
        ("description", property("string", false)),
        ("context", property("sequence-of-non-empty-string", false)),
        (
            "evaluator-context",
            property("sequence-of-non-empty-string", false),
        ),
    ]
}

fn definition_body(structure_key: &'static str, structure_type: &str) -> Definition {
    let mut properties = definition_common();
    properties.push((structure_key, property(structure_type, true)));
    mapping(properties, None)
}

fn build_internal_schema() -> TemplateSchema {
    let mut schema = TemplateSchema::with_common_definitions();
    let mut add = |name: &str, definition: Definition| {
        schema
            .add_definition(name, definition)
            .expect("internal schema definitions are unique");
    };

    add(
        "template-schema",
        mapping(
            vec![
                ("version", property("non-empty-string", false)),
                ("definitions", property("definitions", false)),
            ],
            None,
        ),
    );
    add(
        "definitions",
        mapping(vec![], Some(("non-empty-string", "definition"))),
    );
    add(
        "definition",
        Definition::OneOf(OneOfDefinition {
            context: DefinitionContext::default(),
            one_of: vec![
                Rc::from("null-definition"),
                Rc::from("boolean-definition"),
                Rc::from("number-definition"),
                Rc::from("string-definition"),
                Rc::from("sequence-definition"),
                Rc::from("mapping-definition"),
                Rc::from("one-of-definition"),
            ],
        }),
    );

    add(
        "null-definition",
        definition_body("null", "null-definition-properties"),
    );
    add("null-definition-properties", mapping(vec![], None));
    add(
        "boolean-definition",
        definition_body("boolean", "boolean-definition-properties"),
    );
    add("boolean-definition-properties", mapping(vec![], None));
    add(
        "number-definition",
        definition_body("number", "number-definition-properties"),
    );
    add("number-definition-properties", mapping(vec![], None));

    add(
        "string-definition",
        definition_body("string", "string-definition-properties"),
    );
    add(
        "string-definition-properties",
        mapping(
            vec![
                ("constant", property("non-empty-string", false)),
                ("ignore-case", property("boolean", false)),
                ("require-non-empty", property("boolean", false)),
            ],
            None,
        ),
    );

    add(
        "sequence-definition",
        definition_body("sequence", "sequence-definition-properties"),
    );
    add(
        "sequence-definition-properties",
        mapping(vec![("item-type", property("non-empty-string", true))], None),
    );

    add(
        "mapping-definition",
        definition_body("mapping", "mapping-definition-properties"),
    );
    add(
        "mapping-definition-properties",
        mapping(
            vec![
                ("properties", property("properties", false)),
                ("loose-key-type", property("non-empty-string", false)),
                ("loose-value-type", property("non-empty-string", false)),
            ],
            None,
        ),
    );
    add(
        "properties",
        mapping(vec![], Some(("non-empty-string", "property-value"))),
    );
    add(
        "property-value",
        Definition::OneOf(OneOfDefinition {
            context: DefinitionContext::default(),
            one_of: vec![Rc::from("non-empty-string"), Rc::from("property-value-mapping")],
        }),
    );
    add(
        "property-value-mapping",
        mapping(
            vec![
                ("type", property("non-empty-string", true)),
                ("required", property("boolean", false)),
            ],
            None,
        ),
    );

    add(
        "one-of-definition",
        definition_body("one-of", "sequence-of-non-empty-string"),
    );
    add(
        "sequence-of-non-empty-string",
        Definition::Sequence(SequenceDefinition {
            context: DefinitionContext::default(),
            item_type: Rc::from("non-empty-string"),
        }),
    );

    schema
}
