//! Batch template reader and expander
//!
//! Each request carries a schema document and a list of templates:
//!
//! ```text
//! {"batchId": "…", "schema": "{…}", "templates": [{"type": "workflow-root", "content": "…yaml…"}]}
//! ---
//! ```
//!
//! One response object is written per template with the persisted token
//! form under `result`. With `--expand-expressions`, templates are always
//! expanded; expression failures are reported in `errors` next to the
//! expanded result.

use std::rc::Rc;

use clap::Parser;
use serde_json::{json, Value};

use octoflow::cli::{init_tracing, run_batches, SharedTraceWriter};
use octoflow::expressions::FlowValue;
use octoflow::templates::{
    evaluate_template, read_template, serialize_token, TemplateContext, TemplateSchema,
    YamlObjectReader,
};

#[derive(Parser)]
#[command(name = "octoflow-templates", version, about = "Validate and expand workflow templates in batch")]
struct Args {
    /// Indent responses with two spaces
    #[arg(long)]
    pretty: bool,

    /// Expand `${{ … }}` expressions in the output
    #[arg(long = "expand-expressions")]
    expand_expressions: bool,
}

fn main() -> std::io::Result<()> {
    init_tracing();
    let args = Args::parse();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    run_batches(stdin.lock(), &mut stdout, args.pretty, |document| {
        handle_document(document, args.expand_expressions)
    })
}

fn handle_document(document: &str, expand: bool) -> Vec<Value> {
    let request: Value = match serde_json::from_str(document) {
        Ok(request) => request,
        Err(error) => {
            return vec![json!({
                "batchId": null,
                "sequence": 0,
                "log": [],
                "result": null,
                "errors": [format!("The request is not valid JSON: {error}")],
            })];
        }
    };
    let batch_id = request.get("batchId").cloned().unwrap_or(Value::Null);

    let schema_text = request.get("schema").and_then(Value::as_str).unwrap_or("");
    let schema = match TemplateSchema::load_json(schema_text) {
        Ok(schema) => Rc::new(schema),
        Err(error) => {
            return vec![json!({
                "batchId": batch_id,
                "sequence": 0,
                "log": [],
                "result": null,
                "errors": [error.to_string()],
            })];
        }
    };

    let templates = request
        .get("templates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    templates
        .iter()
        .enumerate()
        .map(|(sequence, template)| {
            let (result, errors, log) =
                handle_template(schema.clone(), template, sequence, &request, expand);
            json!({
                "batchId": batch_id,
                "sequence": sequence,
                "log": log,
                "result": result,
                "errors": errors,
            })
        })
        .collect()
}

fn handle_template(
    schema: Rc<TemplateSchema>,
    template: &Value,
    sequence: usize,
    request: &Value,
    expand: bool,
) -> (Value, Vec<String>, Vec<String>) {
    let type_name = template.get("type").and_then(Value::as_str).unwrap_or("any");
    let content = template.get("content").and_then(Value::as_str).unwrap_or("");

    // event-level parse: rejects anchors/aliases before anything is
    // materialized
    let mut source = match YamlObjectReader::from_str(content) {
        Ok(source) => source,
        Err(error) => {
            return (Value::Null, vec![error.to_string()], Vec::new());
        }
    };

    let trace = SharedTraceWriter::new();
    let mut context = TemplateContext::new(schema).with_trace(Box::new(trace.clone()));
    if let Some(named) = request.get("context").and_then(Value::as_object) {
        for (name, value) in named {
            context
                .expressions
                .add_named_value(name.as_str(), FlowValue::from_json(value));
        }
    }

    let file_name = format!("template-{sequence}.yml");
    let read = match read_template(&mut context, type_name, &mut source, Some(&file_name)) {
        Ok(read) => read,
        Err(error) => {
            let mut errors: Vec<String> =
                context.errors.messages().iter().map(|m| m.to_string()).collect();
            errors.push(error.to_string());
            return (Value::Null, errors, trace.take_lines());
        }
    };

    let token = if expand {
        match evaluate_template(&mut context, &read.value, read.bytes) {
            Ok(token) => token,
            Err(error) => {
                let mut errors: Vec<String> =
                    context.errors.messages().iter().map(|m| m.to_string()).collect();
                errors.push(error.to_string());
                return (Value::Null, errors, trace.take_lines());
            }
        }
    } else {
        read.value
    };

    let errors: Vec<String> = context.errors.messages().iter().map(|m| m.to_string()).collect();
    (serialize_token(&token), errors, trace.take_lines())
}
