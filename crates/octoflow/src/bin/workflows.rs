//! Batch workflow commands
//!
//! Two commands are supported:
//!
//! - `parse-workflow`: read an entry file (with its companion files
//!   registered in the file table) against the built-in workflow schema.
//! - `evaluate-strategy`: expand a persisted strategy token against
//!   caller-supplied named values.
//!
//! ```text
//! {"command": "parse-workflow", "entryFileName": "ci.yml", "files": [{"name": "ci.yml", "content": "…"}]}
//! ---
//! {"command": "evaluate-strategy", "fileTable": ["ci.yml"], "context": {"inputs": {…}}, "token": {…}}
//! ---
//! ```

use std::rc::Rc;

use clap::Parser;
use serde_json::{json, Value};

use octoflow::cli::{init_tracing, load_workflow_schema, run_batches, SharedTraceWriter};
use octoflow::expressions::FlowValue;
use octoflow::templates::{
    deserialize_token, evaluate_template, read_template, serialize_token, TemplateContext,
    YamlObjectReader,
};

#[derive(Parser)]
#[command(name = "octoflow-workflows", version, about = "Parse workflows and evaluate strategies in batch")]
struct Args {
    /// Indent responses with two spaces
    #[arg(long)]
    pretty: bool,
}

fn main() -> std::io::Result<()> {
    init_tracing();
    let args = Args::parse();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    run_batches(stdin.lock(), &mut stdout, args.pretty, handle_document)
}

fn error_response(batch_id: &Value, message: String) -> Vec<Value> {
    vec![json!({
        "batchId": batch_id,
        "log": [],
        "value": null,
        "errors": [message],
    })]
}

fn handle_document(document: &str) -> Vec<Value> {
    let request: Value = match serde_json::from_str(document) {
        Ok(request) => request,
        Err(error) => {
            return error_response(&Value::Null, format!("The request is not valid JSON: {error}"));
        }
    };
    let batch_id = request.get("batchId").cloned().unwrap_or(Value::Null);

    match request.get("command").and_then(Value::as_str) {
        Some("parse-workflow") => parse_workflow(&batch_id, &request),
        Some("evaluate-strategy") => evaluate_strategy(&batch_id, &request),
        other => error_response(
            &batch_id,
            format!("Unknown command '{}'", other.unwrap_or("")),
        ),
    }
}

fn new_context(trace: &SharedTraceWriter) -> Result<TemplateContext, String> {
    let schema = load_workflow_schema().map_err(|error| error.to_string())?;
    Ok(TemplateContext::new(Rc::new(schema)).with_trace(Box::new(trace.clone())))
}

fn parse_workflow(batch_id: &Value, request: &Value) -> Vec<Value> {
    let trace = SharedTraceWriter::new();
    let mut context = match new_context(&trace) {
        Ok(context) => context,
        Err(message) => return error_response(batch_id, message),
    };

    let entry_name = request
        .get("entryFileName")
        .and_then(Value::as_str)
        .unwrap_or("");
    let files = request
        .get("files")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut entry_content: Option<&str> = None;
    for file in &files {
        let name = file.get("name").and_then(Value::as_str).unwrap_or("");
        context.get_file_id(name);
        if name.eq_ignore_ascii_case(entry_name) {
            entry_content = file.get("content").and_then(Value::as_str);
        }
    }
    let Some(content) = entry_content else {
        return error_response(
            batch_id,
            format!("The entry file '{entry_name}' was not supplied"),
        );
    };

    // event-level parse: rejects anchors/aliases before anything is
    // materialized
    let mut source = match YamlObjectReader::from_str(content) {
        Ok(source) => source,
        Err(error) => return error_response(batch_id, error.to_string()),
    };
    let read = match read_template(&mut context, "workflow-root", &mut source, Some(entry_name)) {
        Ok(read) => read,
        Err(error) => return error_response(batch_id, error.to_string()),
    };

    let errors: Vec<String> = context.errors.messages().iter().map(|m| m.to_string()).collect();
    vec![json!({
        "batchId": batch_id,
        "log": trace.take_lines(),
        "value": serialize_token(&read.value),
        "errors": errors,
    })]
}

fn evaluate_strategy(batch_id: &Value, request: &Value) -> Vec<Value> {
    let trace = SharedTraceWriter::new();
    let mut context = match new_context(&trace) {
        Ok(context) => context,
        Err(message) => return error_response(batch_id, message),
    };

    if let Some(file_table) = request.get("fileTable").and_then(Value::as_array) {
        for name in file_table {
            if let Some(name) = name.as_str() {
                context.get_file_id(name);
            }
        }
    }
    if let Some(named) = request.get("context").and_then(Value::as_object) {
        for (name, value) in named {
            context
                .expressions
                .add_named_value(name.as_str(), FlowValue::from_json(value));
        }
    }

    let Some(token_value) = request.get("token") else {
        return error_response(batch_id, "The request is missing 'token'".to_string());
    };
    let token = match deserialize_token(token_value) {
        Ok(token) => token,
        Err(error) => return error_response(batch_id, error.to_string()),
    };

    let bytes = token.byte_size(true);
    if let Err(error) = context.memory.add_bytes(bytes) {
        return error_response(batch_id, error.to_string());
    }
    let expanded = match evaluate_template(&mut context, &token, bytes) {
        Ok(expanded) => expanded,
        Err(error) => return error_response(batch_id, error.to_string()),
    };

    let errors: Vec<String> = context.errors.messages().iter().map(|m| m.to_string()).collect();
    vec![json!({
        "batchId": batch_id,
        "log": trace.take_lines(),
        "value": serialize_token(&expanded),
        "errors": errors,
    })]
}
