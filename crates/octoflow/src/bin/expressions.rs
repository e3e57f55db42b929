//! Batch expression evaluator
//!
//! Reads JSON requests from stdin (separated by `---` lines) and writes one
//! response object per expression:
//!
//! ```text
//! {"batchId": "…", "context": {"github": {…}}, "expressions": ["1 == 1"]}
//! ---
//! ```

use clap::Parser;
use serde_json::{json, Value};

use octoflow::cli::{init_tracing, run_batches};
use octoflow::core::{BufferedTraceWriter, FlowError};
use octoflow::expressions::{parse, EvaluationOptions, ExpressionContext, FlowValue};

#[derive(Parser)]
#[command(name = "octoflow-expressions", version, about = "Evaluate workflow expressions in batch")]
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

fn handle_document(document: &str) -> Vec<Value> {
    let request: Value = match serde_json::from_str(document) {
        Ok(request) => request,
        Err(error) => {
            return vec![json!({
                "batchId": null,
                "sequence": 0,
                "log": [],
                "result": null,
                "errorMessage": format!("The request is not valid JSON: {error}"),
                "errorCode": "EX0016",
            })];
        }
    };

    let batch_id = request.get("batchId").cloned().unwrap_or(Value::Null);
    let mut bindings = ExpressionContext::new();
    if let Some(context) = request.get("context").and_then(Value::as_object) {
        for (name, value) in context {
            bindings.add_named_value(name.as_str(), FlowValue::from_json(value));
        }
    }

    let expressions = request
        .get("expressions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    expressions
        .iter()
        .enumerate()
        .map(|(sequence, expression)| {
            let mut trace = BufferedTraceWriter::new();
            let outcome = evaluate_one(expression, &bindings, &mut trace);
            match outcome {
                Ok(result) => json!({
                    "batchId": batch_id,
                    "sequence": sequence,
                    "log": trace.take_lines(),
                    "result": result,
                    "errorMessage": null,
                    "errorCode": null,
                }),
                Err(error) => json!({
                    "batchId": batch_id,
                    "sequence": sequence,
                    "log": trace.take_lines(),
                    "result": null,
                    "errorMessage": error.to_string(),
                    "errorCode": error.error_code().to_string(),
                }),
            }
        })
        .collect()
}

fn evaluate_one(
    expression: &Value,
    bindings: &ExpressionContext,
    trace: &mut BufferedTraceWriter,
) -> Result<Value, FlowError> {
    let text = expression.as_str().ok_or_else(|| {
        FlowError::system(
            octoflow::core::error_code::EX0016,
            "Expressions must be strings",
        )
    })?;
    let named_contexts = bindings.named_context_infos();
    let functions = bindings.function_infos();
    let tree = parse(text, &named_contexts, &functions)?;
    let result = tree.evaluate(trace, bindings, EvaluationOptions::default())?;
    Ok(result.value.to_json())
}
