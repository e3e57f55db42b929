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

//! Stdin/stdout batch framing shared by the binaries
//!
//! Input is a stream of JSON documents separated by `---` lines. Each
//! document is one request; every response is written as a JSON object
//! (single-line unless `--pretty`) and each batch is terminated with a
//! `---` line.

use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use crate::core::trace::TraceWriter;

/// The document delimiter line
pub const DOCUMENT_DELIMITER: &str = "---";

/// Run the batch loop: split stdin into documents, hand each to `handle`,
/// and frame the responses
pub fn run_batches<R, W, F>(
    input: R,
    output: &mut W,
    pretty: bool,
    mut handle: F,
) -> std::io::Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(&str) -> Vec<serde_json::Value>,
{
    let mut document = String::new();
    for line in input.lines() {
        let line = line?;
        if line.trim_end() == DOCUMENT_DELIMITER {
            flush_document(&mut document, output, pretty, &mut handle)?;
        } else {
            document.push_str(&line);
            document.push('\n');
        }
    }
    flush_document(&mut document, output, pretty, &mut handle)?;
    Ok(())
}

fn flush_document<W, F>(
    document: &mut String,
    output: &mut W,
    pretty: bool,
    handle: &mut F,
) -> std::io::Result<()>
where
    W: Write,
    F: FnMut(&str) -> Vec<serde_json::Value>,
{
    if document.trim().is_empty() {
        document.clear();
        return Ok(());
    }
    let responses = handle(document);
    document.clear();
    for response in responses {
        let rendered = if pretty {
            serde_json::to_string_pretty(&response)
        } else {
            serde_json::to_string(&response)
        }
        .unwrap_or_else(|_| "null".to_string());
        writeln!(output, "{rendered}")?;
    }
    writeln!(output, "{DOCUMENT_DELIMITER}")?;
    output.flush()
}

/// Trace writer whose captured lines stay accessible to the caller
///
/// The template context takes ownership of its trace writer; the CLIs keep
/// the shared handle so the captured lines can be attached to the response.
#[derive(Debug, Default, Clone)]
pub struct SharedTraceWriter {
    lines: Rc<RefCell<Vec<String>>>,
}

impl SharedTraceWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the captured lines
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut self.lines.borrow_mut())
    }
}

impl TraceWriter for SharedTraceWriter {
    fn info(&mut self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }

    fn verbose(&mut self, _message: &str) {}
}

/// Install a `tracing` subscriber when `OCTOFLOW_LOG` is set
pub fn init_tracing() {
    if std::env::var("OCTOFLOW_LOG").is_ok() {
        let filter = tracing_subscriber::EnvFilter::from_env("OCTOFLOW_LOG");
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_framing() {
        let input = "{\"n\": 1}\n---\n{\"n\": 2}\n---\n";
        let mut output = Vec::new();
        run_batches(input.as_bytes(), &mut output, false, |document| {
            let request: serde_json::Value = serde_json::from_str(document).unwrap();
            vec![json!({"echo": request["n"]})]
        })
        .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, "{\"echo\":1}\n---\n{\"echo\":2}\n---\n");
    }

    #[test]
    fn test_trailing_document_without_delimiter() {
        let input = "{\"n\": 3}\n";
        let mut output = Vec::new();
        run_batches(input.as_bytes(), &mut output, false, |_| {
            vec![json!({"ok": true})]
        })
        .unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "{\"ok\":true}\n---\n");
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let input = "---\n\n---\n";
        let mut output = Vec::new();
        run_batches(input.as_bytes(), &mut output, false, |_| {
            panic!("no document expected")
        })
        .unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_multiple_responses_per_document() {
        let input = "{}\n---\n";
        let mut output = Vec::new();
        run_batches(input.as_bytes(), &mut output, false, |_| {
            vec![json!({"sequence": 0}), json!({"sequence": 1})]
        })
        .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "{\"sequence\":0}\n{\"sequence\":1}\n---\n"
        );
    }

    #[test]
    fn test_shared_trace_writer() {
        let shared = SharedTraceWriter::new();
        let mut handle = shared.clone();
        handle.info("line");
        assert_eq!(shared.take_lines(), vec!["line".to_string()]);
        assert!(shared.take_lines().is_empty());
    }
}
