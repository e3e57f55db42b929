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

//! Trace-writer seam consumed by the evaluator and the template stack

/// Sink for evaluation and templating trace output
///
/// The core never writes to a logging framework directly; callers inject the
/// sink they need (buffered for CLI responses, `tracing` for services).
pub trait TraceWriter {
    /// Record a user-facing trace line
    fn info(&mut self, message: &str);

    /// Record a diagnostic trace line
    fn verbose(&mut self, message: &str);
}

/// Discards all trace output
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTraceWriter;

impl TraceWriter for NoopTraceWriter {
    fn info(&mut self, _message: &str) {}

    fn verbose(&mut self, _message: &str) {}
}

/// Collects info-level lines for inclusion in a CLI response
#[derive(Debug, Default)]
pub struct BufferedTraceWriter {
    lines: Vec<String>,
    capture_verbose: bool,
}

impl BufferedTraceWriter {
    /// Create a writer capturing info-level lines only
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer that also captures verbose lines
    pub fn with_verbose() -> Self {
        Self {
            lines: Vec::new(),
            capture_verbose: true,
        }
    }

    /// The captured lines, in order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Take the captured lines, leaving the writer empty
    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl TraceWriter for BufferedTraceWriter {
    fn info(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }

    fn verbose(&mut self, message: &str) {
        if self.capture_verbose {
            self.lines.push(message.to_string());
        }
    }
}

/// Forwards trace output to the `tracing` macros
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn info(&mut self, message: &str) {
        tracing::info!(target: "octoflow", "{message}");
    }

    fn verbose(&mut self, message: &str) {
        tracing::debug!(target: "octoflow", "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_writer_captures_info() {
        let mut writer = BufferedTraceWriter::new();
        writer.info("one");
        writer.verbose("hidden");
        writer.info("two");
        assert_eq!(writer.lines(), &["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_buffered_writer_verbose_opt_in() {
        let mut writer = BufferedTraceWriter::with_verbose();
        writer.verbose("shown");
        assert_eq!(writer.take_lines(), vec!["shown".to_string()]);
        assert!(writer.lines().is_empty());
    }
}
