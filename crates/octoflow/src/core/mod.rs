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

//! Core types shared by the expression and template subsystems

pub mod error;
pub mod error_code;
pub mod memory;
pub mod trace;

pub use error::{FlowError, Result, SourceLocation};
pub use error_code::{ErrorCode, ErrorInfo};
pub use memory::{string_cost, MemoryCounter, DEFAULT_MAX_BYTES, DEFAULT_MAX_DEPTH, MIN_OBJECT_SIZE};
pub use trace::{BufferedTraceWriter, NoopTraceWriter, TraceWriter, TracingTraceWriter};
