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

//! Built-in expression functions
//!
//! One module per function. Each exposes an `evaluate` taking the function
//! node and the evaluation context, returning the result value and its
//! memory hint.

pub mod contains;
pub mod ends_with;
pub mod format;
pub mod from_json;
pub mod join;
pub mod starts_with;
pub mod to_json;

pub use format::format_strings;
