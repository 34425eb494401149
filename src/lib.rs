// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Biproportional ("double-proportional") seat apportionment, as used for
//! multi-district parliamentary elections, together with the classic
//! one-dimensional divisor methods it is built upon.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod arithmetic;
pub mod biproportional;
pub mod divisor;
pub mod end_result;
pub mod error;
pub mod lot;
pub mod parse;
pub mod quorum;
pub mod report;
pub mod types;
mod util;
pub mod write;
