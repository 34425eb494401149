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

//! Errors reported while computing an apportionment.

use std::io;

/// Failure of one apportionment computation. A failure is local to the union
/// or election being computed, and never comes with a partial result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApportionmentError {
    /// No allocation matching the required seat totals could be found.
    #[error("Apportionment infeasible: {0}")]
    Infeasible(String),
    /// A quorum threshold is outside of the [0, 100] range.
    #[error("Quorum configuration invalid: {0}% is outside of [0, 100]")]
    QuorumConfigurationInvalid(String),
    /// The input data is inconsistent, e.g. the configured seats don't match
    /// the sum of the district mandates.
    #[error("Input inconsistent: {0}")]
    InputInconsistent(String),
    /// No union or election has the requested identifier.
    #[error("Unknown election: {0}")]
    UnknownElection(String),
}

/// Failure to parse a contest file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The input couldn't be read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The input is malformed.
    #[error("Line {line}: {message}")]
    Syntax {
        /// Line number (starting at 1) where the error was found.
        line: usize,
        /// Description of the problem.
        message: String,
    },
}

impl ParseError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }
}
