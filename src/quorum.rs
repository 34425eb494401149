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

//! Quorum filter, excluding parties whose vote share is too low from the
//! apportionment.

use crate::arithmetic::{format_decimal, integer};
use crate::error::ApportionmentError;
use crate::types::VoteMatrix;
use log::{debug, info};
use num::traits::Zero;
use num::{BigInt, BigRational};

/// Vote share thresholds, in percent.
///
/// A party passes the quorum if no threshold is configured, or if it reaches
/// any of the configured thresholds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuorumConfig {
    /// Share of the district votes that a party must reach in at least one
    /// district.
    pub district: Option<BigRational>,
    /// Share of the total votes of the union that a party must reach.
    pub total: Option<BigRational>,
}

impl QuorumConfig {
    /// Returns a configuration without any quorum.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns a configuration with only a district quorum.
    pub fn district(percent: u64) -> Self {
        QuorumConfig {
            district: Some(integer(percent)),
            total: None,
        }
    }

    /// Returns a configuration with only a total quorum.
    pub fn total(percent: u64) -> Self {
        QuorumConfig {
            district: None,
            total: Some(integer(percent)),
        }
    }

    /// Adds a total quorum as an alternative to the existing thresholds.
    pub fn or_total(mut self, percent: u64) -> Self {
        self.total = Some(integer(percent));
        self
    }

    /// Checks that all thresholds are within `[0, 100]`.
    pub fn validate(&self) -> Result<(), ApportionmentError> {
        let hundred = integer(100);
        for threshold in [&self.district, &self.total].into_iter().flatten() {
            if *threshold < BigRational::zero() || *threshold > hundred {
                return Err(ApportionmentError::QuorumConfigurationInvalid(
                    threshold.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns whether any threshold is configured.
    pub fn is_enabled(&self) -> bool {
        self.district.is_some() || self.total.is_some()
    }

    /// Human-readable description, e.g. "5% in any district or 3% in total".
    pub fn description(&self) -> String {
        match (&self.district, &self.total) {
            (None, None) => "none".to_owned(),
            (Some(district), None) => format!("{}% in any district", format_decimal(district, 6)),
            (None, Some(total)) => format!("{}% in total", format_decimal(total, 6)),
            (Some(district), Some(total)) => format!(
                "{}% in any district or {}% in total",
                format_decimal(district, 6),
                format_decimal(total, 6)
            ),
        }
    }
}

/// Outcome of the quorum filter for one party.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumResult {
    /// Index of the party.
    pub party: usize,
    /// Total votes of the party.
    pub votes: u64,
    /// Whether the district threshold was reached in at least one district.
    pub district_quorum_reached: bool,
    /// Whether the total threshold was reached.
    pub total_quorum_reached: bool,
    /// Whether the party participates in the apportionment.
    pub passed: bool,
}

/// Returns whether `votes` is at least `threshold` percent of `total`.
///
/// The comparison is exact and inclusive: a share exactly at the threshold
/// reaches it. If there are no votes at all, only a zero threshold is reached.
pub fn reaches_quorum(votes: u64, total: u64, threshold: &BigRational) -> bool {
    if total == 0 {
        return threshold.is_zero();
    }
    // votes / total * 100 >= threshold
    let share = BigRational::new(BigInt::from(votes) * BigInt::from(100), BigInt::from(total));
    share >= *threshold
}

/// Evaluates the quorum for every party (column) of the given vote matrix.
///
/// Failing parties are kept in the output, and their votes still count
/// towards the totals used to compute the shares of other parties.
pub fn evaluate(
    quorum: &QuorumConfig,
    votes: &VoteMatrix,
) -> Result<Vec<QuorumResult>, ApportionmentError> {
    quorum.validate()?;

    let district_totals = votes.row_sums();
    let grand_total = votes.total();
    let party_totals = votes.col_sums();

    let results: Vec<QuorumResult> = (0..votes.num_cols())
        .map(|party| {
            let district_quorum_reached = match &quorum.district {
                None => false,
                Some(threshold) => (0..votes.num_rows()).any(|row| {
                    reaches_quorum(votes.get(row, party), district_totals[row], threshold)
                }),
            };
            let total_quorum_reached = match &quorum.total {
                None => false,
                Some(threshold) => reaches_quorum(party_totals[party], grand_total, threshold),
            };
            let passed =
                !quorum.is_enabled() || district_quorum_reached || total_quorum_reached;
            debug!(
                "Quorum of party #{party}: votes = {}, district = {district_quorum_reached}, total = {total_quorum_reached} => {}",
                party_totals[party],
                if passed { "passed" } else { "failed" }
            );
            QuorumResult {
                party,
                votes: party_totals[party],
                district_quorum_reached,
                total_quorum_reached,
                passed,
            }
        })
        .collect();

    let num_failed = results.iter().filter(|r| !r.passed).count();
    if num_failed != 0 {
        info!(
            "{num_failed} of {} parties failed the quorum ({})",
            results.len(),
            quorum.description()
        );
    }

    Ok(results)
}
