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

//! Deterministic resolution of ties ("lot decisions").
//!
//! Divisor methods can leave several contenders with exactly the same
//! quotient for fewer remaining seats. Rather than drawing lots at random,
//! ties are broken by a fixed priority order, and every such event is
//! recorded as a [`LotDecision`] so that it can be audited.

use crate::types::{DistrictElection, Party};
use std::fmt;

/// Rule deciding which contender wins a tie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LotRule {
    /// The contender with the lexicographically lowest identifier wins.
    #[default]
    LowestId,
    /// Parties are ranked by the declared tie-break order, and districts by
    /// their declaration order.
    TieOrder,
}

impl LotRule {
    /// Human-readable name of the rule.
    pub fn description(&self) -> &'static str {
        match self {
            LotRule::LowestId => "lowest identifier",
            LotRule::TieOrder => "declared tie-break order",
        }
    }
}

/// Apportionment stage in which a tie occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Distribution of the union's seats among parties.
    SuperApportionment,
    /// Distribution of each party's seats among districts.
    SubApportionment,
    /// Apportionment of a single election among its lists.
    SingleApportionment,
    /// Apportionment among list unions and unaffiliated lists.
    ListUnionApportionment,
    /// Apportionment among the lists of a list union.
    ListApportionment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::SuperApportionment => "super-apportionment",
            Stage::SubApportionment => "sub-apportionment",
            Stage::SingleApportionment => "apportionment",
            Stage::ListUnionApportionment => "list union apportionment",
            Stage::ListApportionment => "list apportionment",
        };
        f.write_str(name)
    }
}

/// Object of a tie.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Contender {
    /// A party, by index.
    Party(usize),
    /// A list union, by index.
    ListUnion(usize),
    /// One cell of the seat matrix.
    Cell {
        /// Index of the district (row).
        district: usize,
        /// Index of the party (column).
        party: usize,
    },
}

/// Record of one tie that was broken by the lot rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotDecision {
    /// Stage in which the tie occurred.
    pub stage: Stage,
    /// All the contenders of the tie.
    pub contenders: Vec<Contender>,
    /// Contenders that were granted a seat.
    pub winners: Vec<Contender>,
    /// Number of seats that were contested.
    pub seats: usize,
    /// Rule that decided the winners.
    pub rule: LotRule,
}

/// Derives tie-break priorities of parties and districts from a [`LotRule`].
///
/// A lower priority value wins a tie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotResolver {
    rule: LotRule,
    party_priority: Vec<usize>,
    district_priority: Vec<usize>,
}

impl LotResolver {
    /// Creates a resolver for the given parties and districts. The
    /// `tie_order` lists party indices from highest to lowest priority.
    pub fn new(
        rule: LotRule,
        parties: &[Party],
        tie_order: &[usize],
        districts: &[DistrictElection],
    ) -> Self {
        let (party_priority, district_priority) = match rule {
            LotRule::LowestId => (
                rank_by_key(parties.len(), |i| &parties[i].id),
                rank_by_key(districts.len(), |i| &districts[i].id),
            ),
            LotRule::TieOrder => {
                let mut party_priority: Vec<usize> = vec![usize::MAX; parties.len()];
                for (rank, &party) in tie_order.iter().enumerate() {
                    if party < parties.len() {
                        party_priority[party] = rank;
                    }
                }
                // Parties missing from the tie order come last, in declaration order.
                let mut next = tie_order.len();
                for priority in party_priority.iter_mut() {
                    if *priority == usize::MAX {
                        *priority = next;
                        next += 1;
                    }
                }
                (party_priority, (0..districts.len()).collect())
            }
        };
        LotResolver {
            rule,
            party_priority,
            district_priority,
        }
    }

    /// Returns the rule applied by this resolver.
    pub fn rule(&self) -> LotRule {
        self.rule
    }

    /// Priority of each party.
    pub fn party_priority(&self) -> &[usize] {
        &self.party_priority
    }

    /// Priority of each district.
    pub fn district_priority(&self) -> &[usize] {
        &self.district_priority
    }

    /// Records a decision of the given stage.
    pub fn decision(
        &self,
        stage: Stage,
        contenders: Vec<Contender>,
        winners: Vec<Contender>,
        seats: usize,
    ) -> LotDecision {
        LotDecision {
            stage,
            contenders,
            winners,
            seats,
            rule: self.rule,
        }
    }
}

/// Returns the rank of each element when sorted by the given key, with ties
/// broken by index.
fn rank_by_key<K: Ord>(len: usize, key: impl Fn(usize) -> K) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.sort_by(|&a, &b| key(a).cmp(&key(b)).then(a.cmp(&b)));
    let mut rank = vec![0; len];
    for (r, i) in order.into_iter().enumerate() {
        rank[i] = r;
    }
    rank
}
