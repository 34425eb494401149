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

//! Computation of the end result of election unions and single elections:
//! quorum, super-apportionment and sub-apportionment.

use crate::arithmetic::{format_decimal, integer, Rounding};
use crate::biproportional::{self, MAX_ITERATIONS};
use crate::divisor::{self, Tie};
use crate::error::ApportionmentError;
use crate::lot::{Contender, LotDecision, LotResolver, LotRule, Stage};
use crate::quorum::{self, QuorumConfig, QuorumResult};
use crate::types::{
    Contest, DistrictElection, ElectionUnion, MandateAlgorithm, Party, SeatMatrix,
    SingleElection, VoteMatrix, Weighting,
};
use log::{debug, info};
use num::traits::{One, Zero};
use num::BigRational;
use rayon::prelude::*;
use std::collections::HashSet;

/// Parameters of the computation that are not part of the election data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApportionmentConfig {
    /// Rule to break ties.
    pub lot_rule: LotRule,
    /// Maximal number of scaling steps of the sub-apportionment.
    pub max_iterations: usize,
}

impl Default for ApportionmentConfig {
    fn default() -> Self {
        ApportionmentConfig {
            lot_rule: LotRule::default(),
            max_iterations: MAX_ITERATIONS,
        }
    }
}

/// Seat allocation of an election union or a single election.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndResult {
    /// Quorum outcome of each party.
    pub quorum: Vec<QuorumResult>,
    /// Weight of each party in the super-apportionment (zero for parties that
    /// failed the quorum).
    pub party_weights: Vec<BigRational>,
    /// Seats of each party.
    pub party_seats: Vec<usize>,
    /// Divisor of the super-apportionment.
    pub union_divisor: BigRational,
    /// Seats of each party (column) in each district (row).
    pub seats: SeatMatrix,
    /// Divisor of each district.
    pub district_divisors: Vec<BigRational>,
    /// Divisor of each party, if it received any seat in a union.
    pub party_divisors: Vec<Option<BigRational>>,
    /// Number of scaling steps of the sub-apportionment.
    pub iterations: usize,
    /// Seats of each list union (Hagenbach-Bischoff only).
    pub list_union_seats: Vec<usize>,
    /// Ties that were broken by the lot rule.
    pub lot_decisions: Vec<LotDecision>,
}

/// Results of all the elections of a contest, in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContestResult {
    /// Result of each election union.
    pub unions: Vec<Result<EndResult, ApportionmentError>>,
    /// Result of each single election.
    pub elections: Vec<Result<EndResult, ApportionmentError>>,
}

/// Computes the biproportional apportionment of an election union.
pub fn build_for_union(
    union: &ElectionUnion,
    quorum: &QuorumConfig,
    config: &ApportionmentConfig,
) -> Result<EndResult, ApportionmentError> {
    info!(
        "Computing the end result of union {} ({} seats, {} districts, {} parties)",
        union.id,
        union.num_seats,
        union.districts.len(),
        union.parties.len()
    );
    validate_union(union)?;

    let num_parties = union.parties.len();
    let votes = union.vote_matrix();
    let quorum = quorum::evaluate(quorum, &votes)?;

    let mandates = union.mandates();
    let weighted = weighted_votes(&votes, &mandates, union.weighting);
    let party_weights = filter_weights(&weighted.col_sums(), &quorum);
    debug!(
        "Party weights ({:?}): {}",
        union.weighting,
        party_weights
            .iter()
            .map(|w| format_decimal(w, 6))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let resolver = LotResolver::new(
        config.lot_rule,
        &union.parties,
        &union.tie_order,
        &union.districts,
    );
    let mut lot_decisions = Vec::new();

    let super_apportionment = divisor::apportion(
        &party_weights,
        union.num_seats,
        Rounding::Standard,
        resolver.party_priority(),
    )?;
    if let Some(tie) = &super_apportionment.tie {
        lot_decisions.push(party_decision(&resolver, Stage::SuperApportionment, tie));
    }
    let party_seats = super_apportionment.seats;
    let union_divisor = super_apportionment.divisor;
    info!(
        "Super-apportionment of union {}: {:?} with divisor {}",
        union.id,
        party_seats,
        format_decimal(&union_divisor, 6)
    );

    let seated: Vec<usize> = (0..num_parties).filter(|&j| party_seats[j] != 0).collect();
    let mut seats = SeatMatrix::new(union.districts.len(), num_parties);
    let mut party_divisors = vec![None; num_parties];

    let (district_divisors, iterations) = if union.districts.len() == 1 {
        // A single district is apportioned directly by the super-apportionment.
        for &j in &seated {
            seats.set(0, j, party_seats[j]);
            party_divisors[j] = Some(BigRational::one());
        }
        (vec![union_divisor.clone()], 0)
    } else {
        let col_sums: Vec<usize> = seated.iter().map(|&j| party_seats[j]).collect();
        let col_priority: Vec<usize> = seated
            .iter()
            .map(|&j| resolver.party_priority()[j])
            .collect();
        let sub_apportionment = biproportional::apportion(
            &weighted.select_cols(&seated),
            &mandates,
            &col_sums,
            resolver.district_priority(),
            &col_priority,
            config.max_iterations,
        )?;

        for (k, &j) in seated.iter().enumerate() {
            for i in 0..union.districts.len() {
                seats.set(i, j, sub_apportionment.seats.get(i, k));
            }
            party_divisors[j] = Some(sub_apportionment.col_divisors[k].clone());
        }
        let cell_decision = |gains: &[(usize, usize)],
                             losses: &[(usize, usize)],
                             winners: &[(usize, usize)]| {
            let cell = |&(i, k): &(usize, usize)| Contender::Cell {
                district: i,
                party: seated[k],
            };
            let mut contenders: Vec<Contender> = gains.iter().chain(losses).map(cell).collect();
            contenders.sort_unstable();
            let mut winners: Vec<Contender> = winners.iter().map(cell).collect();
            winners.sort_unstable();
            let seats = winners.len();
            resolver.decision(Stage::SubApportionment, contenders, winners, seats)
        };
        // A transferred seat goes to the cells that gained it.
        for transfer in &sub_apportionment.transfers {
            lot_decisions.push(cell_decision(
                &transfer.gains,
                &transfer.losses,
                &transfer.gains,
            ));
        }
        // In a cycle, the seats stay with the cells that hold them.
        for cycle in &sub_apportionment.ties {
            lot_decisions.push(cell_decision(&cycle.gains, &cycle.losses, &cycle.losses));
        }
        (
            sub_apportionment.row_divisors,
            sub_apportionment.iterations,
        )
    };

    Ok(EndResult {
        quorum,
        party_weights,
        party_seats,
        union_divisor,
        seats,
        district_divisors,
        party_divisors,
        iterations,
        list_union_seats: Vec::new(),
        lot_decisions,
    })
}

/// Computes the apportionment of an election that is not part of a union.
pub fn build_for_single_election(
    election: &SingleElection,
    quorum: &QuorumConfig,
    config: &ApportionmentConfig,
) -> Result<EndResult, ApportionmentError> {
    info!(
        "Computing the end result of election {} ({} seats, {} parties, {:?})",
        election.id,
        election.num_seats,
        election.parties.len(),
        election.algorithm
    );
    validate_single_election(election)?;

    let num_parties = election.parties.len();
    let votes = election.vote_matrix();
    let quorum = quorum::evaluate(quorum, &votes)?;
    let party_weights = filter_weights(&votes.col_sums(), &quorum);

    let resolver = LotResolver::new(
        config.lot_rule,
        &election.parties,
        &election.tie_order,
        std::slice::from_ref(&election.district),
    );
    let mut lot_decisions = Vec::new();

    let (party_seats, divisor, list_union_seats) = match election.algorithm {
        MandateAlgorithm::DoubleProportional => {
            let result = divisor::apportion(
                &party_weights,
                election.num_seats,
                Rounding::Standard,
                resolver.party_priority(),
            )?;
            if let Some(tie) = &result.tie {
                lot_decisions.push(party_decision(&resolver, Stage::SingleApportionment, tie));
            }
            (result.seats, result.divisor, Vec::new())
        }
        MandateAlgorithm::HagenbachBischoff => {
            hagenbach_bischoff(election, &party_weights, &resolver, &mut lot_decisions)?
        }
    };
    info!(
        "Apportionment of election {}: {:?} with divisor {}",
        election.id,
        party_seats,
        format_decimal(&divisor, 6)
    );

    let seats = SeatMatrix::from_rows(num_parties, [&party_seats]);
    Ok(EndResult {
        quorum,
        party_weights,
        party_seats,
        union_divisor: divisor.clone(),
        seats,
        district_divisors: vec![divisor],
        party_divisors: vec![None; num_parties],
        iterations: 0,
        list_union_seats,
        lot_decisions,
    })
}

/// Hagenbach-Bischoff apportionment: seats are first apportioned among list
/// unions and lists outside of any union, and then among the lists of each
/// union.
fn hagenbach_bischoff(
    election: &SingleElection,
    party_weights: &[BigRational],
    resolver: &LotResolver,
    lot_decisions: &mut Vec<LotDecision>,
) -> Result<(Vec<usize>, BigRational, Vec<usize>), ApportionmentError> {
    let num_parties = election.parties.len();
    let priority = resolver.party_priority();

    let mut groups: Vec<(Contender, Vec<usize>)> = election
        .list_unions
        .iter()
        .enumerate()
        .map(|(u, list_union)| (Contender::ListUnion(u), list_union.members.clone()))
        .collect();
    let in_union: HashSet<usize> = election
        .list_unions
        .iter()
        .flat_map(|u| u.members.iter().copied())
        .collect();
    groups.extend(
        (0..num_parties)
            .filter(|j| !in_union.contains(j))
            .map(|j| (Contender::Party(j), vec![j])),
    );

    let group_weights: Vec<BigRational> = groups
        .iter()
        .map(|(_, members)| members.iter().map(|&j| &party_weights[j]).sum())
        .collect();
    let group_priority: Vec<usize> = groups
        .iter()
        .map(|(_, members)| members.iter().map(|&j| priority[j]).min().unwrap_or(usize::MAX))
        .collect();

    let result = divisor::apportion(
        &group_weights,
        election.num_seats,
        Rounding::Down,
        &group_priority,
    )?;
    if let Some(tie) = &result.tie {
        lot_decisions.push(resolver.decision(
            Stage::ListUnionApportionment,
            tie.contenders.iter().map(|&g| groups[g].0).collect(),
            tie.winners.iter().map(|&g| groups[g].0).collect(),
            tie.seats,
        ));
    }

    let mut party_seats = vec![0; num_parties];
    let mut list_union_seats = vec![0; election.list_unions.len()];
    for ((contender, members), &group_seats) in groups.iter().zip(&result.seats) {
        match contender {
            Contender::ListUnion(u) => {
                list_union_seats[*u] = group_seats;
                let weights: Vec<BigRational> =
                    members.iter().map(|&j| party_weights[j].clone()).collect();
                let member_priority: Vec<usize> = members.iter().map(|&j| priority[j]).collect();
                let inner =
                    divisor::apportion(&weights, group_seats, Rounding::Down, &member_priority)?;
                debug!(
                    "List union {}: {group_seats} seats split as {:?}",
                    election.list_unions[*u].id, inner.seats
                );
                if let Some(tie) = &inner.tie {
                    lot_decisions.push(resolver.decision(
                        Stage::ListApportionment,
                        tie.contenders
                            .iter()
                            .map(|&k| Contender::Party(members[k]))
                            .collect(),
                        tie.winners
                            .iter()
                            .map(|&k| Contender::Party(members[k]))
                            .collect(),
                        tie.seats,
                    ));
                }
                for (&j, &s) in members.iter().zip(&inner.seats) {
                    party_seats[j] = s;
                }
            }
            _ => party_seats[members[0]] = group_seats,
        }
    }

    Ok((party_seats, result.divisor, list_union_seats))
}

impl Contest {
    /// Computes the end result of the union with the given identifier.
    pub fn build_for_union(
        &self,
        id: &str,
        config: &ApportionmentConfig,
    ) -> Result<EndResult, ApportionmentError> {
        let union = self
            .unions
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| ApportionmentError::UnknownElection(id.to_owned()))?;
        build_for_union(union, &union.quorum, config)
    }

    /// Computes the end result of the single election with the given
    /// identifier.
    pub fn build_for_single_election(
        &self,
        id: &str,
        config: &ApportionmentConfig,
    ) -> Result<EndResult, ApportionmentError> {
        let election = self
            .elections
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| ApportionmentError::UnknownElection(id.to_owned()))?;
        build_for_single_election(election, &election.quorum, config)
    }
}

/// Computes all the elections of a contest. Each election is independent, so
/// that a failure doesn't prevent the other results.
pub fn build_contest(
    contest: &Contest,
    config: &ApportionmentConfig,
    parallel: bool,
) -> ContestResult {
    info!(
        "Parallel computation is {}",
        if parallel { "enabled" } else { "disabled" }
    );
    let build_union = |union: &ElectionUnion| build_for_union(union, &union.quorum, config);
    let build_election =
        |election: &SingleElection| build_for_single_election(election, &election.quorum, config);

    if parallel {
        ContestResult {
            unions: contest.unions.par_iter().map(build_union).collect(),
            elections: contest.elections.par_iter().map(build_election).collect(),
        }
    } else {
        ContestResult {
            unions: contest.unions.iter().map(build_union).collect(),
            elections: contest.elections.iter().map(build_election).collect(),
        }
    }
}

/// Matrix used for the apportionment, depending on the weighting.
fn weighted_votes(votes: &VoteMatrix, mandates: &[usize], weighting: Weighting) -> VoteMatrix {
    match weighting {
        Weighting::Votes => votes.clone(),
        Weighting::VoterNumbers => {
            let mut voters = VoteMatrix::new(votes.num_rows(), votes.num_cols());
            for (i, &m) in mandates.iter().enumerate() {
                if m == 0 {
                    continue;
                }
                let m = m as u64;
                for j in 0..votes.num_cols() {
                    // votes / mandates, rounded half up.
                    voters.set(i, j, (2 * votes.get(i, j) + m) / (2 * m));
                }
            }
            voters
        }
    }
}

fn filter_weights(totals: &[u64], quorum: &[QuorumResult]) -> Vec<BigRational> {
    std::iter::zip(totals, quorum)
        .map(|(&total, result)| {
            if result.passed {
                integer(total)
            } else {
                BigRational::zero()
            }
        })
        .collect()
}

fn party_decision(resolver: &LotResolver, stage: Stage, tie: &Tie) -> LotDecision {
    resolver.decision(
        stage,
        tie.contenders.iter().map(|&j| Contender::Party(j)).collect(),
        tie.winners.iter().map(|&j| Contender::Party(j)).collect(),
        tie.seats,
    )
}

fn validate_union(union: &ElectionUnion) -> Result<(), ApportionmentError> {
    if union.districts.is_empty() {
        return Err(ApportionmentError::InputInconsistent(format!(
            "union {} has no district",
            union.id
        )));
    }
    let num_mandates: usize = union.districts.iter().map(|d| d.num_mandates).sum();
    if union.num_seats != num_mandates {
        return Err(ApportionmentError::InputInconsistent(format!(
            "union {} allocates {} seats but its districts have {num_mandates} mandates",
            union.id, union.num_seats
        )));
    }
    for district in &union.districts {
        validate_lists(district, &union.parties)?;
    }
    validate_tie_order(&union.tie_order, &union.parties)
}

fn validate_single_election(election: &SingleElection) -> Result<(), ApportionmentError> {
    if election.num_seats != election.district.num_mandates {
        return Err(ApportionmentError::InputInconsistent(format!(
            "election {} allocates {} seats but its district has {} mandates",
            election.id, election.num_seats, election.district.num_mandates
        )));
    }
    validate_lists(&election.district, &election.parties)?;
    validate_tie_order(&election.tie_order, &election.parties)?;

    let mut in_union = vec![false; election.parties.len()];
    for list_union in &election.list_unions {
        if list_union.members.is_empty() {
            return Err(ApportionmentError::InputInconsistent(format!(
                "list union {} is empty",
                list_union.id
            )));
        }
        for &j in &list_union.members {
            if j >= election.parties.len() {
                return Err(ApportionmentError::InputInconsistent(format!(
                    "list union {} references unknown party #{j}",
                    list_union.id
                )));
            }
            if in_union[j] {
                return Err(ApportionmentError::InputInconsistent(format!(
                    "party {} belongs to several list unions",
                    election.parties[j].id
                )));
            }
            in_union[j] = true;
        }
    }
    Ok(())
}

fn validate_lists(
    district: &DistrictElection,
    parties: &[Party],
) -> Result<(), ApportionmentError> {
    let mut seen = vec![false; parties.len()];
    for list in &district.lists {
        if list.party >= parties.len() {
            return Err(ApportionmentError::InputInconsistent(format!(
                "district {} has a list for unknown party #{}",
                district.id, list.party
            )));
        }
        if seen[list.party] {
            return Err(ApportionmentError::InputInconsistent(format!(
                "district {} has several lists for party {}",
                district.id, parties[list.party].id
            )));
        }
        seen[list.party] = true;
    }
    Ok(())
}

fn validate_tie_order(tie_order: &[usize], parties: &[Party]) -> Result<(), ApportionmentError> {
    let mut seen = vec![false; parties.len()];
    for &j in tie_order {
        if j >= parties.len() {
            return Err(ApportionmentError::InputInconsistent(format!(
                "tie order references unknown party #{j}"
            )));
        }
        if seen[j] {
            return Err(ApportionmentError::InputInconsistent(format!(
                "tie order lists party {} twice",
                parties[j].id
            )));
        }
        seen[j] = true;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arithmetic::ratio;
    use crate::types::{List, ListUnion};
    use rand::distributions::{Distribution, Uniform};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;

    fn make_zh_parties() -> Vec<Party> {
        vec![Party::new("svp"), Party::new("sp"), Party::new("fdp")]
    }

    fn make_zh_districts(svp_zurich: u64) -> Vec<DistrictElection> {
        vec![
            DistrictElection::new("zurich", 2, [List::new(0, svp_zurich), List::new(1, 400)]),
            DistrictElection::new(
                "winterthur",
                2,
                [List::new(0, 2000), List::new(1, 100), List::new(2, 1000)],
            ),
            DistrictElection::new(
                "dietikon",
                1,
                [List::new(0, 1000), List::new(1, 250), List::new(2, 500)],
            ),
        ]
    }

    fn make_zh_union() -> ElectionUnion {
        ElectionUnion::builder()
            .title("Kantonsrat")
            .parties(make_zh_parties())
            .districts(make_zh_districts(3000))
            .build()
    }

    fn make_single_doi(lot_rule_order: &[usize]) -> SingleElection {
        SingleElection::builder()
            .title("Stadtrat")
            .parties([
                Party::new("svp"),
                Party::new("sp"),
                Party::new("fdp"),
                Party::new("glp"),
            ])
            .district(DistrictElection::new(
                "stadt",
                5,
                [
                    List::new(0, 2250),
                    List::new(1, 2250),
                    List::new(2, 500),
                    List::new(3, 20000),
                ],
            ))
            .tie_order(lot_rule_order)
            .build()
    }

    fn tie_order_config() -> ApportionmentConfig {
        ApportionmentConfig {
            lot_rule: LotRule::TieOrder,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        assert_eq!(
            ApportionmentConfig::default(),
            ApportionmentConfig {
                lot_rule: LotRule::LowestId,
                max_iterations: 1000,
            }
        );
    }

    #[test]
    fn test_union_super_lot() {
        let union = make_zh_union();
        let result =
            build_for_union(&union, &QuorumConfig::none(), &ApportionmentConfig::default())
                .unwrap();
        assert_eq!(
            result,
            EndResult {
                quorum: vec![
                    QuorumResult {
                        party: 0,
                        votes: 6000,
                        district_quorum_reached: false,
                        total_quorum_reached: false,
                        passed: true,
                    },
                    QuorumResult {
                        party: 1,
                        votes: 750,
                        district_quorum_reached: false,
                        total_quorum_reached: false,
                        passed: true,
                    },
                    QuorumResult {
                        party: 2,
                        votes: 1500,
                        district_quorum_reached: false,
                        total_quorum_reached: false,
                        passed: true,
                    },
                ],
                party_weights: vec![integer(6000), integer(750), integer(1500)],
                party_seats: vec![4, 0, 1],
                union_divisor: integer(1700),
                seats: SeatMatrix::from_rows(3, [[2, 0, 0], [1, 0, 1], [1, 0, 0]]),
                district_divisors: vec![integer(1900), integer(1900), integer(1900)],
                party_divisors: vec![Some(integer(1)), None, Some(integer(1))],
                iterations: 1,
                list_union_seats: vec![],
                lot_decisions: vec![],
            }
        );
    }

    #[test]
    fn test_union_total_quorum() {
        // Shares: SVP 72.7%, SP 9.1%, FDP 18.2%.
        let union = make_zh_union();
        let result = build_for_union(
            &union,
            &QuorumConfig::total(20),
            &ApportionmentConfig::default(),
        )
        .unwrap();
        assert_eq!(
            result.quorum.iter().map(|q| q.passed).collect::<Vec<_>>(),
            vec![true, false, false]
        );
        assert_eq!(
            result.party_weights,
            vec![integer(6000), integer(0), integer(0)]
        );
        assert_eq!(result.party_seats, vec![5, 0, 0]);
        assert_eq!(result.union_divisor, integer(1300));
        assert_eq!(
            result.seats,
            SeatMatrix::from_rows(3, [[2, 0, 0], [2, 0, 0], [1, 0, 0]])
        );
        assert_eq!(
            result.district_divisors,
            vec![integer(1900), integer(1000), integer(1000)]
        );
        assert_eq!(result.party_divisors, vec![Some(integer(1)), None, None]);
    }

    #[test]
    fn test_union_voter_numbers() {
        let union = ElectionUnion::builder()
            .title("Kantonsrat")
            .parties(make_zh_parties())
            .districts(make_zh_districts(3001))
            .weighting(Weighting::VoterNumbers)
            .build();
        let result =
            build_for_union(&union, &QuorumConfig::none(), &ApportionmentConfig::default())
                .unwrap();
        // 3001 / 2 = 1500.5 is rounded up.
        assert_eq!(
            result.party_weights,
            vec![integer(3501), integer(500), integer(1000)]
        );
        assert_eq!(result.party_seats, vec![4, 0, 1]);
        assert_eq!(result.union_divisor, ratio(5001, 5));
        assert_eq!(
            result.seats,
            SeatMatrix::from_rows(3, [[2, 0, 0], [1, 0, 1], [1, 0, 0]])
        );
        assert_eq!(
            result.district_divisors,
            vec![integer(1000), integer(900), integer(1900)]
        );
        // The quorum is evaluated on votes.
        assert_eq!(result.quorum[0].votes, 6001);
    }

    #[test]
    fn test_union_single_district() {
        let election = make_single_doi(&[0, 1, 2, 3]);
        let union = ElectionUnion::builder()
            .title("Stadtrat")
            .parties(election.parties.clone())
            .districts([election.district.clone()])
            .build();
        let result =
            build_for_union(&union, &QuorumConfig::none(), &ApportionmentConfig::default())
                .unwrap();
        assert_eq!(result.party_seats, vec![0, 1, 0, 4]);
        assert_eq!(result.seats, SeatMatrix::from_rows(4, [[0, 1, 0, 4]]));
        assert_eq!(result.district_divisors, vec![integer(4500)]);
        assert_eq!(
            result.party_divisors,
            vec![None, Some(integer(1)), None, Some(integer(1))]
        );
        assert_eq!(result.iterations, 0);
        assert_eq!(
            result.lot_decisions,
            vec![LotDecision {
                stage: Stage::SuperApportionment,
                contenders: vec![Contender::Party(0), Contender::Party(1)],
                winners: vec![Contender::Party(1)],
                seats: 1,
                rule: LotRule::LowestId,
            }]
        );
    }

    #[test]
    fn test_union_sub_apportionment_tie() {
        let union = ElectionUnion::builder()
            .title("Tie")
            .parties([Party::new("a"), Party::new("b")])
            .districts([
                DistrictElection::new("d1", 1, [List::new(0, 100), List::new(1, 100)]),
                DistrictElection::new("d2", 1, [List::new(0, 100), List::new(1, 100)]),
            ])
            .build();
        let result =
            build_for_union(&union, &QuorumConfig::none(), &ApportionmentConfig::default())
                .unwrap();
        assert_eq!(result.party_seats, vec![1, 1]);
        assert_eq!(result.union_divisor, integer(300));
        assert_eq!(result.seats, SeatMatrix::from_rows(2, [[1, 0], [0, 1]]));
        assert_eq!(
            result.lot_decisions,
            vec![LotDecision {
                stage: Stage::SubApportionment,
                contenders: vec![
                    Contender::Cell {
                        district: 0,
                        party: 0
                    },
                    Contender::Cell {
                        district: 0,
                        party: 1
                    },
                    Contender::Cell {
                        district: 1,
                        party: 0
                    },
                    Contender::Cell {
                        district: 1,
                        party: 1
                    },
                ],
                winners: vec![
                    Contender::Cell {
                        district: 0,
                        party: 0
                    },
                    Contender::Cell {
                        district: 1,
                        party: 1
                    },
                ],
                seats: 2,
                rule: LotRule::LowestId,
            }]
        );

        // Reversing the tie order flips the matrix.
        let union = ElectionUnion {
            tie_order: vec![1, 0],
            ..union
        };
        let result = build_for_union(&union, &QuorumConfig::none(), &tie_order_config()).unwrap();
        assert_eq!(result.seats, SeatMatrix::from_rows(2, [[0, 1], [1, 0]]));
        assert_eq!(result.lot_decisions.len(), 1);
        assert_eq!(result.lot_decisions[0].rule, LotRule::TieOrder);
    }

    #[test]
    fn test_single_election_super_lot() {
        let election = make_single_doi(&[0, 1, 2, 3]);

        let result = build_for_single_election(
            &election,
            &QuorumConfig::none(),
            &ApportionmentConfig::default(),
        )
        .unwrap();
        assert_eq!(
            result,
            EndResult {
                quorum: vec![
                    QuorumResult {
                        party: 0,
                        votes: 2250,
                        district_quorum_reached: false,
                        total_quorum_reached: false,
                        passed: true,
                    },
                    QuorumResult {
                        party: 1,
                        votes: 2250,
                        district_quorum_reached: false,
                        total_quorum_reached: false,
                        passed: true,
                    },
                    QuorumResult {
                        party: 2,
                        votes: 500,
                        district_quorum_reached: false,
                        total_quorum_reached: false,
                        passed: true,
                    },
                    QuorumResult {
                        party: 3,
                        votes: 20000,
                        district_quorum_reached: false,
                        total_quorum_reached: false,
                        passed: true,
                    },
                ],
                party_weights: vec![integer(2250), integer(2250), integer(500), integer(20000)],
                party_seats: vec![0, 1, 0, 4],
                union_divisor: integer(4500),
                seats: SeatMatrix::from_rows(4, [[0, 1, 0, 4]]),
                district_divisors: vec![integer(4500)],
                party_divisors: vec![None, None, None, None],
                iterations: 0,
                list_union_seats: vec![],
                lot_decisions: vec![LotDecision {
                    stage: Stage::SingleApportionment,
                    contenders: vec![Contender::Party(0), Contender::Party(1)],
                    winners: vec![Contender::Party(1)],
                    seats: 1,
                    rule: LotRule::LowestId,
                }],
            }
        );

        // SVP is declared first.
        let result =
            build_for_single_election(&election, &QuorumConfig::none(), &tie_order_config())
                .unwrap();
        assert_eq!(result.party_seats, vec![1, 0, 0, 4]);
        assert_eq!(result.lot_decisions[0].winners, vec![Contender::Party(0)]);

        // SP is declared first.
        let election = make_single_doi(&[1, 0, 2, 3]);
        let result =
            build_for_single_election(&election, &QuorumConfig::none(), &tie_order_config())
                .unwrap();
        assert_eq!(result.party_seats, vec![0, 1, 0, 4]);
    }

    #[test]
    fn test_single_election_quorum() {
        // Shares: SVP 9%, SP 9%, FDP 2%, GLP 80%.
        let election = make_single_doi(&[0, 1, 2, 3]);
        let result = build_for_single_election(
            &election,
            &QuorumConfig::district(10),
            &ApportionmentConfig::default(),
        )
        .unwrap();
        assert_eq!(
            result.quorum.iter().map(|q| q.passed).collect::<Vec<_>>(),
            vec![false, false, false, true]
        );
        assert_eq!(result.party_seats, vec![0, 0, 0, 5]);
        assert!(result.lot_decisions.is_empty());
    }

    fn make_hagenbach_bischoff(c_votes: u64) -> SingleElection {
        SingleElection::builder()
            .title("Gemeinderat")
            .parties([
                Party::new("a"),
                Party::new("b"),
                Party::new("c"),
                Party::new("d"),
            ])
            .district(DistrictElection::new(
                "gemeinde",
                5,
                [
                    List::new(0, 4000),
                    List::new(1, 3000),
                    List::new(2, c_votes),
                    List::new(3, 500),
                ],
            ))
            .algorithm(MandateAlgorithm::HagenbachBischoff)
            .list_unions([ListUnion::new("cd", [2, 3])])
            .build()
    }

    #[test]
    fn test_hagenbach_bischoff_list_union() {
        let election = make_hagenbach_bischoff(2600);
        let result = build_for_single_election(
            &election,
            &QuorumConfig::none(),
            &ApportionmentConfig::default(),
        )
        .unwrap();
        // Without the list union, C would only get one seat.
        assert_eq!(result.party_seats, vec![2, 1, 2, 0]);
        assert_eq!(result.list_union_seats, vec![2]);
        assert_eq!(result.union_divisor, integer(1540));
        assert!(result.lot_decisions.is_empty());

        let election = SingleElection {
            list_unions: vec![],
            ..election
        };
        let result = build_for_single_election(
            &election,
            &QuorumConfig::none(),
            &ApportionmentConfig::default(),
        )
        .unwrap();
        assert_eq!(result.party_seats, vec![2, 2, 1, 0]);
        assert!(result.list_union_seats.is_empty());
    }

    #[test]
    fn test_hagenbach_bischoff_tie() {
        let election = make_hagenbach_bischoff(2500);
        let result = build_for_single_election(
            &election,
            &QuorumConfig::none(),
            &ApportionmentConfig::default(),
        )
        .unwrap();
        assert_eq!(result.party_seats, vec![2, 2, 1, 0]);
        assert_eq!(result.list_union_seats, vec![1]);
        assert_eq!(result.union_divisor, integer(1500));
        assert_eq!(
            result.lot_decisions,
            vec![LotDecision {
                stage: Stage::ListUnionApportionment,
                contenders: vec![Contender::ListUnion(0), Contender::Party(1)],
                winners: vec![Contender::Party(1)],
                seats: 1,
                rule: LotRule::LowestId,
            }]
        );
    }

    #[test]
    fn test_hagenbach_bischoff_list_tie() {
        let election = SingleElection::builder()
            .title("Gemeinderat")
            .parties([Party::new("a"), Party::new("b"), Party::new("c")])
            .district(DistrictElection::new(
                "gemeinde",
                3,
                [List::new(0, 3000), List::new(1, 1000), List::new(2, 1000)],
            ))
            .algorithm(MandateAlgorithm::HagenbachBischoff)
            .list_unions([ListUnion::new("bc", [2, 1])])
            .build();
        let result = build_for_single_election(
            &election,
            &QuorumConfig::none(),
            &ApportionmentConfig::default(),
        )
        .unwrap();
        // a: 3000, 1500, 1000; bc: 2000, 1000.
        assert_eq!(result.list_union_seats, vec![1]);
        assert_eq!(result.party_seats, vec![2, 1, 0]);
        assert_eq!(
            result.lot_decisions,
            vec![LotDecision {
                stage: Stage::ListApportionment,
                contenders: vec![Contender::Party(2), Contender::Party(1)],
                winners: vec![Contender::Party(1)],
                seats: 1,
                rule: LotRule::LowestId,
            }]
        );
    }

    #[test]
    fn test_validation() {
        let config = ApportionmentConfig::default();
        let quorum = QuorumConfig::none();

        let union = ElectionUnion {
            districts: vec![],
            ..make_zh_union()
        };
        assert_eq!(
            build_for_union(&union, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "union kantonsrat has no district".to_owned()
            ))
        );

        let union = ElectionUnion {
            num_seats: 6,
            ..make_zh_union()
        };
        assert_eq!(
            build_for_union(&union, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "union kantonsrat allocates 6 seats but its districts have 5 mandates".to_owned()
            ))
        );

        let mut union = make_zh_union();
        union.districts[1].lists.push(List::new(3, 10));
        assert_eq!(
            build_for_union(&union, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "district winterthur has a list for unknown party #3".to_owned()
            ))
        );

        let mut union = make_zh_union();
        union.districts[0].lists.push(List::new(1, 10));
        assert_eq!(
            build_for_union(&union, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "district zurich has several lists for party sp".to_owned()
            ))
        );

        let union = ElectionUnion {
            tie_order: vec![0, 1, 0],
            ..make_zh_union()
        };
        assert_eq!(
            build_for_union(&union, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "tie order lists party svp twice".to_owned()
            ))
        );

        let union = ElectionUnion {
            tie_order: vec![5],
            ..make_zh_union()
        };
        assert_eq!(
            build_for_union(&union, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "tie order references unknown party #5".to_owned()
            ))
        );
    }

    #[test]
    fn test_validation_single_election() {
        let config = ApportionmentConfig::default();
        let quorum = QuorumConfig::none();

        let election = SingleElection {
            num_seats: 4,
            ..make_single_doi(&[0, 1, 2, 3])
        };
        assert_eq!(
            build_for_single_election(&election, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "election stadtrat allocates 4 seats but its district has 5 mandates".to_owned()
            ))
        );

        let election = SingleElection {
            list_unions: vec![ListUnion::new("x", [0, 7])],
            ..make_single_doi(&[0, 1, 2, 3])
        };
        assert_eq!(
            build_for_single_election(&election, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "list union x references unknown party #7".to_owned()
            ))
        );

        let election = SingleElection {
            list_unions: vec![ListUnion::new("x", [0, 1]), ListUnion::new("y", [1, 2])],
            ..make_single_doi(&[0, 1, 2, 3])
        };
        assert_eq!(
            build_for_single_election(&election, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "party sp belongs to several list unions".to_owned()
            ))
        );

        let election = SingleElection {
            list_unions: vec![ListUnion::new("x", Vec::<usize>::new())],
            ..make_single_doi(&[0, 1, 2, 3])
        };
        assert_eq!(
            build_for_single_election(&election, &quorum, &config),
            Err(ApportionmentError::InputInconsistent(
                "list union x is empty".to_owned()
            ))
        );
    }

    #[test]
    fn test_invalid_quorum() {
        assert_eq!(
            build_for_union(
                &make_zh_union(),
                &QuorumConfig::total(150),
                &ApportionmentConfig::default()
            ),
            Err(ApportionmentError::QuorumConfigurationInvalid(
                "150".to_owned()
            ))
        );
    }

    #[test]
    fn test_all_parties_fail_quorum() {
        let result = build_for_union(
            &make_zh_union(),
            &QuorumConfig::total(90),
            &ApportionmentConfig::default(),
        );
        assert!(matches!(result, Err(ApportionmentError::Infeasible(_))));
    }

    #[test]
    fn test_contest_lookup() {
        let contest = Contest {
            unions: vec![make_zh_union()],
            elections: vec![make_single_doi(&[0, 1, 2, 3])],
        };
        let config = ApportionmentConfig::default();
        assert_eq!(
            contest.build_for_union("kantonsrat", &config).unwrap().party_seats,
            vec![4, 0, 1]
        );
        assert_eq!(
            contest
                .build_for_single_election("stadtrat", &config)
                .unwrap()
                .party_seats,
            vec![0, 1, 0, 4]
        );
        assert_eq!(
            contest.build_for_union("stadtrat", &config),
            Err(ApportionmentError::UnknownElection("stadtrat".to_owned()))
        );
        assert_eq!(
            contest.build_for_single_election("gemeinderat", &config),
            Err(ApportionmentError::UnknownElection("gemeinderat".to_owned()))
        );
    }

    #[test]
    fn test_build_contest_isolates_failures() {
        let broken = ElectionUnion {
            id: "broken".to_owned(),
            num_seats: 7,
            ..make_zh_union()
        };
        let contest = Contest {
            unions: vec![broken, make_zh_union()],
            elections: vec![make_single_doi(&[0, 1, 2, 3])],
        };
        let result = build_contest(&contest, &ApportionmentConfig::default(), false);
        assert!(result.unions[0].is_err());
        assert_eq!(result.unions[1].as_ref().unwrap().party_seats, vec![4, 0, 1]);
        assert_eq!(
            result.elections[0].as_ref().unwrap().party_seats,
            vec![0, 1, 0, 4]
        );
    }

    fn random_union(
        rng: &mut ChaChaRng,
        num_districts: usize,
        num_parties: usize,
    ) -> ElectionUnion {
        let vote_dist = Uniform::from(0..5_000u64);
        let mandate_dist = Uniform::from(1..8usize);
        let parties: Vec<Party> = (0..num_parties)
            .map(|j| Party::new(format!("p{j}")))
            .collect();
        let districts: Vec<DistrictElection> = (0..num_districts)
            .map(|i| {
                let lists: Vec<List> = (0..num_parties)
                    .map(|j| List::new(j, 1 + vote_dist.sample(rng)))
                    .collect();
                DistrictElection::new(format!("d{i}"), mandate_dist.sample(rng), lists)
            })
            .collect();
        ElectionUnion::builder()
            .title("Random")
            .parties(parties)
            .districts(districts)
            .build()
    }

    /// Replaces all the votes by multiples of 100 up to 300, which yields
    /// many ties.
    fn random_tied_union(
        rng: &mut ChaChaRng,
        num_districts: usize,
        num_parties: usize,
    ) -> ElectionUnion {
        let level_dist = Uniform::from(1..=3u64);
        let mut union = random_union(rng, num_districts, num_parties);
        for district in &mut union.districts {
            for list in &mut district.lists {
                list.votes = 100 * level_dist.sample(rng);
            }
        }
        union
    }

    fn check_union_result(union: &ElectionUnion, result: &EndResult) {
        assert_eq!(result.seats.row_sums(), union.mandates());
        assert_eq!(result.seats.col_sums(), result.party_seats);
        assert_eq!(result.seats.total(), union.num_seats);
        for q in &result.quorum {
            if !q.passed {
                assert_eq!(result.party_seats[q.party], 0);
            }
        }
    }

    #[test]
    fn test_random_unions_conservation() {
        let mut rng = ChaChaRng::seed_from_u64(2023);
        let config = ApportionmentConfig::default();
        for _ in 0..50 {
            let union = random_union(&mut rng, 4, 5);
            let quorum = QuorumConfig::total(5);
            let result = build_for_union(&union, &quorum, &config).unwrap();
            check_union_result(&union, &result);

            // Identical inputs give identical results.
            assert_eq!(build_for_union(&union, &quorum, &config), Ok(result));
        }
    }

    #[test]
    fn test_random_tied_unions_conservation() {
        let mut rng = ChaChaRng::seed_from_u64(100);
        let config = ApportionmentConfig::default();
        for _ in 0..200 {
            let union = random_tied_union(&mut rng, 3, 4);
            let result = build_for_union(&union, &QuorumConfig::none(), &config).unwrap();
            check_union_result(&union, &result);
        }
    }

    #[test]
    fn test_union_transfers_tied_seats() {
        let union = ElectionUnion::builder()
            .title("Tied")
            .parties([Party::new("a"), Party::new("b"), Party::new("c"), Party::new("d")])
            .districts([
                DistrictElection::new(
                    "d1",
                    1,
                    [
                        List::new(0, 200),
                        List::new(1, 200),
                        List::new(2, 200),
                        List::new(3, 100),
                    ],
                ),
                DistrictElection::new(
                    "d2",
                    4,
                    [
                        List::new(0, 100),
                        List::new(1, 100),
                        List::new(2, 300),
                        List::new(3, 200),
                    ],
                ),
                DistrictElection::new(
                    "d3",
                    3,
                    [
                        List::new(0, 300),
                        List::new(1, 100),
                        List::new(2, 100),
                        List::new(3, 200),
                    ],
                ),
            ])
            .build();
        let result =
            build_for_union(&union, &QuorumConfig::none(), &ApportionmentConfig::default())
                .unwrap();
        check_union_result(&union, &result);
        assert!(result.iterations < MAX_ITERATIONS);
        assert!(result
            .lot_decisions
            .iter()
            .any(|decision| decision.stage == Stage::SubApportionment));
    }

    #[test]
    fn test_vote_monotonicity() {
        let mut rng = ChaChaRng::seed_from_u64(31);
        let extra_dist = Uniform::from(1..3_000u64);
        let config = ApportionmentConfig::default();
        for _ in 0..40 {
            let union = random_union(&mut rng, 3, 4);
            let before = build_for_union(&union, &QuorumConfig::none(), &config).unwrap();

            let district = rng.gen_range(0..3);
            let party = rng.gen_range(0..4);
            let mut raised = union.clone();
            raised.districts[district].lists[party].votes += extra_dist.sample(&mut rng);
            let after = build_for_union(&raised, &QuorumConfig::none(), &config).unwrap();

            assert!(
                after.party_seats[party] >= before.party_seats[party],
                "Party {party} went from {} to {} seats",
                before.party_seats[party],
                after.party_seats[party]
            );
        }
    }

    #[test]
    fn test_random_contest_parallel_is_consistent() {
        let mut rng = ChaChaRng::seed_from_u64(42);
        let contest = Contest {
            unions: (0..10).map(|_| random_union(&mut rng, 3, 4)).collect(),
            elections: vec![make_single_doi(&[0, 1, 2, 3]), make_hagenbach_bischoff(2500)],
        };
        let config = ApportionmentConfig::default();
        assert_eq!(
            build_contest(&contest, &config, true),
            build_contest(&contest, &config, false)
        );
    }

    #[test]
    fn test_single_district_matches_single_election() {
        let mut rng = ChaChaRng::seed_from_u64(99);
        let config = ApportionmentConfig::default();
        for _ in 0..20 {
            let union = random_union(&mut rng, 1, 6);
            let election = SingleElection::builder()
                .title("Random")
                .parties(union.parties.clone())
                .district(union.districts[0].clone())
                .build();
            let union_result = build_for_union(&union, &QuorumConfig::none(), &config).unwrap();
            let election_result =
                build_for_single_election(&election, &QuorumConfig::none(), &config).unwrap();
            assert_eq!(union_result.party_seats, election_result.party_seats);
            assert_eq!(union_result.seats, election_result.seats);
        }
    }
}
