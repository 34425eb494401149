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

//! Types to represent proportional elections, their districts and lists.

mod matrix;

pub use matrix::{Matrix, SeatMatrix, VoteMatrix};

use crate::quorum::QuorumConfig;
use std::borrow::Borrow;

/// A party, i.e. the cross-district grouping of lists that forms one column
/// of the biproportional apportionment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Party {
    /// Short identifier, used in input files and for lot decisions.
    pub id: String,
    /// Full name, used to output results.
    pub name: String,
}

impl Party {
    /// Constructs a new [`Party`], whose name is the upper-cased identifier.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let name = id.to_uppercase();
        Party { id, name }
    }
}

/// A party's list within one district.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct List {
    /// Index of the party in the election's parties.
    pub party: usize,
    /// Number of votes cast for this list.
    pub votes: u64,
}

impl List {
    /// Constructs a new [`List`].
    pub fn new(party: usize, votes: u64) -> Self {
        List { party, votes }
    }
}

/// The election of one district.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistrictElection {
    /// Short identifier of the district.
    pub id: String,
    /// Full name of the district.
    pub name: String,
    /// Number of mandates to allocate in this district.
    pub num_mandates: usize,
    /// Lists that stand in this district.
    pub lists: Vec<List>,
}

impl DistrictElection {
    /// Constructs a new [`DistrictElection`], whose name is the capitalized
    /// identifier.
    pub fn new(id: impl Into<String>, num_mandates: usize, lists: impl Into<Vec<List>>) -> Self {
        let id = id.into();
        let mut name = id.clone().into_bytes();
        if let Some(x) = name.first_mut() {
            *x = x.to_ascii_uppercase();
        }
        let name = String::from_utf8_lossy(&name).into_owned();
        DistrictElection {
            id,
            name,
            num_mandates,
            lists: lists.into(),
        }
    }

    /// Returns the votes of the given party in this district, or zero if the
    /// party has no list here.
    pub fn votes_for(&self, party: usize) -> u64 {
        self.lists
            .iter()
            .filter(|list| list.party == party)
            .map(|list| list.votes)
            .sum()
    }

    /// Returns the total number of list votes in this district.
    pub fn total_votes(&self) -> u64 {
        self.lists.iter().map(|list| list.votes).sum()
    }
}

/// How the party weights of the super-apportionment are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Weighting {
    /// Sum of the list votes over all districts.
    #[default]
    Votes,
    /// Sum over all districts of the list votes divided by the district's
    /// mandates (rounded half up). This counts voters rather than votes when
    /// every voter casts as many votes as their district has mandates.
    VoterNumbers,
}

/// Apportionment method of an election that is not part of a union.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MandateAlgorithm {
    /// Single-district degenerate case of the biproportional method, i.e.
    /// Sainte-Laguë.
    #[default]
    DoubleProportional,
    /// Hagenbach-Bischoff (D'Hondt), with list unions.
    HagenbachBischoff,
}

/// A list union ("Listenverbindung"): lists that are first apportioned
/// together, before their seats are distributed among them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListUnion {
    /// Short identifier of the union.
    pub id: String,
    /// Indices of the member parties.
    pub members: Vec<usize>,
}

impl ListUnion {
    /// Constructs a new [`ListUnion`].
    pub fn new(id: impl Into<String>, members: impl Into<Vec<usize>>) -> Self {
        ListUnion {
            id: id.into(),
            members: members.into(),
        }
    }
}

/// A union of district elections that share a single biproportional
/// apportionment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElectionUnion {
    /// Short identifier of the union.
    pub id: String,
    /// Title of the union.
    pub title: String,
    /// Total number of seats to allocate.
    pub num_seats: usize,
    /// Parties (columns) competing in the union.
    pub parties: Vec<Party>,
    /// Member district elections (rows).
    pub districts: Vec<DistrictElection>,
    /// Quorum that parties must reach to participate.
    pub quorum: QuorumConfig,
    /// Weighting of the super-apportionment.
    pub weighting: Weighting,
    /// Tie-break order of parties, from highest to lowest priority.
    pub tie_order: Vec<usize>,
}

impl ElectionUnion {
    /// Returns a new builder.
    pub fn builder() -> ElectionUnionBuilder {
        ElectionUnionBuilder::default()
    }

    /// Builds the matrix of votes, with one row per district and one column per
    /// party.
    pub fn vote_matrix(&self) -> VoteMatrix {
        build_vote_matrix(self.parties.len(), &self.districts)
    }

    /// Returns the configured district mandates.
    pub fn mandates(&self) -> Vec<usize> {
        self.districts.iter().map(|d| d.num_mandates).collect()
    }
}

/// An election that is not part of any union.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleElection {
    /// Short identifier of the election.
    pub id: String,
    /// Title of the election.
    pub title: String,
    /// Number of seats to allocate.
    pub num_seats: usize,
    /// Parties competing in the election.
    pub parties: Vec<Party>,
    /// The only district of this election.
    pub district: DistrictElection,
    /// Quorum that lists must reach to participate.
    pub quorum: QuorumConfig,
    /// Apportionment method.
    pub algorithm: MandateAlgorithm,
    /// List unions, only relevant for [`MandateAlgorithm::HagenbachBischoff`].
    pub list_unions: Vec<ListUnion>,
    /// Tie-break order of parties, from highest to lowest priority.
    pub tie_order: Vec<usize>,
}

impl SingleElection {
    /// Returns a new builder.
    pub fn builder() -> SingleElectionBuilder {
        SingleElectionBuilder::default()
    }

    /// Builds the matrix of votes, with a single row.
    pub fn vote_matrix(&self) -> VoteMatrix {
        build_vote_matrix(self.parties.len(), std::slice::from_ref(&self.district))
    }
}

fn build_vote_matrix(num_parties: usize, districts: &[DistrictElection]) -> VoteMatrix {
    let mut votes = VoteMatrix::new(districts.len(), num_parties);
    for (row, district) in districts.iter().enumerate() {
        for list in &district.lists {
            if list.party < num_parties {
                votes.set(row, list.party, votes.get(row, list.party) + list.votes);
            }
        }
    }
    votes
}

/// All the unions and single elections computed together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contest {
    /// Election unions.
    pub unions: Vec<ElectionUnion>,
    /// Elections outside of any union.
    pub elections: Vec<SingleElection>,
}

/// Builder for the [`ElectionUnion`] type.
#[derive(Default)]
pub struct ElectionUnionBuilder {
    id: Option<String>,
    title: Option<String>,
    num_seats: Option<usize>,
    parties: Vec<Party>,
    districts: Vec<DistrictElection>,
    quorum: QuorumConfig,
    weighting: Weighting,
    tie_order: Option<Vec<usize>>,
}

impl ElectionUnionBuilder {
    /// Build the [`ElectionUnion`] object. The number of seats defaults to the
    /// sum of the district mandates, and the tie order to the order of
    /// parties.
    pub fn build(self) -> ElectionUnion {
        let num_seats = self
            .num_seats
            .unwrap_or_else(|| self.districts.iter().map(|d| d.num_mandates).sum());
        let num_parties = self.parties.len();
        let title = self.title.unwrap();
        ElectionUnion {
            id: self.id.unwrap_or_else(|| title.to_lowercase()),
            title,
            num_seats,
            parties: self.parties,
            districts: self.districts,
            quorum: self.quorum,
            weighting: self.weighting,
            tie_order: self.tie_order.unwrap_or_else(|| (0..num_parties).collect()),
        }
    }

    /// Sets the identifier of the union.
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }

    /// Sets the title of the union.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }

    /// Sets the total number of seats.
    pub fn num_seats(mut self, num_seats: usize) -> Self {
        self.num_seats = Some(num_seats);
        self
    }

    /// Sets the parties.
    pub fn parties(mut self, parties: impl Into<Vec<Party>>) -> Self {
        self.parties = parties.into();
        self
    }

    /// Sets the member district elections.
    pub fn districts(mut self, districts: impl Into<Vec<DistrictElection>>) -> Self {
        self.districts = districts.into();
        self
    }

    /// Sets the quorum.
    pub fn quorum(mut self, quorum: QuorumConfig) -> Self {
        self.quorum = quorum;
        self
    }

    /// Sets the weighting of the super-apportionment.
    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Sets the tie-break order of parties.
    pub fn tie_order(mut self, order: impl Borrow<[usize]>) -> Self {
        self.tie_order = Some(order.borrow().to_owned());
        self
    }
}

/// Builder for the [`SingleElection`] type.
#[derive(Default)]
pub struct SingleElectionBuilder {
    id: Option<String>,
    title: Option<String>,
    num_seats: Option<usize>,
    parties: Vec<Party>,
    district: Option<DistrictElection>,
    quorum: QuorumConfig,
    algorithm: MandateAlgorithm,
    list_unions: Vec<ListUnion>,
    tie_order: Option<Vec<usize>>,
}

impl SingleElectionBuilder {
    /// Build the [`SingleElection`] object. The number of seats defaults to
    /// the district mandates, and the tie order to the order of parties.
    pub fn build(self) -> SingleElection {
        let district = self.district.unwrap();
        let num_parties = self.parties.len();
        let title = self.title.unwrap();
        SingleElection {
            id: self.id.unwrap_or_else(|| title.to_lowercase()),
            title,
            num_seats: self.num_seats.unwrap_or(district.num_mandates),
            parties: self.parties,
            district,
            quorum: self.quorum,
            algorithm: self.algorithm,
            list_unions: self.list_unions,
            tie_order: self.tie_order.unwrap_or_else(|| (0..num_parties).collect()),
        }
    }

    /// Sets the identifier of the election.
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }

    /// Sets the title of the election.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }

    /// Sets the number of seats.
    pub fn num_seats(mut self, num_seats: usize) -> Self {
        self.num_seats = Some(num_seats);
        self
    }

    /// Sets the parties.
    pub fn parties(mut self, parties: impl Into<Vec<Party>>) -> Self {
        self.parties = parties.into();
        self
    }

    /// Sets the district.
    pub fn district(mut self, district: DistrictElection) -> Self {
        self.district = Some(district);
        self
    }

    /// Sets the quorum.
    pub fn quorum(mut self, quorum: QuorumConfig) -> Self {
        self.quorum = quorum;
        self
    }

    /// Sets the apportionment method.
    pub fn algorithm(mut self, algorithm: MandateAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the list unions.
    pub fn list_unions(mut self, list_unions: impl Into<Vec<ListUnion>>) -> Self {
        self.list_unions = list_unions.into();
        self
    }

    /// Sets the tie-break order of parties.
    pub fn tie_order(mut self, order: impl Borrow<[usize]>) -> Self {
        self.tie_order = Some(order.borrow().to_owned());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_union() -> ElectionUnion {
        ElectionUnion::builder()
            .title("Kantonsrat")
            .parties([Party::new("svp"), Party::new("sp"), Party::new("fdp")])
            .districts([
                DistrictElection::new("zurich", 2, [List::new(0, 3000), List::new(1, 400)]),
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
            ])
            .build()
    }

    #[test]
    fn test_party_new() {
        assert_eq!(
            Party::new("glp"),
            Party {
                id: "glp".to_owned(),
                name: "GLP".to_owned()
            }
        );
    }

    #[test]
    fn test_district_new() {
        let district = DistrictElection::new("dietikon", 1, Vec::<List>::new());
        assert_eq!(district.name, "Dietikon");
        assert_eq!(district.num_mandates, 1);
        assert!(district.lists.is_empty());
    }

    #[test]
    fn test_district_votes() {
        let union = make_union();
        assert_eq!(union.districts[0].votes_for(0), 3000);
        assert_eq!(union.districts[0].votes_for(2), 0);
        assert_eq!(union.districts[1].total_votes(), 3100);
    }

    #[test]
    fn test_builder_defaults() {
        let union = make_union();
        assert_eq!(union.id, "kantonsrat");
        assert_eq!(union.num_seats, 5);
        assert_eq!(union.tie_order, vec![0, 1, 2]);
        assert_eq!(union.weighting, Weighting::Votes);
        assert_eq!(union.quorum, QuorumConfig::none());
        assert_eq!(union.mandates(), vec![2, 2, 1]);
    }

    #[test]
    fn test_vote_matrix() {
        let union = make_union();
        assert_eq!(
            union.vote_matrix(),
            VoteMatrix::from_rows(3, [[3000, 400, 0], [2000, 100, 1000], [1000, 250, 500]])
        );
    }

    #[test]
    fn test_single_election_vote_matrix() {
        let election = SingleElection::builder()
            .title("Gemeinderat")
            .parties([Party::new("a"), Party::new("b")])
            .district(DistrictElection::new("uster", 3, [List::new(1, 42)]))
            .build();
        assert_eq!(election.num_seats, 3);
        assert_eq!(election.algorithm, MandateAlgorithm::DoubleProportional);
        assert_eq!(election.vote_matrix(), VoteMatrix::from_rows(2, [[0, 42]]));
    }
}
