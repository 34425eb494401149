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

//! Utilities to write contests into the format read by
//! [`parse_contest()`](crate::parse::parse_contest).

use crate::arithmetic::format_decimal;
use crate::quorum::QuorumConfig;
use crate::types::{
    Contest, DistrictElection, ElectionUnion, MandateAlgorithm, Party, SingleElection, Weighting,
};
use std::io::{self, Write};

/// Policy to write the tie order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteTieOrder {
    /// Always write the tie order, even if it is trivial.
    Always,
    /// Never write the tie order, but panics if it is non-trivial.
    Never,
    /// Only write the tie order if it is non-trivial.
    OnlyNonTrivial,
}

/// Serializes a contest in canonical form.
pub fn write_contest(
    output: &mut impl Write,
    contest: &Contest,
    write_tie_order: WriteTieOrder,
) -> io::Result<()> {
    let mut first = true;
    for union in &contest.unions {
        if !first {
            writeln!(output)?;
        }
        first = false;
        write_union(output, union, write_tie_order)?;
    }
    for election in &contest.elections {
        if !first {
            writeln!(output)?;
        }
        first = false;
        write_election(output, election, write_tie_order)?;
    }
    Ok(())
}

fn write_union(
    output: &mut impl Write,
    union: &ElectionUnion,
    write_tie_order: WriteTieOrder,
) -> io::Result<()> {
    writeln!(
        output,
        "union {} \"{}\" {}",
        union.id, union.title, union.num_seats
    )?;
    write_quorum(output, &union.quorum)?;
    if union.weighting == Weighting::VoterNumbers {
        writeln!(output, "[weighting voters]")?;
    }
    write_tie(output, &union.parties, &union.tie_order, write_tie_order)?;
    write_parties(output, &union.parties)?;
    for district in &union.districts {
        write_district(output, district, &union.parties)?;
    }
    writeln!(output, "end")
}

fn write_election(
    output: &mut impl Write,
    election: &SingleElection,
    write_tie_order: WriteTieOrder,
) -> io::Result<()> {
    writeln!(
        output,
        "election {} \"{}\" {}",
        election.id, election.title, election.num_seats
    )?;
    write_quorum(output, &election.quorum)?;
    if election.algorithm == MandateAlgorithm::HagenbachBischoff {
        writeln!(output, "[algorithm hagenbach-bischoff]")?;
    }
    for list_union in &election.list_unions {
        write!(output, "[listunion {}", list_union.id)?;
        for &member in &list_union.members {
            write!(output, " {}", election.parties[member].id)?;
        }
        writeln!(output, "]")?;
    }
    write_tie(
        output,
        &election.parties,
        &election.tie_order,
        write_tie_order,
    )?;
    write_parties(output, &election.parties)?;
    write_district(output, &election.district, &election.parties)?;
    writeln!(output, "end")
}

fn write_quorum(output: &mut impl Write, quorum: &QuorumConfig) -> io::Result<()> {
    if let Some(district) = &quorum.district {
        writeln!(output, "[quorum district {}]", format_decimal(district, 20))?;
    }
    if let Some(total) = &quorum.total {
        writeln!(output, "[quorum total {}]", format_decimal(total, 20))?;
    }
    Ok(())
}

fn write_tie(
    output: &mut impl Write,
    parties: &[Party],
    tie_order: &[usize],
    write_tie_order: WriteTieOrder,
) -> io::Result<()> {
    let has_non_trivial_tie_order = tie_order.len() != parties.len()
        || tie_order.iter().enumerate().any(|(rank, &party)| rank != party);
    if write_tie_order == WriteTieOrder::Never && has_non_trivial_tie_order {
        panic!("Writing the tie order is disabled, but the tie order is non-trivial");
    }

    let write_tie_order = match write_tie_order {
        WriteTieOrder::Always => true,
        WriteTieOrder::Never => false,
        WriteTieOrder::OnlyNonTrivial => has_non_trivial_tie_order,
    };
    if write_tie_order {
        write!(output, "[tie")?;
        for &party in tie_order {
            write!(output, " {}", parties[party].id)?;
        }
        writeln!(output, "]")?;
    }
    Ok(())
}

fn write_parties(output: &mut impl Write, parties: &[Party]) -> io::Result<()> {
    for party in parties {
        writeln!(output, "party {} \"{}\"", party.id, party.name)?;
    }
    Ok(())
}

fn write_district(
    output: &mut impl Write,
    district: &DistrictElection,
    parties: &[Party],
) -> io::Result<()> {
    write!(
        output,
        "district {} \"{}\" {}",
        district.id, district.name, district.num_mandates
    )?;
    for list in &district.lists {
        write!(output, " {}={}", parties[list.party].id, list.votes)?;
    }
    writeln!(output)
}
