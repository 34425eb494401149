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

//! Human-readable reports of apportionment results.

use crate::arithmetic::{format_decimal, Rounding};
use crate::end_result::{ApportionmentConfig, ContestResult, EndResult};
use crate::error::ApportionmentError;
use crate::lot::{Contender, LotDecision};
use crate::quorum::QuorumConfig;
use crate::types::{
    Contest, DistrictElection, ElectionUnion, ListUnion, MandateAlgorithm, Party, SingleElection,
};
use num::BigRational;
use std::io::{self, Write};

/// Number of decimal places of divisors and weights in reports.
const DECIMAL_PLACES: usize = 6;

/// Elements of an election that are needed to name the contenders.
struct Names<'a> {
    parties: &'a [Party],
    districts: &'a [DistrictElection],
    list_unions: &'a [ListUnion],
}

impl Names<'_> {
    fn contender(&self, contender: &Contender) -> String {
        match *contender {
            Contender::Party(j) => self.parties[j].name.clone(),
            Contender::ListUnion(u) => format!("list union {}", self.list_unions[u].id),
            Contender::Cell { district, party } => format!(
                "{}/{}",
                self.districts[district].name, self.parties[party].name
            ),
        }
    }

    fn contenders(&self, contenders: &[Contender]) -> String {
        contenders
            .iter()
            .map(|c| self.contender(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Writes the report of all the elections of a contest.
pub fn write_contest_report(
    out: &mut impl Write,
    contest: &Contest,
    result: &ContestResult,
    package_name: &str,
    config: &ApportionmentConfig,
) -> io::Result<()> {
    for (union, result) in contest.unions.iter().zip(&result.unions) {
        write_union_report(out, union, result, package_name, config)?;
    }
    for (election, result) in contest.elections.iter().zip(&result.elections) {
        write_election_report(out, election, result, package_name, config)?;
    }
    Ok(())
}

/// Writes the report of an election union.
pub fn write_union_report(
    out: &mut impl Write,
    union: &ElectionUnion,
    result: &Result<EndResult, ApportionmentError>,
    package_name: &str,
    config: &ApportionmentConfig,
) -> io::Result<()> {
    writeln!(
        out,
        r"
Election union: {}

	{package_name}
	Rule: Biproportional apportionment, {}
	Lot rule: {}
	Seats: {}
	Districts: {}
	Parties: {}
	Quorum: {}
",
        union.title,
        Rounding::Standard.description(),
        config.lot_rule.description(),
        union.num_seats,
        union.districts.len(),
        union.parties.len(),
        union.quorum.description(),
    )?;

    let result = match result {
        Ok(result) => result,
        Err(e) => return write_failure(out, e),
    };
    let names = Names {
        parties: &union.parties,
        districts: &union.districts,
        list_unions: &[],
    };

    write_quorum(out, &union.quorum, result, &union.parties)?;
    writeln!(out, "Action: Super-apportionment")?;
    write_party_seats(out, result, &union.parties)?;
    writeln!(
        out,
        "\tDivisor: {}",
        format_decimal(&result.union_divisor, DECIMAL_PLACES)
    )?;

    writeln!(
        out,
        "Action: Sub-apportionment ({} scaling steps)",
        result.iterations
    )?;
    for (i, district) in union.districts.iter().enumerate() {
        write!(out, "\t{}:", district.name)?;
        for (j, party) in union.parties.iter().enumerate() {
            if j != 0 {
                write!(out, ",")?;
            }
            write!(out, " {} {}", party.name, result.seats.get(i, j))?;
        }
        writeln!(
            out,
            " (divisor {})",
            format_decimal(&result.district_divisors[i], DECIMAL_PLACES)
        )?;
    }
    write!(out, "\tParty divisors:")?;
    for (j, (party, divisor)) in union.parties.iter().zip(&result.party_divisors).enumerate() {
        if j != 0 {
            write!(out, ",")?;
        }
        write!(out, " {} {}", party.name, optional_decimal(divisor.as_ref()))?;
    }
    writeln!(out)?;

    write_lot_decisions(out, &result.lot_decisions, &names)
}

/// Writes the report of a single election.
pub fn write_election_report(
    out: &mut impl Write,
    election: &SingleElection,
    result: &Result<EndResult, ApportionmentError>,
    package_name: &str,
    config: &ApportionmentConfig,
) -> io::Result<()> {
    let rule = match election.algorithm {
        MandateAlgorithm::DoubleProportional => {
            format!("Divisor method, {}", Rounding::Standard.description())
        }
        MandateAlgorithm::HagenbachBischoff => format!(
            "Divisor method with list unions, {}",
            Rounding::Down.description()
        ),
    };
    writeln!(
        out,
        r"
Election: {}

	{package_name}
	Rule: {rule}
	Lot rule: {}
	Seats: {}
	Parties: {}
	Quorum: {}
",
        election.title,
        config.lot_rule.description(),
        election.num_seats,
        election.parties.len(),
        election.quorum.description(),
    )?;

    let result = match result {
        Ok(result) => result,
        Err(e) => return write_failure(out, e),
    };
    let names = Names {
        parties: &election.parties,
        districts: std::slice::from_ref(&election.district),
        list_unions: &election.list_unions,
    };

    write_quorum(out, &election.quorum, result, &election.parties)?;
    if !election.list_unions.is_empty() {
        writeln!(out, "Action: List unions")?;
        for (list_union, &seats) in election.list_unions.iter().zip(&result.list_union_seats) {
            let members: Vec<&str> = list_union
                .members
                .iter()
                .map(|&j| election.parties[j].name.as_str())
                .collect();
            writeln!(
                out,
                "\t{}: {} ({})",
                list_union.id,
                plural_seats(seats),
                members.join(", ")
            )?;
        }
    }
    writeln!(out, "Action: Apportionment")?;
    write_party_seats(out, result, &election.parties)?;
    writeln!(
        out,
        "\tDivisor: {}",
        format_decimal(&result.union_divisor, DECIMAL_PLACES)
    )?;

    write_lot_decisions(out, &result.lot_decisions, &names)
}

fn write_failure(out: &mut impl Write, error: &ApportionmentError) -> io::Result<()> {
    writeln!(out, "Action: Failure")?;
    writeln!(out, "\t{error}")
}

fn write_quorum(
    out: &mut impl Write,
    quorum: &QuorumConfig,
    result: &EndResult,
    parties: &[Party],
) -> io::Result<()> {
    if !quorum.is_enabled() {
        return Ok(());
    }
    writeln!(out, "Action: Quorum")?;
    for q in &result.quorum {
        writeln!(
            out,
            "\t{} {} ({} votes)",
            if q.passed { "Passed:" } else { "Failed:" },
            parties[q.party].name,
            q.votes
        )?;
    }
    Ok(())
}

fn write_party_seats(
    out: &mut impl Write,
    result: &EndResult,
    parties: &[Party],
) -> io::Result<()> {
    for (j, party) in parties.iter().enumerate() {
        writeln!(
            out,
            "\t{}: {} (weight {})",
            party.name,
            plural_seats(result.party_seats[j]),
            format_decimal(&result.party_weights[j], DECIMAL_PLACES)
        )?;
    }
    Ok(())
}

fn write_lot_decisions(
    out: &mut impl Write,
    decisions: &[LotDecision],
    names: &Names,
) -> io::Result<()> {
    for decision in decisions {
        writeln!(
            out,
            "Action: Lot decision in {} ({})",
            decision.stage,
            decision.rule.description()
        )?;
        writeln!(out, "\tContenders: {}", names.contenders(&decision.contenders))?;
        writeln!(
            out,
            "\tWinners: {} ({})",
            names.contenders(&decision.winners),
            plural_seats(decision.seats)
        )?;
    }
    Ok(())
}

fn optional_decimal(x: Option<&BigRational>) -> String {
    match x {
        Some(x) => format_decimal(x, DECIMAL_PLACES),
        None => "-".to_owned(),
    }
}

fn plural_seats(seats: usize) -> String {
    if seats == 1 {
        "1 seat".to_owned()
    } else {
        format!("{seats} seats")
    }
}
