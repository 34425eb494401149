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

//! Module to parse contest files.
//!
//! A contest file is a sequence of blocks, each describing an election union
//! or a single election:
//!
//! ```text
//! union kantonsrat "Kantonsrat" 5
//! [quorum district 5]
//! [tie svp sp fdp]
//! party svp "SVP"
//! party sp "SP"
//! party fdp "FDP"
//! district zurich "Zürich" 2 svp=3000 sp=400
//! district winterthur "Winterthur" 2 svp=2000 sp=100 fdp=1000
//! district dietikon "Dietikon" 1 svp=1000 sp=250 fdp=500
//! end
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use crate::arithmetic::parse_decimal;
use crate::error::ParseError;
use crate::quorum::QuorumConfig;
use crate::types::{
    Contest, DistrictElection, ElectionUnion, List, ListUnion, MandateAlgorithm, Party,
    SingleElection, Weighting,
};
use log::{info, trace, warn};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockKind {
    Union,
    Election,
}

/// Identifiers that reference parties, resolved once all parties are known.
struct PartyRefs {
    line: usize,
    ids: Vec<String>,
}

/// Block that is being parsed.
struct Block {
    kind: BlockKind,
    line: usize,
    id: String,
    title: String,
    num_seats: usize,
    quorum: QuorumConfig,
    weighting: Weighting,
    algorithm: MandateAlgorithm,
    tie: Option<PartyRefs>,
    list_unions: Vec<(String, PartyRefs)>,
    parties: Vec<Party>,
    party_index: HashMap<String, usize>,
    districts: Vec<DistrictElection>,
}

impl Block {
    fn new(kind: BlockKind, line: usize, id: String, title: String, num_seats: usize) -> Self {
        Block {
            kind,
            line,
            id,
            title,
            num_seats,
            quorum: QuorumConfig::none(),
            weighting: Weighting::default(),
            algorithm: MandateAlgorithm::default(),
            tie: None,
            list_unions: Vec::new(),
            parties: Vec::new(),
            party_index: HashMap::new(),
            districts: Vec::new(),
        }
    }

    fn resolve(&self, refs: &PartyRefs) -> Result<Vec<usize>, ParseError> {
        refs.ids
            .iter()
            .map(|id| {
                self.party_index
                    .get(id)
                    .copied()
                    .ok_or_else(|| {
                        ParseError::syntax(refs.line, format!("Unknown party: {id}"))
                    })
            })
            .collect()
    }

    fn tie_order(&self) -> Result<Vec<usize>, ParseError> {
        match &self.tie {
            None => Ok((0..self.parties.len()).collect()),
            Some(refs) => {
                let order = self.resolve(refs)?;
                let mut seen = HashSet::new();
                for (&j, id) in order.iter().zip(&refs.ids) {
                    if !seen.insert(j) {
                        return Err(ParseError::syntax(
                            refs.line,
                            format!("Party mentioned twice in tie order: {id}"),
                        ));
                    }
                }
                Ok(order)
            }
        }
    }
}

/// Parses a contest file.
pub fn parse_contest(input: impl BufRead) -> Result<Contest, ParseError> {
    let re_header =
        Regex::new(r#"^(union|election) ([a-z][a-z0-9_-]*) "([^"]*)" ([0-9]+)$"#).unwrap();
    let re_option = Regex::new(r"^\[([a-z]+)((?: [a-z0-9._-]+)*)\]$").unwrap();
    let re_party = Regex::new(r#"^party ([a-z][a-z0-9_-]*) "([^"]*)"$"#).unwrap();
    let re_district = Regex::new(
        r#"^district ([a-z][a-z0-9_-]*) "([^"]*)" ([0-9]+)((?: [a-z][a-z0-9_-]*=[0-9]+)*)$"#,
    )
    .unwrap();

    let mut contest = Contest::default();
    let mut ids: HashSet<String> = HashSet::new();
    let mut block: Option<Block> = None;
    let mut num_lines = 0;

    for (i, line) in input.lines().enumerate() {
        let line_number = i + 1;
        num_lines = line_number;
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let current = match &mut block {
            None => {
                let captures = re_header.captures(line).ok_or_else(|| {
                    ParseError::syntax(
                        line_number,
                        format!("Expected a union or election: {line}"),
                    )
                })?;
                let kind = match &captures[1] {
                    "union" => BlockKind::Union,
                    _ => BlockKind::Election,
                };
                let id = captures[2].to_owned();
                if !ids.insert(id.clone()) {
                    return Err(ParseError::syntax(
                        line_number,
                        format!("Duplicate identifier: {id}"),
                    ));
                }
                let title = captures[3].to_owned();
                let num_seats = parse_number(line_number, &captures[4])?;
                info!("{kind:?} {id} ({title}): {num_seats} seats");
                block = Some(Block::new(kind, line_number, id, title, num_seats));
                continue;
            }
            Some(current) => current,
        };

        if line == "end" {
            if let Some(finished) = block.take() {
                finish_block(&mut contest, finished, line_number)?;
            }
        } else if let Some(captures) = re_option.captures(line) {
            let items: Vec<&str> = captures[2].split_whitespace().collect();
            parse_option(current, line_number, &captures[1], &items)?;
        } else if let Some(captures) = re_party.captures(line) {
            let id = captures[1].to_owned();
            if current.party_index.contains_key(&id) {
                return Err(ParseError::syntax(line_number, format!("Duplicate party: {id}")));
            }
            trace!("Party {id}: {}", &captures[2]);
            current.party_index.insert(id.clone(), current.parties.len());
            current.parties.push(Party {
                id,
                name: captures[2].to_owned(),
            });
        } else if let Some(captures) = re_district.captures(line) {
            let mut lists = Vec::new();
            let mut seen = HashSet::new();
            for item in captures[4].split_whitespace() {
                let (party, votes) = item.split_once('=').ok_or_else(|| {
                    ParseError::syntax(line_number, format!("Invalid list: {item}"))
                })?;
                let index = *current.party_index.get(party).ok_or_else(|| {
                    ParseError::syntax(line_number, format!("Unknown party: {party}"))
                })?;
                if !seen.insert(index) {
                    return Err(ParseError::syntax(
                        line_number,
                        format!("Duplicate list for party: {party}"),
                    ));
                }
                lists.push(List::new(index, parse_number(line_number, votes)?));
            }
            let district = DistrictElection {
                id: captures[1].to_owned(),
                name: captures[2].to_owned(),
                num_mandates: parse_number(line_number, &captures[3])?,
                lists,
            };
            trace!(
                "District {}: {} mandates, {} lists",
                district.id,
                district.num_mandates,
                district.lists.len()
            );
            current.districts.push(district);
        } else {
            return Err(ParseError::syntax(line_number, format!("Unrecognized line: {line}")));
        }
    }

    if let Some(unfinished) = block {
        return Err(ParseError::syntax(
            num_lines + 1,
            format!("Missing end of {}", unfinished.id),
        ));
    }

    info!(
        "Parsed {} union(s) and {} single election(s)",
        contest.unions.len(),
        contest.elections.len()
    );
    Ok(contest)
}

fn parse_option(
    block: &mut Block,
    line: usize,
    name: &str,
    items: &[&str],
) -> Result<(), ParseError> {
    match name {
        "quorum" => {
            let (kind, value) = match items {
                [kind, value] => (*kind, *value),
                _ => {
                    return Err(ParseError::syntax(
                        line,
                        "Expected [quorum district|total <percent>]",
                    ))
                }
            };
            let percent = parse_decimal(value)
                .ok_or_else(|| ParseError::syntax(line, format!("Invalid percentage: {value}")))?;
            match kind {
                "district" => block.quorum.district = Some(percent),
                "total" => block.quorum.total = Some(percent),
                _ => return Err(ParseError::syntax(line, format!("Unknown quorum: {kind}"))),
            }
            info!("Quorum: {}", block.quorum.description());
        }
        "weighting" if block.kind == BlockKind::Union => {
            block.weighting = match items {
                ["votes"] => Weighting::Votes,
                ["voters"] => Weighting::VoterNumbers,
                _ => return Err(ParseError::syntax(line, "Expected [weighting votes|voters]")),
            };
            info!("Weighting: {:?}", block.weighting);
        }
        "algorithm" if block.kind == BlockKind::Election => {
            block.algorithm = match items {
                ["biproportional"] => MandateAlgorithm::DoubleProportional,
                ["hagenbach-bischoff"] => MandateAlgorithm::HagenbachBischoff,
                _ => {
                    return Err(ParseError::syntax(
                        line,
                        "Expected [algorithm biproportional|hagenbach-bischoff]",
                    ))
                }
            };
            info!("Algorithm: {:?}", block.algorithm);
        }
        "tie" => {
            info!("Tie-break order: {items:?}");
            block.tie = Some(PartyRefs {
                line,
                ids: items.iter().map(|&x| x.to_owned()).collect(),
            });
        }
        "listunion" if block.kind == BlockKind::Election => match items {
            [id, members @ ..] if !members.is_empty() => {
                info!("List union {id}: {members:?}");
                block.list_unions.push((
                    (*id).to_owned(),
                    PartyRefs {
                        line,
                        ids: members.iter().map(|&x| x.to_owned()).collect(),
                    },
                ));
            }
            _ => return Err(ParseError::syntax(line, "Expected [listunion <id> <parties...>]")),
        },
        _ => warn!("Ignored option on line {line}: {name}"),
    }
    Ok(())
}

fn finish_block(contest: &mut Contest, block: Block, line: usize) -> Result<(), ParseError> {
    let tie_order = block.tie_order()?;
    match block.kind {
        BlockKind::Union => {
            contest.unions.push(ElectionUnion {
                id: block.id,
                title: block.title,
                num_seats: block.num_seats,
                parties: block.parties,
                districts: block.districts,
                quorum: block.quorum,
                weighting: block.weighting,
                tie_order,
            });
        }
        BlockKind::Election => {
            let list_unions = block
                .list_unions
                .iter()
                .map(|(id, refs)| Ok(ListUnion::new(id.as_str(), block.resolve(refs)?)))
                .collect::<Result<Vec<_>, ParseError>>()?;
            let mut districts = block.districts;
            if districts.len() != 1 {
                return Err(ParseError::syntax(
                    line,
                    format!(
                        "Election {} must have exactly one district, found {}",
                        block.id,
                        districts.len()
                    ),
                ));
            }
            let district = districts.remove(0);
            contest.elections.push(SingleElection {
                id: block.id,
                title: block.title,
                num_seats: block.num_seats,
                parties: block.parties,
                district,
                quorum: block.quorum,
                algorithm: block.algorithm,
                list_unions,
                tie_order,
            });
        }
    }
    trace!("Block from line {} to line {line} is complete", block.line);
    Ok(())
}

fn parse_number<T: std::str::FromStr>(line: usize, value: &str) -> Result<T, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError::syntax(line, format!("Invalid number: {value}")))
}
