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

//! Biproportional apportionment by alternating scaling.
//!
//! Given a matrix of votes and two marginals (seats per row and per column),
//! this finds row divisors `r[i]` and column divisors `c[j]` such that the
//! seats `x[i][j] = round(v[i][j] / (r[i] * c[j]))` add up to both marginals.
//! Row steps and column steps alternate, each step being a set of
//! one-dimensional divisor apportionments, until the marginals of the other
//! dimension are met as well.

use crate::arithmetic::{format_decimal, Rounding};
use crate::divisor;
use crate::error::ApportionmentError;
use crate::types::{SeatMatrix, VoteMatrix};
use log::Level::Debug;
use log::{debug, info, log_enabled, trace};
use num::traits::One;
use num::{BigInt, BigRational};
use std::cmp::Reverse;
use std::collections::{HashSet, VecDeque};

/// Default maximal number of scaling steps.
pub const MAX_ITERATIONS: usize = 1000;

/// Number of scaling steps without any progress after which alternating
/// scaling gives way to seat transfers.
const STALL_STEPS: usize = 20;

/// Rounding rule of biproportional apportionment.
const ROUNDING: Rounding = Rounding::Standard;

/// A set of seats that can be moved around a cycle of tied cells, yielding
/// another matrix with the same marginals and the same divisors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TieCycle {
    /// Cells (row, column) that would gain a seat in the alternative matrix.
    pub gains: Vec<(usize, usize)>,
    /// Cells (row, column) that would lose a seat in the alternative matrix.
    pub losses: Vec<(usize, usize)>,
}

/// A seat moved along a path of tied cells, from a column holding too many
/// seats to a column holding too few. Every row keeps its number of seats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatTransfer {
    /// Cells (row, column) that gained a seat.
    pub gains: Vec<(usize, usize)>,
    /// Cells (row, column) that lost a seat.
    pub losses: Vec<(usize, usize)>,
}

/// Result of a biproportional apportionment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BiproportionalApportionment {
    /// Seats of each cell.
    pub seats: SeatMatrix,
    /// Divisor of each row.
    pub row_divisors: Vec<BigRational>,
    /// Divisor of each column.
    pub col_divisors: Vec<BigRational>,
    /// Number of scaling steps until convergence.
    pub iterations: usize,
    /// Seats that were moved between tied cells to meet the column
    /// marginals, in order.
    pub transfers: Vec<SeatTransfer>,
    /// Ambiguities of the result, which were resolved by the priorities.
    pub ties: Vec<TieCycle>,
}

/// Apportions seats to the cells of the vote matrix, so that each row `i`
/// receives `row_sums[i]` seats and each column `j` receives `col_sums[j]`
/// seats.
///
/// Row and column steps alternate until both marginals are met. If the steps
/// start cycling between the same matrices (which happens with tied
/// quotients) or stop making progress, the remaining deviation is removed by
/// moving seats along paths of tied cells, scaling the divisors whenever no
/// such path exists (tie-and-transfer).
///
/// Ties are broken by the given priorities (lower values win), and every
/// remaining ambiguity of the final matrix is reported as a [`TieCycle`].
pub fn apportion(
    votes: &VoteMatrix,
    row_sums: &[usize],
    col_sums: &[usize],
    row_priority: &[usize],
    col_priority: &[usize],
    max_iterations: usize,
) -> Result<BiproportionalApportionment, ApportionmentError> {
    check_marginals(votes, row_sums, col_sums)?;

    let num_rows = votes.num_rows();
    let num_cols = votes.num_cols();
    let mut row_divisors = vec![BigRational::one(); num_rows];
    let mut col_divisors = vec![BigRational::one(); num_cols];
    let mut iterations = 0;
    let mut transfers = Vec::new();

    let mut seen = HashSet::new();
    let mut best_deviation = usize::MAX;
    let mut last_progress = 0;

    let seats = loop {
        if iterations >= max_iterations {
            return Err(no_convergence(iterations));
        }
        iterations += 1;

        let row_step = iterations % 2 == 1;
        let seats = if row_step {
            let (lines, divisors) = scale_lines(
                num_rows,
                |i, j| votes.get(i, j),
                row_sums,
                &col_divisors,
                col_sums,
                col_priority,
            )?;
            row_divisors = divisors;
            SeatMatrix::from_rows(num_cols, lines)
        } else {
            let (lines, divisors) = scale_lines(
                num_cols,
                |j, i| votes.get(i, j),
                col_sums,
                &row_divisors,
                row_sums,
                row_priority,
            )?;
            col_divisors = divisors;
            let mut seats = SeatMatrix::new(num_rows, num_cols);
            for (j, line) in lines.iter().enumerate() {
                for (i, &x) in line.iter().enumerate() {
                    seats.set(i, j, x);
                }
            }
            seats
        };

        let deviation: usize = std::iter::zip(seats.row_sums(), row_sums)
            .chain(std::iter::zip(seats.col_sums(), col_sums))
            .map(|(actual, &target)| actual.abs_diff(target))
            .sum();
        debug!("Scaling step {iterations}: deviation from the marginals = {deviation}");
        if deviation == 0 {
            break seats;
        }
        if deviation < best_deviation {
            best_deviation = deviation;
            last_progress = iterations;
        }

        // After a row step the rows are exact, which is where seat transfers
        // start from.
        if row_step {
            let stalled = iterations - last_progress >= STALL_STEPS;
            if !seen.insert(seats.clone()) || stalled {
                info!(
                    "Alternating scaling {} after {iterations} steps, moving seats between tied cells",
                    if stalled { "stalled" } else { "is cycling" }
                );
                let mut state = TransferState {
                    votes,
                    col_sums,
                    row_order: priority_order(row_priority),
                    col_order: priority_order(col_priority),
                    seats,
                    row_divisors,
                    col_divisors,
                };
                transfers = state.balance_columns(&mut iterations, max_iterations)?;
                row_divisors = state.row_divisors;
                col_divisors = state.col_divisors;
                break state.seats;
            }
        }
    };

    info!("Biproportional apportionment converged after {iterations} scaling steps");
    if log_enabled!(Debug) {
        debug!("Row divisors: {}", format_divisors(&row_divisors));
        debug!("Column divisors: {}", format_divisors(&col_divisors));
    }

    for i in 0..num_rows {
        for j in 0..num_cols {
            if votes.get(i, j) == 0 && seats.get(i, j) != 0 {
                return Err(ApportionmentError::Infeasible(format!(
                    "cell ({i}, {j}) without votes received {} seat(s)",
                    seats.get(i, j)
                )));
            }
        }
    }

    let ties = find_ties(votes, &seats, &row_divisors, &col_divisors);
    if !ties.is_empty() {
        info!("Found {} ambiguous seat cycle(s)", ties.len());
    }

    Ok(BiproportionalApportionment {
        seats,
        row_divisors,
        col_divisors,
        iterations,
        transfers,
        ties,
    })
}

fn no_convergence(iterations: usize) -> ApportionmentError {
    ApportionmentError::Infeasible(format!("no convergence after {iterations} scaling steps"))
}

/// Returns the indices sorted by priority, then by index.
fn priority_order(priority: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..priority.len()).collect();
    order.sort_by_key(|&k| (priority[k], k));
    order
}

/// How a column was reached by the search for a transfer path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reached {
    No,
    /// The column holds too many seats.
    Surplus,
    /// The column was reached through a row, which was itself reached from
    /// the given column.
    Through { row: usize, from: usize },
}

/// Columns and rows reached from the columns holding too many seats.
struct Labels {
    cols: Vec<Reached>,
    rows: Vec<bool>,
}

/// State of the tie-and-transfer phase. All the rows hold the right number of
/// seats, and each cell is a valid rounding of its quotient.
struct TransferState<'a> {
    votes: &'a VoteMatrix,
    col_sums: &'a [usize],
    row_order: Vec<usize>,
    col_order: Vec<usize>,
    seats: SeatMatrix,
    row_divisors: Vec<BigRational>,
    col_divisors: Vec<BigRational>,
}

impl TransferState<'_> {
    /// Moves seats between columns until every column holds its target
    /// number of seats. Each transfer and each scaling of the divisors counts
    /// as one step.
    fn balance_columns(
        &mut self,
        iterations: &mut usize,
        max_iterations: usize,
    ) -> Result<Vec<SeatTransfer>, ApportionmentError> {
        let mut transfers = Vec::new();
        loop {
            let deviations: Vec<isize> = std::iter::zip(self.seats.col_sums(), self.col_sums)
                .map(|(actual, &target)| actual as isize - target as isize)
                .collect();
            let deviation: usize = deviations.iter().map(|d| d.unsigned_abs()).sum();
            if deviation == 0 {
                return Ok(transfers);
            }
            if *iterations >= max_iterations {
                return Err(no_convergence(*iterations));
            }
            *iterations += 1;

            let (labels, target) = self.search(&deviations);
            match target {
                Some(target) => {
                    let transfer = self.transfer(&labels, target);
                    debug!(
                        "Step {iterations}: moved a seat from {:?} to {:?}",
                        transfer.losses, transfer.gains
                    );
                    transfers.push(transfer);
                }
                None => {
                    let factor = self.scale(&labels)?;
                    debug!(
                        "Step {iterations}: scaled the divisors of the reached lines by {}",
                        format_decimal(&factor, 6)
                    );
                }
            }
        }
    }

    fn quotient(&self, i: usize, j: usize) -> BigRational {
        BigRational::from_integer(BigInt::from(self.votes.get(i, j)))
            / (&self.row_divisors[i] * &self.col_divisors[j])
    }

    /// Whether the quotient of the cell is exactly on its next signpost.
    fn can_gain(&self, i: usize, j: usize) -> bool {
        self.votes.get(i, j) != 0
            && self.quotient(i, j) == ROUNDING.signpost(self.seats.get(i, j))
    }

    /// Whether the quotient of the cell is exactly on its last signpost.
    fn can_lose(&self, i: usize, j: usize) -> bool {
        let x = self.seats.get(i, j);
        x != 0 && self.quotient(i, j) == ROUNDING.signpost(x - 1)
    }

    /// Breadth-first search from the columns with a surplus, alternating
    /// between cells that can lose a seat (column to row) and cells that can
    /// gain one (row to column). Returns the labels and the first column with
    /// a deficit that was reached, if any.
    fn search(&self, deviations: &[isize]) -> (Labels, Option<usize>) {
        let mut labels = Labels {
            cols: vec![Reached::No; self.col_divisors.len()],
            rows: vec![false; self.row_divisors.len()],
        };
        let mut queue = VecDeque::new();
        for &j in &self.col_order {
            if deviations[j] > 0 {
                labels.cols[j] = Reached::Surplus;
                queue.push_back(j);
            }
        }

        while let Some(j) = queue.pop_front() {
            for &i in &self.row_order {
                if labels.rows[i] || !self.can_lose(i, j) {
                    continue;
                }
                labels.rows[i] = true;
                for &k in &self.col_order {
                    if labels.cols[k] != Reached::No || !self.can_gain(i, k) {
                        continue;
                    }
                    labels.cols[k] = Reached::Through { row: i, from: j };
                    if deviations[k] < 0 {
                        return (labels, Some(k));
                    }
                    queue.push_back(k);
                }
            }
        }
        (labels, None)
    }

    /// Moves one seat along the path that leads to the target column.
    fn transfer(&mut self, labels: &Labels, target: usize) -> SeatTransfer {
        let mut gains = Vec::new();
        let mut losses = Vec::new();
        let mut col = target;
        while let Reached::Through { row, from } = labels.cols[col] {
            self.seats.set(row, col, self.seats.get(row, col) + 1);
            self.seats.set(row, from, self.seats.get(row, from) - 1);
            gains.push((row, col));
            losses.push((row, from));
            col = from;
        }
        gains.sort_unstable();
        losses.sort_unstable();
        SeatTransfer { gains, losses }
    }

    /// Multiplies the divisors of the reached columns and divides those of the
    /// reached rows by the smallest factor that puts another cell on a
    /// signpost. Quotients of cells in both a reached row and a reached column
    /// are unchanged, and every cell stays a valid rounding.
    fn scale(&mut self, labels: &Labels) -> Result<BigRational, ApportionmentError> {
        let mut factor: Option<BigRational> = None;
        for (i, &row_reached) in labels.rows.iter().enumerate() {
            for (j, col_reached) in labels.cols.iter().enumerate() {
                let col_reached = *col_reached != Reached::No;
                let x = self.seats.get(i, j);
                if self.votes.get(i, j) == 0 {
                    continue;
                }
                let candidate = if row_reached && !col_reached {
                    ROUNDING.signpost(x) / self.quotient(i, j)
                } else if !row_reached && col_reached && x != 0 {
                    self.quotient(i, j) / ROUNDING.signpost(x - 1)
                } else {
                    continue;
                };
                if factor.as_ref().map_or(true, |f| candidate < *f) {
                    factor = Some(candidate);
                }
            }
        }

        let Some(factor) = factor else {
            let cols: Vec<usize> = (0..labels.cols.len())
                .filter(|&j| labels.cols[j] != Reached::No)
                .collect();
            return Err(ApportionmentError::Infeasible(format!(
                "the surplus seats of columns {cols:?} cannot move to other columns"
            )));
        };

        for (divisor, _) in self
            .row_divisors
            .iter_mut()
            .zip(&labels.rows)
            .filter(|(_, &reached)| reached)
        {
            *divisor /= &factor;
        }
        for (divisor, _) in self
            .col_divisors
            .iter_mut()
            .zip(&labels.cols)
            .filter(|(_, &reached)| reached != Reached::No)
        {
            *divisor *= &factor;
        }
        Ok(factor)
    }
}

/// Checks that the marginals match the matrix, and the necessary conditions
/// for an apportionment to exist.
fn check_marginals(
    votes: &VoteMatrix,
    row_sums: &[usize],
    col_sums: &[usize],
) -> Result<(), ApportionmentError> {
    if votes.num_rows() != row_sums.len() || votes.num_cols() != col_sums.len() {
        return Err(ApportionmentError::InputInconsistent(format!(
            "marginals of size {}x{} for a {}x{} vote matrix",
            row_sums.len(),
            col_sums.len(),
            votes.num_rows(),
            votes.num_cols()
        )));
    }

    let row_total: usize = row_sums.iter().sum();
    let col_total: usize = col_sums.iter().sum();
    if row_total != col_total {
        return Err(ApportionmentError::InputInconsistent(format!(
            "row marginals sum to {row_total} but column marginals sum to {col_total}"
        )));
    }

    for (i, &target) in row_sums.iter().enumerate() {
        let capacity: usize = (0..votes.num_cols())
            .filter(|&j| votes.get(i, j) != 0)
            .map(|j| col_sums[j])
            .sum();
        if capacity < target {
            return Err(ApportionmentError::Infeasible(format!(
                "row {i} needs {target} seats but its columns with votes only have {capacity}"
            )));
        }
    }
    for (j, &target) in col_sums.iter().enumerate() {
        let capacity: usize = (0..votes.num_rows())
            .filter(|&i| votes.get(i, j) != 0)
            .map(|i| row_sums[i])
            .sum();
        if capacity < target {
            return Err(ApportionmentError::Infeasible(format!(
                "column {j} needs {target} seats but its rows with votes only have {capacity}"
            )));
        }
    }

    Ok(())
}

/// Performs one scaling step: apportions each line (row or column) with the
/// votes divided by the current divisors of the other dimension.
///
/// Ties within a line go first to the cross lines that still need the most
/// seats, and then by priority.
fn scale_lines(
    num_lines: usize,
    vote: impl Fn(usize, usize) -> u64,
    line_sums: &[usize],
    cross_divisors: &[BigRational],
    cross_sums: &[usize],
    cross_priority: &[usize],
) -> Result<(Vec<Vec<usize>>, Vec<BigRational>), ApportionmentError> {
    let num_cross = cross_divisors.len();
    let mut assigned = vec![0usize; num_cross];
    let mut lines = Vec::with_capacity(num_lines);
    let mut divisors = Vec::with_capacity(num_lines);

    for (line, &target) in line_sums.iter().enumerate() {
        let weights: Vec<BigRational> = (0..num_cross)
            .map(|k| BigRational::from_integer(BigInt::from(vote(line, k))) / &cross_divisors[k])
            .collect();

        let mut order: Vec<usize> = (0..num_cross).collect();
        order.sort_by_key(|&k| {
            (
                Reverse(cross_sums[k] as isize - assigned[k] as isize),
                cross_priority[k],
                k,
            )
        });
        let mut priority = vec![0; num_cross];
        for (rank, k) in order.into_iter().enumerate() {
            priority[k] = rank;
        }

        let result = divisor::apportion(&weights, target, ROUNDING, &priority)?;
        trace!(
            "Line {line}: seats {:?}, divisor {}",
            result.seats,
            format_decimal(&result.divisor, 6)
        );
        for (a, &s) in assigned.iter_mut().zip(&result.seats) {
            *a += s;
        }
        lines.push(result.seats);
        divisors.push(result.divisor);
    }

    Ok((lines, divisors))
}

fn format_divisors(divisors: &[BigRational]) -> String {
    divisors
        .iter()
        .map(|d| format_decimal(d, 6))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Edge of the graph of tied cells, either from a row to a column (the cell
/// could gain a seat) or from a column to a row (the cell could lose one).
struct TieEdge {
    from: usize,
    to: usize,
    cell: (usize, usize),
    gain: bool,
}

/// Finds disjoint cycles of cells whose quotients lie exactly on a
/// signpost, alternating between cells that could gain a seat and cells that
/// could lose one. Moving one seat around such a cycle keeps all the
/// marginals and yields another valid apportionment.
fn find_ties(
    votes: &VoteMatrix,
    seats: &SeatMatrix,
    row_divisors: &[BigRational],
    col_divisors: &[BigRational],
) -> Vec<TieCycle> {
    let num_rows = votes.num_rows();
    let num_nodes = num_rows + votes.num_cols();

    let mut edges = Vec::new();
    for (i, r) in row_divisors.iter().enumerate() {
        for (j, c) in col_divisors.iter().enumerate() {
            let v = votes.get(i, j);
            if v == 0 {
                continue;
            }
            let x = seats.get(i, j);
            let quotient = BigRational::from_integer(BigInt::from(v)) / (r * c);
            if quotient == ROUNDING.signpost(x) {
                edges.push(TieEdge {
                    from: i,
                    to: num_rows + j,
                    cell: (i, j),
                    gain: true,
                });
            }
            if x != 0 && quotient == ROUNDING.signpost(x - 1) {
                edges.push(TieEdge {
                    from: num_rows + j,
                    to: i,
                    cell: (i, j),
                    gain: false,
                });
            }
        }
    }
    trace!("Found {} tied cell edges", edges.len());

    let mut alive = vec![true; edges.len()];
    let mut ties = Vec::new();
    while let Some(cycle) = find_cycle(num_nodes, &edges, &alive) {
        let mut gains = Vec::new();
        let mut losses = Vec::new();
        for k in cycle {
            alive[k] = false;
            if edges[k].gain {
                gains.push(edges[k].cell);
            } else {
                losses.push(edges[k].cell);
            }
        }
        gains.sort_unstable();
        losses.sort_unstable();
        ties.push(TieCycle { gains, losses });
    }
    ties
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnPath,
    Done,
}

/// Returns the edges of a directed cycle among the alive edges, if any.
fn find_cycle(num_nodes: usize, edges: &[TieEdge], alive: &[bool]) -> Option<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); num_nodes];
    for (k, edge) in edges.iter().enumerate() {
        if alive[k] {
            adjacency[edge.from].push(k);
        }
    }

    let mut visit = vec![Visit::New; num_nodes];
    // Number of path edges at the time each node was entered.
    let mut depth = vec![0; num_nodes];
    for start in 0..num_nodes {
        if visit[start] != Visit::New {
            continue;
        }
        visit[start] = Visit::OnPath;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        let mut path: Vec<usize> = Vec::new();

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&k) = adjacency[node].get(top.1) {
                top.1 += 1;
                let to = edges[k].to;
                match visit[to] {
                    Visit::OnPath => {
                        let mut cycle = path[depth[to]..].to_vec();
                        cycle.push(k);
                        return Some(cycle);
                    }
                    Visit::New => {
                        path.push(k);
                        visit[to] = Visit::OnPath;
                        depth[to] = path.len();
                        stack.push((to, 0));
                    }
                    Visit::Done => (),
                }
            } else {
                visit[node] = Visit::Done;
                stack.pop();
                path.pop();
            }
        }
    }
    None
}
