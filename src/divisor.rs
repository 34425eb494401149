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

//! One-dimensional divisor methods (highest averages).

use crate::arithmetic::{select_divisor, Rounding};
use crate::error::ApportionmentError;
use log::Level::Trace;
use log::{log_enabled, trace};
use num::traits::Zero;
use num::BigRational;

/// Seats that were contested by more contenders than seats remained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tie {
    /// Indices of all the contenders that shared the deciding quotient.
    pub contenders: Vec<usize>,
    /// Indices of the contenders that were granted a seat.
    pub winners: Vec<usize>,
    /// Number of contested seats.
    pub seats: usize,
}

/// Result of a one-dimensional apportionment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DivisorApportionment {
    /// Seats of each contender.
    pub seats: Vec<usize>,
    /// A divisor that reproduces the seats by rounding `weight / divisor`.
    /// In case of a tie, this is the tie quotient.
    pub divisor: BigRational,
    /// The tie that was broken, if any.
    pub tie: Option<Tie>,
}

/// Apportions `num_seats` among contenders with the given weights.
///
/// Seats are granted in order of decreasing quotient `weight / s(n)`, where
/// `s(n)` is the signpost of the rounding rule for a contender that already
/// holds `n` seats. Contenders with a zero weight never receive a seat. When
/// more contenders share the deciding quotient than seats remain, the
/// contenders with the lowest `priority` value win and the [`Tie`] is
/// reported.
pub fn apportion(
    weights: &[BigRational],
    num_seats: usize,
    rounding: Rounding,
    priority: &[usize],
) -> Result<DivisorApportionment, ApportionmentError> {
    if weights.len() != priority.len() {
        return Err(ApportionmentError::InputInconsistent(format!(
            "{} weights but {} priorities",
            weights.len(),
            priority.len()
        )));
    }

    let mut seats = vec![0; weights.len()];
    let mut remaining = num_seats;
    let mut tie = None;

    while remaining != 0 {
        let quotients: Vec<Option<BigRational>> = weights
            .iter()
            .zip(&seats)
            .map(|(w, &s)| (!w.is_zero()).then(|| w / rounding.signpost(s)))
            .collect();

        let max = match quotients.iter().flatten().max() {
            Some(max) => max.clone(),
            None => {
                return Err(ApportionmentError::Infeasible(format!(
                    "{remaining} of {num_seats} seats cannot be allocated, as no contender has any weight"
                )))
            }
        };

        let mut contenders: Vec<usize> = quotients
            .iter()
            .enumerate()
            .filter(|(_, q)| q.as_ref() == Some(&max))
            .map(|(i, _)| i)
            .collect();
        trace!("Highest quotient {max} for contenders {contenders:?}");

        if contenders.len() <= remaining {
            for &i in &contenders {
                seats[i] += 1;
            }
            remaining -= contenders.len();
        } else {
            contenders.sort_by_key(|&i| (priority[i], i));
            let mut winners = contenders[..remaining].to_vec();
            for &i in &winners {
                seats[i] += 1;
            }
            winners.sort_unstable();
            contenders.sort_unstable();
            trace!("Tie for {remaining} seat(s) between {contenders:?}, won by {winners:?}");
            tie = Some(Tie {
                contenders,
                winners,
                seats: remaining,
            });
            remaining = 0;
        }
    }

    let divisor = find_divisor(weights, &seats, rounding);
    if log_enabled!(Trace) {
        trace!("Seats {seats:?} with divisor {divisor}");
    }

    Ok(DivisorApportionment {
        seats,
        divisor,
        tie,
    })
}

/// Returns a divisor that yields the given seats.
fn find_divisor(weights: &[BigRational], seats: &[usize], rounding: Rounding) -> BigRational {
    // Largest quotient that was not granted a seat.
    let lower = weights
        .iter()
        .zip(seats)
        .filter(|(w, _)| !w.is_zero())
        .map(|(w, &s)| w / rounding.signpost(s))
        .max();
    // Smallest quotient that was granted a seat.
    let upper = weights
        .iter()
        .zip(seats)
        .filter(|(_, &s)| s != 0)
        .map(|(w, &s)| w / rounding.signpost(s - 1))
        .min();
    select_divisor(lower.as_ref(), upper.as_ref())
}
