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

//! Exact arithmetic needed by divisor methods: rounding rules, signposts and
//! the choice of a divisor inside an interval of valid divisors.
//!
//! All quotients are represented as [`BigRational`], so that comparisons
//! between quotients (and therefore ties) are exact.

mod decimal;

pub use decimal::{format_decimal, parse_decimal};

use num::traits::One;
use num::{BigInt, BigRational};

/// Maximal number of decimal places explored when looking for a round
/// divisor.
const MAX_DIVISOR_PLACES: usize = 40;

/// Rounding rule of a divisor method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Round half up: a quotient of `n + 1/2` or more yields `n + 1` seats.
    /// This is the Sainte-Laguë (Webster) method, used by biproportional
    /// apportionment.
    Standard,
    /// Round down: a quotient of `n + 1` or more yields `n + 1` seats. This is
    /// the D'Hondt (Jefferson) method, which allocates the same seats as
    /// Hagenbach-Bischoff.
    Down,
}

impl Rounding {
    /// Returns the signpost `s(n)`, i.e. the smallest quotient that yields
    /// `n + 1` seats.
    pub fn signpost(&self, n: usize) -> BigRational {
        match self {
            Rounding::Standard => BigRational::new(BigInt::from(2 * n + 1), BigInt::from(2)),
            Rounding::Down => BigRational::from_integer(BigInt::from(n + 1)),
        }
    }

    /// Rounds a non-negative quotient to a number of seats.
    pub fn round(&self, x: &BigRational) -> BigInt {
        match self {
            Rounding::Standard => {
                (x + BigRational::new(BigInt::one(), BigInt::from(2)))
                    .floor()
                    .to_integer()
            }
            Rounding::Down => x.floor().to_integer(),
        }
    }

    /// Human-readable name of the method.
    pub fn description(&self) -> &'static str {
        match self {
            Rounding::Standard => "standard rounding (Sainte-Laguë)",
            Rounding::Down => "downward rounding (Hagenbach-Bischoff)",
        }
    }
}

/// Selects a divisor in the interval `(lower, upper]` of valid divisors.
///
/// The `lower` bound is the largest quotient that was denied a seat, and the
/// `upper` bound is the smallest quotient that was granted a seat. When the
/// interval is non-empty, the returned divisor lies strictly inside it and has
/// as few significant decimal digits as possible. When `lower == upper` (an
/// exact tie), the tie quotient itself is returned.
pub fn select_divisor(lower: Option<&BigRational>, upper: Option<&BigRational>) -> BigRational {
    let ten = BigRational::from_integer(BigInt::from(10));
    match (lower, upper) {
        (None, None) => BigRational::one(),
        (None, Some(upper)) => upper.clone(),
        (Some(lower), None) => {
            // No seat was granted: any divisor above the lower bound works.
            let mut divisor = BigRational::one();
            while divisor <= *lower {
                divisor *= &ten;
            }
            divisor
        }
        (Some(lower), Some(upper)) => {
            if lower >= upper {
                return upper.clone();
            }

            let mut scale = BigRational::one();
            while &(&scale * &ten) <= upper {
                scale *= &ten;
            }
            for _ in 0..MAX_DIVISOR_PLACES {
                // Largest multiple of the scale that is strictly below the upper bound.
                let candidate = ((upper / &scale).ceil() - BigRational::one()) * &scale;
                if &candidate > lower {
                    return candidate;
                }
                scale /= &ten;
            }

            (lower + upper) / BigRational::from_integer(BigInt::from(2))
        }
    }
}

/// Returns the exact ratio `num / denom` as a rational number. The
/// denominator must not be zero.
pub fn ratio(num: u64, denom: u64) -> BigRational {
    BigRational::new(BigInt::from(num), BigInt::from(denom))
}

/// Returns the given integer as a rational number.
pub fn integer(x: u64) -> BigRational {
    BigRational::from_integer(BigInt::from(x))
}
