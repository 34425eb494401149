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

//! Conversions between decimal strings and exact rational numbers.

use num::traits::{One, Zero};
use num::{BigInt, BigRational};

/// Parses a non-negative decimal number such as `5`, `3.0` or `2.75` into an
/// exact rational number. Returns [`None`] on malformed input.
pub fn parse_decimal(input: &str) -> Option<BigRational> {
    let (int_part, frac_part) = match input.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (input, ""),
    };
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
        || (input.contains('.') && frac_part.is_empty())
    {
        return None;
    }

    let digits: BigInt = format!("{int_part}{frac_part}").parse().ok()?;
    let denom = num::pow(BigInt::from(10), frac_part.len());
    Some(BigRational::new(digits, denom))
}

/// Formats a non-negative rational number in decimal notation, rounded (half
/// up) to at most `max_places` decimal places. Trailing zeros of the
/// fractional part are omitted.
pub fn format_decimal(x: &BigRational, max_places: usize) -> String {
    let scale = num::pow(BigInt::from(10), max_places);
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let scaled = (x * BigRational::from_integer(scale.clone()) + half)
        .floor()
        .to_integer();

    let int_part = &scaled / &scale;
    let frac_part = &scaled % &scale;

    let mut result = int_part.to_string();
    if !frac_part.is_zero() {
        let frac = format!("{:0>width$}", frac_part.to_string(), width = max_places);
        result.push('.');
        result.push_str(frac.trim_end_matches('0'));
    }
    result
}
