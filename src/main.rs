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

//! Command-line program for biproportional seat apportionment.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

use biprop_rs::{
    biproportional::MAX_ITERATIONS,
    end_result::{build_contest, ApportionmentConfig},
    lot::LotRule,
    parse::parse_contest,
    report::write_contest_report,
    types::Contest,
    write::{write_contest, WriteTieOrder},
};
use clap::Parser;
use std::error::Error;
use std::io;

/// Rust implementation of biproportional seat apportionment.
#[derive(Parser, Debug, PartialEq, Eq)]
struct Cli {
    /// Package name to show in the apportionment report.
    #[arg(long, default_value = "Implementation: biprop-rs")]
    package_name: String,

    /// Rule to break ties between contenders.
    #[arg(long, value_enum, default_value_t = LotRuleArg::LowestId)]
    lot_rule: LotRuleArg,

    /// Maximal number of scaling steps of the sub-apportionment.
    #[arg(long, default_value_t = MAX_ITERATIONS)]
    max_iterations: usize,

    /// Enable parallel computation of the elections based on the rayon crate.
    #[arg(long, action = clap::ArgAction::Set, default_value = "true")]
    parallel: bool,

    /// Write the parsed contest back in canonical form, instead of computing
    /// the apportionment.
    #[arg(long)]
    canonical: bool,
}

/// Rule to break ties.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LotRuleArg {
    /// The contender with the lowest identifier wins.
    LowestId,
    /// Parties win in the declared tie-break order, districts in declaration
    /// order.
    TieOrder,
}

impl From<LotRuleArg> for LotRule {
    fn from(arg: LotRuleArg) -> Self {
        match arg {
            LotRuleArg::LowestId => LotRule::LowestId,
            LotRuleArg::TieOrder => LotRule::TieOrder,
        }
    }
}

impl Cli {
    /// Run the given contest based on the command-line parameters.
    fn run(self, contest: &Contest) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if self.canonical {
            return write_contest(&mut stdout, contest, WriteTieOrder::OnlyNonTrivial);
        }

        let config = ApportionmentConfig {
            lot_rule: self.lot_rule.into(),
            max_iterations: self.max_iterations,
        };
        let result = build_contest(contest, &config, self.parallel);
        write_contest_report(&mut stdout, contest, &result, &self.package_name, &config)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();

    let contest = parse_contest(io::stdin().lock())?;

    cli.run(&contest)?;
    Ok(())
}
