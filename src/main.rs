// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::process::ExitCode;

mod analyzer;
mod cli;
mod cookbook;
mod graph;
mod pipeline;
mod queue;
mod scheduler;
mod state;
mod worker;

fn main() -> ExitCode {
    cli::process()
}
