// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Command-line front-end: parses arguments, loads the cookbook, and
//! drives the graph/analyzer/scheduler pipeline through to an exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;

use crate::analyzer;
use crate::cookbook;
use crate::graph::RecipeGraph;
use crate::scheduler;

const DEFAULT_COOKBOOK: &str = "cookbook.ckb";

#[derive(Debug, Parser)]
#[command(name = "cook", about = "Prepares a cookbook's main recipe by building its dependency graph")]
pub struct Command {
    /// Path to the cookbook file
    #[arg(short = 'f', long = "file", default_value = DEFAULT_COOKBOOK)]
    cookbook: PathBuf,

    /// Maximum number of recipes to build concurrently
    #[arg(short = 'c', long = "cap", default_value_t = 1, value_parser = parse_cap)]
    cap: usize,

    /// Prints additional information about what cook is doing
    #[arg(short, long)]
    verbose: bool,

    /// Recipe to prepare; defaults to the first recipe declared in the cookbook
    main: Option<String>,
}

fn parse_cap(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err("cap must be a positive integer".to_string()),
        Err(_) => Err("cap must be a positive integer".to_string()),
    }
}

/// Parses `std::env::args`, runs the build, and returns the process exit
/// code: `0` if the main recipe completed, `1` if it failed or an
/// argument/IO/graph error prevented the run from starting. Clap itself
/// handles usage errors (unknown options, malformed `-c`, extra
/// positional arguments) by printing usage to stderr and exiting
/// non-zero before `process` is even reached.
pub fn process() -> ExitCode {
    let command = Command::parse();
    init_logging(command.verbose);

    match run(command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            log::error!("main recipe did not complete");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<bool, Error> {
    let cookbook = cookbook::from_path(&command.cookbook)?;
    let graph = RecipeGraph::build(cookbook)?;
    let analysis = analyzer::analyze(&graph, command.main.as_deref())?;
    let completed = scheduler::run(&graph, analysis, command.cap)?;
    Ok(completed)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("read cookbook")]
    Cookbook(#[from] cookbook::Error),
    #[error("build graph")]
    Graph(#[from] crate::graph::Error),
    #[error("analyze dependencies")]
    Analyzer(#[from] analyzer::Error),
    #[error("run scheduler")]
    Scheduler(#[from] scheduler::Error),
}
