// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Worker Supervisor: the subordinate-process side of a dispatched
//! recipe. Runs entirely inside the child half of a `fork()` and never
//! returns to the scheduler — it executes the recipe's tasks in
//! declaration order via the Pipeline Executor and exits the process.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::graph::Recipe;
use crate::pipeline;

/// Never returns: exits with success once every task has succeeded, or
/// with failure as soon as one task fails.
pub fn run(recipe: &Recipe) -> ! {
    reset_sigchld_disposition();

    for task in &recipe.tasks {
        if pipeline::run(task) != 0 {
            std::process::exit(1);
        }
    }

    std::process::exit(0);
}

/// The scheduler never installs a custom SIGCHLD handler in this
/// crate's chosen formulation (see DESIGN.md — blocking `waitpid`
/// instead of an async handler), so there is nothing non-default to
/// inherit across `fork()`. Reset explicitly anyway: spec.md §4.4
/// requires it of the Worker Supervisor regardless of which formulation
/// the engine uses, and a future engine change shouldn't silently leak
/// a handler into subordinates.
fn reset_sigchld_disposition() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe {
        let _ = sigaction(Signal::SIGCHLD, &default);
    }
}
