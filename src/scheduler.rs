// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Scheduler Loop: the top-level control loop. While work remains, spawn
//! new workers up to the cap; otherwise block until a worker terminates,
//! then update state and enqueue newly-ready dependents.
//!
//! Uses a blocking `waitpid(None, None)` for the idle rule rather than
//! an async SIGCHLD handler — the equivalent formulation spec.md §5 and
//! §9 explicitly permit. Every mutation of the State Table, Ready Queue
//! and `active_workers` happens on this single control-flow thread
//! between one dispatch attempt and the next blocking wait, so there is
//! no asynchronous-handler race to guard against here (see DESIGN.md).

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use thiserror::Error;

use crate::analyzer::Analysis;
use crate::graph::{RecipeGraph, RecipeId};
use crate::queue::ReadyQueue;
use crate::state::StateTable;
use crate::worker;

/// Runs the main recipe's dependency sub-DAG to completion. Returns
/// whether the main recipe itself ended up `completed`.
pub fn run(graph: &RecipeGraph, analysis: Analysis, cap: usize) -> Result<bool, Error> {
    let Analysis { main, mut state, mut ready } = analysis;
    let mut active_workers: usize = 0;

    loop {
        if ready.is_empty() && active_workers == 0 {
            break;
        }

        while !ready.is_empty() && active_workers < cap {
            let id = ready.dequeue().expect("loop condition checked non-empty");

            match unsafe { fork() } {
                Ok(ForkResult::Child) => worker::run(graph.recipe(id)),
                Ok(ForkResult::Parent { child }) => {
                    log::info!("dispatched recipe '{}' to worker {child}", graph.recipe(id).name);
                    state.begin_processing(id, child);
                    active_workers += 1;
                }
                Err(e) => {
                    log::warn!("fork failed for recipe '{}': {e}; re-enqueueing", graph.recipe(id).name);
                    state.revert_dispatch(id);
                    state.mark_queued(id);
                    ready.enqueue(id);
                    break;
                }
            }
        }

        if active_workers == 0 {
            // Every dispatch attempt above failed to fork; nothing to
            // wait on, so loop straight back to retry rather than
            // blocking on a child that doesn't exist.
            continue;
        }

        match waitpid(None, None) {
            Ok(WaitStatus::Exited(pid, code)) => reap(graph, &mut state, &mut ready, &mut active_workers, pid, code == 0),
            Ok(WaitStatus::Signaled(pid, ..)) => reap(graph, &mut state, &mut ready, &mut active_workers, pid, false),
            // Stopped/continued notifications aren't terminal; keep waiting.
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(e) => return Err(Error::Wait(e)),
        }
    }

    Ok(state.get(main).completed)
}

fn reap(graph: &RecipeGraph, state: &mut StateTable, ready: &mut ReadyQueue, active_workers: &mut usize, pid: Pid, success: bool) {
    let Some(id) = state.find_by_worker(pid) else {
        // Unknown child (e.g. a pipeline-stage descendant that slipped
        // through); spec.md §4.5 says to ignore it and continue.
        return;
    };

    state.finish(id, success);
    *active_workers -= 1;

    log::info!("recipe '{}' {}", graph.recipe(id).name, if success { "completed" } else { "failed" });

    for dependent in graph.dependents_of(id) {
        if is_ready(graph, state, dependent) {
            state.mark_queued(dependent);
            ready.enqueue(dependent);
        }
    }
}

fn is_ready(graph: &RecipeGraph, state: &StateTable, id: RecipeId) -> bool {
    state.is_idle_and_required(id) && graph.depends_on(id).all(|dep| state.get(dep).completed)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("waitpid")]
    Wait(#[source] Errno),
}
