// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! State Table: one mutable record per recipe, keyed by [`RecipeId`] and
//! owned by the engine. Kept separate from the read-only [`RecipeGraph`]
//! rather than side-attached to its nodes (see DESIGN.md, §9 of
//! SPEC_FULL.md) so the graph can be shared by reference without
//! aliasing a mutable pointer hung off each node.

use nix::unistd::Pid;
use petgraph::graph::NodeIndex;

use crate::graph::RecipeId;

/// Mirrors spec.md §3: `completed`/`failed` are mutually exclusive and
/// both imply `!processing` (I1); `processing` implies `worker_id` is
/// set (I2, checked by [`StateTable::begin_processing`]/[`StateTable::finish`]).
#[derive(Debug, Default, Clone, Copy)]
pub struct RecipeState {
    pub required: bool,
    pub processing: bool,
    pub completed: bool,
    pub failed: bool,
    pub worker_id: Option<Pid>,
    /// Not part of spec.md's RecipeState; tracks I3 ("a recipe enters
    /// the Ready Queue at most once per run") so a recipe freed by two
    /// different dependents completing isn't enqueued twice.
    queued: bool,
}

pub struct StateTable(Vec<RecipeState>);

impl StateTable {
    pub fn new(len: usize) -> Self {
        Self(vec![RecipeState::default(); len])
    }

    pub fn get(&self, id: RecipeId) -> &RecipeState {
        &self.0[id.index()]
    }

    pub fn mark_required(&mut self, id: RecipeId) {
        self.0[id.index()].required = true;
    }

    /// Whether `id` satisfies I4 modulo its own queued/processing/
    /// completed/failed flags; dependency completion is checked by the
    /// caller, which has the graph.
    pub fn is_idle_and_required(&self, id: RecipeId) -> bool {
        let s = &self.0[id.index()];
        s.required && !s.processing && !s.completed && !s.failed && !s.queued
    }

    pub fn mark_queued(&mut self, id: RecipeId) {
        self.0[id.index()].queued = true;
    }

    pub fn begin_processing(&mut self, id: RecipeId, worker_id: Pid) {
        let s = &mut self.0[id.index()];
        debug_assert!(!s.processing && !s.completed && !s.failed);
        s.processing = true;
        s.queued = false;
        s.worker_id = Some(worker_id);
    }

    /// Record a worker's termination: `success` selects `completed` vs
    /// `failed` (I1), and `processing`/`worker_id` are cleared (I2).
    pub fn finish(&mut self, id: RecipeId, success: bool) {
        let s = &mut self.0[id.index()];
        debug_assert!(s.processing);
        s.processing = false;
        s.worker_id = None;
        if success {
            s.completed = true;
        } else {
            s.failed = true;
        }
    }

    /// Undo a dispatch attempt whose `fork` failed: the recipe never
    /// started processing, so it's simply returned to "idle".
    pub fn revert_dispatch(&mut self, id: RecipeId) {
        let s = &mut self.0[id.index()];
        debug_assert!(!s.processing);
        s.queued = false;
    }

    pub fn find_by_worker(&self, worker_id: Pid) -> Option<RecipeId> {
        self.0
            .iter()
            .position(|s| s.worker_id == Some(worker_id))
            .map(NodeIndex::new)
    }
}
