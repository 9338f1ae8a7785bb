// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Dependency Analyzer: marks the transitive closure of the main recipe
//! as `required` and seeds the Ready Queue with every required leaf.
//!
//! Departs from spec.md §4.1 in one respect, per the recommendation in
//! §9 of SPEC_FULL.md: the marking traversal tracks the current
//! recursion path and fails with [`Error::Cycle`] if it revisits a node
//! still on that path, instead of silently terminating recursion on an
//! already-required node and letting a cyclic cookbook deadlock the
//! scheduler later.

use thiserror::Error;

use crate::graph::RecipeGraph;
use crate::graph::RecipeId;
use crate::queue::ReadyQueue;
use crate::state::StateTable;

pub struct Analysis {
    pub main: RecipeId,
    pub state: StateTable,
    pub ready: ReadyQueue,
}

/// Resolve `main_name` (or the first declared recipe, if `None`) and run
/// the analysis. `main_name` absent and an empty cookbook is a graph
/// error distinct from "name not found".
pub fn analyze(graph: &RecipeGraph, main_name: Option<&str>) -> Result<Analysis, Error> {
    let main = match main_name {
        Some(name) => graph.id_by_name(name).ok_or_else(|| Error::MainNotFound(name.to_string()))?,
        None => graph.first().ok_or(Error::EmptyCookbook)?,
    };

    let mut state = StateTable::new(graph.len());
    let mut path = Vec::new();
    mark_required(graph, main, &mut state, &mut path)?;

    let mut ready = ReadyQueue::new();
    for id in graph.ids() {
        if state.get(id).required && graph.depends_on(id).next().is_none() {
            ready.enqueue(id);
            state.mark_queued(id);
        }
    }

    Ok(Analysis { main, state, ready })
}

fn mark_required(graph: &RecipeGraph, id: RecipeId, state: &mut StateTable, path: &mut Vec<RecipeId>) -> Result<(), Error> {
    if state.get(id).required {
        return Ok(());
    }
    if path.contains(&id) {
        return Err(Error::Cycle(graph.recipe(id).name.clone()));
    }

    path.push(id);
    state.mark_required(id);

    for dep in graph.depends_on(id) {
        mark_required(graph, dep, state, path)?;
    }

    path.pop();
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("main recipe '{0}' not found in cookbook")]
    MainNotFound(String),
    #[error("cookbook contains no recipes")]
    EmptyCookbook,
    #[error("dependency cycle involving recipe '{0}'")]
    Cycle(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cookbook;

    fn analyze_yaml(yaml: &[u8], main: Option<&str>) -> Result<Analysis, Error> {
        let cookbook = cookbook::from_slice(yaml).unwrap();
        let graph = RecipeGraph::build(cookbook).unwrap();
        analyze(&graph, main)
    }

    #[test]
    fn marks_transitive_closure_and_seeds_leaves() {
        let yaml = br#"
recipes:
  - name: main
    depends_on: [mid]
    tasks: []
  - name: mid
    depends_on: [leaf]
    tasks: []
  - name: leaf
    tasks: []
  - name: unrelated
    tasks: []
"#;
        let cookbook = cookbook::from_slice(yaml).unwrap();
        let graph = RecipeGraph::build(cookbook).unwrap();
        let analysis = analyze(&graph, Some("main")).unwrap();

        for name in ["main", "mid", "leaf"] {
            let id = graph.id_by_name(name).unwrap();
            assert!(analysis.state.get(id).required, "{name} should be required");
        }
        let unrelated = graph.id_by_name("unrelated").unwrap();
        assert!(!analysis.state.get(unrelated).required);

        assert!(!analysis.ready.is_empty());
    }

    #[test]
    fn defaults_to_first_declared() {
        let yaml = br#"
recipes:
  - name: a
    tasks: []
  - name: b
    tasks: []
"#;
        let analysis = analyze_yaml(yaml, None).unwrap();
        let cookbook = cookbook::from_slice(yaml).unwrap();
        let graph = RecipeGraph::build(cookbook).unwrap();
        assert_eq!(analysis.main, graph.id_by_name("a").unwrap());
    }

    #[test]
    fn rejects_missing_main() {
        let yaml = br#"
recipes:
  - name: a
    tasks: []
"#;
        let err = analyze_yaml(yaml, Some("nope")).unwrap_err();
        assert!(matches!(err, Error::MainNotFound(name) if name == "nope"));
    }

    #[test]
    fn detects_cycles() {
        let yaml = br#"
recipes:
  - name: a
    depends_on: [b]
    tasks: []
  - name: b
    depends_on: [a]
    tasks: []
"#;
        let err = analyze_yaml(yaml, Some("a")).unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));
    }
}
