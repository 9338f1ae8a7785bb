// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Recipe Graph View: a read-only projection of a parsed [`Cookbook`]
//! into recipes, forward edges (`depends_on`) and reverse edges
//! (`dependents_of`), with each recipe's ordered task list attached.
//! Immutable once built; mutable run state lives in [`crate::state`]
//! instead of being side-attached to graph nodes (see DESIGN.md).

use std::collections::HashMap;
use std::path::PathBuf;

use petgraph::graph::DiGraph;
use petgraph::Direction;
use thiserror::Error;

use crate::cookbook::Cookbook;

/// Identifies a recipe within a [`RecipeGraph`]. Stable for the life of
/// the graph (the graph is never mutated after [`RecipeGraph::build`]).
pub type RecipeId = petgraph::graph::NodeIndex<u32>;

#[derive(Debug, Clone)]
pub struct Task {
    pub steps: Vec<Vec<String>>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub tasks: Vec<Task>,
}

/// Forward edge `a -> b` means "a depends on b".
#[derive(Debug)]
pub struct RecipeGraph {
    graph: DiGraph<Recipe, (), u32>,
    by_name: HashMap<String, RecipeId>,
}

impl RecipeGraph {
    /// Resolve a parsed [`Cookbook`] into an immutable graph, validating
    /// recipe identity, task/step non-emptiness, and dependency names.
    pub fn build(cookbook: Cookbook) -> Result<Self, Error> {
        let mut graph = DiGraph::default();
        let mut by_name = HashMap::with_capacity(cookbook.recipes.len());

        for def in &cookbook.recipes {
            if by_name.contains_key(&def.name) {
                return Err(Error::DuplicateRecipe(def.name.clone()));
            }

            let mut tasks = Vec::with_capacity(def.tasks.len());
            for (task_index, task) in def.tasks.iter().enumerate() {
                if task.steps.is_empty() {
                    return Err(Error::EmptyTask {
                        recipe: def.name.clone(),
                        task_index,
                    });
                }
                for step in &task.steps {
                    if step.is_empty() {
                        return Err(Error::EmptyStep {
                            recipe: def.name.clone(),
                            task_index,
                        });
                    }
                }
                tasks.push(Task {
                    steps: task.steps.clone(),
                    input: task.input.clone(),
                    output: task.output.clone(),
                });
            }

            let id = graph.add_node(Recipe {
                name: def.name.clone(),
                tasks,
            });
            by_name.insert(def.name.clone(), id);
        }

        for def in &cookbook.recipes {
            let id = by_name[&def.name];
            for dependency in &def.depends_on {
                let dep_id = by_name.get(dependency).copied().ok_or_else(|| Error::UnknownDependency {
                    recipe: def.name.clone(),
                    dependency: dependency.clone(),
                })?;
                graph.add_edge(id, dep_id, ());
            }
        }

        Ok(Self { graph, by_name })
    }

    pub fn recipe(&self, id: RecipeId) -> &Recipe {
        &self.graph[id]
    }

    pub fn id_by_name(&self, name: &str) -> Option<RecipeId> {
        self.by_name.get(name).copied()
    }

    /// The first recipe declared in the cookbook, used as the default
    /// main recipe when none is named on the command line.
    pub fn first(&self) -> Option<RecipeId> {
        self.graph.node_indices().next()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = RecipeId> + '_ {
        self.graph.node_indices()
    }

    /// Recipes `id` depends on.
    pub fn depends_on(&self, id: RecipeId) -> impl Iterator<Item = RecipeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Outgoing)
    }

    /// Recipes that depend on `id`.
    pub fn dependents_of(&self, id: RecipeId) -> impl Iterator<Item = RecipeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Incoming)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate recipe name: {0}")]
    DuplicateRecipe(String),
    #[error("recipe '{recipe}' task #{task_index} has no steps")]
    EmptyTask { recipe: String, task_index: usize },
    #[error("recipe '{recipe}' task #{task_index} has a step with no words")]
    EmptyStep { recipe: String, task_index: usize },
    #[error("recipe '{recipe}' depends on non-existent recipe '{dependency}'")]
    UnknownDependency { recipe: String, dependency: String },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cookbook;

    fn build(yaml: &[u8]) -> Result<RecipeGraph, Error> {
        let cookbook = cookbook::from_slice(yaml).unwrap();
        RecipeGraph::build(cookbook)
    }

    #[test]
    fn resolves_forward_and_reverse_edges() {
        let graph = build(
            br#"
recipes:
  - name: main
    depends_on: [dep]
    tasks: []
  - name: dep
    tasks: []
"#,
        )
        .unwrap();

        let main = graph.id_by_name("main").unwrap();
        let dep = graph.id_by_name("dep").unwrap();

        assert_eq!(graph.depends_on(main).collect::<Vec<_>>(), vec![dep]);
        assert_eq!(graph.dependents_of(dep).collect::<Vec<_>>(), vec![main]);
        assert_eq!(graph.depends_on(dep).count(), 0);
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = build(
            br#"
recipes:
  - name: a
    tasks: []
  - name: a
    tasks: []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateRecipe(name) if name == "a"));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = build(
            br#"
recipes:
  - name: a
    depends_on: [missing]
    tasks: []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { dependency, .. } if dependency == "missing"));
    }

    #[test]
    fn rejects_empty_task() {
        let err = build(
            br#"
recipes:
  - name: a
    tasks:
      - steps: []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyTask { .. }));
    }

    #[test]
    fn first_is_declaration_order() {
        let graph = build(
            br#"
recipes:
  - name: first
    tasks: []
  - name: second
    tasks: []
"#,
        )
        .unwrap();
        assert_eq!(graph.recipe(graph.first().unwrap()).name, "first");
    }
}
