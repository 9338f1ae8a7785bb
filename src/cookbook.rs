// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! On-disk cookbook format: a YAML sequence of recipes, each with a list
//! of dependency names and an ordered list of tasks. Declaration order is
//! preserved (it's a sequence, not a map) because the CLI falls back to
//! "first recipe declared" when no main recipe is named.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Cookbook {
    pub recipes: Vec<RecipeDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeDef {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskDef {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub steps: Vec<Vec<String>>,
}

/// Parse a cookbook from already-read bytes.
pub fn from_slice(bytes: &[u8]) -> Result<Cookbook, Error> {
    Ok(serde_yaml::from_slice(bytes)?)
}

/// Read and parse the cookbook at `path`.
pub fn from_path(path: &Path) -> Result<Cookbook, Error> {
    let bytes = fs_err::read(path).map_err(Error::Read)?;
    from_slice(&bytes)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("read cookbook")]
    Read(#[source] std::io::Error),
    #[error("parse cookbook")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_minimal() {
        let yaml = br#"
recipes:
  - name: hello
    tasks:
      - output: out.txt
        steps:
          - [echo, hello]
"#;
        let cookbook = from_slice(yaml).unwrap();
        assert_eq!(cookbook.recipes.len(), 1);
        assert_eq!(cookbook.recipes[0].name, "hello");
        assert_eq!(cookbook.recipes[0].depends_on, Vec::<String>::new());
        assert_eq!(cookbook.recipes[0].tasks[0].steps[0], vec!["echo", "hello"]);
    }

    #[test]
    fn preserves_declaration_order() {
        let yaml = br#"
recipes:
  - name: c
    tasks: []
  - name: a
    depends_on: [c]
    tasks: []
  - name: b
    depends_on: [c]
    tasks: []
"#;
        let cookbook = from_slice(yaml).unwrap();
        let names: Vec<_> = cookbook.recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(from_slice(b"recipes: [").is_err());
    }
}
