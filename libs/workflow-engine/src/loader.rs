//! Definition directory loader
//!
//! Reads every `*.yml`/`*.yaml` file in a directory and parses it into a
//! `WorkflowDefinition`. A file that fails to parse or validate is reported
//! and skipped; the remaining workflows still load.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::definition::WorkflowDefinition;
use crate::parser::parse_definition;

/// Errors reading the definitions directory itself
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The directory could not be read
    #[error("failed to read definitions directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Load every workflow definition from `dir`.
///
/// Files are visited in path order so startup logs are deterministic.
pub fn load_dir(dir: &Path) -> Result<Vec<WorkflowDefinition>, LoaderError> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yml" | "yaml")
            )
        })
        .collect();
    paths.sort();

    let mut definitions = Vec::new();
    for path in paths {
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err, "definition file unreadable; skipped");
                continue;
            }
        };
        match parse_definition(&text) {
            Ok(definition) => {
                tracing::info!(
                    file = %path.display(),
                    workflow = %definition.name,
                    version = %definition.version,
                    "loaded workflow definition"
                );
                definitions.push(definition);
            }
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err, "definition rejected; skipped");
            }
        }
    }

    Ok(definitions)
}
