//! Target file discovery
//!
//! Expands root paths into the set of files to analyse. A file is kept only if:
//!
//! 1. its path relative to the root matches at least one `include` pattern,
//! 2. its relative path matches no `exclude` pattern,
//! 3. its file name matches at least one `filename` pattern.
//!
//! Empty pattern lists mean include everything, exclude nothing and accept every
//! file name. A root that is itself a file is filtered directly, with its file name
//! standing in for the relative path. Every root is checked for existence before
//! any walking starts.

pub mod glob;

use globset::GlobSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("root path does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("cannot resolve {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Pattern filters applied while walking roots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub filename: Vec<String>,
}

/// Compiled form of [`FindOptions`]
struct Filters {
    include: Option<GlobSet>,
    exclude: GlobSet,
    filename: Option<GlobSet>,
}

impl Filters {
    fn compile(options: &FindOptions) -> Result<Self, DiscoveryError> {
        Ok(Self {
            include: compile_optional(&options.include, true)?,
            exclude: compile(&options.exclude, true)?,
            filename: compile_optional(&options.filename, false)?,
        })
    }

    fn accepts(&self, relative: &Path, name: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .is_none_or(|globs| globs.is_match(relative));
        let named = self
            .filename
            .as_ref()
            .is_none_or(|globs| globs.is_match(name));
        included && named && !self.exclude.is_match(relative)
    }
}

fn compile(patterns: &[String], literal_separator: bool) -> Result<GlobSet, DiscoveryError> {
    glob::build_globset(patterns, literal_separator).map_err(|source| DiscoveryError::Pattern {
        pattern: source
            .glob()
            .map(str::to_string)
            .unwrap_or_else(|| patterns.join(", ")),
        source,
    })
}

fn compile_optional(
    patterns: &[String],
    literal_separator: bool,
) -> Result<Option<GlobSet>, DiscoveryError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    compile(patterns, literal_separator).map(Some)
}

/// Find all files under `roots` accepted by `options`.
///
/// Returns absolute paths, sorted and without duplicates.
pub fn find<P: AsRef<Path>>(
    roots: &[P],
    options: &FindOptions,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let roots: Vec<&Path> = roots.iter().map(|root| root.as_ref()).collect();
    if let Some(missing) = roots.iter().find(|root| !root.exists()) {
        return Err(DiscoveryError::MissingRoot(missing.to_path_buf()));
    }

    let filters = Filters::compile(options)?;
    let mut results = BTreeSet::new();

    for &root in &roots {
        if root.is_file() {
            let name = file_name(root);
            if filters.accepts(Path::new(&name), &name) {
                results.insert(absolute(root)?);
            }
            continue;
        }

        for entry in WalkDir::new(root).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if filters.accepts(relative, &file_name(path)) {
                results.insert(absolute(path)?);
            }
        }
    }

    tracing::debug!(roots = roots.len(), files = results.len(), "Discovery finished");
    Ok(results.into_iter().collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn absolute(path: &Path) -> Result<PathBuf, DiscoveryError> {
    std::path::absolute(path).map_err(|source| DiscoveryError::Io {
        path: path.to_path_buf(),
        source,
    })
}
