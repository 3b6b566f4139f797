use ignore::gitignore::{Gitignore, GitignoreBuilder};
use rdiff_common::{DiffOptions, RDiffError};
use std::cmp::Ordering;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// One entry of the merged listing; at least one side is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNames {
    pub left: Option<OsString>,
    pub right: Option<OsString>,
}

impl ChildNames {
    pub fn both(name: impl Into<OsString>) -> Self {
        let name = name.into();
        Self {
            left: Some(name.clone()),
            right: Some(name),
        }
    }

    pub fn left(name: impl Into<OsString>) -> Self {
        Self {
            left: Some(name.into()),
            right: None,
        }
    }

    pub fn right(name: impl Into<OsString>) -> Self {
        Self {
            left: None,
            right: Some(name.into()),
        }
    }
}

#[derive(Debug, Error)]
#[error("{source}")]
pub struct ListingError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Enumerates the children of a directory pair.
pub trait DirectoryLister {
    /// Sorted union of the child names of `left` and `right`, exclusion
    /// patterns applied. A `None` directory lists as empty.
    fn list_children(
        &self,
        left: Option<&Path>,
        right: Option<&Path>,
        top_level: bool,
    ) -> Result<Vec<ChildNames>, ListingError>;
}

/// Rewrite a shell pattern matched against one file name as a gitignore
/// line with the same meaning. Patterns containing `/` match no file name.
fn basename_glob(pattern: &str) -> Option<String> {
    if pattern.contains('/') {
        return None;
    }
    let body = pattern.trim_end_matches(' ');
    let mut line = String::with_capacity(pattern.len() + 2);
    if body.starts_with('#') || body.starts_with('!') {
        line.push('\\');
    }
    line.push_str(body);
    // gitignore drops unescaped trailing spaces
    for _ in body.len()..pattern.len() {
        line.push_str("\\ ");
    }
    Some(line)
}

/// Lists real directories one level deep
pub struct FsLister {
    exclude: Option<Gitignore>,
    ignore_case: bool,
    starting_file: Option<String>,
}

impl FsLister {
    pub fn new(options: &DiffOptions) -> Result<Self, RDiffError> {
        Ok(Self {
            exclude: Self::build_exclude(options)?,
            ignore_case: options.ignore_file_name_case,
            starting_file: options.starting_file.clone(),
        })
    }

    /// Build a matcher from `--exclude` patterns, matched against basenames
    fn build_exclude(options: &DiffOptions) -> Result<Option<Gitignore>, RDiffError> {
        if options.exclude_patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GitignoreBuilder::new("");
        builder
            .case_insensitive(options.ignore_file_name_case)
            .map_err(|e| RDiffError::Config(e.to_string()))?;
        for pattern in &options.exclude_patterns {
            let Some(line) = basename_glob(pattern) else {
                debug!("Exclude pattern {:?} can never match a file name", pattern);
                continue;
            };
            builder
                .add_line(None, &line)
                .map_err(|e| RDiffError::Pattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            debug!("Added exclude pattern: {}", pattern);
        }

        let exclude = builder.build().map_err(|e| RDiffError::Config(e.to_string()))?;
        debug!("Built exclude matcher with {} patterns", exclude.num_ignores());
        Ok(Some(exclude))
    }

    fn is_excluded(&self, name: &OsStr, is_dir: bool) -> bool {
        match &self.exclude {
            Some(exclude) => exclude.matched(Path::new(name), is_dir).is_ignore(),
            None => false,
        }
    }

    fn read_names(&self, dir: Option<&Path>) -> Result<Vec<OsString>, ListingError> {
        let Some(dir) = dir else {
            return Ok(Vec::new());
        };
        let wrap = |source| ListingError {
            path: dir.to_path_buf(),
            source,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(wrap)? {
            let entry = entry.map_err(wrap)?;
            let name = entry.file_name();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if self.is_excluded(&name, is_dir) {
                debug!("Excluded {:?} in {:?}", name, dir);
                continue;
            }
            names.push(name);
        }

        names.sort_by(|a, b| self.compare_names(a, b));
        Ok(names)
    }

    /// Order used both for sorting and for pairing names across sides
    fn compare_names(&self, a: &OsStr, b: &OsStr) -> Ordering {
        if self.ignore_case {
            let folded = a
                .to_string_lossy()
                .to_lowercase()
                .cmp(&b.to_string_lossy().to_lowercase());
            if folded != Ordering::Equal {
                return folded;
            }
        }
        a.cmp(b)
    }

    fn names_match(&self, a: &OsStr, b: &OsStr) -> bool {
        if self.ignore_case {
            a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
        } else {
            a == b
        }
    }

    fn before_starting_file(&self, name: &OsStr) -> bool {
        match &self.starting_file {
            Some(start) => self.compare_names(name, OsStr::new(start)) == Ordering::Less,
            None => false,
        }
    }
}

impl DirectoryLister for FsLister {
    fn list_children(
        &self,
        left: Option<&Path>,
        right: Option<&Path>,
        top_level: bool,
    ) -> Result<Vec<ChildNames>, ListingError> {
        let left_names = self.read_names(left)?;
        let right_names = self.read_names(right)?;

        let mut children = Vec::with_capacity(left_names.len().max(right_names.len()));
        let mut left_iter = left_names.into_iter().peekable();
        let mut right_iter = right_names.into_iter().peekable();

        loop {
            let child = match (left_iter.peek(), right_iter.peek()) {
                (Some(l), Some(r)) if self.names_match(l, r) => ChildNames {
                    left: left_iter.next(),
                    right: right_iter.next(),
                },
                (Some(l), Some(r)) => match self.compare_names(l, r) {
                    Ordering::Greater => ChildNames {
                        left: None,
                        right: right_iter.next(),
                    },
                    _ => ChildNames {
                        left: left_iter.next(),
                        right: None,
                    },
                },
                (Some(_), None) => ChildNames {
                    left: left_iter.next(),
                    right: None,
                },
                (None, Some(_)) => ChildNames {
                    left: None,
                    right: right_iter.next(),
                },
                (None, None) => break,
            };

            if top_level {
                let name = child.left.as_deref().or(child.right.as_deref());
                if name.is_some_and(|n| self.before_starting_file(n)) {
                    continue;
                }
            }
            children.push(child);
        }

        debug!(
            "Listed {} children of {:?} and {:?}",
            children.len(),
            left,
            right
        );
        Ok(children)
    }
}
