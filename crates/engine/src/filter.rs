use crate::config::Denylist;
use crate::error::ConfigError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sovereign_protocol::path_filters::{file_name, normalize_path, path_prefix_matches};
use sovereign_protocol::{is_compat_path, VirtualTree};
use std::collections::HashSet;

/// Drops whole files by path before any content is read.
#[derive(Debug, Clone)]
pub struct RemovalFilter {
    file_names: HashSet<String>,
    dir_prefixes: Vec<String>,
    globs: GlobSet,
}

impl RemovalFilter {
    pub fn new(denylist: &Denylist) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &denylist.globs {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|err| ConfigError::Invalid(format!("invalid denylist glob: {err}")))?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|err| ConfigError::Invalid(format!("invalid denylist globs: {err}")))?;

        Ok(Self {
            file_names: denylist.file_names.iter().cloned().collect(),
            dir_prefixes: denylist
                .dir_prefixes
                .iter()
                .map(|prefix| normalize_path(prefix))
                .collect(),
            globs,
        })
    }

    /// Whether `path` is denylisted. The polyfill namespace never is.
    pub fn is_denied(&self, path: &str) -> bool {
        if is_compat_path(path) {
            return false;
        }
        self.file_names.contains(file_name(path))
            || self
                .dir_prefixes
                .iter()
                .any(|prefix| path_prefix_matches(prefix, path))
            || self.globs.is_match(path)
    }

    /// Returns the filtered tree and how many files were dropped
    pub fn filter(&self, original: &VirtualTree, removal_list: &[String]) -> (VirtualTree, usize) {
        let explicit: HashSet<String> = removal_list
            .iter()
            .map(|path| normalize_path(path))
            .filter(|path| !path.is_empty())
            .collect();

        let filtered = original.retain(|file| {
            let path = file.path();
            let remove =
                !is_compat_path(path) && (explicit.contains(path) || self.is_denied(path));
            if remove {
                log::debug!("Removing {path}");
            }
            !remove
        });

        let removed = original.len() - filtered.len();
        log::info!("Removal filter dropped {removed} of {} files", original.len());
        (filtered, removed)
    }
}
