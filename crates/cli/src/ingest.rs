use anyhow::{Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use sovereign_protocol::path_filters::normalize_path;
use sovereign_protocol::{FileContent, VirtualFile, VirtualTree};
use std::path::{Component, Path, PathBuf};

/// Reads a project directory into a [`VirtualTree`]
pub struct TreeReader {
    root: PathBuf,
    skipped: Vec<PathBuf>,
}

impl TreeReader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            skipped: Vec::new(),
        }
    }

    /// Leave `path` out of the tree (the tool's own config file)
    pub fn skip_file(mut self, path: Option<&Path>) -> Self {
        if let Some(path) = path.and_then(|path| path.canonicalize().ok()) {
            self.skipped.push(path);
        }
        self
    }

    /// Project files, relative to the root. Hidden files are included
    /// (`.env` and platform dotfiles matter); VCS and dependency
    /// directories are not.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true);
        builder.filter_entry(move |entry| !TreeReader::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }
                    if self.skipped.iter().any(|skipped| skipped == entry.path()) {
                        log::debug!("Skipping {}", entry.path().display());
                        continue;
                    }
                    files.push(entry.path().to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::info!("Found {} files under {}", files.len(), self.root.display());
        files
    }

    pub fn read(&self) -> Result<VirtualTree> {
        let paths = self.scan();
        let files = paths
            .par_iter()
            .map(|path| self.read_file(path))
            .collect::<Result<Vec<_>>>()?;
        VirtualTree::from_files(files).context("Failed to assemble project tree")
    }

    fn read_file(&self, path: &Path) -> Result<VirtualFile> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let name = normalize_path(&relative.to_string_lossy());
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        VirtualFile::new(&name, FileContent::from_bytes(bytes))
            .with_context(|| format!("Invalid project path {}", path.display()))
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS
    ".git",
    ".hg",
    ".svn",
    // dependencies / caches
    "node_modules",
    ".cache",
    ".next",
    ".nuxt",
    ".turbo",
    ".parcel-cache",
    ".svelte-kit",
    ".vite",
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn reads_hidden_files_and_skips_dependency_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/app.js"), "x").unwrap();
        fs::write(root.join(".env"), "A=1\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "y").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join("logo.png"), [0x89u8, 0x50, 0xff, 0x00]).unwrap();

        let tree = TreeReader::new(root).read().unwrap();
        let paths: Vec<&str> = tree.paths().collect();
        assert_eq!(paths, vec![".env", "logo.png", "src/app.js"]);
        assert!(tree.get("logo.png").unwrap().is_binary());
        assert_eq!(tree.text("src/app.js"), Some("x"));
    }

    #[test]
    fn skipped_config_file_is_not_ingested() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("sovereign.toml"), "[limits]\n").unwrap();
        fs::write(root.join("main.js"), "x").unwrap();

        let config = root.join("sovereign.toml");
        let tree = TreeReader::new(&root)
            .skip_file(Some(&config))
            .read()
            .unwrap();
        let paths: Vec<&str> = tree.paths().collect();
        assert_eq!(paths, vec!["main.js"]);

        let tree = TreeReader::new(&root).skip_file(None).read().unwrap();
        assert_eq!(tree.len(), 2);
    }
}
