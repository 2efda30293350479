use crate::error::{ProtocolError, Result};
use crate::file::{FileContent, VirtualFile};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered, immutable snapshot of a project's files.
///
/// Stages never mutate a tree; they derive a new one. Files that did not
/// change are shared between snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualTree {
    files: BTreeMap<String, Arc<VirtualFile>>,
}

impl VirtualTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from files; a duplicate path is an error
    pub fn from_files(files: impl IntoIterator<Item = VirtualFile>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for file in files {
            let path = file.path().to_string();
            if map.insert(path.clone(), Arc::new(file)).is_some() {
                return Err(ProtocolError::DuplicatePath(path));
            }
        }
        Ok(Self { files: map })
    }

    /// Build a tree from `path -> text` pairs
    pub fn from_texts<P, T>(entries: impl IntoIterator<Item = (P, T)>) -> Result<Self>
    where
        P: AsRef<str>,
        T: Into<String>,
    {
        let files = entries
            .into_iter()
            .map(|(path, text)| VirtualFile::text(path.as_ref(), text))
            .collect::<Result<Vec<_>>>()?;
        Self::from_files(files)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(path).map(Arc::as_ref)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(VirtualFile::as_text)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = &VirtualFile> {
        self.files.values().map(Arc::as_ref)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files().map(|file| file.content().len() as u64).sum()
    }

    /// New tree keeping only files accepted by `keep`
    #[must_use]
    pub fn retain(&self, mut keep: impl FnMut(&VirtualFile) -> bool) -> Self {
        let files = self
            .files
            .iter()
            .filter(|(_, file)| keep(file))
            .map(|(path, file)| (path.clone(), Arc::clone(file)))
            .collect();
        Self { files }
    }

    /// New tree with `upserts` replacing or adding files and `removals` dropped
    #[must_use]
    pub fn apply(
        &self,
        upserts: impl IntoIterator<Item = VirtualFile>,
        removals: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut files = self.files.clone();
        for path in removals {
            files.remove(&path);
        }
        for file in upserts {
            files.insert(file.path().to_string(), Arc::new(file));
        }
        Self { files }
    }

    /// SHA-256 over ordered path/content pairs, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for file in self.files() {
            hasher.update(file.path().as_bytes());
            hasher.update([0u8]);
            let tag: u8 = match file.content() {
                FileContent::Text(_) => b't',
                FileContent::Binary(_) => b'b',
            };
            hasher.update([tag]);
            hasher.update((file.content().len() as u64).to_le_bytes());
            hasher.update(file.content().as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}
