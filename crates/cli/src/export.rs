use anyhow::{bail, Context, Result};
use sovereign_protocol::VirtualTree;
use std::fs;
use std::path::Path;

/// Write every file of `tree` below `out`.
///
/// `out` must be missing or empty so no stale file survives next to the
/// cleaned tree.
pub fn write_tree(tree: &VirtualTree, out: &Path) -> Result<usize> {
    if out.exists() {
        let mut entries = fs::read_dir(out)
            .with_context(|| format!("Failed to read output directory {}", out.display()))?;
        if entries.next().is_some() {
            bail!("Output directory {} is not empty", out.display());
        }
    }
    fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory {}", out.display()))?;

    for file in tree.files() {
        let target = out.join(file.path());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, file.content().as_bytes())
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }
    log::info!("Wrote {} files to {}", tree.len(), out.display());
    Ok(tree.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_nested_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let tree =
            VirtualTree::from_texts([("a.txt", "a"), ("src/__compat__/index.js", "b")]).unwrap();
        assert_eq!(write_tree(&tree, &out).unwrap(), 2);
        assert_eq!(fs::read_to_string(out.join("src/__compat__/index.js")).unwrap(), "b");
    }

    #[test]
    fn refuses_non_empty_target() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stale.txt"), "x").unwrap();
        let tree = VirtualTree::from_texts([("a.txt", "a")]).unwrap();
        let err = write_tree(&tree, dir.path()).unwrap_err();
        assert!(err.to_string().contains("not empty"));
    }
}
