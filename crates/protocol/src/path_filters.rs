/// Normalize a project-relative path: forward slashes, no leading `./` or `/`,
/// no empty or `.` segments. Returns an empty string for the project root.
pub fn normalize_path(raw: &str) -> String {
    let value = raw.trim().replace('\\', "/");
    value
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// True when `path` equals `prefix` or lives below it (segment-aware).
pub fn path_prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = normalize_path(prefix);
    if prefix.is_empty() {
        return false;
    }
    path_prefix_matches_normalized(&prefix, path)
}

/// File name component of a normalized path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Lowercased extension of a normalized path, if any.
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn path_prefix_matches_normalized(prefix: &str, path: &str) -> bool {
    if path == prefix {
        return true;
    }

    if !path.starts_with(prefix) {
        return false;
    }

    path.as_bytes().get(prefix.len()) == Some(&b'/')
}
