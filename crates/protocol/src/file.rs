use crate::error::{ProtocolError, Result};
use crate::path_filters::{extension, file_name, normalize_path};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of a project file, derived from its name and extension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    Manifest,
    BuildConfig,
    Markup,
    Stylesheet,
    Source,
    Env,
    Doc,
    Shell,
    Sql,
    Other,
}

const BUILD_CONFIG_STEMS: &[&str] = &[
    "vite", "webpack", "next", "rollup", "babel", "postcss", "tailwind", "svelte", "nuxt",
    "astro",
];

impl FileKind {
    pub const ALL: [FileKind; 10] = [
        FileKind::Manifest,
        FileKind::BuildConfig,
        FileKind::Markup,
        FileKind::Stylesheet,
        FileKind::Source,
        FileKind::Env,
        FileKind::Doc,
        FileKind::Shell,
        FileKind::Sql,
        FileKind::Other,
    ];

    /// Detect kind from a normalized project-relative path
    pub fn from_path(path: &str) -> Self {
        let name = file_name(path).to_ascii_lowercase();

        if name == "package.json" {
            return FileKind::Manifest;
        }
        if name == ".env" || name.starts_with(".env.") || name.ends_with(".env") {
            return FileKind::Env;
        }
        if Self::is_build_config_name(&name) {
            return FileKind::BuildConfig;
        }
        if matches!(name.as_str(), "dockerfile" | "makefile") {
            return FileKind::Shell;
        }

        match extension(&name).as_deref() {
            Some("html" | "htm" | "vue" | "svelte" | "astro" | "xml") => FileKind::Markup,
            Some("css" | "scss" | "sass" | "less" | "styl") => FileKind::Stylesheet,
            Some(
                "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "py" | "rb" | "go"
                | "rs" | "java" | "kt" | "php" | "swift" | "cs",
            ) => FileKind::Source,
            Some("md" | "mdx" | "rst" | "txt" | "adoc") => FileKind::Doc,
            Some("sh" | "bash" | "zsh" | "fish" | "ps1" | "bat" | "cmd") => FileKind::Shell,
            Some("sql") => FileKind::Sql,
            _ => FileKind::Other,
        }
    }

    fn is_build_config_name(name: &str) -> bool {
        if name == "jsconfig.json" || (name.starts_with("tsconfig") && name.ends_with(".json")) {
            return true;
        }
        let Some((stem, rest)) = name.split_once('.') else {
            return false;
        };
        rest.starts_with("config.") && BUILD_CONFIG_STEMS.contains(&stem)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Manifest => "manifest",
            FileKind::BuildConfig => "build-config",
            FileKind::Markup => "markup",
            FileKind::Stylesheet => "stylesheet",
            FileKind::Source => "source",
            FileKind::Env => "env",
            FileKind::Doc => "doc",
            FileKind::Shell => "shell",
            FileKind::Sql => "sql",
            FileKind::Other => "other",
        }
    }

    /// JavaScript/TypeScript family sources, the ones that need a package manifest
    pub fn is_js_family(path: &str) -> bool {
        matches!(
            extension(path).as_deref(),
            Some("js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "vue" | "svelte")
        )
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw file payload. Binary payloads never reach text matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Classify raw bytes: valid UTF-8 without NUL bytes is text
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.contains(&0) {
            return FileContent::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => FileContent::Text(text),
            Err(err) => FileContent::Binary(err.into_bytes()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            FileContent::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(text) => text.as_bytes(),
            FileContent::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single immutable file of a [`crate::VirtualTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualFile {
    path: String,
    content: FileContent,
    kind: FileKind,
}

impl VirtualFile {
    /// Create a file, normalizing its path and deriving its kind
    pub fn new(path: &str, content: FileContent) -> Result<Self> {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return Err(ProtocolError::InvalidPath(path.to_string()));
        }
        if normalized.split('/').any(|segment| segment == "..") {
            return Err(ProtocolError::InvalidPath(path.to_string()));
        }
        let kind = FileKind::from_path(&normalized);
        Ok(Self {
            path: normalized,
            content,
            kind,
        })
    }

    pub fn text(path: &str, text: impl Into<String>) -> Result<Self> {
        Self::new(path, FileContent::Text(text.into()))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn as_text(&self) -> Option<&str> {
        self.content.as_text()
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.content, FileContent::Binary(_))
    }

    /// Same path and kind, new text content
    #[must_use]
    pub fn with_text(&self, text: String) -> Self {
        Self {
            path: self.path.clone(),
            content: FileContent::Text(text),
            kind: self.kind,
        }
    }
}
