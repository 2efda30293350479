//! Loads the compat index from every file that calls into it.
//!
//! Rewritten call sites reach the shims through `globalThis.__compat`, which
//! only exists once `src/__compat__/index.js` has been evaluated. Each such
//! file gets a side-effect import of the index (or a module script tag for
//! HTML pages). Files that already load the index are left alone.

use crate::polyfill::{module_path, INDEX_MODULE};
use once_cell::sync::Lazy;
use regex::Regex;
use sovereign_protocol::path_filters::extension;
use sovereign_protocol::{is_compat_path, VirtualFile, VirtualTree};

/// Left behind at every shim call site by the rewrite rules
pub(crate) const COMPAT_CALL_MARKER: &str = "__compat.";

/// Module specifiers and script sources, with the quoted value captured
static LOADED_SPECIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:\bfrom\s*|\bimport\s*\(?\s*|\brequire\s*\(\s*|<script\b[^>]*?\bsrc\s*=\s*)["']([^"'\n]+)["']"#,
    )
    .expect("loaded specifier regex must compile")
});

static SCRIPT_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script\b[^>]*>").expect("script tag regex must compile"));

static SCRIPT_OR_HEAD_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script\b|</head>").expect("head regex must compile"));

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*["']use [A-Za-z ]+["'];?\s*$"#).expect("directive regex must compile")
});

/// How a file can be made to load the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loader {
    /// ES module: side-effect import at the top
    Module,
    /// Single-file component: import inside the first script block
    Component,
    /// HTML page: module script tag before the first script
    Page,
}

impl Loader {
    fn for_path(path: &str) -> Option<Self> {
        match extension(path).as_deref()? {
            "js" | "jsx" | "mjs" | "ts" | "tsx" | "mts" => Some(Loader::Module),
            "vue" | "svelte" => Some(Loader::Component),
            "html" | "htm" => Some(Loader::Page),
            _ => None,
        }
    }
}

/// Add an index import to every file calling a shim.
///
/// Returns the linked tree and the paths that changed. Without an index in
/// `tree` nothing is touched; the auditor reports the dangling calls.
pub(crate) fn link_compat_index(tree: &VirtualTree) -> (VirtualTree, Vec<String>) {
    if !tree.contains(&module_path(INDEX_MODULE)) {
        return (tree.clone(), Vec::new());
    }

    let linked: Vec<VirtualFile> = tree
        .files()
        .filter(|file| !is_compat_path(file.path()))
        .filter_map(|file| {
            let text = file.as_text()?;
            if !text.contains(COMPAT_CALL_MARKER) || loads_index(file.path(), text) {
                return None;
            }
            let loader = Loader::for_path(file.path())?;
            log::debug!("Linking compat index into {}", file.path());
            Some(file.with_text(insert_loader(file.path(), text, loader)))
        })
        .collect();

    if linked.is_empty() {
        return (tree.clone(), Vec::new());
    }
    log::info!("Linked the compat index into {} file(s)", linked.len());
    let paths = linked.iter().map(|file| file.path().to_string()).collect();
    (tree.apply(linked, std::iter::empty()), paths)
}

/// Whether `text` imports or script-loads the compat index
pub(crate) fn loads_index(path: &str, text: &str) -> bool {
    let index = module_path(INDEX_MODULE);
    LOADED_SPECIFIER.captures_iter(text).any(|caps| {
        resolve_specifier(path, &caps[1]).is_some_and(|resolved| resolved == index)
    })
}

/// Relative specifier of the index as seen from `path`
pub(crate) fn index_specifier(path: &str) -> String {
    let index = module_path(INDEX_MODULE);
    let target: Vec<&str> = index.split('/').collect();
    let mut dir: Vec<&str> = path.split('/').collect();
    dir.pop();

    let common = dir
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();
    let ups = dir.len() - common;
    let rest = target[common..].join("/");
    if ups == 0 {
        format!("./{rest}")
    } else {
        format!("{}{rest}", "../".repeat(ups))
    }
}

/// Project path a relative or root-absolute specifier in `from` points to.
/// Bare package specifiers and paths escaping the root yield `None`.
pub(crate) fn resolve_specifier(from: &str, specifier: &str) -> Option<String> {
    let specifier = specifier.split(['?', '#']).next()?;
    let joined = if let Some(absolute) = specifier.strip_prefix('/') {
        absolute.to_string()
    } else if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = from.rsplit_once('/').map_or("", |(dir, _)| dir);
        format!("{dir}/{specifier}")
    } else {
        return None;
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            segment => segments.push(segment),
        }
    }
    Some(segments.join("/"))
}

fn insert_loader(path: &str, text: &str, loader: Loader) -> String {
    match loader {
        Loader::Module => {
            let at = prologue_end(text);
            let mut out = String::with_capacity(text.len() + 40);
            out.push_str(&text[..at]);
            if at > 0 && !text[..at].ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("import \"{}\";\n", index_specifier(path)));
            out.push_str(&text[at..]);
            out
        }
        Loader::Component => {
            let import = format!("import \"{}\";", index_specifier(path));
            match SCRIPT_OPEN.find(text) {
                Some(open) => format!(
                    "{}\n{import}{}",
                    &text[..open.end()],
                    &text[open.end()..]
                ),
                None => format!("<script>\n{import}\n</script>\n{text}"),
            }
        }
        Loader::Page => {
            let tag = format!(
                "<script type=\"module\" src=\"/{}\"></script>",
                module_path(INDEX_MODULE)
            );
            let Some(anchor) = SCRIPT_OR_HEAD_END.find(text) else {
                return format!("{tag}\n{text}");
            };
            let line_start = text[..anchor.start()].rfind('\n').map_or(0, |nl| nl + 1);
            let indent = &text[line_start..anchor.start()];
            if indent.chars().all(char::is_whitespace) {
                format!(
                    "{}{indent}{tag}\n{}",
                    &text[..line_start],
                    &text[line_start..]
                )
            } else {
                format!("{}{tag}{}", &text[..anchor.start()], &text[anchor.start()..])
            }
        }
    }
}

/// Byte offset after a shebang line and any directive prologue
/// (`"use client";`), which must stay first in a module.
fn prologue_end(text: &str) -> usize {
    let mut offset = 0;
    for (index, line) in text.split_inclusive('\n').enumerate() {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let shebang = index == 0 && trimmed.starts_with("#!");
        if shebang || DIRECTIVE.is_match(trimmed) {
            offset += line.len();
        } else {
            break;
        }
    }
    offset
}
