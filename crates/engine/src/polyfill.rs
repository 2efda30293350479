use crate::triggers::{PolyfillTrigger, TRIGGERS};
use sovereign_protocol::{VirtualFile, VirtualTree, COMPAT_NAMESPACE};

pub const INDEX_MODULE: &str = "index.js";

const HEADER: &str = "// Generated by sovereign. Regenerated on every run; do not edit.\n";

/// Storage helper shared by the shims; each module carries its own copy so
/// modules stay self-contained.
const STORAGE_PRELUDE: &str = r#"const memory = new Map();

function backend() {
  try {
    if (typeof localStorage !== "undefined" && localStorage !== null) {
      return localStorage;
    }
  } catch (_err) {
    // Access can throw in sandboxed frames; fall back to memory.
  }
  return {
    getItem: (key) => (memory.has(key) ? memory.get(key) : null),
    setItem: (key, value) => {
      memory.set(key, String(value));
    },
    removeItem: (key) => {
      memory.delete(key);
    },
  };
}

function readJson(key, fallback) {
  const raw = backend().getItem(key);
  if (raw === null || raw === undefined) {
    return fallback;
  }
  try {
    return JSON.parse(raw);
  } catch (_err) {
    return fallback;
  }
}

function writeJson(key, value) {
  backend().setItem(key, JSON.stringify(value));
}
"#;

const AUTH_SESSION: &str = r#"
const SESSION_KEY = "__compat.auth.session";
const listeners = new Set();

function notify(event, session) {
  for (const listener of listeners) {
    listener(event, session);
  }
}

export const auth = {
  async getSession() {
    return { data: { session: readJson(SESSION_KEY, null) }, error: null };
  },
  async getUser() {
    const session = readJson(SESSION_KEY, null);
    return { data: { user: session ? session.user || null : null }, error: null };
  },
  onAuthStateChange(listener) {
    listeners.add(listener);
    return {
      data: { subscription: { unsubscribe: () => listeners.delete(listener) } },
    };
  },
  async setSession(session) {
    writeJson(SESSION_KEY, session);
    notify("SIGNED_IN", session);
    return { data: { session }, error: null };
  },
  async signOut() {
    backend().removeItem(SESSION_KEY);
    notify("SIGNED_OUT", null);
    return { error: null };
  },
};

export default auth;
"#;

const FEATURE_FLAGS: &str = r#"
const FLAGS_KEY = "__compat.flags";

export const flags = {
  isEnabled(name, fallback = false) {
    const value = readJson(FLAGS_KEY, {})[name];
    return value === undefined ? fallback : Boolean(value);
  },
  getVariant(name, fallback = null) {
    const value = readJson(FLAGS_KEY, {})[name];
    return value === undefined ? fallback : value;
  },
  set(name, value) {
    const current = readJson(FLAGS_KEY, {});
    current[name] = value;
    writeJson(FLAGS_KEY, current);
  },
};

export default flags;
"#;

const KV_STORAGE: &str = r#"
const PREFIX = "__compat.kv.";

export const storage = {
  async get(key) {
    return readJson(PREFIX + key, null);
  },
  async set(key, value) {
    writeJson(PREFIX + key, value);
    return value;
  },
  async remove(key) {
    backend().removeItem(PREFIX + key);
  },
};

export default storage;
"#;

const ANALYTICS: &str = r#"
// Analytics calls are accepted and dropped locally.
export const analytics = {
  init() {},
  track() {},
  identify() {},
  page() {},
};

export default analytics;
"#;

/// A generated compatibility module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyfillModule {
    pub trigger: &'static str,
    pub path: String,
    pub content: String,
}

impl PolyfillModule {
    pub fn to_file(&self) -> sovereign_protocol::Result<VirtualFile> {
        VirtualFile::text(&self.path, self.content.clone())
    }
}

pub fn module_path(module: &str) -> String {
    format!("{COMPAT_NAMESPACE}/{module}")
}

/// One module per fired trigger
pub fn synthesize(triggers: &[&'static PolyfillTrigger]) -> Vec<PolyfillModule> {
    triggers
        .iter()
        .map(|trigger| PolyfillModule {
            trigger: trigger.name,
            path: module_path(trigger.module),
            content: module_source(trigger),
        })
        .collect()
}

fn module_source(trigger: &PolyfillTrigger) -> String {
    let body = match trigger.export {
        "auth" => AUTH_SESSION,
        "flags" => FEATURE_FLAGS,
        "storage" => KV_STORAGE,
        _ => ANALYTICS,
    };
    let mut source = String::from(HEADER);
    if trigger.export != "analytics" {
        source.push_str(STORAGE_PRELUDE);
    }
    source.push_str(body);
    source
}

/// Regenerate the compat index.
///
/// Re-exports the modules just synthesized plus any shim already present in
/// `tree` from an earlier run. Returns `None` when there is nothing to index.
pub fn index_module(tree: &VirtualTree, modules: &[PolyfillModule]) -> Option<PolyfillModule> {
    let entries: Vec<&PolyfillTrigger> = TRIGGERS
        .iter()
        .filter(|trigger| {
            let path = module_path(trigger.module);
            modules.iter().any(|module| module.path == path) || tree.contains(&path)
        })
        .collect();
    if entries.is_empty() {
        return None;
    }

    let mut content = String::from(HEADER);
    for trigger in &entries {
        content.push_str(&format!(
            "import {} from \"./{}\";\n",
            trigger.export, trigger.module
        ));
    }
    content.push('\n');
    content.push_str("const compat = (globalThis.__compat = globalThis.__compat || {});\n");
    for trigger in &entries {
        content.push_str(&format!("compat.{0} = {0};\n", trigger.export));
    }
    content.push('\n');
    let exports: Vec<&str> = entries.iter().map(|trigger| trigger.export).collect();
    content.push_str(&format!("export {{ {} }};\n", exports.join(", ")));

    Some(PolyfillModule {
        trigger: "index",
        path: module_path(INDEX_MODULE),
        content,
    })
}
