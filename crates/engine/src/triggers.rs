use sovereign_protocol::Finding;

/// A removed runtime capability that needs a local stand-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyfillTrigger {
    pub name: &'static str,
    /// Catalog rule whose findings fire the trigger
    pub rule_id: &'static str,
    /// Module file name inside the compat namespace
    pub module: &'static str,
    /// Property installed on `globalThis.__compat`
    pub export: &'static str,
}

pub const TRIGGERS: &[PolyfillTrigger] = &[
    PolyfillTrigger {
        name: "needs-auth-session-shim",
        rule_id: "ghost-auth-session",
        module: "auth-session.js",
        export: "auth",
    },
    PolyfillTrigger {
        name: "needs-feature-flag-shim",
        rule_id: "ghost-feature-flag",
        module: "feature-flags.js",
        export: "flags",
    },
    PolyfillTrigger {
        name: "needs-kv-storage-shim",
        rule_id: "ghost-platform-storage",
        module: "kv-storage.js",
        export: "storage",
    },
    PolyfillTrigger {
        name: "needs-analytics-noop-shim",
        rule_id: "telemetry-sdk-call",
        module: "analytics.js",
        export: "analytics",
    },
];

/// Triggers fired by any finding in the whole run, in table order.
///
/// The decision is global: a capability removed in one file may be used in
/// another.
pub fn collect_triggers(findings: &[Finding]) -> Vec<&'static PolyfillTrigger> {
    let fired: Vec<_> = TRIGGERS
        .iter()
        .filter(|trigger| {
            findings
                .iter()
                .any(|finding| finding.rule_id.as_deref() == Some(trigger.rule_id))
        })
        .collect();
    if !fired.is_empty() {
        log::info!(
            "Fired polyfill triggers: {}",
            fired
                .iter()
                .map(|trigger| trigger.name)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    fired
}
