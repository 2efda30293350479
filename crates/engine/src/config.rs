use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a cleaning run.
///
/// Every section is optional in TOML; missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanConfig {
    pub limits: Limits,
    pub denylist: Denylist,
    pub manifest: ManifestPolicy,
    pub scoring: ScoringConfig,
    pub catalog: CatalogConfig,
}

/// Input guards and the verification retry bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// More files than this aborts the run
    pub max_files: usize,

    /// More total bytes than this aborts the run
    pub max_total_bytes: u64,

    /// Text files above this size are passed through with a finding
    pub max_file_bytes: u64,

    /// Extra rewrite passes the verifier may request (clamped to 1)
    pub max_retry_passes: u8,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_files: 50_000,
            max_total_bytes: 512 * 1024 * 1024,
            max_file_bytes: 1_048_576, // 1 MB
            max_retry_passes: 1,
        }
    }
}

impl Limits {
    /// Retry bound actually used; never more than one extra pass
    pub fn retry_passes(&self) -> u8 {
        self.max_retry_passes.min(1)
    }
}

/// Paths removed before any content is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Denylist {
    /// Exact file names, matched at any depth
    pub file_names: Vec<String>,

    /// Directory prefixes, matched on whole path segments
    pub dir_prefixes: Vec<String>,

    /// Glob patterns over the normalized path
    pub globs: Vec<String>,
}

impl Default for Denylist {
    fn default() -> Self {
        Self {
            file_names: vec![
                ".proprietaryrc".to_string(),
                "proprietary.config.json".to_string(),
                ".proprietary-lock.json".to_string(),
            ],
            dir_prefixes: vec![".proprietary".to_string(), ".platform".to_string()],
            globs: vec![
                "**/*.proprietary.js".to_string(),
                "**/*.proprietary.ts".to_string(),
            ],
        }
    }
}

/// Which packages count as proprietary and which files a project needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestPolicy {
    pub denied_packages: Vec<String>,

    /// Namespace prefixes such as `@proprietary/`
    pub denied_prefixes: Vec<String>,

    /// Files that must exist in a JavaScript project's root
    pub required_files: Vec<String>,
}

impl Default for ManifestPolicy {
    fn default() -> Self {
        Self {
            denied_packages: vec![
                "proprietary-sdk".to_string(),
                "proprietary-tagger".to_string(),
                "proprietary-cli".to_string(),
            ],
            denied_prefixes: vec!["@proprietary/".to_string()],
            required_files: vec!["package.json".to_string()],
        }
    }
}

impl ManifestPolicy {
    pub fn is_denied(&self, package: &str) -> bool {
        self.denied_packages.iter().any(|name| name == package)
            || self
                .denied_prefixes
                .iter()
                .any(|prefix| package.starts_with(prefix.as_str()))
    }
}

/// Score weights and verdict thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub critical: u32,
    pub major: u32,
    pub minor: u32,

    /// Lowest score that can still be certified `sovereign`
    pub sovereign_at_least: u8,

    /// Scores below this are `blocked`
    pub blocked_below: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical: 30,
            major: 10,
            minor: 2,
            sovereign_at_least: 95,
            blocked_below: 50,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.critical < self.major || self.major < self.minor {
            return Err(format!(
                "scoring weights must satisfy critical >= major >= minor (got {} / {} / {})",
                self.critical, self.major, self.minor
            ));
        }
        if self.critical == 0 {
            return Err("scoring.critical must be > 0".to_string());
        }
        if self.sovereign_at_least > 100 {
            return Err(format!(
                "scoring.sovereign_at_least ({}) cannot exceed 100",
                self.sovereign_at_least
            ));
        }
        if self.blocked_below > self.sovereign_at_least {
            return Err(format!(
                "scoring.blocked_below ({}) cannot exceed sovereign_at_least ({})",
                self.blocked_below, self.sovereign_at_least
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Additional rule catalog appended after the builtin one
    pub extra_rules_path: Option<PathBuf>,
}

impl CleanConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: CleanConfig = toml::from_str(raw)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load and validate a config file.
    ///
    /// A relative `catalog.extra_rules_path` is resolved against the
    /// directory holding the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        if let (Some(extra), Some(base)) = (&config.catalog.extra_rules_path, path.parent()) {
            if extra.is_relative() {
                config.catalog.extra_rules_path = Some(base.join(extra));
            }
        }
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.limits.max_files == 0 {
            return Err("limits.max_files must be > 0".to_string());
        }
        if self.limits.max_file_bytes == 0 {
            return Err("limits.max_file_bytes must be > 0".to_string());
        }
        if self.limits.max_file_bytes > self.limits.max_total_bytes {
            return Err(format!(
                "limits.max_file_bytes ({}) cannot exceed max_total_bytes ({})",
                self.limits.max_file_bytes, self.limits.max_total_bytes
            ));
        }
        if let Some(prefix) = self
            .denylist
            .dir_prefixes
            .iter()
            .find(|prefix| prefix.trim_matches('/').is_empty())
        {
            return Err(format!(
                "denylist.dir_prefixes entry {prefix:?} would remove every file"
            ));
        }
        if self
            .manifest
            .denied_prefixes
            .iter()
            .any(|prefix| prefix.is_empty())
        {
            return Err("manifest.denied_prefixes cannot contain an empty prefix".to_string());
        }
        if self
            .manifest
            .denied_packages
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err("manifest.denied_packages cannot contain an empty name".to_string());
        }
        self.scoring.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_valid() {
        assert!(CleanConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CleanConfig::from_toml_str(
            r#"
[limits]
max_retry_passes = 5

[scoring]
minor = 1
"#,
        )
        .unwrap();
        assert_eq!(config.limits.max_retry_passes, 5);
        assert_eq!(config.limits.retry_passes(), 1);
        assert_eq!(config.scoring.minor, 1);
        assert_eq!(config.scoring.critical, 30);
        assert_eq!(config.denylist, Denylist::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CleanConfig::from_toml_str("[limits]\nmax_filez = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    }

    #[test]
    fn test_config_validation() {
        let mut config = CleanConfig::default();

        // Invalid: weights not monotone
        config.scoring.major = 50;
        assert!(config.validate().is_err());

        // Invalid: thresholds out of order
        config.scoring = ScoringConfig {
            blocked_below: 96,
            ..ScoringConfig::default()
        };
        assert!(config.validate().is_err());

        // Invalid: root prefix
        config.scoring = ScoringConfig::default();
        config.denylist.dir_prefixes = vec!["/".to_string()];
        assert!(config.validate().is_err());

        config.denylist = Denylist::default();
        assert!(config.validate().is_ok());

        // Invalid: empty package name
        config.manifest.denied_packages.push(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn denied_packages_match_names_and_namespaces() {
        let policy = ManifestPolicy::default();
        assert!(policy.is_denied("proprietary-sdk"));
        assert!(policy.is_denied("@proprietary/analytics"));
        assert!(!policy.is_denied("proprietary-sdk-compat"));
        assert!(!policy.is_denied("react"));
    }

    #[test]
    fn load_resolves_extra_rules_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sovereign.toml");
        std::fs::write(&path, "[catalog]\nextra_rules_path = \"rules/local.toml\"\n").unwrap();
        let config = CleanConfig::load(&path).unwrap();
        assert_eq!(
            config.catalog.extra_rules_path,
            Some(dir.path().join("rules/local.toml"))
        );
    }
}
