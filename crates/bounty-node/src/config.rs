use anyhow::{Context, Result};
use bounty_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "./bounty-config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub engine: EngineConfig,
    pub ledger: LedgerSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// JSONL audit ledger file
    pub path: PathBuf,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/audit.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        // env overrides are applied by the caller so it controls precedence
        Ok(config)
    }

    /// The file at `path` if given, else `./bounty-config.toml` if present,
    /// else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Applies `BOUNTY_*` overrides read through `lookup`. Unparseable
    /// numbers are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("BOUNTY_LEDGER_PATH").filter(|p| !p.is_empty()) {
            self.ledger.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("BOUNTY_LOG_LEVEL").filter(|l| !l.is_empty()) {
            self.logging.level = level;
        }
        if let Some(format) = lookup("BOUNTY_LOG_FORMAT").filter(|f| !f.is_empty()) {
            self.logging.format = format;
        }
        if let Some(secs) = lookup("BOUNTY_CLAIM_DURATION_SECS").and_then(|s| s.parse().ok()) {
            self.engine.claims.claim_duration_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .context("Invalid engine configuration")?;
        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => anyhow::bail!(
                "Invalid log format '{}'. Valid options: pretty, compact, json",
                other
            ),
        }
        if self.ledger.path.as_os_str().is_empty() {
            anyhow::bail!("Ledger path must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BOUNTY_LEDGER_PATH", "/var/lib/bounty/audit.jsonl"),
            ("BOUNTY_LOG_LEVEL", "debug"),
            ("BOUNTY_LOG_FORMAT", "json"),
            ("BOUNTY_CLAIM_DURATION_SECS", "3600"),
        ]
        .into_iter()
        .collect();

        let mut config = NodeConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.ledger.path, PathBuf::from("/var/lib/bounty/audit.jsonl"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.engine.claims.claim_duration_secs, 3600);
    }

    #[test]
    fn test_bad_number_ignored() {
        let mut config = NodeConfig::default();
        config.apply_overrides_from(|k| {
            (k == "BOUNTY_CLAIM_DURATION_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [engine.scoring]
            approval_threshold = 15

            [logging]
            format = "compact"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.scoring.approval_threshold, 15);
        assert_eq!(config.engine.scoring.max_rejections, 3);
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ledger, LedgerSettings::default());
    }

    #[test]
    fn test_validate() {
        assert!(NodeConfig::default().validate().is_ok());

        let mut config = NodeConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.engine.payout.first_tranche_percent = 0;
        assert!(config.validate().is_err());
    }
}
