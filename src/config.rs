use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_AGENT_ID: &str = "BEDROCK_AGENT_ID";
pub const ENV_AGENT_ALIAS_ID: &str = "BEDROCK_AGENT_ALIAS_ID";
pub const ENV_ENDPOINT: &str = "BEDROCK_AGENT_ENDPOINT";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which agent to talk to
    pub agent: AgentConfig,

    /// UI preferences
    pub ui: UiConfig,

    /// auditdesk home directory (logs, config file)
    #[serde(skip)]
    pub home: PathBuf,
}

/// Agent endpoint settings. Missing values only fail once a question is sent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub region: Option<String>,
    pub agent_id: Option<String>,
    pub agent_alias_id: Option<String>,
    /// Full base URL replacing the regional endpoint (VPC endpoints, local mocks)
    pub endpoint: Option<String>,
    /// Whole-request timeout; agents with long tool chains need a generous one
    pub request_timeout_secs: Option<u64>,
}

/// UI configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// How many citations are shown under an answer
    pub citation_limit: usize,
    pub placeholder: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            citation_limit: 2,
            placeholder: "Ask a question from the FAQ PDF (e.g., refund policy).".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig::default(),
            ui: UiConfig::default(),
            home: default_home(),
        }
    }
}

/// Command-line values that win over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub agent_id: Option<String>,
    pub agent_alias_id: Option<String>,
}

impl Config {
    /// Load the config file (if any), then layer the environment on top.
    ///
    /// `path` defaults to `~/.auditdesk/config.toml`; a missing default file is
    /// fine, a missing explicit one is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let home = default_home();
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (home.join("config.toml"), false),
        };

        let mut config = if config_path.exists() || explicit {
            Self::from_file(&config_path)?
        } else {
            Config::default()
        };
        config.home = home;
        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply environment variables through `lookup`. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(region) = get(ENV_REGION).or_else(|| get(ENV_DEFAULT_REGION)) {
            self.agent.region = Some(region);
        }
        if let Some(agent_id) = get(ENV_AGENT_ID) {
            self.agent.agent_id = Some(agent_id);
        }
        if let Some(alias_id) = get(ENV_AGENT_ALIAS_ID) {
            self.agent.agent_alias_id = Some(alias_id);
        }
        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.agent.endpoint = Some(endpoint);
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        let non_blank = |v: String| if v.trim().is_empty() { None } else { Some(v) };

        if let Some(region) = overrides.region.and_then(non_blank) {
            self.agent.region = Some(region);
        }
        if let Some(agent_id) = overrides.agent_id.and_then(non_blank) {
            self.agent.agent_id = Some(agent_id);
        }
        if let Some(alias_id) = overrides.agent_alias_id.and_then(non_blank) {
            self.agent.agent_alias_id = Some(alias_id);
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home.join("logs")
    }
}

impl AgentConfig {
    /// `(setting, value)` pairs in display order, for status screens.
    pub fn settings(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("Region", self.region.as_deref()),
            ("Agent ID", self.agent_id.as_deref()),
            ("Agent alias ID", self.agent_alias_id.as_deref()),
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.settings().iter().all(|(_, value)| value.is_some())
    }
}

fn default_home() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".auditdesk")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_cap_citations_at_two() {
        let config = Config::default();
        assert_eq!(config.ui.citation_limit, 2);
        assert!(config.agent.region.is_none());
        assert!(!config.agent.is_complete());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            [agent]
            region = "ap-southeast-2"
            agent_id = "FILEAGENT"
            "#,
        )
        .unwrap();

        config.apply_env(env(&[
            (ENV_AGENT_ID, "ENVAGENT"),
            (ENV_AGENT_ALIAS_ID, "ALIAS1"),
        ]));

        assert_eq!(config.agent.region.as_deref(), Some("ap-southeast-2"));
        assert_eq!(config.agent.agent_id.as_deref(), Some("ENVAGENT"));
        assert_eq!(config.agent.agent_alias_id.as_deref(), Some("ALIAS1"));
        assert!(config.agent.is_complete());
    }

    #[test]
    fn default_region_is_a_fallback_only() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_DEFAULT_REGION, "eu-west-1")]));
        assert_eq!(config.agent.region.as_deref(), Some("eu-west-1"));

        let mut config = Config::default();
        config.apply_env(env(&[
            (ENV_DEFAULT_REGION, "eu-west-1"),
            (ENV_REGION, "us-east-1"),
        ]));
        assert_eq!(config.agent.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn blank_environment_values_count_as_unset() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_AGENT_ID, "   "), (ENV_REGION, "")]));
        assert!(config.agent.agent_id.is_none());
        assert!(config.agent.region.is_none());
    }

    #[test]
    fn command_line_wins_over_environment() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_REGION, "us-east-1"), (ENV_AGENT_ID, "ENVAGENT")]));
        config.apply_overrides(Overrides {
            region: Some("us-west-2".into()),
            agent_id: Some(String::new()),
            agent_alias_id: None,
        });

        assert_eq!(config.agent.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.agent.agent_id.as_deref(), Some("ENVAGENT"));
    }

    #[test]
    fn partial_ui_section_keeps_defaults() {
        let config: Config = toml::from_str("[ui]\ncitation_limit = 3\n").unwrap();
        assert_eq!(config.ui.citation_limit, 3);
        assert!(config.ui.placeholder.contains("refund policy"));
    }
}
