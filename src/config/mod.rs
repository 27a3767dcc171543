//! Configuration management for tidyrun
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. User config: `~/.config/tidyrun/config.{toml,yaml,yml,json}`
//! 3. Repository config: `tidyrun.{toml,yaml,yml,json}` in the working directory
//! 4. An explicit `--config <FILE>`
//! 5. Environment variables prefixed `TIDYRUN_` (nested keys split on `__`,
//!    e.g. `TIDYRUN_RUN__JOBS=8`)
//! 6. Command-line flags

use crate::discovery::FindOptions;
use crate::parallel::{ExitPolicy, OutputMode};
use crate::task::ToolCommand;
use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;


/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TidyrunConfig {
    /// External analysis tool
    #[serde(default)]
    pub tool: ToolCommand,

    /// Scheduling and reporting
    #[serde(default)]
    pub run: RunSettings,

    /// Filters used when a path argument is a directory
    #[serde(default)]
    pub discovery: FindOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Maximum concurrent tool processes (0 = number of logical CPUs)
    pub jobs: usize,

    pub output: OutputMode,

    pub exit_policy: ExitPolicy,

    /// Per-file time limit in seconds
    pub timeout_secs: Option<u64>,
}

/// Values supplied on the command line; unset fields leave lower layers alone
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    pub tool: ToolOverrides,
    pub run: RunOverrides,
    pub discovery: DiscoveryOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_policy: Option<ExitPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryOverrides {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filename: Vec<String>,
}

impl TidyrunConfig {
    /// Load the full configuration chain
    pub fn load(custom_config: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        tracing::trace!("CONFIG LOAD: Starting");

        let figment = Self::figment(custom_config)?.merge(Serialized::defaults(overrides));
        let config: TidyrunConfig = figment
            .extract()
            .context("Failed to parse configuration")?;

        tracing::debug!(
            tool = %config.tool.program,
            jobs = config.run.jobs,
            output = ?config.run.output,
            exit_policy = ?config.run.exit_policy,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Every layer except command-line overrides
    pub fn figment(custom_config: Option<&Path>) -> Result<Figment> {
        let user_base = Self::user_config_base_path();

        let mut figment = Figment::new()
            .merge(Serialized::defaults(TidyrunConfig::default()))
            .merge(Toml::file(format!("{user_base}.toml")))
            .merge(Yaml::file(format!("{user_base}.yaml")))
            .merge(Yaml::file(format!("{user_base}.yml")))
            .merge(Json::file(format!("{user_base}.json")))
            .merge(Toml::file("tidyrun.toml"))
            .merge(Yaml::file("tidyrun.yaml"))
            .merge(Yaml::file("tidyrun.yml"))
            .merge(Json::file("tidyrun.json"));

        if let Some(path) = custom_config {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => bail!(
                    "Unsupported config format for {} (expected .toml, .yaml, .yml or .json)",
                    path.display()
                ),
            };
        }

        // Environment variables override every file
        Ok(figment.merge(Env::prefixed("TIDYRUN_").split("__")))
    }

    /// Concurrency limit with `0` resolved to the logical CPU count
    pub fn jobs(&self) -> usize {
        match self.run.jobs {
            0 => num_cpus::get(),
            jobs => jobs,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.run.timeout_secs.map(Duration::from_secs)
    }

    fn user_config_base_path() -> String {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/.config/tidyrun/config"),
            Err(_) => "~/.config/tidyrun/config".to_string(),
        }
    }
}
