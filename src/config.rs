use crate::agent::{DEFAULT_MAX_ITERATIONS, LoopSettings};
use crate::fuzzy_edit::FuzzyEditor;
use crate::provider::retry::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_AFTER_SECONDS,
};
use crate::provider::{ProviderKind, ProviderSettings, RetryPolicy};
use crate::tools::{ToolContext, VerifySettings};
use crate::workspace::Workspace;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous coding agent working inside a single workspace directory.
Complete the user's task on your own. Do not ask for permission or confirmation; decide and act.
Chain as many tool calls as the task needs before you answer.

Working rules:
- Start with `list_files` to learn the layout, then `read_file` before changing anything.
- Change existing files with `apply_file_edit`. Pass a `search_block` copied from the file \
(indentation may differ slightly) or a `start_line`/`end_line` range, never both.
- Use `write_file` only to create new files.
- After every edit, read the file again to confirm the result.
- Run `verify` when a check command is available and fix what it reports.
- If a tool returns an error, read its code and message and try a different approach.

When the task is done, reply with a short summary of what you changed and no tool call.";

pub const DEFAULT_PROVIDER: &str = "google";
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_VERIFY_TIMEOUT_SECONDS: u64 = 300;

/// Providers known out of the box. Missing ones are added back on load.
pub fn default_providers() -> BTreeMap<String, ProviderSettings> {
    let provider = |kind, base_url: &str, model: &str, env: Option<&str>| ProviderSettings {
        kind,
        base_url: base_url.to_string(),
        model: model.to_string(),
        api_key: None,
        api_key_env: env.map(str::to_string),
        max_tokens: None,
    };
    let gemini = ProviderSettings {
        max_tokens: Some(8192),
        ..provider(
            ProviderKind::Gemini,
            "https://generativelanguage.googleapis.com/v1beta/models",
            "gemini-2.0-flash-exp",
            Some("GEMINI_API_KEY"),
        )
    };
    let openai_compatible = ProviderKind::OpenaiCompatible;

    BTreeMap::from([
        ("google".to_string(), gemini),
        (
            "openai".to_string(),
            provider(
                openai_compatible,
                "https://api.openai.com/v1/",
                "gpt-4o",
                Some("OPENAI_API_KEY"),
            ),
        ),
        (
            "openrouter".to_string(),
            provider(
                openai_compatible,
                "https://openrouter.ai/api/v1/",
                "anthropic/claude-3.5-sonnet",
                Some("OPENROUTER_API_KEY"),
            ),
        ),
        (
            "groq".to_string(),
            provider(
                openai_compatible,
                "https://api.groq.com/openai/v1/",
                "llama3-70b-8192",
                Some("GROQ_API_KEY"),
            ),
        ),
        (
            "ollama".to_string(),
            provider(
                openai_compatible,
                "http://localhost:11434/v1/",
                "llama3.1",
                None,
            ),
        ),
        (
            "lmstudio".to_string(),
            provider(
                openai_compatible,
                "http://localhost:1234/v1/",
                "local-model",
                None,
            ),
        ),
    ])
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub active_provider: String,
    pub system_prompt: String,
    pub max_iterations: usize,
    pub provider_timeout_seconds: u64,
    pub verify_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_retry_after_seconds: u64,
    pub match_threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    /// Command `verify` runs when the model passes none. `{path}` is replaced by the
    /// requested path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_command: Option<String>,
    pub allowed_command_prefixes: Vec<String>,
    pub ignored_paths: Vec<String>,
    pub debug: bool,
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_provider: DEFAULT_PROVIDER.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            provider_timeout_seconds: DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            verify_timeout_seconds: DEFAULT_VERIFY_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_retry_after_seconds: DEFAULT_MAX_RETRY_AFTER_SECONDS,
            match_threshold: 0.85,
            workspace_path: None,
            verify_command: None,
            allowed_command_prefixes: vec![
                "cargo".to_string(),
                "npm".to_string(),
                "pytest".to_string(),
                "python".to_string(),
                "go".to_string(),
                "make".to_string(),
            ],
            ignored_paths: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
                "__pycache__".to_string(),
                "venv".to_string(),
                ".venv".to_string(),
                "dist".to_string(),
                "build".to_string(),
            ],
            debug: false,
            providers: default_providers(),
        }
    }
}

impl Config {
    /// Fills values that are missing or unusable with defaults and adds back any default
    /// provider that is not configured.
    fn with_defaults(self) -> Self {
        let default_config = Config::default();

        let mut providers = self.providers;
        for (name, settings) in default_config.providers {
            providers.entry(name).or_insert(settings);
        }

        Config {
            active_provider: if providers.contains_key(&self.active_provider) {
                self.active_provider
            } else {
                default_config.active_provider
            },
            system_prompt: if self.system_prompt.trim().is_empty() {
                default_config.system_prompt
            } else {
                self.system_prompt
            },
            max_iterations: if self.max_iterations == 0 {
                default_config.max_iterations
            } else {
                self.max_iterations
            },
            provider_timeout_seconds: if self.provider_timeout_seconds == 0 {
                default_config.provider_timeout_seconds
            } else {
                self.provider_timeout_seconds
            },
            verify_timeout_seconds: if self.verify_timeout_seconds == 0 {
                default_config.verify_timeout_seconds
            } else {
                self.verify_timeout_seconds
            },
            max_retries: self.max_retries,
            retry_base_delay_ms: if self.retry_base_delay_ms == 0 {
                default_config.retry_base_delay_ms
            } else {
                self.retry_base_delay_ms
            },
            max_retry_after_seconds: if self.max_retry_after_seconds == 0 {
                default_config.max_retry_after_seconds
            } else {
                self.max_retry_after_seconds
            },
            match_threshold: if self.match_threshold > 0.0 && self.match_threshold <= 1.0 {
                self.match_threshold
            } else {
                default_config.match_threshold
            },
            workspace_path: self.workspace_path,
            verify_command: self.verify_command.filter(|c| !c.trim().is_empty()),
            allowed_command_prefixes: self.allowed_command_prefixes,
            ignored_paths: if self.ignored_paths.is_empty() {
                default_config.ignored_paths
            } else {
                self.ignored_paths
            },
            debug: self.debug,
            providers,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn active_settings(&self) -> Result<&ProviderSettings> {
        self.providers.get(&self.active_provider).ok_or_else(|| {
            anyhow!(
                "Unknown provider '{}'. Known providers: {}",
                self.active_provider,
                self.provider_names().join(", ")
            )
        })
    }

    pub fn active_settings_mut(&mut self) -> Result<&mut ProviderSettings> {
        let name = self.active_provider.clone();
        let known = self.provider_names().join(", ");
        self.providers
            .get_mut(&name)
            .ok_or_else(|| anyhow!("Unknown provider '{name}'. Known providers: {known}"))
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_retry_after: Duration::from_secs(self.max_retry_after_seconds),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            max_iterations: self.max_iterations,
            instructions: self.system_prompt.clone(),
            debug: self.debug,
        }
    }

    pub fn editor(&self) -> FuzzyEditor {
        FuzzyEditor::new(self.match_threshold as f32)
    }

    pub fn verify_settings(&self) -> VerifySettings {
        VerifySettings {
            default_command: self.verify_command.clone(),
            allowed_command_prefixes: self.allowed_command_prefixes.clone(),
            timeout: Duration::from_secs(self.verify_timeout_seconds),
            ..VerifySettings::default()
        }
    }

    pub fn tool_context(&self, workspace: Option<Workspace>) -> ToolContext {
        ToolContext {
            workspace,
            editor: self.editor(),
            verify: self.verify_settings(),
        }
    }

    /// Opens `path` as a workspace with the configured ignore globs.
    pub fn open_workspace(&self, path: &Path) -> Result<Workspace> {
        let workspace = Workspace::open(path).map_err(|e| anyhow!("{e}"))?;
        Ok(workspace.with_ignored_paths(self.ignored_paths.clone()))
    }
}

/// `$XDG_CONFIG_HOME/autoedit/config.toml`.
pub fn default_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::new();
    let config_path = xdg_dirs.place_config_file("autoedit/config.toml")?;
    Ok(config_path)
}

pub fn load_or_create(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        let default_config = Config::default();
        default_config.save(config_path)?;

        println!("Created default config at: {}", config_path.display());
        return Ok(default_config);
    }

    let config_string = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config from '{}'", config_path.display()))?;
    let config: Config = toml::from_str(&config_string)
        .with_context(|| format!("Invalid config file '{}'", config_path.display()))?;
    let final_config = config.with_defaults();

    // If any values were missing, we can write the complete config back to the file
    // This makes it easy for users to see all available options.
    let final_toml_string = toml::to_string_pretty(&final_config)?;
    if final_toml_string != config_string {
        fs::write(config_path, final_toml_string)?;
    }

    Ok(final_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = Builder::new().prefix("autoedit-config").tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = load_or_create(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = load_or_create(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_missing_values_and_providers_are_filled_in() {
        let dir = Builder::new().prefix("autoedit-config").tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
active_provider = "mine"
max_iterations = 4

[providers.mine]
kind = "openai_compatible"
base_url = "http://localhost:8080/v1/"
model = "tiny"
"#,
        )
        .unwrap();

        let config = load_or_create(&path).unwrap();
        assert_eq!(config.active_provider, "mine");
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(config.providers.contains_key("ollama"));
        assert!(config.providers.contains_key("google"));
        assert_eq!(config.active_settings().unwrap().model, "tiny");

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("[providers.lmstudio]"));
    }

    #[test]
    fn test_unknown_active_provider_falls_back() {
        let config = Config {
            active_provider: "gone".to_string(),
            ..Config::default()
        }
        .with_defaults();
        assert_eq!(config.active_provider, DEFAULT_PROVIDER);
    }

    #[test]
    fn test_derived_settings() {
        let config = Config {
            match_threshold: 0.9,
            verify_command: Some("cargo check".to_string()),
            ..Config::default()
        };
        assert_eq!(config.editor().threshold(), 0.9);
        assert_eq!(config.loop_settings().max_iterations, 15);
        assert_eq!(
            config.verify_settings().default_command.as_deref(),
            Some("cargo check")
        );
        assert_eq!(config.retry_policy().max_retries, 3);
        assert_eq!(
            config.retry_policy().max_retry_after,
            Duration::from_secs(60)
        );
    }
}
