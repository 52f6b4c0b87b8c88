//! Configuration management for CLI tools.
//!
//! Configuration is stored in ~/.rtcvoice/{app_name}/config.yaml

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".rtcvoice";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application name (not serialized).
    #[serde(skip)]
    pub app_name: String,

    /// Name of the currently active context.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_context: String,

    /// Map of context name to context configuration.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub contexts: HashMap<String, Context>,

    /// Path to the config file (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

/// A single session context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// Context name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Base address of the trusted credential backend.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_base: String,

    /// Realtime model identifier (optional, uses default if empty).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,

    /// Negotiation endpoint URL (optional, uses default if empty).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realtime_url: String,

    /// Greeting instructions (optional). `Some("")` disables the greeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,

    /// Request timeout in seconds (optional).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Config {
    /// Gets the default config directory.
    pub fn default_config_dir(app_name: &str) -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(app_name))
    }

    /// Gets the default config file path.
    pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
        Self::default_config_dir(app_name).map(|dir| dir.join(DEFAULT_CONFIG_FILE))
    }

    /// Returns the config file path.
    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Saves the configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Adds a new context, replacing one with the same name.
    pub fn add_context(&mut self, name: &str, mut ctx: Context) -> anyhow::Result<()> {
        if ctx.api_base.is_empty() {
            anyhow::bail!("context '{}' needs an api_base", name);
        }
        ctx.name = name.to_string();
        self.contexts.insert(name.to_string(), ctx);
        self.save()
    }

    /// Deletes a context.
    pub fn delete_context(&mut self, name: &str) -> anyhow::Result<()> {
        if self.contexts.remove(name).is_none() {
            anyhow::bail!("context '{}' not found", name);
        }
        if self.current_context == name {
            self.current_context.clear();
        }
        self.save()
    }

    /// Sets the current context.
    pub fn use_context(&mut self, name: &str) -> anyhow::Result<()> {
        if !self.contexts.contains_key(name) {
            anyhow::bail!("context '{}' not found", name);
        }
        self.current_context = name.to_string();
        self.save()
    }

    pub fn get_context(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    /// Gets the current context.
    pub fn get_current_context(&self) -> Option<&Context> {
        if self.current_context.is_empty() {
            return None;
        }
        self.contexts.get(&self.current_context)
    }

    /// Resolves the context by name, or current context if name is empty.
    pub fn resolve_context(&self, name: Option<&str>) -> Option<&Context> {
        match name {
            Some(n) if !n.is_empty() => self.get_context(n),
            _ => self.get_current_context(),
        }
    }

    /// Lists all context names, sorted.
    pub fn list_contexts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contexts.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Loads configuration for the specified app.
///
/// A missing file is created empty.
pub fn load_config(app_name: &str, custom_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path(app_name)
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cfg = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)?
        }
    } else {
        let cfg = Config::default();
        std::fs::write(&config_path, serde_yaml::to_string(&cfg)?)?;
        cfg
    };

    cfg.app_name = app_name.to_string();
    cfg.config_path = config_path;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &tempfile::TempDir) -> Config {
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE);
        load_config("rtcvoice", path.to_str()).unwrap()
    }

    fn local_context() -> Context {
        Context {
            api_base: "http://localhost:8000".to_string(),
            model: "gpt-4o-realtime-preview".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = temp_config(&dir);
        assert!(cfg.path().exists());
        assert_eq!(cfg.app_name, "rtcvoice");
        assert!(cfg.contexts.is_empty());
    }

    #[test]
    fn test_context_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = temp_config(&dir);

        cfg.add_context("local", local_context()).unwrap();
        cfg.add_context(
            "prod",
            Context {
                api_base: "https://voice.example.com".to_string(),
                greeting: Some(String::new()),
                timeout: 10,
                ..Default::default()
            },
        )
        .unwrap();
        cfg.use_context("local").unwrap();

        let reloaded = temp_config(&dir);
        assert_eq!(reloaded.list_contexts(), vec!["local", "prod"]);
        assert_eq!(reloaded.current_context, "local");
        assert_eq!(reloaded.resolve_context(None).unwrap().name, "local");
        let prod = reloaded.resolve_context(Some("prod")).unwrap();
        assert_eq!(prod.greeting.as_deref(), Some(""));
        assert_eq!(prod.timeout, 10);

        cfg.delete_context("local").unwrap();
        assert!(cfg.current_context.is_empty());
        assert!(cfg.resolve_context(None).is_none());
    }

    #[test]
    fn test_unknown_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = temp_config(&dir);
        assert!(cfg.use_context("missing").is_err());
        assert!(cfg.delete_context("missing").is_err());
        assert!(cfg.add_context("empty", Context::default()).is_err());
    }

    #[test]
    fn test_optional_fields_omitted() {
        let yaml = serde_yaml::to_string(&local_context()).unwrap();
        assert!(yaml.contains("api_base"));
        assert!(!yaml.contains("timeout"));
        assert!(!yaml.contains("greeting"));
    }
}
