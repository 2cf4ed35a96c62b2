use log::debug;
use std::env;
use thiserror::Error;

pub const PROMPT_VAR: &str = "MALISP_PROMPT";
pub const HISTORY_VAR: &str = "MALISP_HISTORY";
pub const EDIT_MODE_VAR: &str = "MALISP_EDIT_MODE";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown edit mode '{0}', expected 'vi' or 'emacs'")]
    UnknownEditMode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Vi,
    Emacs,
}

impl EditMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "vi" => Ok(EditMode::Vi),
            "emacs" => Ok(EditMode::Emacs),
            _ => Err(ConfigError::UnknownEditMode(value.to_string())),
        }
    }
}

/// Settings for the interactive REPL.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplConfig {
    pub prompt: String,
    pub history_file: String,
    pub edit_mode: EditMode,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            prompt: "user> ".to_string(),
            history_file: "malisp_history.txt".to_string(),
            edit_mode: EditMode::Vi,
        }
    }
}

impl ReplConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        ReplConfig::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from the defaults and whatever `lookup` finds for
    /// each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ReplConfig::default();
        if let Some(prompt) = lookup(PROMPT_VAR) {
            config.prompt = prompt;
        }
        if let Some(history_file) = lookup(HISTORY_VAR) {
            config.history_file = history_file;
        }
        if let Some(edit_mode) = lookup(EDIT_MODE_VAR).as_deref() {
            config.edit_mode = EditMode::parse(edit_mode)?;
        }
        debug!("loaded {:?}", config);
        Ok(config)
    }
}
