use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CliError;

/// Variables consulted when building the database configuration.
pub const DATABASE_VARS: [&str; 7] = [
    "DATABASE_URL",
    "DB_DRIVER",
    "MYSQL_HOST",
    "MYSQL_PORT",
    "MYSQL_USER",
    "MYSQL_PASSWORD",
    "MYSQL_DATABASE",
];

/// Process environment overlaid with an optional `.env` file.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
    sensitive_patterns: Vec<String>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self {
            vars: std::env::vars().collect(),
            sensitive_patterns: Self::default_sensitive_patterns(),
        }
    }

    fn empty() -> Self {
        Self {
            vars: HashMap::new(),
            sensitive_patterns: Self::default_sensitive_patterns(),
        }
    }

    /// Loads a .env file; its values override the process environment.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// The database variables that are set, with secrets masked. Meant for
    /// logging the effective configuration.
    pub fn database_summary(&self) -> Vec<(String, String)> {
        DATABASE_VARS
            .iter()
            .filter_map(|key| {
                self.vars.get(*key).map(|value| {
                    let shown = if self.is_sensitive(key) {
                        "***".to_string()
                    } else {
                        value.clone()
                    };
                    (key.to_string(), shown)
                })
            })
            .collect()
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        // A URL may embed credentials.
        key.ends_with("_url")
            || self
                .sensitive_patterns
                .iter()
                .any(|pattern| key.contains(pattern.as_str()))
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Config(format!(
                    "Invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }

        value.to_string()
    }

    fn default_sensitive_patterns() -> Vec<String> {
        ["password", "passwd", "secret", "token", "credential"]
            .iter()
            .map(|p| p.to_string())
            .collect()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}
