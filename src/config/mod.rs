pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{Config, CursorConfig, DispatchConfig, ServiceConfig, SourceConfig};

/// `$env{VAR_NAME}`: name starts with a letter or underscore.
pub(crate) fn env_var_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}")
}

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> Result<String, regex::Error> {
    let re = env_var_pattern()?;

    let expanded = re.replace_all(text, |caps: &regex::Captures| {
        let whole = &caps[0];
        std::env::var(&caps[1]).unwrap_or_else(|_| whole.to_string())
    });
    Ok(expanded.into_owned())
}

/// Expands tilde (~) in paths to the user's home directory.
/// Returns the path unchanged if it doesn't start with tilde or home directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Per-user config location, `~/.config/logtap/config.yml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/logtap/config.yml"))
}

/// Resolves the config file path based on explicit argument or default locations.
/// Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/logtap/config.yml
/// 3. /etc/logtap/config.yml
/// 4. ./config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    let candidates = user_config_path()
        .into_iter()
        .chain([
            PathBuf::from("/etc/logtap/config.yml"),
            PathBuf::from("config.yml"),
        ]);

    candidates.into_iter().find(|path| path.exists())
}
