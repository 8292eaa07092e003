use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars, expand_tilde};
use std::path::Path;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config from YAML text.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars_outside_comments(yaml)?;
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Expands `$env{...}` on every line except full-line `#` comments, which are
/// kept verbatim.
fn expand_env_vars_outside_comments(yaml: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(yaml.len());
    for line in yaml.split_inclusive('\n') {
        if is_comment_line(line) {
            expanded.push_str(line);
        } else {
            expanded.push_str(&expand_env_vars(line)?);
        }
    }
    Ok(expanded)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = env_var_pattern()?;
    let mut unexpanded_vars: Vec<String> = yaml_string
        .lines()
        .filter(|line| !is_comment_line(line))
        .flat_map(|line| re.captures_iter(line))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}",
        unexpanded_vars.join(", ")
    )))
}

fn expand_paths(config: &mut Config) {
    config.source.path = expand_tilde(&config.source.path);
    config.cursor.path = expand_tilde(&config.cursor.path);
    if let Some(dir) = &config.service.log_dir {
        config.service.log_dir = Some(expand_tilde(dir));
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_source(&config.source, &mut errors);
    validate_dispatch(&config.dispatch, &mut errors);

    if config.cursor.path.as_os_str().is_empty() {
        errors.push("cursor.path cannot be empty".to_string());
    }
    if config.service.log_level.parse::<LevelFilter>().is_err() {
        errors.push(format!(
            "service.log_level: unknown level '{}'",
            config.service.log_level
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_source(source: &SourceConfig, errors: &mut Vec<String>) {
    if source.path.as_os_str().is_empty() {
        errors.push("source.path cannot be empty".to_string());
    }
    if source.interval.is_zero() {
        errors.push("source.interval must be greater than zero".to_string());
    }
    if let Err(e) = source.start_time() {
        errors.push(format!("source.start_time: {}", e));
    }
    if source.utc_offset.is_some() {
        if let Err(e) = source.utc_offset() {
            errors.push(format!("source.utc_offset: {}", e));
        }
    }
}

fn validate_dispatch(dispatch: &DispatchConfig, errors: &mut Vec<String>) {
    if dispatch.push_url.is_empty() {
        errors.push("dispatch.push_url cannot be empty".to_string());
    } else {
        match reqwest::Url::parse(&dispatch.push_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "dispatch.push_url: unsupported scheme '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("dispatch.push_url: {}", e)),
        }
    }
    if dispatch.batch_wait.is_zero() {
        errors.push("dispatch.batch_wait must be greater than zero".to_string());
    }
    if dispatch.batch_size == 0 {
        errors.push("dispatch.batch_size must be greater than zero".to_string());
    }
    if dispatch.queue_capacity == 0 {
        errors.push("dispatch.queue_capacity must be greater than zero".to_string());
    }
    for (name, _) in dispatch.labels.iter().filter(|(name, _)| name.is_empty()) {
        errors.push(format!("dispatch.labels: empty label name '{}'", name));
    }
}
