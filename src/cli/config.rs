use crate::config::generate::generate_starter_config;
use crate::config::user_config_path;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("cannot determine home directory")]
    NoHomeDir,

    #[error("config file already exists at {0}\nRemove it first or use --stdout to print the config")]
    AlreadyExists(PathBuf),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn init(stdout: bool) -> Result<(), InitError> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = user_config_path().ok_or(InitError::NoHomeDir)?;
    write_config(&config_path, &config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

/// Write `content` to `path`, creating parent directories. Refuses to
/// overwrite an existing file.
pub fn write_config(path: &Path, content: &str) -> Result<(), InitError> {
    if path.exists() {
        return Err(InitError::AlreadyExists(path.to_path_buf()));
    }

    let write_err = |source| InitError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, content).map_err(write_err)
}
