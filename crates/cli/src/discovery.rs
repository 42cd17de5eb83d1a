//! Config file discovery logic.

use std::path::{Path, PathBuf};

use aedris_core::config::DEFAULT_CONFIG_FILE;
use miette::{Result, miette};

/// Finds the config by searching from the project directory upwards.
///
/// Absolute config paths are returned as they are.
pub fn find_config(project_dir: Option<&Path>, config_name: Option<&Path>) -> Result<PathBuf> {
    let config_name = config_name.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    if config_name.is_absolute() {
        return Ok(config_name.to_path_buf());
    }

    let start = match project_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().map_err(|e| miette!("Cannot get current directory: {}", e))?,
    };

    find_config_from(&start, config_name)
}

/// Finds `config_name` starting from the given directory.
pub fn find_config_from(start: &Path, config_name: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config = current.join(config_name);

        if config.is_file() {
            return Ok(config);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => {
                return Err(miette!(
                    "{} not found in {} or any parent directory",
                    config_name.display(),
                    start.display()
                ));
            }
        }
    }
}
