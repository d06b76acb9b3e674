//! TOML loading for [`LibraryConfig`].
//!
//! File format:
//!
//! ```toml
//! [functions.memcpy]
//! pure = false
//! arg-directions = ["out", "in", "in"]
//!
//! container-mutating = ["insert", "erase"]
//! container-observing = ["size", "empty"]
//! ```

use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use super::LibraryConfig;
use crate::core::{Error, Result};

/// Pure function to read a configuration file's contents
pub(crate) fn read_config_file(path: &Path) -> std::io::Result<String> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Pure function to parse library tables from a TOML string
pub fn parse_library_config(contents: &str) -> Result<LibraryConfig> {
    toml::from_str::<LibraryConfig>(contents)
        .map_err(|e| Error::Library(format!("failed to parse library tables: {}", e)))
}

/// Load tables from `path`, merged over the built-in defaults.
pub fn load_from_path(path: &Path) -> Result<LibraryConfig> {
    let contents = read_config_file(path).map_err(|e| {
        Error::Library(format!("failed to read {}: {}", path.display(), e))
    })?;
    let extra = parse_library_config(&contents)?;
    let mut config = LibraryConfig::default();
    config.merge(extra);
    log::debug!("Loaded library tables from {}", path.display());
    Ok(config)
}

/// Load tables from `path` if it exists, falling back to the defaults.
pub fn load_or_default(path: &Path) -> LibraryConfig {
    match load_from_path(path) {
        Ok(config) => config,
        Err(e) => {
            if path.exists() {
                log::warn!("{}. Using built-in library tables.", e);
            } else {
                log::debug!(
                    "No library tables at {}. Using built-in defaults.",
                    path.display()
                );
            }
            LibraryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ArgDirection, ContainerAction};
    use std::io::Write;

    #[test]
    fn parses_function_tables() {
        let toml = r#"
            [functions.my_write]
            arg-directions = ["out", "in"]

            [functions.my_hash]
            pure = true
        "#;
        let config = parse_library_config(toml).unwrap();
        assert_eq!(
            config.arg_direction("my_write", 0),
            Some(ArgDirection::Out)
        );
        assert!(config.is_pure_function("my_hash"));
    }

    #[test]
    fn parses_container_tables() {
        let toml = r#"
            container-mutating = ["append"]
            container-observing = ["peek"]
        "#;
        let config = parse_library_config(toml).unwrap();
        assert_eq!(
            config.container_action("append"),
            Some(ContainerAction::Mutating)
        );
        assert_eq!(
            config.container_action("peek"),
            Some(ContainerAction::Observing)
        );
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(parse_library_config("functions = 3").is_err());
    }

    #[test]
    fn load_merges_over_builtins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[functions.custom_fill]").unwrap();
        writeln!(file, "arg-directions = [\"out\"]").unwrap();
        let config = load_from_path(file.path()).unwrap();
        // Built-ins survive the merge
        assert!(config.is_pure_function("strlen"));
        assert_eq!(
            config.arg_direction("custom_fill", 0),
            Some(ArgDirection::Out)
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_or_default(Path::new("/nonexistent/astflow.toml"));
        assert!(config.is_pure_function("abs"));
    }
}
