//! Compiler instance configuration
//!
//! Options can be built in code or read from the `[compiler]` table of a
//! `kiln.toml`:
//!
//! ```toml
//! [compiler]
//! classpath = ["lib", "/opt/kiln/classes"]
//! max_call_depth = 512
//! verify_bytecode = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound accepted for `max_call_depth`
pub const MAX_CALL_DEPTH_LIMIT: usize = 4096;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Options of one [`InMemoryCompiler`](crate::InMemoryCompiler)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    /// Directories holding precompiled `.kbc` images, searched in order after
    /// the instance's own artifacts
    pub classpath: Vec<PathBuf>,

    /// Maximum call nesting when invoking loaded types
    pub max_call_depth: usize,

    /// Verify bytecode when a type is defined
    pub verify_bytecode: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            max_call_depth: 256,
            verify_bytecode: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    compiler: CompilerOptions,
}

impl CompilerOptions {
    /// Read the `[compiler]` table of a config file
    ///
    /// Relative classpath entries are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut options = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            for entry in &mut options.classpath {
                if entry.is_relative() {
                    *entry = base.join(&*entry);
                }
            }
        }
        Ok(options)
    }

    /// Parse the `[compiler]` table of a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.compiler.validate()?;
        Ok(file.compiler)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 || self.max_call_depth > MAX_CALL_DEPTH_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "max_call_depth must be between 1 and {}, got {}",
                MAX_CALL_DEPTH_LIMIT, self.max_call_depth
            )));
        }
        if self.classpath.iter().any(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::ValidationError(
                "classpath entries cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Add a classpath directory
    pub fn with_classpath_entry(mut self, dir: impl Into<PathBuf>) -> Self {
        self.classpath.push(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::default();
        assert!(options.classpath.is_empty());
        assert_eq!(options.max_call_depth, 256);
        assert!(options.verify_bytecode);
    }

    #[test]
    fn test_parse_compiler_table() {
        let options = CompilerOptions::from_toml_str(
            r#"
            [compiler]
            classpath = ["lib", "/opt/classes"]
            max_call_depth = 64
            verify_bytecode = false
            "#,
        )
        .unwrap();
        assert_eq!(
            options.classpath,
            vec![PathBuf::from("lib"), PathBuf::from("/opt/classes")]
        );
        assert_eq!(options.max_call_depth, 64);
        assert!(!options.verify_bytecode);
    }

    #[test]
    fn test_missing_table_uses_defaults() {
        let options = CompilerOptions::from_toml_str("[other]\nkey = 1\n").unwrap();
        assert_eq!(options, CompilerOptions::default());
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let options = CompilerOptions::from_toml_str("[compiler]\nmax_call_depth = 10\n").unwrap();
        assert_eq!(options.max_call_depth, 10);
        assert!(options.verify_bytecode);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = CompilerOptions::from_toml_str("[compiler]\nmax_depth = 10\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_depth_validated() {
        let result = CompilerOptions::from_toml_str("[compiler]\nmax_call_depth = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
        let result = CompilerOptions::from_toml_str("[compiler]\nmax_call_depth = 100000\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_from_file_resolves_relative_classpath() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "[compiler]\nclasspath = [\"classes\", \"/abs\"]\n").unwrap();

        let options = CompilerOptions::from_file(&path).unwrap();
        assert_eq!(options.classpath[0], dir.path().join("classes"));
        assert_eq!(options.classpath[1], PathBuf::from("/abs"));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = CompilerOptions::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
