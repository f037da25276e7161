use crate::patterns::{LogPattern, PatternError, PatternFamily};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "logtally.toml";

/// Top-level configuration loaded from logtally.toml.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LogtallyConfig {
    pub report: ReportConfig,
    pub patterns: PatternOverrides,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Maximum rows printed; 0 means unlimited. Unset falls back to a
    /// per-report default.
    pub max_rows: Option<usize>,
    /// Width of the key column before truncation.
    pub max_width: usize,
    /// Key column width for SQL statements, which run long.
    pub sql_max_width: usize,
    pub descending: bool,
}

/// Replacement grammars, one optional regex per family.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PatternOverrides {
    pub generic: Option<String>,
    pub syslog: Option<String>,
    pub systemd_http: Option<String>,
    pub systemd_sql: Option<String>,
    pub test_runner: Option<String>,
}

// --- Default implementations ---

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_rows: None,
            max_width: 100,
            sql_max_width: 250,
            descending: true,
        }
    }
}

impl PatternOverrides {
    pub fn get(&self, family: PatternFamily) -> Option<&str> {
        match family {
            PatternFamily::Generic => self.generic.as_deref(),
            PatternFamily::Syslog => self.syslog.as_deref(),
            PatternFamily::SystemdHttp => self.systemd_http.as_deref(),
            PatternFamily::SystemdSql => self.systemd_sql.as_deref(),
            PatternFamily::TestRunner => self.test_runner.as_deref(),
        }
    }

    /// Compile the active pattern for a family: the override when one is
    /// configured, otherwise the built-in grammar.
    pub fn resolve(&self, family: PatternFamily) -> Result<LogPattern, PatternError> {
        match self.get(family) {
            Some(source) => {
                tracing::debug!(family = %family, "using pattern override from config");
                family.compile_from(source)
            }
            None => family.compile(),
        }
    }

    /// Compile every configured override so a broken one fails the run up
    /// front, whichever report was asked for.
    pub fn validate(&self) -> Result<(), PatternError> {
        for family in PatternFamily::ALL {
            if self.get(family).is_some() {
                self.resolve(family)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load config from `path`.
///
/// A missing file yields defaults unless `required` is set (the user named
/// the file explicitly). A file that exists but cannot be read or parsed is
/// always an error.
pub fn load_config(path: &Path, required: bool) -> Result<LogtallyConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(LogtallyConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
