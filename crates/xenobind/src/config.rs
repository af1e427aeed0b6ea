//! Startup configuration.

use std::path::Path;
use std::path::PathBuf;

use crate::error::Error;
use crate::error::Result;

pub const LIBRARY_VAR: &str = "XENOBIND_LIBRARY";
pub const OPTIONS_VAR: &str = "XENOBIND_OPTIONS";

/// Where the runtime library lives and what to pass it.
///
/// ```ignore
/// let config = StartConfig::new("/opt/runtime/libjvm.so")
///     .property("app.mode", "test")
///     .option("-verbose:class");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartConfig {
    library: PathBuf,
    options: Vec<String>,
}

impl StartConfig {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Adds a `-Dkey=value` system property.
    pub fn property(self, key: &str, value: &str) -> Self {
        self.option(format!("-D{}={}", key, value))
    }

    /// Reads `XENOBIND_LIBRARY` and the whitespace-separated `XENOBIND_OPTIONS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let library = lookup(LIBRARY_VAR)
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::Startup(format!("{} is not set", LIBRARY_VAR)))?;
        let options = lookup(OPTIONS_VAR)
            .map(|o| o.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Ok(Self {
            library: PathBuf::from(library),
            options,
        })
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }
}
