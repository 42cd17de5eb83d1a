//! Build environment passed explicitly to every component.

use serde::{Deserialize, Serialize};

/// Environment variable selecting the build mode.
pub const ENV_MODE: &str = "AEDRIS_ENV";

/// Fallback environment variable selecting the build mode.
pub const ENV_NODE_MODE: &str = "NODE_ENV";

/// Environment variable that turns output cleaning into a dry run.
pub const ENV_SIMULATE: &str = "AEDRIS_SIMULATE";

/// Build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Returns the mode name as the compiler expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

/// Immutable switches that used to be read from the process environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildEnvironment {
    /// Development or production build.
    pub mode: Mode,

    /// Only log what output cleaning would remove.
    pub simulate: bool,
}

impl BuildEnvironment {
    /// A development environment without simulation.
    pub fn development() -> Self {
        Self::default()
    }

    /// A production environment without simulation.
    pub fn production() -> Self {
        Self {
            mode: Mode::Production,
            simulate: false,
        }
    }

    /// Reads the environment once from the process.
    pub fn from_env() -> Self {
        let mode = std::env::var(ENV_MODE)
            .or_else(|_| std::env::var(ENV_NODE_MODE))
            .ok();
        let simulate = std::env::var(ENV_SIMULATE).ok();

        Self::from_vars(mode.as_deref(), simulate.as_deref())
    }

    /// Builds an environment from raw variable values.
    pub fn from_vars(mode: Option<&str>, simulate: Option<&str>) -> Self {
        let mode = match mode {
            Some(value) if value.trim().eq_ignore_ascii_case("production") => Mode::Production,
            _ => Mode::Development,
        };

        let simulate = simulate
            .map(|value| {
                let value = value.trim();
                !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
            })
            .unwrap_or(false);

        Self { mode, simulate }
    }

    /// Sets the simulate flag.
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn is_development(&self) -> bool {
        self.mode == Mode::Development
    }

    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults_to_development() {
        let env = BuildEnvironment::from_vars(None, None);
        assert!(env.is_development());
        assert!(!env.simulate);
    }

    #[test]
    fn test_from_vars_production() {
        let env = BuildEnvironment::from_vars(Some("production"), None);
        assert!(env.is_production());

        let env = BuildEnvironment::from_vars(Some("staging"), None);
        assert!(env.is_development());
    }

    #[test]
    fn test_from_vars_simulate() {
        assert!(BuildEnvironment::from_vars(None, Some("1")).simulate);
        assert!(BuildEnvironment::from_vars(None, Some("yes")).simulate);
        assert!(!BuildEnvironment::from_vars(None, Some("0")).simulate);
        assert!(!BuildEnvironment::from_vars(None, Some("false")).simulate);
        assert!(!BuildEnvironment::from_vars(None, Some("")).simulate);
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let json = serde_json::to_string(&Mode::Production).unwrap();
        assert_eq!(json, "\"production\"");
        assert_eq!(Mode::Development.as_str(), "development");
    }
}
