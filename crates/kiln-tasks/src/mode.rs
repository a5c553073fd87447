//! Development/production mode switch.

use std::fmt;

/// The invocation keyword that selects a production build.
pub const BUILD_KEYWORD: &str = "build";

/// Build mode, fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Fast, debuggable output (source maps, pass-through images).
    #[default]
    Development,

    /// Optimized output.
    Production,
}

impl Mode {
    /// Derive the mode from the first positional argument.
    ///
    /// Only the literal [`BUILD_KEYWORD`] selects production; anything else,
    /// including no argument at all, is development.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some(BUILD_KEYWORD) => Mode::Production,
            _ => Mode::Development,
        }
    }

    pub fn is_development(self) -> bool {
        self == Mode::Development
    }

    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_build_keyword_selects_production() {
        assert_eq!(Mode::from_arg(Some("build")), Mode::Production);
        assert_eq!(Mode::from_arg(None), Mode::Development);
        assert_eq!(Mode::from_arg(Some("styles")), Mode::Development);
        assert_eq!(Mode::from_arg(Some("Build")), Mode::Development);
    }

    #[test]
    fn branches_are_exclusive() {
        for mode in [Mode::Development, Mode::Production] {
            assert_ne!(mode.is_development(), mode.is_production());
        }
    }
}
