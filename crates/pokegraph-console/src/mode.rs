//! Output mode detection.
//!
//! # Detection Priority
//!
//! The detection follows this priority order (first match wins):
//!
//! 1. `POKEGRAPH_QUIET=1` - Suppress regular output
//! 2. `POKEGRAPH_PLAIN=1` - Force plain output
//! 3. `POKEGRAPH_JSON=1` - Force JSON output
//! 4. `POKEGRAPH_RICH=1` - Force rich output
//! 5. `NO_COLOR` - Standard env var for disabling colors
//! 6. `CI=true` - CI environment detection
//! 7. `TERM=dumb` - Dumb terminal
//! 8. `!is_terminal(stdout)` - Piped or redirected output
//! 9. Default: Rich output

use std::env;
use std::io::IsTerminal;

/// Output mode for console rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum OutputMode {
    /// Plain text output, no ANSI codes. Machine-parseable.
    Plain,

    /// Colored output for interactive terminals.
    #[default]
    Rich,

    /// Structured JSON output for programmatic consumption.
    Json,

    /// Regular output suppressed; errors and progress still shown.
    ///
    /// The timing harness switches to this mode while it measures.
    Quiet,
}

impl OutputMode {
    /// Detect the appropriate output mode from the environment.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_with(|name| env::var(name).ok(), std::io::stdout().is_terminal())
    }

    /// Detection against an arbitrary variable lookup and terminal state.
    pub fn detect_with<F>(lookup: F, stdout_is_terminal: bool) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let truthy = |name: &str| lookup(name).is_some_and(|v| is_truthy(&v));

        if truthy("POKEGRAPH_QUIET") {
            return Self::Quiet;
        }
        if truthy("POKEGRAPH_PLAIN") {
            return Self::Plain;
        }
        if truthy("POKEGRAPH_JSON") {
            return Self::Json;
        }
        if truthy("POKEGRAPH_RICH") {
            return Self::Rich;
        }

        // https://no-color.org/
        if lookup("NO_COLOR").is_some() {
            return Self::Plain;
        }
        if truthy("CI") {
            return Self::Plain;
        }
        if lookup("TERM").is_some_and(|t| t == "dumb") {
            return Self::Plain;
        }
        if !stdout_is_terminal {
            return Self::Plain;
        }

        Self::Rich
    }

    /// Check if this mode should use ANSI escape codes.
    #[must_use]
    pub const fn supports_ansi(&self) -> bool {
        matches!(self, Self::Rich)
    }

    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Json)
    }

    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        matches!(self, Self::Quiet)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Rich => "rich",
            Self::Json => "json",
            Self::Quiet => "quiet",
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "rich" => Ok(Self::Rich),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            other => Err(format!(
                "unknown output mode '{other}' (expected plain, rich, json or quiet)"
            )),
        }
    }
}

/// Recognizes: `1`, `true`, `yes`, `on` (case-insensitive).
fn is_truthy(value: &str) -> bool {
    let v = value.to_lowercase();
    v == "1" || v == "true" || v == "yes" || v == "on"
}
