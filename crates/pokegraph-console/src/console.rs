//! Console - coordinator for all user-facing output.
//!
//! # Stream Separation
//!
//! - `print()`, `print_json()` → stdout (data)
//! - `status()`, `success()`, `error()`, `rule()`, `progress()` → stderr
//!
//! # Quiet Mode
//!
//! In [`OutputMode::Quiet`] everything except `error()` and `progress()`
//! is dropped. [`Console::quiet_scope`] switches to quiet mode until the
//! returned guard is dropped, then restores whatever mode was active.
//!
//! # Example
//!
//! ```rust
//! use pokegraph_console::{Console, OutputMode};
//!
//! let console = Console::with_mode(OutputMode::Plain);
//! {
//!     let _quiet = console.quiet_scope();
//!     console.print("not shown");
//! }
//! console.success("back to plain output");
//! ```

use crate::mode::OutputMode;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

const GREEN: &str = "\x1b[32m";
const RED_BOLD: &str = "\x1b[1;31m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Output captured by a [`Console::capturing`] console.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Shared handle to captured output.
#[derive(Debug, Clone, Default)]
pub struct Capture(Rc<RefCell<CapturedOutput>>);

impl Capture {
    pub fn stdout(&self) -> String {
        self.0.borrow().stdout.clone()
    }

    pub fn stderr(&self) -> String {
        self.0.borrow().stderr.clone()
    }

    pub fn clear(&self) {
        let mut out = self.0.borrow_mut();
        out.stdout.clear();
        out.stderr.clear();
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Std,
    Capture(Capture),
}

#[derive(Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// Main coordinator for console output.
///
/// The mode lives in a `Cell` so a shared `&Console` can be switched into
/// quiet mode for the duration of a measurement.
#[derive(Debug)]
pub struct Console {
    mode: Cell<OutputMode>,
    plain_width: usize,
    sink: Sink,
}

impl Console {
    /// Create a new console with auto-detected mode.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(OutputMode::detect())
    }

    #[must_use]
    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode: Cell::new(mode),
            plain_width: 80,
            sink: Sink::Std,
        }
    }

    /// A console that records output instead of writing to the terminal.
    #[must_use]
    pub fn capturing(mode: OutputMode) -> (Self, Capture) {
        let capture = Capture::default();
        let console = Self {
            mode: Cell::new(mode),
            plain_width: 80,
            sink: Sink::Capture(capture.clone()),
        };
        (console, capture)
    }

    /// Builder method to set the width of rules.
    #[must_use]
    pub fn plain_width(mut self, width: usize) -> Self {
        self.plain_width = width;
        self
    }

    #[must_use]
    pub fn mode(&self) -> OutputMode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: OutputMode) {
        self.mode.set(mode);
    }

    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.mode().is_quiet()
    }

    /// Switch to quiet mode until the guard is dropped.
    #[must_use = "quiet mode ends when the guard is dropped"]
    pub fn quiet_scope(&self) -> QuietGuard<'_> {
        let previous = self.mode.replace(OutputMode::Quiet);
        QuietGuard {
            console: self,
            previous,
        }
    }

    fn write_line(&self, stream: Stream, line: &str) {
        match (&self.sink, stream) {
            (Sink::Std, Stream::Out) => println!("{line}"),
            (Sink::Std, Stream::Err) => eprintln!("{line}"),
            (Sink::Capture(capture), stream) => {
                let mut out = capture.0.borrow_mut();
                let target = match stream {
                    Stream::Out => &mut out.stdout,
                    Stream::Err => &mut out.stderr,
                };
                target.push_str(line);
                target.push('\n');
            }
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.mode().supports_ansi() {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    // =========================================================================
    // Basic Output Methods
    // =========================================================================

    /// Print a line of data to stdout.
    ///
    /// In JSON mode regular prints go to stderr to keep stdout clean.
    pub fn print(&self, message: &str) {
        match self.mode() {
            OutputMode::Quiet => {}
            OutputMode::Json => self.write_line(Stream::Err, message),
            OutputMode::Plain | OutputMode::Rich => self.write_line(Stream::Out, message),
        }
    }

    /// Print an informational line to stderr.
    pub fn status(&self, message: &str) {
        if !self.is_quiet() {
            let line = self.paint(DIM, message);
            self.write_line(Stream::Err, &line);
        }
    }

    /// Print a success message (green with checkmark).
    pub fn success(&self, message: &str) {
        self.print_styled_status(message, GREEN, "\u{2713}");
    }

    /// Print an error message (red with X). Shown even in quiet mode.
    pub fn error(&self, message: &str) {
        let line = match self.mode() {
            OutputMode::Plain | OutputMode::Quiet => format!("error: {message}"),
            OutputMode::Rich => self.paint(RED_BOLD, &format!("\u{2717} {message}")),
            OutputMode::Json => format!("\u{2717} {message}"),
        };
        self.write_line(Stream::Err, &line);
    }

    fn print_styled_status(&self, message: &str, color: &str, icon: &str) {
        match self.mode() {
            OutputMode::Quiet => {}
            OutputMode::Rich => {
                let line = self.paint(color, &format!("{icon} {message}"));
                self.write_line(Stream::Err, &line);
            }
            OutputMode::Plain => self.write_line(Stream::Err, message),
            OutputMode::Json => self.write_line(Stream::Err, &format!("{icon} {message}")),
        }
    }

    /// Out-of-band progress line. Never suppressed.
    pub fn progress(&self, completed: usize, total: usize) {
        let line = format!("{completed}/{total}");
        let line = self.paint(CYAN, &line);
        self.write_line(Stream::Err, &line);
    }

    /// Print a horizontal rule, optionally with a centered title.
    pub fn rule(&self, title: Option<&str>) {
        if self.is_quiet() {
            return;
        }
        let width = self.plain_width;
        let line = match title {
            Some(t) => {
                let title_len = t.chars().count();
                if title_len + 4 >= width {
                    format!("-- {t} --")
                } else {
                    let padding = (width - title_len - 2) / 2;
                    let right_padding = width - padding - title_len - 2;
                    format!("{} {t} {}", "-".repeat(padding), "-".repeat(right_padding))
                }
            }
            None => "-".repeat(width),
        };
        self.write_line(Stream::Err, &line);
    }

    // =========================================================================
    // JSON Output
    // =========================================================================

    /// Output compact JSON to stdout.
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<(), serde_json::Error> {
        if self.is_quiet() {
            return Ok(());
        }
        let json = serde_json::to_string(value)?;
        self.write_line(Stream::Out, &json);
        Ok(())
    }

    /// Output pretty-printed JSON to stdout.
    pub fn print_json_pretty<T: serde::Serialize>(
        &self,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        if self.is_quiet() {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(value)?;
        self.write_line(Stream::Out, &json);
        Ok(())
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the console's previous mode on drop.
pub struct QuietGuard<'a> {
    console: &'a Console,
    previous: OutputMode,
}

impl QuietGuard<'_> {
    /// The mode that will be restored.
    pub fn previous(&self) -> OutputMode {
        self.previous
    }
}

impl Drop for QuietGuard<'_> {
    fn drop(&mut self) {
        self.console.set_mode(self.previous);
    }
}

impl fmt::Debug for QuietGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuietGuard")
            .field("previous", &self.previous)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_goes_to_stdout_in_plain() {
        let (console, out) = Console::capturing(OutputMode::Plain);
        console.print("Ash owns Pikachu");
        console.status("loading");
        assert_eq!(out.stdout(), "Ash owns Pikachu\n");
        assert_eq!(out.stderr(), "loading\n");
    }

    #[test]
    fn test_json_mode_keeps_stdout_for_json() {
        let (console, out) = Console::capturing(OutputMode::Json);
        console.print("chatter");
        console.print_json(&serde_json::json!({"wins": 3})).unwrap();
        assert_eq!(out.stdout(), "{\"wins\":3}\n");
        assert_eq!(out.stderr(), "chatter\n");
    }

    #[test]
    fn test_quiet_suppresses_all_but_errors_and_progress() {
        let (console, out) = Console::capturing(OutputMode::Quiet);
        console.print("data");
        console.status("status");
        console.success("done");
        console.rule(Some("title"));
        console.print_json(&1).unwrap();
        assert!(out.stdout().is_empty());
        assert!(out.stderr().is_empty());

        console.progress(10, 100);
        console.error("boom");
        assert_eq!(out.stderr(), "10/100\nerror: boom\n");
    }

    #[test]
    fn test_quiet_scope_restores_previous_mode() {
        let (console, out) = Console::capturing(OutputMode::Rich);
        {
            let guard = console.quiet_scope();
            assert_eq!(guard.previous(), OutputMode::Rich);
            assert!(console.is_quiet());
            console.print("hidden");
        }
        assert_eq!(console.mode(), OutputMode::Rich);
        console.print("visible");
        assert_eq!(out.stdout(), "visible\n");
    }

    #[test]
    fn test_nested_quiet_scopes() {
        let console = Console::with_mode(OutputMode::Plain);
        let outer = console.quiet_scope();
        {
            let inner = console.quiet_scope();
            assert_eq!(inner.previous(), OutputMode::Quiet);
        }
        assert!(console.is_quiet());
        drop(outer);
        assert_eq!(console.mode(), OutputMode::Plain);
    }

    #[test]
    fn test_rich_success_is_colored() {
        let (console, out) = Console::capturing(OutputMode::Rich);
        console.success("ok");
        assert_eq!(out.stderr(), format!("{GREEN}\u{2713} ok{RESET}\n"));
    }

    #[test]
    fn test_rule_centers_title() {
        let (console, out) = Console::capturing(OutputMode::Plain);
        let console = console.plain_width(20);
        console.rule(Some("Lazy"));
        let line = out.stderr();
        assert_eq!(line.trim_end().chars().count(), 20);
        assert!(line.contains(" Lazy "));
    }
}
