//! Terminal output shared by the login loop and its collaborators

use console::style;
use dialoguer::theme::ColorfulTheme;

/// Application context passed to the prompts and adapters
///
/// Everything is written to stderr, like the prompts and logs; stdout only
/// carries `--json` and `--print-id-token` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppContext {
    pub quiet: bool,
}

impl AppContext {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn theme(&self) -> ColorfulTheme {
        ColorfulTheme::default()
    }

    pub fn print_header(&self, msg: &str) {
        if !self.quiet {
            eprintln!();
            eprintln!("{}", style(msg).bold());
        }
    }

    pub fn print_success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", style(msg).green());
        }
    }

    pub fn print_warning(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", style(msg).yellow());
        }
    }

    pub fn print_info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", style(msg).cyan());
        }
    }

    /// Errors are shown even in quiet mode.
    pub fn print_error(&self, msg: &str) {
        eprintln!("{}", style(msg).red());
    }
}
