use std::env;
use std::io::{self, IsTerminal};

use colored::Colorize;
use nix::unistd::gethostname;

use crate::utils::path::{collapse_home, current_dir};

pub struct Theme {
    pub error_symbol: String,
    pub welcome_message: String,
    pub exit_message: String,
    pub help_message: String,
    pub user_style: Box<dyn Fn(&str) -> String>,
    pub host_style: Box<dyn Fn(&str) -> String>,
    pub error_style: Box<dyn Fn(&str) -> String>,
    pub success_style: Box<dyn Fn(&str) -> String>,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            error_symbol: "✗".to_string(),
            welcome_message: format!("Welcome to forksh {}", env!("CARGO_PKG_VERSION")),
            exit_message: "bye!".to_string(),
            help_message: "Type \"help\" for built-in commands, \"quit\" to leave.".to_string(),
            user_style: Box::new(|s: &str| s.yellow().to_string()),
            host_style: Box::new(|s: &str| s.green().to_string()),
            error_style: Box::new(|s: &str| s.bright_red().to_string()),
            success_style: Box::new(|s: &str| s.bright_green().to_string()),
        }
    }
}

impl Theme {
    /// Builds the `user@host cwd> ` prompt.
    pub fn prompt(&self) -> String {
        let user = env::var("USER").unwrap_or_default();
        let host = gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        let home = env::var("HOME").unwrap_or_default();
        let cwd = collapse_home(&current_dir(), &home);
        format!(
            "{}@{} {}> ",
            (self.user_style)(&user),
            (self.host_style)(&host),
            cwd
        )
    }

    pub fn message_head(&self) -> String {
        (self.error_style)("[forksh]")
    }
}

/// Colors only make sense on a real terminal.
pub fn color_enabled() -> bool {
    io::stdout().is_terminal() && env::var("TERM").map(|t| t != "dumb").unwrap_or(false)
}

pub fn load_theme(theme_name: &str) -> Theme {
    if !color_enabled() {
        colored::control::set_override(false);
    }
    match theme_name {
        "plain" => {
            colored::control::set_override(false);
            Theme::default()
        }
        _ => Theme::default(),
    }
}
