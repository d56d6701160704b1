use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

pub struct Config {
    pub name: String,
    pub config_dir: PathBuf,
    pub theme: String,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/forksh")
        } else {
            PathBuf::from("tmp")
        }
    }

    fn defaults() -> Self {
        let config_dir = Self::get_config_dir();
        Config {
            name: env!("CARGO_PKG_NAME").to_string(),
            theme: String::from("default"),
            history_file: config_dir.join(".forksh_history"),
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
            logger_dir: config_dir.join("logs"),
            config_dir,
        }
    }

    pub fn new() -> Self {
        // 优先加载环境变量
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        Self::from_env()
    }

    /// Defaults overridden by `FORKSH_*` variables.
    pub fn from_env() -> Self {
        let mut config = Config::defaults();

        if let Ok(theme) = env::var("FORKSH_THEME") {
            config.theme = theme;
        }

        if let Ok(editor) = env::var("FORKSH_EDITOR") {
            config.editor_mode = editor;
        }

        if let Ok(history) = env::var("FORKSH_HISTORY") {
            config.history_file = PathBuf::from(history);
        }

        if let Ok(level) = env::var("FORKSH_LOG") {
            config.logger_level = level;
        }

        if let Ok(dir) = env::var("FORKSH_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }

        config
    }

    /// Creates the history file's directory if missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        if let Some(parent) = self.history_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
