use std::env;

use log::{debug, error};
use nix::unistd::User;

pub fn current_dir() -> String {
    let _current_dir = match env::current_dir() {
        Ok(x) => x,
        Err(e) => {
            error!("forksh: PROMPT: env current_dir error: {}", e);
            return String::new();
        }
    };
    let current_dir = match _current_dir.to_str() {
        Some(x) => x,
        None => {
            error!("forksh: PROMPT: to_str error");
            return String::new();
        }
    };

    current_dir.to_string()
}

/// Replaces a leading `home` with `~` for display.
pub fn collapse_home(path: &str, home: &str) -> String {
    if home.is_empty() || home == "/" {
        return path.to_string();
    }
    match path.strip_prefix(home) {
        Some("") => "~".to_string(),
        Some(rest) if rest.starts_with('/') => format!("~{}", rest),
        _ => path.to_string(),
    }
}

/// Expands `~`, `~/rest` and `~user/rest`. Anything else, including an
/// unknown user, comes back unchanged.
pub fn expand_home(path: &str) -> String {
    let Some(rest) = path.strip_prefix('~') else {
        return path.to_string();
    };
    if rest.is_empty() || rest.starts_with('/') {
        return shellexpand::tilde(path).into_owned();
    }

    let (username, tail) = match rest.find('/') {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };
    match User::from_name(username) {
        Ok(Some(user)) => format!("{}{}", user.dir.display(), tail),
        Ok(None) => path.to_string(),
        Err(e) => {
            debug!("查询用户 {} 失败: {}", username, e);
            path.to_string()
        }
    }
}
