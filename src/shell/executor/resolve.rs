use std::env;
use std::path::Path;

use log::debug;
use nix::unistd::{access, AccessFlags};

/// Shell-specific search path. Entries may be separated by `$` or `:`.
pub const SEARCH_PATH_VAR: &str = "FORKSH_PATH";

/// The search path to resolve commands against: `FORKSH_PATH`, then `PATH`,
/// then nothing.
pub fn search_path() -> String {
    if let Ok(path) = env::var(SEARCH_PATH_VAR) {
        return normalize_delimiters(&path);
    }
    debug!("{} 未设置，回退到 PATH", SEARCH_PATH_VAR);
    env::var("PATH").unwrap_or_default()
}

fn normalize_delimiters(path: &str) -> String {
    path.replace('$', ":")
}

fn is_readable_file(path: &str) -> bool {
    Path::new(path).is_file() && access(path, AccessFlags::R_OK).is_ok()
}

/// Locates the executable for `command`.
///
/// First match wins:
/// 1. `command` itself names a readable file (absolute, or relative such as `./foo`);
/// 2. `./<command>` exists;
/// 3. `<dir>/<command>` for each `:`-separated `dir` of `search_path`, in order.
///
/// Falls back to `command` unchanged, so that exec reports the failure.
pub fn resolve(command: &str, search_path: &str) -> String {
    if is_readable_file(command) {
        return command.to_string();
    }

    let local = format!("./{}", command);
    if is_readable_file(&local) {
        return local;
    }

    for dir in search_path.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = format!("{}/{}", dir.trim_end_matches('/'), command);
        if is_readable_file(&candidate) {
            return candidate;
        }
    }

    command.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    #[allow(clippy::unwrap_used)]
    fn touch(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        File::create(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_absolute_path_is_returned_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let tool = touch(dir.path(), "tool");
        assert_eq!(resolve(&tool, ""), tool);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_search_path_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        touch(second.path(), "forksh-resolve-tool");
        let expected = touch(first.path(), "forksh-resolve-tool");

        let search = format!(
            "{}:{}",
            first.path().display(),
            second.path().display()
        );
        assert_eq!(resolve("forksh-resolve-tool", &search), expected);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_skips_directories_and_empty_segments() {
        let outer = tempfile::tempdir().unwrap();
        let bin = outer.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::create_dir(bin.join("forksh-dir-named")).unwrap();
        let other = tempfile::tempdir().unwrap();
        let expected = touch(other.path(), "forksh-dir-named");

        let search = format!("::{}::{}/", bin.display(), other.path().display());
        assert_eq!(resolve("forksh-dir-named", &search), expected);
    }

    #[test]
    fn test_unresolved_command_falls_through() {
        assert_eq!(
            resolve("forksh-no-such-command", "/nonexistent-a:/nonexistent-b"),
            "forksh-no-such-command"
        );
        assert_eq!(resolve("forksh-no-such-command", ""), "forksh-no-such-command");
    }

    #[test]
    fn test_normalize_legacy_delimiter() {
        assert_eq!(normalize_delimiters("/bin$/usr/bin:/opt"), "/bin:/usr/bin:/opt");
    }
}
