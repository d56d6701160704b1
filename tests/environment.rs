//! Tests that mutate process-wide state (working directory, environment)
//! live in their own test binary.

use std::env;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;

use forksh::shell::executor::{resolve, search_path, Executor, SEARCH_PATH_VAR};
use forksh::shell::job_manager::JobManager;
use forksh::shell::parser::parse;
use nix::sys::wait::WaitStatus;

#[allow(clippy::unwrap_used)]
#[test]
fn local_file_resolves_with_empty_search_path() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("localtool")).unwrap();
    env::set_current_dir(dir.path()).unwrap();

    // a bare name that is a file in the working directory is already usable
    assert_eq!(resolve("localtool", ""), "localtool");
    assert_eq!(resolve("./localtool", ""), "./localtool");
    assert_eq!(resolve("absent", ""), "absent");

    let status = Executor::new(JobManager::new())
        .run(&parse("localtool"))
        .unwrap();
    // empty file: exec fails with ENOEXEC, not "not found"
    assert!(matches!(status, Some(WaitStatus::Exited(_, 126))));
}

#[allow(clippy::unwrap_used)]
#[test]
fn shell_search_path_takes_priority_and_normalizes_delimiters() {
    let bin = tempfile::tempdir().unwrap();
    let tool = bin.path().join("forksh-custom-tool");
    fs::write(&tool, "#!/bin/sh\necho from-custom-path\n").unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

    env::set_var(
        SEARCH_PATH_VAR,
        format!("/nonexistent-forksh${}", bin.path().display()),
    );
    assert_eq!(
        search_path(),
        format!("/nonexistent-forksh:{}", bin.path().display())
    );

    let out = tempfile::tempdir().unwrap();
    let captured = out.path().join("captured");
    Executor::new(JobManager::new())
        .run(&parse(&format!(
            "forksh-custom-tool > {}",
            captured.display()
        )))
        .unwrap();
    assert_eq!(fs::read_to_string(&captured).unwrap(), "from-custom-path\n");

    env::remove_var(SEARCH_PATH_VAR);
}
