use std::error;
use std::ffi::{CString, NulError};
use std::fmt;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::fcntl::{fcntl, open, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::Signal;
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, dup2, execv, fork, pipe2, ForkResult, Pid};

use super::resolve::{resolve, search_path};
use crate::shell::job_manager::{Job, JobManager};
use crate::shell::parser::{Pipeline, PipelineStage, RedirectOp};
use crate::shell::signals::{self, COORDINATOR};

/// An OS-level failure that abandons one pipeline submission.
#[derive(Debug)]
pub enum ExecError {
    Pipe(Errno),
    Fork(Errno),
    Wait(Errno),
    InvalidArgument(NulError),
}

impl From<NulError> for ExecError {
    fn from(e: NulError) -> Self {
        ExecError::InvalidArgument(e)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Pipe(e) => {
                write!(f, "unable to create pipe (code: {}): {}", *e as i32, e.desc())
            }
            ExecError::Fork(e) => write!(f, "fork failed (code: {}): {}", *e as i32, e.desc()),
            ExecError::Wait(e) => {
                write!(f, "waitpid failed (code: {}): {}", *e as i32, e.desc())
            }
            ExecError::InvalidArgument(e) => write!(f, "invalid argument: {}", e),
        }
    }
}

impl error::Error for ExecError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ExecError::Pipe(e) | ExecError::Fork(e) | ExecError::Wait(e) => Some(e),
            ExecError::InvalidArgument(e) => Some(e),
        }
    }
}

/// A stage converted to the exec boundary's form before forking, so the
/// child only opens, dups and execs.
#[derive(Debug)]
struct PreparedStage {
    path: CString,
    argv: Vec<CString>,
    redirections: Vec<(RedirectOp, CString)>,
}

impl PreparedStage {
    fn new(stage: &PipelineStage, search_path: &str) -> Result<Self, ExecError> {
        let resolved = resolve(&stage.command, search_path);
        debug!("解析命令路径: {} -> {}", stage.command, resolved);

        let path = CString::new(resolved)?;
        let mut argv = Vec::with_capacity(stage.arguments.len() + 1);
        argv.push(path.clone());
        for arg in &stage.arguments {
            argv.push(CString::new(arg.as_str())?);
        }

        let redirections = stage
            .redirections
            .iter()
            .map(|r| Ok((r.operator, CString::new(r.filename.as_str())?)))
            .collect::<Result<Vec<_>, ExecError>>()?;

        Ok(Self {
            path,
            argv,
            redirections,
        })
    }
}

pub struct Executor {
    jobs: JobManager,
}

impl Executor {
    pub fn new(jobs: JobManager) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Background jobs that finished since the last call.
    pub fn reap_background(&mut self) -> Vec<Job> {
        self.jobs.reap()
    }

    /// Runs every job of the line in order. Returns the status of the last
    /// foreground job, if any ran.
    pub fn run(&mut self, pipeline: &Pipeline) -> Result<Option<WaitStatus>, ExecError> {
        let mut last = None;
        for stages in pipeline.jobs() {
            if let Some(status) = self.run_job(stages)? {
                last = Some(status);
            }
        }
        Ok(last)
    }

    fn run_job(&mut self, stages: &[PipelineStage]) -> Result<Option<WaitStatus>, ExecError> {
        let Some(tail) = stages.last() else {
            return Ok(None);
        };
        if tail.pipes_with_next {
            warn!("`{}` 之后的管道没有下游命令，已忽略", tail.command);
        }
        // 行尾悬空的 `|` 不让任务转入后台
        let background = tail.background && !tail.pipes_with_next;
        let command = stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ");

        // 前台任务从第一个 fork 起就登记在协调器里，直到全部回收
        let _job = (!background).then(|| COORDINATOR.enter_foreground());
        let mut spawned = Vec::with_capacity(stages.len());
        if let Err(e) = spawn_chain(stages, !background, &mut spawned) {
            if !spawned.is_empty() {
                // 已启动的进程交给后台任务回收，不阻塞 shell
                let index = self.jobs.add_job(spawned, command);
                warn!("任务 [{}] 未完整启动，已转入后台回收", index);
            }
            return Err(e);
        }

        if background {
            let pid = spawned.last().copied().unwrap_or(Pid::from_raw(0));
            let index = self.jobs.add_job(spawned, command);
            println!("[{}] {}", index, pid);
            return Ok(None);
        }

        info!("前台任务: {}", command);
        if COORDINATOR.take_pending() {
            // 启动期间到达的中断，补发给整条管道
            if let Err(e) = COORDINATOR.signal_foreground(Signal::SIGINT) {
                warn!("无法转发 SIGINT: {}", e);
            }
        }
        wait_foreground(&spawned).map(Some)
    }
}

/// Forks one process per stage, left to right. Each child gets the read end
/// of the previous pipe as stdin and the write end of its own as stdout;
/// the parent keeps only the read end it will hand to the next stage.
/// Pids of the processes started are pushed to `spawned` even on error, and
/// to the interrupt coordinator when `foreground` is set.
fn spawn_chain(
    stages: &[PipelineStage],
    foreground: bool,
    spawned: &mut Vec<Pid>,
) -> Result<(), ExecError> {
    let search_path = search_path();
    let prepared = stages
        .iter()
        .map(|stage| PreparedStage::new(stage, &search_path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut prev_read: Option<OwnedFd> = None;
    for (i, stage) in prepared.iter().enumerate() {
        let is_last = i + 1 == prepared.len();
        let next_pipe = if is_last {
            None
        } else {
            // close-on-exec so a sibling fork elsewhere never inherits the raw ends
            Some(pipe2(OFlag::O_CLOEXEC).map_err(ExecError::Pipe)?)
        };

        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                signals::restore_default_interrupt();
                if let Some(read) = prev_read.take() {
                    rebind(read, libc::STDIN_FILENO, "STDIN");
                }
                if let Some((read, write)) = next_pipe {
                    drop(read);
                    rebind(write, libc::STDOUT_FILENO, "STDOUT");
                }
                exec_stage(stage)
            }
            Ok(ForkResult::Parent { child }) => {
                debug!("启动进程 {}: {:?}", child, stage.argv);
                spawned.push(child);
                if foreground && !COORDINATOR.set_foreground(child) {
                    warn!("前台任务进程过多，{} 收不到转发的 SIGINT", child);
                }
                drop(prev_read.take());
                prev_read = next_pipe.map(|(read, write)| {
                    drop(write);
                    read
                });
            }
            Err(e) => return Err(ExecError::Fork(e)),
        }
    }
    Ok(())
}

/// Child side: makes `fd` the descriptor `target` and closes the original.
fn rebind(fd: OwnedFd, target: RawFd, name: &str) {
    if fd.as_raw_fd() == target {
        // 已经在目标位置上：保留它，只去掉 close-on-exec
        let raw = fd.into_raw_fd();
        if let Err(e) = fcntl(raw, FcntlArg::F_SETFD(FdFlag::empty())) {
            report(&format!("fcntl failed. ({}) (code: {})", name, e as i32));
        }
        return;
    }
    if let Err(e) = dup2(fd.as_raw_fd(), target) {
        report(&format!("dup2 failed. ({}) (code: {})", name, e as i32));
    }
}

fn report(message: &str) {
    signals::write_stderr(format!("[forksh] {}\n", message).as_bytes());
}

/// Child side: applies redirections in textual order, then replaces the
/// process image. Never returns to shell code.
fn exec_stage(stage: &PreparedStage) -> ! {
    apply_redirections(&stage.redirections);

    let err = match execv(&stage.path, stage.argv.as_slice()) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    report(&format!(
        "unable to execute {} (code: {}): {}",
        stage.path.to_string_lossy(),
        err as i32,
        err.desc()
    ));
    let status = if err == Errno::ENOENT { 127 } else { 126 };
    unsafe { libc::_exit(status) }
}

/// Open failures are reported and skipped; the command still runs with
/// whatever the stream was bound to before.
fn apply_redirections(redirections: &[(RedirectOp, CString)]) {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    for (operator, path) in redirections {
        let (flags, target, name) = match operator {
            RedirectOp::Input => (OFlag::O_RDONLY, libc::STDIN_FILENO, "STDIN"),
            RedirectOp::Output => (
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                libc::STDOUT_FILENO,
                "STDOUT",
            ),
            RedirectOp::Append => (
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                libc::STDOUT_FILENO,
                "STDOUT",
            ),
        };

        match open(path.as_c_str(), flags, mode) {
            Ok(fd) if fd == target => {}
            Ok(fd) => {
                if let Err(e) = dup2(fd, target) {
                    report(&format!(
                        "unable to redirect {} {} {} (code: {})",
                        name,
                        operator,
                        path.to_string_lossy(),
                        e as i32
                    ));
                }
                let _ = close(fd);
            }
            Err(e) => report(&format!(
                "unable to open {} for {} (code: {}): {}",
                path.to_string_lossy(),
                operator,
                e as i32,
                e.desc()
            )),
        }
    }
}

/// Waits on every process of a foreground job, tail first. Each pid leaves
/// the coordinator as soon as it is reaped.
fn wait_foreground(pids: &[Pid]) -> Result<WaitStatus, ExecError> {
    let Some((&tail, upstream)) = pids.split_last() else {
        return Ok(WaitStatus::StillAlive);
    };
    let status = wait_for(tail)?;
    for &pid in upstream {
        wait_for(pid)?;
    }
    debug!("前台任务结束: {:?}", status);
    Ok(status)
}

fn wait_for(pid: Pid) -> Result<WaitStatus, ExecError> {
    loop {
        match waitpid(pid, None) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                COORDINATOR.release_foreground(pid);
                return Ok(status);
            }
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(ExecError::Wait(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser::parse;

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_argv_starts_with_resolved_path() {
        let pipeline = parse("sh -c true");
        let prepared = PreparedStage::new(&pipeline.stages[0], "/bin:/usr/bin").unwrap();
        assert!(prepared.path.to_str().unwrap().ends_with("/sh"));
        assert_eq!(prepared.argv[0], prepared.path);
        assert_eq!(prepared.argv.len(), 3);
        assert_eq!(prepared.argv[1].to_str().unwrap(), "-c");
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_redirections_prepared_in_order() {
        let pipeline = parse("cat < in > out >> log");
        let prepared = PreparedStage::new(&pipeline.stages[0], "").unwrap();
        let ops: Vec<RedirectOp> = prepared.redirections.iter().map(|(op, _)| *op).collect();
        assert_eq!(
            ops,
            vec![RedirectOp::Input, RedirectOp::Output, RedirectOp::Append]
        );
        assert_eq!(prepared.redirections[2].1.to_str().unwrap(), "log");
    }

    #[test]
    fn test_nul_in_argument_is_rejected() {
        let stage = PipelineStage {
            command: "echo".to_string(),
            arguments: vec!["a\0b".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            PreparedStage::new(&stage, ""),
            Err(ExecError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_error_display_names_operation_and_code() {
        let message = ExecError::Fork(Errno::EAGAIN).to_string();
        assert!(message.starts_with("fork failed"));
        assert!(message.contains(&format!("code: {}", Errno::EAGAIN as i32)));
        assert!(ExecError::Pipe(Errno::EMFILE).to_string().contains("pipe"));
    }
}
