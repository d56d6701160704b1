use std::fmt;

use log::{debug, error};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitPidFlag as WF;
use nix::sys::wait::WaitStatus as WS;
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Exited(i32),
    Killed(Signal),
}

#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub pids: Vec<Pid>,
    pub command: String,
    pub status: JobStatus,
    pending: Vec<Pid>,
}

impl Job {
    fn new(index: usize, pids: Vec<Pid>, command: String) -> Self {
        Self {
            index,
            pending: pids.clone(),
            pids,
            command,
            status: JobStatus::Running,
        }
    }

    pub fn tail(&self) -> Option<Pid> {
        self.pids.last().copied()
    }

    fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            JobStatus::Running => "running".to_string(),
            JobStatus::Done => "done".to_string(),
            JobStatus::Exited(code) => format!("exit {}", code),
            JobStatus::Killed(sig) => format!("killed {}", sig),
        };
        let pid = self.tail().map(|pid| pid.as_raw()).unwrap_or_default();
        write!(f, "[{}] {} {}  {}", self.index, pid, status, self.command)
    }
}

/// Tracks background jobs until every process in them has been reaped.
/// Only ever waits on the specific pids it was given.
#[derive(Default)]
pub struct JobManager {
    jobs: Vec<Job>,
}

impl JobManager {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn get_jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn find_available_index(&self) -> usize {
        let mut index = 1;
        while self.jobs.iter().any(|job| job.index == index) {
            index += 1;
        }
        index
    }

    /// Registers a background job; returns its index.
    pub fn add_job(&mut self, pids: Vec<Pid>, command: String) -> usize {
        let index = self.find_available_index();
        debug!("后台任务 [{}] {:?} {}", index, pids, command);
        self.jobs.push(Job::new(index, pids, command));
        index
    }

    /// Polls every tracked process without blocking and returns the jobs
    /// whose processes have all terminated.
    pub fn reap(&mut self) -> Vec<Job> {
        for job in self.jobs.iter_mut() {
            let tail = job.tail();
            let mut still_running = Vec::with_capacity(job.pending.len());
            for &pid in &job.pending {
                match waitpid(pid, Some(WF::WNOHANG)) {
                    Ok(WS::StillAlive) => still_running.push(pid),
                    Ok(WS::Exited(pid, code)) => {
                        if Some(pid) == tail {
                            job.status = if code == 0 {
                                JobStatus::Done
                            } else {
                                JobStatus::Exited(code)
                            };
                        }
                    }
                    Ok(WS::Signaled(pid, sig, _core_dumped)) => {
                        if Some(pid) == tail {
                            job.status = JobStatus::Killed(sig);
                        }
                    }
                    Ok(_) => still_running.push(pid),
                    Err(Errno::ECHILD) => {
                        // 已被其他地方回收，不再跟踪
                        debug!("进程 {} 已不存在", pid);
                    }
                    Err(e) => {
                        error!("waitpid {} 失败: {}", pid, e);
                        still_running.push(pid);
                    }
                }
            }
            job.pending = still_running;
            if job.is_finished() && job.status == JobStatus::Running {
                job.status = JobStatus::Done;
            }
        }

        let (finished, running): (Vec<Job>, Vec<Job>) =
            self.jobs.drain(..).partition(Job::is_finished);
        self.jobs = running;
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::thread;
    use std::time::{Duration, Instant};

    #[allow(clippy::unwrap_used)]
    fn spawn(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program).args(args).spawn().unwrap();
        Pid::from_raw(child.id() as i32)
    }

    fn reap_until_finished(manager: &mut JobManager) -> Vec<Job> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let finished = manager.reap();
            if !finished.is_empty() || Instant::now() > deadline {
                return finished;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_indices_reuse_lowest_free() {
        let mut manager = JobManager::new();
        manager.jobs.push(Job::new(1, vec![], "a".to_string()));
        manager.jobs.push(Job::new(3, vec![], "c".to_string()));
        assert_eq!(manager.add_job(vec![], "b".to_string()), 2);
        assert_eq!(manager.add_job(vec![], "d".to_string()), 4);
    }

    #[test]
    fn test_reap_reports_finished_job() {
        let mut manager = JobManager::new();
        let pid = spawn("true", &[]);
        let index = manager.add_job(vec![pid], "true".to_string());

        let finished = reap_until_finished(&mut manager);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].index, index);
        assert_eq!(finished[0].status, JobStatus::Done);
        assert!(manager.get_jobs().is_empty());
    }

    #[test]
    fn test_reap_reports_exit_code_of_tail() {
        let mut manager = JobManager::new();
        let head = spawn("true", &[]);
        let tail = spawn("sh", &["-c", "exit 3"]);
        manager.add_job(vec![head, tail], "true | sh".to_string());

        let finished = reap_until_finished(&mut manager);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Exited(3));
        assert_eq!(
            finished[0].to_string(),
            format!("[1] {} exit 3  true | sh", tail)
        );
    }

    #[test]
    fn test_running_job_is_kept() {
        let mut manager = JobManager::new();
        let pid = spawn("sleep", &["30"]);
        manager.add_job(vec![pid], "sleep 30".to_string());

        assert!(manager.reap().is_empty());
        assert_eq!(manager.get_jobs().len(), 1);

        let _ = nix::sys::signal::kill(pid, Signal::SIGKILL);
        let finished = reap_until_finished(&mut manager);
        assert_eq!(finished[0].status, JobStatus::Killed(Signal::SIGKILL));
    }
}
