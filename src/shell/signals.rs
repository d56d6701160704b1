//! Interrupt routing between the shell and its foreground job.
//!
//! One SIGINT handler serves two situations the kernel does not tell apart:
//! the shell running a submitted line, where the interrupt belongs to the
//! job, and the shell idle at its prompt, where it means "leave the shell".
//! The shell marks itself busy from dispatch until the next prompt, and the
//! executor records every process of the foreground job; the handler reads
//! both.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use libc::c_int;
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;

const FORWARD_MESSAGE: &[u8] = b"\n[forksh] sending SIGINT to the foreground job...\n";
const GOODBYE_MESSAGE: &[u8] = b"\n[forksh] received SIGINT, bye!\n";

/// Processes of one foreground job the coordinator can hold. A pipeline
/// longer than this still runs; its extra stages just miss forwarded
/// interrupts.
pub const MAX_FOREGROUND: usize = 64;

/// The coordinator the installed SIGINT handler consults.
pub static COORDINATOR: SignalCoordinator = SignalCoordinator::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// A foreground job was recorded; this many processes were signaled.
    Forwarded(usize),
    /// The shell is busy but has no process to hand the interrupt to yet.
    /// A job started later in the same submission still receives it.
    Deferred,
    /// The shell is idle: the interrupt ends the shell.
    Terminate,
}

/// Lock-free state shared with the SIGINT handler. Slots holding 0 are empty.
pub struct SignalCoordinator {
    busy: AtomicUsize,
    pending: AtomicBool,
    len: AtomicUsize,
    pids: [AtomicI32; MAX_FOREGROUND],
}

impl SignalCoordinator {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: AtomicI32 = AtomicI32::new(0);
        Self {
            busy: AtomicUsize::new(0),
            pending: AtomicBool::new(false),
            len: AtomicUsize::new(0),
            pids: [EMPTY; MAX_FOREGROUND],
        }
    }

    fn recorded(&self) -> impl Iterator<Item = Pid> + '_ {
        let len = self.len.load(Ordering::SeqCst).min(MAX_FOREGROUND);
        self.pids[..len].iter().filter_map(|slot| match slot.load(Ordering::SeqCst) {
            0 => None,
            raw => Some(Pid::from_raw(raw)),
        })
    }

    /// Adds `pid` to the foreground job. Returns false when the job already
    /// holds `MAX_FOREGROUND` processes.
    pub fn set_foreground(&self, pid: Pid) -> bool {
        let slot = self.len.fetch_add(1, Ordering::SeqCst);
        match self.pids.get(slot) {
            Some(cell) => {
                cell.store(pid.as_raw(), Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Forgets one process once it has been reaped, so its pid is never
    /// signaled after the kernel recycles it.
    pub fn release_foreground(&self, pid: Pid) {
        for cell in &self.pids {
            let _ = cell.compare_exchange(pid.as_raw(), 0, Ordering::SeqCst, Ordering::SeqCst);
        }
    }

    pub fn clear_foreground(&self) {
        self.len.store(0, Ordering::SeqCst);
        for cell in &self.pids {
            cell.store(0, Ordering::SeqCst);
        }
    }

    pub fn foreground(&self) -> Vec<Pid> {
        self.recorded().collect()
    }

    pub fn has_foreground(&self) -> bool {
        self.recorded().next().is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst) > 0
    }

    /// Marks the shell busy until the guard is dropped. Interrupts left over
    /// from an earlier submission are discarded.
    pub fn enter_busy(&self) -> BusyGuard<'_> {
        self.pending.store(false, Ordering::SeqCst);
        self.busy.fetch_add(1, Ordering::SeqCst);
        BusyGuard { coordinator: self }
    }

    /// Starts recording a foreground job. The shell counts as busy and the
    /// recorded processes are forgotten when the guard is dropped.
    pub fn enter_foreground(&self) -> ForegroundGuard<'_> {
        self.clear_foreground();
        self.busy.fetch_add(1, Ordering::SeqCst);
        ForegroundGuard { coordinator: self }
    }

    /// True once if an interrupt arrived while busy since the last call.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    /// Sends `sig` to every process of the foreground job. Returns how many
    /// were signaled; a process that already exited is skipped.
    pub fn signal_foreground(&self, sig: Signal) -> nix::Result<usize> {
        let mut signaled = 0;
        let mut failure = None;
        for pid in self.recorded() {
            match signal::kill(pid, sig) {
                Ok(()) => signaled += 1,
                Err(Errno::ESRCH) => {}
                Err(e) => failure = Some(e),
            }
        }
        match failure {
            Some(e) if signaled == 0 => Err(e),
            _ => Ok(signaled),
        }
    }

    /// Decides and performs the interrupt transition. Async-signal-safe.
    pub fn on_interrupt(&self) -> InterruptAction {
        if !self.is_busy() && !self.has_foreground() {
            return InterruptAction::Terminate;
        }
        self.pending.store(true, Ordering::SeqCst);
        if !self.has_foreground() {
            return InterruptAction::Deferred;
        }
        InterruptAction::Forwarded(self.signal_foreground(Signal::SIGINT).unwrap_or(0))
    }
}

impl Default for SignalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BusyGuard<'a> {
    coordinator: &'a SignalCoordinator,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ForegroundGuard<'a> {
    coordinator: &'a SignalCoordinator,
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.clear_foreground();
        self.coordinator.pending.store(false, Ordering::SeqCst);
        self.coordinator.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Writes straight to descriptor 2, bypassing std's locked handle.
/// Safe to call from a signal handler or between fork and exec.
pub fn write_stderr(message: &[u8]) {
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            message.as_ptr().cast::<libc::c_void>(),
            message.len(),
        );
    }
}

extern "C" fn handle_sigint(_: c_int) {
    match COORDINATOR.on_interrupt() {
        InterruptAction::Forwarded(_) => write_stderr(FORWARD_MESSAGE),
        InterruptAction::Deferred => {}
        InterruptAction::Terminate => {
            write_stderr(GOODBYE_MESSAGE);
            unsafe { libc::_exit(0) }
        }
    }
}

/// Installs the shell's SIGINT handler. Interrupted waits are restarted.
pub fn install_interrupt_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}

/// Puts SIGINT back to its default disposition. Used in forked children
/// before exec, so an interrupt in that window kills the child only.
pub fn restore_default_interrupt() {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let _ = unsafe { signal::sigaction(Signal::SIGINT, &action) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Child, Command};

    #[allow(clippy::unwrap_used)]
    fn sleeper() -> (Child, Pid) {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        (child, pid)
    }

    #[test]
    fn test_idle_interrupt_terminates() {
        let coordinator = SignalCoordinator::new();
        assert!(coordinator.foreground().is_empty());
        assert_eq!(coordinator.on_interrupt(), InterruptAction::Terminate);
    }

    #[test]
    fn test_guard_clears_foreground() {
        let coordinator = SignalCoordinator::new();
        {
            let _job = coordinator.enter_foreground();
            assert!(coordinator.set_foreground(Pid::from_raw(4242)));
            assert!(coordinator.set_foreground(Pid::from_raw(4243)));
            assert_eq!(
                coordinator.foreground(),
                vec![Pid::from_raw(4242), Pid::from_raw(4243)]
            );
            assert!(coordinator.is_busy());
        }
        assert!(coordinator.foreground().is_empty());
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn test_job_capacity_is_bounded() {
        let coordinator = SignalCoordinator::new();
        let _job = coordinator.enter_foreground();
        for raw in 0..MAX_FOREGROUND as i32 {
            assert!(coordinator.set_foreground(Pid::from_raw(10_000 + raw)));
        }
        assert!(!coordinator.set_foreground(Pid::from_raw(99_999)));
        assert_eq!(coordinator.foreground().len(), MAX_FOREGROUND);
    }

    #[test]
    fn test_signal_foreground_when_idle_is_noop() {
        let coordinator = SignalCoordinator::new();
        assert_eq!(coordinator.signal_foreground(Signal::SIGINT), Ok(0));
    }

    #[test]
    fn test_busy_without_job_does_not_terminate() {
        let coordinator = SignalCoordinator::new();
        {
            let _busy = coordinator.enter_busy();
            assert_eq!(coordinator.on_interrupt(), InterruptAction::Deferred);
            assert!(coordinator.take_pending());
            assert!(!coordinator.take_pending());
        }
        assert_eq!(coordinator.on_interrupt(), InterruptAction::Terminate);
    }

    #[test]
    fn test_reaped_stage_keeps_job_busy() {
        let coordinator = SignalCoordinator::new();
        let _job = coordinator.enter_foreground();
        coordinator.set_foreground(Pid::from_raw(4242));
        coordinator.release_foreground(Pid::from_raw(4242));
        assert!(!coordinator.has_foreground());
        assert_eq!(coordinator.on_interrupt(), InterruptAction::Deferred);
    }

    #[test]
    fn test_leftover_interrupt_is_discarded_on_dispatch() {
        let coordinator = SignalCoordinator::new();
        {
            let _busy = coordinator.enter_busy();
            coordinator.on_interrupt();
        }
        let _busy = coordinator.enter_busy();
        assert!(!coordinator.take_pending());
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_interrupt_reaches_every_stage() {
        let (mut upstream, upstream_pid) = sleeper();
        let (mut tail, tail_pid) = sleeper();

        let coordinator = SignalCoordinator::new();
        let job = coordinator.enter_foreground();
        coordinator.set_foreground(upstream_pid);
        coordinator.set_foreground(tail_pid);
        assert_eq!(coordinator.on_interrupt(), InterruptAction::Forwarded(2));

        assert_eq!(tail.wait().unwrap().signal(), Some(libc::SIGINT));
        assert_eq!(upstream.wait().unwrap().signal(), Some(libc::SIGINT));
        drop(job);
        assert_eq!(coordinator.on_interrupt(), InterruptAction::Terminate);
    }
}
