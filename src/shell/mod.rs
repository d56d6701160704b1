pub mod builtins;
pub mod executor;
pub mod job_manager;
pub mod parser;
mod readline;
#[allow(clippy::module_inception)]
mod shell;
pub mod signals;

pub use shell::Shell;
