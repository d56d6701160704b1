#[allow(clippy::module_inception)]
mod executor;
mod resolve;

pub use executor::{ExecError, Executor};
pub use resolve::{resolve, search_path, SEARCH_PATH_VAR};
