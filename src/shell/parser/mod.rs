pub mod ast;
mod lexer;
#[allow(clippy::module_inception)]
mod parser;

pub use ast::{Pipeline, PipelineStage, RedirectOp, Redirection};
pub use parser::{parse, Parser};
