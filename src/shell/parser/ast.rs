use std::fmt;

pub use super::lexer::RedirectOp;

/// One command of a pipeline, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStage {
    pub command: String,
    pub arguments: Vec<String>,
    pub background: bool,
    pub pipes_with_next: bool,
    /// In textual order; the executor applies them in this order.
    pub redirections: Vec<Redirection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub operator: RedirectOp,
    pub filename: String,
}

impl PipelineStage {
    fn last_target(&self, operator: RedirectOp) -> Option<&str> {
        self.redirections
            .iter()
            .rev()
            .find(|r| r.operator == operator)
            .map(|r| r.filename.as_str())
    }

    pub fn redirect_in_path(&self) -> Option<&str> {
        self.last_target(RedirectOp::Input)
    }

    pub fn redirect_out_path(&self) -> Option<&str> {
        self.last_target(RedirectOp::Output)
    }

    pub fn redirect_append_path(&self) -> Option<&str> {
        self.last_target(RedirectOp::Append)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for arg in &self.arguments {
            write!(f, " {}", arg)?;
        }
        for redirection in &self.redirections {
            write!(f, " {} {}", redirection.operator, redirection.filename)?;
        }
        Ok(())
    }
}

/// The stages parsed from one input line. Empty for a blank line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn first(&self) -> Option<&PipelineStage> {
        self.stages.first()
    }

    /// Splits the line into jobs: maximal runs of stages joined by pipes.
    /// Each job ends at the first stage that does not pipe into the next.
    pub fn jobs(&self) -> Vec<&[PipelineStage]> {
        let mut jobs = Vec::new();
        let mut start = 0;
        for (i, stage) in self.stages.iter().enumerate() {
            if !stage.pipes_with_next || i + 1 == self.stages.len() {
                jobs.push(&self.stages[start..=i]);
                start = i + 1;
            }
        }
        jobs
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", stage)?;
            if stage.pipes_with_next {
                f.write_str(" |")?;
            } else if stage.background {
                f.write_str(" &")?;
            }
        }
        Ok(())
    }
}
