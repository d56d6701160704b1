use std::env;
use std::io::{self, Write};

use log::debug;

use crate::utils::path::expand_home;

/// Commands the shell handles itself. When the first stage names one of
/// these, the whole line goes here and never reaches the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Quit,
    Cd,
    SetEnv,
    ListEnv,
    History,
    Help,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "quit" | "exit" => Some(Builtin::Quit),
            "cd" => Some(Builtin::Cd),
            "setenv" => Some(Builtin::SetEnv),
            "listenv" => Some(Builtin::ListEnv),
            "history" => Some(Builtin::History),
            "help" => Some(Builtin::Help),
            _ => None,
        }
    }
}

pub fn builtin_cd(arguments: &[String]) -> io::Result<()> {
    let target = match arguments.first() {
        Some(dir) => expand_home(dir),
        None => env::var("HOME").map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?,
    };
    debug!("切换目录: {}", target);
    env::set_current_dir(&target)
        .map_err(|e| io::Error::new(e.kind(), format!("cd: {}: {}", target, e)))
}

/// One argument unsets, two set.
pub fn builtin_setenv(arguments: &[String]) -> Result<(), String> {
    match arguments {
        [name] => {
            debug!("删除环境变量: {}", name);
            env::remove_var(name);
            Ok(())
        }
        [name, value] => {
            debug!("设置环境变量: {}={}", name, value);
            env::set_var(name, value);
            Ok(())
        }
        _ => Err(format!(
            "setenv requires 1 or 2 arguments, you gave {}.\nPlease check \"help\" command.",
            arguments.len()
        )),
    }
}

pub fn builtin_listenv(out: &mut impl Write) -> io::Result<()> {
    for (name, value) in env::vars_os() {
        writeln!(out, "{}={}", name.to_string_lossy(), value.to_string_lossy())?;
    }
    Ok(())
}

pub fn builtin_history<'a>(
    out: &mut impl Write,
    entries: impl Iterator<Item = &'a String>,
) -> io::Result<()> {
    for (i, line) in entries.enumerate() {
        writeln!(out, "{:5}  {}", i, line)?;
    }
    Ok(())
}

pub fn builtin_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "forksh {} -Help-", env!("CARGO_PKG_VERSION"))?;
    writeln!(out)?;
    for (name, text) in [
        ("cd", "[dir] Change directory, ~ and ~user are expanded."),
        ("setenv", "(name) (value) Set environment variables, leave value empty to unset."),
        ("listenv", "List all environment variables"),
        ("history", "List the command history"),
        ("help", "Display this help"),
        ("quit", "Leave this shell"),
    ] {
        writeln!(out, "{:>10} {}", name, text)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "Anything else runs as a program: `|` pipes, `<` `>` `>>` redirect, `&` backgrounds."
    )
}
