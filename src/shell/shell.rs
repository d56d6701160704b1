use log::{debug, error, warn};
use nix::sys::wait::WaitStatus;
use std::error::Error;
use std::io::{self, Write};

use crate::shell::builtins::{self, Builtin};
use crate::shell::executor::Executor;
use crate::shell::job_manager::JobManager;
use crate::shell::parser::parse;
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::shell::signals::{self, InterruptAction, COORDINATOR};
use crate::utils::config::Config;
use crate::utils::theme::Theme;

enum Flow {
    Continue,
    Quit,
}

pub struct Shell<'a> {
    theme: &'a Theme,
    readline: ReadlineManager<'a>,
    executor: Executor,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config, theme: &'a Theme) -> Result<Self, ReadlineError> {
        Ok(Self {
            theme,
            readline: ReadlineManager::new(config)?,
            executor: Executor::new(JobManager::new()),
        })
    }

    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        debug!("初始化 forksh...");

        // 前台任务运行时把 Ctrl-C 转发给它，空闲时退出
        if let Err(e) = signals::install_interrupt_handler() {
            error!("无法安装 SIGINT 处理器: {}", e);
        }

        self.readline.load_history()?;

        println!("{}", (self.theme.success_style)(&self.theme.welcome_message));
        println!("{}", self.theme.help_message);
        debug!("forksh 准备就绪...");

        self.run_loop();
        self.readline.save_history()?;

        println!("{}", (self.theme.success_style)(&self.theme.exit_message));
        debug!("退出 forksh...");
        Ok(())
    }

    /// Only quit/exit, EOF or an idle interrupt leave the loop.
    fn run_loop(&mut self) {
        loop {
            self.report_finished_jobs();
            if let Err(e) = io::stdout().flush() {
                warn!("无法刷新标准输出: {}", e);
            }
            let prompt = self.theme.prompt();

            match self.readline.readline(&prompt) {
                Ok(line) => {
                    // 从分派到下一个提示符之间，中断都不会结束 shell
                    let _busy = COORDINATOR.enter_busy();
                    match self.handle_input(&line) {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => {
                            error!("命令输出失败: {}", e);
                            eprintln!("{} {}", self.theme.message_head(), e);
                        }
                    }
                }
                Err(ReadlineError::Eof) => {
                    warn!("接收到 EOF，退出 forksh...");
                    println!();
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    // 编辑行时 Ctrl-C 被 readline 接管，这里等同于空闲时收到 SIGINT
                    if COORDINATOR.on_interrupt() == InterruptAction::Terminate {
                        println!("\n{} received SIGINT, bye!", self.theme.message_head());
                        break;
                    }
                }
                Err(err) => {
                    error!("发生错误: {}", err);
                    eprintln!("{} {}", self.theme.message_head(), err);
                }
            }
        }
    }

    fn handle_input(&mut self, line: &str) -> Result<Flow, Box<dyn Error>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        if let Err(e) = self.readline.add_history(line.to_string()) {
            warn!("无法记录历史: {}", e);
        }

        let pipeline = parse(line);
        let Some(first) = pipeline.first() else {
            return Ok(Flow::Continue);
        };

        if let Some(builtin) = Builtin::from_name(&first.command) {
            debug!("执行内建命令: {:?} {:?}", builtin, first.arguments);
            return self.run_builtin(builtin, &first.arguments);
        }

        debug!("执行命令: {}", pipeline);
        match self.executor.run(&pipeline) {
            Ok(Some(status)) => self.report_status(status),
            Ok(None) => {}
            Err(e) => {
                error!("执行失败: {}", e);
                eprintln!("{} {}", self.theme.message_head(), e);
            }
        }
        Ok(Flow::Continue)
    }

    fn run_builtin(&self, builtin: Builtin, arguments: &[String]) -> Result<Flow, Box<dyn Error>> {
        let mut out = io::stdout().lock();
        match builtin {
            Builtin::Quit => return Ok(Flow::Quit),
            Builtin::Cd => {
                if let Err(e) = builtins::builtin_cd(arguments) {
                    eprintln!("{} {}", self.theme.message_head(), e);
                }
            }
            Builtin::SetEnv => {
                if let Err(message) = builtins::builtin_setenv(arguments) {
                    for line in message.lines() {
                        eprintln!("{} {}", self.theme.message_head(), line);
                    }
                }
            }
            Builtin::ListEnv => builtins::builtin_listenv(&mut out)?,
            Builtin::History => builtins::builtin_history(&mut out, self.readline.history())?,
            Builtin::Help => builtins::builtin_help(&mut out)?,
        }
        Ok(Flow::Continue)
    }

    fn report_status(&self, status: WaitStatus) {
        let detail = match status {
            WaitStatus::Exited(_, 0) => return,
            WaitStatus::Exited(_, code) => format!("exit {}", code),
            WaitStatus::Signaled(_, sig, _) => format!("killed by {}", sig),
            _ => return,
        };
        eprintln!(
            "{} {}",
            (self.theme.error_style)(&self.theme.error_symbol),
            (self.theme.error_style)(&detail)
        );
    }

    fn report_finished_jobs(&mut self) {
        for job in self.executor.reap_background() {
            println!("{}", job);
        }
    }
}
