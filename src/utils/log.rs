use crate::utils::config::Config;
use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process;

pub fn parse_level(level: &str) -> LevelFilter {
    match level {
        level if level.eq_ignore_ascii_case("off") => LevelFilter::Off,
        level if level.eq_ignore_ascii_case("error") => LevelFilter::Error,
        level if level.eq_ignore_ascii_case("warn") => LevelFilter::Warn,
        level if level.eq_ignore_ascii_case("info") => LevelFilter::Info,
        level if level.eq_ignore_ascii_case("debug") => LevelFilter::Debug,
        level if level.eq_ignore_ascii_case("trace") => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    }
}

fn open_log_file(config: &Config) -> std::io::Result<(PathBuf, File)> {
    fs::create_dir_all(&config.logger_dir)?;
    let date = Local::now().format("%Y-%m-%d");
    let path = config
        .logger_dir
        .join(format!("{}_{}.log", config.name, date));
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Logs go to stderr and, when it can be opened, a daily file in the log
/// directory.
pub fn init_logger(config: &Config) {
    let level = parse_level(&config.logger_level);

    let mut writers: Vec<Box<dyn Write + Send + Sync>> = vec![Box::new(std::io::stderr())];
    let log_file = open_log_file(config).map(|(path, file)| {
        writers.push(Box::new(file));
        path
    });

    let result = Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[PID:{}][{}] {} - {}",
                process::id(),
                record.level(),
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(MultiWriter { writers })))
        .filter(Some(config.name.as_str()), level)
        .filter(None, LevelFilter::Warn)
        .try_init();

    if result.is_err() {
        return;
    }
    match log_file {
        Ok(path) => log::debug!("日志级别: {}, 日志文件: {}", level, path.display()),
        Err(e) => log::warn!("无法创建日志文件 {}: {}", config.logger_dir.display(), e),
    }
}

struct MultiWriter {
    writers: Vec<Box<dyn Write + Send + Sync>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for writer in &mut self.writers {
            writer.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for writer in &mut self.writers {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("trace"), LevelFilter::Trace);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("nonsense"), LevelFilter::Warn);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_multi_writer_duplicates() {
        let first = tempfile::NamedTempFile::new().unwrap();
        let second = tempfile::NamedTempFile::new().unwrap();
        let mut writer = MultiWriter {
            writers: vec![
                Box::new(first.reopen().unwrap()),
                Box::new(second.reopen().unwrap()),
            ],
        };
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(fs::read_to_string(first.path()).unwrap(), "hello\n");
        assert_eq!(fs::read_to_string(second.path()).unwrap(), "hello\n");
    }
}
