use forksh::shell::Shell;
use forksh::utils::config::Config;
use forksh::utils::log::init_logger;
use forksh::utils::theme::load_theme;
use log::{debug, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    init_logger(&config);
    if let Err(e) = config.ensure_dirs() {
        warn!("无法创建历史记录目录: {}", e);
    }
    debug!("配置加载成功 {}", config.config_dir.display());
    let theme = load_theme(&config.theme);

    let mut shell = Shell::new(&config, &theme)?;
    shell.run()
}
