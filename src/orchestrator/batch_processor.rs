//! 应用入口 - 编排层
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、加载数据文件、连接浏览器、创建 `NfsePage`
//! 2. **人工登录**：导航到开具页面后等待操作员登录并确认
//! 3. **批量处理**：委托 `BatchDriver` 顺序处理所有记录
//! 4. **中断处理**：Ctrl-C 只设置停止标志，当前记录处理完后停止并保存
//! 5. **收尾**：输出报告，等待操作员确认后释放浏览器
//!
//! 资源所有者：唯一持有 Browser 的模块。

use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::JsExecutor;
use crate::models::RecordStore;
use crate::orchestrator::batch_driver::{BatchDriver, DriverOptions, Report, StopFlag};
use crate::services::NfsePage;
use crate::utils::{logging, prompt};
use crate::workflow::InvoiceFlow;

/// 未配置数据文件时提示的默认值
const DEFAULT_DATA_FILE: &str = "notas_fiscais.xlsx";

/// 第二次 Ctrl-C 时的退出码（128 + SIGINT）
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// 应用主结构
pub struct App {
    config: Config,
    store: RecordStore,
    browser: Browser,
    page: NfsePage,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;

        let data_file = match &config.data_file {
            Some(path) => path.clone(),
            None => prompt::ask_data_file(DEFAULT_DATA_FILE).await?,
        };
        if !Path::new(&data_file).exists() {
            anyhow::bail!("文件不存在: {} (请确认文件在当前目录中)", data_file);
        }
        info!("✓ 找到数据文件: {}", data_file);

        logging::log_startup(&data_file, config.checkpoint_interval);

        // 先加载数据，文件有问题时不必打开浏览器
        let store = RecordStore::load(&data_file, delimiter_byte(config.csv_delimiter)?, &config.key_column)
            .with_context(|| format!("无法加载数据文件: {}", data_file))?;

        let (browser, page) = if config.launch_browser {
            browser::launch_browser(config.chrome_executable.as_deref(), &config.target_url).await?
        } else {
            browser::connect_to_browser_and_page(config.browser_debug_port, &config.target_url)
                .await?
        };
        let page = NfsePage::new(JsExecutor::new(page), config.target_url.clone());

        Ok(Self {
            config,
            store,
            browser,
            page,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<Report> {
        if self.store.is_empty() {
            warn!("⚠️ 数据文件中没有记录，程序结束");
            return Ok(Report::default());
        }

        info!("\n{}", "⚠".repeat(30));
        info!("  注意: 请在浏览器中登录系统");
        info!("{}", "⚠".repeat(30));
        prompt::wait_for_enter("\n➤ 登录完成后按回车继续...\n").await?;

        let stop = StopFlag::new();
        spawn_interrupt_listener(stop.clone());

        let driver = BatchDriver::new(
            &self.page,
            InvoiceFlow::new(&self.config),
            DriverOptions::from_config(&self.config),
        )
        .with_stop_flag(stop);
        let report = driver.run(&mut self.store).await;

        logging::print_final_report(&report, &self.config.output_log_file);

        if !report.interrupted {
            prompt::wait_for_enter("➤ 按回车关闭浏览器...").await?;
        }
        if let Err(e) = self.browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        info!("\n✓ 处理结束");

        Ok(report)
    }
}

/// 第一次 Ctrl-C 只请求停止，第二次直接退出进程
fn spawn_interrupt_listener(stop: StopFlag) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if should_exit_on_interrupt(&stop) {
                warn!("\n⚠️ 再次收到中断，立即退出");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            warn!("\n⚠️ 收到中断，当前记录完成后停止（已保存的进度不受影响，再按一次 Ctrl-C 立即退出）");
        }
    });
}

/// 已经请求过停止时返回 true，否则请求停止
fn should_exit_on_interrupt(stop: &StopFlag) -> bool {
    if stop.is_requested() {
        return true;
    }
    stop.request();
    false
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("CSV 分隔符必须是 ASCII 字符: {:?}", delimiter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_must_be_ascii() {
        assert_eq!(delimiter_byte(';').unwrap(), b';');
        assert!(delimiter_byte('§').is_err());
    }

    #[test]
    fn second_interrupt_requests_exit() {
        let stop = StopFlag::new();
        assert!(!should_exit_on_interrupt(&stop));
        assert!(stop.is_requested());
        assert!(should_exit_on_interrupt(&stop));
    }
}
