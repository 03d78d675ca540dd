/// 日志工具模块
///
/// 提供日志初始化、日志文件头和格式化输出的辅助函数
use std::fs;
use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；否则 `verbose` 时为 debug，平时为 info。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\nNFS-e 批量开具日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .map_err(|e| AppError::file_write_failed(Path::new(log_file_path), e))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(data_file: &str, checkpoint_interval: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - NFS-e 批量开具");
    info!("📁 数据文件: {}", data_file);
    info!("💾 每 {} 条保存一次", checkpoint_interval);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_report(report: &impl std::fmt::Display, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 最终报告");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for line in report.to_string().lines() {
        info!("{}", line);
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_text("Condicionamento físico", 14), "Condicionament...");
        assert_eq!(truncate_text("curto", 10), "curto");
    }

    #[test]
    fn log_file_starts_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        init_log_file(path.to_str().unwrap()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("NFS-e 批量开具日志"));
    }
}
