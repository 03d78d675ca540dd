//! 诊断快照服务 - 业务能力层
//!
//! 只负责"步骤失败时保存截图和 HTML"能力，不关心流程

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::infrastructure::PageActions;

/// 诊断快照写入服务
///
/// 文件以失败的步骤命名：
/// - `erro_<步骤>_<识别号>.png`
/// - `debug_<步骤>_<识别号>.html`（开启 `dump_markup` 时）
pub struct DiagnosticsWriter {
    dir: PathBuf,
    dump_markup: bool,
}

impl DiagnosticsWriter {
    pub fn new(dir: impl Into<PathBuf>, dump_markup: bool) -> Self {
        Self {
            dir: dir.into(),
            dump_markup,
        }
    }

    /// 不写任何文件
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            dump_markup: false,
        }
    }

    fn is_disabled(&self) -> bool {
        self.dir.as_os_str().is_empty()
    }

    pub fn screenshot_path(&self, step: &str, key: &str) -> PathBuf {
        self.dir
            .join(format!("erro_{}_{}.png", step, sanitize(key)))
    }

    pub fn markup_path(&self, step: &str, key: &str) -> PathBuf {
        self.dir
            .join(format!("debug_{}_{}.html", step, sanitize(key)))
    }

    /// 保存当前页面的截图和 HTML，返回成功写入的文件
    ///
    /// 任何失败都只记录警告。
    pub async fn capture(&self, page: &dyn PageActions, step: &str, key: &str) -> Vec<PathBuf> {
        if self.is_disabled() {
            return Vec::new();
        }

        let mut written = Vec::new();

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("无法创建诊断目录 {}: {}", self.dir.display(), e);
            return written;
        }

        match page.screenshot().await {
            Ok(png) => {
                let path = self.screenshot_path(step, key);
                if write_file(&path, &png).await {
                    info!("    ℹ 截图已保存: {}", path.display());
                    written.push(path);
                }
            }
            Err(e) => warn!("    ⚠️ 截图失败: {}", e),
        }

        if self.dump_markup {
            match page.markup().await {
                Ok(html) => {
                    let path = self.markup_path(step, key);
                    if write_file(&path, html.as_bytes()).await {
                        info!("    ℹ HTML 已保存: {}", path.display());
                        written.push(path);
                    }
                }
                Err(e) => warn!("    ⚠️ 获取 HTML 失败: {}", e),
            }
        }

        written
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> bool {
    debug!("写入诊断文件: {} ({} 字节)", path.display(), bytes.len());
    match tokio::fs::write(path, bytes).await {
        Ok(()) => true,
        Err(e) => {
            warn!("    ⚠️ 写入 {} 失败: {}", path.display(), e);
            false
        }
    }
}

/// 只保留字母数字，避免识别号中的 `/` 变成路径
fn sanitize(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "sem_id".to_string()
    } else {
        cleaned
    }
}
