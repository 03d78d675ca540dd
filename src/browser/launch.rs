use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult, BrowserError};

/// 启动一个带界面的浏览器并导航到指定 URL
///
/// 需要操作员手动登录，所以不能使用无头模式。
pub async fn launch_browser(executable: Option<&str>, url: &str) -> AppResult<(Browser, Page)> {
    info!("🚀 启动浏览器...");
    debug!("目标 URL: {}", url);

    let mut builder = BrowserConfig::builder()
        .with_head()
        .args(vec!["--disable-dev-shm-usage", "--start-maximized"]);
    if let Some(path) = executable {
        builder = builder.chrome_executable(Path::new(path));
    }
    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        AppError::Other(format!("配置浏览器失败: {}", e))
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        AppError::browser_launch_failed(e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page(url).await.map_err(|e| {
        error!("创建页面失败: {}", e);
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.to_string(),
            source: Box::new(e),
        })
    })?;

    info!("✅ 浏览器已导航到: {}", url);
    Ok((browser, page))
}
