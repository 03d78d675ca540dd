use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult, BrowserError};

/// 连接到已打开调试端口的浏览器并获取页面
///
/// 优先复用 URL 以 `target_url` 开头的已有标签页（操作员可能已经在里面登录），
/// 否则新建页面并导航过去。
pub async fn connect_to_browser_and_page(port: u16, target_url: &str) -> AppResult<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::browser_connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    let wanted = page_prefix(target_url);
    for p in pages.iter() {
        if let Ok(Some(url)) = p.url().await {
            debug!("检查页面: {}", url);
            if url.starts_with(wanted) {
                info!("✓ 复用已打开的页面: {}", url);
                return Ok((browser, p.clone()));
            }
        }
    }

    debug!("创建新页面并导航到: {}", target_url);
    let page = browser.new_page("about:blank").await?;
    page.goto(target_url).await.map_err(|e| {
        error!("导航到 {} 失败: {}", target_url, e);
        AppError::Browser(BrowserError::NavigationFailed {
            url: target_url.to_string(),
            source: Box::new(e),
        })
    })?;
    info!("已导航到: {}", target_url);

    Ok((browser, page))
}

/// 去掉查询串，只比较路径部分
fn page_prefix(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}
