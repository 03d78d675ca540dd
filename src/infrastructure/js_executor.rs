//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"、截图、取 HTML 和重新加载的能力

use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult, BrowserError};

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 不认识 Record / 发票
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 整页截图（PNG）
    pub async fn screenshot(&self) -> AppResult<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page.screenshot(params).await.map_err(|e| {
            AppError::Browser(BrowserError::ScreenshotFailed {
                source: Box::new(e),
            })
        })
    }

    /// 当前页面 HTML
    pub async fn content(&self) -> AppResult<String> {
        Ok(self.page.content().await?)
    }

    /// 重新导航到指定 URL
    pub async fn goto(&self, url: &str) -> AppResult<()> {
        self.page.goto(url).await.map_err(|e| {
            AppError::Browser(BrowserError::NavigationFailed {
                url: url.to_string(),
                source: Box::new(e),
            })
        })?;
        Ok(())
    }

    /// 刷新当前页面
    pub async fn reload(&self) -> AppResult<()> {
        self.page.reload().await?;
        Ok(())
    }
}
