use std::path::PathBuf;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 数据文件错误
    #[error("数据文件错误: {0}")]
    Store(#[from] StoreError),
    /// 页面交互错误
    #[error("页面错误: {0}")]
    Page(#[from] PageError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: BoxedSource,
    },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {source}")]
    LaunchFailed {
        #[source]
        source: BoxedSource,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: BoxedSource,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: BoxedSource,
    },
    /// 截图失败
    #[error("截图失败: {source}")]
    ScreenshotFailed {
        #[source]
        source: BoxedSource,
    },
}

/// 数据文件（记录存储）错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 文件不存在
    #[error("文件不存在: {}", path.display())]
    NotFound { path: PathBuf },
    /// 读取失败
    #[error("读取文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: BoxedSource,
    },
    /// 写入失败（例如文件被其他程序锁定）
    #[error("写入文件失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: BoxedSource,
    },
    /// 工作簿里没有任何工作表
    #[error("工作簿中没有工作表: {}", path.display())]
    EmptyWorkbook { path: PathBuf },
    /// 缺少主键列
    #[error("缺少必需的列: {column}")]
    MissingKeyColumn { column: String },
    /// 单元格内容无法解析
    #[error("第 {row} 行的 {column} 无法解析: {value}")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },
}

/// 页面交互错误
#[derive(Debug, Error)]
pub enum PageError {
    /// 页面脚本返回了无法识别的结果
    #[error("无法识别的页面返回值: {0}")]
    UnexpectedResponse(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("配置文件 {path} 读取失败: {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("配置文件 {path} 解析失败: {source}")]
    FileParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Page(PageError::UnexpectedResponse(err.to_string()))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建浏览器启动错误
    pub fn browser_launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Store(StoreError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Store(StoreError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
