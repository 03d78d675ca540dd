use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 数据未能在页面上显示时的处理策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPolicy {
    /// 视为步骤失败
    Abort,
    /// 记录警告并继续
    WarnAndContinue,
}

impl std::str::FromStr for DataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(DataPolicy::Abort),
            "warn" | "warn_and_continue" => Ok(DataPolicy::WarnAndContinue),
            other => Err(format!("未知的策略: {}", other)),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 是否自行启动浏览器（否则连接调试端口上已运行的浏览器）
    pub launch_browser: bool,
    /// 浏览器可执行文件（仅在自行启动时使用）
    pub chrome_executable: Option<String>,
    /// 发票开具页面
    pub target_url: String,
    /// 数据文件（为空时启动后询问）
    pub data_file: Option<String>,
    /// CSV 分隔符
    pub csv_delimiter: char,
    /// 主键列（纳税人识别号）
    pub key_column: String,
    /// 金额列
    pub amount_column: String,
    /// 金额列为空时使用的默认金额
    pub default_amount: f64,
    /// 服务活动代码
    pub activity_code: String,
    /// 每处理多少条记录保存一次
    pub checkpoint_interval: usize,
    /// 两条记录之间的停顿（毫秒）
    pub pause_between_records_ms: u64,
    /// 等待 busy 指示消失的默认超时（秒）
    pub busy_timeout_secs: u64,
    /// 填写金额后的等待超时（秒）
    pub amount_timeout_secs: u64,
    /// 提交后的等待超时（秒）
    pub submit_timeout_secs: u64,
    /// busy 轮询间隔（毫秒）
    pub busy_poll_ms: u64,
    /// 页面数据未显示时的策略
    pub missing_data_policy: DataPolicy,
    /// 失败截图与 HTML 的存放目录
    pub diagnostics_dir: String,
    /// 失败时是否同时保存页面 HTML
    pub dump_markup: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 实际读取的配置文件（没有读取时为 None）
    #[serde(skip)]
    pub source_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            launch_browser: false,
            chrome_executable: None,
            target_url: "https://notafiscal.belem.pa.gov.br/notafiscal/paginas/notafiscal/emissaoNotaFiscalData.jsf"
                .to_string(),
            data_file: None,
            csv_delimiter: ',',
            key_column: "CPF".to_string(),
            amount_column: "Valor".to_string(),
            default_amount: 110.0,
            activity_code: "931310000".to_string(),
            checkpoint_interval: 3,
            pause_between_records_ms: 2000,
            busy_timeout_secs: 10,
            amount_timeout_secs: 5,
            submit_timeout_secs: 15,
            busy_poll_ms: 250,
            missing_data_policy: DataPolicy::WarnAndContinue,
            diagnostics_dir: ".".to_string(),
            dump_markup: true,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            source_file: None,
        }
    }
}

impl Config {
    /// 加载配置：默认值 → TOML 文件（可选）→ 环境变量
    ///
    /// 此时日志尚未初始化，读取了哪个文件记录在 `source_file` 中。
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("NFSE_CONFIG").unwrap_or_else(|_| "nfse.toml".to_string());
        let base = if Path::new(&path).exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };
        base.with_env_overrides()
    }

    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
                path: path.to_string(),
                source,
            })?;
        let mut config =
            Self::from_toml_str(&content).map_err(|source| ConfigError::FileParseFailed {
                path: path.to_string(),
                source,
            })?;
        config.source_file = Some(path.to_string());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 用环境变量覆盖当前配置
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", self.browser_debug_port)?,
            launch_browser: env_parse("LAUNCH_BROWSER", self.launch_browser)?,
            chrome_executable: std::env::var("CHROME_EXECUTABLE")
                .ok()
                .or(self.chrome_executable),
            target_url: std::env::var("TARGET_URL").unwrap_or(self.target_url),
            data_file: std::env::var("DATA_FILE").ok().or(self.data_file),
            csv_delimiter: env_parse("CSV_DELIMITER", self.csv_delimiter)?,
            key_column: std::env::var("KEY_COLUMN").unwrap_or(self.key_column),
            amount_column: std::env::var("AMOUNT_COLUMN").unwrap_or(self.amount_column),
            default_amount: env_parse("DEFAULT_AMOUNT", self.default_amount)?,
            activity_code: std::env::var("ACTIVITY_CODE").unwrap_or(self.activity_code),
            checkpoint_interval: env_parse("CHECKPOINT_INTERVAL", self.checkpoint_interval)?,
            pause_between_records_ms: env_parse(
                "PAUSE_BETWEEN_RECORDS_MS",
                self.pause_between_records_ms,
            )?,
            busy_timeout_secs: env_parse("BUSY_TIMEOUT_SECS", self.busy_timeout_secs)?,
            amount_timeout_secs: env_parse("AMOUNT_TIMEOUT_SECS", self.amount_timeout_secs)?,
            submit_timeout_secs: env_parse("SUBMIT_TIMEOUT_SECS", self.submit_timeout_secs)?,
            busy_poll_ms: env_parse("BUSY_POLL_MS", self.busy_poll_ms)?,
            missing_data_policy: env_parse("MISSING_DATA_POLICY", self.missing_data_policy)?,
            diagnostics_dir: std::env::var("DIAGNOSTICS_DIR").unwrap_or(self.diagnostics_dir),
            dump_markup: env_parse("DUMP_MARKUP", self.dump_markup)?,
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging)?,
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
            source_file: self.source_file,
        })
    }

    /// 步骤等待策略
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            busy_timeout: Duration::from_secs(self.busy_timeout_secs),
            amount_timeout: Duration::from_secs(self.amount_timeout_secs),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            poll_interval: Duration::from_millis(self.busy_poll_ms.max(1)),
        }
    }
}

/// busy 指示的等待策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub busy_timeout: Duration,
    pub amount_timeout: Duration,
    pub submit_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Config::default().wait_policy()
    }
}

fn env_parse<T>(var_name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_only_given_fields() {
        let config = Config::from_toml_str(
            r#"
            checkpoint_interval = 5
            key_column = "CNPJ"
            missing_data_policy = "abort"
            "#,
        )
        .unwrap();

        assert_eq!(config.checkpoint_interval, 5);
        assert_eq!(config.key_column, "CNPJ");
        assert_eq!(config.missing_data_policy, DataPolicy::Abort);
        assert_eq!(config.amount_column, "Valor");
        assert_eq!(config.submit_timeout_secs, 15);
    }

    #[test]
    fn wait_policy_uses_per_step_timeouts() {
        let policy = Config::default().wait_policy();
        assert_eq!(policy.busy_timeout, Duration::from_secs(10));
        assert_eq!(policy.amount_timeout, Duration::from_secs(5));
        assert_eq!(policy.submit_timeout, Duration::from_secs(15));
    }

    #[test]
    fn toml_file_is_remembered_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nfse.toml");
        std::fs::write(&path, "checkpoint_interval = 7\n").unwrap();
        let path = path.to_string_lossy().to_string();

        let config = Config::from_toml_file(&path).unwrap();

        assert_eq!(config.checkpoint_interval, 7);
        assert_eq!(config.source_file.as_deref(), Some(path.as_str()));
        assert_eq!(Config::default().source_file, None);
    }

    #[test]
    fn data_policy_parses_aliases() {
        assert_eq!("warn".parse::<DataPolicy>(), Ok(DataPolicy::WarnAndContinue));
        assert_eq!("ABORT".parse::<DataPolicy>(), Ok(DataPolicy::Abort));
        assert!("later".parse::<DataPolicy>().is_err());
    }
}
