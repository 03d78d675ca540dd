//! 页面操作端口
//!
//! 流程层只通过这个 trait 与远端页面交互，不关心元素如何定位。
//! 具体实现见 `services::NfsePage`（chromiumoxide），测试中使用脚本化的假实现。

use std::fmt::Display;

use async_trait::async_trait;

use crate::error::AppResult;

/// 页面级操作意图
#[derive(Debug, Clone, PartialEq)]
pub enum PageIntent {
    /// 填写纳税人识别号并查询
    SearchTaxpayer { taxpayer_id: String },
    /// 选择服务活动
    SelectActivity { code: String },
    /// 载入收藏的描述
    AttachDescription,
    /// 填写服务金额
    EnterAmount { amount: f64 },
    /// 提交开具
    Submit,
    /// 为下一条记录清空表单
    ResetForm,
}

impl PageIntent {
    /// 用于日志与诊断文件名的短名称
    pub fn name(&self) -> &'static str {
        match self {
            PageIntent::SearchTaxpayer { .. } => "cpf",
            PageIntent::SelectActivity { .. } => "atividade",
            PageIntent::AttachDescription => "descricao",
            PageIntent::EnterAmount { .. } => "valor",
            PageIntent::Submit => "emissao",
            PageIntent::ResetForm => "limpar",
        }
    }
}

impl Display for PageIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageIntent::SearchTaxpayer { taxpayer_id } => write!(f, "查询纳税人 {}", taxpayer_id),
            PageIntent::SelectActivity { code } => write!(f, "选择活动 {}", code),
            PageIntent::AttachDescription => write!(f, "添加描述"),
            PageIntent::EnterAmount { amount } => write!(f, "填写金额 {:.2}", amount),
            PageIntent::Submit => write!(f, "提交开具"),
            PageIntent::ResetForm => write!(f, "清空表单"),
        }
    }
}

/// 页面操作失败的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 找不到元素
    ElementNotFound,
    /// 页面状态不符合预期
    UnexpectedState,
    /// 操作后的校验未通过
    AssertionFailed,
    /// 与浏览器的通信失败
    Transport,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ElementNotFound => "element_not_found",
            FailureKind::UnexpectedState => "unexpected_state",
            FailureKind::AssertionFailed => "assertion_failed",
            FailureKind::Transport => "transport",
        }
    }

    /// 页面脚本返回的类别字符串，无法识别时视为状态异常
    pub fn from_code(code: &str) -> Self {
        match code {
            "element_not_found" => FailureKind::ElementNotFound,
            "assertion_failed" => FailureKind::AssertionFailed,
            "transport" => FailureKind::Transport,
            _ => FailureKind::UnexpectedState,
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次页面操作的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// 操作完成，可能附带从页面提取的文本（例如票号提示）
    Done { text: Option<String> },
    /// 操作失败
    Failed { kind: FailureKind, message: String },
}

impl ActionOutcome {
    pub fn done() -> Self {
        ActionOutcome::Done { text: None }
    }

    pub fn done_with(text: impl Into<String>) -> Self {
        ActionOutcome::Done {
            text: Some(text.into()),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        ActionOutcome::Failed {
            kind,
            message: message.into(),
        }
    }
}

/// 页面操作能力
///
/// `Err` 只用于通信层面的错误，页面上的业务失败用 `ActionOutcome::Failed` 表达。
#[async_trait]
pub trait PageActions: Send + Sync {
    /// 定位并执行一个页面操作
    async fn perform(&self, intent: &PageIntent) -> AppResult<ActionOutcome>;

    /// busy 指示当前是否可见
    async fn is_busy(&self) -> AppResult<bool>;

    /// 当前页面截图（PNG）
    async fn screenshot(&self) -> AppResult<Vec<u8>>;

    /// 当前页面 HTML
    async fn markup(&self) -> AppResult<String>;

    /// 重新加载页面，回到干净状态
    async fn hard_reset(&self) -> AppResult<()>;
}
