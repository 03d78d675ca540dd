//! 发票开具流程 - 流程层
//!
//! 核心职责：定义"一条记录"的完整开具流程
//!
//! 状态顺序（线性，无分支）：
//! Searching → ActivitySelected → DescriptionAttached → AmountEntered → Issued → Reset
//!
//! 任一状态失败立即中止该记录，不在记录内重试；Reset 失败不影响已开具的结果。

use std::fmt::Display;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::config::Config;
use crate::infrastructure::{PageActions, PageIntent};
use crate::models::Record;
use crate::services::DiagnosticsWriter;
use crate::workflow::record_ctx::RecordCtx;
use crate::workflow::step_executor::{Step, StepExecutor, StepOutcome};

/// 单条记录的流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Searching,
    ActivitySelected,
    DescriptionAttached,
    AmountEntered,
    Issued,
    Reset,
}

impl WorkflowState {
    pub const FIRST: WorkflowState = WorkflowState::Searching;

    pub fn next(self) -> Option<Self> {
        match self {
            WorkflowState::Searching => Some(WorkflowState::ActivitySelected),
            WorkflowState::ActivitySelected => Some(WorkflowState::DescriptionAttached),
            WorkflowState::DescriptionAttached => Some(WorkflowState::AmountEntered),
            WorkflowState::AmountEntered => Some(WorkflowState::Issued),
            WorkflowState::Issued => Some(WorkflowState::Reset),
            WorkflowState::Reset => None,
        }
    }
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowState::Searching => "Searching",
            WorkflowState::ActivitySelected => "ActivitySelected",
            WorkflowState::DescriptionAttached => "DescriptionAttached",
            WorkflowState::AmountEntered => "AmountEntered",
            WorkflowState::Issued => "Issued",
            WorkflowState::Reset => "Reset",
        };
        f.write_str(name)
    }
}

/// 单条记录的流程结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// 已开具
    Issued {
        /// 页面返回的票号（可能没有）
        confirmation: Option<String>,
        /// 表单是否已被正常清空
        clean_reset: bool,
    },
    /// 在某个状态中止
    Aborted { state: WorkflowState, reason: String },
}

/// 发票开具流程
///
/// - 决定每个状态执行什么页面操作
/// - 不持有页面资源，页面由调用方传入
pub struct InvoiceFlow {
    steps: StepExecutor,
    activity_code: String,
    amount_column: String,
    default_amount: f64,
}

impl InvoiceFlow {
    pub fn new(config: &Config) -> Self {
        let diagnostics = DiagnosticsWriter::new(&config.diagnostics_dir, config.dump_markup);
        Self::with_executor(
            StepExecutor::new(config.wait_policy(), config.missing_data_policy, diagnostics),
            config,
        )
    }

    pub fn with_executor(steps: StepExecutor, config: &Config) -> Self {
        Self {
            steps,
            activity_code: config.activity_code.clone(),
            amount_column: config.amount_column.clone(),
            default_amount: config.default_amount,
        }
    }

    /// 对一条记录执行完整流程
    pub async fn run(
        &self,
        page: &dyn PageActions,
        record: &Record,
        ctx: &RecordCtx,
    ) -> WorkflowOutcome {
        let mut state = WorkflowState::FIRST;
        let mut confirmation = None;

        loop {
            let intent = match self.intent_for(state, record) {
                Ok(intent) => intent,
                Err(reason) => {
                    warn!("[记录 {}]   ✗ {}", ctx.index, reason);
                    return WorkflowOutcome::Aborted { state, reason };
                }
            };
            let step = Step::new(intent, self.steps.wait_policy());
            let outcome = self.steps.execute(page, &step, ctx).await;

            match (state, outcome) {
                (WorkflowState::Reset, outcome) => {
                    let clean_reset = outcome.is_success();
                    if !clean_reset {
                        warn!("[记录 {}]   ⚠️ 表单清空失败，需要重新加载页面", ctx.index);
                    }
                    return WorkflowOutcome::Issued {
                        confirmation,
                        clean_reset,
                    };
                }
                (_, StepOutcome::Failure { reason }) => {
                    return WorkflowOutcome::Aborted { state, reason };
                }
                (WorkflowState::Issued, StepOutcome::Success { text }) => {
                    confirmation = text.as_deref().and_then(confirmation_number);
                    match &confirmation {
                        Some(number) => info!("[记录 {}]   ✓ 票号: {}", ctx.index, number),
                        None => info!("[记录 {}]   ✓ 已开具（页面未显示票号）", ctx.index),
                    }
                }
                (_, StepOutcome::Success { .. }) => {}
            }

            state = match state.next() {
                Some(next) => next,
                None => {
                    return WorkflowOutcome::Issued {
                        confirmation,
                        clean_reset: true,
                    }
                }
            };
        }
    }

    /// 每个状态的进入动作
    fn intent_for(&self, state: WorkflowState, record: &Record) -> Result<PageIntent, String> {
        let intent = match state {
            WorkflowState::Searching => PageIntent::SearchTaxpayer {
                taxpayer_id: record.normalized_key(),
            },
            WorkflowState::ActivitySelected => PageIntent::SelectActivity {
                code: self.activity_code.clone(),
            },
            WorkflowState::DescriptionAttached => PageIntent::AttachDescription,
            WorkflowState::AmountEntered => PageIntent::EnterAmount {
                amount: self.amount_of(record)?,
            },
            WorkflowState::Issued => PageIntent::Submit,
            WorkflowState::Reset => PageIntent::ResetForm,
        };
        Ok(intent)
    }

    fn amount_of(&self, record: &Record) -> Result<f64, String> {
        match record.field(&self.amount_column).map(str::trim) {
            None | Some("") => Ok(self.default_amount),
            Some(raw) if raw.eq_ignore_ascii_case("nan") => Ok(self.default_amount),
            Some(raw) => parse_amount(raw).ok_or_else(|| format!("valor: 金额无效 '{}'", raw)),
        }
    }
}

/// 解析金额，支持 `110,00`、`110.00`、`R$ 1.234,56`
///
/// 同时出现 `.` 和 `,` 时，靠后的那个是小数点。
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite() && *amount > 0.0)
}

/// 从开具成功提示中提取票号（第一段连续数字）
pub fn confirmation_number(text: &str) -> Option<String> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid regex"));
    re.find(text).map(|m| m.as_str().to_string())
}
