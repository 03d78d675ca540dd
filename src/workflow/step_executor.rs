//! 步骤执行器 - 流程层
//!
//! 执行单个页面步骤：调用端口 → 等待 busy 指示消失 → 校验 → 分类结果。
//! 所有失败都转换为 `StepOutcome::Failure`，不会向上抛出。

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{DataPolicy, WaitPolicy};
use crate::infrastructure::{ActionOutcome, FailureKind, PageActions, PageIntent};
use crate::services::DiagnosticsWriter;
use crate::utils::logging::truncate_text;
use crate::workflow::record_ctx::RecordCtx;

/// 页面上显示的数据少于等于这个字符数时视为"没有加载"
const MIN_VISIBLE_DATA_CHARS: usize = 3;

/// 步骤描述
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub intent: PageIntent,
    /// 等待 busy 指示消失的上限
    pub busy_timeout: Duration,
    /// 操作完成后页面是否应当显示数据（例如纳税人名称）
    pub expects_data: bool,
}

impl Step {
    /// 按意图选择等待时间
    pub fn new(intent: PageIntent, policy: &WaitPolicy) -> Self {
        let busy_timeout = match intent {
            PageIntent::Submit => policy.submit_timeout,
            PageIntent::EnterAmount { .. } => policy.amount_timeout,
            _ => policy.busy_timeout,
        };
        let expects_data = matches!(intent, PageIntent::SearchTaxpayer { .. });
        Self {
            intent,
            busy_timeout,
            expects_data,
        }
    }

    pub fn name(&self) -> &'static str {
        self.intent.name()
    }
}

/// 步骤结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success { text: Option<String> },
    Failure { reason: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

/// 步骤执行器
pub struct StepExecutor {
    wait: WaitPolicy,
    data_policy: DataPolicy,
    diagnostics: DiagnosticsWriter,
}

impl StepExecutor {
    pub fn new(wait: WaitPolicy, data_policy: DataPolicy, diagnostics: DiagnosticsWriter) -> Self {
        Self {
            wait,
            data_policy,
            diagnostics,
        }
    }

    pub fn wait_policy(&self) -> &WaitPolicy {
        &self.wait
    }

    /// 执行一个步骤
    pub async fn execute(&self, page: &dyn PageActions, step: &Step, ctx: &RecordCtx) -> StepOutcome {
        info!("[记录 {}] → {}", ctx.index, step.intent);

        let outcome = match page.perform(&step.intent).await {
            Ok(outcome) => outcome,
            Err(e) => ActionOutcome::failed(FailureKind::Transport, e.to_string()),
        };

        let text = match outcome {
            ActionOutcome::Done { text } => text,
            ActionOutcome::Failed { kind, message } => {
                return self.fail(page, step, ctx, kind, &message).await;
            }
        };

        self.wait_until_idle(page, step.busy_timeout).await;

        if step.expects_data && !has_visible_data(text.as_deref()) {
            let shown = text.as_deref().map(|t| t.trim().chars().count()).unwrap_or(0);
            match self.data_policy {
                DataPolicy::Abort => {
                    let message = format!("页面数据没有加载 ({} 个字符)", shown);
                    return self
                        .fail(page, step, ctx, FailureKind::AssertionFailed, &message)
                        .await;
                }
                DataPolicy::WarnAndContinue => {
                    warn!(
                        "[记录 {}]   ⚠️ 页面数据为空 ({} 个字符)，继续执行",
                        ctx.index, shown
                    );
                }
            }
        }

        if let Some(t) = &text {
            debug!("[记录 {}]   页面返回: {}", ctx.index, truncate_text(t, 60));
        }
        info!("[记录 {}]   ✓ {} 完成", ctx.index, step.name());
        StepOutcome::Success { text }
    }

    /// 等待 busy 指示消失；超时后照常继续
    ///
    /// 返回 busy 是否在超时前消失。查询 busy 本身失败时视为已消失。
    pub async fn wait_until_idle(&self, page: &dyn PageActions, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            match page.is_busy().await {
                Ok(false) => return true,
                Ok(true) => {}
                Err(e) => {
                    debug!("无法读取 busy 状态: {}", e);
                    return true;
                }
            }
            if started.elapsed() >= timeout {
                warn!("    ℹ 等待 busy 超时 ({:?})，继续执行", timeout);
                return false;
            }
            sleep(self.wait.poll_interval).await;
        }
    }

    async fn fail(
        &self,
        page: &dyn PageActions,
        step: &Step,
        ctx: &RecordCtx,
        kind: FailureKind,
        message: &str,
    ) -> StepOutcome {
        let reason = format!("{}: [{}] {}", step.name(), kind, message);
        warn!("[记录 {}]   ✗ {}", ctx.index, reason);
        self.diagnostics.capture(page, step.name(), &ctx.key).await;
        StepOutcome::Failure { reason }
    }
}

fn has_visible_data(text: Option<&str>) -> bool {
    text.map(|t| t.trim().chars().count() > MIN_VISIBLE_DATA_CHARS)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult, PageError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 单步测试用的页面：固定返回一个结果，busy 持续指定次数
    struct OneShotPage {
        outcome: Mutex<Option<AppResult<ActionOutcome>>>,
        busy_polls: AtomicUsize,
        screenshots: AtomicUsize,
    }

    impl OneShotPage {
        fn new(outcome: AppResult<ActionOutcome>, busy_polls: usize) -> Self {
            Self {
                outcome: Mutex::new(Some(outcome)),
                busy_polls: AtomicUsize::new(busy_polls),
                screenshots: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageActions for OneShotPage {
        async fn perform(&self, _intent: &PageIntent) -> AppResult<ActionOutcome> {
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(ActionOutcome::done()))
        }

        async fn is_busy(&self) -> AppResult<bool> {
            let left = self.busy_polls.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(false);
            }
            self.busy_polls.store(left - 1, Ordering::SeqCst);
            Ok(true)
        }

        async fn screenshot(&self) -> AppResult<Vec<u8>> {
            self.screenshots.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn markup(&self) -> AppResult<String> {
            Ok("<html></html>".to_string())
        }

        async fn hard_reset(&self) -> AppResult<()> {
            Ok(())
        }
    }

    fn fast_policy() -> WaitPolicy {
        WaitPolicy {
            busy_timeout: Duration::from_millis(50),
            amount_timeout: Duration::from_millis(50),
            submit_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn executor(policy: DataPolicy) -> StepExecutor {
        StepExecutor::new(fast_policy(), policy, DiagnosticsWriter::disabled())
    }

    fn ctx() -> RecordCtx {
        RecordCtx::new(1, 1, "111.222.333-44")
    }

    fn search_step() -> Step {
        Step::new(
            PageIntent::SearchTaxpayer {
                taxpayer_id: "11122233344".into(),
            },
            &fast_policy(),
        )
    }

    #[test]
    fn step_timeouts_follow_intent() {
        let policy = WaitPolicy::default();
        assert_eq!(
            Step::new(PageIntent::Submit, &policy).busy_timeout,
            Duration::from_secs(15)
        );
        assert_eq!(
            Step::new(PageIntent::EnterAmount { amount: 1.0 }, &policy).busy_timeout,
            Duration::from_secs(5)
        );
        assert!(!Step::new(PageIntent::AttachDescription, &policy).expects_data);
    }

    #[tokio::test]
    async fn failure_reason_embeds_step_and_kind() {
        let page = OneShotPage::new(
            Ok(ActionOutcome::failed(FailureKind::ElementNotFound, "sem botão")),
            0,
        );
        let step = Step::new(PageIntent::Submit, &fast_policy());

        let outcome = executor(DataPolicy::Abort).execute(&page, &step, &ctx()).await;

        assert_eq!(
            outcome,
            StepOutcome::Failure {
                reason: "emissao: [element_not_found] sem botão".to_string()
            }
        );
    }

    #[tokio::test]
    async fn transport_error_becomes_failure() {
        let page = OneShotPage::new(
            Err(AppError::Page(PageError::UnexpectedResponse("null".into()))),
            0,
        );
        let step = Step::new(PageIntent::ResetForm, &fast_policy());

        let outcome = executor(DataPolicy::Abort).execute(&page, &step, &ctx()).await;

        match outcome {
            StepOutcome::Failure { reason } => assert!(reason.starts_with("limpar: [transport]")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn busy_timeout_is_soft() {
        let page = OneShotPage::new(Ok(ActionOutcome::done()), usize::MAX);
        let step = Step::new(PageIntent::AttachDescription, &fast_policy());

        let outcome = executor(DataPolicy::Abort).execute(&page, &step, &ctx()).await;

        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn wait_returns_once_busy_clears() {
        let page = OneShotPage::new(Ok(ActionOutcome::done()), 2);
        let cleared = executor(DataPolicy::Abort)
            .wait_until_idle(&page, Duration::from_secs(5))
            .await;
        assert!(cleared);
    }

    #[tokio::test]
    async fn missing_data_aborts_under_abort_policy() {
        let page = OneShotPage::new(Ok(ActionOutcome::done_with("Jo")), 0);

        let outcome = executor(DataPolicy::Abort)
            .execute(&page, &search_step(), &ctx())
            .await;

        match outcome {
            StepOutcome::Failure { reason } => {
                assert!(reason.starts_with("cpf: [assertion_failed]"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_data_continues_under_warn_policy() {
        let page = OneShotPage::new(Ok(ActionOutcome::Done { text: None }), 0);

        let outcome = executor(DataPolicy::WarnAndContinue)
            .execute(&page, &search_step(), &ctx())
            .await;

        assert_eq!(outcome, StepOutcome::Success { text: None });
    }

    #[tokio::test]
    async fn failure_captures_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let page = OneShotPage::new(
            Ok(ActionOutcome::failed(FailureKind::UnexpectedState, "modal")),
            0,
        );
        let executor = StepExecutor::new(
            fast_policy(),
            DataPolicy::Abort,
            DiagnosticsWriter::new(dir.path(), true),
        );
        let step = Step::new(PageIntent::AttachDescription, &fast_policy());

        executor.execute(&page, &step, &ctx()).await;

        assert_eq!(page.screenshots.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("erro_descricao_111_222_333_44.png").exists());
        assert!(dir.path().join("debug_descricao_111_222_333_44.html").exists());
    }
}
