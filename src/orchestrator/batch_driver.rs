//! 批量驱动器 - 编排层
//!
//! ## 职责
//!
//! 1. **顺序处理**：按数据文件顺序逐条处理，一条完成后才开始下一条
//! 2. **幂等续跑**：已开具（EMITIDA）的记录直接计为成功并跳过
//! 3. **失败隔离**：单条记录的任何失败（包括 panic）都只把该记录标记为 ERRO
//! 4. **检查点**：每处理 N 条保存一次，结束时再保存一次
//! 5. **全局统计**：汇总成功 / 失败 / 跳过数量

use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::PageActions;
use crate::models::{Record, RecordStore, SaveOutcome, REFERENCE_SENTINEL};
use crate::workflow::{InvoiceFlow, RecordCtx, WorkflowOutcome};

/// 中断信号，只在两条记录之间检查
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 驱动器参数
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// 每处理多少条记录保存一次
    pub checkpoint_interval: usize,
    /// 两条处理中的记录之间的停顿
    pub pause_between_records: Duration,
}

impl DriverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            checkpoint_interval: config.checkpoint_interval,
            pause_between_records: Duration::from_millis(config.pause_between_records_ms),
        }
    }
}

/// 运行报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub total: usize,
    /// 成功数（含跳过的已开具记录）
    pub success: usize,
    pub failure: usize,
    /// 运行前就已开具、本次跳过的记录
    pub skipped: usize,
    /// 是否因中断信号提前结束
    pub interrupted: bool,
}

impl Report {
    /// 成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64 * 100.0
        }
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "总记录数: {}", self.total)?;
        writeln!(f, "✅ 已开具: {} (其中跳过 {})", self.success, self.skipped)?;
        writeln!(f, "❌ 失败: {}", self.failure)?;
        write!(f, "成功率: {:.1}%", self.success_rate())?;
        if self.interrupted {
            write!(f, " (运行被中断)")?;
        }
        Ok(())
    }
}

/// 单条记录的处理结果，写回控制字段
enum RecordResult {
    Emitted(String),
    Failed(String),
}

/// 批量驱动器
pub struct BatchDriver<'a> {
    page: &'a dyn PageActions,
    flow: InvoiceFlow,
    options: DriverOptions,
    stop: StopFlag,
}

impl<'a> BatchDriver<'a> {
    pub fn new(page: &'a dyn PageActions, flow: InvoiceFlow, options: DriverOptions) -> Self {
        Self {
            page,
            flow,
            options,
            stop: StopFlag::new(),
        }
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// 处理整个数据集
    pub async fn run(&self, store: &mut RecordStore) -> Report {
        let total = store.len();
        let interval = self.options.checkpoint_interval.max(1);
        let mut report = Report {
            total,
            ..Default::default()
        };
        let mut processed = 0usize;

        for index in 0..total {
            if self.stop.is_requested() {
                warn!("⚠️ 收到中断信号，停止处理剩余记录");
                report.interrupted = true;
                break;
            }

            let result = {
                let record = &store.records()[index];
                let ctx = RecordCtx::new(index + 1, total, record.key());

                if record.is_emitted() {
                    info!("\n[记录 {}] ✓ 已开具，跳过", ctx.index);
                    report.success += 1;
                    report.skipped += 1;
                    continue;
                }

                if processed > 0 && !self.options.pause_between_records.is_zero() {
                    sleep(self.options.pause_between_records).await;
                }

                log_record_start(&ctx);
                self.process_record(record, &ctx).await
            };

            let Some(record) = store.get_mut(index) else {
                break;
            };
            match result {
                RecordResult::Emitted(reference) => {
                    record.mark_emitted(reference, chrono::Local::now().naive_local());
                    report.success += 1;
                    info!("[记录 {}] ✓✓✓ 成功 ({}/{})", index + 1, report.success, total);
                }
                RecordResult::Failed(reason) => {
                    error!("[记录 {}] ✗✗✗ 失败: {}", index + 1, reason);
                    record.mark_failed(reason);
                    report.failure += 1;
                    info!("[记录 {}] (目前共 {} 条失败)", index + 1, report.failure);
                }
            }

            processed += 1;
            if processed % interval == 0 {
                checkpoint(store, index + 1, total);
            }
        }

        info!("\n{}", "=".repeat(60));
        info!("💾 保存最终结果...");
        match store.save_with_fallback() {
            SaveOutcome::Primary => info!("✓ 数据文件已保存: {}", store.path().display()),
            SaveOutcome::Fallback(path) => warn!("⚠️ 结果已写入备份: {}", path.display()),
            SaveOutcome::Lost => error!("❌ 无法保存结果，请关闭占用数据文件的程序后重试"),
        }

        report
    }

    /// 处理单条记录：流程中的任何失败都在这里收敛
    async fn process_record(&self, record: &Record, ctx: &RecordCtx) -> RecordResult {
        if record.normalized_key().is_empty() {
            return RecordResult::Failed("纳税人识别号为空".to_string());
        }

        let outcome = AssertUnwindSafe(self.flow.run(self.page, record, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(WorkflowOutcome::Issued {
                confirmation,
                clean_reset,
            }) => {
                if !clean_reset {
                    self.hard_reset(ctx).await;
                }
                RecordResult::Emitted(
                    confirmation.unwrap_or_else(|| REFERENCE_SENTINEL.to_string()),
                )
            }
            Ok(WorkflowOutcome::Aborted { state, reason }) => {
                warn!("[记录 {}] 在状态 {} 中止", ctx.index, state);
                self.hard_reset(ctx).await;
                RecordResult::Failed(reason)
            }
            Err(panic) => {
                let reason = format!("意外错误: {}", panic_message(panic.as_ref()));
                self.hard_reset(ctx).await;
                RecordResult::Failed(reason)
            }
        }
    }

    /// 重新加载页面，保证下一条记录从干净的表单开始
    async fn hard_reset(&self, ctx: &RecordCtx) {
        if let Err(e) = self.page.hard_reset().await {
            error!("[记录 {}] 页面重置失败: {}", ctx.index, e);
        }
    }
}

fn checkpoint(store: &RecordStore, done: usize, total: usize) {
    match store.save_with_fallback() {
        SaveOutcome::Primary => info!("\n  💾 进度已保存 ({}/{})", done, total),
        SaveOutcome::Fallback(path) => {
            warn!("\n  💾 进度已写入备份 {} ({}/{})", path.display(), done, total)
        }
        SaveOutcome::Lost => error!("\n  ❌ 进度保存失败 ({}/{})", done, total),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

fn log_record_start(ctx: &RecordCtx) {
    info!("\n{}", "=".repeat(60));
    info!("{} 开始处理", ctx);
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_percentage() {
        let report = Report {
            total: 3,
            success: 2,
            failure: 1,
            ..Default::default()
        };
        assert!((report.success_rate() - 66.666).abs() < 0.01);
        assert!(report.to_string().contains("成功率: 66.7%"));
    }

    #[test]
    fn empty_run_has_zero_rate() {
        assert_eq!(Report::default().success_rate(), 0.0);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }

    #[test]
    fn stop_flag_is_shared_between_clones() {
        let flag = StopFlag::new();
        let clone = flag.clone();
        clone.request();
        assert!(flag.is_requested());
    }
}
