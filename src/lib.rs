//! # NFS-e Batch
//!
//! 通过浏览器批量开具服务发票（NFS-e）：从表格读取记录，逐条提交开具表单，
//! 把状态写回表格。可以随时中断，下次运行会跳过已开具的记录。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() / 截图 / 刷新能力
//! - `PageActions` - 流程层依赖的页面操作端口
//!
//! ### ② 业务能力层（Services）
//! - `NfsePage` - 针对开具页面的 `PageActions` 实现
//! - `DiagnosticsWriter` - 失败截图与 HTML 写入能力
//!
//! ### ③ 流程层（Workflow）
//! - `RecordCtx` - 上下文封装（记录序号 + 识别号）
//! - `StepExecutor` - 单个步骤（等待 busy → 校验 → 诊断）
//! - `InvoiceFlow` - 一条记录的状态机（查询 → 活动 → 描述 → 金额 → 开具 → 清空）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_driver` - 顺序处理、续跑、检查点、报告
//! - `orchestrator/batch_processor` - 应用生命周期与操作员交互
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, DataPolicy, WaitPolicy};
pub use error::{AppError, AppResult};
pub use infrastructure::{ActionOutcome, FailureKind, JsExecutor, PageActions, PageIntent};
pub use models::{Record, RecordStatus, RecordStore, REFERENCE_SENTINEL};
pub use orchestrator::{App, BatchDriver, DriverOptions, Report, StopFlag};
pub use workflow::{InvoiceFlow, RecordCtx, StepExecutor, WorkflowOutcome, WorkflowState};
