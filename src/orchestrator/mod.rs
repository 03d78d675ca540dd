//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 管理应用生命周期（初始化、运行、清理）
//! - 持有浏览器资源（Browser、NfsePage）
//! - 操作员交互（登录确认、结束确认）
//!
//! ### `batch_driver` - 批量驱动器
//! - 顺序遍历 `RecordStore`，跳过已开具的记录
//! - 把流程结果写回记录的控制字段
//! - 检查点保存、统计报告
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App，持有 Browser)
//!     ↓
//! batch_driver (处理 RecordStore)
//!     ↓
//! workflow::InvoiceFlow (处理单条 Record)
//!     ↓
//! workflow::StepExecutor (单个步骤：等待 / 校验 / 诊断)
//!     ↓
//! infrastructure::PageActions (页面能力)
//! ```

pub mod batch_driver;
pub mod batch_processor;

pub use batch_driver::{BatchDriver, DriverOptions, Report, StopFlag};
pub use batch_processor::App;
