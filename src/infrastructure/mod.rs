//! 基础设施层：持有稀缺资源（Page），只暴露能力

pub mod js_executor;
pub mod page_port;

pub use js_executor::JsExecutor;
pub use page_port::{ActionOutcome, FailureKind, PageActions, PageIntent};
