pub mod invoice_flow;
pub mod record_ctx;
pub mod step_executor;

pub use invoice_flow::{InvoiceFlow, WorkflowOutcome, WorkflowState};
pub use record_ctx::RecordCtx;
pub use step_executor::{Step, StepExecutor, StepOutcome};
