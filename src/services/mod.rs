pub mod diagnostics;
pub mod nfse_page;

pub use diagnostics::DiagnosticsWriter;
pub use nfse_page::NfsePage;
