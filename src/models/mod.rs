pub mod loaders;
pub mod record;
pub mod record_store;

pub use loaders::{TableFormat, CONTROL_COLUMNS};
pub use record::{Record, RecordStatus, ISSUED_AT_FORMAT, REFERENCE_SENTINEL};
pub use record_store::{RecordStore, SaveOutcome};
