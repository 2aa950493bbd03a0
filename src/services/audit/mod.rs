pub mod logger;
pub mod redact;
pub mod summary;

pub use logger::{AuditLog, FailureRecord, SuccessRecord};
pub use summary::SummarySnapshot;
