//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod policy;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DatabaseError, LedgerError, ValidationError, WebhookError,
};
pub use policy::decide;
pub use traits::{LedgerApi, TransactionStore, WebhookClient};
pub use types::{
    ErrorDetail, ErrorResponse, FetchMissingRequest, HealthResponse, HealthStatus,
    IngestionDecision, JobRunResponse, LedgerTransaction, NotificationSummary, StagedWrite,
    StoredTransaction, WebhookPayload,
};
