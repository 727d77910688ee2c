pub mod log;
pub mod manager;
pub mod sink;
pub mod thresholds;

pub use log::{AlertLog, AppendOutcome, IdempotencyKey};
pub use manager::{AlertManager, ProcessOutcome};
pub use sink::{DispatchError, DispatchReport, LogSink, NotificationSink, WebhookSink};
pub use thresholds::{AlertClassifier, TrackingUpdate, classify_severity};
