//! Observation ingestion: payload normalization, live and replayed sources,
//! and staleness checks for cached observations.

pub mod normalize;
pub mod replay;
pub mod source;
pub mod staleness;

pub use normalize::{NormalizeError, RawPayload};
pub use replay::ReplaySource;
pub use source::{FetchError, HttpObservationSource, LastKnownCache, ObservationSource, fetch_with_timeout};
