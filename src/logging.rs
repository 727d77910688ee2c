/// Structured logging for the risk monitoring service
///
/// Thin layer over the `log` facade: `init_logger` installs
/// `pretty_env_logger` once, the helpers tag each line with the component
/// and subject (region, point, channel) it concerns, and fetch and dispatch
/// failures are classified before they are logged so that an offline buoy
/// does not read like a broken webhook.

use std::fmt;

use crate::alert::sink::DispatchError;
use crate::ingest::FetchError;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Source,
    Grid,
    Formation,
    Alert,
    Dispatch,
    Store,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Source => write!(f, "SOURCE"),
            Component::Grid => write!(f, "GRID"),
            Component::Formation => write!(f, "FORMATION"),
            Component::Alert => write!(f, "ALERT"),
            Component::Dispatch => write!(f, "DISPATCH"),
            Component::Store => write!(f, "DB"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - no coverage at the point, or the caller cancelled
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialisation
// ---------------------------------------------------------------------------

/// Installs the global logger. `RUST_LOG` wins over `default_level`.
/// Calling this twice is harmless.
pub fn init_logger(default_level: &str) {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.parse_filters(&filters);
    if builder.try_init().is_err() {
        log::debug!("logger already initialised");
    }
}

fn line(component: Component, subject: Option<&str>, message: &str) -> String {
    match subject {
        Some(s) => format!("{component} [{s}]: {message}"),
        None => format!("{component}: {message}"),
    }
}

pub fn info(component: Component, subject: Option<&str>, message: &str) {
    log::info!("{}", line(component, subject, message));
}

pub fn warn(component: Component, subject: Option<&str>, message: &str) {
    log::warn!("{}", line(component, subject, message));
}

pub fn error(component: Component, subject: Option<&str>, message: &str) {
    log::error!("{}", line(component, subject, message));
}

pub fn debug(component: Component, subject: Option<&str>, message: &str) {
    log::debug!("{}", line(component, subject, message));
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        // Points over open ocean routinely have no station.
        FetchError::NoData(_) | FetchError::Aborted => FailureType::Expected,
        FetchError::Timeout(_) | FetchError::Http(_) => FailureType::Unexpected,
        // Parse errors suggest an upstream format change.
        FetchError::Decode(_) => FailureType::Unexpected,
        FetchError::Status(code) if *code >= 500 => FailureType::Unexpected,
        FetchError::Status(_) => FailureType::Unknown,
    }
}

pub fn classify_dispatch_failure(err: &DispatchError) -> FailureType {
    match err {
        DispatchError::Timeout(_) | DispatchError::Http(_) => FailureType::Unexpected,
        DispatchError::Rejected { status } if *status >= 500 => FailureType::Unknown,
        DispatchError::Rejected { .. } => FailureType::Unexpected,
        DispatchError::Channel(_) => FailureType::Unknown,
    }
}

fn log_classified(component: Component, subject: &str, failure_type: FailureType, message: &str) {
    match failure_type {
        FailureType::Expected => debug(component, Some(subject), message),
        FailureType::Unexpected => error(component, Some(subject), message),
        FailureType::Unknown => warn(component, Some(subject), message),
    }
}

/// Logs an observation fetch failure with automatic classification.
pub fn log_fetch_failure(source: &str, point: &str, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let message = format!("{source} fetch failed [{failure_type}]: {err}");
    log_classified(Component::Source, point, failure_type, &message);
}

/// Logs a notification failure with automatic classification.
pub fn log_dispatch_failure(channel: &str, alert_id: &str, err: &DispatchError) {
    let failure_type = classify_dispatch_failure(err);
    let message = format!("alert {alert_id} not delivered [{failure_type}]: {err}");
    log_classified(Component::Dispatch, channel, failure_type, &message);
}

// ---------------------------------------------------------------------------
// Forecast Summary Logging
// ---------------------------------------------------------------------------

/// One line per forecast run; the level reflects how much live data it had.
pub fn log_forecast_summary(region: &str, candidates: usize, samples_used: usize, samples_failed: usize) {
    let total = samples_used + samples_failed;
    let message = format!(
        "forecast complete: {candidates} candidates, {samples_used}/{total} samples"
    );

    if samples_failed == 0 {
        info(Component::Formation, Some(region), &message);
    } else if samples_used == 0 {
        warn(Component::Formation, Some(region), &format!("{message}, climatology only"));
    } else {
        info(Component::Formation, Some(region), &format!("{message}, {samples_failed} failed"));
    }
}
