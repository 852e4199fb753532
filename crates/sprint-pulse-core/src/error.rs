//! Error taxonomy shared by every core component and collaborator.

/// Typed failures surfaced by the metrics and retrospective pipeline.
///
/// Collaborator implementations translate their transport errors into the
/// variant the core expects, so callers can decide on retry or fallback
/// without inspecting message strings.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// A configured field id never resolved for any issue in the set.
    #[error("data mapping error: {0}")]
    DataMapping(String),

    /// An invariant of the computed metrics does not hold for the input.
    #[error("metrics computation error: {0}")]
    MetricsComputation(String),

    /// The issue tracker or document corpus could not be reached.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The generation service failed or timed out.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The response cache could not be read or written.
    #[error("cache error: {0}")]
    Cache(String),

    /// The publish sink rejected the summary.
    #[error("publish failed: {0}")]
    Publish(String),
}

pub type Result<T> = std::result::Result<T, PulseError>;
