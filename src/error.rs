//! Crate-wide error type.
//!
//! Two families of failures are distinguished:
//! - invalid configuration: the caller asked for something contradictory
//!   (no output format, nan values under a Forbidden nan mode);
//! - internal consistency: a logic defect inside the engine (metadata
//!   pairing violations, the 256-border ceiling). These are never caused by
//!   bad input data.
//!
//! Resource-budget overshoot is deliberately *not* represented here: memory
//! estimates are advisory, and excursions above the configured limit are
//! logged, never raised.

/// Error raised by quantization operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuantizeError {
    /// Neither output format was requested.
    #[error("at least one of cpu_compatible_format or gpu_compatible_format must be requested")]
    NoOutputFormat,

    /// Nan values observed during border calculation under NanMode::Forbidden.
    #[error("feature #{feature}: nan values present but nan mode is Forbidden")]
    NansForbidden { feature: u32 },

    /// Nan value encountered at quantization time under NanMode::Forbidden.
    ///
    /// Border calculation runs on a (possibly subsampled) row subset, so a
    /// nan can slip past it and only surface here.
    #[error("feature #{feature}: nan value encountered during quantization with nan mode Forbidden")]
    UnexpectedNan { feature: u32 },

    /// Logic defect inside the engine, not a user error.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
}

impl QuantizeError {
    /// Build an internal-consistency error from a message.
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::InternalConsistency(msg.into())
    }

    /// Whether this error indicates an invalid caller configuration.
    #[inline]
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoOutputFormat | Self::NansForbidden { .. } | Self::UnexpectedNan { .. }
        )
    }

    /// Whether this error indicates an internal logic defect.
    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InternalConsistency(_))
    }
}
