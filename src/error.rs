//! Error taxonomy for adaptor operations.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure an adaptor operation can surface.
///
/// All variants are ordinary return values; a failed acquisition leaves the
/// adaptor's caches untouched and the same request may be retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The pin label is not present in the board's translation tables.
    #[error("not a valid pin: {0:?}")]
    UnknownPin(String),

    /// A bus number outside the valid domain for its bus kind.
    #[error("bus number {0} out of range")]
    InvalidBus(i32),

    /// Writing the pin-multiplex control file failed, so the line was never
    /// routed to its GPIO function and nothing was exported.
    #[error("pin mux for {pin:?} failed")]
    Mux {
        pin: String,
        #[source]
        source: io::Error,
    },

    /// The OS-level export or device open failed.
    #[error("failed to acquire {resource}")]
    Acquisition {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// A read or write on an already-acquired resource failed.
    #[error("i/o on {resource} failed")]
    Io {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// Acquisition was attempted after `finalize()` released all resources.
    #[error("adaptor already finalized")]
    Finalized,

    /// One or more independent release failures during teardown. Every live
    /// handle is still attempted; this collects whatever failed.
    #[error("finalize completed with {} release failure(s)", .0.len())]
    Finalize(Vec<Error>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_reports_failure_count() {
        let err = Error::Finalize(vec![
            Error::Finalized,
            Error::InvalidBus(9),
        ]);
        assert_eq!(err.to_string(), "finalize completed with 2 release failure(s)");
    }

    #[test]
    fn acquisition_exposes_the_io_source() {
        let err = Error::Acquisition {
            resource: "gpio192".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("denied"));
    }
}
