//! Error type returned by diagnostic units.
//!
//! The orchestrator never lets one of these escape a run: each is converted
//! into a `fail` outcome carrying the error message and [`DiagnosticError::fix`].

use thiserror::Error;

use crate::audio::SamplerError;
use crate::host::{CaptureError, HostError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DiagnosticError {
    #[error("environment lacks required capabilities: {}", .0.join(", "))]
    EnvironmentUnsupported(Vec<String>),

    #[error("microphone permission was denied")]
    PermissionDenied,

    #[error("no microphone is available")]
    DeviceAbsent,

    #[error("could not open the microphone: {0}")]
    Acquisition(#[from] CaptureError),

    #[error("measurement failed: {0}")]
    Measurement(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<SamplerError> for DiagnosticError {
    fn from(e: SamplerError) -> Self {
        DiagnosticError::Measurement(e.to_string())
    }
}

impl DiagnosticError {
    /// Remediation hint shown next to the failure.
    pub fn fix(&self) -> Option<String> {
        let hint = match self {
            DiagnosticError::EnvironmentUnsupported(_) => {
                "Run the check on a system with a working audio input stack."
            }
            DiagnosticError::PermissionDenied => {
                "Allow microphone access in the system privacy settings and run the check again."
            }
            DiagnosticError::DeviceAbsent => "Connect a microphone and run the check again.",
            DiagnosticError::Acquisition(CaptureError::PermissionDenied) => {
                "Allow microphone access in the system privacy settings and run the check again."
            }
            DiagnosticError::Acquisition(CaptureError::DeviceNotFound(_)) => {
                "The selected microphone is gone. Reconnect it or choose another device."
            }
            DiagnosticError::Acquisition(_) => {
                "Close other applications using the microphone and try again."
            }
            DiagnosticError::Measurement(_) => {
                "Make sure the microphone stays connected during the test and try again."
            }
            DiagnosticError::Host(_) => return None,
        };
        Some(hint.to_string())
    }
}
