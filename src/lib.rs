//! Microphone diagnostics: K-weighted loudness measurement, channel balance
//! analysis and a gated check sequence that tells whether a microphone is
//! ready for speech.

pub mod audio;
pub mod config;
pub mod diagnostics;
pub mod host;
