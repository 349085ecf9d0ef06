//! Audio measurement engine.
//!
//! # Pipeline
//!
//! ```text
//! CaptureStream::read → downmix → KWeighting → BlockCollector → Gate → LUFS
//!                     └→ per-channel RMS ───────────────────→ analyze_balance
//! ```
//!
//! The [`sampler`] drives this pipeline on a fixed tick for a fixed
//! duration.  Results are turned into qualitative verdicts with the
//! [`rating`] tables.
//!
//! # Quick Start
//!
//! ```rust
//! use mic_check::audio::{LoudnessMeter, RatingTable};
//! use mic_check::config::LoudnessConfig;
//!
//! // 1 kHz at 0.1 peak, 48 kHz, 2 s
//! let tone: Vec<f32> = (0..96_000)
//!     .map(|i| (0.1 * (2.0 * std::f64::consts::PI * 1_000.0 * i as f64 / 48_000.0).sin()) as f32)
//!     .collect();
//!
//! let mut meter = LoudnessMeter::new(48_000, &LoudnessConfig::default());
//! meter.process(&tone);
//! let lufs = meter.integrated().unwrap();
//! assert!((lufs + 23.0).abs() < 0.5);
//! println!("{:?}", RatingTable::loudness_for(false).rate(lufs));
//! ```

pub mod balance;
pub mod blocks;
pub mod buffer;
pub mod capture;
pub mod clock;
pub mod level;
pub mod loudness;
pub mod rating;
pub mod sampler;
pub mod weighting;

pub use balance::{analyze_balance, Channel, ChannelBalance, ChannelStats};
pub use blocks::{AudioBlock, BlockCollector};
pub use buffer::FrameBuffer;
pub use capture::CpalStream;
pub use clock::{Clock, ManualClock, TokioClock};
pub use level::{downmix, linear_to_db, peak, rms, DB_FLOOR};
pub use loudness::{Gate, LoudnessMeter};
pub use rating::{Rating, RatingTable};
pub use sampler::{run_pass, PassReport, PassSettings, ProgressEvent, ProgressFn, SamplerError};
pub use weighting::{Biquad, KWeighting};
