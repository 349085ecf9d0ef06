//! K-weighting pre-filter for loudness measurement.
//!
//! [`KWeighting`] cascades two second-order sections:
//!
//! 1. a high shelf (+4 dB above ~1.7 kHz) modelling the acoustic effect of
//!    the head, then
//! 2. a high pass (~38 Hz) removing the low-frequency content the ear barely
//!    perceives.
//!
//! Coefficients are derived for the stream's actual sample rate with the
//! bilinear transform of the BS.1770 analog prototype, so 44.1 kHz and
//! 16 kHz capture devices are weighted as faithfully as 48 kHz ones.
//!
//! Filter state persists across [`KWeighting::process`] calls; call
//! [`KWeighting::reset`] at the start of every measurement pass.

use std::f64::consts::PI;

// ---------------------------------------------------------------------------
// Biquad
// ---------------------------------------------------------------------------

/// Transposed direct-form II biquad with `a0` normalised to `1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    /// Build a section from normalised coefficients.
    pub fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Stage 1: the BS.1770 high-shelf for `sample_rate` Hz.
    pub fn k_shelf(sample_rate: f64) -> Self {
        const F0: f64 = 1_681.974_450_955_533;
        const GAIN_DB: f64 = 3.999_843_853_973_347;
        const Q: f64 = 0.707_175_236_955_419_6;

        let k = (PI * F0 / sample_rate).tan();
        let vh = 10.0_f64.powf(GAIN_DB / 20.0);
        let vb = vh.powf(0.499_666_774_154_541_6);
        let a0 = 1.0 + k / Q + k * k;

        Self::new(
            (vh + vb * k / Q + k * k) / a0,
            2.0 * (k * k - vh) / a0,
            (vh - vb * k / Q + k * k) / a0,
            2.0 * (k * k - 1.0) / a0,
            (1.0 - k / Q + k * k) / a0,
        )
    }

    /// Stage 2: the BS.1770 high-pass for `sample_rate` Hz.
    pub fn k_highpass(sample_rate: f64) -> Self {
        const F0: f64 = 38.135_470_876_024_44;
        const Q: f64 = 0.500_327_037_323_877_3;

        let k = (PI * F0 / sample_rate).tan();
        let a0 = 1.0 + k / Q + k * k;

        Self::new(
            1.0,
            -2.0,
            1.0,
            2.0 * (k * k - 1.0) / a0,
            (1.0 - k / Q + k * k) / a0,
        )
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

// ---------------------------------------------------------------------------
// KWeighting
// ---------------------------------------------------------------------------

/// Shelf → high-pass cascade applied to a mono sample stream.
///
/// # Example
///
/// ```rust
/// use mic_check::audio::KWeighting;
///
/// let mut filter = KWeighting::new(48_000);
/// let mut out = vec![0.0_f64; 4];
/// filter.process(&[0.0, 0.5, -0.5, 0.0], &mut out);
/// assert!(out.iter().all(|s| s.is_finite()));
/// ```
#[derive(Debug, Clone)]
pub struct KWeighting {
    sample_rate: u32,
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeighting {
    pub fn new(sample_rate: u32) -> Self {
        let fs = sample_rate as f64;
        Self {
            sample_rate,
            shelf: Biquad::k_shelf(fs),
            highpass: Biquad::k_highpass(fs),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Weight a single sample.
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f64 {
        let shelved = self.shelf.process(x as f64);
        self.highpass.process(shelved)
    }

    /// Weight `input` into `output`.  Only `min(input.len(), output.len())`
    /// samples are processed.
    pub fn process(&mut self, input: &[f32], output: &mut [f64]) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.process_sample(*x);
        }
    }

    /// Clear the filter memory of both stages.
    pub fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
