//! Level helpers shared by the meters: RMS, dBFS conversion and downmix.

/// Lowest level reported, in dBFS.  Digital silence maps here instead of
/// `-inf` so averages stay finite.
pub const DB_FLOOR: f64 = -100.0;

/// Convert a linear amplitude to dBFS, floored at [`DB_FLOOR`].
///
/// ```rust
/// use mic_check::audio::linear_to_db;
///
/// assert!((linear_to_db(0.1) + 20.0).abs() < 1e-4);
/// assert_eq!(linear_to_db(0.0), -100.0);
/// ```
pub fn linear_to_db(level: f32) -> f64 {
    if level <= 0.0 {
        return DB_FLOOR;
    }
    (20.0 * (level as f64).log10()).max(DB_FLOOR)
}

/// Root-mean-square amplitude of `samples`; `0.0` for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq = samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
        / samples.len() as f64;
    mean_sq.sqrt() as f32
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// Mix planar channels down to mono by averaging.
///
/// The output length is that of the shortest channel.
///
/// * With one channel the samples are copied unchanged.
/// * With no channels an empty vector is returned.
///
/// ```rust
/// use mic_check::audio::downmix;
///
/// let mono = downmix(&[vec![0.5, 0.2], vec![-0.5, 0.2]]);
/// assert_eq!(mono, vec![0.0, 0.2]);
/// ```
pub fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [] => Vec::new(),
        [only] => only.clone(),
        many => {
            let len = many.iter().map(Vec::len).min().unwrap_or(0);
            let n = many.len() as f32;
            (0..len)
                .map(|i| many.iter().map(|ch| ch[i]).sum::<f32>() / n)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_constant_is_its_magnitude() {
        assert!((rms(&[0.5; 100]) - 0.5).abs() < 1e-6);
        assert!((rms(&[-0.5; 100]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rms_of_empty_is_zero() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn peak_is_absolute() {
        assert_eq!(peak(&[0.1, -0.7, 0.3]), 0.7);
    }

    #[test]
    fn tiny_levels_clamp_to_floor() {
        assert_eq!(linear_to_db(1e-9), DB_FLOOR);
        assert_eq!(linear_to_db(-0.5), DB_FLOOR);
    }

    #[test]
    fn full_scale_is_zero_db() {
        assert!(linear_to_db(1.0).abs() < 1e-9);
    }

    #[test]
    fn downmix_truncates_to_shortest_channel() {
        let mono = downmix(&[vec![1.0, 1.0, 1.0], vec![0.0, 0.0]]);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn downmix_of_nothing_is_empty() {
        assert!(downmix(&[]).is_empty());
    }
}
