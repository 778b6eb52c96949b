//! Volume arithmetic on the 0-128 scale.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

/// Volume on the 0..=128 scale.
pub type Volume = u8;

/// Full volume. Samples scaled by this value are left unchanged.
pub const MAX_VOLUME: Volume = 128;

/// Clamp an arbitrary requested volume into `0..=MAX_VOLUME`.
///
/// Out-of-range requests are clamped, never rejected.
pub fn clamp_volume(volume: i32) -> Volume {
    volume.clamp(0, i32::from(MAX_VOLUME)) as Volume
}

/// Scale a sample by a gain on the 0..=128 scale.
///
/// Gains above `MAX_VOLUME` are allowed so callers can compose several
/// factors before dividing; the result is not saturated.
#[inline]
pub fn scale_sample(sample: i16, gain: i32) -> i32 {
    i32::from(sample) * gain / i32::from(MAX_VOLUME)
}

/// Combine two volumes on the 0..=128 scale into one.
#[inline]
pub fn combine(a: i32, b: i32) -> i32 {
    a * b / i32::from(MAX_VOLUME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clamp_volume_bounds() {
        assert_eq!(clamp_volume(-5), 0);
        assert_eq!(clamp_volume(0), 0);
        assert_eq!(clamp_volume(64), 64);
        assert_eq!(clamp_volume(500), MAX_VOLUME);
    }

    #[test]
    fn test_scale_sample() {
        assert_eq!(scale_sample(1000, 128), 1000);
        assert_eq!(scale_sample(1000, 64), 500);
        assert_eq!(scale_sample(-1000, 0), 0);
        assert_eq!(combine(128, 64), 64);
    }

    proptest! {
        #[test]
        fn prop_in_range_volume_round_trips(v in 0i32..=128) {
            prop_assert_eq!(i32::from(clamp_volume(v)), v);
        }

        #[test]
        fn prop_out_of_range_volume_is_clamped(v in any::<i32>()) {
            let clamped = clamp_volume(v);
            prop_assert!(clamped <= MAX_VOLUME);
            if v > 128 {
                prop_assert_eq!(clamped, MAX_VOLUME);
            }
            if v < 0 {
                prop_assert_eq!(clamped, 0);
            }
        }

        #[test]
        fn prop_full_volume_is_identity(s in any::<i16>()) {
            prop_assert_eq!(scale_sample(s, 128), i32::from(s));
        }
    }
}
