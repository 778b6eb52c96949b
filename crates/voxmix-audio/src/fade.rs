//! Linear fade envelopes driven by mixing cycles.
//!
//! An envelope counts the frames its voice has actually been mixed since the
//! fade started, so a paused voice does not make progress. Gain is evaluated
//! once per cycle at the cycle boundary.

use voxmix_core::Fading;

/// Result of evaluating an envelope at a cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeLevel {
    /// Mix at this volume (0..=target).
    Gain(i32),
    /// The fade-out has run its course; the voice must stop.
    Silenced,
}

/// Full scale of an envelope level.
const UNITY: u64 = 1 << 16;

/// Per-voice fade state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeEnvelope {
    kind: Fading,
    elapsed: u64,
    duration: u64,
    /// Level a fade-out starts from, out of `UNITY`.
    start: u64,
}

impl Default for FadeEnvelope {
    fn default() -> Self {
        Self {
            kind: Fading::None,
            elapsed: 0,
            duration: 0,
            start: UNITY,
        }
    }
}

impl FadeEnvelope {
    pub const fn fade_in(duration_frames: u64) -> Self {
        Self {
            kind: Fading::In,
            elapsed: 0,
            duration: duration_frames,
            start: UNITY,
        }
    }

    pub const fn fade_out(duration_frames: u64) -> Self {
        Self {
            kind: Fading::Out,
            elapsed: 0,
            duration: duration_frames,
            start: UNITY,
        }
    }

    /// A fade-out over `duration_frames` that starts from the level this
    /// envelope has reached, so a voice interrupted mid fade-in ramps down
    /// from where it is instead of from full volume.
    pub fn fade_out_from(&self, duration_frames: u64) -> Self {
        Self {
            start: self.level(),
            ..Self::fade_out(duration_frames)
        }
    }

    /// Fraction of the target the next cycle plays at, out of `UNITY`.
    fn level(&self) -> u64 {
        match self.kind {
            Fading::None => UNITY,
            Fading::In if self.elapsed >= self.duration => UNITY,
            Fading::In => scaled(UNITY, self.elapsed, self.duration),
            Fading::Out if self.elapsed >= self.duration => 0,
            Fading::Out => scaled(self.start, self.duration - self.elapsed, self.duration),
        }
    }

    /// Current fade kind. No side effects.
    pub const fn kind(&self) -> Fading {
        self.kind
    }

    pub const fn is_fading(&self) -> bool {
        !matches!(self.kind, Fading::None)
    }

    /// Drop any fade in progress.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Evaluate the envelope against `target`, completing a fade-in that has
    /// reached its end.
    pub fn evaluate(&mut self, target: i32) -> FadeLevel {
        match self.kind {
            Fading::None => FadeLevel::Gain(target),
            Fading::In => {
                if self.elapsed >= self.duration {
                    self.clear();
                    FadeLevel::Gain(target)
                } else {
                    FadeLevel::Gain(ramp(target, self.elapsed, self.duration))
                }
            }
            Fading::Out => {
                if self.elapsed >= self.duration {
                    FadeLevel::Silenced
                } else {
                    let remaining = self.duration - self.elapsed;
                    let gain = u128::from(target.max(0) as u64)
                        * u128::from(self.start)
                        * u128::from(remaining)
                        / (u128::from(UNITY) * u128::from(self.duration));
                    FadeLevel::Gain(gain as i32)
                }
            }
        }
    }

    /// Record that the voice was mixed for `frames` frames. A fade-in that
    /// reaches its end is complete at once.
    pub fn advance(&mut self, frames: u64) {
        if self.is_fading() {
            self.elapsed = self.elapsed.saturating_add(frames);
        }
        if matches!(self.kind, Fading::In) && self.elapsed >= self.duration {
            self.clear();
        }
    }

    /// A fade-out that has run its full duration.
    pub const fn is_spent(&self) -> bool {
        matches!(self.kind, Fading::Out) && self.elapsed >= self.duration
    }
}

/// `value * numerator / denominator` without intermediate overflow.
fn scaled(value: u64, numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return value;
    }
    (u128::from(value) * u128::from(numerator) / u128::from(denominator)) as u64
}

fn ramp(target: i32, numerator: u64, denominator: u64) -> i32 {
    if denominator == 0 {
        return target;
    }
    (i64::from(target) * numerator as i64 / denominator as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fade_passes_target() {
        let mut env = FadeEnvelope::default();
        assert_eq!(env.evaluate(100), FadeLevel::Gain(100));
        assert_eq!(env.kind(), Fading::None);
    }

    #[test]
    fn test_fade_in_ramps_to_target() {
        let mut env = FadeEnvelope::fade_in(1000);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(0));
        env.advance(500);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(64));
        env.advance(500);
        assert_eq!(env.kind(), Fading::None);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(128));
    }

    #[test]
    fn test_fade_out_silences_at_duration() {
        let mut env = FadeEnvelope::fade_out(1000);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(128));
        env.advance(250);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(96));
        env.advance(749);
        assert!(matches!(env.evaluate(128), FadeLevel::Gain(g) if g > 0));
        assert!(!env.is_spent());
        env.advance(1);
        assert!(env.is_spent());
        assert_eq!(env.evaluate(128), FadeLevel::Silenced);
        assert_eq!(env.kind(), Fading::Out);
    }

    #[test]
    fn test_zero_duration() {
        let mut fade_in = FadeEnvelope::fade_in(0);
        assert_eq!(fade_in.evaluate(80), FadeLevel::Gain(80));
        let mut fade_out = FadeEnvelope::fade_out(0);
        assert_eq!(fade_out.evaluate(80), FadeLevel::Silenced);
    }

    #[test]
    fn test_new_fade_overrides_old() {
        let mut env = FadeEnvelope::fade_in(1000);
        env.advance(900);
        env = FadeEnvelope::fade_out(100);
        assert_eq!(env.kind(), Fading::Out);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(128));
    }

    #[test]
    fn test_fade_out_continues_from_fade_in_level() {
        let mut env = FadeEnvelope::fade_in(1000);
        env.advance(200);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(25));

        env = env.fade_out_from(1000);
        assert_eq!(env.kind(), Fading::Out);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(25));
        env.advance(500);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(12));
        env.advance(500);
        assert_eq!(env.evaluate(128), FadeLevel::Silenced);
    }

    #[test]
    fn test_fade_out_restarted_mid_fade_out() {
        let mut env = FadeEnvelope::fade_out(1000);
        env.advance(500);
        env = env.fade_out_from(100);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(64));
        env.advance(50);
        assert_eq!(env.evaluate(128), FadeLevel::Gain(32));
    }

    #[test]
    fn test_fade_out_from_steady_state_is_full_ramp() {
        let env = FadeEnvelope::default().fade_out_from(1000);
        assert_eq!(env, FadeEnvelope::fade_out(1000));
    }

    #[test]
    fn test_advance_without_fade_is_noop() {
        let mut env = FadeEnvelope::default();
        env.advance(10_000);
        assert_eq!(env, FadeEnvelope::default());
    }
}
