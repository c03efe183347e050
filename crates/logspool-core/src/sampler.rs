use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use logspool_types::{SamplerKind, SamplingSettings};

/// 2^64 as a float, the scale of the fixed-point threshold
const SCALE: f64 = 18_446_744_073_709_551_616.0;

/// No sample accepted yet
const NEVER: u64 = u64::MAX;

/// Accepts each call independently with probability `rate`
///
/// The rate is stored as a fixed-point threshold over the full `u64` range
/// and compared against one uniform draw, so sampling is a load plus a random
/// number.
#[derive(Debug)]
pub struct RateSampler {
    threshold: AtomicU64,
}

impl RateSampler {
    pub fn new(rate: f64) -> Self {
        Self {
            threshold: AtomicU64::new(threshold_for(rate)),
        }
    }

    pub fn sample(&self) -> bool {
        match self.threshold.load(Ordering::Relaxed) {
            0 => false,
            u64::MAX => true,
            threshold => rand::random::<u64>() < threshold,
        }
    }

    /// Replace the rate; values outside [0, 1] are clamped and NaN means 0
    pub fn set_rate(&self, rate: f64) {
        self.threshold.store(threshold_for(rate), Ordering::Relaxed);
    }

    pub fn rate(&self) -> f64 {
        match self.threshold.load(Ordering::Relaxed) {
            u64::MAX => 1.0,
            threshold => threshold as f64 / SCALE,
        }
    }
}

fn threshold_for(rate: f64) -> u64 {
    if rate.is_nan() || rate <= 0.0 {
        0
    } else if rate >= 1.0 {
        u64::MAX
    } else {
        // Float-to-int casts saturate
        (rate * SCALE) as u64
    }
}

/// Rate sampling with a minimum spacing between accepted samples
///
/// The last accepted instant is published with compare-and-swap, so of two
/// callers racing inside one interval at most one is accepted.
#[derive(Debug)]
pub struct JitterSampler {
    rate: RateSampler,

    /// Minimum spacing, in nanoseconds
    jitter: u64,

    /// Reference point for `last`
    origin: Instant,

    /// Nanoseconds since `origin` of the last accepted sample, or `NEVER`
    last: AtomicU64,
}

impl JitterSampler {
    pub fn new(rate: f64, jitter: Duration) -> Self {
        Self {
            rate: RateSampler::new(rate),
            jitter: u64::try_from(jitter.as_nanos()).unwrap_or(u64::MAX),
            origin: Instant::now(),
            last: AtomicU64::new(NEVER),
        }
    }

    pub fn sample(&self) -> bool {
        self.try_accept().is_some()
    }

    /// Accept or reject; returns the accepted instant in nanoseconds
    fn try_accept(&self) -> Option<u64> {
        let now = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(NEVER - 1);
        let last = self.last.load(Ordering::Acquire);

        if last != NEVER && now.saturating_sub(last) < self.jitter {
            return None;
        }
        if !self.rate.sample() {
            return None;
        }
        self.last
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| now)
    }

    pub fn set_rate(&self, rate: f64) {
        self.rate.set_rate(rate);
    }

    pub fn rate(&self) -> f64 {
        self.rate.rate()
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_nanos(self.jitter)
    }
}

/// Sampling strategy selected by configuration
#[derive(Debug)]
pub enum Sampler {
    Rate(RateSampler),
    Jitter(JitterSampler),
}

impl Sampler {
    pub fn from_settings(settings: &SamplingSettings) -> Self {
        match settings.kind {
            SamplerKind::Rate => Self::Rate(RateSampler::new(settings.rate)),
            SamplerKind::Jitter => {
                Self::Jitter(JitterSampler::new(settings.rate, settings.jitter))
            }
        }
    }

    pub fn sample(&self) -> bool {
        match self {
            Self::Rate(sampler) => sampler.sample(),
            Self::Jitter(sampler) => sampler.sample(),
        }
    }

    pub fn set_rate(&self, rate: f64) {
        match self {
            Self::Rate(sampler) => sampler.set_rate(rate),
            Self::Jitter(sampler) => sampler.set_rate(rate),
        }
    }

    pub fn rate(&self) -> f64 {
        match self {
            Self::Rate(sampler) => sampler.rate(),
            Self::Jitter(sampler) => sampler.rate(),
        }
    }

    pub fn kind(&self) -> SamplerKind {
        match self {
            Self::Rate(_) => SamplerKind::Rate,
            Self::Jitter(_) => SamplerKind::Jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn accepted(sampler: &RateSampler, trials: usize) -> usize {
        (0..trials).filter(|_| sampler.sample()).count()
    }

    #[test]
    fn test_rate_converges() {
        let trials = 200_000usize;
        for rate in [0.01, 0.3, 0.5, 0.9] {
            let sampler = RateSampler::new(rate);
            let hits = accepted(&sampler, trials) as f64;

            let expected = trials as f64 * rate;
            let sigma = (trials as f64 * rate * (1.0 - rate)).sqrt();
            assert!(
                (hits - expected).abs() <= 4.5 * sigma,
                "rate {}: {} hits, expected {}",
                rate,
                hits,
                expected
            );
        }
    }

    #[test]
    fn test_rate_bounds() {
        assert_eq!(accepted(&RateSampler::new(1.0), 10_000), 10_000);
        assert_eq!(accepted(&RateSampler::new(0.0), 10_000), 0);

        let sampler = RateSampler::new(0.5);
        sampler.set_rate(7.0);
        assert_eq!(sampler.rate(), 1.0);
        sampler.set_rate(-1.0);
        assert_eq!(sampler.rate(), 0.0);
        sampler.set_rate(f64::NAN);
        assert_eq!(sampler.rate(), 0.0);
    }

    #[test]
    fn test_rate_round_trips_closely() {
        let sampler = RateSampler::new(0.25);
        assert!((sampler.rate() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_jitter_spacing() {
        let jitter = Duration::from_millis(5);
        let sampler = JitterSampler::new(1.0, jitter);
        let deadline = Instant::now() + Duration::from_millis(60);

        let mut times = Vec::new();
        while Instant::now() < deadline {
            if let Some(at) = sampler.try_accept() {
                times.push(at);
            }
        }

        assert!(times.len() >= 2);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= jitter.as_nanos() as u64);
        }
    }

    #[test]
    fn test_jitter_spacing_under_contention() {
        let jitter = Duration::from_millis(2);
        let sampler = Arc::new(JitterSampler::new(1.0, jitter));
        let deadline = Instant::now() + Duration::from_millis(50);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sampler = Arc::clone(&sampler);
                std::thread::spawn(move || {
                    let mut times = Vec::new();
                    while Instant::now() < deadline {
                        if let Some(at) = sampler.try_accept() {
                            times.push(at);
                        }
                    }
                    times
                })
            })
            .collect();

        let mut times: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        times.sort_unstable();

        assert!(!times.is_empty());
        for pair in times.windows(2) {
            assert!(
                pair[1] - pair[0] >= jitter.as_nanos() as u64,
                "accepted {}ns apart",
                pair[1] - pair[0]
            );
        }
    }

    #[test]
    fn test_jitter_applies_rate() {
        let sampler = JitterSampler::new(0.0, Duration::ZERO);
        assert!((0..1000).all(|_| !sampler.sample()));
    }

    #[test]
    fn test_sampler_from_settings() {
        let rate = Sampler::from_settings(&SamplingSettings::rate(0.5));
        assert_eq!(rate.kind(), SamplerKind::Rate);
        assert!((rate.rate() - 0.5).abs() < 1e-12);

        let jitter = Sampler::from_settings(&SamplingSettings::jitter(1.0, Duration::from_secs(1)));
        assert_eq!(jitter.kind(), SamplerKind::Jitter);
        assert!(jitter.sample());
        assert!(!jitter.sample());

        jitter.set_rate(0.2);
        assert!((jitter.rate() - 0.2).abs() < 1e-12);
    }
}
