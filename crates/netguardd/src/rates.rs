//! Rate estimation from cumulative byte counters.
//!
//! Counters are monotonic but may wrap or reset; a decrease between samples
//! is treated as a zero-delta event, never a spike. Instantaneous rates are
//! additionally smoothed with a short moving average before they feed
//! presentation; anomaly detection reacts on the raw instantaneous value.

use netguard_common::types::IfIndex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Moving average window, in samples.
pub const SMA_WINDOW: usize = 3;

/// One interface's rates for the current cycle, in bytes/second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateSample {
    /// Raw instantaneous rates (pre-smoothing).
    pub in_bps: f64,
    pub out_bps: f64,
    /// Moving-average rates over the last SMA_WINDOW samples.
    pub in_bps_avg: f64,
    pub out_bps_avg: f64,
}

struct CounterHistory {
    in_octets: u64,
    out_octets: u64,
    window_in: VecDeque<f64>,
    window_out: VecDeque<f64>,
}

impl CounterHistory {
    fn new(in_octets: u64, out_octets: u64) -> Self {
        Self {
            in_octets,
            out_octets,
            window_in: VecDeque::from(vec![0.0; SMA_WINDOW]),
            window_out: VecDeque::from(vec![0.0; SMA_WINDOW]),
        }
    }

    fn push(&mut self, in_bps: f64, out_bps: f64) {
        self.window_in.push_back(in_bps);
        self.window_out.push_back(out_bps);
        while self.window_in.len() > SMA_WINDOW {
            self.window_in.pop_front();
        }
        while self.window_out.len() > SMA_WINDOW {
            self.window_out.pop_front();
        }
    }

    fn averages(&self) -> (f64, f64) {
        let avg_in = self.window_in.iter().sum::<f64>() / SMA_WINDOW as f64;
        let avg_out = self.window_out.iter().sum::<f64>() / SMA_WINDOW as f64;
        (avg_in, avg_out)
    }
}

/// Per-interface counter history owned by the control loop.
#[derive(Default)]
pub struct RateEstimator {
    history: HashMap<IfIndex, CounterHistory>,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one cycle's counter reading and get back the rates.
    ///
    /// The first sighting of an interface yields zero rates: there is no
    /// previous sample to difference against.
    pub fn sample(
        &mut self,
        index: IfIndex,
        in_octets: u64,
        out_octets: u64,
        elapsed: Duration,
    ) -> RateSample {
        let history = match self.history.get_mut(&index) {
            Some(h) => h,
            None => {
                self.history
                    .insert(index, CounterHistory::new(in_octets, out_octets));
                return RateSample::default();
            }
        };

        let elapsed_secs = elapsed.as_secs_f64();
        let (in_bps, out_bps) = if elapsed_secs > 0.0 {
            // saturating_sub clamps counter wrap/reset to a zero delta
            let delta_in = in_octets.saturating_sub(history.in_octets);
            let delta_out = out_octets.saturating_sub(history.out_octets);
            (
                delta_in as f64 / elapsed_secs,
                delta_out as f64 / elapsed_secs,
            )
        } else {
            (0.0, 0.0)
        };

        history.in_octets = in_octets;
        history.out_octets = out_octets;
        history.push(in_bps, out_bps);
        let (in_bps_avg, out_bps_avg) = history.averages();

        RateSample {
            in_bps,
            out_bps,
            in_bps_avg,
            out_bps_avg,
        }
    }

    /// Drop all counter history (manual anomaly reset).
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_first_sample_is_zero() {
        let mut est = RateEstimator::new();
        let s = est.sample(1, 1_000_000, 500_000, SEC);
        assert_eq!(s, RateSample::default());
    }

    #[test]
    fn test_steady_rate() {
        let mut est = RateEstimator::new();
        est.sample(1, 0, 0, SEC);
        let s = est.sample(1, 2048, 1024, Duration::from_secs(2));
        assert_relative_eq!(s.in_bps, 1024.0);
        assert_relative_eq!(s.out_bps, 512.0);
    }

    #[test]
    fn test_counter_wrap_yields_zero_delta() {
        let mut est = RateEstimator::new();
        est.sample(1, u64::MAX - 10, 900, SEC);
        let s = est.sample(1, 5, 100, SEC);
        assert_eq!(s.in_bps, 0.0);
        assert_eq!(s.out_bps, 0.0);
    }

    #[test]
    fn test_zero_elapsed_yields_zero_rate() {
        let mut est = RateEstimator::new();
        est.sample(1, 0, 0, SEC);
        let s = est.sample(1, 4096, 4096, Duration::ZERO);
        assert_eq!(s.in_bps, 0.0);
        assert_eq!(s.out_bps, 0.0);
    }

    #[test]
    fn test_moving_average_suppresses_single_spike() {
        let mut est = RateEstimator::new();
        est.sample(1, 0, 0, SEC);
        let spike = est.sample(1, 3_000_000, 0, SEC);
        assert_relative_eq!(spike.in_bps, 3_000_000.0);
        // Window was seeded with zeros, so the average sees one spike in
        // three slots.
        assert_relative_eq!(spike.in_bps_avg, 1_000_000.0);
    }

    #[test]
    fn test_average_converges_after_full_window() {
        let mut est = RateEstimator::new();
        est.sample(1, 0, 0, SEC);
        let mut total = 0u64;
        let mut last = RateSample::default();
        for _ in 0..SMA_WINDOW {
            total += 1024;
            last = est.sample(1, total, 0, SEC);
        }
        assert_relative_eq!(last.in_bps_avg, 1024.0);
    }

    #[test]
    fn test_clear_forgets_history() {
        let mut est = RateEstimator::new();
        est.sample(1, 0, 0, SEC);
        est.sample(1, 1024, 0, SEC);
        est.clear();
        let s = est.sample(1, 9_999_999, 0, SEC);
        assert_eq!(s, RateSample::default());
    }

    #[test]
    fn test_interfaces_tracked_independently() {
        let mut est = RateEstimator::new();
        est.sample(1, 0, 0, SEC);
        est.sample(2, 0, 0, SEC);
        let a = est.sample(1, 1024, 0, SEC);
        let b = est.sample(2, 2048, 0, SEC);
        assert_relative_eq!(a.in_bps, 1024.0);
        assert_relative_eq!(b.in_bps, 2048.0);
    }
}
