use web_time::Duration;

/// Default number of RTT samples averaged by an [`RttWindow`].
const DEFAULT_RTT_WINDOW_SIZE: usize = 30;

/// Configuration for round-trip-time smoothing.
///
/// The catch-up policy converts RTT into a tick lag, so a single noisy sample can trigger a
/// hard catch-up. Averaging over a window trades reaction time for stability.
///
/// # Example
///
/// ```
/// use rebound::RttWindowConfig;
///
/// // For faster reaction to latency spikes (more hard catch-ups)
/// let responsive_config = RttWindowConfig {
///     window_size: 8,
///     ..RttWindowConfig::default()
/// };
/// assert_eq!(responsive_config.window_size, 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttWindowConfig {
    /// The number of samples to average.
    ///
    /// Default: 30 samples
    pub window_size: usize,
}

impl Default for RttWindowConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_RTT_WINDOW_SIZE,
        }
    }
}

impl RttWindowConfig {
    /// Creates a new `RttWindowConfig` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Small window: follows latency changes quickly.
    #[must_use]
    pub fn responsive() -> Self {
        Self { window_size: 8 }
    }

    /// Large window: ignores short spikes.
    #[must_use]
    pub fn smooth() -> Self {
        Self { window_size: 90 }
    }

    /// LAN connections are stable, so a handful of samples is enough.
    #[must_use]
    pub fn lan() -> Self {
        Self { window_size: 4 }
    }
}

/// Sliding-window average of round-trip-time samples.
///
/// Only recorded samples count toward the average; an empty window reports zero.
///
/// ```
/// use rebound::RttWindow;
/// use web_time::Duration;
///
/// let mut window = RttWindow::default();
/// window.record(Duration::from_millis(40));
/// window.record(Duration::from_millis(60));
/// assert_eq!(window.average(), Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct RttWindow {
    samples: Vec<u64>,
    next: usize,
    filled: usize,
}

impl Default for RttWindow {
    fn default() -> Self {
        Self::with_config(RttWindowConfig::default())
    }
}

impl RttWindow {
    /// Creates a new window with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new window with the given configuration.
    #[must_use]
    pub fn with_config(config: RttWindowConfig) -> Self {
        let window_size = config.window_size.max(1);
        Self {
            samples: vec![0; window_size],
            next: 0,
            filled: 0,
        }
    }

    /// Records one sample, overwriting the oldest once the window is full.
    pub fn record(&mut self, rtt: Duration) {
        let micros = u64::try_from(rtt.as_micros()).unwrap_or(u64::MAX);
        let len = self.samples.len();
        if let Some(slot) = self.samples.get_mut(self.next) {
            *slot = micros;
        }
        self.next = (self.next + 1) % len;
        self.filled = (self.filled + 1).min(len);
    }

    /// Mean of the recorded samples, rounded down to the microsecond.
    #[must_use]
    pub fn average(&self) -> Duration {
        if self.filled == 0 {
            return Duration::ZERO;
        }
        // slots past `filled` are still zero, so summing everything is exact
        let sum: u128 = self.samples.iter().map(|&s| u128::from(s)).sum();
        let mean = sum / self.filled as u128;
        Duration::from_micros(u64::try_from(mean).unwrap_or(u64::MAX))
    }

    /// Number of samples currently counted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Returns `true` if nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Forgets all samples.
    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0);
        self.next = 0;
        self.filled = 0;
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod rtt_window_tests {
    use super::*;

    #[test]
    fn empty_window_averages_to_zero() {
        let window = RttWindow::new();
        assert!(window.is_empty());
        assert_eq!(window.average(), Duration::ZERO);
    }

    #[test]
    fn partial_window_is_not_diluted() {
        let mut window = RttWindow::default();
        for _ in 0..5 {
            window.record(Duration::from_millis(80));
        }
        assert_eq!(window.len(), 5);
        assert_eq!(window.average(), Duration::from_millis(80));
    }

    #[test]
    fn full_window_slides() {
        let mut window = RttWindow::with_config(RttWindowConfig::lan());
        for _ in 0..4 {
            window.record(Duration::from_millis(10));
        }
        assert_eq!(window.average(), Duration::from_millis(10));

        for _ in 0..4 {
            window.record(Duration::from_millis(30));
        }
        assert_eq!(window.len(), 4);
        assert_eq!(window.average(), Duration::from_millis(30));
    }

    #[test]
    fn mixed_samples_average() {
        let mut window = RttWindow::with_config(RttWindowConfig::lan());
        window.record(Duration::from_millis(10));
        window.record(Duration::from_millis(20));
        window.record(Duration::from_millis(30));
        window.record(Duration::from_millis(40));
        assert_eq!(window.average(), Duration::from_millis(25));

        // overwrites the 10ms sample
        window.record(Duration::from_millis(50));
        assert_eq!(window.average(), Duration::from_millis(35));
    }

    #[test]
    fn zero_window_size_is_raised_to_one() {
        let mut window = RttWindow::with_config(RttWindowConfig { window_size: 0 });
        window.record(Duration::from_millis(5));
        window.record(Duration::from_millis(7));
        assert_eq!(window.average(), Duration::from_millis(7));
    }

    #[test]
    fn clear_forgets_samples() {
        let mut window = RttWindow::new();
        window.record(Duration::from_millis(100));
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.average(), Duration::ZERO);
    }

    #[test]
    fn presets_order_by_window_size() {
        assert!(RttWindowConfig::lan().window_size < RttWindowConfig::responsive().window_size);
        assert!(RttWindowConfig::responsive().window_size < RttWindowConfig::new().window_size);
        assert!(RttWindowConfig::new().window_size < RttWindowConfig::smooth().window_size);
    }
}
