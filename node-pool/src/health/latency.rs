use std::time::Duration;

/// Number of round-trip samples kept per server.
pub const LATENCY_WINDOW: usize = 6;

/// Representative latency of a server that has never been probed. Large
/// enough that any probed server wins the latency tie-break against it.
pub const UNPROBED_LATENCY: Duration = Duration::from_secs(3600);

/// Sliding window of probe round trips.
///
/// The representative value is the maximum over the samples recorded so
/// far, capped at the last [`LATENCY_WINDOW`] of them.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: [Duration; LATENCY_WINDOW],
    next: usize,
    count: u32,
    value: Duration,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self {
            samples: [Duration::ZERO; LATENCY_WINDOW],
            next: 0,
            count: 0,
            value: UNPROBED_LATENCY,
        }
    }

    /// Records one sample and returns the recomputed representative value.
    pub fn record(&mut self, sample: Duration) -> Duration {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % LATENCY_WINDOW;
        self.count = self.count.saturating_add(1);
        self.value = self.filled().iter().copied().max().unwrap_or(Duration::ZERO);
        self.value
    }

    pub fn value(&self) -> Duration {
        self.value
    }

    /// Total samples recorded, including ones since overwritten.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_probed(&self) -> bool {
        self.count > 0
    }

    fn filled(&self) -> &[Duration] {
        let n = (self.count as usize).min(LATENCY_WINDOW);
        &self.samples[..n]
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new()
    }
}
