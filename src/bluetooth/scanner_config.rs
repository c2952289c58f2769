use std::time::Duration;

/// Scan budget used when nothing else is configured
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_millis(10_000);

/// Configuration for discovery sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// How long a session scans before it stops on its own
    pub scan_period: Duration,
    /// Stop the session when the radio reports a mid-scan failure
    /// instead of letting it run until stop or expiry
    pub stop_on_radio_failure: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_period: DEFAULT_SCAN_PERIOD,
            stop_on_radio_failure: false,
        }
    }
}

impl ScanConfig {
    /// Create a new scan configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for a single scan of the given length
    pub fn one_time_scan(duration: Duration) -> Self {
        Self {
            scan_period: duration,
            ..Self::default()
        }
    }

    /// Set the scan period
    pub fn with_scan_period(mut self, scan_period: Duration) -> Self {
        self.scan_period = scan_period;
        self
    }

    /// Set whether a radio failure ends the session
    pub fn with_stop_on_radio_failure(mut self, stop: bool) -> Self {
        self.stop_on_radio_failure = stop;
        self
    }
}
