//! Per-switch state history and resource statistics.

use serde::Serialize;

/// One state-history sample of a switch.
#[derive(Clone, Debug, Serialize)]
pub struct StateHistoryEntry {
    /// Sample time.
    pub time: f64,
    /// Number of channels with upward traffic.
    pub up_channels: usize,
    /// Bytes passed upward since the previous sample.
    pub upload_bytes: u64,
    /// Number of channels with downward traffic.
    pub down_channels: usize,
    /// Bytes passed downward since the previous sample.
    pub download_bytes: u64,
}

/// Running summary of collected samples: count, min, max, mean and variance.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResourceStatsSummary {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
}

impl ResourceStatsSummary {
    /// Adds a sample value.
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    /// Returns the number of collected samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the minimum collected value, or 0 if no samples were collected.
    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.min
        }
    }

    /// Returns the maximum collected value, or 0 if no samples were collected.
    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.max
        }
    }

    /// Returns the mean of collected values, or 0 if no samples were collected.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.sum / self.count as f64
        }
    }

    /// Returns the sample variance of collected values.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.;
        }
        let n = self.count as f64;
        (self.sum_sq - self.sum * self.sum / n) / (n - 1.)
    }

    /// Returns the sample standard deviation of collected values.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// State history of one switch: a time-ordered sequence of samples collected
/// once per scheduling interval when the collection is enabled, plus running
/// summaries of upload and download volumes.
#[derive(Default)]
pub struct SwitchStats {
    history: Vec<StateHistoryEntry>,
    upload: ResourceStatsSummary,
    download: ResourceStatsSummary,
}

impl SwitchStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample to the history and updates the summaries.
    pub fn add_sample(&mut self, entry: StateHistoryEntry) {
        self.upload.add(entry.upload_bytes as f64);
        self.download.add(entry.download_bytes as f64);
        self.history.push(entry);
    }

    /// Returns the collected samples in time order.
    pub fn history(&self) -> &[StateHistoryEntry] {
        &self.history
    }

    /// Returns the summary of upload volumes per sample.
    pub fn upload(&self) -> &ResourceStatsSummary {
        &self.upload
    }

    /// Returns the summary of download volumes per sample.
    pub fn download(&self) -> &ResourceStatsSummary {
        &self.download
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_tracks_min_max_mean() {
        let mut summary = ResourceStatsSummary::default();
        summary.add(2.);
        summary.add(4.);
        summary.add(6.);
        assert_eq!(summary.count(), 3);
        assert_eq!(summary.min(), 2.);
        assert_eq!(summary.max(), 6.);
        assert_eq!(summary.mean(), 4.);
        assert_eq!(summary.variance(), 4.);
    }
}
