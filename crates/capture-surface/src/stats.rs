//! Delivery counters for the capture surface.

/// Runtime statistics of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    /// Frames fully written to the channel.
    pub frames_sent: u64,

    /// Video samples that did not make it onto the channel.
    pub frames_dropped: u64,

    /// Bytes written for sent frames, headers included.
    pub bytes_sent: u64,

    /// Audio samples and samples delivered while paused.
    pub samples_ignored: u64,

    /// Failed connection attempts to the consumer.
    pub connect_failures: u64,

    /// Connections discarded after a failed write.
    pub disconnects: u64,
}

impl SurfaceStats {
    /// Drop rate as a percentage of all video samples.
    pub fn drop_rate(&self) -> f64 {
        let total = self.frames_sent + self.frames_dropped;
        if total == 0 {
            return 0.0;
        }
        (self.frames_dropped as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_rate_with_no_frames_is_zero() {
        assert_eq!(SurfaceStats::default().drop_rate(), 0.0);
    }

    #[test]
    fn drop_rate_counts_only_video() {
        let stats = SurfaceStats {
            frames_sent: 3,
            frames_dropped: 1,
            samples_ignored: 100,
            ..Default::default()
        };
        assert!((stats.drop_rate() - 25.0).abs() < 1e-9);
    }
}
