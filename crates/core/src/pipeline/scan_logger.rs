use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for scan progress, stage timings and event counts.
///
/// Keeps the scan loop independent of how progress is surfaced (terminal,
/// nothing at all in tests).
pub trait ScanLogger: Send {
    /// `total` is 0 when the container does not report a frame count.
    fn progress(&mut self, current: usize, total: usize);

    /// How long a named stage took for one frame, in milliseconds.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Bumps a named event counter (e.g. `minted`, `store_failures`).
    fn count(&mut self, event: &str);

    fn info(&mut self, message: &str);

    /// End-of-scan report. Default: no-op.
    fn summary(&self) {}
}

pub struct NullScanLogger;

impl ScanLogger for NullScanLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn count(&mut self, _event: &str) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI logger: throttled progress lines through `log`, plus a per-stage
/// timing and event-count summary when the scan ends.
pub struct StdoutScanLogger {
    label: String,
    throttle_frames: usize,
    timings: BTreeMap<String, (usize, f64)>,
    counts: BTreeMap<String, usize>,
    start_time: Instant,
    frames_seen: usize,
}

impl StdoutScanLogger {
    /// `label` prefixes every line so concurrent scans stay distinguishable.
    pub fn new(label: impl Into<String>, throttle_frames: usize) -> Self {
        Self {
            label: label.into(),
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            counts: BTreeMap::new(),
            start_time: Instant::now(),
            frames_seen: 0,
        }
    }

    pub fn count_of(&self, event: &str) -> usize {
        self.counts.get(event).copied().unwrap_or(0)
    }

    /// Mean duration of a stage in milliseconds.
    pub fn average_ms(&self, stage: &str) -> Option<f64> {
        self.timings
            .get(stage)
            .filter(|(n, _)| *n > 0)
            .map(|(n, total)| total / *n as f64)
    }

    /// `None` until at least one frame, timing or event was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames_seen == 0 && self.timings.is_empty() && self.counts.is_empty() {
            return None;
        }
        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "[{}] Scan summary ({} frames, {elapsed_s:.1}s):",
            self.label, self.frames_seen
        )];

        for (stage, (n, total_ms)) in &self.timings {
            let avg_ms = if *n > 0 { total_ms / *n as f64 } else { 0.0 };
            lines.push(format!(
                "  {stage:10}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }
        for (event, n) in &self.counts {
            lines.push(format!("  {event}: {n}"));
        }
        if self.frames_seen > 0 && elapsed_s > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} fps",
                self.frames_seen as f64 / elapsed_s
            ));
        }
        Some(lines.join("\n"))
    }
}

impl ScanLogger for StdoutScanLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen = self.frames_seen.max(current);
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("[{}] Scanned {current}/{total} frames ({pct:.1}%)", self.label);
        } else {
            log::info!("[{}] Scanned {current} frames", self.label);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        let slot = self.timings.entry(stage.to_string()).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += duration_ms;
    }

    fn count(&mut self, event: &str) {
        *self.counts.entry(event.to_string()).or_insert(0) += 1;
    }

    fn info(&mut self, message: &str) {
        log::info!("[{}] {message}", self.label);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullScanLogger;
        logger.progress(1, 10);
        logger.timing("track", 5.0);
        logger.count("minted");
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_average() {
        let mut logger = StdoutScanLogger::new("cam1", 10);
        logger.timing("embed", 10.0);
        logger.timing("embed", 30.0);
        assert_abs_diff_eq!(logger.average_ms("embed").unwrap(), 20.0);
        assert!(logger.average_ms("track").is_none());
    }

    #[test]
    fn test_counts() {
        let mut logger = StdoutScanLogger::new("cam1", 10);
        logger.count("minted");
        logger.count("minted");
        logger.count("matched");
        assert_eq!(logger.count_of("minted"), 2);
        assert_eq!(logger.count_of("matched"), 1);
        assert_eq!(logger.count_of("refreshed"), 0);
    }

    #[test]
    fn test_summary_lists_stages_and_counts() {
        let mut logger = StdoutScanLogger::new("lobby.mp4", 10);
        logger.progress(40, 0);
        logger.timing("track", 12.0);
        logger.count("store_failures");

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("[lobby.mp4] Scan summary (40 frames"));
        assert!(summary.contains("track"));
        assert!(summary.contains("store_failures: 1"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StdoutScanLogger::new("x", 10).summary_string().is_none());
    }

    #[test]
    fn test_zero_throttle_is_clamped() {
        let mut logger = StdoutScanLogger::new("x", 0);
        logger.progress(3, 0);
        assert_eq!(logger.throttle_frames, 1);
    }
}
