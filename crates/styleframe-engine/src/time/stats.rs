use std::time::Duration;

/// Per-stage timings of one frame.
#[derive(Debug, Copy, Clone, Default)]
pub struct FrameTimings {
    /// Host upload, zero for device-resident input.
    pub upload: Duration,
    /// Draw encoding and submission.
    pub draw: Duration,
    /// Fence wait, when measured and successful.
    pub sync: Option<Duration>,
    /// Inference time reported by the caller.
    pub inference: Option<Duration>,
    /// Wall-clock time of the whole frame.
    pub total: Duration,
}

/// Averages over one telemetry window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StatsReport {
    pub frames: u64,
    pub fps: f64,
    pub upload_ms: f64,
    pub draw_ms: f64,
    /// Average over frames whose fence wait succeeded.
    pub sync_ms: Option<f64>,
    pub inference_ms: Option<f64>,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Default)]
struct Window {
    frames: u64,
    elapsed: Duration,
    upload: Duration,
    draw: Duration,
    sync: Duration,
    sync_frames: u64,
    inference: Duration,
    inference_frames: u64,
    total: Duration,
}

/// Accumulates frame timings and emits a report every `interval` frames.
#[derive(Debug, Clone)]
pub struct FrameStats {
    interval: u64,
    window: Window,
}

impl FrameStats {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            window: Window::default(),
        }
    }

    /// Adds one frame. `dt` is the time since the previous frame.
    pub fn record(&mut self, dt: Duration, timings: &FrameTimings) -> Option<StatsReport> {
        let w = &mut self.window;
        w.frames += 1;
        w.elapsed += dt;
        w.upload += timings.upload;
        w.draw += timings.draw;
        w.total += timings.total;
        if let Some(sync) = timings.sync {
            w.sync += sync;
            w.sync_frames += 1;
        }
        if let Some(inference) = timings.inference {
            w.inference += inference;
            w.inference_frames += 1;
        }

        if w.frames < self.interval {
            return None;
        }
        let report = report(w);
        self.window = Window::default();
        Some(report)
    }
}

fn report(w: &Window) -> StatsReport {
    let avg_ms = |d: Duration, n: u64| d.as_secs_f64() * 1000.0 / n as f64;
    let elapsed = w.elapsed.as_secs_f64();

    StatsReport {
        frames: w.frames,
        fps: if elapsed > 0.0 {
            w.frames as f64 / elapsed
        } else {
            0.0
        },
        upload_ms: avg_ms(w.upload, w.frames),
        draw_ms: avg_ms(w.draw, w.frames),
        sync_ms: (w.sync_frames > 0).then(|| avg_ms(w.sync, w.sync_frames)),
        inference_ms: (w.inference_frames > 0).then(|| avg_ms(w.inference, w.inference_frames)),
        total_ms: avg_ms(w.total, w.frames),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn reports_once_per_interval() {
        let mut stats = FrameStats::new(3);
        let t = FrameTimings {
            draw: ms(2),
            total: ms(4),
            ..Default::default()
        };

        assert!(stats.record(ms(10), &t).is_none());
        assert!(stats.record(ms(10), &t).is_none());
        let report = stats.record(ms(10), &t).unwrap();

        assert_eq!(report.frames, 3);
        assert!((report.fps - 100.0).abs() < 1e-6);
        assert!((report.draw_ms - 2.0).abs() < 1e-9);
        assert_eq!(report.sync_ms, None);
        assert!(stats.record(ms(10), &t).is_none());
    }

    #[test]
    fn optional_stages_average_over_measured_frames() {
        let mut stats = FrameStats::new(2);
        stats.record(
            ms(16),
            &FrameTimings {
                sync: Some(ms(3)),
                ..Default::default()
            },
        );
        let report = stats
            .record(
                ms(16),
                &FrameTimings {
                    sync: None,
                    inference: Some(ms(20)),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(report.sync_ms, Some(3.0));
        assert_eq!(report.inference_ms, Some(20.0));
    }
}
