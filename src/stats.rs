// =============================================================================
// FRAME STATISTICS
// =============================================================================
//
// Tracks frame times for the FPS readout in the window title and for the
// average frame time logged on shutdown.

use std::time::{Duration, Instant};

/// How often an FPS sample is produced
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// FPS over the last sample interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    pub fps: f32,
    /// Duration of the most recent frame
    pub frame_time: Duration,
}

impl FpsSample {
    pub fn title(&self, base: &str, mode: &str) -> String {
        format!(
            "{} - {:.0} FPS ({:.2}ms) [{}]",
            base,
            self.fps,
            self.frame_time.as_secs_f32() * 1000.0,
            mode
        )
    }
}

#[derive(Debug)]
pub struct FrameStats {
    last_frame: Instant,
    window_start: Instant,
    window_frames: u32,

    total_time: Duration,
    total_frames: u64,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            last_frame: now,
            window_start: now,
            window_frames: 0,
            total_time: Duration::ZERO,
            total_frames: 0,
        }
    }

    /// Record a finished frame. Returns a sample once per interval.
    pub fn record(&mut self, now: Instant) -> Option<FpsSample> {
        let frame_time = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;

        self.total_time += frame_time;
        self.total_frames += 1;
        self.window_frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < SAMPLE_INTERVAL {
            return None;
        }

        let sample = FpsSample {
            fps: self.window_frames as f32 / elapsed.as_secs_f32(),
            frame_time,
        };
        self.window_frames = 0;
        self.window_start = now;
        Some(sample)
    }

    /// Mean frame time over every recorded frame
    pub fn average_frame_time(&self) -> Option<Duration> {
        if self.total_frames == 0 {
            return None;
        }
        Some(Duration::from_nanos(
            (self.total_time.as_nanos() / self.total_frames as u128) as u64,
        ))
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_average_before_first_frame() {
        let stats = FrameStats::new(Instant::now());
        assert_eq!(stats.average_frame_time(), None);
        assert_eq!(stats.total_frames(), 0);
    }

    #[test]
    fn average_is_mean_of_frame_times() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);

        stats.record(start + Duration::from_millis(10));
        stats.record(start + Duration::from_millis(30));
        stats.record(start + Duration::from_millis(60));

        assert_eq!(stats.total_frames(), 3);
        assert_eq!(stats.average_frame_time(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn sample_appears_once_per_second() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);

        let mut samples = Vec::new();
        for i in 1..=120 {
            // 60 frames per second
            let now = start + Duration::from_micros(16_667 * i);
            if let Some(sample) = stats.record(now) {
                samples.push(sample);
            }
        }

        // Frames 60 and 120 each close a window just past one second
        assert_eq!(samples.len(), 2);
        let sample = samples[0];
        assert!((sample.fps - 60.0).abs() < 0.5, "fps was {}", sample.fps);
        assert_eq!(sample.frame_time, Duration::from_micros(16_667));
    }

    #[test]
    fn slow_frame_still_samples() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);

        let sample = stats.record(start + Duration::from_secs(2)).unwrap();
        assert!((sample.fps - 0.5).abs() < f32::EPSILON);
        assert_eq!(sample.frame_time, Duration::from_secs(2));
    }

    #[test]
    fn title_shows_fps_and_mode() {
        let sample = FpsSample {
            fps: 144.4,
            frame_time: Duration::from_micros(6_900),
        };
        assert_eq!(sample.title("v3rse", "windowed"), "v3rse - 144 FPS (6.90ms) [windowed]");
    }
}
