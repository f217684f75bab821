//! Frame pacing and frame-rate statistics

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of frames averaged for the displayed frame time
const FRAME_HISTORY: usize = 100;

/// Caps simulation to a target rate while rendering runs uncapped.
///
/// A step is skipped when less than 90% of a frame has passed since the last
/// one, so jitter around the target does not drop frames.
#[derive(Debug, Clone)]
pub struct FramePacer {
    frame: Duration,
    last_step: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: f32) -> Self {
        Self {
            frame: Duration::from_secs_f32(1.0 / target_fps.max(1.0)),
            last_step: None,
        }
    }

    /// Whether the simulation should advance at `now`; records the step if so
    pub fn should_step(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_step {
            if now.saturating_duration_since(last) < self.frame.mul_f32(0.9) {
                return false;
            }
        }
        self.last_step = Some(now);
        true
    }
}

/// Rolling frame timing, logged once per second
#[derive(Debug)]
pub struct SimStats {
    frame_times: VecDeque<f32>,
    last_frame: Instant,
    window_start: Instant,
    frames_in_window: u32,
    steps_in_window: u32,
}

impl SimStats {
    pub fn new(now: Instant) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(FRAME_HISTORY),
            last_frame: now,
            window_start: now,
            frames_in_window: 0,
            steps_in_window: 0,
        }
    }

    /// Record a rendered frame. Returns `(fps, average frame time in ms)`.
    pub fn record(&mut self, now: Instant, stepped: bool) -> (f32, f32) {
        let frame_time = now.saturating_duration_since(self.last_frame).as_secs_f32() * 1000.0;
        self.last_frame = now;

        self.frame_times.push_back(frame_time);
        if self.frame_times.len() > FRAME_HISTORY {
            self.frame_times.pop_front();
        }

        self.frames_in_window += 1;
        if stepped {
            self.steps_in_window += 1;
        }

        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f32();
        if elapsed >= 1.0 {
            log::info!(
                "{:.1} FPS, {:.1} simulation steps/s",
                self.frames_in_window as f32 / elapsed,
                self.steps_in_window as f32 / elapsed
            );
            self.window_start = now;
            self.frames_in_window = 0;
            self.steps_in_window = 0;
        }

        let avg_frame_time = self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
        let fps = if avg_frame_time > 0.0 {
            1000.0 / avg_frame_time
        } else {
            0.0
        };
        (fps, avg_frame_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_skips_early_frames() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(60.0);

        assert!(pacer.should_step(start));
        assert!(!pacer.should_step(start + Duration::from_millis(5)));
        // 90% of a 60 FPS frame is 15 ms
        assert!(pacer.should_step(start + Duration::from_millis(16)));
        assert!(!pacer.should_step(start + Duration::from_millis(20)));
    }

    #[test]
    fn stats_average_frame_time() {
        let start = Instant::now();
        let mut stats = SimStats::new(start);
        stats.record(start + Duration::from_millis(10), true);
        let (fps, avg) = stats.record(start + Duration::from_millis(30), false);

        assert!((avg - 15.0).abs() < 0.5);
        assert!((fps - 1000.0 / 15.0).abs() < 3.0);
    }
}
