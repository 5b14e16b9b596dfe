use std::time::{Duration, Instant};

/// Frames per second, measured over fixed windows.
pub struct FpsCounter {
    window: Duration,
    window_start: Instant,
    frames_in_window: u32,
    current_fps: f32,
    total_frames: u64,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsCounter {
    /// Counter reporting once per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            frames_in_window: 0,
            current_fps: 0.0,
            total_frames: 0,
        }
    }

    /// Counts a frame. Returns the new rate when a window has completed.
    pub fn update(&mut self) -> Option<f32> {
        self.frames_in_window += 1;
        self.total_frames += 1;

        let elapsed = self.window_start.elapsed();
        if elapsed < self.window {
            return None;
        }

        let seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        self.current_fps = self.frames_in_window as f32 / seconds;
        self.window_start = Instant::now();
        self.frames_in_window = 0;
        Some(self.current_fps)
    }

    /// Rate of the last completed window; zero before the first one.
    #[must_use]
    pub fn current_fps(&self) -> f32 {
        self.current_fps
    }

    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}
