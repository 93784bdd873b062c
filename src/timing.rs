//! Phase timing.

use std::time::Instant;

/// Measures one pipeline phase and logs its duration when finished.
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(name: &'static str) -> Self {
        tracing::info!("=== {} ===", name);
        Self {
            name,
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let secs = self.start.elapsed().as_secs_f64();
        if secs >= 60.0 {
            tracing::info!("[{:.1}m] {}", secs / 60.0, self.name);
        } else {
            tracing::info!("[{:.1}s] {}", secs, self.name);
        }
    }
}
