use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

const FRAMES: &[char] = &['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(120);

/// Terminal spinner shown while reference data loads.
///
/// The animation runs on its own thread and shares nothing with the loader
/// except the stop flag. [`LoadingIndicator::finish`] always joins it.
pub struct LoadingIndicator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LoadingIndicator {
    pub fn start(message: impl Into<String>) -> Self {
        let message = message.into();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("loading-indicator".into())
            .spawn(move || animate(&message, &flag));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(error) => {
                debug!(%error, "loading indicator unavailable");
                None
            }
        };
        Self { stop, handle }
    }

    pub fn finish(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("loading indicator thread panicked");
            }
        }
    }
}

impl Drop for LoadingIndicator {
    fn drop(&mut self) {
        self.join();
    }
}

fn animate(message: &str, stop: &AtomicBool) {
    let mut stderr = std::io::stderr();
    let mut frame = 0;
    while !stop.load(Ordering::Relaxed) {
        // Write failures only affect the animation.
        let _ = write!(stderr, "\r{} {message}", FRAMES[frame % FRAMES.len()]);
        let _ = stderr.flush();
        frame += 1;
        thread::sleep(FRAME_INTERVAL);
    }
    let _ = write!(stderr, "\r{}\r", " ".repeat(message.chars().count() + 2));
    let _ = stderr.flush();
}
