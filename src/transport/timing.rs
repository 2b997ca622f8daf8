//! Clocks that drive the player's tick-processing step

use log::{debug, error, info};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Where the time-driven context gets its time from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    /// The audio thread counts rendered frames.
    Sample,
    /// A dedicated thread reads the wall clock.
    System,
}

impl TimingSource {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sample" => Some(TimingSource::Sample),
            "system" => Some(TimingSource::System),
            _ => None,
        }
    }
}

/// Wall-clock timer thread
///
/// Calls the callback every `interval` with the milliseconds elapsed since
/// the timer started. The thread ends when the callback returns `false` or
/// the timer is stopped.
pub struct SystemTimer {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SystemTimer {
    pub fn start<F>(interval: Duration, mut callback: F) -> io::Result<Self>
    where
        F: FnMut(f64) -> bool + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("midiseqrs-timer".into())
            .spawn(move || {
                let started = Instant::now();
                let mut next_tick = started;
                debug!("System timer thread started ({:?} interval)", interval);

                while thread_running.load(Ordering::Acquire) {
                    let msec = started.elapsed().as_secs_f64() * 1000.0;
                    if !callback(msec) {
                        break;
                    }

                    // Sleep to the next deadline so drift does not accumulate
                    next_tick += interval;
                    let now = Instant::now();
                    if next_tick > now {
                        thread::sleep(next_tick - now);
                    } else {
                        next_tick = now;
                    }
                }

                thread_running.store(false, Ordering::Release);
                debug!("System timer thread finished");
            })?;

        info!("System timer started");
        Ok(Self {
            running,
            thread_handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the thread and waits for it to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("Player timer thread panicked");
            }
        }
    }
}

impl Drop for SystemTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Frame-count clock advanced from the audio callback
#[derive(Debug)]
pub struct SampleTimer {
    sample_rate: f64,
    samples: AtomicU64,
}

impl SampleTimer {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            samples: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Milliseconds at the start of the block, then counts the block's frames.
    pub fn advance(&self, frames: usize) -> f64 {
        let before = self.samples.fetch_add(frames as u64, Ordering::AcqRel);
        self.to_msec(before)
    }

    pub fn msec(&self) -> f64 {
        self.to_msec(self.samples.load(Ordering::Acquire))
    }

    fn to_msec(&self, samples: u64) -> f64 {
        samples as f64 * 1000.0 / self.sample_rate
    }
}
