//! Frame pacing for the render worker.
//!
//! The worker doesn't know where its ticks come from: production wires an
//! interval ticker aimed at the display cadence (the stand-in for a
//! vsync-aligned animation frame), tests drive frames one at a time.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::{Duration, Instant};

/// Cooperative per-frame callback source. `wait_frame` blocks until the
/// next frame should be produced and returns `false` when the loop should
/// exit instead.
pub trait FrameTicker: Send {
    fn wait_frame(&mut self) -> bool;
}

/// Fixed-cadence ticker; overshooting frames skip ahead rather than
/// accumulating debt.
pub struct IntervalTicker {
    period: Duration,
    next: Instant,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now(),
        }
    }

    /// ~60 fps.
    pub fn vsync() -> Self {
        Self::new(Duration::from_micros(16_667))
    }
}

impl FrameTicker for IntervalTicker {
    fn wait_frame(&mut self) -> bool {
        let now = Instant::now();
        if now < self.next {
            std::thread::sleep(self.next - now);
        }
        self.next = Instant::now().max(self.next) + self.period;
        true
    }
}

/// Test ticker: frames fire only when [`ManualTickerControl::tick`] is
/// called; dropping the control ends the loop.
pub struct ManualTicker {
    rx: Receiver<()>,
}

pub struct ManualTickerControl {
    tx: Sender<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, ManualTickerControl) {
        let (tx, rx) = unbounded();
        (Self { rx }, ManualTickerControl { tx })
    }
}

impl ManualTickerControl {
    pub fn tick(&self) {
        let _ = self.tx.send(());
    }
}

impl FrameTicker for ManualTicker {
    fn wait_frame(&mut self) -> bool {
        self.rx.recv().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_ticker_fires_per_tick_and_stops_on_drop() {
        let (mut ticker, control) = ManualTicker::new();
        control.tick();
        assert!(ticker.wait_frame());
        drop(control);
        assert!(!ticker.wait_frame());
    }

    #[test]
    fn interval_ticker_paces() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(1));
        let start = Instant::now();
        for _ in 0..3 {
            assert!(ticker.wait_frame());
        }
        assert!(start.elapsed() >= Duration::from_millis(2));
    }
}
