//! Tick sources for countdowns
//!
//! Sessions advance their countdowns on ticks from a `Ticker`. The booth
//! uses one tick per second; `ManualClock` lets a caller step time by hand.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick
    async fn tick(&mut self);
}

/// Builds a fresh ticker for each countdown
pub type TickerFactory = Arc<dyn Fn() -> Box<dyn Ticker> + Send + Sync>;

pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// First tick one `period` from now
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

pub fn second_ticker() -> TickerFactory {
    Arc::new(|| Box::new(IntervalTicker::new(Duration::from_secs(1))) as Box<dyn Ticker>)
}

/// Logical clock. Ticks sent with `advance` are buffered and consumed in
/// order by whichever ticker waits next.
#[derive(Clone)]
pub struct ManualClock {
    tx: mpsc::UnboundedSender<()>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<()>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn advance(&self, ticks: u32) {
        for _ in 0..ticks {
            let _ = self.tx.send(());
        }
    }

    pub fn factory(&self) -> TickerFactory {
        let rx = self.rx.clone();
        Arc::new(move || Box::new(ManualTicker { rx: rx.clone() }) as Box<dyn Ticker>)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

struct ManualTicker {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<()>>>,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        // The clock holds a sender, so the channel never closes under us
        let _ = self.rx.lock().await.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_waits_a_full_period() {
        let mut ticker = IntervalTicker::new(Duration::from_secs(1));
        let started = Instant::now();
        ticker.tick().await;
        ticker.tick().await;
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_manual_ticks_are_buffered_across_tickers() {
        let clock = ManualClock::new();
        let factory = clock.factory();
        clock.advance(2);

        factory().tick().await;
        factory().tick().await;

        let mut third = factory();
        let pending = tokio::time::timeout(Duration::from_millis(20), third.tick()).await;
        assert!(pending.is_err());
    }
}
