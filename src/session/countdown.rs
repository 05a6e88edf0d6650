//! Countdown primitive
//!
//! Pure state: the owner decides what a tick is. Counting down from `n`
//! yields `n-1 .. 1` and then fires exactly once.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Remaining(u32),
    Fire,
    /// Already fired; further ticks do nothing
    Elapsed,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u32,
    fired: bool,
}

impl Countdown {
    pub fn new(seconds: u32) -> Self {
        Self {
            remaining: seconds,
            fired: false,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_elapsed(&self) -> bool {
        self.fired
    }

    pub fn tick(&mut self) -> Tick {
        if self.fired {
            return Tick::Elapsed;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.fired = true;
            Tick::Fire
        } else {
            Tick::Remaining(self.remaining)
        }
    }
}
