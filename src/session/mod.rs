//! Capture sessions
//!
//! A session walks Idle, Countdown, Capturing, Composing, Publishing and
//! Result, with Error and Cancelled as terminals that fall back to Idle.

pub mod cancel;
pub mod controller;
pub mod countdown;
pub mod state;
pub mod ticker;

pub use cancel::CancelFlag;
pub use controller::{BoothServices, ControllerOptions, SessionController};
pub use countdown::{Countdown, Tick};
pub use state::{
    CaptureSession, SessionEvent, SessionKind, SessionPhase, SessionRequest, SessionResult,
    SessionTarget,
};
pub use ticker::{second_ticker, IntervalTicker, ManualClock, Ticker, TickerFactory};
