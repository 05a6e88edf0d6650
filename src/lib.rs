//! Photobooth - unattended photo and video booth.
//!
//! Library crate for the kiosk: camera capture and live preview, print
//! composition, video recording, and publishing to remote storage. The
//! `photobooth` binary drives it from the command line.

pub mod capture;
pub mod compose;
pub mod pipeline;
pub mod recorder;
pub mod session;
pub mod settings;
pub mod transcode;
pub mod upload;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use session::{BoothServices, SessionController, SessionEvent, SessionRequest};
pub use settings::BoothSettings;
pub use utils::{BoothError, BoothResult};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photobooth=debug,photobooth_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    tracing::info!("Starting Photobooth v{}", env!("CARGO_PKG_VERSION"));
}
