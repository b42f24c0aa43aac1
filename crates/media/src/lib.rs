//! huddle-media – Lokale Medienquelle
//!
//! Erfasst Kamera und Mikrofon ueber ein [`CaptureDevice`] und stellt die
//! Tracks allen Peer-Verbindungen der Session zur Verfuegung.
//!
//! ## Zustaende
//! ```text
//! Uninitialized -> Acquiring -> Ready(tracks) -> Released
//!                      |
//!                      +-------> Failed(grund)
//! ```
//!
//! Die Tracks gehoeren der [`LocalMediaSource`]. Peer-Verbindungen bekommen
//! nur eine geteilte Leseansicht ([`LocalTracks`]); stoppen darf sie allein
//! `release()`.

pub mod device;
pub mod error;
pub mod source;
pub mod synthetic;
pub mod track;

// Bequeme Re-Exporte
pub use device::CaptureDevice;
pub use error::{MediaError, MediaResult};
pub use source::{LocalMediaSource, LocalMediaState};
pub use synthetic::{SyntheticCapture, SyntheticTrack};
pub use track::{CapturedTrack, LocalTracks, MediaConstraints, TrackKind};
