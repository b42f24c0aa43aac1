//! huddle-session – Raum-Session
//!
//! Verbindet die lokale Medienquelle, den Signalisierungs-Kanal und je eine
//! Peer-Verbindung pro Remote-Teilnehmer zu einem vollvermaschten Raum.
//!
//! ```no_run
//! # async fn beispiel(deps: huddle_session::SessionDeps) -> huddle_session::SessionResult<()> {
//! use huddle_session::{join_room, SessionConfig};
//!
//! let session = join_room("raum".into(), SessionConfig::default(), deps).await?;
//! let mut events = session.events();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! session.hangup().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod registry;
pub mod session;

// Bequeme Re-Exporte
pub use config::{SessionConfig, STANDARD_EVENT_KAPAZITAET};
pub use error::{SessionError, SessionResult};
pub use event::{PeerInfo, SessionEvent};
pub use registry::PeerRegistry;
pub use session::{join_room, RoomSession, SessionDeps, SessionHandle};
