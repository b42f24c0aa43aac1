//! huddle-peer – Verbindung zu einem Remote-Teilnehmer
//!
//! Jeder Remote bekommt eine eigene [`PeerConnection`] mit
//! Verhandlungs-Zustandsautomat, Candidate-Puffer und Remote-Tracks. Der
//! [`PeerActor`] fuehrt sie als eigenen Task aus; die Session spricht nur
//! ueber den [`PeerHandle`] mit ihr.
//!
//! Die eigentliche Medien-Engine steckt hinter [`RtcEngine`] /
//! [`RtcConnection`]. [`LoopbackEngine`] ist die In-Process-Variante fuer
//! Demo und Tests.

pub mod actor;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod loopback;
pub mod notice;
pub mod state;

// Bequeme Re-Exporte
pub use actor::{PeerActor, PeerCommand, PeerHandle, PeerUmgebung, STANDARD_AUSGANG_KAPAZITAET};
pub use buffer::CandidateBuffer;
pub use config::{ConnectivityConfig, IceServer};
pub use connection::{PeerConnection, PeerSetup};
pub use engine::{EngineEvent, EngineVerbindung, RemoteTrack, RtcConnection, RtcEngine};
pub use error::{PeerError, PeerResult};
pub use loopback::{LoopbackEngine, LoopbackProtokoll};
pub use notice::{PeerNotice, PeerNoticeKind};
pub use state::{PeerState, Role};
