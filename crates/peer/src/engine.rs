//! Grenze zur Medien-Transport-Engine
//!
//! Die Peer-Verbindung spricht nur ueber [`RtcEngine`] und [`RtcConnection`]
//! mit der eigentlichen WebRTC-Implementierung. Asynchrone Ereignisse der
//! Engine (lokale Candidates, Remote-Tracks, Abbrueche) kommen ueber einen
//! eigenen Kanal pro Verbindung.

use async_trait::async_trait;
use huddle_core::{ParticipantId, TrackId};
use huddle_media::{CapturedTrack, TrackKind};
use huddle_protocol::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ConnectivityConfig;
use crate::error::PeerResult;

/// Ein vom Remote-Teilnehmer empfangener Track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub id: TrackId,
    pub kind: TrackKind,
}

/// Asynchrones Ereignis einer Engine-Verbindung
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Lokal entdeckter Candidate (Trickle an den Remote)
    LocalCandidate(IceCandidate),
    /// Remote-Track verfuegbar
    RemoteTrack(RemoteTrack),
    /// Verbindung nicht mehr nutzbar (z.B. ICE fehlgeschlagen)
    Failed(String),
}

/// Eine geoeffnete Engine-Verbindung samt Ereigniskanal
pub struct EngineVerbindung {
    pub connection: Box<dyn RtcConnection>,
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
}

/// Eine Verbindung zu genau einem Remote-Teilnehmer
#[async_trait]
pub trait RtcConnection: Send + 'static {
    async fn add_track(&mut self, track: Arc<dyn CapturedTrack>) -> PeerResult<()>;

    async fn create_offer(&mut self) -> PeerResult<SessionDescription>;

    /// Setzt eine angewendete Remote-Offer voraus
    async fn create_answer(&mut self) -> PeerResult<SessionDescription>;

    /// Startet die Candidate-Suche beim ersten Aufruf
    async fn set_local_description(&mut self, desc: SessionDescription) -> PeerResult<()>;

    /// Ein Remote-Angebot ist nur ohne eigenes offenes Angebot zulaessig
    async fn set_remote_description(&mut self, desc: SessionDescription) -> PeerResult<()>;

    /// Verwirft das eigene, noch unbeantwortete Angebot
    ///
    /// Danach sind die dafuer gesammelten Candidates ungueltig; die naechste
    /// lokale Description startet eine neue Candidate-Suche.
    async fn rollback(&mut self) -> PeerResult<()>;

    /// Nur nach `set_remote_description` zulaessig
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> PeerResult<()>;

    /// Gibt Engine-Ressourcen frei (idempotent)
    async fn close(&mut self);
}

/// Fabrik fuer Engine-Verbindungen
#[async_trait]
pub trait RtcEngine: Send + Sync + 'static {
    async fn open(
        &self,
        remote: &ParticipantId,
        config: &ConnectivityConfig,
    ) -> PeerResult<EngineVerbindung>;
}
