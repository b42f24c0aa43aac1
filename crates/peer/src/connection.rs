//! PeerConnection – Verhandlung mit genau einem Remote-Teilnehmer
//!
//! Haelt den Zustandsautomaten, den Candidate-Puffer und die Menge der
//! bereits gemeldeten Remote-Tracks. Die Verbindung selbst ist nicht
//! nebenlaeufig; der [`PeerActor`](crate::PeerActor) fuettert sie der Reihe
//! nach mit Signalisierungs-Nachrichten und Engine-Ereignissen.
//!
//! Ausgehende Nachrichten landen in einer begrenzten Warteschlange, die ein
//! eigener Sende-Task ueber den Signalisierungs-Kanal abarbeitet.

use huddle_core::{ParticipantId, TrackId};
use huddle_media::LocalMediaState;
use huddle_protocol::{IceCandidate, SessionDescription, SignalingMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::buffer::CandidateBuffer;
use crate::config::ConnectivityConfig;
use crate::engine::{EngineEvent, EngineVerbindung, RtcConnection, RtcEngine};
use crate::error::{PeerError, PeerResult};
use crate::notice::{PeerNotice, PeerNoticeKind};
use crate::state::{PeerState, Role};

/// Parameter fuer eine neue Peer-Verbindung
#[derive(Debug, Clone)]
pub struct PeerSetup {
    pub local_id: ParticipantId,
    pub remote: ParticipantId,
    pub role: Role,
    /// Unterscheidet aufeinanderfolgende Verbindungen zum selben Remote
    pub generation: u64,
    pub config: ConnectivityConfig,
}

/// Verbindung zu einem Remote-Teilnehmer
pub struct PeerConnection {
    local_id: ParticipantId,
    remote: ParticipantId,
    role: Role,
    generation: u64,
    state_tx: watch::Sender<PeerState>,
    engine: Box<dyn RtcConnection>,
    puffer: CandidateBuffer,
    remote_description_gesetzt: bool,
    /// ICE-Username-Fragment der Remote-Description; Candidates mit anderem
    /// Fragment stammen aus einer verworfenen Verhandlung
    remote_ufrag: Option<String>,
    /// SDP des zuletzt angewendeten Angebots (Erkennung von Wiederholungen)
    angewendetes_angebot: Option<String>,
    remote_tracks: HashSet<TrackId>,
    ausgang: mpsc::Sender<SignalingMessage>,
    notices: mpsc::UnboundedSender<PeerNotice>,
    /// Nach dem Abbruch wartet `senden` nicht mehr auf Platz im Ausgang
    abbruch: CancellationToken,
}

impl PeerConnection {
    /// Oeffnet eine Engine-Verbindung und haengt die lokalen Tracks an
    ///
    /// Schlaegt mit [`PeerError::MedienNichtBereit`] fehl, solange die
    /// lokalen Medien nicht `Ready` sind. Bei einem Fehler bleibt keine
    /// halb aufgebaute Engine-Verbindung zurueck.
    pub async fn neu(
        setup: PeerSetup,
        medien: &LocalMediaState,
        engine: &dyn RtcEngine,
        ausgang: mpsc::Sender<SignalingMessage>,
        notices: mpsc::UnboundedSender<PeerNotice>,
        abbruch: CancellationToken,
    ) -> PeerResult<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
        let Some(tracks) = medien.tracks() else {
            return Err(PeerError::MedienNichtBereit(medien.name()));
        };

        let EngineVerbindung {
            mut connection,
            events,
        } = engine.open(&setup.remote, &setup.config).await?;

        for track in tracks.iter() {
            if let Err(e) = connection.add_track(Arc::clone(track)).await {
                connection.close().await;
                return Err(e);
            }
        }

        let (state_tx, _) = watch::channel(PeerState::New);
        let mut verbindung = Self {
            local_id: setup.local_id,
            remote: setup.remote,
            role: setup.role,
            generation: setup.generation,
            state_tx,
            engine: connection,
            puffer: CandidateBuffer::neu(),
            remote_description_gesetzt: false,
            remote_ufrag: None,
            angewendetes_angebot: None,
            remote_tracks: HashSet::new(),
            ausgang,
            notices,
            abbruch,
        };
        verbindung.uebergang(PeerState::LocalReady);

        debug!(
            remote = %verbindung.remote,
            generation = verbindung.generation,
            role = ?verbindung.role,
            tracks = tracks.len(),
            "Peer-Verbindung erstellt"
        );
        Ok((verbindung, events))
    }

    // -----------------------------------------------------------------------
    // Zugriff
    // -----------------------------------------------------------------------

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> PeerState {
        *self.state_tx.borrow()
    }

    /// Abonniert Zustandswechsel
    pub fn state_beobachten(&self) -> watch::Receiver<PeerState> {
        self.state_tx.subscribe()
    }

    /// Anzahl der bisher gemeldeten Remote-Tracks
    pub fn remote_tracks(&self) -> usize {
        self.remote_tracks.len()
    }

    /// Candidates, die noch auf die Remote-Description warten
    pub fn wartende_kandidaten(&self) -> usize {
        self.puffer.wartend()
    }

    // -----------------------------------------------------------------------
    // Verhandlung
    // -----------------------------------------------------------------------

    /// Initiator: erstellt das Angebot und reiht es zum Versand ein
    pub async fn angebot_erstellen(&mut self) -> PeerResult<()> {
        if self.state() != PeerState::LocalReady || self.role != Role::Initiator {
            return Err(PeerError::verhandlung(
                &self.remote,
                format!("kein Angebot im Zustand {} als {:?}", self.state(), self.role),
            ));
        }

        let angebot = self.engine.create_offer().await?;
        self.engine.set_local_description(angebot.clone()).await?;
        self.uebergang(PeerState::OfferSent);
        self.senden(SignalingMessage::Offer(angebot)).await;
        info!(remote = %self.remote, generation = self.generation, "Angebot gesendet");
        Ok(())
    }

    /// Verarbeitet eine Nachricht des Remote-Teilnehmers
    pub async fn nachricht_verarbeiten(&mut self, nachricht: SignalingMessage) -> PeerResult<()> {
        if self.state().ist_geschlossen() {
            trace!(remote = %self.remote, art = nachricht.art(), "Nachricht nach Close ignoriert");
            return Ok(());
        }
        match nachricht {
            SignalingMessage::Offer(angebot) => self.angebot_verarbeiten(angebot).await,
            SignalingMessage::Answer(antwort) => self.antwort_verarbeiten(antwort).await,
            SignalingMessage::Candidate(candidate) => {
                self.kandidat_verarbeiten(candidate).await;
                Ok(())
            }
        }
    }

    async fn angebot_verarbeiten(&mut self, angebot: SessionDescription) -> PeerResult<()> {
        if self.angewendetes_angebot.as_deref() == Some(angebot.sdp.as_str()) {
            debug!(remote = %self.remote, "Doppeltes Angebot ignoriert");
            return Ok(());
        }

        match self.state() {
            PeerState::LocalReady => {
                self.role = Role::Responder;
                self.beantworten(angebot).await
            }
            PeerState::OfferSent if self.local_id < self.remote => {
                info!(remote = %self.remote, "Glare: eigene ID ist kleiner, nehme fremdes Angebot an");
                self.engine.rollback().await?;
                self.role = Role::Responder;
                self.beantworten(angebot).await
            }
            PeerState::OfferSent => {
                info!(remote = %self.remote, "Glare: eigenes Angebot hat Vorrang, fremdes verworfen");
                Ok(())
            }
            PeerState::AnswerSent | PeerState::Connected => {
                warn!(
                    remote = %self.remote,
                    state = %self.state(),
                    "Neuverhandlung wird nicht unterstuetzt, Angebot ignoriert"
                );
                Ok(())
            }
            PeerState::New | PeerState::Closed => Ok(()),
        }
    }

    async fn beantworten(&mut self, angebot: SessionDescription) -> PeerResult<()> {
        let sdp = angebot.sdp.clone();
        let ufrag = angebot.ice_ufrag().map(str::to_owned);
        self.engine.set_remote_description(angebot).await?;
        self.remote_description_gesetzt = true;
        self.remote_ufrag = ufrag;
        self.angewendetes_angebot = Some(sdp);
        self.puffer_anwenden().await;

        let antwort = self.engine.create_answer().await?;
        self.engine.set_local_description(antwort.clone()).await?;
        self.uebergang(PeerState::AnswerSent);
        self.senden(SignalingMessage::Answer(antwort)).await;
        info!(remote = %self.remote, generation = self.generation, "Antwort gesendet");
        Ok(())
    }

    async fn antwort_verarbeiten(&mut self, antwort: SessionDescription) -> PeerResult<()> {
        if self.remote_description_gesetzt {
            debug!(remote = %self.remote, "Antwort ignoriert, Remote-Description bereits gesetzt");
            return Ok(());
        }
        if self.state() != PeerState::OfferSent {
            return Err(PeerError::verhandlung(
                &self.remote,
                format!("unerwartete Antwort im Zustand {}", self.state()),
            ));
        }

        let ufrag = antwort.ice_ufrag().map(str::to_owned);
        self.engine.set_remote_description(antwort).await?;
        self.remote_description_gesetzt = true;
        self.remote_ufrag = ufrag;
        debug!(remote = %self.remote, "Antwort angewendet");
        self.puffer_anwenden().await;
        Ok(())
    }

    async fn kandidat_verarbeiten(&mut self, candidate: IceCandidate) {
        if !self.puffer.merken(&candidate) {
            trace!(remote = %self.remote, "Doppelter Candidate ignoriert");
            return;
        }
        if self.remote_description_gesetzt {
            self.kandidat_anwenden(candidate).await;
        } else {
            self.puffer.puffern(candidate);
            trace!(remote = %self.remote, wartend = self.puffer.wartend(), "Candidate gepuffert");
        }
    }

    async fn puffer_anwenden(&mut self) {
        let wartend = self.puffer.entnehmen();
        if !wartend.is_empty() {
            debug!(remote = %self.remote, anzahl = wartend.len(), "Gepufferte Candidates werden angewendet");
        }
        for candidate in wartend {
            self.kandidat_anwenden(candidate).await;
        }
    }

    async fn kandidat_anwenden(&mut self, candidate: IceCandidate) {
        if !candidate.passt_zu(self.remote_ufrag.as_deref()) {
            debug!(remote = %self.remote, "Candidate einer verworfenen Verhandlung ignoriert");
            return;
        }
        // Ein einzelner unbrauchbarer Candidate beendet die Verbindung nicht
        if let Err(e) = self.engine.add_ice_candidate(candidate).await {
            warn!(remote = %self.remote, fehler = %e, "Candidate konnte nicht angewendet werden");
        }
    }

    /// Verarbeitet ein Ereignis der Engine-Verbindung
    pub async fn engine_event_verarbeiten(&mut self, event: EngineEvent) -> PeerResult<()> {
        if self.state().ist_geschlossen() {
            return Ok(());
        }
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                self.senden(SignalingMessage::Candidate(candidate)).await;
            }
            EngineEvent::RemoteTrack(track) => {
                if self.remote_tracks.insert(track.id.clone()) {
                    info!(
                        remote = %self.remote,
                        track = %track.id,
                        art = track.kind.als_str(),
                        "Remote-Track verfuegbar"
                    );
                    self.melden(PeerNoticeKind::RemoteTrack(track));
                    if matches!(self.state(), PeerState::OfferSent | PeerState::AnswerSent) {
                        self.uebergang(PeerState::Connected);
                    }
                }
            }
            EngineEvent::Failed(grund) => {
                return Err(PeerError::verhandlung(&self.remote, grund));
            }
        }
        Ok(())
    }

    /// Schliesst die Engine-Verbindung
    ///
    /// Die lokalen Tracks gehoeren der Session und bleiben unberuehrt.
    /// Liefert `false`, wenn die Verbindung schon geschlossen war.
    pub async fn close(&mut self) -> bool {
        if self.state().ist_geschlossen() {
            return false;
        }
        self.engine.close().await;
        self.uebergang(PeerState::Closed);
        info!(remote = %self.remote, generation = self.generation, "Peer-Verbindung geschlossen");
        true
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    fn uebergang(&mut self, ziel: PeerState) {
        let aktuell = self.state();
        if !aktuell.uebergang_erlaubt(ziel) {
            warn!(remote = %self.remote, von = %aktuell, nach = %ziel, "Unzulaessiger Zustandswechsel");
            return;
        }
        self.state_tx.send_replace(ziel);
        debug!(remote = %self.remote, von = %aktuell, nach = %ziel, "Zustandswechsel");
        self.melden(PeerNoticeKind::StateChanged(ziel));
    }

    fn melden(&self, kind: PeerNoticeKind) {
        let _ = self.notices.send(PeerNotice {
            remote: self.remote.clone(),
            generation: self.generation,
            kind,
        });
    }

    async fn senden(&mut self, nachricht: SignalingMessage) {
        let art = nachricht.art();
        tokio::select! {
            biased;
            _ = self.abbruch.cancelled() => {
                debug!(remote = %self.remote, art, "Abbruch, Nachricht verworfen");
            }
            ergebnis = self.ausgang.send(nachricht) => {
                if ergebnis.is_err() {
                    debug!(remote = %self.remote, art, "Ausgang geschlossen, Nachricht verworfen");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
