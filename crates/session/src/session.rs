//! RoomSession – Orchestrierung eines Raumbeitritts
//!
//! Ein Session-Actor (ein Task) besitzt Medienquelle, Signalisierungs-Kanal
//! und [`PeerRegistry`]. Alle Aenderungen an der Registry laufen ueber ihn;
//! Presence, eingehende Nachrichten, Peer-Meldungen und Befehle des
//! [`SessionHandle`] werden strikt nacheinander verarbeitet.
//!
//! ```text
//! join() -> Medien anfordern -> Presence eintragen -> abonnieren -> Bereit
//!                                                                    |
//!              Presence / Nachrichten / PeerNotice / Befehle  <------+
//!                                                                    |
//! hangup() / Stream-Ende -----------------------------------> herunterfahren
//! ```

use futures_util::future::join_all;
use futures_util::StreamExt;
use huddle_core::{ParticipantId, RoomId, TrackId};
use huddle_media::{CaptureDevice, LocalMediaSource, MediaError};
use huddle_observability::HuddleMetrics;
use huddle_peer::{
    PeerActor, PeerHandle, PeerNotice, PeerNoticeKind, PeerSetup, PeerUmgebung, Role, RtcEngine,
};
use huddle_protocol::{PresenceEvent, PresenceKind, SignalingMessage};
use huddle_signaling::{
    InboundMessage, MessageStream, PresenceStream, SignalingChannel, SignalingResult,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::event::{PeerInfo, SessionEvent};
use crate::registry::PeerRegistry;

// ---------------------------------------------------------------------------
// Abhaengigkeiten
// ---------------------------------------------------------------------------

/// Alles, was eine Session von aussen braucht
///
/// Die lokale Teilnehmer-ID ist die des Kanals.
#[derive(Clone)]
pub struct SessionDeps {
    pub capture: Arc<dyn CaptureDevice>,
    pub channel: Arc<dyn SignalingChannel>,
    pub engine: Arc<dyn RtcEngine>,
    pub metrics: Option<Arc<HuddleMetrics>>,
}

/// Ergebnis des Beitritts, wie es `ready()` sieht
#[derive(Debug, Clone, PartialEq)]
enum Bereitschaft {
    Ausstehend,
    Bereit,
    Medien(MediaError),
    Signalisierung(String),
    Beendet,
}

#[derive(Debug)]
enum SessionCommand {
    Peers(oneshot::Sender<Vec<PeerInfo>>),
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle auf eine laufende Session
///
/// Clone ist billig. Wird das letzte Handle verworfen, beendet sich die
/// Session im Hintergrund.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionHandleInner>,
}

struct SessionHandleInner {
    room: RoomId,
    local_id: ParticipantId,
    befehle: mpsc::UnboundedSender<SessionCommand>,
    abbruch: CancellationToken,
    bereit: watch::Receiver<Bereitschaft>,
    beendet: watch::Receiver<bool>,
    events: broadcast::Sender<SessionEvent>,
    /// Beim Beitritt angelegt, damit der erste `events()`-Aufruf nichts verpasst
    erster_empfaenger: Mutex<Option<broadcast::Receiver<SessionEvent>>>,
}

impl Drop for SessionHandleInner {
    fn drop(&mut self) {
        self.abbruch.cancel();
    }
}

impl SessionHandle {
    pub fn room(&self) -> &RoomId {
        &self.inner.room
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.inner.local_id
    }

    /// Wartet auf das Ergebnis des Beitritts
    ///
    /// `Ok` sobald die Medien bereit sind und die Signalisierung laeuft.
    /// Medienfehler kommen als [`SessionError::Medien`]; ein `hangup()` vor
    /// der Bereitschaft als [`SessionError::Beendet`].
    pub async fn ready(&self) -> SessionResult<()> {
        let mut rx = self.inner.bereit.clone();
        let zustand = rx
            .wait_for(|b| *b != Bereitschaft::Ausstehend)
            .await
            .map(|b| (*b).clone())
            .unwrap_or(Bereitschaft::Beendet);

        match zustand {
            Bereitschaft::Bereit => Ok(()),
            Bereitschaft::Medien(e) => Err(SessionError::Medien(e)),
            Bereitschaft::Signalisierung(grund) => Err(SessionError::Signalisierung(grund)),
            Bereitschaft::Ausstehend | Bereitschaft::Beendet => Err(SessionError::Beendet),
        }
    }

    /// Verlaesst den Raum
    ///
    /// Bricht eine laufende Medien-Anforderung ab, schliesst alle
    /// Verbindungen, gibt die Medien frei, traegt die Presence aus und
    /// schliesst den Kanal. Beliebig oft und parallel aufrufbar; jeder Aufruf
    /// kehrt erst zurueck, wenn das Herunterfahren abgeschlossen ist.
    pub async fn hangup(&self) {
        self.inner.abbruch.cancel();
        let mut beendet = self.inner.beendet.clone();
        // Err: Actor nicht mehr vorhanden, es gibt nichts mehr zu warten
        let _ = beendet.wait_for(|b| *b).await;
    }

    pub fn ist_beendet(&self) -> bool {
        *self.inner.beendet.borrow()
    }

    /// Session-Ereignisse fuer die Darstellungsschicht
    ///
    /// Der erste Aufruf bekommt alle Ereignisse seit dem Beitritt, spaetere
    /// nur die ab ihrem Aufruf.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner
            .erster_empfaenger
            .lock()
            .take()
            .unwrap_or_else(|| self.inner.events.subscribe())
    }

    /// Momentaufnahme aller Verbindungen
    ///
    /// Antwortet erst nach dem Beitritt; nach dem Ende der Session leer.
    pub async fn peers(&self) -> Vec<PeerInfo> {
        let (tx, rx) = oneshot::channel();
        if self.inner.befehle.send(SessionCommand::Peers(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("room", &self.inner.room)
            .field("local_id", &self.inner.local_id)
            .field("beendet", &self.ist_beendet())
            .finish()
    }
}

/// Tritt dem Raum bei und wartet auf die Bereitschaft
///
/// Schlaegt der Beitritt fehl, ist die Session bei Rueckkehr bereits
/// vollstaendig heruntergefahren.
pub async fn join_room(
    room: RoomId,
    config: SessionConfig,
    deps: SessionDeps,
) -> SessionResult<SessionHandle> {
    let handle = RoomSession::join(room, config, deps)?;
    if let Err(e) = handle.ready().await {
        handle.hangup().await;
        return Err(e);
    }
    Ok(handle)
}

// ---------------------------------------------------------------------------
// RoomSession (Actor)
// ---------------------------------------------------------------------------

pub struct RoomSession {
    room: RoomId,
    local_id: ParticipantId,
    config: SessionConfig,
    medien: LocalMediaSource,
    channel: Arc<dyn SignalingChannel>,
    umgebung: PeerUmgebung,
    metrics: Option<Arc<HuddleMetrics>>,
    registry: PeerRegistry,
    /// Bereits gemeldete Remote-Tracks der aktuellen Verbindungen
    bekannte_tracks: HashSet<(ParticipantId, TrackId)>,
    /// Presence wurde (moeglicherweise) eingetragen
    angekuendigt: bool,
    befehle: mpsc::UnboundedReceiver<SessionCommand>,
    notices: mpsc::UnboundedReceiver<PeerNotice>,
    abbruch: CancellationToken,
    bereit: watch::Sender<Bereitschaft>,
    beendet: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
}

impl RoomSession {
    /// Startet den Session-Actor und kehrt sofort zurueck
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden. Das Ergebnis
    /// des Beitritts liefert [`SessionHandle::ready`].
    pub fn join(room: RoomId, config: SessionConfig, deps: SessionDeps) -> SessionResult<SessionHandle> {
        config.validieren()?;
        if deps.channel.room() != &room {
            return Err(SessionError::Konfiguration(format!(
                "Kanal gehoert zu Raum {}, nicht zu {}",
                deps.channel.room(),
                room
            )));
        }

        let local_id = deps.channel.local_id().clone();
        let abbruch = CancellationToken::new();
        let (befehle_tx, befehle) = mpsc::unbounded_channel();
        let (notices_tx, notices) = mpsc::unbounded_channel();
        let (bereit_tx, bereit_rx) = watch::channel(Bereitschaft::Ausstehend);
        let (beendet_tx, beendet_rx) = watch::channel(false);
        let (events, erster_empfaenger) = broadcast::channel(config.event_kapazitaet);

        let umgebung = PeerUmgebung {
            engine: deps.engine,
            channel: Arc::clone(&deps.channel),
            notices: notices_tx,
            abbruch: abbruch.clone(),
            ausgang_kapazitaet: config.ausgang_kapazitaet,
        };

        let session = RoomSession {
            room: room.clone(),
            local_id: local_id.clone(),
            config,
            medien: LocalMediaSource::new(deps.capture),
            channel: deps.channel,
            umgebung,
            metrics: deps.metrics,
            registry: PeerRegistry::neu(),
            bekannte_tracks: HashSet::new(),
            angekuendigt: false,
            befehle,
            notices,
            abbruch: abbruch.clone(),
            bereit: bereit_tx,
            beendet: beendet_tx,
            events: events.clone(),
        };

        info!(room = %room, local = %local_id, "Trete Raum bei");
        tokio::spawn(session.ausfuehren());

        Ok(SessionHandle {
            inner: Arc::new(SessionHandleInner {
                room,
                local_id,
                befehle: befehle_tx,
                abbruch,
                bereit: bereit_rx,
                beendet: beendet_rx,
                events,
                erster_empfaenger: Mutex::new(Some(erster_empfaenger)),
            }),
        })
    }

    async fn ausfuehren(mut self) {
        match self.beitreten().await {
            Ok((presence, nachrichten)) => {
                self.bereit.send_replace(Bereitschaft::Bereit);
                info!(room = %self.room, local = %self.local_id, "Raum beigetreten");
                self.ereignisschleife(presence, nachrichten).await;
            }
            Err(zustand) => {
                self.bereit.send_replace(zustand);
            }
        }
        self.herunterfahren().await;
    }

    /// Medien anfordern, dann Presence und Abonnements einrichten
    async fn beitreten(&mut self) -> Result<(PresenceStream, MessageStream), Bereitschaft> {
        if let Err(e) = self.medien.acquire(self.config.medien, &self.abbruch).await {
            if self.abbruch.is_cancelled() {
                info!(room = %self.room, "Beitritt waehrend der Medien-Anforderung abgebrochen");
                return Err(Bereitschaft::Beendet);
            }
            warn!(room = %self.room, fehler = %e, "Lokale Medien nicht verfuegbar");
            return Err(Bereitschaft::Medien(e));
        }

        let abbruch = self.abbruch.clone();
        let ergebnis = tokio::select! {
            biased;
            _ = abbruch.cancelled() => return Err(Bereitschaft::Beendet),
            res = self.signalisierung_einrichten() => res,
        };

        ergebnis.map_err(|e| {
            warn!(room = %self.room, fehler = %e, "Signalisierung konnte nicht eingerichtet werden");
            Bereitschaft::Signalisierung(e.to_string())
        })
    }

    async fn signalisierung_einrichten(&mut self) -> SignalingResult<(PresenceStream, MessageStream)> {
        // Vor dem Aufruf: auch ein abgebrochenes Eintragen kann angekommen sein
        self.angekuendigt = true;
        self.channel.announce_presence().await?;
        let presence = self.channel.subscribe_presence().await?;
        let nachrichten = self.channel.subscribe_messages().await?;
        Ok((presence, nachrichten))
    }

    async fn ereignisschleife(&mut self, mut presence: PresenceStream, mut nachrichten: MessageStream) {
        loop {
            tokio::select! {
                biased;

                _ = self.abbruch.cancelled() => break,

                Some(befehl) = self.befehle.recv() => self.befehl_verarbeiten(befehl),

                Some(notice) = self.notices.recv() => self.notice_verarbeiten(notice),

                event = presence.next() => match event {
                    Some(event) => self.presence_verarbeiten(event).await,
                    None => {
                        warn!(room = %self.room, "Presence-Stream beendet");
                        break;
                    }
                },

                nachricht = nachrichten.next() => match nachricht {
                    Some(nachricht) => self.nachricht_verarbeiten(nachricht).await,
                    None => {
                        warn!(room = %self.room, "Nachrichten-Stream beendet");
                        break;
                    }
                },
            }
        }
    }

    fn befehl_verarbeiten(&mut self, befehl: SessionCommand) {
        match befehl {
            SessionCommand::Peers(antwort) => {
                let _ = antwort.send(self.registry.snapshot());
            }
        }
    }

    async fn presence_verarbeiten(&mut self, event: PresenceEvent) {
        if self.abbruch.is_cancelled() {
            return;
        }

        let remote = event.participant_id;
        match event.kind {
            PresenceKind::Joined => {
                if self.registry.enthaelt(&remote) {
                    let fehler = SessionError::DoppelteVerbindung(remote.clone());
                    debug!(remote = %remote, fehler = %fehler, "Joined ignoriert");
                    return;
                }
                self.peer_erstellen(remote, Role::Initiator).await;
            }
            PresenceKind::Left => {
                if let Some(handle) = self.registry.entfernen(&remote) {
                    info!(remote = %remote, generation = handle.generation(), "Teilnehmer hat den Raum verlassen");
                    handle.close_anfordern();
                    self.tracks_vergessen(&remote);
                    self.gauge_aktualisieren();
                }
            }
        }
    }

    async fn nachricht_verarbeiten(&mut self, eingang: InboundMessage) {
        if self.abbruch.is_cancelled() {
            return;
        }

        let InboundMessage { from, seq, message } = eingang;
        if let Some(handle) = self.registry.get(&from) {
            if !handle.signal(message) {
                debug!(from = %from, seq, "Peer-Actor bereits beendet, Nachricht verworfen");
            }
            return;
        }

        if matches!(message, SignalingMessage::Offer(_)) {
            if let Some(handle) = self.peer_erstellen(from, Role::Responder).await {
                handle.signal(message);
            }
        } else {
            debug!(from = %from, seq, art = message.art(), "Nachricht ohne Verbindung verworfen");
        }
    }

    fn notice_verarbeiten(&mut self, notice: PeerNotice) {
        let PeerNotice {
            remote,
            generation,
            kind,
        } = notice;

        match kind {
            PeerNoticeKind::StateChanged(state) => {
                self.senden(SessionEvent::PeerStateChanged {
                    remote,
                    generation,
                    state,
                });
            }
            PeerNoticeKind::RemoteTrack(track) => {
                let aktuell = self
                    .registry
                    .get(&remote)
                    .is_some_and(|h| h.generation() == generation);
                if !aktuell || !self.bekannte_tracks.insert((remote.clone(), track.id.clone())) {
                    return;
                }
                if let Some(m) = &self.metrics {
                    m.remote_tracks_total.inc();
                }
                debug!(remote = %remote, track = %track.id, "Remote-Track an Darstellung gemeldet");
                self.senden(SessionEvent::RemoteTrackAvailable { remote, track });
            }
            PeerNoticeKind::DeliveryFailed(grund) => {
                self.senden(SessionEvent::DeliveryFailed { remote, grund });
            }
            PeerNoticeKind::Failed(grund) => {
                if let Some(m) = &self.metrics {
                    m.negotiation_errors_total.inc();
                }
                self.verbindung_entfernen(&remote, generation);
                self.senden(SessionEvent::PeerFailed {
                    remote,
                    generation,
                    grund,
                });
            }
            PeerNoticeKind::Closed => {
                self.verbindung_entfernen(&remote, generation);
                self.senden(SessionEvent::PeerClosed { remote, generation });
            }
        }
    }

    /// Baut eine Verbindung auf und traegt sie ein
    ///
    /// Schlaegt der Aufbau fehl, bleibt nichts registriert.
    async fn peer_erstellen(&mut self, remote: ParticipantId, role: Role) -> Option<PeerHandle> {
        let generation = self.registry.naechste_generation();
        let setup = PeerSetup {
            local_id: self.local_id.clone(),
            remote: remote.clone(),
            role,
            generation,
            config: self.config.konnektivitaet.clone(),
        };

        let handle = match PeerActor::starten(setup, &self.medien.state(), &self.umgebung).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(remote = %remote, generation, fehler = %e, "Peer-Verbindung konnte nicht aufgebaut werden");
                self.senden(SessionEvent::PeerFailed {
                    remote,
                    generation,
                    grund: e.to_string(),
                });
                return None;
            }
        };

        if self.abbruch.is_cancelled() {
            handle.schliessen().await;
            return None;
        }
        if let Err(e) = self.registry.einfuegen(handle.clone()) {
            debug!(remote = %remote, fehler = %e, "Neuere Verbindung verworfen");
            handle.schliessen().await;
            return None;
        }

        if let Some(m) = &self.metrics {
            m.peer_connections_total.inc();
        }
        self.gauge_aktualisieren();
        info!(remote = %remote, generation, role = ?role, "Peer-Verbindung erstellt");
        Some(handle)
    }

    fn verbindung_entfernen(&mut self, remote: &ParticipantId, generation: u64) {
        if self.registry.entfernen_wenn(remote, generation).is_some() {
            debug!(remote = %remote, generation, "Peer-Verbindung entfernt");
            self.tracks_vergessen(remote);
            self.gauge_aktualisieren();
        }
    }

    fn tracks_vergessen(&mut self, remote: &ParticipantId) {
        self.bekannte_tracks.retain(|(r, _)| r != remote);
    }

    fn gauge_aktualisieren(&self) {
        if let Some(m) = &self.metrics {
            m.peer_connections_active.set(self.registry.len() as i64);
        }
    }

    fn senden(&self, event: SessionEvent) {
        // Err: niemand hoert zu
        let _ = self.events.send(event);
    }

    async fn herunterfahren(mut self) {
        self.abbruch.cancel();

        let peers = self.registry.alle_entnehmen();
        let anzahl = peers.len();
        join_all(peers.iter().map(|p| p.schliessen())).await;
        self.bekannte_tracks.clear();
        self.gauge_aktualisieren();

        self.medien.release();

        if self.angekuendigt {
            if let Err(e) = self.channel.withdraw_presence().await {
                warn!(room = %self.room, fehler = %e, "Presence konnte nicht ausgetragen werden");
            }
        }
        self.channel.close().await;

        self.bereit.send_if_modified(|b| {
            if *b == Bereitschaft::Ausstehend {
                *b = Bereitschaft::Beendet;
                true
            } else {
                false
            }
        });
        self.senden(SessionEvent::Terminated);
        self.beendet.send_replace(true);

        info!(room = %self.room, local = %self.local_id, peers = anzahl, "Session beendet");
    }
}
