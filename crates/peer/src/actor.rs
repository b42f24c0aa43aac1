//! PeerActor – ein Task pro Remote-Teilnehmer
//!
//! Der Actor besitzt die [`PeerConnection`] und arbeitet Befehle aus seinem
//! Postfach und Ereignisse der Engine strikt nacheinander ab. Damit bleibt die
//! Reihenfolge pro Remote erhalten, waehrend verschiedene Remotes parallel
//! verhandeln.
//!
//! ```text
//! Session --PeerCommand--> [Postfach] --> PeerActor --SignalingMessage--> [Ausgang] --> Sende-Task --> SignalingChannel
//!                                            ^   |
//!                          EngineEvent ------+   +--PeerNotice--> Session
//! ```

use huddle_core::ParticipantId;
use huddle_media::LocalMediaState;
use huddle_protocol::SignalingMessage;
use huddle_signaling::{SignalingChannel, SignalingError};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{PeerConnection, PeerSetup};
use crate::engine::{EngineEvent, RtcEngine};
use crate::error::{PeerError, PeerResult};
use crate::notice::{PeerNotice, PeerNoticeKind};
use crate::state::{PeerState, Role};

/// Standard-Groesse der ausgehenden Warteschlange pro Remote
pub const STANDARD_AUSGANG_KAPAZITAET: usize = 64;

/// Befehl an einen PeerActor
#[derive(Debug)]
pub enum PeerCommand {
    /// Nachricht des Remote-Teilnehmers
    Signal(SignalingMessage),
    /// Verbindung schliessen und Actor beenden
    Close,
}

// ---------------------------------------------------------------------------
// PeerHandle
// ---------------------------------------------------------------------------

/// Handle auf einen laufenden PeerActor
///
/// Clone ist billig; alle Clones sprechen mit demselben Actor.
#[derive(Clone)]
pub struct PeerHandle {
    remote: ParticipantId,
    generation: u64,
    postfach: mpsc::UnboundedSender<PeerCommand>,
    state: watch::Receiver<PeerState>,
}

impl PeerHandle {
    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> PeerState {
        *self.state.borrow()
    }

    /// Reiht eine Remote-Nachricht ein; `false` wenn der Actor schon beendet ist
    pub fn signal(&self, nachricht: SignalingMessage) -> bool {
        self.postfach.send(PeerCommand::Signal(nachricht)).is_ok()
    }

    /// Fordert das Schliessen an, ohne darauf zu warten
    pub fn close_anfordern(&self) {
        let _ = self.postfach.send(PeerCommand::Close);
    }

    /// Schliesst die Verbindung und wartet, bis sie geschlossen ist
    ///
    /// Beliebig oft und von mehreren Stellen gleichzeitig aufrufbar.
    pub async fn schliessen(&self) {
        let _ = self.postfach.send(PeerCommand::Close);
        let mut state = self.state.clone();
        // Err: Actor beendet, Verbindung ist damit ebenfalls geschlossen
        let _ = state.wait_for(PeerState::ist_geschlossen).await;
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("remote", &self.remote)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PeerActor
// ---------------------------------------------------------------------------

/// Gemeinsame Abhaengigkeiten aller Peers einer Session
#[derive(Clone)]
pub struct PeerUmgebung {
    pub engine: Arc<dyn RtcEngine>,
    pub channel: Arc<dyn SignalingChannel>,
    pub notices: mpsc::UnboundedSender<PeerNotice>,
    /// Wird beim Beenden der Session ausgeloest
    pub abbruch: CancellationToken,
    pub ausgang_kapazitaet: usize,
}

pub struct PeerActor {
    verbindung: PeerConnection,
    postfach: mpsc::UnboundedReceiver<PeerCommand>,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    notices: mpsc::UnboundedSender<PeerNotice>,
    abbruch: CancellationToken,
}

impl PeerActor {
    /// Baut die Verbindung auf und startet Actor und Sende-Task
    ///
    /// Der Aufbau passiert vor dem Spawn: schlaegt er fehl (z.B. Medien nicht
    /// bereit), laeuft kein Task und es gibt kein Handle.
    pub async fn starten(
        setup: PeerSetup,
        medien: &LocalMediaState,
        umgebung: &PeerUmgebung,
    ) -> PeerResult<PeerHandle> {
        let remote = setup.remote.clone();
        let generation = setup.generation;
        let abbruch = umgebung.abbruch.child_token();

        let (ausgang_tx, ausgang_rx) = mpsc::channel(umgebung.ausgang_kapazitaet.max(1));
        let (verbindung, engine_events) = PeerConnection::neu(
            setup,
            medien,
            umgebung.engine.as_ref(),
            ausgang_tx,
            umgebung.notices.clone(),
            abbruch.clone(),
        )
        .await?;

        let (postfach_tx, postfach) = mpsc::unbounded_channel();
        let handle = PeerHandle {
            remote: remote.clone(),
            generation,
            postfach: postfach_tx,
            state: verbindung.state_beobachten(),
        };

        tokio::spawn(sende_task(
            remote,
            generation,
            ausgang_rx,
            Arc::clone(&umgebung.channel),
            umgebung.notices.clone(),
            abbruch.clone(),
        ));

        let actor = PeerActor {
            verbindung,
            postfach,
            engine_events,
            notices: umgebung.notices.clone(),
            abbruch,
        };
        tokio::spawn(actor.ausfuehren());

        Ok(handle)
    }

    async fn ausfuehren(mut self) {
        if self.verbindung.role() == Role::Initiator {
            if let Err(e) = self.verbindung.angebot_erstellen().await {
                self.fehlschlagen(e).await;
            }
        }

        while !self.verbindung.state().ist_geschlossen() {
            let ergebnis = tokio::select! {
                biased;

                _ = self.abbruch.cancelled() => break,

                befehl = self.postfach.recv() => match befehl {
                    Some(PeerCommand::Signal(nachricht)) => {
                        self.verbindung.nachricht_verarbeiten(nachricht).await
                    }
                    Some(PeerCommand::Close) | None => break,
                },

                Some(event) = self.engine_events.recv() => {
                    self.verbindung.engine_event_verarbeiten(event).await
                }
            };

            if let Err(e) = ergebnis {
                self.fehlschlagen(e).await;
            }
        }

        self.verbindung.close().await;
        self.melden(PeerNoticeKind::Closed);
        debug!(
            remote = %self.verbindung.remote(),
            generation = self.verbindung.generation(),
            "PeerActor beendet"
        );
    }

    async fn fehlschlagen(&mut self, fehler: PeerError) {
        warn!(
            remote = %self.verbindung.remote(),
            generation = self.verbindung.generation(),
            fehler = %fehler,
            "Peer-Verbindung fehlgeschlagen"
        );
        self.melden(PeerNoticeKind::Failed(fehler.to_string()));
        self.verbindung.close().await;
    }

    fn melden(&self, kind: PeerNoticeKind) {
        let _ = self.notices.send(PeerNotice {
            remote: self.verbindung.remote().clone(),
            generation: self.verbindung.generation(),
            kind,
        });
    }
}

/// Arbeitet die ausgehende Warteschlange eines Peers ab
///
/// Endet, wenn die Verbindung (und damit der Sender) wegfaellt, der Kanal
/// geschlossen wurde oder die Session abbricht. Ein Abbruch beendet auch
/// eine laufende Zustellung samt Backoff.
async fn sende_task(
    remote: ParticipantId,
    generation: u64,
    mut ausgang: mpsc::Receiver<SignalingMessage>,
    channel: Arc<dyn SignalingChannel>,
    notices: mpsc::UnboundedSender<PeerNotice>,
    abbruch: CancellationToken,
) {
    while let Some(nachricht) = ausgang.recv().await {
        let art = nachricht.art();
        let ergebnis = tokio::select! {
            biased;
            _ = abbruch.cancelled() => break,
            ergebnis = channel.send_message(&remote, nachricht) => ergebnis,
        };
        match ergebnis {
            Ok(()) => {}
            Err(SignalingError::Geschlossen) => break,
            Err(e) => {
                warn!(remote = %remote, art, fehler = %e, "Nachricht konnte nicht zugestellt werden");
                let _ = notices.send(PeerNotice {
                    remote: remote.clone(),
                    generation,
                    kind: PeerNoticeKind::DeliveryFailed(e.to_string()),
                });
            }
        }
    }
    debug!(remote = %remote, generation, "Sende-Task beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
