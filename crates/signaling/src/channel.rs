//! Signalisierungs-Kanal – ein Raum, ein lokaler Teilnehmer
//!
//! [`SignalingChannel`] ist die einzige Schnittstelle, ueber die Session und
//! Peer-Verbindungen mit dem Relay sprechen. [`RelayChannel`] setzt sie auf
//! einem beliebigen [`Relay`] um und ergaenzt:
//! - Filterung der eigenen Presence
//! - eine eigene Sitzung pro Kanal: ausgehende Dokumente nennen die aktuelle
//!   Sitzung des Empfaengers, eingehende an fruehere Sitzungen derselben
//!   Teilnehmer-ID werden verworfen
//! - Wiederholung voruebergehender Fehler mit exponentiellem Backoff
//! - `close()`, das alle Streams des Kanals beendet

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use huddle_core::{ParticipantId, RoomId, SessionId};
use huddle_protocol::{SignalDocument, SignalingMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{SignalingError, SignalingResult};
use crate::relay::{PresenceStream, Relay};
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Eine an den lokalen Teilnehmer adressierte Nachricht
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub from: ParticipantId,
    /// Position in der Nachrichtenliste des lokalen Teilnehmers
    pub seq: u64,
    pub message: SignalingMessage,
}

impl From<SignalDocument> for InboundMessage {
    fn from(doc: SignalDocument) -> Self {
        Self {
            from: doc.from,
            seq: doc.seq,
            message: doc.message,
        }
    }
}

/// Eingehende Nachrichten (vorhandene, dann live)
pub type MessageStream = BoxStream<'static, InboundMessage>;

/// Wird bei jeder Wiederholung mit Empfaenger und Versuchsnummer aufgerufen
pub type RetryHook = Arc<dyn Fn(&ParticipantId, u32) + Send + Sync>;

// ---------------------------------------------------------------------------
// SignalingChannel
// ---------------------------------------------------------------------------

/// Publish/Subscribe-Primitive eines Raums aus Sicht eines Teilnehmers
#[async_trait]
pub trait SignalingChannel: Send + Sync + 'static {
    fn room(&self) -> &RoomId;

    fn local_id(&self) -> &ParticipantId;

    /// Traegt den lokalen Teilnehmer in die Presence-Menge ein (idempotent)
    async fn announce_presence(&self) -> SignalingResult<()>;

    /// Entfernt den lokalen Teilnehmer aus der Presence-Menge (idempotent)
    async fn withdraw_presence(&self) -> SignalingResult<()>;

    /// Alle anderen Teilnehmer als `Joined`, danach Live-Aenderungen
    async fn subscribe_presence(&self) -> SignalingResult<PresenceStream>;

    /// Stellt `message` an `to` zu (mindestens einmal)
    async fn send_message(&self, to: &ParticipantId, message: SignalingMessage) -> SignalingResult<()>;

    /// Nachrichten an den lokalen Teilnehmer (vorhandene, dann live)
    async fn subscribe_messages(&self) -> SignalingResult<MessageStream>;

    /// Beendet alle Streams dieses Kanals (idempotent)
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

// ---------------------------------------------------------------------------
// RelayChannel
// ---------------------------------------------------------------------------

/// [`SignalingChannel`] auf Basis eines [`Relay`]
///
/// Ein Kanal entspricht genau einem Beitritt; fuer einen erneuten Beitritt
/// unter derselben ID wird ein neuer Kanal erstellt.
pub struct RelayChannel<R: Relay> {
    relay: Arc<R>,
    room: RoomId,
    local_id: ParticipantId,
    sitzung: SessionId,
    retry: RetryPolicy,
    geschlossen: CancellationToken,
    wiederholungen: AtomicU64,
    bei_wiederholung: Option<RetryHook>,
}

impl<R: Relay> RelayChannel<R> {
    pub fn neu(relay: Arc<R>, room: RoomId, local_id: ParticipantId) -> Self {
        Self {
            relay,
            room,
            local_id,
            sitzung: SessionId::zufaellig(),
            retry: RetryPolicy::default(),
            geschlossen: CancellationToken::new(),
            wiederholungen: AtomicU64::new(0),
            bei_wiederholung: None,
        }
    }

    /// Setzt die Wiederholungs-Strategie fuer `send_message`
    pub fn mit_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Registriert einen Beobachter fuer Wiederholungen (z.B. Metriken)
    pub fn mit_retry_hook(mut self, hook: RetryHook) -> Self {
        self.bei_wiederholung = Some(hook);
        self
    }

    /// Sitzung dieses Beitritts
    pub fn sitzung(&self) -> &SessionId {
        &self.sitzung
    }

    /// Anzahl bisheriger Wiederholungen ueber alle Empfaenger
    pub fn wiederholungen(&self) -> u64 {
        self.wiederholungen.load(Ordering::Relaxed)
    }

    fn offen(&self) -> SignalingResult<()> {
        if self.geschlossen.is_cancelled() {
            Err(SignalingError::Geschlossen)
        } else {
            Ok(())
        }
    }

    /// Future, das beim Schliessen des Kanals fertig wird
    fn bei_schliessen(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let token = self.geschlossen.clone();
        async move { token.cancelled().await }
    }
}

#[async_trait]
impl<R: Relay> SignalingChannel for RelayChannel<R> {
    fn room(&self) -> &RoomId {
        &self.room
    }

    fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    async fn announce_presence(&self) -> SignalingResult<()> {
        self.offen()?;
        self.relay
            .presence_eintragen(&self.room, &self.local_id, &self.sitzung)
            .await?;
        debug!(room = %self.room, teilnehmer = %self.local_id, sitzung = %self.sitzung, "Presence angekuendigt");
        Ok(())
    }

    async fn withdraw_presence(&self) -> SignalingResult<()> {
        self.offen()?;
        self.relay.presence_austragen(&self.room, &self.local_id).await?;
        debug!(room = %self.room, teilnehmer = %self.local_id, "Presence zurueckgezogen");
        Ok(())
    }

    async fn subscribe_presence(&self) -> SignalingResult<PresenceStream> {
        self.offen()?;
        let eigene = self.local_id.clone();
        let events = self
            .relay
            .presence_beobachten(&self.room)
            .await?
            .filter(move |event| future::ready(event.participant_id != eigene))
            .take_until(self.bei_schliessen());
        Ok(events.boxed())
    }

    async fn send_message(&self, to: &ParticipantId, message: SignalingMessage) -> SignalingResult<()> {
        self.offen()?;
        let doc = SignalDocument::neu(self.local_id.clone(), to.clone(), message);
        doc.validieren()?;
        let doc = doc.an_sitzung(self.relay.sitzung_von(&self.room, to).await?);

        let max_versuche = self.retry.max_versuche.max(1);
        let mut versuch = 1;
        loop {
            let fehler = match self.relay.anhaengen(&self.room, doc.clone()).await {
                Ok(seq) => {
                    trace!(
                        room = %self.room,
                        an = %to,
                        art = doc.message.art(),
                        seq,
                        "Nachricht abgelegt"
                    );
                    return Ok(());
                }
                Err(e) if e.ist_voruebergehend() => e,
                Err(e) => return Err(e),
            };

            if versuch >= max_versuche {
                warn!(room = %self.room, an = %to, versuche = versuch, fehler = %fehler, "Zustellung aufgegeben");
                return Err(SignalingError::Zustellung {
                    an: to.clone(),
                    versuche: versuch,
                    grund: fehler.to_string(),
                });
            }

            let warten = self.retry.verzoegerung(versuch);
            warn!(
                room = %self.room,
                an = %to,
                versuch,
                warten_ms = warten.as_millis() as u64,
                fehler = %fehler,
                "Relay-Fehler, neuer Versuch"
            );
            self.wiederholungen.fetch_add(1, Ordering::Relaxed);
            if let Some(hook) = &self.bei_wiederholung {
                (hook.as_ref())(to, versuch);
            }

            tokio::select! {
                biased;
                _ = self.geschlossen.cancelled() => return Err(SignalingError::Geschlossen),
                _ = tokio::time::sleep(warten) => {}
            }
            versuch += 1;
        }
    }

    async fn subscribe_messages(&self) -> SignalingResult<MessageStream> {
        self.offen()?;
        let sitzung = self.sitzung.clone();
        let nachrichten = self
            .relay
            .dokumente_beobachten(&self.room, &self.local_id)
            .await?
            .filter(move |doc| {
                let gilt = doc.gilt_fuer(&sitzung);
                if !gilt {
                    debug!(from = %doc.from, seq = doc.seq, art = doc.message.art(), "Dokument an fruehere Sitzung verworfen");
                }
                future::ready(gilt)
            })
            .map(InboundMessage::from)
            .take_until(self.bei_schliessen());
        Ok(nachrichten.boxed())
    }

    async fn close(&self) {
        if !self.geschlossen.is_cancelled() {
            self.geschlossen.cancel();
            debug!(room = %self.room, teilnehmer = %self.local_id, "Signalisierungs-Kanal geschlossen");
        }
    }

    fn is_closed(&self) -> bool {
        self.geschlossen.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
