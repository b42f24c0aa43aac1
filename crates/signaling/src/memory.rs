//! MemoryRelay – In-Process-Implementierung des [`Relay`]-Traits
//!
//! Haelt pro Raum die Presence-Menge und die Postfaecher aller Empfaenger.
//! Dokumente werden wie in einem echten Store als JSON abgelegt und beim
//! Ausliefern wieder dekodiert und validiert.
//!
//! Thread-safe via Arc + DashMap; pro Raum schuetzt ein Mutex Snapshot und
//! Abo-Registrierung gemeinsam, damit zwischen "vorhandene Eintraege" und
//! "Live-Aenderungen" nichts verloren geht oder doppelt ankommt.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use huddle_core::{ParticipantId, RoomId, SessionId};
use huddle_protocol::{PresenceEvent, SignalDocument};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::relay::{DocumentStream, PresenceStream, Relay};

// ---------------------------------------------------------------------------
// Raum-Zustand
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Postfach {
    /// Abgelegte Dokumente als JSON, Index + 1 = Sequenznummer
    dokumente: Vec<String>,
    abos: Vec<mpsc::UnboundedSender<String>>,
}

#[derive(Default)]
struct RaumZustand {
    /// Teilnehmer mit der Sitzung ihres aktuellen Beitritts
    teilnehmer: BTreeMap<ParticipantId, SessionId>,
    presence_abos: Vec<mpsc::UnboundedSender<PresenceEvent>>,
    postfaecher: HashMap<ParticipantId, Postfach>,
}

impl RaumZustand {
    fn presence_verteilen(&mut self, event: PresenceEvent) {
        self.presence_abos.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

// ---------------------------------------------------------------------------
// MemoryRelay
// ---------------------------------------------------------------------------

/// In-Process-Relay fuer Demo und Tests
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<MemoryRelayInner>,
}

#[derive(Default)]
struct MemoryRelayInner {
    raeume: DashMap<RoomId, Arc<Mutex<RaumZustand>>>,
    /// Anzahl der naechsten `anhaengen`-Aufrufe, die fehlschlagen sollen
    fehler_injektion: AtomicUsize,
    anhaenge_versuche: AtomicUsize,
}

impl MemoryRelay {
    /// Erstellt ein leeres Relay
    pub fn neu() -> Self {
        Self::default()
    }

    /// Die naechsten `n` Aufrufe von `anhaengen` schlagen mit einem
    /// voruebergehenden Relay-Fehler fehl
    pub fn fail_next_appends(&self, n: usize) {
        self.inner.fehler_injektion.store(n, Ordering::SeqCst);
    }

    /// Anzahl aller `anhaengen`-Aufrufe (inklusive fehlgeschlagener)
    pub fn anhaenge_versuche(&self) -> usize {
        self.inner.anhaenge_versuche.load(Ordering::SeqCst)
    }

    /// Aktuelle Presence-Menge eines Raums (sortiert)
    pub fn teilnehmer(&self, room: &RoomId) -> Vec<ParticipantId> {
        match self.inner.raeume.get(room) {
            Some(raum) => raum.lock().teilnehmer.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Alle gueltigen Dokumente im Postfach von `empfaenger`
    pub fn dokumente(&self, room: &RoomId, empfaenger: &ParticipantId) -> Vec<SignalDocument> {
        let Some(raum) = self.inner.raeume.get(room).map(|r| Arc::clone(r.value())) else {
            return Vec::new();
        };
        let raum = raum.lock();
        raum.postfaecher
            .get(empfaenger)
            .map(|p| {
                p.dokumente
                    .iter()
                    .filter_map(|json| SignalDocument::from_json(json).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Legt ein beliebiges JSON-Dokument ab (ohne Validierung)
    ///
    /// Damit laesst sich pruefen, wie Empfaenger mit kaputten Dokumenten umgehen.
    pub fn roh_anhaengen(&self, room: &RoomId, empfaenger: &ParticipantId, json: impl Into<String>) {
        let raum = self.raum(room);
        let mut raum = raum.lock();
        let postfach = raum.postfaecher.entry(empfaenger.clone()).or_default();
        let json = json.into();
        postfach.abos.retain(|tx| tx.send(json.clone()).is_ok());
        postfach.dokumente.push(json);
    }

    fn raum(&self, room: &RoomId) -> Arc<Mutex<RaumZustand>> {
        Arc::clone(
            self.inner
                .raeume
                .entry(room.clone())
                .or_default()
                .value(),
        )
    }
}

fn empfaenger_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> stream::BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|v| (v, rx)) }).boxed()
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn presence_eintragen(
        &self,
        room: &RoomId,
        teilnehmer: &ParticipantId,
        sitzung: &SessionId,
    ) -> SignalingResult<()> {
        let raum = self.raum(room);
        let mut raum = raum.lock();
        match raum.teilnehmer.insert(teilnehmer.clone(), sitzung.clone()) {
            None => {
                tracing::debug!(room = %room, teilnehmer = %teilnehmer, sitzung = %sitzung, "Presence eingetragen");
                raum.presence_verteilen(PresenceEvent::beigetreten(teilnehmer.clone()));
            }
            Some(vorherige) if &vorherige != sitzung => {
                // Neuer Beitritt ohne vorheriges Austragen: fuer die anderen ein Verlassen und Beitreten
                tracing::debug!(room = %room, teilnehmer = %teilnehmer, sitzung = %sitzung, "Presence mit neuer Sitzung");
                raum.presence_verteilen(PresenceEvent::verlassen(teilnehmer.clone()));
                raum.presence_verteilen(PresenceEvent::beigetreten(teilnehmer.clone()));
            }
            Some(_) => {}
        }
        Ok(())
    }

    async fn sitzung_von(&self, room: &RoomId, teilnehmer: &ParticipantId) -> SignalingResult<Option<SessionId>> {
        let Some(raum) = self.inner.raeume.get(room).map(|r| Arc::clone(r.value())) else {
            return Ok(None);
        };
        let sitzung = raum.lock().teilnehmer.get(teilnehmer).cloned();
        Ok(sitzung)
    }

    async fn presence_austragen(&self, room: &RoomId, teilnehmer: &ParticipantId) -> SignalingResult<()> {
        let raum = self.raum(room);
        let mut raum = raum.lock();
        if raum.teilnehmer.remove(teilnehmer).is_some() {
            tracing::debug!(room = %room, teilnehmer = %teilnehmer, "Presence ausgetragen");
            raum.presence_verteilen(PresenceEvent::verlassen(teilnehmer.clone()));
        }
        Ok(())
    }

    async fn presence_beobachten(&self, room: &RoomId) -> SignalingResult<PresenceStream> {
        let raum = self.raum(room);
        let (snapshot, rx) = {
            let mut raum = raum.lock();
            let snapshot: Vec<PresenceEvent> = raum
                .teilnehmer
                .keys()
                .cloned()
                .map(PresenceEvent::beigetreten)
                .collect();
            let (tx, rx) = mpsc::unbounded_channel();
            raum.presence_abos.push(tx);
            (snapshot, rx)
        };
        Ok(stream::iter(snapshot).chain(empfaenger_stream(rx)).boxed())
    }

    async fn anhaengen(&self, room: &RoomId, mut doc: SignalDocument) -> SignalingResult<u64> {
        self.inner.anhaenge_versuche.fetch_add(1, Ordering::SeqCst);

        let injiziert = self
            .inner
            .fehler_injektion
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injiziert {
            return Err(SignalingError::relay("injizierter Relay-Fehler"));
        }

        let raum = self.raum(room);
        let mut raum = raum.lock();
        let postfach = raum.postfaecher.entry(doc.to.clone()).or_default();
        let seq = postfach.dokumente.len() as u64 + 1;
        doc.seq = seq;
        let json = doc.to_json()?;
        postfach.abos.retain(|tx| tx.send(json.clone()).is_ok());
        postfach.dokumente.push(json);
        Ok(seq)
    }

    async fn dokumente_beobachten(
        &self,
        room: &RoomId,
        empfaenger: &ParticipantId,
    ) -> SignalingResult<DocumentStream> {
        let raum = self.raum(room);
        let (vorhanden, rx) = {
            let mut raum = raum.lock();
            let postfach = raum.postfaecher.entry(empfaenger.clone()).or_default();
            let (tx, rx) = mpsc::unbounded_channel();
            postfach.abos.push(tx);
            (postfach.dokumente.clone(), rx)
        };

        let room = room.clone();
        let dokumente = stream::iter(vorhanden)
            .chain(empfaenger_stream(rx))
            .filter_map(move |json| {
                let ergebnis = SignalDocument::from_json(&json);
                let room = room.clone();
                async move {
                    match ergebnis {
                        Ok(doc) => Some(doc),
                        Err(e) => {
                            tracing::warn!(room = %room, fehler = %e, "Ungueltiges Dokument verworfen");
                            None
                        }
                    }
                }
            });
        Ok(dokumente.boxed())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
