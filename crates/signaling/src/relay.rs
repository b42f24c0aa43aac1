//! Relay-Trait – Grenze zum externen Dokumenten-Store
//!
//! Das Relay kennt pro Raum:
//! - eine Presence-Menge von Teilnehmer-IDs, jeweils mit der Sitzung des
//!   aktuellen Beitritts
//! - pro Empfaenger eine append-only Liste von [`SignalDocument`]s
//!
//! Beobachter bekommen zuerst den aktuellen Stand (alle Teilnehmer als
//! `Joined`, alle vorhandenen Dokumente) und danach die Live-Aenderungen,
//! ohne Luecke und ohne Dopplung dazwischen.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use huddle_core::{ParticipantId, RoomId, SessionId};
use huddle_protocol::{PresenceEvent, SignalDocument};

use crate::error::SignalingResult;

/// Presence-Ereignisse eines Raums (Snapshot, dann live)
pub type PresenceStream = BoxStream<'static, PresenceEvent>;

/// Dokumente eines Empfaengers (vorhandene, dann live)
pub type DocumentStream = BoxStream<'static, SignalDocument>;

/// Publish/Subscribe-Dokumenten-Store
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Traegt `teilnehmer` mit seiner Sitzung in die Presence-Menge ein (idempotent)
    async fn presence_eintragen(
        &self,
        room: &RoomId,
        teilnehmer: &ParticipantId,
        sitzung: &SessionId,
    ) -> SignalingResult<()>;

    /// Entfernt `teilnehmer` aus der Presence-Menge (idempotent)
    async fn presence_austragen(&self, room: &RoomId, teilnehmer: &ParticipantId) -> SignalingResult<()>;

    /// Sitzung, unter der `teilnehmer` gerade im Raum ist
    async fn sitzung_von(&self, room: &RoomId, teilnehmer: &ParticipantId) -> SignalingResult<Option<SessionId>>;

    /// Beobachtet die Presence-Menge
    async fn presence_beobachten(&self, room: &RoomId) -> SignalingResult<PresenceStream>;

    /// Haengt ein Dokument an die Liste von `doc.to` an; liefert die Sequenznummer
    async fn anhaengen(&self, room: &RoomId, doc: SignalDocument) -> SignalingResult<u64>;

    /// Beobachtet die Liste von `empfaenger`
    async fn dokumente_beobachten(
        &self,
        room: &RoomId,
        empfaenger: &ParticipantId,
    ) -> SignalingResult<DocumentStream>;
}
