//! huddle-app – Bibliotheks-Root der Demo
//!
//! Simuliert einen Raum mit mehreren Teilnehmern im selben Prozess:
//! In-Memory-Relay, Loopback-Engine und synthetische Medien. Jeder
//! Teilnehmer bekommt eine eigene Session; am Ende wird aufgelegt und der
//! Metrik-Export ausgegeben.

pub mod config;

use anyhow::Result;
use config::AppConfig;
use futures_util::future::join_all;
use huddle_core::{HuddleError, ParticipantId, RoomId};
use huddle_media::{CaptureDevice, SyntheticCapture};
use huddle_observability::HuddleMetrics;
use huddle_peer::{LoopbackEngine, PeerState};
use huddle_session::{join_room, SessionDeps, SessionEvent, SessionHandle};
use huddle_signaling::{MemoryRelay, RelayChannel, RetryHook};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Ergebnis eines Demo-Laufs
#[derive(Debug, Clone)]
pub struct DemoBericht {
    pub teilnehmer: usize,
    /// Verbundene Peer-Verbindungen, aus Sicht aller Teilnehmer gezaehlt
    pub verbindungen: usize,
    /// Jeder Teilnehmer war mit jedem anderen verbunden
    pub vollstaendig: bool,
    /// Prometheus-Textformat
    pub metriken: String,
}

/// Haelt die Demo-Konfiguration zusammen
pub struct Demo {
    pub config: AppConfig,
}

impl Demo {
    pub fn neu(config: AppConfig) -> Self {
        Self { config }
    }

    /// Laesst alle Teilnehmer beitreten, wartet auf das vollstaendige Netz
    /// (hoechstens `raum.laufzeit_ms`) und legt danach fuer alle auf
    pub async fn starten(self) -> Result<DemoBericht> {
        self.config.validieren()?;

        let room = RoomId::new(self.config.raum.id.clone());
        let relay = Arc::new(MemoryRelay::neu());
        let metrics = Arc::new(HuddleMetrics::neu()?);

        tracing::info!(
            room = %room,
            teilnehmer = self.config.raum.teilnehmer.len(),
            "Demo startet"
        );

        let mut sessions: Vec<SessionHandle> = Vec::new();
        for id in &self.config.raum.teilnehmer {
            let capture = Arc::new(SyntheticCapture::neu());
            match self.teilnehmer_starten(&room, id, &relay, &metrics, capture).await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::error!(
                        teilnehmer = %id,
                        wiederholbar = e.ist_wiederholbar(),
                        fehler = %e,
                        "Beitritt fehlgeschlagen"
                    );
                    join_all(sessions.iter().map(|s| s.hangup())).await;
                    return Err(anyhow::Error::new(e)
                        .context(format!("Teilnehmer '{id}' konnte nicht beitreten")));
                }
            }
        }

        let erwartet = sessions.len() - 1;
        let laufzeit = Duration::from_millis(self.config.raum.laufzeit_ms);
        let vollstaendig = tokio::time::timeout(laufzeit, netz_abwarten(&sessions, erwartet))
            .await
            .is_ok();
        if vollstaendig {
            tracing::info!(room = %room, "Alle Teilnehmer sind miteinander verbunden");
        } else {
            tracing::warn!(room = %room, "Netz wurde nicht rechtzeitig vollstaendig");
        }

        let mut verbindungen = 0;
        for session in &sessions {
            verbindungen += verbundene_peers(session).await;
        }

        join_all(sessions.iter().map(|s| s.hangup())).await;
        tracing::info!(room = %room, "Alle Teilnehmer haben aufgelegt");

        Ok(DemoBericht {
            teilnehmer: sessions.len(),
            verbindungen,
            vollstaendig,
            metriken: metrics.exportieren()?,
        })
    }

    async fn teilnehmer_starten(
        &self,
        room: &RoomId,
        id: &str,
        relay: &Arc<MemoryRelay>,
        metrics: &Arc<HuddleMetrics>,
        capture: Arc<dyn CaptureDevice>,
    ) -> huddle_core::Result<SessionHandle> {
        let retry_zaehler = metrics.signaling_retries_total.clone();
        let hook: RetryHook = Arc::new(move |an: &ParticipantId, versuch: u32| {
            retry_zaehler.inc();
            tracing::debug!(an = %an, versuch, "Zustellung wird wiederholt");
        });
        let channel = RelayChannel::neu(Arc::clone(relay), room.clone(), id.into())
            .mit_retry(self.config.signalisierung.retry.clone())
            .mit_retry_hook(hook);

        let deps = SessionDeps {
            capture,
            channel: Arc::new(channel),
            engine: Arc::new(LoopbackEngine::neu()),
            metrics: Some(Arc::clone(metrics)),
        };

        let session = join_room(room.clone(), self.config.session_config(), deps)
            .await
            .map_err(HuddleError::from)?;
        tokio::spawn(events_protokollieren(id.to_string(), session.events()));
        Ok(session)
    }
}

async fn verbundene_peers(session: &SessionHandle) -> usize {
    session
        .peers()
        .await
        .iter()
        .filter(|p| p.state == PeerState::Connected)
        .count()
}

async fn netz_abwarten(sessions: &[SessionHandle], erwartet: usize) {
    loop {
        let mut fertig = true;
        for session in sessions {
            if verbundene_peers(session).await < erwartet {
                fertig = false;
                break;
            }
        }
        if fertig {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Gibt die Session-Ereignisse eines Teilnehmers im Log aus
async fn events_protokollieren(teilnehmer: String, mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::RemoteTrackAvailable { remote, track }) => {
                tracing::info!(
                    teilnehmer = %teilnehmer,
                    remote = %remote,
                    track = %track.id,
                    art = track.kind.als_str(),
                    "Remote-Track empfangen"
                );
            }
            Ok(SessionEvent::PeerStateChanged { remote, state, .. }) => {
                tracing::debug!(teilnehmer = %teilnehmer, remote = %remote, state = %state, "Peer-Zustand");
            }
            Ok(SessionEvent::PeerFailed { remote, grund, .. }) => {
                tracing::warn!(teilnehmer = %teilnehmer, remote = %remote, grund = %grund, "Peer-Verbindung fehlgeschlagen");
            }
            Ok(SessionEvent::DeliveryFailed { remote, grund }) => {
                tracing::warn!(teilnehmer = %teilnehmer, remote = %remote, grund = %grund, "Zustellung fehlgeschlagen");
            }
            Ok(SessionEvent::PeerClosed { .. }) => {}
            Ok(SessionEvent::Terminated) | Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(teilnehmer = %teilnehmer, verpasst = n, "Session-Ereignisse verpasst");
            }
        }
    }
}
