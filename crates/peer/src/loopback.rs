//! LoopbackEngine – deterministische In-Process-Engine
//!
//! Erzeugt synthetische SDPs, in denen die lokalen Tracks als
//! `a=huddle-track:<art>:<id>` stehen, meldet nach der ersten lokalen
//! Description eine feste Anzahl Host-Candidates und kuendigt beim Setzen
//! der Remote-Description die dort aufgefuehrten Tracks als Remote-Tracks an.
//!
//! Wie eine echte Engine lehnt sie ein Remote-Angebot ab, solange ein eigenes
//! Angebot offen ist (`have-local-offer`), und Candidates, deren
//! `usernameFragment` nicht zur Remote-Description passt. Jedes `rollback()`
//! wechselt das eigene ICE-Username-Fragment.
//!
//! Jede Verbindung schreibt ein Protokoll (angewendete Candidates in
//! Reihenfolge, Descriptions, geschlossen ja/nein), das Demo und Tests
//! auswerten koennen.

use async_trait::async_trait;
use dashmap::DashMap;
use huddle_core::{ParticipantId, TrackId};
use huddle_media::{CapturedTrack, TrackKind};
use huddle_protocol::{IceCandidate, SdpType, SessionDescription};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ConnectivityConfig;
use crate::engine::{EngineEvent, EngineVerbindung, RemoteTrack, RtcConnection, RtcEngine};
use crate::error::{PeerError, PeerResult};

const TRACK_PRAEFIX: &str = "a=huddle-track:";

// ---------------------------------------------------------------------------
// Protokoll
// ---------------------------------------------------------------------------

/// Aufzeichnung einer Loopback-Verbindung
#[derive(Debug, Default, Clone)]
pub struct LoopbackProtokoll {
    pub angewendete_kandidaten: Vec<IceCandidate>,
    pub lokale_descriptions: Vec<SessionDescription>,
    pub remote_descriptions: Vec<SessionDescription>,
    pub rollbacks: usize,
    pub geschlossen: bool,
}

// ---------------------------------------------------------------------------
// LoopbackEngine
// ---------------------------------------------------------------------------

/// In-Process-Engine fuer Demo und Tests
#[derive(Clone)]
pub struct LoopbackEngine {
    inner: Arc<LoopbackInner>,
}

struct LoopbackInner {
    kandidaten_pro_verbindung: u16,
    sitzungen: AtomicU64,
    /// Alle Verbindungen pro Remote, aelteste zuerst
    protokolle: DashMap<ParticipantId, Vec<Arc<Mutex<LoopbackProtokoll>>>>,
}

impl LoopbackEngine {
    /// Engine mit zwei Host-Candidates pro Verbindung
    pub fn neu() -> Self {
        Self::mit_kandidaten(2)
    }

    pub fn mit_kandidaten(kandidaten_pro_verbindung: u16) -> Self {
        Self {
            inner: Arc::new(LoopbackInner {
                kandidaten_pro_verbindung,
                sitzungen: AtomicU64::new(0),
                protokolle: DashMap::new(),
            }),
        }
    }

    /// Protokoll der juengsten Verbindung zu `remote`
    pub fn protokoll(&self, remote: &ParticipantId) -> Option<LoopbackProtokoll> {
        self.inner
            .protokolle
            .get(remote)
            .and_then(|liste| liste.last().map(|p| p.lock().clone()))
    }

    /// In dieser Reihenfolge angewendete Remote-Candidates (juengste Verbindung)
    pub fn angewendete_kandidaten(&self, remote: &ParticipantId) -> Vec<IceCandidate> {
        self.protokoll(remote)
            .map(|p| p.angewendete_kandidaten)
            .unwrap_or_default()
    }

    /// Wie viele Verbindungen zu `remote` insgesamt geoeffnet wurden
    pub fn verbindungen(&self, remote: &ParticipantId) -> usize {
        self.inner.protokolle.get(remote).map(|l| l.len()).unwrap_or(0)
    }

    /// Anzahl der noch nicht geschlossenen Verbindungen
    pub fn offene_verbindungen(&self) -> usize {
        self.inner
            .protokolle
            .iter()
            .map(|eintrag| eintrag.value().iter().filter(|p| !p.lock().geschlossen).count())
            .sum()
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::neu()
    }
}

#[async_trait]
impl RtcEngine for LoopbackEngine {
    async fn open(
        &self,
        remote: &ParticipantId,
        config: &ConnectivityConfig,
    ) -> PeerResult<EngineVerbindung> {
        let sitzung = self.inner.sitzungen.fetch_add(1, Ordering::Relaxed) + 1;
        let protokoll = Arc::new(Mutex::new(LoopbackProtokoll::default()));
        self.inner
            .protokolle
            .entry(remote.clone())
            .or_default()
            .push(Arc::clone(&protokoll));

        let (events_tx, events) = mpsc::unbounded_channel();
        let kandidaten = self
            .inner
            .kandidaten_pro_verbindung
            .min(u16::from(config.ice_candidate_pool_size));

        tracing::debug!(remote = %remote, sitzung, "Loopback-Verbindung geoeffnet");

        Ok(EngineVerbindung {
            connection: Box::new(LoopbackConnection {
                remote: remote.clone(),
                sitzung,
                kandidaten,
                lokale_tracks: Vec::new(),
                runde: 0,
                lokal: None,
                remote_desc: None,
                remote_tracks: HashSet::new(),
                events: events_tx,
                protokoll,
                geschlossen: false,
            }),
            events,
        })
    }
}

// ---------------------------------------------------------------------------
// LoopbackConnection
// ---------------------------------------------------------------------------

struct LoopbackConnection {
    remote: ParticipantId,
    sitzung: u64,
    kandidaten: u16,
    lokale_tracks: Vec<(TrackId, TrackKind)>,
    /// Zaehlt die Rollbacks; bestimmt Username-Fragment und Candidate-Ports
    runde: u64,
    lokal: Option<SessionDescription>,
    remote_desc: Option<SessionDescription>,
    remote_tracks: HashSet<TrackId>,
    events: mpsc::UnboundedSender<EngineEvent>,
    protokoll: Arc<Mutex<LoopbackProtokoll>>,
    geschlossen: bool,
}

impl LoopbackConnection {
    fn offen(&self) -> PeerResult<()> {
        if self.geschlossen {
            Err(PeerError::Geschlossen)
        } else {
            Ok(())
        }
    }

    fn ufrag(&self) -> String {
        format!("u{}r{}", self.sitzung, self.runde)
    }

    fn sdp_erzeugen(&self) -> String {
        let mut zeilen = vec![
            "v=0".to_string(),
            format!("o=- {} {} IN IP4 127.0.0.1", self.sitzung, self.runde + 1),
            "s=huddle".to_string(),
            "t=0 0".to_string(),
            format!("a=ice-ufrag:{}", self.ufrag()),
        ];
        for (id, kind) in &self.lokale_tracks {
            zeilen.push(format!("{TRACK_PRAEFIX}{}:{}", kind.als_str(), id));
        }
        zeilen.join("\r\n")
    }

    fn kandidaten_melden(&self) {
        let ufrag = self.ufrag();
        for n in 0..self.kandidaten {
            let port = 40_000 + ((self.sitzung * 256 + self.runde * 16 + u64::from(n)) % 20_000);
            let zeile = format!(
                "candidate:{} 1 udp {} 127.0.0.1 {} typ host",
                n + 1,
                2_122_260_223u32 - u32::from(n),
                port
            );
            let _ = self
                .events
                .send(EngineEvent::LocalCandidate(IceCandidate::neu(zeile, 0, "0").mit_ufrag(ufrag.clone())));
        }
    }
}

/// Liest die angekuendigten Tracks aus einer Loopback-SDP
fn tracks_lesen(sdp: &str) -> Result<Vec<RemoteTrack>, String> {
    let mut zeilen = sdp.lines().map(str::trim);
    if zeilen.next() != Some("v=0") {
        return Err("SDP beginnt nicht mit v=0".into());
    }
    let mut tracks = Vec::new();
    for zeile in zeilen {
        let Some(rest) = zeile.strip_prefix(TRACK_PRAEFIX) else {
            continue;
        };
        let (art, id) = rest
            .split_once(':')
            .ok_or_else(|| format!("ungueltige Track-Zeile: {zeile}"))?;
        let kind = match art {
            "audio" => TrackKind::Audio,
            "video" => TrackKind::Video,
            andere => return Err(format!("unbekannte Track-Art: {andere}")),
        };
        tracks.push(RemoteTrack {
            id: TrackId::new(id),
            kind,
        });
    }
    Ok(tracks)
}

#[async_trait]
impl RtcConnection for LoopbackConnection {
    async fn add_track(&mut self, track: Arc<dyn CapturedTrack>) -> PeerResult<()> {
        self.offen()?;
        self.lokale_tracks.push((track.id().clone(), track.kind()));
        Ok(())
    }

    async fn create_offer(&mut self) -> PeerResult<SessionDescription> {
        self.offen()?;
        Ok(SessionDescription::offer(self.sdp_erzeugen()))
    }

    async fn create_answer(&mut self) -> PeerResult<SessionDescription> {
        self.offen()?;
        match &self.remote_desc {
            Some(desc) if desc.sdp_type == SdpType::Offer => {
                Ok(SessionDescription::answer(self.sdp_erzeugen()))
            }
            _ => Err(PeerError::verhandlung(
                &self.remote,
                "Antwort ohne angewendetes Angebot",
            )),
        }
    }

    async fn set_local_description(&mut self, desc: SessionDescription) -> PeerResult<()> {
        self.offen()?;
        let erste = self.lokal.is_none();
        self.protokoll.lock().lokale_descriptions.push(desc.clone());
        self.lokal = Some(desc);
        if erste {
            self.kandidaten_melden();
        }
        Ok(())
    }

    async fn set_remote_description(&mut self, desc: SessionDescription) -> PeerResult<()> {
        self.offen()?;
        let eigenes_angebot_offen = self
            .lokal
            .as_ref()
            .is_some_and(|lokal| lokal.sdp_type == SdpType::Offer)
            && self.remote_desc.is_none();
        if desc.sdp_type == SdpType::Offer && eigenes_angebot_offen {
            return Err(PeerError::verhandlung(
                &self.remote,
                "Remote-Angebot im Zustand have-local-offer",
            ));
        }
        let tracks = tracks_lesen(&desc.sdp).map_err(|grund| PeerError::verhandlung(&self.remote, grund))?;
        self.protokoll.lock().remote_descriptions.push(desc.clone());
        self.remote_desc = Some(desc);
        for track in tracks {
            if self.remote_tracks.insert(track.id.clone()) {
                let _ = self.events.send(EngineEvent::RemoteTrack(track));
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> PeerResult<()> {
        self.offen()?;
        let angebot_offen = self
            .lokal
            .as_ref()
            .is_some_and(|lokal| lokal.sdp_type == SdpType::Offer)
            && self.remote_desc.is_none();
        if !angebot_offen {
            return Err(PeerError::verhandlung(&self.remote, "kein offenes Angebot fuer Rollback"));
        }
        self.lokal = None;
        self.runde += 1;
        self.protokoll.lock().rollbacks += 1;
        tracing::debug!(remote = %self.remote, sitzung = self.sitzung, runde = self.runde, "Eigenes Angebot zurueckgenommen");
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> PeerResult<()> {
        self.offen()?;
        let Some(remote_desc) = &self.remote_desc else {
            return Err(PeerError::verhandlung(
                &self.remote,
                "Candidate vor der Remote-Description",
            ));
        };
        if !candidate.passt_zu(remote_desc.ice_ufrag()) {
            return Err(PeerError::verhandlung(
                &self.remote,
                "Candidate mit fremdem usernameFragment",
            ));
        }
        self.protokoll.lock().angewendete_kandidaten.push(candidate);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.geschlossen {
            self.geschlossen = true;
            self.protokoll.lock().geschlossen = true;
            tracing::debug!(remote = %self.remote, sitzung = self.sitzung, "Loopback-Verbindung geschlossen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_media::SyntheticTrack;

    #[tokio::test]
    async fn angebot_enthaelt_lokale_tracks() {
        let engine = LoopbackEngine::neu();
        let mut v = engine
            .open(&"bob".into(), &ConnectivityConfig::default())
            .await
            .unwrap();
        let track = Arc::new(SyntheticTrack::neu(TrackKind::Audio));
        v.connection.add_track(track.clone()).await.unwrap();

        let angebot = v.connection.create_offer().await.unwrap();
        let tracks = tracks_lesen(&angebot.sdp).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(&tracks[0].id, track.id());
        assert_eq!(tracks[0].kind, TrackKind::Audio);
    }

    #[tokio::test]
    async fn kandidaten_erst_nach_lokaler_description() {
        let engine = LoopbackEngine::mit_kandidaten(3);
        let mut v = engine
            .open(&"bob".into(), &ConnectivityConfig::default())
            .await
            .unwrap();
        assert!(v.events.try_recv().is_err());

        let angebot = v.connection.create_offer().await.unwrap();
        v.connection.set_local_description(angebot.clone()).await.unwrap();
        v.connection.set_local_description(angebot).await.unwrap();

        let mut anzahl = 0;
        while let Ok(EngineEvent::LocalCandidate(_)) = v.events.try_recv() {
            anzahl += 1;
        }
        assert_eq!(anzahl, 3);
    }

    #[tokio::test]
    async fn candidate_vor_remote_description_ist_fehler() {
        let engine = LoopbackEngine::neu();
        let mut v = engine
            .open(&"bob".into(), &ConnectivityConfig::default())
            .await
            .unwrap();
        let c = IceCandidate::neu("candidate:1 1 udp 1 10.0.0.1 1 typ host", 0, "0");
        assert!(v.connection.add_ice_candidate(c).await.is_err());
    }

    #[tokio::test]
    async fn kaputte_sdp_wird_abgelehnt() {
        let engine = LoopbackEngine::neu();
        let mut v = engine
            .open(&"bob".into(), &ConnectivityConfig::default())
            .await
            .unwrap();
        let err = v
            .connection
            .set_remote_description(SessionDescription::offer("kein sdp"))
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Verhandlung { .. }));
    }

    #[tokio::test]
    async fn remote_angebot_erst_nach_rollback() {
        let engine = LoopbackEngine::neu();
        let mut v = engine
            .open(&"bob".into(), &ConnectivityConfig::default())
            .await
            .unwrap();
        let eigenes = v.connection.create_offer().await.unwrap();
        v.connection.set_local_description(eigenes.clone()).await.unwrap();
        let fremdes = SessionDescription::offer("v=0\r\na=ice-ufrag:fremd");

        assert!(v.connection.set_remote_description(fremdes.clone()).await.is_err());
        v.connection.rollback().await.unwrap();
        assert!(v.connection.rollback().await.is_err());
        v.connection.set_remote_description(fremdes).await.unwrap();

        let antwort = v.connection.create_answer().await.unwrap();
        assert_ne!(antwort.ice_ufrag(), eigenes.ice_ufrag());
        assert_eq!(engine.protokoll(&"bob".into()).unwrap().rollbacks, 1);
    }

    #[tokio::test]
    async fn candidate_mit_fremdem_ufrag_wird_abgelehnt() {
        let engine = LoopbackEngine::neu();
        let mut v = engine
            .open(&"bob".into(), &ConnectivityConfig::default())
            .await
            .unwrap();
        v.connection
            .set_remote_description(SessionDescription::offer("v=0\r\na=ice-ufrag:neu"))
            .await
            .unwrap();
        let c = IceCandidate::neu("candidate:1 1 udp 1 10.0.0.1 1 typ host", 0, "0");
        assert!(v.connection.add_ice_candidate(c.clone().mit_ufrag("alt")).await.is_err());
        v.connection.add_ice_candidate(c.mit_ufrag("neu")).await.unwrap();
        assert_eq!(engine.angewendete_kandidaten(&"bob".into()).len(), 1);
    }

    #[tokio::test]
    async fn schliessen_wird_protokolliert() {
        let engine = LoopbackEngine::neu();
        let mut v = engine
            .open(&"bob".into(), &ConnectivityConfig::default())
            .await
            .unwrap();
        assert_eq!(engine.offene_verbindungen(), 1);
        v.connection.close().await;
        v.connection.close().await;
        assert_eq!(engine.offene_verbindungen(), 0);
        assert!(engine.protokoll(&"bob".into()).unwrap().geschlossen);
        assert!(v.connection.create_offer().await.is_err());
    }
}
