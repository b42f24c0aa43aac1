//! Integration-Tests fuer RoomSession mit einem geskripteten Signalisierungs-Kanal
//!
//! Der Kanal liefert genau die Presence-Ereignisse und Nachrichten, die der
//! Test einspeist; damit lassen sich doppelte und veraltete Ereignisse
//! gezielt erzeugen.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use huddle_core::{ParticipantId, RoomId};
use huddle_media::{MediaConstraints, SyntheticCapture};
use huddle_peer::LoopbackEngine;
use huddle_protocol::{IceCandidate, PresenceEvent, SessionDescription, SignalingMessage};
use huddle_session::{join_room, SessionConfig, SessionDeps, SessionEvent, SessionHandle};
use huddle_signaling::{
    InboundMessage, MessageStream, PresenceStream, SignalingChannel, SignalingError, SignalingResult,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const ZEITLIMIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// SkriptKanal
// ---------------------------------------------------------------------------

struct SkriptKanal {
    room: RoomId,
    local_id: ParticipantId,
    presence: Mutex<Option<mpsc::UnboundedReceiver<PresenceEvent>>>,
    nachrichten: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    gesendet: Mutex<Vec<(ParticipantId, SignalingMessage)>>,
    angekuendigt: AtomicBool,
    geschlossen: AtomicBool,
    /// `send_message` kehrt nie zurueck, wie bei einem Relay ohne Antwort
    senden_haengt: AtomicBool,
}

/// Einspeisung in den Kanal
struct Skript {
    presence: mpsc::UnboundedSender<PresenceEvent>,
    nachrichten: mpsc::UnboundedSender<InboundMessage>,
    seq: AtomicU64,
}

impl Skript {
    fn joined(&self, remote: &str) {
        let _ = self.presence.send(PresenceEvent::beigetreten(remote.into()));
    }

    fn left(&self, remote: &str) {
        let _ = self.presence.send(PresenceEvent::verlassen(remote.into()));
    }

    fn nachricht(&self, from: &str, message: SignalingMessage) {
        let _ = self.nachrichten.send(InboundMessage {
            from: from.into(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            message,
        });
    }
}

fn skript_kanal(local: &str) -> (Arc<SkriptKanal>, Skript) {
    let (presence_tx, presence_rx) = mpsc::unbounded_channel();
    let (nachrichten_tx, nachrichten_rx) = mpsc::unbounded_channel();
    let kanal = Arc::new(SkriptKanal {
        room: RoomId::new("werkstatt"),
        local_id: local.into(),
        presence: Mutex::new(Some(presence_rx)),
        nachrichten: Mutex::new(Some(nachrichten_rx)),
        gesendet: Mutex::new(Vec::new()),
        angekuendigt: AtomicBool::new(false),
        geschlossen: AtomicBool::new(false),
        senden_haengt: AtomicBool::new(false),
    });
    let skript = Skript {
        presence: presence_tx,
        nachrichten: nachrichten_tx,
        seq: AtomicU64::new(0),
    };
    (kanal, skript)
}

impl SkriptKanal {
    fn gesendet_an(&self, remote: &str) -> Vec<SignalingMessage> {
        self.gesendet
            .lock()
            .iter()
            .filter(|(to, _)| to.as_str() == remote)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl SignalingChannel for SkriptKanal {
    fn room(&self) -> &RoomId {
        &self.room
    }

    fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    async fn announce_presence(&self) -> SignalingResult<()> {
        self.angekuendigt.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn withdraw_presence(&self) -> SignalingResult<()> {
        self.angekuendigt.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe_presence(&self) -> SignalingResult<PresenceStream> {
        let rx = self.presence.lock().take().ok_or(SignalingError::Geschlossen)?;
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) }).boxed())
    }

    async fn send_message(&self, to: &ParticipantId, message: SignalingMessage) -> SignalingResult<()> {
        if self.geschlossen.load(Ordering::SeqCst) {
            return Err(SignalingError::Geschlossen);
        }
        if self.senden_haengt.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.gesendet.lock().push((to.clone(), message));
        Ok(())
    }

    async fn subscribe_messages(&self) -> SignalingResult<MessageStream> {
        let rx = self.nachrichten.lock().take().ok_or(SignalingError::Geschlossen)?;
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) }).boxed())
    }

    async fn close(&self) {
        self.geschlossen.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.geschlossen.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Hilfen
// ---------------------------------------------------------------------------

struct Aufbau {
    session: SessionHandle,
    kanal: Arc<SkriptKanal>,
    skript: Skript,
    engine: LoopbackEngine,
}

async fn aufbau() -> Aufbau {
    aufbau_mit(SessionConfig {
        medien: MediaConstraints::nur_audio(),
        ..Default::default()
    })
    .await
}

async fn aufbau_mit(config: SessionConfig) -> Aufbau {
    let (kanal, skript) = skript_kanal("bob");
    let engine = LoopbackEngine::neu();
    let deps = SessionDeps {
        capture: Arc::new(SyntheticCapture::neu()),
        channel: Arc::clone(&kanal) as Arc<dyn SignalingChannel>,
        engine: Arc::new(engine.clone()),
        metrics: None,
    };
    let session = join_room(RoomId::new("werkstatt"), config, deps).await.unwrap();
    Aufbau {
        session,
        kanal,
        skript,
        engine,
    }
}

fn angebot() -> SessionDescription {
    SessionDescription::offer("v=0\r\no=- 99 1 IN IP4 127.0.0.1\r\na=huddle-track:audio:carol-mikro")
}

/// Wartet, bis die Session alle bisher eingespeisten Ereignisse verarbeitet hat
async fn abarbeiten(session: &SessionHandle) {
    tokio::time::sleep(Duration::from_millis(30)).await;
    // peers() laeuft durch dieselbe Schleife wie Presence und Nachrichten
    session.peers().await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn doppeltes_joined_erzeugt_keine_zweite_verbindung() {
    let t = aufbau().await;

    t.skript.joined("carol");
    t.skript.joined("carol");
    abarbeiten(&t.session).await;

    assert_eq!(t.session.peers().await.len(), 1);
    assert_eq!(t.engine.verbindungen(&"carol".into()), 1);
    let angebote = t
        .kanal
        .gesendet_an("carol")
        .into_iter()
        .filter(|m| matches!(m, SignalingMessage::Offer(_)))
        .count();
    assert_eq!(angebote, 1);

    t.session.hangup().await;
}

#[tokio::test]
async fn angebot_ohne_verbindung_erzeugt_responder() {
    let t = aufbau().await;
    let mut events = t.session.events();

    t.skript.nachricht("carol", SignalingMessage::Offer(angebot()));
    abarbeiten(&t.session).await;

    assert_eq!(t.engine.verbindungen(&"carol".into()), 1);
    assert!(t
        .kanal
        .gesendet_an("carol")
        .iter()
        .any(|m| matches!(m, SignalingMessage::Answer(_))));

    let track = tokio::time::timeout(ZEITLIMIT, async {
        loop {
            if let Ok(SessionEvent::RemoteTrackAvailable { remote, track }) = events.recv().await {
                assert_eq!(remote.as_str(), "carol");
                return track;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(track.id.as_str(), "carol-mikro");

    // Ein spaeteres Joined ist ein Duplikat
    t.skript.joined("carol");
    abarbeiten(&t.session).await;
    assert_eq!(t.engine.verbindungen(&"carol".into()), 1);

    t.session.hangup().await;
}

#[tokio::test]
async fn antwort_und_candidate_ohne_verbindung_werden_verworfen() {
    let t = aufbau().await;

    t.skript
        .nachricht("dave", SignalingMessage::Answer(SessionDescription::answer("v=0")));
    t.skript.nachricht(
        "dave",
        SignalingMessage::Candidate(IceCandidate::neu("candidate:1 1 udp 1 10.0.0.1 5000 typ host", 0, "0")),
    );
    abarbeiten(&t.session).await;

    assert!(t.session.peers().await.is_empty());
    assert_eq!(t.engine.verbindungen(&"dave".into()), 0);
    assert!(t.kanal.gesendet_an("dave").is_empty());

    t.session.hangup().await;
}

#[tokio::test]
async fn left_schliesst_und_erneutes_joined_baut_neu_auf() {
    let t = aufbau().await;
    let mut events = t.session.events();

    t.skript.joined("carol");
    abarbeiten(&t.session).await;
    let erste = t.session.peers().await[0].generation;

    t.skript.left("carol");
    tokio::time::timeout(ZEITLIMIT, async {
        loop {
            if let Ok(SessionEvent::PeerClosed { generation, .. }) = events.recv().await {
                assert_eq!(generation, erste);
                return;
            }
        }
    })
    .await
    .unwrap();
    assert!(t.session.peers().await.is_empty());
    assert_eq!(t.engine.offene_verbindungen(), 0);

    t.skript.joined("carol");
    abarbeiten(&t.session).await;
    let peers = t.session.peers().await;
    assert_eq!(peers.len(), 1);
    assert!(peers[0].generation > erste);
    assert_eq!(t.engine.verbindungen(&"carol".into()), 2);

    t.session.hangup().await;
}

#[tokio::test]
async fn verhandlungsfehler_betrifft_nur_eine_verbindung() {
    let t = aufbau().await;
    let mut events = t.session.events();

    t.skript.joined("carol");
    t.skript.joined("dave");
    abarbeiten(&t.session).await;
    assert_eq!(t.session.peers().await.len(), 2);

    // Kaputte Antwort: die Engine lehnt sie ab
    t.skript
        .nachricht("carol", SignalingMessage::Answer(SessionDescription::answer("kein sdp")));

    tokio::time::timeout(ZEITLIMIT, async {
        loop {
            if let Ok(SessionEvent::PeerFailed { remote, .. }) = events.recv().await {
                assert_eq!(remote.as_str(), "carol");
                return;
            }
        }
    })
    .await
    .unwrap();
    abarbeiten(&t.session).await;

    let peers = t.session.peers().await;
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].remote.as_str(), "dave");

    t.session.hangup().await;
}

#[tokio::test]
async fn nach_dem_auflegen_entsteht_keine_verbindung() {
    let t = aufbau().await;

    t.session.hangup().await;
    t.skript.joined("carol");
    t.skript.nachricht("erin", SignalingMessage::Offer(angebot()));
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(t.engine.verbindungen(&"carol".into()), 0);
    assert_eq!(t.engine.verbindungen(&"erin".into()), 0);
    assert!(t.session.peers().await.is_empty());
    assert!(!t.kanal.angekuendigt.load(Ordering::SeqCst));
    assert!(t.kanal.is_closed());
}

#[tokio::test]
async fn auflegen_wartet_nicht_auf_haengende_zustellung() {
    let t = aufbau_mit(SessionConfig {
        medien: MediaConstraints::nur_audio(),
        ausgang_kapazitaet: 1,
        ..Default::default()
    })
    .await;
    t.kanal.senden_haengt.store(true, Ordering::SeqCst);

    // Angebot und Candidates stauen sich: Sende-Task haengt, Ausgang ist voll
    t.skript.joined("carol");
    t.skript.joined("dave");
    abarbeiten(&t.session).await;
    assert_eq!(t.session.peers().await.len(), 2);

    tokio::time::timeout(ZEITLIMIT, t.session.hangup()).await.unwrap();
    assert!(t.kanal.is_closed());
    assert!(!t.kanal.angekuendigt.load(Ordering::SeqCst));
    assert_eq!(t.engine.offene_verbindungen(), 0);
}
