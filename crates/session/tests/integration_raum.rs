//! Integration-Tests fuer RoomSession (MemoryRelay + LoopbackEngine + SyntheticCapture)

use huddle_core::{ParticipantId, RoomId, TrackId};
use huddle_media::{CapturedTrack, MediaConstraints, MediaError, SyntheticCapture};
use huddle_observability::HuddleMetrics;
use huddle_peer::{LoopbackEngine, PeerState};
use huddle_session::{join_room, RoomSession, SessionConfig, SessionDeps, SessionError, SessionEvent, SessionHandle};
use huddle_protocol::{SessionDescription, SignalingMessage};
use huddle_signaling::{MemoryRelay, RelayChannel, SignalingChannel};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const ZEITLIMIT: Duration = Duration::from_secs(5);

fn raum() -> RoomId {
    RoomId::new("wohnzimmer")
}

struct Teilnehmer {
    capture: Arc<SyntheticCapture>,
    engine: LoopbackEngine,
    deps: SessionDeps,
}

fn teilnehmer_mit(relay: &Arc<MemoryRelay>, id: &str, capture: SyntheticCapture) -> Teilnehmer {
    let capture = Arc::new(capture);
    let engine = LoopbackEngine::neu();
    let channel = Arc::new(RelayChannel::neu(Arc::clone(relay), raum(), id.into()));
    Teilnehmer {
        capture: Arc::clone(&capture),
        engine: engine.clone(),
        deps: SessionDeps {
            capture,
            channel,
            engine: Arc::new(engine),
            metrics: None,
        },
    }
}

fn teilnehmer(relay: &Arc<MemoryRelay>, id: &str) -> Teilnehmer {
    teilnehmer_mit(relay, id, SyntheticCapture::neu())
}

fn nur_audio() -> SessionConfig {
    SessionConfig {
        medien: MediaConstraints::nur_audio(),
        ..Default::default()
    }
}

/// Sammelt `anzahl` RemoteTrackAvailable-Ereignisse von `remote`
async fn tracks_von(
    events: &mut broadcast::Receiver<SessionEvent>,
    remote: &str,
    anzahl: usize,
) -> HashSet<TrackId> {
    tokio::time::timeout(ZEITLIMIT, async {
        let mut tracks = HashSet::new();
        while tracks.len() < anzahl {
            match events.recv().await {
                Ok(SessionEvent::RemoteTrackAvailable { remote: r, track }) if r.as_str() == remote => {
                    assert!(tracks.insert(track.id), "Track doppelt gemeldet");
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("Event-Kanal geschlossen"),
            }
        }
        tracks
    })
    .await
    .expect("Remote-Tracks kamen nicht rechtzeitig an")
}

async fn warte_auf_zustand(session: &SessionHandle, remote: &str, state: PeerState) {
    tokio::time::timeout(ZEITLIMIT, async {
        loop {
            let peers = session.peers().await;
            if peers.iter().any(|p| p.remote.as_str() == remote && p.state == state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Zustand wurde nicht erreicht");
}

fn track_ids(capture: &SyntheticCapture) -> HashSet<TrackId> {
    capture.erzeugte_tracks().iter().map(|t| t.id().clone()).collect()
}

#[tokio::test]
async fn zwei_teilnehmer_sehen_die_tracks_des_anderen() {
    let relay = Arc::new(MemoryRelay::neu());
    let alice = teilnehmer(&relay, "alice");
    let bob = teilnehmer(&relay, "bob");

    let a = join_room(raum(), SessionConfig::default(), alice.deps.clone()).await.unwrap();
    let mut a_events = a.events();
    let b = join_room(raum(), SessionConfig::default(), bob.deps.clone()).await.unwrap();
    let mut b_events = b.events();

    assert_eq!(tracks_von(&mut a_events, "bob", 2).await, track_ids(&bob.capture));
    assert_eq!(tracks_von(&mut b_events, "alice", 2).await, track_ids(&alice.capture));

    warte_auf_zustand(&a, "bob", PeerState::Connected).await;
    warte_auf_zustand(&b, "alice", PeerState::Connected).await;
    assert_eq!(a.peers().await.len(), 1);
    assert_eq!(alice.engine.verbindungen(&"bob".into()), 1);
    assert_eq!(bob.engine.verbindungen(&"alice".into()), 1);

    a.hangup().await;
    b.hangup().await;
}

#[tokio::test]
async fn remote_vor_eigener_bereitschaft_wird_erst_danach_verbunden() {
    let relay = Arc::new(MemoryRelay::neu());
    let bob = teilnehmer(&relay, "bob");
    let alice = teilnehmer_mit(&relay, "alice", SyntheticCapture::neu().mit_sperre());

    let b = join_room(raum(), nur_audio(), bob.deps.clone()).await.unwrap();
    let a = RoomSession::join(raum(), nur_audio(), alice.deps.clone()).unwrap();
    let mut a_events = a.events();

    // Medien haengen: keine Presence, keine Verbindung
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(relay.teilnehmer(&raum()), vec![ParticipantId::from("bob")]);
    assert_eq!(alice.engine.verbindungen(&"bob".into()), 0);
    assert!(b.peers().await.is_empty());

    alice.capture.freigeben();
    a.ready().await.unwrap();

    assert_eq!(tracks_von(&mut a_events, "bob", 1).await, track_ids(&bob.capture));
    warte_auf_zustand(&a, "bob", PeerState::Connected).await;
    warte_auf_zustand(&b, "alice", PeerState::Connected).await;

    a.hangup().await;
    b.hangup().await;
}

#[tokio::test]
async fn frueheres_angebot_wird_erst_nach_der_bereitschaft_beantwortet() {
    let relay = Arc::new(MemoryRelay::neu());
    let alice = teilnehmer_mit(&relay, "alice", SyntheticCapture::neu().mit_sperre());
    let a = RoomSession::join(raum(), nur_audio(), alice.deps.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // carol ist nicht in der Presence, schickt aber schon ein Angebot
    let carol = RelayChannel::neu(Arc::clone(&relay), raum(), "carol".into());
    carol
        .send_message(
            &"alice".into(),
            SignalingMessage::Offer(SessionDescription::offer("v=0\r\na=huddle-track:audio:carol-mikro")),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(alice.engine.verbindungen(&"carol".into()), 0);

    alice.capture.freigeben();
    a.ready().await.unwrap();
    warte_auf_zustand(&a, "carol", PeerState::Connected).await;

    let an_carol = relay.dokumente(&raum(), &"carol".into());
    assert!(an_carol
        .iter()
        .any(|d| d.from.as_str() == "alice" && matches!(d.message, SignalingMessage::Answer(_))));

    a.hangup().await;
}

#[tokio::test]
async fn auflegen_waehrend_der_medien_anforderung() {
    let relay = Arc::new(MemoryRelay::neu());
    let bob = teilnehmer(&relay, "bob");
    let alice = teilnehmer_mit(&relay, "alice", SyntheticCapture::neu().mit_sperre());

    let b = join_room(raum(), nur_audio(), bob.deps.clone()).await.unwrap();
    let a = RoomSession::join(raum(), nur_audio(), alice.deps.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    a.hangup().await;
    assert!(a.ist_beendet());
    assert!(matches!(a.ready().await, Err(SessionError::Beendet)));

    alice.capture.freigeben();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(alice.capture.erzeugte_tracks().is_empty());
    assert_eq!(alice.engine.verbindungen(&"bob".into()), 0);
    assert_eq!(relay.teilnehmer(&raum()), vec![ParticipantId::from("bob")]);
    assert!(b.peers().await.is_empty());

    b.hangup().await;
}

#[tokio::test]
async fn medienfehler_beendet_den_beitritt() {
    let relay = Arc::new(MemoryRelay::neu());
    let alice = teilnehmer_mit(
        &relay,
        "alice",
        SyntheticCapture::mit_fehler(MediaError::BerechtigungVerweigert),
    );

    let err = join_room(raum(), SessionConfig::default(), alice.deps.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Medien(MediaError::BerechtigungVerweigert)));
    assert!(relay.teilnehmer(&raum()).is_empty());
    assert_eq!(alice.capture.anforderungen(), 1);
}

#[tokio::test]
async fn auflegen_mehrfach_und_parallel() {
    let relay = Arc::new(MemoryRelay::neu());
    let alice = teilnehmer(&relay, "alice");
    let bob = teilnehmer(&relay, "bob");

    let a = join_room(raum(), SessionConfig::default(), alice.deps.clone()).await.unwrap();
    let mut a_events = a.events();
    let b = join_room(raum(), SessionConfig::default(), bob.deps.clone()).await.unwrap();
    warte_auf_zustand(&a, "bob", PeerState::Connected).await;

    let zweites = a.clone();
    tokio::join!(a.hangup(), zweites.hangup());
    a.hangup().await;

    for track in alice.capture.erzeugte_tracks() {
        assert_eq!(track.stop_aufrufe(), 1);
    }
    assert_eq!(alice.engine.offene_verbindungen(), 0);
    assert_eq!(relay.teilnehmer(&raum()), vec![ParticipantId::from("bob")]);
    assert!(a.peers().await.is_empty());

    let mut terminiert = 0;
    loop {
        match a_events.try_recv() {
            Ok(SessionEvent::Terminated) => terminiert += 1,
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    assert_eq!(terminiert, 1);

    b.hangup().await;
}

#[tokio::test]
async fn verlassen_schliesst_die_verbindung_beim_anderen() {
    let relay = Arc::new(MemoryRelay::neu());
    let alice = teilnehmer(&relay, "alice");
    let bob = teilnehmer(&relay, "bob");

    let a = join_room(raum(), nur_audio(), alice.deps.clone()).await.unwrap();
    let mut a_events = a.events();
    let b = join_room(raum(), nur_audio(), bob.deps.clone()).await.unwrap();
    warte_auf_zustand(&a, "bob", PeerState::Connected).await;

    b.hangup().await;

    tokio::time::timeout(ZEITLIMIT, async {
        loop {
            if let Ok(SessionEvent::PeerClosed { remote, .. }) = a_events.recv().await {
                if remote.as_str() == "bob" {
                    return;
                }
            }
        }
    })
    .await
    .expect("PeerClosed fuer bob fehlt");

    assert!(a.peers().await.is_empty());
    assert_eq!(alice.engine.offene_verbindungen(), 0);
    a.hangup().await;
}

#[tokio::test]
async fn drei_teilnehmer_bilden_ein_netz() {
    let relay = Arc::new(MemoryRelay::neu());
    let namen = ["alice", "bob", "carol"];
    let alle: Vec<Teilnehmer> = namen.iter().map(|n| teilnehmer(&relay, n)).collect();

    let mut sessions = Vec::new();
    for t in &alle {
        sessions.push(join_room(raum(), nur_audio(), t.deps.clone()).await.unwrap());
    }

    for (i, session) in sessions.iter().enumerate() {
        for (j, remote) in namen.iter().enumerate() {
            if i != j {
                warte_auf_zustand(session, remote, PeerState::Connected).await;
            }
        }
        assert_eq!(session.peers().await.len(), 2);
    }
    for (t, name) in alle.iter().zip(namen) {
        for remote in namen.iter().filter(|r| **r != name) {
            assert_eq!(t.engine.verbindungen(&(*remote).into()), 1, "{name} -> {remote}");
        }
    }

    for session in &sessions {
        session.hangup().await;
    }
    assert!(relay.teilnehmer(&raum()).is_empty());
}

#[tokio::test]
async fn metriken_folgen_den_verbindungen() {
    let relay = Arc::new(MemoryRelay::neu());
    let metrics = Arc::new(HuddleMetrics::neu().unwrap());
    let mut alice = teilnehmer(&relay, "alice");
    alice.deps.metrics = Some(Arc::clone(&metrics));
    let bob = teilnehmer(&relay, "bob");

    let a = join_room(raum(), nur_audio(), alice.deps.clone()).await.unwrap();
    let mut a_events = a.events();
    let b = join_room(raum(), nur_audio(), bob.deps.clone()).await.unwrap();
    tracks_von(&mut a_events, "bob", 1).await;

    assert_eq!(metrics.peer_connections_active.get(), 1);
    assert_eq!(metrics.peer_connections_total.get(), 1);
    assert_eq!(metrics.remote_tracks_total.get(), 1);

    a.hangup().await;
    assert_eq!(metrics.peer_connections_active.get(), 0);
    assert!(metrics.exportieren().unwrap().contains("huddle_peer_connections_total 1"));
    b.hangup().await;
}

#[tokio::test]
async fn kanal_aus_anderem_raum_wird_abgelehnt() {
    let relay = Arc::new(MemoryRelay::neu());
    let alice = teilnehmer(&relay, "alice");

    let err = RoomSession::join(RoomId::new("kueche"), SessionConfig::default(), alice.deps).unwrap_err();
    assert!(matches!(err, SessionError::Konfiguration(_)));
}

#[tokio::test]
async fn erneuter_beitritt_unter_derselben_id_verhandelt_neu() {
    let relay = Arc::new(MemoryRelay::neu());
    let alice = teilnehmer(&relay, "alice");
    let bob_vorher = teilnehmer(&relay, "bob");

    let a = join_room(raum(), nur_audio(), alice.deps.clone()).await.unwrap();
    let mut a_events = a.events();
    let b = join_room(raum(), nur_audio(), bob_vorher.deps.clone()).await.unwrap();
    warte_auf_zustand(&a, "bob", PeerState::Connected).await;
    warte_auf_zustand(&b, "alice", PeerState::Connected).await;

    b.hangup().await;
    tokio::time::timeout(ZEITLIMIT, async {
        loop {
            if let Ok(SessionEvent::PeerClosed { remote, .. }) = a_events.recv().await {
                if remote.as_str() == "bob" {
                    return;
                }
            }
        }
    })
    .await
    .unwrap();
    assert!(!relay.dokumente(&raum(), &"bob".into()).is_empty());

    // Gleiche ID, neuer Beitritt: im Postfach liegt noch alles aus dem ersten Anlauf
    let bob = teilnehmer(&relay, "bob");
    let b = join_room(raum(), nur_audio(), bob.deps.clone()).await.unwrap();
    warte_auf_zustand(&a, "bob", PeerState::Connected).await;
    warte_auf_zustand(&b, "alice", PeerState::Connected).await;

    // Candidates kommen nach der Description an
    tokio::time::timeout(ZEITLIMIT, async {
        while bob.engine.angewendete_kandidaten(&"alice".into()).len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let alice_aktuell = alice.engine.protokoll(&"bob".into()).unwrap();
    let bob_sicht = bob.engine.protokoll(&"alice".into()).unwrap();
    assert_eq!(alice.engine.verbindungen(&"bob".into()), 2);
    assert_eq!(bob.engine.verbindungen(&"alice".into()), 1);

    // bob hat nur angewendet, was alices aktuelle Verbindung erzeugt hat
    assert!(!bob_sicht.remote_descriptions.is_empty());
    for desc in &bob_sicht.remote_descriptions {
        assert!(alice_aktuell.lokale_descriptions.contains(desc));
    }
    let ufrag = bob_sicht
        .remote_descriptions
        .last()
        .and_then(|d| d.ice_ufrag())
        .map(str::to_owned);
    assert_eq!(bob_sicht.angewendete_kandidaten.len(), 2);
    assert!(bob_sicht
        .angewendete_kandidaten
        .iter()
        .all(|c| c.username_fragment == ufrag));

    a.hangup().await;
    b.hangup().await;
}
