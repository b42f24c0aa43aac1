//! PeerRegistry – hoechstens eine Verbindung pro Remote
//!
//! Gehoert exklusiv dem Session-Actor; alle Aenderungen laufen ueber ihn,
//! daher ist "pruefen und eintragen" ohne weitere Synchronisation atomar.

use huddle_core::ParticipantId;
use huddle_peer::PeerHandle;
use std::collections::HashMap;

use crate::error::{SessionError, SessionResult};
use crate::event::PeerInfo;

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<ParticipantId, PeerHandle>,
    letzte_generation: u64,
}

impl PeerRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Vergibt die naechste Generation (streng monoton)
    pub fn naechste_generation(&mut self) -> u64 {
        self.letzte_generation += 1;
        self.letzte_generation
    }

    pub fn enthaelt(&self, remote: &ParticipantId) -> bool {
        self.peers.contains_key(remote)
    }

    pub fn get(&self, remote: &ParticipantId) -> Option<&PeerHandle> {
        self.peers.get(remote)
    }

    /// Traegt eine Verbindung ein; lehnt eine zweite zum selben Remote ab
    pub fn einfuegen(&mut self, handle: PeerHandle) -> SessionResult<()> {
        if self.peers.contains_key(handle.remote()) {
            return Err(SessionError::DoppelteVerbindung(handle.remote().clone()));
        }
        self.peers.insert(handle.remote().clone(), handle);
        Ok(())
    }

    /// Entfernt die Verbindung zu `remote`
    pub fn entfernen(&mut self, remote: &ParticipantId) -> Option<PeerHandle> {
        self.peers.remove(remote)
    }

    /// Entfernt die Verbindung nur, wenn sie die angegebene Generation hat
    ///
    /// Meldungen einer aelteren Verbindung duerfen eine neuere nie entfernen.
    pub fn entfernen_wenn(&mut self, remote: &ParticipantId, generation: u64) -> Option<PeerHandle> {
        match self.peers.get(remote) {
            Some(handle) if handle.generation() == generation => self.peers.remove(remote),
            _ => None,
        }
    }

    /// Entnimmt alle Verbindungen (fuer das Beenden der Session)
    pub fn alle_entnehmen(&mut self) -> Vec<PeerHandle> {
        self.peers.drain().map(|(_, handle)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Momentaufnahme, nach Remote-ID sortiert
    pub fn snapshot(&self) -> Vec<PeerInfo> {
        let mut infos: Vec<PeerInfo> = self
            .peers
            .values()
            .map(|h| PeerInfo {
                remote: h.remote().clone(),
                generation: h.generation(),
                state: h.state(),
            })
            .collect();
        infos.sort_by(|a, b| a.remote.cmp(&b.remote));
        infos
    }
}
