//! Puffer fuer Remote-Candidates
//!
//! Candidates, die vor der Remote-Description eintreffen, werden in
//! Ankunftsreihenfolge gehalten und danach in genau dieser Reihenfolge
//! angewendet. Da das Relay mindestens einmal zustellt, merkt sich der
//! Puffer jeden gesehenen Candidate und meldet Wiederholungen.

use huddle_protocol::IceCandidate;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct CandidateBuffer {
    wartend: VecDeque<IceCandidate>,
    gesehen: HashSet<IceCandidate>,
}

impl CandidateBuffer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Merkt sich `candidate`; `false` wenn er schon einmal gesehen wurde
    pub fn merken(&mut self, candidate: &IceCandidate) -> bool {
        self.gesehen.insert(candidate.clone())
    }

    /// Haengt einen Candidate an die Warteschlange an
    pub fn puffern(&mut self, candidate: IceCandidate) {
        self.wartend.push_back(candidate);
    }

    /// Entnimmt alle wartenden Candidates in Ankunftsreihenfolge
    pub fn entnehmen(&mut self) -> Vec<IceCandidate> {
        self.wartend.drain(..).collect()
    }

    pub fn wartend(&self) -> usize {
        self.wartend.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(n: u32) -> IceCandidate {
        IceCandidate::neu(format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host"), 0, "0")
    }

    #[test]
    fn reihenfolge_bleibt_erhalten() {
        let mut puffer = CandidateBuffer::neu();
        for n in [3, 1, 2] {
            assert!(puffer.merken(&c(n)));
            puffer.puffern(c(n));
        }
        assert_eq!(puffer.wartend(), 3);
        assert_eq!(puffer.entnehmen(), vec![c(3), c(1), c(2)]);
        assert_eq!(puffer.wartend(), 0);
    }

    #[test]
    fn wiederholung_wird_erkannt() {
        let mut puffer = CandidateBuffer::neu();
        assert!(puffer.merken(&c(1)));
        assert!(!puffer.merken(&c(1)));
        puffer.entnehmen();
        assert!(!puffer.merken(&c(1)));
    }
}
