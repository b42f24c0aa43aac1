//! Konnektivitaets-Konfiguration (ICE-Server, Candidate-Pool)

use serde::{Deserialize, Serialize};

use crate::error::{PeerError, PeerResult};

/// Ein STUN/TURN-Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// z.B. `stun:stun1.l.google.com:19302`
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Server ohne Zugangsdaten
    pub fn neu<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            username: None,
            credential: None,
        }
    }
}

/// Konfiguration, die jeder neuen Peer-Verbindung mitgegeben wird
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub ice_servers: Vec<IceServer>,
    /// Vorab gesammelte Candidates pro Verbindung
    pub ice_candidate_pool_size: u8,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::neu([
                "stun:stun1.l.google.com:19302",
                "stun:stun2.l.google.com:19302",
            ])],
            ice_candidate_pool_size: 10,
        }
    }
}

const ERLAUBTE_SCHEMAS: [&str; 3] = ["stun:", "turn:", "turns:"];

impl ConnectivityConfig {
    /// Prueft Server-URLs und Pool-Groesse
    pub fn validieren(&self) -> PeerResult<()> {
        let mut urls = self.ice_servers.iter().flat_map(|s| s.urls.iter()).peekable();
        if urls.peek().is_none() {
            return Err(PeerError::Konfiguration("keine ICE-Server-URL angegeben".into()));
        }
        for url in urls {
            if !ERLAUBTE_SCHEMAS.iter().any(|schema| url.starts_with(schema)) {
                return Err(PeerError::Konfiguration(format!(
                    "ungueltiges Schema in '{url}' (erlaubt: stun:, turn:, turns:)"
                )));
            }
        }
        if self.ice_candidate_pool_size == 0 {
            return Err(PeerError::Konfiguration(
                "ice_candidate_pool_size muss groesser als 0 sein".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_ist_gueltig() {
        let config = ConnectivityConfig::default();
        assert!(config.validieren().is_ok());
        assert_eq!(config.ice_servers[0].urls.len(), 2);
        assert_eq!(config.ice_candidate_pool_size, 10);
    }

    #[test]
    fn falsches_schema_wird_abgelehnt() {
        let config = ConnectivityConfig {
            ice_servers: vec![IceServer::neu(["http://stun.example.org"])],
            ..Default::default()
        };
        assert!(matches!(config.validieren(), Err(PeerError::Konfiguration(_))));
    }

    #[test]
    fn leere_serverliste_und_pool_null() {
        let leer = ConnectivityConfig {
            ice_servers: vec![],
            ..Default::default()
        };
        assert!(leer.validieren().is_err());

        let pool_null = ConnectivityConfig {
            ice_candidate_pool_size: 0,
            ..Default::default()
        };
        assert!(pool_null.validieren().is_err());
    }

    #[test]
    fn turn_mit_zugangsdaten_aus_toml() {
        let toml_str = r#"
            ice_candidate_pool_size = 4

            [[ice_servers]]
            urls = ["turns:turn.example.org:5349"]
            username = "huddle"
            credential = "geheim"
        "#;
        let config: ConnectivityConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validieren().is_ok());
        assert_eq!(config.ice_servers[0].username.as_deref(), Some("huddle"));
    }
}
