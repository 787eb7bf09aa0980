use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monotonic identifier of one execution of a source pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunIndex(pub u64);

impl RunIndex {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RunIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// The two upstream sources. Each owns a disjoint storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Peer-to-peer advertisement search (Binance P2P).
    P2p,
    /// Central-bank official rate page (Banco Central de Bolivia).
    Official,
}

impl SourceId {
    pub const ALL: [SourceId; 2] = [SourceId::P2p, SourceId::Official];

    /// Directory name under the data root.
    pub fn dir_name(self) -> &'static str {
        match self {
            SourceId::P2p => "binance",
            SourceId::Official => "bcb",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::P2p => "p2p",
            SourceId::Official => "official",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p2p" | "binance" => Ok(SourceId::P2p),
            "official" | "bcb" => Ok(SourceId::Official),
            other => Err(format!("unknown source '{other}' (expected p2p or official)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_index_displays_zero_padded() {
        assert_eq!(RunIndex(7).to_string(), "0007");
        assert_eq!(RunIndex(12345).to_string(), "12345");
        assert_eq!(RunIndex(7).next(), RunIndex(8));
    }

    #[test]
    fn source_id_parses_aliases() {
        assert_eq!("P2P".parse::<SourceId>().unwrap(), SourceId::P2p);
        assert_eq!("bcb".parse::<SourceId>().unwrap(), SourceId::Official);
        assert!("yahoo".parse::<SourceId>().is_err());
    }
}
