//! QR payloads linking to a society or event page: `soc:{id}` and `eve:{id}`.

use std::{fmt, str::FromStr};

use crate::errors::QrError;

const KIND_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrTarget {
    Society(String),
    Event(String),
}

impl QrTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            QrTarget::Society(_) => "soc",
            QrTarget::Event(_) => "eve",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            QrTarget::Society(id) | QrTarget::Event(id) => id,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Reads the 3-character kind, skips one separator character, and takes the rest as the id.
    pub fn decode(payload: &str) -> Result<Self, QrError> {
        let malformed = || QrError::Malformed {
            payload: payload.to_string(),
        };
        let mut chars = payload.char_indices();
        let kind_end = chars.nth(KIND_LEN).map(|(index, _)| index).ok_or_else(malformed)?;
        let id_start = chars.next().map(|(index, _)| index).ok_or_else(malformed)?;
        let (kind, id) = (&payload[..kind_end], &payload[id_start..]);
        match kind {
            "soc" => Ok(QrTarget::Society(id.to_string())),
            "eve" => Ok(QrTarget::Event(id.to_string())),
            other => Err(QrError::UnknownKind { kind: other.to_string() }),
        }
    }
}

impl fmt::Display for QrTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

impl FromStr for QrTarget {
    type Err = QrError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        Self::decode(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_kind_and_id() {
        assert_eq!(QrTarget::Society("S1".into()).encode(), "soc:S1");
        assert_eq!(QrTarget::Event("E1".into()).encode(), "eve:E1");
    }

    #[test]
    fn decodes_known_kinds() {
        assert_eq!(QrTarget::decode("soc:S1"), Ok(QrTarget::Society("S1".into())));
        assert_eq!("eve:aB3xYz".parse::<QrTarget>(), Ok(QrTarget::Event("aB3xYz".into())));
    }

    #[test]
    fn rejects_short_and_unknown_payloads() {
        assert!(matches!(QrTarget::decode("soc:"), Err(QrError::Malformed { .. })));
        assert!(matches!(QrTarget::decode("so"), Err(QrError::Malformed { .. })));
        assert_eq!(
            QrTarget::decode("usr:ada"),
            Err(QrError::UnknownKind { kind: "usr".into() })
        );
    }
}
