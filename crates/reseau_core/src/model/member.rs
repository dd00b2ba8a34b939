//! Member directory model and qualification tags.
//!
//! # Responsibility
//! - Define the read-only member shape consumed from the directory.
//! - Model qualification as a closed set with an explicit privileged subset.
//!
//! # Invariants
//! - Qualification labels round-trip exactly through `label()`/`from_label()`.
//! - `is_privileged()` is true for exactly four qualifications.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable member identifier.
pub type MemberId = Uuid;

/// Organization (church) scope identifier.
pub type ChurchId = Uuid;

/// Role/status tag carried by every member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Qualification {
    #[serde(rename = "Gouvernance")]
    Gouvernance,
    #[serde(rename = "Responsable réseau")]
    ResponsableReseau,
    #[serde(rename = "Responsable ecodim")]
    ResponsableEcodim,
    #[serde(rename = "Ecodim")]
    Ecodim,
    #[serde(rename = "Leader")]
    Leader,
    #[serde(rename = "Régulier")]
    Regulier,
    #[serde(rename = "Irrégulier")]
    Irregulier,
    #[serde(rename = "En attente")]
    EnAttente,
}

impl Qualification {
    pub const ALL: [Qualification; 8] = [
        Self::Gouvernance,
        Self::ResponsableReseau,
        Self::ResponsableEcodim,
        Self::Ecodim,
        Self::Leader,
        Self::Regulier,
        Self::Irregulier,
        Self::EnAttente,
    ];

    /// Qualifications that are never reported as isolated.
    pub const PRIVILEGED: [Qualification; 4] = [
        Self::ResponsableReseau,
        Self::Gouvernance,
        Self::Ecodim,
        Self::ResponsableEcodim,
    ];

    /// Storage and display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Gouvernance => "Gouvernance",
            Self::ResponsableReseau => "Responsable réseau",
            Self::ResponsableEcodim => "Responsable ecodim",
            Self::Ecodim => "Ecodim",
            Self::Leader => "Leader",
            Self::Regulier => "Régulier",
            Self::Irregulier => "Irrégulier",
            Self::EnAttente => "En attente",
        }
    }

    /// Parses a label, ignoring surrounding whitespace and letter case.
    pub fn from_label(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.label().to_lowercase() == normalized)
    }

    pub fn is_privileged(self) -> bool {
        match self {
            Self::ResponsableReseau
            | Self::Gouvernance
            | Self::Ecodim
            | Self::ResponsableEcodim => true,
            Self::Leader | Self::Regulier | Self::Irregulier | Self::EnAttente => false,
        }
    }
}

impl Display for Qualification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Returned when a qualification label is not one of the known tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownQualification(pub String);

impl Display for UnknownQualification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown qualification `{}`", self.0)
    }
}

impl Error for UnknownQualification {}

impl FromStr for Qualification {
    type Err = UnknownQualification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownQualification(s.to_string()))
    }
}

/// Member record as exposed by the member directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub uuid: MemberId,
    pub display_name: String,
    pub qualification: Qualification,
    /// Owning organization, when the member is attached to one.
    pub church: Option<ChurchId>,
    /// Soft delete tombstone. History rows keep referencing deleted members.
    pub is_deleted: bool,
}

impl Member {
    pub fn is_privileged(&self) -> bool {
        self.qualification.is_privileged()
    }
}

#[cfg(test)]
mod tests {
    use super::Qualification;

    #[test]
    fn labels_round_trip_for_every_qualification() {
        for qualification in Qualification::ALL {
            assert_eq!(
                Qualification::from_label(qualification.label()),
                Some(qualification)
            );
        }
    }

    #[test]
    fn from_label_ignores_case_and_whitespace() {
        assert_eq!(
            Qualification::from_label("  responsable RÉSEAU "),
            Some(Qualification::ResponsableReseau)
        );
        assert_eq!(Qualification::from_label("Stagiaire"), None);
    }

    #[test]
    fn privileged_set_is_exactly_the_declared_subset() {
        let privileged: Vec<_> = Qualification::ALL
            .into_iter()
            .filter(|q| q.is_privileged())
            .collect();
        assert_eq!(privileged.len(), Qualification::PRIVILEGED.len());
        for q in Qualification::PRIVILEGED {
            assert!(privileged.contains(&q));
        }
        assert!(!Qualification::Leader.is_privileged());
        assert!(!Qualification::Regulier.is_privileged());
    }

    #[test]
    fn serde_uses_display_labels() {
        let json = serde_json::to_string(&Qualification::Regulier).unwrap();
        assert_eq!(json, "\"Régulier\"");
        let parsed: Qualification = serde_json::from_str("\"Responsable ecodim\"").unwrap();
        assert_eq!(parsed, Qualification::ResponsableEcodim);
    }
}
