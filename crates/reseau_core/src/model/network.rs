//! Network (réseau) and group (GR) records.
//!
//! # Invariants
//! - A network name is unique across the directory.
//! - `responsable1` is always present; `responsable2` is optional.
//! - A deleted group keeps its history but has no current members.

use crate::model::member::{ChurchId, MemberId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable network identifier.
pub type NetworkId = Uuid;

/// Stable group identifier.
pub type GroupId = Uuid;

/// Top-level organizational unit owning groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub uuid: NetworkId,
    pub name: String,
    pub responsable1: MemberId,
    pub responsable2: Option<MemberId>,
    pub church: Option<ChurchId>,
}

impl Network {
    /// Members marked responsible of this network.
    pub fn responsables(&self) -> impl Iterator<Item = MemberId> + '_ {
        std::iter::once(self.responsable1).chain(self.responsable2)
    }
}

/// Group ("groupe de réveil") belonging to one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub uuid: GroupId,
    pub network: NetworkId,
    pub responsable1: MemberId,
    pub responsable2: Option<MemberId>,
    pub is_deleted: bool,
}

impl Group {
    pub fn responsables(&self) -> impl Iterator<Item = MemberId> + '_ {
        std::iter::once(self.responsable1).chain(self.responsable2)
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}
