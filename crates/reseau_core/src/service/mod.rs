//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Map storage errors onto the Conflict / NotFound / Validation taxonomy.
//! - Keep callers (HTTP handlers, CLI) decoupled from storage details.

pub mod analytics_service;
pub mod membership_service;

use crate::model::member::MemberId;
use crate::model::network::{GroupId, NetworkId};
use std::fmt::{Display, Formatter};

/// What a `NotFound` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Group(GroupId),
    Network(NetworkId),
    Member(MemberId),
    /// Open membership interval of `member` in `group`.
    Membership { group: GroupId, member: MemberId },
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group(id) => write!(f, "group {id}"),
            Self::Network(id) => write!(f, "network {id}"),
            Self::Member(id) => write!(f, "member {id}"),
            Self::Membership { group, member } => {
                write!(f, "membership of member {member} in group {group}")
            }
        }
    }
}
