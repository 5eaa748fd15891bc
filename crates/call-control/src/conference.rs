//! Conference bookkeeping
//!
//! The coordinator keeps at most one local conference. The registry enforces
//! that an active conference never holds fewer than two calls: removing a
//! member that would leave one or zero dissolves the conference and hands the
//! remaining member back to the caller.

use crate::error::{CallControlError, CallControlResult};
use crate::types::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identifier of a local conference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConferenceId(Uuid);

impl ConferenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConferenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conf-{}", self.0)
    }
}

/// Active conference and its merged calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceRef {
    pub id: ConferenceId,
    pub members: BTreeSet<SessionId>,
}

impl ConferenceRef {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Result of removing a call from the conference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConferenceChange {
    /// The call was not part of the conference
    NotMember,
    /// Removed, the conference keeps running
    Removed { remaining: usize },
    /// Removed and the conference fell below two calls
    Dissolved { remaining: Vec<SessionId> },
}

#[derive(Debug, Default)]
pub struct ConferenceRegistry {
    active: Option<ConferenceRef>,
}

impl ConferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ConferenceRef> {
        self.active.as_ref()
    }

    /// Number of merged calls, zero without a conference
    pub fn size(&self) -> usize {
        self.active.as_ref().map_or(0, ConferenceRef::size)
    }

    pub fn is_member(&self, session_id: &SessionId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|conference| conference.members.contains(session_id))
    }

    /// Merge calls into the conference, creating it when none is active
    pub fn merge<I>(&mut self, sessions: I) -> CallControlResult<&ConferenceRef>
    where
        I: IntoIterator<Item = SessionId>,
    {
        let mut members = self
            .active
            .as_ref()
            .map(|conference| conference.members.clone())
            .unwrap_or_default();
        members.extend(sessions);

        if members.len() < 2 {
            return Err(CallControlError::conference(
                "a conference needs at least two calls",
            ));
        }

        let id = self
            .active
            .as_ref()
            .map_or_else(ConferenceId::new, |conference| conference.id);
        Ok(&*self.active.insert(ConferenceRef { id, members }))
    }

    pub fn remove(&mut self, session_id: &SessionId) -> ConferenceChange {
        let Some(conference) = self.active.as_mut() else {
            return ConferenceChange::NotMember;
        };
        if !conference.members.remove(session_id) {
            return ConferenceChange::NotMember;
        }
        if conference.members.len() >= 2 {
            return ConferenceChange::Removed {
                remaining: conference.members.len(),
            };
        }
        let remaining = self
            .active
            .take()
            .map(|conference| conference.members.into_iter().collect())
            .unwrap_or_default();
        ConferenceChange::Dissolved { remaining }
    }

    /// Drop the conference, returning its former members
    pub fn dissolve(&mut self) -> Vec<SessionId> {
        self.active
            .take()
            .map(|conference| conference.members.into_iter().collect())
            .unwrap_or_default()
    }
}
