//! Participants and the arrival-ordered remote roster.

use chrono::{DateTime, Utc};
use common::types::{MediaKind, ParticipantId};
use serde::Serialize;
use std::collections::HashMap;

/// Whether a participant is this client or someone else in the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Local,
    Remote,
}

/// Media kinds a participant currently publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaSet {
    pub audio: bool,
    pub video: bool,
}

impl MediaSet {
    /// Both audio and video.
    #[must_use]
    pub fn all() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }

    pub fn insert(&mut self, kind: MediaKind) {
        match kind {
            MediaKind::Audio => self.audio = true,
            MediaKind::Video => self.video = true,
        }
    }

    #[must_use]
    pub fn contains(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

/// A participant known to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: Role,
    pub media: MediaSet,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    #[must_use]
    pub fn local(id: ParticipantId) -> Self {
        Self::new(id, Role::Local)
    }

    #[must_use]
    pub fn remote(id: ParticipantId) -> Self {
        Self::new(id, Role::Remote)
    }

    fn new(id: ParticipantId, role: Role) -> Self {
        Self {
            id,
            role,
            media: MediaSet::default(),
            joined_at: Utc::now(),
        }
    }
}

/// Remote participants in order of first publish.
///
/// A publish handler suspends while the engine subscribes. It registers the
/// publish first and gets the participant's current epoch back; a removal
/// while that publish is in flight bumps the epoch so the handler can tell
/// its result is stale. Epochs are only kept while a publish is in flight.
#[derive(Debug, Default)]
pub(crate) struct RemoteRoster {
    participants: Vec<Participant>,
    in_flight: HashMap<ParticipantId, PendingPublish>,
}

#[derive(Debug, Default)]
struct PendingPublish {
    epoch: u64,
    count: usize,
}

impl RemoteRoster {
    /// Record that `id` publishes `kind`; returns `true` if `id` is new.
    pub(crate) fn add_media(&mut self, id: &ParticipantId, kind: MediaKind) -> bool {
        if let Some(existing) = self.participants.iter_mut().find(|p| &p.id == id) {
            existing.media.insert(kind);
            return false;
        }

        let mut participant = Participant::remote(id.clone());
        participant.media.insert(kind);
        self.participants.push(participant);
        true
    }

    /// Remove `id`, returning it if it was present.
    pub(crate) fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        if let Some(pending) = self.in_flight.get_mut(id) {
            pending.epoch += 1;
        }
        let index = self.participants.iter().position(|p| &p.id == id)?;
        Some(self.participants.remove(index))
    }

    /// Register a publish for `id` that is about to suspend; returns the
    /// epoch to compare against in [`Self::end_publish`].
    pub(crate) fn begin_publish(&mut self, id: &ParticipantId) -> u64 {
        let pending = self.in_flight.entry(id.clone()).or_default();
        pending.count += 1;
        pending.epoch
    }

    /// Finish a publish started with [`Self::begin_publish`]; returns `true`
    /// if `id` was removed in between.
    pub(crate) fn end_publish(&mut self, id: &ParticipantId, epoch: u64) -> bool {
        let Some(pending) = self.in_flight.get_mut(id) else {
            return true;
        };
        let stale = pending.epoch != epoch;
        pending.count = pending.count.saturating_sub(1);
        if pending.count == 0 {
            self.in_flight.remove(id);
        }
        stale
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.iter().any(|p| &p.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.participants.len()
    }

    pub(crate) fn participants(&self) -> &[Participant] {
        &self.participants
    }

    #[cfg(test)]
    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn clear(&mut self) {
        self.participants.clear();
        self.in_flight.clear();
    }
}
