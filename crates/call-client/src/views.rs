//! Render targets and the view surface they are mounted on.
//!
//! [`ViewRegistry`] owns one [`RenderTarget`] per displayed participant and is
//! the only place targets are created or disposed. The actual widgets live
//! behind [`ViewSurface`], a thin adapter a front end implements (DOM, native
//! toolkit, or a recorder in tests).

use crate::layout::LayoutMode;
use common::types::{MediaKind, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Fixed element ids the page templates use.
pub mod elements {
    pub const JOIN_BUTTON: &str = "join";
    pub const LEAVE_BUTTON: &str = "leave";
    pub const CAMERA_BUTTON: &str = "camera-btn";
    pub const MIC_BUTTON: &str = "mic-btn";
    pub const LOCAL_PLAYER: &str = "local-player";
    pub const REMOTE_PLAYERS: &str = "remote-players";
    pub const VIDEO_STREAMS: &str = "video-streams";
}

/// Which page flavor the session renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewProfile {
    /// One container per participant, named after the participant id.
    Basic,
    /// Fixed local player plus `player-{id}` tiles under `remote-players`.
    #[default]
    Room,
}

impl std::str::FromStr for ViewProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(ViewProfile::Basic),
            "room" => Ok(ViewProfile::Room),
            other => Err(format!("unknown view profile '{other}'")),
        }
    }
}

/// Where a target is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Local,
    Remote,
}

/// Opaque, never-reused handle of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetHandle(u64);

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target-{}", self.0)
    }
}

/// A place one participant's video is rendered into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub handle: TargetHandle,
    pub participant: ParticipantId,
    pub slot: Slot,
    /// Element id the front end should give the container.
    pub element_id: String,
    /// Element id of the parent container, if any.
    pub container_id: Option<&'static str>,
}

/// Enabled/disabled state of a local device, as shown on its control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    On,
    Off,
}

impl DeviceState {
    #[must_use]
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            DeviceState::On
        } else {
            DeviceState::Off
        }
    }

    #[must_use]
    pub fn is_on(self) -> bool {
        self == DeviceState::On
    }
}

/// Front-end adapter that owns the actual widgets.
pub trait ViewSurface: Send + Sync {
    /// Create the container for a target.
    fn mount(&self, target: &RenderTarget);

    /// Remove the container of a target.
    fn unmount(&self, target: &RenderTarget);

    /// Switch the video container to a layout.
    fn apply_layout(&self, mode: LayoutMode);

    /// Reflect a device toggle on its control (e.g. button color).
    fn show_control(&self, kind: MediaKind, state: DeviceState);
}

/// Registry of participant render targets.
pub struct ViewRegistry {
    surface: Arc<dyn ViewSurface>,
    profile: ViewProfile,
    targets: HashMap<ParticipantId, RenderTarget>,
    next_handle: u64,
}

impl ViewRegistry {
    #[must_use]
    pub fn new(surface: Arc<dyn ViewSurface>, profile: ViewProfile) -> Self {
        Self {
            surface,
            profile,
            targets: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Target for `participant`, creating and mounting it if absent.
    ///
    /// Registering an already registered participant returns the existing
    /// target unchanged.
    pub fn register(&mut self, participant: &ParticipantId, slot: Slot) -> RenderTarget {
        if let Some(existing) = self.targets.get(participant) {
            return existing.clone();
        }

        let handle = TargetHandle(self.next_handle);
        self.next_handle += 1;

        let (element_id, container_id) = self.element_for(participant, slot);
        let target = RenderTarget {
            handle,
            participant: participant.clone(),
            slot,
            element_id,
            container_id,
        };

        self.surface.mount(&target);
        debug!(
            target: "call.views",
            participant = %participant,
            handle = %handle,
            element_id = %target.element_id,
            "Render target registered"
        );

        self.targets.insert(participant.clone(), target.clone());
        target
    }

    /// Unmount and drop the target of `participant`.
    ///
    /// Returns `false` when there was nothing to release.
    pub fn release(&mut self, participant: &ParticipantId) -> bool {
        match self.targets.remove(participant) {
            Some(target) => {
                self.surface.unmount(&target);
                debug!(
                    target: "call.views",
                    participant = %participant,
                    handle = %target.handle,
                    "Render target released"
                );
                true
            }
            None => false,
        }
    }

    /// Release every target; returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let released = self.targets.len();
        for (_, target) in self.targets.drain() {
            self.surface.unmount(&target);
        }
        released
    }

    #[must_use]
    pub fn get(&self, participant: &ParticipantId) -> Option<&RenderTarget> {
        self.targets.get(participant)
    }

    #[must_use]
    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.targets.contains_key(participant)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Participants with a target, sorted by handle (registration order).
    #[must_use]
    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut targets: Vec<&RenderTarget> = self.targets.values().collect();
        targets.sort_by_key(|t| t.handle);
        targets.into_iter().map(|t| t.participant.clone()).collect()
    }

    fn element_for(
        &self,
        participant: &ParticipantId,
        slot: Slot,
    ) -> (String, Option<&'static str>) {
        match (self.profile, slot) {
            (ViewProfile::Basic, _) => (participant.to_string(), None),
            (ViewProfile::Room, Slot::Local) => (elements::LOCAL_PLAYER.to_string(), None),
            (ViewProfile::Room, Slot::Remote) => (
                format!("player-{participant}"),
                Some(elements::REMOTE_PLAYERS),
            ),
        }
    }
}

impl fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("profile", &self.profile)
            .field("targets", &self.targets.len())
            .field("next_handle", &self.next_handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSurface {
        mounted: Mutex<Vec<String>>,
        unmounted: Mutex<Vec<String>>,
    }

    impl ViewSurface for CountingSurface {
        fn mount(&self, target: &RenderTarget) {
            self.mounted.lock().unwrap().push(target.element_id.clone());
        }

        fn unmount(&self, target: &RenderTarget) {
            self.unmounted.lock().unwrap().push(target.element_id.clone());
        }

        fn apply_layout(&self, _mode: LayoutMode) {}

        fn show_control(&self, _kind: MediaKind, _state: DeviceState) {}
    }

    fn registry(profile: ViewProfile) -> (ViewRegistry, Arc<CountingSurface>) {
        let surface = Arc::new(CountingSurface::default());
        let registry = ViewRegistry::new(surface.clone(), profile);
        (registry, surface)
    }

    #[test]
    fn test_register_is_idempotent() {
        let (mut registry, surface) = registry(ViewProfile::Room);
        let id = ParticipantId::from(42u32);

        let first = registry.register(&id, Slot::Remote);
        let second = registry.register(&id, Slot::Remote);

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(surface.mounted.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_distinct_participants_get_distinct_handles() {
        let (mut registry, _) = registry(ViewProfile::Room);

        let a = registry.register(&ParticipantId::from(1u32), Slot::Remote);
        let b = registry.register(&ParticipantId::from(2u32), Slot::Remote);
        registry.release(&ParticipantId::from(1u32));
        let c = registry.register(&ParticipantId::from(1u32), Slot::Remote);

        assert_ne!(a.handle, b.handle);
        // Handles are not reused after release
        assert_ne!(a.handle, c.handle);
        assert_ne!(b.handle, c.handle);
    }

    #[test]
    fn test_release_twice_is_noop() {
        let (mut registry, surface) = registry(ViewProfile::Room);
        let id = ParticipantId::from(7u32);
        registry.register(&id, Slot::Remote);

        assert!(registry.release(&id));
        assert!(!registry.release(&id));
        assert_eq!(surface.unmounted.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_release_without_register_is_noop() {
        let (mut registry, surface) = registry(ViewProfile::Basic);

        assert!(!registry.release(&ParticipantId::from("ghost")));
        assert!(surface.unmounted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_room_profile_element_ids() {
        let (mut registry, _) = registry(ViewProfile::Room);

        let local = registry.register(&ParticipantId::from(0u32), Slot::Local);
        let remote = registry.register(&ParticipantId::from(42u32), Slot::Remote);

        assert_eq!(local.element_id, "local-player");
        assert_eq!(local.container_id, None);
        assert_eq!(remote.element_id, "player-42");
        assert_eq!(remote.container_id, Some("remote-players"));
    }

    #[test]
    fn test_basic_profile_element_ids() {
        let (mut registry, _) = registry(ViewProfile::Basic);

        let local = registry.register(&ParticipantId::from(0u32), Slot::Local);
        let remote = registry.register(&ParticipantId::from(42u32), Slot::Remote);

        assert_eq!(local.element_id, "0");
        assert_eq!(remote.element_id, "42");
    }

    #[test]
    fn test_release_all_and_order() {
        let (mut registry, surface) = registry(ViewProfile::Room);
        for id in [5u32, 3, 9] {
            registry.register(&ParticipantId::from(id), Slot::Remote);
        }

        assert_eq!(
            registry.participants(),
            vec![
                ParticipantId::from(5u32),
                ParticipantId::from(3u32),
                ParticipantId::from(9u32)
            ]
        );
        assert_eq!(registry.release_all(), 3);
        assert!(registry.is_empty());
        assert_eq!(surface.unmounted.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("basic".parse::<ViewProfile>(), Ok(ViewProfile::Basic));
        assert_eq!("ROOM".parse::<ViewProfile>(), Ok(ViewProfile::Room));
        assert!("grid".parse::<ViewProfile>().is_err());
        assert_eq!(ViewProfile::default(), ViewProfile::Room);
    }

    #[test]
    fn test_device_state() {
        assert_eq!(DeviceState::from_enabled(true), DeviceState::On);
        assert!(!DeviceState::from_enabled(false).is_on());
    }
}
