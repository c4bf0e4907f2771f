//! Recording view surface.
//!
//! Stands in for the DOM (or any front end) and records every call the
//! `ViewRegistry` and `SessionController` make on it.

use call_client::layout::LayoutMode;
use call_client::views::{DeviceState, RenderTarget, ViewSurface};
use common::types::{MediaKind, ParticipantId};
use std::sync::Mutex;
use std::time::Duration;

/// A call made on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Mounted(RenderTarget),
    Unmounted(RenderTarget),
    Layout(LayoutMode),
    Control(MediaKind, DeviceState),
}

/// `ViewSurface` that records instead of rendering.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
    layout_delay: Option<Duration>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the calling thread for `delay` after recording each layout, like
    /// a front end doing a synchronous reflow.
    pub fn with_layout_delay(delay: Duration) -> Self {
        Self {
            layout_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Targets currently mounted (mounted and not yet unmounted), in mount order.
    pub fn mounted(&self) -> Vec<RenderTarget> {
        let mut mounted: Vec<RenderTarget> = Vec::new();
        for event in self.events.lock().unwrap().iter() {
            match event {
                SurfaceEvent::Mounted(target) => mounted.push(target.clone()),
                SurfaceEvent::Unmounted(target) => mounted.retain(|t| t.handle != target.handle),
                SurfaceEvent::Layout(_) | SurfaceEvent::Control(..) => {}
            }
        }
        mounted
    }

    /// Element ids of the currently mounted targets.
    pub fn mounted_elements(&self) -> Vec<String> {
        self.mounted().into_iter().map(|t| t.element_id).collect()
    }

    pub fn is_mounted(&self, participant: &ParticipantId) -> bool {
        self.mounted().iter().any(|t| &t.participant == participant)
    }

    pub fn mount_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Mounted(_)))
            .count()
    }

    pub fn unmount_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Unmounted(_)))
            .count()
    }

    /// Layouts applied, in order.
    pub fn layouts(&self) -> Vec<LayoutMode> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Layout(mode) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    pub fn last_layout(&self) -> Option<LayoutMode> {
        self.layouts().last().copied()
    }

    /// Control updates, in order.
    pub fn controls(&self) -> Vec<(MediaKind, DeviceState)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Control(kind, state) => Some((*kind, *state)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SurfaceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ViewSurface for RecordingSurface {
    fn mount(&self, target: &RenderTarget) {
        self.push(SurfaceEvent::Mounted(target.clone()));
    }

    fn unmount(&self, target: &RenderTarget) {
        self.push(SurfaceEvent::Unmounted(target.clone()));
    }

    fn apply_layout(&self, mode: LayoutMode) {
        self.push(SurfaceEvent::Layout(mode));
        if let Some(delay) = self.layout_delay {
            std::thread::sleep(delay);
        }
    }

    fn show_control(&self, kind: MediaKind, state: DeviceState) {
        self.push(SurfaceEvent::Control(kind, state));
    }
}
