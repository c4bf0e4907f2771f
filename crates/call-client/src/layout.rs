//! Layout policy: participant count to layout mode.

use serde::{Deserialize, Serialize};

/// Participant count above which the grid layout is used.
pub const GRID_THRESHOLD: usize = 2;

/// How the video container arranges its tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutMode {
    /// One or two participants: large tiles.
    SingleOrPairView,
    /// Three or more participants.
    GridView,
}

impl LayoutMode {
    /// CSS class a DOM adapter toggles on the `video-streams` container.
    #[must_use]
    pub fn container_class(self) -> Option<&'static str> {
        match self {
            LayoutMode::SingleOrPairView => None,
            LayoutMode::GridView => Some("grid-view"),
        }
    }
}

/// Layout for `participant_count` participants, local one included.
#[must_use]
pub fn compute_layout(participant_count: usize) -> LayoutMode {
    if participant_count > GRID_THRESHOLD {
        LayoutMode::GridView
    } else {
        LayoutMode::SingleOrPairView
    }
}
