//! File system event types and translation from notify.

#![allow(clippy::missing_const_for_fn)]

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// Mutation kind reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Path came into existence.
    Create,
    /// Path contents or metadata changed.
    Modify,
    /// Path disappeared.
    Delete,
}

/// File system event delivered to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File was created.
    Created(PathBuf),
    /// File was modified.
    Modified(PathBuf),
    /// File was deleted.
    Deleted(PathBuf),
    /// File was renamed from old path to new path.
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    /// Get the primary path associated with this event.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
            Self::Renamed { to, .. } => to,
        }
    }

    /// Split into ordered `(kind, path)` steps. A rename is a delete of the
    /// old path followed by a create of the new one.
    #[must_use]
    pub fn into_changes(self) -> Vec<(ChangeKind, PathBuf)> {
        match self {
            Self::Created(p) => vec![(ChangeKind::Create, p)],
            Self::Modified(p) => vec![(ChangeKind::Modify, p)],
            Self::Deleted(p) => vec![(ChangeKind::Delete, p)],
            Self::Renamed { from, to } => {
                vec![(ChangeKind::Delete, from), (ChangeKind::Create, to)]
            }
        }
    }

    /// Translate a raw notify event. Access and unknown events yield nothing.
    #[must_use]
    pub fn from_notify(event: Event) -> Vec<Self> {
        let Event { kind, mut paths, .. } = event;
        match kind {
            EventKind::Create(_) => paths.into_iter().map(Self::Created).collect(),
            EventKind::Remove(_) => paths.into_iter().map(Self::Deleted).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
                let to = paths.pop().unwrap_or_default();
                let from = paths.pop().unwrap_or_default();
                vec![Self::Renamed { from, to }]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.into_iter().map(Self::Deleted).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.into_iter().map(Self::Created).collect()
            }
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .into_iter()
                .map(|p| {
                    if p.exists() {
                        Self::Created(p)
                    } else {
                        Self::Deleted(p)
                    }
                })
                .collect(),
            EventKind::Modify(_) => paths.into_iter().map(Self::Modified).collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }
}
