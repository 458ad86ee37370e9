use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type GroupId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    KeptOne,
    AllDeleted,
    Skipped,
}

/// One duplicate cluster as tracked by the controller. The path set is
/// immutable after registration; only the status changes.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub id: GroupId,
    pub paths: Vec<PathBuf>,
    pub status: GroupStatus,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown duplicate group id {0}")]
    UnknownGroup(GroupId),

    #[error("{path} is not a member of group {id}", path = .path.display())]
    NotAMember { id: GroupId, path: PathBuf },
}

/// Outcome of resolving one group. Deletion is best-effort per path, so the
/// failed count can be non-zero while the group still reaches a terminal
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub status: GroupStatus,
    pub deleted: usize,
    pub failed: usize,
}

/// Picks which member of a group survives automatic resolution.
pub trait KeepPolicy: Send + Sync {
    /// Returns the index of the path to keep. `paths` is never empty.
    fn choose(&self, paths: &[PathBuf]) -> usize;
}

/// Keeps the first path in group-arrival order.
pub struct KeepFirst;

impl KeepPolicy for KeepFirst {
    fn choose(&self, _paths: &[PathBuf]) -> usize {
        0
    }
}

/// Consumer-side session state for resolving duplicate groups.
///
/// Owns the set of active (pending) groups, assigns sequential ids at
/// registration, and is the only component that mutates the filesystem:
/// per-path deletion, never retried, with failures logged and counted. Once a
/// group reaches a terminal status it is evicted from active tracking.
pub struct ResolutionController {
    groups: HashMap<GroupId, DuplicateGroup>,
    next_id: GroupId,
    auto_resolve: bool,
    keep_policy: Box<dyn KeepPolicy>,
    groups_found: usize,
    pictures_deleted: usize,
}

impl ResolutionController {
    pub fn new(auto_resolve: bool) -> Self {
        Self {
            groups: HashMap::new(),
            next_id: 0,
            auto_resolve,
            keep_policy: Box::new(KeepFirst),
            groups_found: 0,
            pictures_deleted: 0,
        }
    }

    pub fn with_keep_policy(mut self, policy: Box<dyn KeepPolicy>) -> Self {
        self.keep_policy = policy;
        self
    }

    pub fn auto_resolve_enabled(&self) -> bool {
        self.auto_resolve
    }

    pub fn groups_found(&self) -> usize {
        self.groups_found
    }

    pub fn pictures_deleted(&self) -> usize {
        self.pictures_deleted
    }

    pub fn pending_count(&self) -> usize {
        self.groups.len()
    }

    /// Pending group ids in registration order.
    pub fn pending_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.groups.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn group(&self, id: GroupId) -> Option<&DuplicateGroup> {
        self.groups.get(&id)
    }

    /// Registers a freshly emitted group. With auto-resolve on, the group is
    /// resolved immediately under the keep policy and the outcome returned;
    /// otherwise it stays pending awaiting an operator decision.
    pub fn on_group_discovered(&mut self, paths: Vec<PathBuf>) -> (GroupId, Option<Resolution>) {
        let id = self.next_id;
        self.next_id += 1;
        self.groups_found += 1;
        self.groups.insert(
            id,
            DuplicateGroup {
                id,
                paths,
                status: GroupStatus::Pending,
            },
        );

        if self.auto_resolve {
            let outcome = self.auto_resolve_group(id);
            (id, Some(outcome))
        } else {
            (id, None)
        }
    }

    /// Deletes every member of the group except `keep`.
    pub fn resolve_keep_one(&mut self, id: GroupId, keep: &Path) -> Result<Resolution, ResolveError> {
        let group = self
            .groups
            .get(&id)
            .ok_or(ResolveError::UnknownGroup(id))?;
        if !group.paths.iter().any(|p| p == keep) {
            return Err(ResolveError::NotAMember {
                id,
                path: keep.to_path_buf(),
            });
        }
        Ok(self.finish(id, Some(keep.to_path_buf())))
    }

    /// Deletes every member of the group.
    pub fn resolve_delete_all(&mut self, id: GroupId) -> Result<Resolution, ResolveError> {
        if !self.groups.contains_key(&id) {
            return Err(ResolveError::UnknownGroup(id));
        }
        Ok(self.finish(id, None))
    }

    /// Marks the group skipped without touching the filesystem.
    pub fn skip(&mut self, id: GroupId) -> Result<(), ResolveError> {
        let mut group = self
            .groups
            .remove(&id)
            .ok_or(ResolveError::UnknownGroup(id))?;
        group.status = GroupStatus::Skipped;
        log::info!("skipped group {id}");
        Ok(())
    }

    /// Toggles auto-resolve. Turning it on drains the pending backlog
    /// synchronously, resolving each group under the keep policy, and returns
    /// the outcomes in registration order.
    pub fn set_auto_resolve(&mut self, enabled: bool) -> Vec<(GroupId, Resolution)> {
        self.auto_resolve = enabled;
        if !enabled {
            return Vec::new();
        }
        self.pending_ids()
            .into_iter()
            .map(|id| (id, self.auto_resolve_group(id)))
            .collect()
    }

    fn auto_resolve_group(&mut self, id: GroupId) -> Resolution {
        let keep = {
            let group = &self.groups[&id];
            group.paths[self.keep_policy.choose(&group.paths)].clone()
        };
        self.finish(id, Some(keep))
    }

    fn finish(&mut self, id: GroupId, keep: Option<PathBuf>) -> Resolution {
        let mut group = self.groups.remove(&id).expect("group must be active");
        let mut deleted = 0;
        let mut failed = 0;
        for path in &group.paths {
            if keep.as_deref() == Some(path.as_path()) {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => deleted += 1,
                Err(err) => {
                    log::warn!("could not delete {}: {err}", path.display());
                    failed += 1;
                }
            }
        }
        self.pictures_deleted += deleted;
        group.status = if keep.is_some() {
            GroupStatus::KeptOne
        } else {
            GroupStatus::AllDeleted
        };
        log::info!(
            "resolved group {id}: {:?}, {deleted} deleted, {failed} failed",
            group.status
        );
        Resolution {
            status: group.status,
            deleted,
            failed,
        }
    }
}
