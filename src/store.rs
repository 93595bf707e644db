// src/store.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::model::{
    Activity, ActivityId, Capacity, CapacityId, Leave, LeaveId, Location, LocationId, Project,
    ProjectId, Resource, ResourceId, User, UserId,
};

// --- Errors ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown user {0}")]
    UnknownUser(UserId),
    #[error("unknown location {0}")]
    UnknownLocation(LocationId),
    #[error("unknown project {0}")]
    UnknownProject(ProjectId),
    #[error("unknown activity {0}")]
    UnknownActivity(ActivityId),
    #[error("unknown leave {0}")]
    UnknownLeave(LeaveId),
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),
    #[error("unknown capacity {0}")]
    UnknownCapacity(CapacityId),
    #[error("progression {0} is outside 0-100")]
    ProgressionOutOfRange(u8),
    #[error("{entity} {id} is still referenced and cannot be removed")]
    StillReferenced { entity: &'static str, id: Uuid },
    #[error("moving project {moved} under {target} would create a cycle")]
    ProjectCycle { moved: ProjectId, target: ProjectId },
}

// --- Store ---

#[derive(Default)]
struct StoreInner {
    users: HashMap<UserId, User>,
    locations: HashMap<LocationId, Location>,
    // Project arena: nodes by id plus child-id lists, so subtree walks
    // never recurse through live parent links.
    projects: HashMap<ProjectId, Project>,
    children: HashMap<ProjectId, Vec<ProjectId>>,
    // Row vectors keep write order; the latest progression on a date tie
    // is the last one written.
    activities: Vec<Activity>,
    leaves: Vec<Leave>,
    resources: Vec<Resource>,
    capacities: Vec<Capacity>,
}

/// In-memory persistence collaborator. Clones share the same state.
///
/// Every read of user data takes the user id explicitly; there is no
/// ambient current user anywhere in the store.
#[derive(Clone, Default)]
pub struct TrackerStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreCounts {
    pub users: usize,
    pub locations: usize,
    pub projects: usize,
    pub activities: usize,
    pub leaves: usize,
    pub resources: usize,
    pub capacities: usize,
}

impl TrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Users ---

    pub fn add_user(&self, user: User) -> User {
        let mut inner = self.inner.lock().unwrap();
        debug!("Adding user {} ({})", user.username, user.id);
        inner.users.insert(user.id, user.clone());
        user
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.inner.lock().unwrap().users.get(&id).cloned()
    }

    /// All users, ordered by username for stable listings.
    pub fn users(&self) -> Vec<User> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    pub fn remove_user(&self, id: UserId) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(&id) {
            return Err(StoreError::UnknownUser(id));
        }
        let referenced = inner.activities.iter().any(|a| a.user == id)
            || inner.leaves.iter().any(|l| l.user == id)
            || inner.resources.iter().any(|r| r.user == id)
            || inner.capacities.iter().any(|c| c.user == id);
        if referenced {
            return Err(StoreError::StillReferenced { entity: "user", id });
        }
        debug!("Removing user {}", id);
        Ok(inner.users.remove(&id).unwrap())
    }

    // --- Locations ---

    pub fn add_location(&self, location: Location) -> Location {
        let mut inner = self.inner.lock().unwrap();
        debug!("Adding location {} ({})", location.title, location.id);
        inner.locations.insert(location.id, location.clone());
        location
    }

    pub fn location(&self, id: LocationId) -> Option<Location> {
        self.inner.lock().unwrap().locations.get(&id).cloned()
    }

    pub fn locations(&self) -> Vec<Location> {
        let inner = self.inner.lock().unwrap();
        let mut locations: Vec<Location> = inner.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.title.cmp(&b.title));
        locations
    }

    pub fn remove_location(&self, id: LocationId) -> Result<Location, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.locations.contains_key(&id) {
            return Err(StoreError::UnknownLocation(id));
        }
        if inner.activities.iter().any(|a| a.location == id) {
            return Err(StoreError::StillReferenced {
                entity: "location",
                id,
            });
        }
        Ok(inner.locations.remove(&id).unwrap())
    }

    // --- Projects ---

    pub fn add_project(&self, project: Project) -> Result<Project, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(parent) = project.parent {
            if !inner.projects.contains_key(&parent) {
                return Err(StoreError::UnknownProject(parent));
            }
            inner.children.entry(parent).or_default().push(project.id);
        }
        debug!("Adding project {} ({})", project.title, project.id);
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    pub fn project(&self, id: ProjectId) -> Option<Project> {
        self.inner.lock().unwrap().projects.get(&id).cloned()
    }

    pub fn projects(&self) -> Vec<Project> {
        let inner = self.inner.lock().unwrap();
        let mut projects: Vec<Project> = inner.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.title.cmp(&b.title));
        projects
    }

    pub fn children(&self, id: ProjectId) -> Vec<ProjectId> {
        let inner = self.inner.lock().unwrap();
        inner.children.get(&id).cloned().unwrap_or_default()
    }

    /// Subtree node ids in pre-order. With `include_self` false only the
    /// proper descendants are returned.
    pub fn descendants(&self, id: ProjectId, include_self: bool) -> Vec<ProjectId> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if node != id || include_self {
                out.push(node);
            }
            if let Some(kids) = inner.children.get(&node) {
                // Reverse so pre-order follows insertion order.
                for child in kids.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    /// Number of ancestors above the node. Roots have depth 0.
    pub fn depth(&self, id: ProjectId) -> usize {
        let inner = self.inner.lock().unwrap();
        let mut depth = 0;
        let mut current = inner.projects.get(&id).and_then(|p| p.parent);
        while let Some(parent) = current {
            depth += 1;
            current = inner.projects.get(&parent).and_then(|p| p.parent);
        }
        depth
    }

    /// Moves a project under a new parent (or to the root). Rejects the
    /// move when the target sits inside the moved subtree.
    pub fn reparent_project(
        &self,
        id: ProjectId,
        new_parent: Option<ProjectId>,
    ) -> Result<Project, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.projects.contains_key(&id) {
            return Err(StoreError::UnknownProject(id));
        }
        if let Some(target) = new_parent {
            if !inner.projects.contains_key(&target) {
                return Err(StoreError::UnknownProject(target));
            }
            // Walk the ancestor chain of the target; hitting the moved
            // node means the target is inside its subtree.
            let mut current = Some(target);
            while let Some(node) = current {
                if node == id {
                    return Err(StoreError::ProjectCycle {
                        moved: id,
                        target,
                    });
                }
                current = inner.projects.get(&node).and_then(|p| p.parent);
            }
        }
        let old_parent = inner.projects.get(&id).and_then(|p| p.parent);
        if let Some(old) = old_parent {
            if let Some(kids) = inner.children.get_mut(&old) {
                kids.retain(|child| *child != id);
            }
        }
        if let Some(target) = new_parent {
            inner.children.entry(target).or_default().push(id);
        }
        let project = inner.projects.get_mut(&id).unwrap();
        project.parent = new_parent;
        debug!("Reparented project {} under {:?}", id, new_parent);
        Ok(project.clone())
    }

    pub fn remove_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.projects.contains_key(&id) {
            return Err(StoreError::UnknownProject(id));
        }
        let referenced = inner.children.get(&id).is_some_and(|c| !c.is_empty())
            || inner.activities.iter().any(|a| a.project == id)
            || inner.resources.iter().any(|r| r.project == id);
        if referenced {
            return Err(StoreError::StillReferenced {
                entity: "project",
                id,
            });
        }
        let project = inner.projects.remove(&id).unwrap();
        inner.children.remove(&id);
        if let Some(parent) = project.parent {
            if let Some(kids) = inner.children.get_mut(&parent) {
                kids.retain(|child| *child != id);
            }
        }
        Ok(project)
    }

    // --- Activities ---

    pub fn add_activity(&self, activity: Activity) -> Result<Activity, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(&activity.user) {
            return Err(StoreError::UnknownUser(activity.user));
        }
        if !inner.projects.contains_key(&activity.project) {
            return Err(StoreError::UnknownProject(activity.project));
        }
        if !inner.locations.contains_key(&activity.location) {
            return Err(StoreError::UnknownLocation(activity.location));
        }
        if let Some(progression) = activity.progression {
            if progression > 100 {
                return Err(StoreError::ProgressionOutOfRange(progression));
            }
        }
        debug!(
            "Adding activity {} on {} for user {}",
            activity.id, activity.date, activity.user
        );
        inner.activities.push(activity.clone());
        Ok(activity)
    }

    /// One user's activities, in write order.
    pub fn activities_for(&self, user: UserId) -> Vec<Activity> {
        let inner = self.inner.lock().unwrap();
        inner
            .activities
            .iter()
            .filter(|a| a.user == user)
            .cloned()
            .collect()
    }

    /// Every user's activities on one project, in write order.
    pub fn activities_on_project(&self, project: ProjectId) -> Vec<Activity> {
        let inner = self.inner.lock().unwrap();
        inner
            .activities
            .iter()
            .filter(|a| a.project == project)
            .cloned()
            .collect()
    }

    /// The latest reported progression for a project: highest date wins,
    /// later writes win on a date tie.
    pub fn latest_progression(&self, project: ProjectId) -> Option<u8> {
        let inner = self.inner.lock().unwrap();
        let mut latest: Option<(NaiveDate, u8)> = None;
        for activity in inner.activities.iter().filter(|a| a.project == project) {
            if let Some(value) = activity.progression {
                match latest {
                    Some((date, _)) if activity.date < date => {}
                    _ => latest = Some((activity.date, value)),
                }
            }
        }
        latest.map(|(_, value)| value)
    }

    pub fn remove_activity(&self, id: ActivityId) -> Result<Activity, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .activities
            .iter()
            .position(|a| a.id == id)
            .ok_or(StoreError::UnknownActivity(id))?;
        Ok(inner.activities.remove(index))
    }

    // --- Leaves ---

    pub fn add_leave(&self, leave: Leave) -> Result<Leave, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(&leave.user) {
            return Err(StoreError::UnknownUser(leave.user));
        }
        inner.leaves.push(leave.clone());
        Ok(leave)
    }

    pub fn leaves_for(&self, user: UserId) -> Vec<Leave> {
        let inner = self.inner.lock().unwrap();
        inner
            .leaves
            .iter()
            .filter(|l| l.user == user)
            .cloned()
            .collect()
    }

    pub fn remove_leave(&self, id: LeaveId) -> Result<Leave, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .leaves
            .iter()
            .position(|l| l.id == id)
            .ok_or(StoreError::UnknownLeave(id))?;
        Ok(inner.leaves.remove(index))
    }

    // --- Resources ---

    pub fn add_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(&resource.user) {
            return Err(StoreError::UnknownUser(resource.user));
        }
        if !inner.projects.contains_key(&resource.project) {
            return Err(StoreError::UnknownProject(resource.project));
        }
        inner.resources.push(resource.clone());
        Ok(resource)
    }

    pub fn resources_for(&self, user: UserId) -> Vec<Resource> {
        let inner = self.inner.lock().unwrap();
        inner
            .resources
            .iter()
            .filter(|r| r.user == user)
            .cloned()
            .collect()
    }

    /// Every user's resources on one project (feeds `allotted_time`).
    pub fn resources_on_project(&self, project: ProjectId) -> Vec<Resource> {
        let inner = self.inner.lock().unwrap();
        inner
            .resources
            .iter()
            .filter(|r| r.project == project)
            .cloned()
            .collect()
    }

    pub fn remove_resource(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .resources
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::UnknownResource(id))?;
        Ok(inner.resources.remove(index))
    }

    // --- Capacities ---

    pub fn add_capacity(&self, capacity: Capacity) -> Result<Capacity, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(&capacity.user) {
            return Err(StoreError::UnknownUser(capacity.user));
        }
        inner.capacities.push(capacity.clone());
        Ok(capacity)
    }

    pub fn capacities_for(&self, user: UserId) -> Vec<Capacity> {
        let inner = self.inner.lock().unwrap();
        inner
            .capacities
            .iter()
            .filter(|c| c.user == user)
            .cloned()
            .collect()
    }

    /// Horizon of the availability schedule. None when the user has no
    /// capacity records at all.
    pub fn latest_capacity_date(&self, user: UserId) -> Option<NaiveDate> {
        let inner = self.inner.lock().unwrap();
        inner
            .capacities
            .iter()
            .filter(|c| c.user == user)
            .map(|c| c.date)
            .max()
    }

    pub fn remove_capacity(&self, id: CapacityId) -> Result<Capacity, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .capacities
            .iter()
            .position(|c| c.id == id)
            .ok_or(StoreError::UnknownCapacity(id))?;
        Ok(inner.capacities.remove(index))
    }

    // --- Introspection ---

    pub fn counts(&self) -> StoreCounts {
        let inner = self.inner.lock().unwrap();
        StoreCounts {
            users: inner.users.len(),
            locations: inner.locations.len(),
            projects: inner.projects.len(),
            activities: inner.activities.len(),
            leaves: inner.leaves.len(),
            resources: inner.resources.len(),
            capacities: inner.capacities.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_user(store: &TrackerStore, username: &str) -> User {
        store.add_user(User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            start_balance: TimeDelta::zero(),
        })
    }

    fn sample_project(store: &TrackerStore, title: &str, parent: Option<ProjectId>) -> Project {
        store
            .add_project(Project {
                id: Uuid::new_v4(),
                parent,
                title: title.to_string(),
                comment: None,
            })
            .unwrap()
    }

    fn sample_activity(user: &User, project: &Project, location: &Location) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            user: user.id,
            project: project.id,
            date: date(2024, 3, 4),
            duration: TimeDelta::hours(2),
            progression: None,
            location: location.id,
            is_teleworking: false,
            is_business_trip: false,
            comment: None,
        }
    }

    #[test]
    fn insert_rejects_unknown_references() {
        let store = TrackerStore::new();
        let user = sample_user(&store, "ada");
        let project = sample_project(&store, "Engine", None);

        let orphan = Activity {
            id: Uuid::new_v4(),
            user: user.id,
            project: project.id,
            date: date(2024, 3, 4),
            duration: TimeDelta::hours(2),
            progression: None,
            location: Uuid::new_v4(),
            is_teleworking: false,
            is_business_trip: false,
            comment: None,
        };
        let err = store.add_activity(orphan).unwrap_err();
        assert!(matches!(err, StoreError::UnknownLocation(_)));

        let leave = Leave {
            id: Uuid::new_v4(),
            user: Uuid::new_v4(),
            kind: crate::model::LeaveKind::SickLeave,
            date: date(2024, 3, 4),
            duration: TimeDelta::hours(7),
        };
        assert!(matches!(
            store.add_leave(leave),
            Err(StoreError::UnknownUser(_))
        ));
    }

    #[test]
    fn progression_must_stay_within_percent_range() {
        let store = TrackerStore::new();
        let user = sample_user(&store, "ada");
        let project = sample_project(&store, "Engine", None);
        let location = store.add_location(Location {
            id: Uuid::new_v4(),
            title: "Office".to_string(),
            comment: None,
        });

        let mut activity = sample_activity(&user, &project, &location);
        activity.progression = Some(101);
        assert_eq!(
            store.add_activity(activity),
            Err(StoreError::ProgressionOutOfRange(101))
        );
    }

    #[test]
    fn referenced_rows_cannot_be_removed() {
        let store = TrackerStore::new();
        let user = sample_user(&store, "ada");
        let project = sample_project(&store, "Engine", None);
        let location = store.add_location(Location {
            id: Uuid::new_v4(),
            title: "Office".to_string(),
            comment: None,
        });
        store
            .add_activity(sample_activity(&user, &project, &location))
            .unwrap();

        assert!(matches!(
            store.remove_user(user.id),
            Err(StoreError::StillReferenced { entity: "user", .. })
        ));
        assert!(matches!(
            store.remove_project(project.id),
            Err(StoreError::StillReferenced { .. })
        ));
        assert!(matches!(
            store.remove_location(location.id),
            Err(StoreError::StillReferenced { .. })
        ));

        // Dropping the activity releases all three.
        let activities = store.activities_for(user.id);
        store.remove_activity(activities[0].id).unwrap();
        store.remove_location(location.id).unwrap();
        store.remove_project(project.id).unwrap();
        store.remove_user(user.id).unwrap();
    }

    #[test]
    fn parent_with_children_is_protected() {
        let store = TrackerStore::new();
        let root = sample_project(&store, "Root", None);
        let child = sample_project(&store, "Child", Some(root.id));

        assert!(matches!(
            store.remove_project(root.id),
            Err(StoreError::StillReferenced { .. })
        ));
        store.remove_project(child.id).unwrap();
        store.remove_project(root.id).unwrap();
    }

    #[test]
    fn descendants_walk_the_whole_subtree_in_preorder() {
        let store = TrackerStore::new();
        let root = sample_project(&store, "Root", None);
        let a = sample_project(&store, "A", Some(root.id));
        let b = sample_project(&store, "B", Some(root.id));
        let a1 = sample_project(&store, "A1", Some(a.id));

        assert_eq!(
            store.descendants(root.id, true),
            vec![root.id, a.id, a1.id, b.id]
        );
        assert_eq!(store.descendants(root.id, false), vec![a.id, a1.id, b.id]);
        assert_eq!(store.descendants(a1.id, true), vec![a1.id]);
        assert_eq!(store.depth(a1.id), 2);
        assert_eq!(store.depth(root.id), 0);
    }

    #[test]
    fn reparent_rejects_moves_into_own_subtree() {
        let store = TrackerStore::new();
        let root = sample_project(&store, "Root", None);
        let child = sample_project(&store, "Child", Some(root.id));
        let grandchild = sample_project(&store, "Grandchild", Some(child.id));

        assert!(matches!(
            store.reparent_project(root.id, Some(grandchild.id)),
            Err(StoreError::ProjectCycle { .. })
        ));
        assert!(matches!(
            store.reparent_project(root.id, Some(root.id)),
            Err(StoreError::ProjectCycle { .. })
        ));

        // A legal move rewires the child lists.
        store
            .reparent_project(grandchild.id, Some(root.id))
            .unwrap();
        assert_eq!(
            store.descendants(root.id, false),
            vec![child.id, grandchild.id]
        );
        assert_eq!(store.depth(grandchild.id), 1);

        // And back to the root level.
        let moved = store.reparent_project(grandchild.id, None).unwrap();
        assert_eq!(moved.parent, None);
        assert_eq!(store.descendants(root.id, false), vec![child.id]);
    }

    #[test]
    fn latest_progression_prefers_date_then_write_order() {
        let store = TrackerStore::new();
        let user = sample_user(&store, "ada");
        let project = sample_project(&store, "Engine", None);
        let location = store.add_location(Location {
            id: Uuid::new_v4(),
            title: "Office".to_string(),
            comment: None,
        });

        let mut early = sample_activity(&user, &project, &location);
        early.date = date(2024, 3, 1);
        early.progression = Some(80);
        store.add_activity(early).unwrap();

        let mut late_null = sample_activity(&user, &project, &location);
        late_null.date = date(2024, 3, 8);
        late_null.progression = None;
        store.add_activity(late_null).unwrap();

        // Null progressions never win, whatever their date.
        assert_eq!(store.latest_progression(project.id), Some(80));

        let mut tie_a = sample_activity(&user, &project, &location);
        tie_a.date = date(2024, 3, 5);
        tie_a.progression = Some(30);
        store.add_activity(tie_a).unwrap();
        let mut tie_b = sample_activity(&user, &project, &location);
        tie_b.date = date(2024, 3, 5);
        tie_b.progression = Some(45);
        store.add_activity(tie_b).unwrap();

        // Same date: the later write establishes the value.
        assert_eq!(store.latest_progression(project.id), Some(45));
    }

    #[test]
    fn latest_capacity_date_spans_all_records() {
        let store = TrackerStore::new();
        let user = sample_user(&store, "ada");
        assert_eq!(store.latest_capacity_date(user.id), None);

        for day in [date(2024, 3, 6), date(2024, 3, 4), date(2024, 3, 5)] {
            store
                .add_capacity(Capacity {
                    id: Uuid::new_v4(),
                    user: user.id,
                    date: day,
                    duration: TimeDelta::hours(7),
                })
                .unwrap();
        }
        assert_eq!(store.latest_capacity_date(user.id), Some(date(2024, 3, 6)));

        let other = sample_user(&store, "bob");
        assert_eq!(store.latest_capacity_date(other.id), None);
    }
}
