//! The scheduler's in-memory state tree: groups own tasks, tasks own
//! actions. Everything lives behind one mutex (see [`crate::worker::WorkerScheduler`]);
//! this module only implements the pure data structure and its round-robin
//! rotation discipline, described in §3 and §4.1-4.3.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::ids::{GroupId, TaskId};
use crate::worker::action::Action;

/// A single job: an ordered action history, an unexecuted suffix of that
/// history, and the lifecycle flags/status a client polls.
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub group: GroupId,
    pub actions: Vec<Action>,
    pub queued_actions: VecDeque<Action>,
    pub cleanup_action: Option<Action>,
    pub started: bool,
    pub completed: bool,
    pub failed: bool,
    pub status: String,
    pub status_override: Option<String>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_instant: Instant,
}

impl Task {
    pub fn new(id: TaskId, group: GroupId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            group,
            actions: Vec::new(),
            queued_actions: VecDeque::new(),
            cleanup_action: None,
            started: false,
            completed: false,
            failed: false,
            status: "Queued".to_string(),
            status_override: None,
            result: None,
            created_at: Utc::now(),
            created_instant: Instant::now(),
        }
    }

    /// Append an action to the history and queue, unless an identical action
    /// is already present (§4.3: set semantics).
    pub fn add_action(&mut self, action: Action) {
        if self.actions.contains(&action) {
            return;
        }
        self.actions.push(action.clone());
        self.queued_actions.push_back(action);
    }

    /// Pop the next action to execute, if any.
    pub fn next_action(&mut self) -> Option<Action> {
        self.queued_actions.pop_front()
    }

    /// The cleanup action to run on expiry/cancellation: the task's override
    /// if one was set, else a bare working-directory removal.
    pub fn get_cleanup_action(&self) -> Action {
        self.cleanup_action
            .clone()
            .unwrap_or_else(|| Action::DefaultCleanup(super::actions::default_cleanup::DefaultCleanupAction))
    }

    /// Whether this task has work remaining and hasn't failed — the
    /// condition under which it belongs in its group's active/queued sets.
    pub fn has_queue(&self) -> bool {
        !self.queued_actions.is_empty() && !self.failed
    }

    /// Percentage of the action history already executed, 0 when empty.
    pub fn progress(&self) -> u32 {
        if self.actions.is_empty() {
            return 0;
        }
        let done = self.actions.len() - self.queued_actions.len();
        ((done as f64 / self.actions.len() as f64) * 100.0).round() as u32
    }

    /// The status string a client should see: the admin override, if set,
    /// otherwise the live status.
    pub fn display_status(&self) -> &str {
        self.status_override.as_deref().unwrap_or(&self.status)
    }
}

/// A fairness bucket: one client's tasks, round-robined among themselves.
#[derive(Debug)]
pub struct Group {
    pub id: GroupId,
    tasks: HashMap<TaskId, Task>,
    active_tasks: Vec<TaskId>,
    queued_tasks: VecDeque<TaskId>,
}

impl Group {
    fn new(id: GroupId) -> Self {
        Self {
            id,
            tasks: HashMap::new(),
            active_tasks: Vec::new(),
            queued_tasks: VecDeque::new(),
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn active_task_count(&self) -> usize {
        self.active_tasks.len()
    }

    pub fn queued_task_count(&self) -> usize {
        self.queued_tasks.len()
    }

    fn add_task(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    fn remove_task(&mut self, id: &TaskId) -> Option<Task> {
        self.active_tasks.retain(|t| t != id);
        self.queued_tasks.retain(|t| t != id);
        self.tasks.remove(id)
    }

    /// Reconcile active/queued membership against each task's current
    /// `has_queue()` state.
    fn update_tasks(&mut self) {
        let ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        for id in ids {
            let should_be_active = self.tasks.get(&id).map(|t| t.has_queue()).unwrap_or(false);
            if should_be_active {
                if !self.active_tasks.contains(&id) {
                    self.active_tasks.push(id);
                }
                if !self.queued_tasks.contains(&id) {
                    self.queued_tasks.push_back(id);
                }
            } else {
                self.active_tasks.retain(|t| t != &id);
                self.queued_tasks.retain(|t| t != &id);
            }
        }
    }

    /// Whether this group currently has any task with outstanding work.
    pub fn has_queue(&self) -> bool {
        !self.active_tasks.is_empty()
    }

    /// Pop the next task to service, refilling the rotation buffer from
    /// `active_tasks` when it runs dry.
    fn next_task(&mut self) -> Option<TaskId> {
        if self.queued_tasks.is_empty() {
            self.queued_tasks = self.active_tasks.iter().copied().collect();
        }
        self.queued_tasks.pop_front()
    }
}

/// The scheduler's full state tree: every group, the top-level rotation
/// buffers, and a flat index for O(1) task lookup from HTTP handlers.
#[derive(Debug, Default)]
pub struct SchedulerState {
    groups: HashMap<GroupId, Group>,
    active_groups: Vec<GroupId>,
    queued_groups: VecDeque<GroupId>,
    task_index: HashMap<TaskId, GroupId>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a task under `group` (creating the group if it doesn't exist
    /// yet) with one seed action already queued.
    pub fn create_task(&mut self, group_id: GroupId, kind: impl Into<String>, seed: Action) -> TaskId {
        let group = self
            .groups
            .entry(group_id.clone())
            .or_insert_with(|| Group::new(group_id.clone()));

        let task_id = TaskId::new();
        let mut task = Task::new(task_id, group_id.clone(), kind);
        task.add_action(seed);
        group.add_task(task);
        self.task_index.insert(task_id, group_id);
        task_id
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: &GroupId) -> Option<&mut Group> {
        self.groups.get_mut(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        let group_id = self.task_index.get(id)?;
        self.groups.get(group_id)?.task(id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        let group_id = self.task_index.get(id)?.clone();
        self.groups.get_mut(&group_id)?.task_mut(id)
    }

    pub fn task_group(&self, id: &TaskId) -> Option<&GroupId> {
        self.task_index.get(id)
    }

    /// Remove a task from its group and the global index (§4.3 `delete_task`).
    pub fn delete_task(&mut self, id: &TaskId) -> Option<Task> {
        let group_id = self.task_index.remove(id)?;
        let group = self.groups.get_mut(&group_id)?;
        let task = group.remove_task(id);
        if group.is_empty() {
            self.groups.remove(&group_id);
            self.active_groups.retain(|g| g != &group_id);
            self.queued_groups.retain(|g| g != &group_id);
        }
        task
    }

    /// Reconcile active/queued membership at both levels, called at the top
    /// of every dispatch iteration (§4.1).
    pub fn update_groups(&mut self) {
        let ids: Vec<GroupId> = self.groups.keys().cloned().collect();
        for id in &ids {
            if let Some(g) = self.groups.get_mut(id) {
                g.update_tasks();
            }
        }
        for id in ids {
            let should_be_active = self.groups.get(&id).map(|g| g.has_queue()).unwrap_or(false);
            if should_be_active {
                if !self.active_groups.contains(&id) {
                    self.active_groups.push(id.clone());
                }
                if !self.queued_groups.contains(&id) {
                    self.queued_groups.push_back(id.clone());
                }
            } else {
                self.active_groups.retain(|g| g != &id);
                self.queued_groups.retain(|g| g != &id);
            }
        }
    }

    /// Whether any group currently has outstanding work.
    pub fn has_queue(&self) -> bool {
        !self.active_groups.is_empty()
    }

    /// Pop (group, task, action) to run next, refilling rotation buffers as
    /// needed (§4.7). Returns `None` if the scheduler is idle.
    pub fn next_action(&mut self) -> Option<(GroupId, TaskId, Action)> {
        if self.queued_groups.is_empty() {
            self.queued_groups = self.active_groups.iter().cloned().collect();
        }
        let group_id = self.queued_groups.pop_front()?;
        let group = self.groups.get_mut(&group_id)?;
        let task_id = group.next_task()?;
        let task = group.task_mut(&task_id)?;
        let action = task.next_action()?;
        Some((group_id, task_id, action))
    }

    /// Counts exposed by `GET /queue/back` (§6).
    pub fn counts(&self) -> SchedulerCounts {
        let mut counts = SchedulerCounts {
            groups: self.groups.len(),
            active_groups: self.active_groups.len(),
            queued_groups: self.queued_groups.len(),
            ..Default::default()
        };
        for g in self.groups.values() {
            counts.tasks += g.task_count();
            counts.active_tasks += g.active_task_count();
            counts.queued_tasks += g.queued_task_count();
            for t in g.tasks() {
                counts.actions += t.actions.len();
                counts.queued_actions += t.queued_actions.len();
            }
        }
        counts
    }
}

/// Aggregate counts returned by `GET /queue/back`.
#[derive(Debug, Default, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct SchedulerCounts {
    pub groups: usize,
    pub active_groups: usize,
    pub queued_groups: usize,
    pub tasks: usize,
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub actions: usize,
    pub queued_actions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::actions::default_cleanup::DefaultCleanupAction;

    fn noop() -> Action {
        Action::DefaultCleanup(DefaultCleanupAction)
    }

    #[test]
    fn queued_actions_is_suffix_of_actions() {
        let mut state = SchedulerState::new();
        let id = state.create_task(GroupId::new("1.2.3.4"), "t", noop());
        state.update_groups();
        let task = state.task_mut(&id).unwrap();
        task.add_action(noop());
        assert_eq!(task.actions.len(), 2);
        assert_eq!(task.queued_actions.len(), 2);
    }

    #[test]
    fn duplicate_action_is_not_appended_twice() {
        let mut state = SchedulerState::new();
        let id = state.create_task(GroupId::new("g"), "t", noop());
        let task = state.task_mut(&id).unwrap();
        task.add_action(noop());
        assert_eq!(task.actions.len(), 1);
    }

    #[test]
    fn fair_interleaving_across_two_groups() {
        let mut state = SchedulerState::new();
        let g1 = GroupId::new("g1");
        let g2 = GroupId::new("g2");
        let t1 = state.create_task(g1.clone(), "t", noop());
        {
            let task = state.task_mut(&t1).unwrap();
            task.add_action(noop());
            task.add_action(noop());
        }
        let t2 = state.create_task(g2.clone(), "t", noop());
        {
            let task = state.task_mut(&t2).unwrap();
            task.add_action(noop());
            task.add_action(noop());
        }

        let mut order = Vec::new();
        for _ in 0..6 {
            state.update_groups();
            let (group, task, _action) = state.next_action().expect("work remaining");
            order.push((group, task));
        }

        assert_eq!(
            order,
            vec![
                (g1.clone(), t1),
                (g2.clone(), t2),
                (g1.clone(), t1),
                (g2.clone(), t2),
                (g1, t1),
                (g2, t2),
            ]
        );
    }

    #[test]
    fn empty_scheduler_has_no_queue() {
        let state = SchedulerState::new();
        assert!(!state.has_queue());
    }

    #[test]
    fn delete_task_prunes_empty_group() {
        let mut state = SchedulerState::new();
        let g = GroupId::new("solo");
        let t = state.create_task(g.clone(), "t", noop());
        state.delete_task(&t);
        assert!(state.group(&g).is_none());
    }

    #[test]
    fn progress_is_zero_for_empty_history_and_monotonic_after() {
        let mut state = SchedulerState::new();
        let g = GroupId::new("g");
        let t = state.create_task(g, "t", noop());
        let task = state.task(&t).unwrap();
        assert_eq!(task.progress(), 0);

        state.update_groups();
        let (_, _, _) = state.next_action().unwrap();
        let task = state.task_mut(&t).unwrap();
        task.completed = true;
        assert_eq!(task.progress(), 100);
    }
}
