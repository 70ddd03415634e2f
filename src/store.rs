use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Job, JobStatus, UserProfile};
use crate::stats::{Stats, compute_stats};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub jobs: Vec<Job>,
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Clone)]
pub enum Action {
    SetJobs(Vec<Job>),
    AddJob(Job),
    UpdateJob(Job),
    RemoveJob(Uuid),
    SetStatus { id: Uuid, status: JobStatus, today: NaiveDate },
    SetProfile(Option<UserProfile>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
pub struct Rollback {
    id: Uuid,
    previous: Job,
}

type Listener = Box<dyn FnMut(&StoreState)>;

#[derive(Default)]
pub struct JobStore {
    state: StoreState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let mut store = Self::new();
        store.state.jobs = jobs;
        store
    }

    pub fn jobs(&self) -> &[Job] {
        &self.state.jobs
    }

    pub fn job(&self, id: Uuid) -> Option<&Job> {
        self.state.jobs.iter().find(|j| j.id == id)
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.state.profile.as_ref()
    }

    pub fn stats(&self) -> Stats {
        compute_stats(&self.state.jobs)
    }

    // false when the action names a job not in the store; listeners don't run
    pub fn dispatch(&mut self, action: Action) -> bool {
        let applied = match action {
            Action::SetJobs(jobs) => {
                self.state.jobs = jobs;
                true
            }
            Action::AddJob(job) => {
                self.state.jobs.insert(0, job);
                true
            }
            Action::UpdateJob(job) => match self.position(job.id) {
                Some(index) => {
                    self.state.jobs[index] = job;
                    true
                }
                None => false,
            },
            Action::RemoveJob(id) => match self.position(id) {
                Some(index) => {
                    self.state.jobs.remove(index);
                    true
                }
                None => false,
            },
            Action::SetStatus { id, status, today } => match self.position(id) {
                Some(index) => {
                    self.state.jobs[index].transition(status, today);
                    true
                }
                None => false,
            },
            Action::SetProfile(profile) => {
                self.state.profile = profile;
                true
            }
        };

        if applied {
            self.notify();
        } else {
            debug!("store action ignored: unknown job");
        }
        applied
    }

    pub fn set_status_optimistic(
        &mut self,
        id: Uuid,
        status: JobStatus,
        today: NaiveDate,
    ) -> Option<Rollback> {
        let previous = self.job(id)?.clone();
        self.dispatch(Action::SetStatus { id, status, today });
        Some(Rollback { id, previous })
    }

    pub fn rollback(&mut self, rollback: Rollback) {
        debug!(job = %rollback.id, "rolling back optimistic update");
        self.dispatch(Action::UpdateJob(rollback.previous));
    }

    // the listener runs only when the selected value changes
    pub fn subscribe<T, S, L>(&mut self, selector: S, mut listener: L) -> SubscriptionId
    where
        T: PartialEq + 'static,
        S: Fn(&StoreState) -> T + 'static,
        L: FnMut(&T) + 'static,
    {
        let mut last = selector(&self.state);
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((
            id,
            Box::new(move |state: &StoreState| {
                let current = selector(state);
                if current != last {
                    listener(&current);
                    last = current;
                }
            }),
        ));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(sub, _)| *sub != id);
    }

    fn notify(&mut self) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.state);
        }
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.state.jobs.iter().position(|j| j.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_add_update_remove() {
        let mut store = JobStore::new();
        let job = Job::new("Acme", "Engineer");
        let id = job.id;

        assert!(store.dispatch(Action::AddJob(job.clone())));
        assert_eq!(store.jobs().len(), 1);

        let mut edited = job;
        edited.title = "Senior Engineer".to_string();
        assert!(store.dispatch(Action::UpdateJob(edited)));
        assert_eq!(store.job(id).unwrap().title, "Senior Engineer");

        assert!(store.dispatch(Action::RemoveJob(id)));
        assert!(store.jobs().is_empty());
        assert!(!store.dispatch(Action::RemoveJob(id)));
    }

    #[test]
    fn test_new_jobs_go_first() {
        let mut store = JobStore::new();
        let first = Job::new("A", "One");
        let second = Job::new("B", "Two");
        store.dispatch(Action::AddJob(first));
        store.dispatch(Action::AddJob(second.clone()));
        assert_eq!(store.jobs()[0].id, second.id);
    }

    #[test]
    fn test_selector_listener_fires_only_on_change() {
        let mut store = JobStore::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(
            |state: &StoreState| compute_stats(&state.jobs).interviewing,
            move |count: &usize| sink.borrow_mut().push(*count),
        );

        let job = Job::new("Acme", "Engineer");
        let id = job.id;
        store.dispatch(Action::AddJob(job));
        assert!(seen.borrow().is_empty());

        store.dispatch(Action::SetStatus { id, status: JobStatus::Interview, today: today() });
        store.dispatch(Action::SetStatus { id, status: JobStatus::Technical, today: today() });
        store.dispatch(Action::SetStatus { id, status: JobStatus::Offer, today: today() });
        assert_eq!(*seen.borrow(), vec![1, 0]);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut store = JobStore::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let sub = store.subscribe(
            |state: &StoreState| state.jobs.len(),
            move |_: &usize| *counter.borrow_mut() += 1,
        );
        store.dispatch(Action::AddJob(Job::new("A", "One")));
        store.unsubscribe(sub);
        store.dispatch(Action::AddJob(Job::new("B", "Two")));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_optimistic_status_rollback() {
        let job = Job::new("Acme", "Engineer");
        let id = job.id;
        let mut store = JobStore::with_jobs(vec![job]);

        let rollback = store
            .set_status_optimistic(id, JobStatus::Applied, today())
            .unwrap();
        assert_eq!(store.job(id).unwrap().status, JobStatus::Applied);
        assert_eq!(store.job(id).unwrap().applied_date, Some(today()));

        store.rollback(rollback);
        assert_eq!(store.job(id).unwrap().status, JobStatus::Saved);
        assert!(store.job(id).unwrap().applied_date.is_none());
    }

    #[test]
    fn test_optimistic_on_missing_job_is_none() {
        let mut store = JobStore::new();
        assert!(store
            .set_status_optimistic(Uuid::new_v4(), JobStatus::Offer, today())
            .is_none());
    }

    #[test]
    fn test_stats_selector() {
        let mut job = Job::new("Acme", "Engineer");
        job.status = JobStatus::Offer;
        let store = JobStore::with_jobs(vec![job]);
        assert_eq!(store.stats().offers, 1);
        assert_eq!(store.stats().response_rate, 100);
    }
}
