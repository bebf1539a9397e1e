use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

new_key_type! {
    /// Generation-tagged handle of a registered job.
    pub struct JobKey;
}

/// Group identifier for cancellable work.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaskTag(Cow<'static, str>);

impl TaskTag {
    /// Every job is registered under this tag as well as its own.
    pub const ALL: TaskTag = TaskTag(Cow::Borrowed("allWorkers"));

    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskTag {
    fn default() -> Self {
        TaskTag::ALL
    }
}

impl fmt::Debug for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskTag({})", self.0)
    }
}

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cancellable unit of in-flight work.
pub trait Job {
    /// Asks the work to stop. Must be safe to call more than once.
    fn cancel(&self);

    /// Finished jobs are pruned from the registry on the next sweep.
    fn is_finished(&self) -> bool {
        false
    }
}

/// A cancel callback that runs at most once.
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl Job for Dispose {
    fn cancel(&self) {
        self.run();
    }

    fn is_finished(&self) -> bool {
        self.is_disposed()
    }
}

struct JobEntry {
    tags: SmallVec<[TaskTag; 2]>,
    handle: Rc<dyn Job>,
}

#[derive(Default)]
pub(crate) struct JobRegistry {
    jobs: SlotMap<JobKey, JobEntry>,
}

impl JobRegistry {
    pub fn insert(&mut self, tag: TaskTag, handle: Rc<dyn Job>) -> JobKey {
        let mut tags = SmallVec::new();
        tags.push(TaskTag::ALL);
        if tag != TaskTag::ALL {
            tags.push(tag);
        }
        self.jobs.insert(JobEntry { tags, handle })
    }

    pub fn remove(&mut self, key: JobKey) -> bool {
        self.jobs.remove(key).is_some()
    }

    pub fn prune_finished(&mut self) {
        self.jobs.retain(|_, entry| !entry.handle.is_finished());
    }

    pub fn count(&self, tag: &TaskTag) -> usize {
        self.jobs
            .values()
            .filter(|e| !e.handle.is_finished() && e.tags.contains(tag))
            .count()
    }

    /// Removes every live entry carrying `tag` and hands the handles back so
    /// they can be cancelled without holding a borrow of the registry.
    pub fn take_tagged(&mut self, tag: &TaskTag) -> Vec<Rc<dyn Job>> {
        self.prune_finished();
        let keys: Vec<JobKey> = self
            .jobs
            .iter()
            .filter(|(_, e)| e.tags.contains(tag))
            .map(|(k, _)| k)
            .collect();
        keys.into_iter()
            .filter_map(|k| self.jobs.remove(k))
            .map(|e| e.handle)
            .collect()
    }

    pub fn drain(&mut self) -> Vec<Rc<dyn Job>> {
        self.jobs.drain().map(|(_, e)| e.handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting(hits: &Rc<Cell<u32>>) -> Rc<dyn Job> {
        let hits = hits.clone();
        Rc::new(Dispose::new(move || hits.set(hits.get() + 1)))
    }

    #[test]
    fn test_dispose_runs_once() {
        let hits = Rc::new(Cell::new(0));
        let d = {
            let hits = hits.clone();
            Dispose::new(move || hits.set(hits.get() + 1))
        };
        d.run();
        d.run();
        assert_eq!(hits.get(), 1);
        assert!(d.is_finished());
    }

    #[test]
    fn test_take_tagged_only_matches_tag() {
        let search = TaskTag::new("search");
        let upload = TaskTag::new("upload");
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));

        let mut reg = JobRegistry::default();
        reg.insert(search.clone(), counting(&a));
        reg.insert(search.clone(), counting(&a));
        reg.insert(upload.clone(), counting(&b));

        for job in reg.take_tagged(&search) {
            job.cancel();
        }
        assert_eq!(a.get(), 2);
        assert_eq!(b.get(), 0);
        assert_eq!(reg.count(&search), 0);
        assert_eq!(reg.count(&upload), 1);
        assert_eq!(reg.count(&TaskTag::ALL), 1);
    }

    #[test]
    fn test_finished_jobs_are_pruned() {
        let hits = Rc::new(Cell::new(0));
        let d = {
            let hits = hits.clone();
            Dispose::new(move || hits.set(hits.get() + 1))
        };
        let mut reg = JobRegistry::default();
        let key = reg.insert(TaskTag::ALL, Rc::new(d.clone()));
        d.run();
        assert!(reg.take_tagged(&TaskTag::ALL).is_empty());
        assert!(!reg.remove(key));
    }
}
