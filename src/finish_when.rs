/// When a [`TestLauncher`](crate::TestLauncher) stops exploring early.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FinishWhen {
    /// Stop at the first bug.
    AnyBug,
    /// Stop once this many executions have found bugs.
    BugCount(usize),
    /// Keep going until the scheduler has nothing left to explore or the iteration limit is hit.
    Exhausted,
}

impl FinishWhen {
    pub fn matches(&self, bug_count: usize) -> bool {
        match self {
            FinishWhen::AnyBug => bug_count > 0,
            FinishWhen::BugCount(count) => bug_count >= *count,
            FinishWhen::Exhausted => false,
        }
    }
}

impl Default for FinishWhen {
    fn default() -> Self {
        FinishWhen::AnyBug
    }
}
