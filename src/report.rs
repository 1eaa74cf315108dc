use std::fmt::{self, Display, Formatter};
use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ActorId;

/// The data sent during a report event.
pub struct ReportData {
    /// The number of executions so far.
    pub schedules: usize,
    /// The number of executions that found a bug.
    pub bugs: usize,
    /// Executions cut short because every enabled actor was asleep.
    pub sleep_set_blocked: usize,
    /// Executions cut short by the step limit.
    pub step_limit_hits: usize,
    /// The longest execution, in steps.
    pub max_steps: usize,
    /// The current duration exploration has been running for.
    pub duration: Duration,
    /// Whether exploration is done.
    pub done: bool,
}

/// The actor chosen at each step of one execution. Feeding a trace to a
/// [`ReplayScheduler`](crate::ReplayScheduler) reproduces the execution.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTrace {
    pub steps: Vec<ActorId>,
}

impl ScheduleTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<Vec<ActorId>> for ScheduleTrace {
    fn from(steps: Vec<ActorId>) -> Self {
        ScheduleTrace { steps }
    }
}

impl Display for ScheduleTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "]")
    }
}

/// A bug found during exploration, with the schedule that exposed it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BugReport {
    /// The execution (starting from `0`) that found the bug.
    pub iteration: usize,
    pub error: String,
    pub trace: ScheduleTrace,
}

/// A reporter for progress during exploration.
pub trait Reporter {
    /// Report a progress event.
    fn report_exploring(&mut self, data: ReportData);

    /// Report the bugs at the end of exploration.
    fn report_bugs(&mut self, bugs: &[BugReport]);
}

pub struct WriteReporter<'a, W> {
    writer: &'a mut W,
}

impl<'a, W> WriteReporter<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W> Reporter for WriteReporter<'a, W>
where
    W: Write,
{
    fn report_exploring(&mut self, data: ReportData) {
        if data.done {
            let _ = writeln!(
                self.writer,
                "Done. schedules={}, bugs={}, sleep blocked={}, step limit hits={}, max steps={}, sec={}",
                data.schedules,
                data.bugs,
                data.sleep_set_blocked,
                data.step_limit_hits,
                data.max_steps,
                data.duration.as_secs(),
            );
        } else {
            let _ = writeln!(
                self.writer,
                "Exploring. schedules={}, bugs={}, sleep blocked={}, step limit hits={}, max steps={}",
                data.schedules, data.bugs, data.sleep_set_blocked, data.step_limit_hits, data.max_steps
            );
        }
    }

    fn report_bugs(&mut self, bugs: &[BugReport]) {
        for bug in bugs {
            let _ = writeln!(
                self.writer,
                "Bug in schedule {}: {} trace={}",
                bug.iteration, bug.error, bug.trace,
            );
        }
    }
}
