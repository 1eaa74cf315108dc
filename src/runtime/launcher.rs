//! Private module for selective re-export.

use crate::actor::{ActorError, ActorId, ActorStatus};
use crate::report::{BugReport, ReportData, Reporter, ScheduleTrace};
use crate::scheduler::Scheduler;
use crate::{FinishWhen, TestingActorRuntime};
use parking_lot::{Mutex, MutexGuard};
use std::cmp::max;
use std::panic;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How one execution ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecutionOutcome {
    /// Every actor that could finish did, and the root actor returned successfully.
    Completed,
    Bug(ActorError),
    /// Exploration found the rest of the execution redundant.
    SleepSetBlocked,
    HitStepLimit,
}

/// The result of a single execution.
#[derive(Clone, Debug)]
pub struct Execution {
    pub outcome: ExecutionOutcome,
    pub trace: ScheduleTrace,
    pub actors: Vec<ActorStatus>,
    /// Actors that were still blocked when no actor could run. Non-empty alongside
    /// [`ExecutionOutcome::Completed`] when the root actor returned but left actors blocked
    /// forever.
    pub deadlocked: Vec<ActorId>,
    pub max_enabled: usize,
}

impl Execution {
    pub fn is_bug(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Bug(_))
    }
}

/// Aggregate statistics for a run of [`TestLauncher::explore`].
#[derive(Clone, Debug, Default)]
pub struct ExplorationReport {
    pub schedules: usize,
    pub bugs: Vec<BugReport>,
    pub sleep_set_blocked: usize,
    pub step_limit_hits: usize,
    /// Completed executions that left actors other than the root blocked forever.
    pub blocked_actor_executions: usize,
    /// Whether the scheduler ran out of schedules to explore.
    pub exhausted: bool,
    pub max_steps: usize,
    pub max_actors: usize,
    pub max_enabled_actors: usize,
    pub duration: Duration,
}

impl ExplorationReport {
    pub fn first_bug(&self) -> Option<&BugReport> {
        self.bugs.first()
    }
}

/// Executes a test action repeatedly under a [`Scheduler`], one execution per schedule.
///
/// The test action is the body of the root actor. It receives the execution's runtime, creates
/// the actors under test, and returns an error (or panics) to report a bug.
///
/// ```
/// use actorcheck::*;
///
/// let mut launcher = TestLauncher::new(SchedulerConfig::default().dfs());
/// let report = launcher.explore(|runtime| {
///     let echo = runtime.create(|mailbox: Mailbox<u32>| {
///         mailbox.receive()?;
///         Ok(())
///     })?;
///     echo.send(42)?;
///     runtime.wait_for_actor(&echo)
/// });
/// assert!(report.exhausted);
/// assert!(report.bugs.is_empty());
/// ```
pub struct TestLauncher<S> {
    scheduler: Arc<Mutex<S>>,
    max_iterations: Option<usize>,
    finish_when: FinishWhen,
}

impl<S> TestLauncher<S>
where
    S: Scheduler + 'static,
{
    pub fn new(scheduler: S) -> Self {
        TestLauncher {
            scheduler: Arc::new(Mutex::new(scheduler)),
            max_iterations: None,
            finish_when: FinishWhen::default(),
        }
    }

    /// Stops after this many executions.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn finish_when(mut self, finish_when: FinishWhen) -> Self {
        self.finish_when = finish_when;
        self
    }

    pub fn scheduler(&self) -> MutexGuard<'_, S> {
        self.scheduler.lock()
    }

    /// Runs the test action once under the scheduler's current schedule. Does not advance the
    /// scheduler.
    ///
    /// Panics if the exploration engine itself fails, for example because the program under test
    /// behaves nondeterministically.
    pub fn execute<F>(&self, test: &F) -> Execution
    where
        F: Fn(&TestingActorRuntime) -> Result<(), ActorError> + Sync,
    {
        let scheduler: Arc<Mutex<dyn Scheduler>> = self.scheduler.clone();
        let runtime = TestingActorRuntime::new(scheduler);
        let main_panic = crossbeam_utils::thread::scope(|scope| {
            scope
                .builder()
                .name("actor-0".to_owned())
                .spawn(|_| runtime.run_main(test))
                .expect("Failed to spawn a thread")
                .join()
                .err()
        })
        .unwrap_or_else(Some);
        let actor_panic = runtime.join_actors();
        if let Some(payload) = main_panic.or(actor_panic) {
            panic::resume_unwind(payload);
        }

        let outcome = if let Some(error) = runtime.error() {
            ExecutionOutcome::Bug(error)
        } else if runtime.was_sleep_set_blocked() {
            ExecutionOutcome::SleepSetBlocked
        } else if runtime.hit_step_limit() {
            ExecutionOutcome::HitStepLimit
        } else {
            ExecutionOutcome::Completed
        };
        Execution {
            outcome,
            trace: ScheduleTrace::from(runtime.trace()),
            actors: runtime.statuses(),
            deadlocked: runtime.deadlocked(),
            max_enabled: runtime.max_enabled(),
        }
    }

    /// Explores schedules until the scheduler is exhausted, the iteration limit is reached, or
    /// the [`FinishWhen`] condition holds.
    pub fn explore<F>(&mut self, test: F) -> ExplorationReport
    where
        F: Fn(&TestingActorRuntime) -> Result<(), ActorError> + Sync,
    {
        self.explore_inner(test, None)
    }

    /// Same as [`TestLauncher::explore`], but reports progress about once per second and the
    /// bugs at the end.
    pub fn explore_and_report<F>(
        &mut self,
        test: F,
        reporter: &mut dyn Reporter,
    ) -> ExplorationReport
    where
        F: Fn(&TestingActorRuntime) -> Result<(), ActorError> + Sync,
    {
        self.explore_inner(test, Some(reporter))
    }

    fn explore_inner<F>(&mut self, test: F, mut reporter: Option<&mut dyn Reporter>) -> ExplorationReport
    where
        F: Fn(&TestingActorRuntime) -> Result<(), ActorError> + Sync,
    {
        let method_start = Instant::now();
        let mut last_report = Instant::now();
        let mut report = ExplorationReport::default();
        loop {
            let iteration = report.schedules;
            let execution = self.execute(&test);
            log::debug!(
                "Execution {} finished. outcome={:?}, steps={}",
                iteration,
                execution.outcome,
                execution.trace.len()
            );
            report.schedules += 1;
            report.max_steps = max(report.max_steps, execution.trace.len());
            report.max_actors = max(report.max_actors, execution.actors.len());
            report.max_enabled_actors = max(report.max_enabled_actors, execution.max_enabled);
            match execution.outcome {
                ExecutionOutcome::Bug(error) => report.bugs.push(BugReport {
                    iteration,
                    error: error.to_string(),
                    trace: execution.trace,
                }),
                ExecutionOutcome::SleepSetBlocked => report.sleep_set_blocked += 1,
                ExecutionOutcome::HitStepLimit => report.step_limit_hits += 1,
                ExecutionOutcome::Completed if !execution.deadlocked.is_empty() => {
                    report.blocked_actor_executions += 1;
                }
                ExecutionOutcome::Completed => {}
            }

            if let Some(reporter) = reporter.as_mut() {
                if last_report.elapsed().as_secs() > 0 {
                    last_report = Instant::now();
                    reporter.report_exploring(report_data(&report, method_start, false));
                }
            }

            if self.finish_when.matches(report.bugs.len()) {
                break;
            }
            if !self.scheduler.lock().next_schedule() {
                report.exhausted = true;
                break;
            }
            if matches!(self.max_iterations, Some(limit) if report.schedules >= limit) {
                break;
            }
        }
        report.duration = method_start.elapsed();
        log::info!(
            "Exploration done. schedules={}, bugs={}, exhausted={}",
            report.schedules,
            report.bugs.len(),
            report.exhausted
        );
        if let Some(reporter) = reporter {
            reporter.report_exploring(report_data(&report, method_start, true));
            reporter.report_bugs(&report.bugs);
        }
        report
    }
}

fn report_data(report: &ExplorationReport, method_start: Instant, done: bool) -> ReportData {
    ReportData {
        schedules: report.schedules,
        bugs: report.bugs.len(),
        sleep_set_blocked: report.sleep_set_blocked,
        step_limit_hits: report.step_limit_hits,
        max_steps: report.max_steps,
        duration: method_start.elapsed(),
        done,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{counter, hello, mutual_receive, senders};
    use crate::{Mailbox, SchedulerConfig};
    use std::collections::{BTreeSet, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn arrivals() -> Arc<Mutex<Vec<Vec<usize>>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn distinct(arrivals: &Mutex<Vec<Vec<usize>>>) -> BTreeSet<Vec<usize>> {
        arrivals.lock().iter().cloned().collect()
    }

    #[test]
    fn random_exploration_is_reproducible() {
        let traces = |seed| {
            let launcher = TestLauncher::new(SchedulerConfig::default().seed(seed).random());
            let mut traces = Vec::new();
            for _ in 0..200 {
                traces.push(launcher.execute(&hello::program).trace);
                assert!(launcher.scheduler().next_schedule());
            }
            traces
        };
        let first = traces(7);
        assert_eq!(first, traces(7));
        assert!(first.iter().collect::<HashSet<_>>().len() > 1);
    }

    #[test]
    fn can_explore_hello_exhaustively() {
        let report = TestLauncher::new(SchedulerConfig::default().dfs()).explore(hello::program);
        assert!(report.exhausted);
        assert!(report.bugs.is_empty());
        // Each mailbox has a single sender, so no two sends race.
        assert_eq!(report.schedules, 1);
        assert_eq!(report.max_actors, 2);
        assert_eq!(report.step_limit_hits, 0);
    }

    #[test]
    fn dpor_explores_each_order_of_racing_sends() {
        let seen = arrivals();
        let report = TestLauncher::new(SchedulerConfig::default().dfs())
            .finish_when(FinishWhen::Exhausted)
            .explore(senders::program(2, seen.clone()));
        assert!(report.exhausted);
        assert_eq!(report.schedules, 2);
        assert_eq!(
            distinct(&seen),
            vec![vec![0, 1], vec![1, 0]].into_iter().collect::<BTreeSet<_>>()
        );

        let seen = arrivals();
        let report = TestLauncher::new(SchedulerConfig::default().dfs())
            .finish_when(FinishWhen::Exhausted)
            .explore(senders::program(3, seen.clone()));
        assert!(report.exhausted);
        assert!(report.bugs.is_empty());
        assert_eq!(report.schedules, 6);
        assert_eq!(distinct(&seen).len(), 6);
    }

    #[test]
    fn reduction_prunes_schedules() {
        let seen = arrivals();
        let reduced = TestLauncher::new(SchedulerConfig::default().dfs())
            .explore(senders::program(2, seen.clone()));
        let seen = arrivals();
        let full = TestLauncher::new(SchedulerConfig::default().dpor(false).sleep_sets(false).dfs())
            .explore(senders::program(2, seen.clone()));
        assert!(full.exhausted);
        assert_eq!(distinct(&seen).len(), 2);
        assert!(full.schedules > reduced.schedules, "{} vs {}", full.schedules, reduced.schedules);
    }

    #[test]
    fn can_find_and_replay_lost_update() {
        let program = counter::program(2, false);
        let report = TestLauncher::new(SchedulerConfig::default().dfs())
            .max_iterations(10_000)
            .explore(&program);
        let bug = report.first_bug().expect("lost update not found").clone();
        assert_eq!(bug.error, "Lost update. expected=2, actual=1");

        let replay = TestLauncher::new(SchedulerConfig::default().replay(bug.trace.clone()));
        let execution = replay.execute(&program);
        assert_eq!(execution.outcome, ExecutionOutcome::Bug(ActorError::fault(bug.error)));
        assert_eq!(execution.trace, bug.trace);
    }

    #[test]
    fn locked_counter_has_no_bugs() {
        let report = TestLauncher::new(SchedulerConfig::default().dfs())
            .finish_when(FinishWhen::Exhausted)
            .explore(counter::program(2, true));
        assert!(report.exhausted);
        assert!(report.bugs.is_empty(), "{:?}", report.first_bug());
        // The only racing sends are the two lock requests, and the second lock request against
        // the first worker's unlock. Every cell access is ordered by the lock. Two lock orders
        // times two arrival orders at the monitor gives four schedules.
        assert_eq!(report.schedules, 4);
        assert_eq!(report.max_actors, 5);

        let report = TestLauncher::new(SchedulerConfig::default().dfs())
            .finish_when(FinishWhen::Exhausted)
            .explore(counter::program(3, true));
        assert!(report.exhausted);
        assert!(report.bugs.is_empty(), "{:?}", report.first_bug());
        assert_eq!(report.schedules, 31);
    }

    #[test]
    fn counts_executions_that_leave_actors_blocked() {
        let report = TestLauncher::new(SchedulerConfig::default().dfs()).explore(|runtime| {
            runtime.create(|mailbox: Mailbox<()>| mailbox.receive())?;
            Ok(())
        });
        assert!(report.exhausted);
        assert!(report.bugs.is_empty());
        assert_eq!(report.blocked_actor_executions, report.schedules);
    }

    #[test]
    fn can_report_deadlock() {
        let report = TestLauncher::new(SchedulerConfig::default().dfs())
            .explore(mutual_receive::program);
        assert_eq!(report.schedules, 1);
        let bug = report.first_bug().unwrap();
        assert_eq!(bug.iteration, 0);
        assert_eq!(bug.error, "Main actor did not terminate.");
    }

    #[test]
    fn can_finish_after_bug_count() {
        let report = TestLauncher::new(SchedulerConfig::default().random())
            .finish_when(FinishWhen::BugCount(3))
            .max_iterations(100)
            .explore(mutual_receive::program);
        assert_eq!(report.schedules, 3);
        assert_eq!(report.bugs.len(), 3);
        assert!(!report.exhausted);
    }

    #[test]
    fn pct_samples_both_orders() {
        let seen = arrivals();
        let report = TestLauncher::new(SchedulerConfig::default().seed(3).pct())
            .finish_when(FinishWhen::Exhausted)
            .max_iterations(100)
            .explore(senders::program(2, seen.clone()));
        assert_eq!(report.schedules, 100);
        assert_eq!(distinct(&seen).len(), 2);
    }

    #[test]
    fn randomized_race_reversal_samples_both_orders() {
        let seen = arrivals();
        let report = TestLauncher::new(SchedulerConfig::default().seed(5).randomized(true).dfs())
            .finish_when(FinishWhen::Exhausted)
            .max_iterations(50)
            .explore(senders::program(2, seen.clone()));
        assert_eq!(report.schedules, 50);
        assert!(report.bugs.is_empty());
        assert_eq!(distinct(&seen).len(), 2);
    }

    #[test]
    fn counts_step_limit_hits() {
        let report = TestLauncher::new(SchedulerConfig::default().step_limit(Some(3)).random())
            .finish_when(FinishWhen::Exhausted)
            .max_iterations(5)
            .explore(hello::program);
        assert_eq!(report.step_limit_hits, 5);
        assert!(report.bugs.is_empty());
    }

    #[test]
    fn can_report_progress() {
        let mut written = Vec::new();
        let report = TestLauncher::new(SchedulerConfig::default().dfs())
            .explore_and_report(mutual_receive::program, &mut crate::WriteReporter::new(&mut written));
        assert_eq!(report.bugs.len(), 1);
        let written = String::from_utf8(written).unwrap();
        assert!(written.starts_with("Done. schedules=1, bugs=1,"), "{}", written);
        assert!(written.contains("Bug in schedule 0: Main actor did not terminate."));
    }

    #[test]
    #[should_panic(expected = "Unable to replay a recorded schedule prefix")]
    fn rejects_nondeterministic_programs() {
        let calls = AtomicUsize::new(0);
        let seen = arrivals();
        let program = senders::program(2, seen);
        TestLauncher::new(SchedulerConfig::default().dfs()).explore(move |runtime| {
            if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                runtime.create(|_: Mailbox<()>| Ok(()))?;
            }
            program(runtime)
        });
    }

    #[test]
    fn execution_reports_actor_statuses() {
        let execution = TestLauncher::new(SchedulerConfig::default().dfs()).execute(&hello::program);
        assert!(!execution.is_bug());
        let ids: Vec<ActorId> = execution.actors.iter().map(|a| a.id).collect();
        assert_eq!(ids, ActorId::vec_from([0, 1]));
        assert!(execution.max_enabled >= 1);
    }
}
