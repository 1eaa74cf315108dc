//! This module provides the vocabulary shared by the [`TestingActorRuntime`] and the
//! [`Scheduler`] policies: actor identifiers, the [`Operation`]s that actors announce at each
//! scheduling point, and the [`Mailbox`] through which actors communicate.
//!
//! Every blocking primitive an actor calls is reported to the runtime as an [`Operation`], which
//! is the only thing the exploration engine ever observes about the program under test. A
//! scheduler sees one [`ActorSnapshot`] per actor at each step.
//!
//! [`TestingActorRuntime`]: crate::TestingActorRuntime
//! [`Scheduler`]: crate::Scheduler

mod mailbox;
mod record;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

pub use mailbox::*;
pub(crate) use record::ActorRecord;
pub use record::ActorStatus;

/// Uniquely identifies an actor within one execution. Identifiers are assigned in creation order
/// starting from the root actor (`ActorId(0)`), so a deterministic program receives the same
/// identifiers every time a schedule is replayed.
#[derive(
    Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct ActorId(usize);

impl Debug for ActorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // KLUDGE: work around the issue identified in https://github.com/rust-lang/rfcs/pull/1198
        //         by not conveying that `ActorId` is a struct.
        f.write_fmt(format_args!("ActorId({})", self.0))
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl ActorId {
    /// The root actor, which runs the test action itself.
    pub const MAIN: ActorId = ActorId(0);

    /// Generates a [`Vec`] of [`ActorId`]s based on an iterator.
    ///
    /// # Example
    ///
    /// ```
    /// use actorcheck::ActorId;
    /// let ids = ActorId::vec_from(0..3);
    /// assert_eq!(ids[2], ActorId::from(2));
    /// ```
    pub fn vec_from<T>(ids: impl IntoIterator<Item = T>) -> Vec<ActorId>
    where
        T: Into<ActorId>,
    {
        ids.into_iter().map(Into::into).collect()
    }
}

impl From<ActorId> for usize {
    fn from(id: ActorId) -> Self {
        id.0
    }
}

impl From<usize> for ActorId {
    fn from(u: usize) -> Self {
        ActorId(u)
    }
}

/// The kind of scheduling point an actor has reached.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum OpType {
    Invalid,
    Start,
    End,
    Create,
    Join,
    Send,
    Receive,
    WaitForDeadlock,
    Yield,
}

impl OpType {
    /// Whether executing this operation counts as progress, which releases actors that
    /// voluntarily yielded.
    pub fn is_progress(self) -> bool {
        !matches!(self, OpType::Invalid | OpType::Yield | OpType::WaitForDeadlock)
    }
}

/// What an operation touches. Used only to decide whether two operations are dependent.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum TargetKind {
    Thread,
    Queue,
}

/// An operation descriptor: the operation type plus the target it touches. `target` is [`None`]
/// for operations whose target is not yet known (e.g. [`OpType::Create`], whose child has no
/// identifier until the operation executes).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op_type: OpType,
    pub target_kind: TargetKind,
    pub target: Option<ActorId>,
}

impl Operation {
    pub const INVALID: Operation = Operation {
        op_type: OpType::Invalid,
        target_kind: TargetKind::Thread,
        target: None,
    };

    pub fn new(op_type: OpType, target_kind: TargetKind, target: Option<ActorId>) -> Self {
        Operation { op_type, target_kind, target }
    }

    pub fn start(id: ActorId) -> Self {
        Self::new(OpType::Start, TargetKind::Thread, Some(id))
    }

    pub fn end(id: ActorId) -> Self {
        Self::new(OpType::End, TargetKind::Thread, Some(id))
    }

    pub fn create() -> Self {
        Self::new(OpType::Create, TargetKind::Thread, None)
    }

    pub fn join(other: ActorId) -> Self {
        Self::new(OpType::Join, TargetKind::Thread, Some(other))
    }

    pub fn send(owner: ActorId) -> Self {
        Self::new(OpType::Send, TargetKind::Queue, Some(owner))
    }

    pub fn receive(owner: ActorId) -> Self {
        Self::new(OpType::Receive, TargetKind::Queue, Some(owner))
    }

    pub fn yield_now(id: ActorId) -> Self {
        Self::new(OpType::Yield, TargetKind::Thread, Some(id))
    }

    pub fn wait_for_deadlock(id: ActorId) -> Self {
        Self::new(OpType::WaitForDeadlock, TargetKind::Thread, Some(id))
    }

    /// Two operations are dependent only if they touch the same target. Operations on the same
    /// queue are dependent only when both are sends: a send has to enable a receive to be
    /// dependent with it, and receives on one queue always come from its single owner.
    ///
    /// The dependency between a create and the start of its child is not detected (the create
    /// has no target), which is fine because only enabled operations are ever compared.
    pub fn is_dependent(&self, other: &Operation) -> bool {
        let (lhs, rhs) = match (self.target, other.target) {
            (Some(lhs), Some(rhs)) => (lhs, rhs),
            _ => return false,
        };
        if lhs != rhs || self.target_kind != other.target_kind {
            return false;
        }
        match self.target_kind {
            TargetKind::Queue => self.op_type == OpType::Send && other.op_type == OpType::Send,
            TargetKind::Thread => true,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(target) => write!(f, "{:?}, {:?}-{}", self.op_type, self.target_kind, target),
            None => write!(f, "{:?}, {:?}-none", self.op_type, self.target_kind),
        }
    }
}

/// The state of one actor at one scheduling point, as seen by a [`Scheduler`].
///
/// `send_step_index` is only set for an enabled [`OpType::Receive`]: it is the step at which the
/// message that the receive will consume was sent.
///
/// [`Scheduler`]: crate::Scheduler
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub enabled: bool,
    pub op: Operation,
    pub send_step_index: Option<usize>,
}

impl Display for ActorSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.id, self.op)
    }
}

/// Renders the live actors at a scheduling point. Enabled actors are indented and the selected
/// actor is marked with `>`.
pub struct ActorList<'a> {
    actors: &'a [ActorSnapshot],
    selected: Option<ActorId>,
}

impl<'a> ActorList<'a> {
    pub fn new(actors: &'a [ActorSnapshot], selected: Option<ActorId>) -> Self {
        ActorList { actors, selected }
    }
}

impl Display for ActorList<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for actor in self.actors {
            if actor.op.op_type == OpType::End && !actor.enabled {
                continue;
            }
            let prefix = if Some(actor.id) == self.selected {
                ">  "
            } else if actor.enabled {
                "   "
            } else {
                ""
            };
            writeln!(f, "{}{}", prefix, actor)?;
        }
        Ok(())
    }
}

/// Errors surfaced to actor code. Most are returned from the actor primitives and propagated
/// with `?` out of an actor body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ActorError {
    /// The execution has ended (completion, deadlock, or an exploration dead end). Returned by
    /// every primitive once the run is over so that parked actors unwind. Never a bug by itself.
    Terminated,
    /// The actor cancelled itself.
    Cancelled,
    /// A mailbox was received from by an actor other than its owner.
    NotOwner { owner: ActorId, caller: ActorId },
    /// The root actor was still blocked when no actor could make progress.
    Deadlock,
    /// An actor body returned an error.
    Fault(String),
    /// An actor body panicked.
    Panicked(String),
    /// The faults of a joined actor.
    Joined { actor: ActorId, faults: Vec<ActorError> },
}

impl ActorError {
    /// Convenience constructor for [`ActorError::Fault`].
    pub fn fault(msg: impl Into<String>) -> Self {
        ActorError::Fault(msg.into())
    }
}

impl Display for ActorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ActorError::Terminated => write!(f, "Actor terminated because the execution ended."),
            ActorError::Cancelled => write!(f, "Actor was cancelled."),
            ActorError::NotOwner { owner, caller } => write!(
                f,
                "Only the owner can receive from a mailbox. owner={}, caller={}",
                owner, caller
            ),
            ActorError::Deadlock => write!(f, "Main actor did not terminate."),
            ActorError::Fault(msg) => write!(f, "{}", msg),
            ActorError::Panicked(msg) => write!(f, "Actor panicked: {}", msg),
            ActorError::Joined { actor, faults } => {
                write!(f, "Joined actor {} failed:", actor)?;
                for fault in faults {
                    write!(f, " [{}]", fault)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ActorError {}
