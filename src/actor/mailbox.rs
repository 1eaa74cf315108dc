//! Private module for selective re-export.

use crate::actor::{ActorError, ActorId, ActorRecord, Operation};
use crate::TestingActorRuntime;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Weak};

/// A FIFO message queue owned by exactly one actor. Any actor may [`send`](Mailbox::send), but
/// only the owner may [`receive`](Mailbox::receive). Handles are cheap to clone and can be sent
/// inside messages.
pub struct Mailbox<T> {
    owner: ActorId,
    owner_record: Weak<ActorRecord>,
    queue: Arc<Mutex<MailboxQueue<T>>>,
    runtime: TestingActorRuntime,
}

struct MailboxQueue<T> {
    messages: VecDeque<Envelope<T>>,
    receiver_parked: bool,
}

/// A message plus the step at which it was sent.
struct Envelope<T> {
    send_step: usize,
    msg: T,
}

impl<T> Mailbox<T> {
    pub(crate) fn new(owner: &Arc<ActorRecord>, runtime: TestingActorRuntime) -> Self {
        Mailbox {
            owner: owner.id,
            owner_record: Arc::downgrade(owner),
            queue: Arc::new(Mutex::new(MailboxQueue {
                messages: VecDeque::new(),
                receiver_parked: false,
            })),
            runtime,
        }
    }

    /// The actor that may receive from this mailbox.
    pub fn owner(&self) -> ActorId {
        self.owner
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues a message. This is a scheduling point, and if the owner is parked on an empty
    /// queue then the owner becomes enabled.
    pub fn send(&self, msg: T) -> Result<(), ActorError> {
        self.runtime.schedule(Operation::send(self.owner))?;
        let send_step = self.runtime.current_step();
        let mut queue = self.queue.lock();
        queue.messages.push_back(Envelope { send_step, msg });
        log::trace!(
            "Sent. queue={}, step={}, len={}",
            self.owner,
            send_step,
            queue.messages.len()
        );
        if queue.receiver_parked {
            queue.receiver_parked = false;
            if let Some(owner) = self.owner_record.upgrade() {
                let mut state = owner.lock();
                if state.enabled {
                    crate::engine_fault(format!(
                        "Receiver was parked but enabled. queue={}",
                        self.owner
                    ));
                }
                state.enabled = true;
                state.send_step_index = Some(send_step);
            }
        }
        Ok(())
    }

    /// Dequeues the oldest message, blocking while the queue is empty. Only the owner may call
    /// this.
    pub fn receive(&self) -> Result<T, ActorError> {
        let caller = self.runtime.current_actor();
        if caller != self.owner {
            return Err(ActorError::NotOwner {
                owner: self.owner,
                caller,
            });
        }
        let owner = match self.owner_record.upgrade() {
            Some(owner) => owner,
            None => return Err(ActorError::Terminated),
        };
        {
            let mut queue = self.queue.lock();
            let mut state = owner.lock();
            match queue.messages.front() {
                Some(envelope) => state.send_step_index = Some(envelope.send_step),
                None => {
                    if !state.enabled {
                        crate::engine_fault(format!(
                            "Receiver was disabled before receiving. queue={}",
                            self.owner
                        ));
                    }
                    state.enabled = false;
                    state.send_step_index = None;
                    queue.receiver_parked = true;
                }
            }
        }
        self.runtime.schedule(Operation::receive(self.owner))?;
        let envelope = match self.queue.lock().messages.pop_front() {
            Some(envelope) => envelope,
            None => crate::engine_fault(format!(
                "Receiver was scheduled with an empty queue. queue={}",
                self.owner
            )),
        };
        log::trace!("Received. queue={}, step={}", self.owner, envelope.send_step);
        Ok(envelope.msg)
    }
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Mailbox {
            owner: self.owner,
            owner_record: Weak::clone(&self.owner_record),
            queue: Arc::clone(&self.queue),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> Debug for Mailbox<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox").field("owner", &self.owner).finish()
    }
}
