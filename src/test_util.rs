//! Small actor programs for tests.

use crate::{ActorError, Mailbox, TestingActorRuntime};

/// The root actor sends two words to a greeter, then a fresh reply mailbox, and waits for the
/// greeter to echo the words back on it.
pub mod hello {
    use super::*;

    pub enum HelloMsg {
        Text(String),
        ReplyTo(Mailbox<String>),
    }

    fn expect_text(mailbox: &Mailbox<HelloMsg>, expected: &str) -> Result<String, ActorError> {
        match mailbox.receive()? {
            HelloMsg::Text(text) if text == expected => Ok(text),
            HelloMsg::Text(text) => Err(ActorError::fault(format!(
                "Out of order. expected={}, actual={}",
                expected, text
            ))),
            HelloMsg::ReplyTo(_) => Err(ActorError::fault("Expected text.")),
        }
    }

    pub fn greeter(mailbox: Mailbox<HelloMsg>) -> Result<(), ActorError> {
        let first = expect_text(&mailbox, "hello")?;
        let second = expect_text(&mailbox, "world")?;
        match mailbox.receive()? {
            HelloMsg::ReplyTo(reply_to) => reply_to.send(format!("{} {}", first, second)),
            HelloMsg::Text(_) => Err(ActorError::fault("Expected a reply address.")),
        }
    }

    pub fn program(runtime: &TestingActorRuntime) -> Result<(), ActorError> {
        let greeter = runtime.create_named("greeter", greeter)?;
        greeter.send(HelloMsg::Text("hello".to_owned()))?;
        greeter.send(HelloMsg::Text("world".to_owned()))?;
        let replies = runtime.create_mailbox();
        greeter.send(HelloMsg::ReplyTo(replies.clone()))?;
        let reply = replies.receive()?;
        if reply != "hello world" {
            return Err(ActorError::fault(format!("Unexpected reply: {}", reply)));
        }
        runtime.wait_for_actor(&greeter)
    }
}

/// Two actors that each wait for the other to speak first.
pub mod mutual_receive {
    use super::*;

    pub enum PingMsg {
        Peer(Mailbox<PingMsg>),
        Ping,
    }

    fn pinger(mailbox: Mailbox<PingMsg>) -> Result<(), ActorError> {
        let peer = match mailbox.receive()? {
            PingMsg::Peer(peer) => peer,
            PingMsg::Ping => return Err(ActorError::fault("Expected a peer first.")),
        };
        mailbox.receive()?;
        peer.send(PingMsg::Ping)
    }

    pub fn program(runtime: &TestingActorRuntime) -> Result<(), ActorError> {
        let a = runtime.create(pinger)?;
        let b = runtime.create(pinger)?;
        a.send(PingMsg::Peer(b.clone()))?;
        b.send(PingMsg::Peer(a.clone()))?;
        runtime.wait_for_actor(&a)
    }
}

/// Workers increment a shared counter held by a cell actor. With `locked` they first acquire a
/// lock from a monitor actor; without it they can lose updates.
pub mod counter {
    use super::*;
    use std::collections::VecDeque;

    pub enum MonitorMsg {
        Lock(Mailbox<()>),
        Unlock,
        Shutdown,
    }

    pub enum CellMsg {
        Get(Mailbox<u32>),
        Set(u32),
        Stop,
    }

    pub fn monitor(mailbox: Mailbox<MonitorMsg>) -> Result<(), ActorError> {
        let mut held = false;
        let mut waiting = VecDeque::new();
        loop {
            match mailbox.receive()? {
                MonitorMsg::Lock(requester) if held => waiting.push_back(requester),
                MonitorMsg::Lock(requester) => {
                    held = true;
                    requester.send(())?;
                }
                MonitorMsg::Unlock => match waiting.pop_front() {
                    Some(next) => next.send(())?,
                    None => held = false,
                },
                MonitorMsg::Shutdown => return Ok(()),
            }
        }
    }

    pub fn cell(mailbox: Mailbox<CellMsg>) -> Result<(), ActorError> {
        let mut value = 0;
        loop {
            match mailbox.receive()? {
                CellMsg::Get(reply) => reply.send(value)?,
                CellMsg::Set(new_value) => value = new_value,
                CellMsg::Stop => return Ok(()),
            }
        }
    }

    /// Builds the test action for `workers` concurrent increments.
    pub fn program(
        workers: u32,
        locked: bool,
    ) -> impl Fn(&TestingActorRuntime) -> Result<(), ActorError> + Sync {
        move |runtime| {
            let monitor = runtime.create_named("monitor", monitor)?;
            let cell = runtime.create_named("cell", cell)?;
            let mut handles = Vec::new();
            for _ in 0..workers {
                let runtime_for_worker = runtime.clone();
                let monitor = monitor.clone();
                let cell = cell.clone();
                let handle = runtime.create(move |grants: Mailbox<()>| {
                    let values = runtime_for_worker.create_mailbox();
                    if locked {
                        monitor.send(MonitorMsg::Lock(grants.clone()))?;
                        grants.receive()?;
                    }
                    cell.send(CellMsg::Get(values.clone()))?;
                    let value = values.receive()?;
                    cell.send(CellMsg::Set(value + 1))?;
                    if locked {
                        monitor.send(MonitorMsg::Unlock)?;
                    }
                    Ok(())
                })?;
                handles.push(handle);
            }
            for handle in &handles {
                runtime.wait_for_actor(handle)?;
            }

            let values = runtime.create_mailbox();
            cell.send(CellMsg::Get(values.clone()))?;
            let value = values.receive()?;
            cell.send(CellMsg::Stop)?;
            monitor.send(MonitorMsg::Shutdown)?;
            if value != workers {
                return Err(ActorError::fault(format!(
                    "Lost update. expected={}, actual={}",
                    workers, value
                )));
            }
            Ok(())
        }
    }
}

/// Actors that each send one message to the root actor, which records the arrival order.
pub mod senders {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    pub fn program(
        count: usize,
        arrivals: Arc<Mutex<Vec<Vec<usize>>>>,
    ) -> impl Fn(&TestingActorRuntime) -> Result<(), ActorError> + Sync {
        move |runtime| {
            let inbox = runtime.create_mailbox();
            for i in 0..count {
                let inbox = inbox.clone();
                runtime.create(move |_: Mailbox<()>| inbox.send(i))?;
            }
            let mut order = Vec::new();
            for _ in 0..count {
                order.push(inbox.receive()?);
            }
            arrivals.lock().push(order);
            Ok(())
        }
    }
}
