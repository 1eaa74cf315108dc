//! Depositors add to an account balance with a read-then-write pair of messages. Holding the
//! lock served by a monitor actor makes each deposit atomic. Without it, two depositors can read
//! the same balance and one deposit is lost.

use actorcheck::*;
use std::collections::VecDeque;

enum LockMsg {
    Acquire(Mailbox<()>),
    Release,
    Close,
}

/// Serves a lock. The front of the queue holds it and the rest wait in arrival order.
fn lock_server(mailbox: Mailbox<LockMsg>) -> Result<(), ActorError> {
    let mut queue: VecDeque<Mailbox<()>> = VecDeque::new();
    loop {
        match mailbox.receive()? {
            LockMsg::Acquire(grant) => {
                queue.push_back(grant);
                if queue.len() == 1 {
                    queue[0].send(())?;
                }
            }
            LockMsg::Release => {
                queue.pop_front();
                if let Some(next) = queue.front() {
                    next.send(())?;
                }
            }
            LockMsg::Close => return Ok(()),
        }
    }
}

/// The client side of [`lock_server`].
#[derive(Clone)]
struct Lock(Mailbox<LockMsg>);

impl Lock {
    fn acquire(&self, grant: &Mailbox<()>) -> Result<(), ActorError> {
        self.0.send(LockMsg::Acquire(grant.clone()))?;
        grant.receive()
    }

    fn release(&self) -> Result<(), ActorError> {
        self.0.send(LockMsg::Release)
    }
}

enum AccountMsg {
    Balance(Mailbox<u64>),
    Store(u64),
    Close,
}

fn account(mailbox: Mailbox<AccountMsg>) -> Result<(), ActorError> {
    let mut balance = 0;
    loop {
        match mailbox.receive()? {
            AccountMsg::Balance(reply) => reply.send(balance)?,
            AccountMsg::Store(amount) => balance = amount,
            AccountMsg::Close => return Ok(()),
        }
    }
}

fn deposit(
    runtime: &TestingActorRuntime,
    account: &Mailbox<AccountMsg>,
    amount: u64,
) -> Result<(), ActorError> {
    let reply = runtime.create_mailbox();
    account.send(AccountMsg::Balance(reply.clone()))?;
    let balance = reply.receive()?;
    account.send(AccountMsg::Store(balance + amount))
}

/// Depositor `i` deposits `i + 1`, so the expected balance is a triangular number.
fn counter(depositors: u64, locked: bool) -> impl Fn(&TestingActorRuntime) -> Result<(), ActorError> + Sync {
    move |runtime| {
        let lock = Lock(runtime.create_named("lock", lock_server)?);
        let account = runtime.create_named("account", account)?;
        let mut depositors_done = Vec::new();
        for i in 0..depositors {
            let (runtime_for_depositor, lock, account) = (runtime.clone(), lock.clone(), account.clone());
            let depositor = runtime.create_named(format!("depositor-{}", i), move |grant: Mailbox<()>| {
                if locked {
                    lock.acquire(&grant)?;
                }
                deposit(&runtime_for_depositor, &account, i + 1)?;
                if locked {
                    lock.release()?;
                }
                Ok(())
            })?;
            depositors_done.push(depositor);
        }
        for depositor in &depositors_done {
            runtime.wait_for_actor(depositor)?;
        }

        let reply = runtime.create_mailbox();
        account.send(AccountMsg::Balance(reply.clone()))?;
        let balance = reply.receive()?;
        account.send(AccountMsg::Close)?;
        lock.0.send(LockMsg::Close)?;
        let expected = depositors * (depositors + 1) / 2;
        if balance != expected {
            return Err(ActorError::fault(format!(
                "Lost deposit. expected={}, actual={}",
                expected, balance
            )));
        }
        Ok(())
    }
}

fn main() -> Result<(), pico_args::Error> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info")); // `RUST_LOG=${LEVEL}` env variable to override

    let mut args = pico_args::Arguments::from_env();
    match args.subcommand()?.as_deref() {
        Some("check") => {
            let depositors = args.opt_free_from_str()?.unwrap_or(2);
            println!("Exploring locked deposits with {} depositors.", depositors);
            TestLauncher::new(SchedulerConfig::default().dfs())
                .explore_and_report(counter(depositors, true), &mut WriteReporter::new(&mut std::io::stdout()));
        }
        Some("check-racy") => {
            let depositors = args.opt_free_from_str()?.unwrap_or(2);
            println!("Exploring unlocked deposits with {} depositors.", depositors);
            let report = TestLauncher::new(SchedulerConfig::default().dfs())
                .explore_and_report(counter(depositors, false), &mut WriteReporter::new(&mut std::io::stdout()));
            if let Some(bug) = report.first_bug() {
                match bug.trace.to_json() {
                    Ok(json) => println!("Replay with: ./lock_counter replay {} '{}'", depositors, json),
                    Err(err) => println!("Unable to serialize the trace: {}", err),
                }
            }
        }
        Some("random") => {
            let depositors = args.opt_free_from_str()?.unwrap_or(3);
            let iterations: usize = args.opt_free_from_str()?.unwrap_or(10_000);
            let thread_count = num_cpus::get();
            println!(
                "Sampling {} randomized race-reversal schedules of unlocked deposits with {} depositors on {} threads.",
                iterations, depositors, thread_count
            );
            let handles: Vec<_> = (0..thread_count)
                .map(|seed| {
                    std::thread::spawn(move || {
                        let config = SchedulerConfig::default().seed(seed as u64).randomized(true);
                        TestLauncher::new(config.dfs())
                            .max_iterations(iterations / thread_count + 1)
                            .explore(counter(depositors, false))
                    })
                })
                .collect();
            for (seed, handle) in handles.into_iter().enumerate() {
                let report = handle.join().expect("Exploration thread panicked");
                match report.first_bug() {
                    Some(bug) => println!(
                        "seed={}, schedules={}: {} trace={}",
                        seed, report.schedules, bug.error, bug.trace.to_json().unwrap_or_else(|err| err.to_string())
                    ),
                    None => println!("seed={}, schedules={}: no bug", seed, report.schedules),
                }
            }
        }
        Some("replay") => {
            let depositors = args.free_from_str()?;
            let trace: String = args.free_from_str()?;
            let trace = match ScheduleTrace::from_json(&trace) {
                Ok(trace) => trace,
                Err(err) => {
                    println!("Invalid trace: {}", err);
                    return Ok(());
                }
            };
            let execution = TestLauncher::new(SchedulerConfig::default().replay(trace))
                .execute(&counter(depositors, false));
            println!("Replayed {} steps. outcome={:?}", execution.trace.len(), execution.outcome);
            for actor in execution.actors {
                println!("  {} {:?} faults={:?}", actor.id, actor.name, actor.faults);
            }
        }
        _ => {
            println!("USAGE:");
            println!("  ./lock_counter check [DEPOSITOR_COUNT]");
            println!("  ./lock_counter check-racy [DEPOSITOR_COUNT]");
            println!("  ./lock_counter random [DEPOSITOR_COUNT] [ITERATIONS]");
            println!("  ./lock_counter replay DEPOSITOR_COUNT TRACE_JSON");
        }
    }

    Ok(())
}
