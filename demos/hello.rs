//! A client actor sends two words to a greeter, then a reply mailbox, and expects the words
//! echoed back in order. The root actor only wires the two together.

use actorcheck::*;

enum GreeterMsg {
    Word(&'static str),
    Reply(Mailbox<String>),
}

fn greeter(mailbox: Mailbox<GreeterMsg>) -> Result<(), ActorError> {
    let mut words = Vec::new();
    loop {
        match mailbox.receive()? {
            GreeterMsg::Word(word) => words.push(word),
            GreeterMsg::Reply(reply) => return reply.send(words.join(" ")),
        }
    }
}

fn client(runtime: TestingActorRuntime, greeter: Mailbox<GreeterMsg>) -> Result<(), ActorError> {
    greeter.send(GreeterMsg::Word("hello"))?;
    greeter.send(GreeterMsg::Word("world"))?;
    let reply = runtime.create_mailbox();
    greeter.send(GreeterMsg::Reply(reply.clone()))?;
    match reply.receive()?.as_str() {
        "hello world" => Ok(()),
        other => Err(ActorError::fault(format!("Unexpected greeting: {}", other))),
    }
}

fn hello(runtime: &TestingActorRuntime) -> Result<(), ActorError> {
    let b = runtime.create_named("greeter", greeter)?;
    let runtime_for_client = runtime.clone();
    let greeter_for_client = b.clone();
    let a = runtime.create_named("client", move |_: Mailbox<()>| {
        client(runtime_for_client, greeter_for_client)
    })?;
    runtime.wait_for_actor(&a)?;
    runtime.wait_for_actor(&b)
}

fn main() -> Result<(), pico_args::Error> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info")); // `RUST_LOG=${LEVEL}` env variable to override

    let mut args = pico_args::Arguments::from_env();
    match args.subcommand()?.as_deref() {
        Some("dfs") => {
            println!("Exhaustively exploring the greeting.");
            TestLauncher::new(SchedulerConfig::default().dfs())
                .explore_and_report(hello, &mut WriteReporter::new(&mut std::io::stdout()));
        }
        Some("random") => {
            let iterations = args.opt_free_from_str()?.unwrap_or(1_000);
            let seed = args.opt_free_from_str()?.unwrap_or(0);
            println!("Sampling {} random schedules of the greeting. seed={}", iterations, seed);
            TestLauncher::new(SchedulerConfig::default().seed(seed).random())
                .max_iterations(iterations)
                .finish_when(FinishWhen::Exhausted)
                .explore_and_report(hello, &mut WriteReporter::new(&mut std::io::stdout()));
        }
        Some("pct") => {
            let iterations = args.opt_free_from_str()?.unwrap_or(1_000);
            let change_points = args.opt_free_from_str()?.unwrap_or(2);
            println!(
                "Sampling {} PCT schedules of the greeting. change_points={}",
                iterations, change_points
            );
            TestLauncher::new(SchedulerConfig::default().change_points(change_points).pct())
                .max_iterations(iterations)
                .finish_when(FinishWhen::Exhausted)
                .explore_and_report(hello, &mut WriteReporter::new(&mut std::io::stdout()));
        }
        _ => {
            println!("USAGE:");
            println!("  ./hello dfs");
            println!("  ./hello random [ITERATIONS] [SEED]");
            println!("  ./hello pct [ITERATIONS] [CHANGE_POINTS]");
        }
    }

    Ok(())
}
