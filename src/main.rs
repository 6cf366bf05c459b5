use std::{
    error::Error,
    io::{self, BufRead, Write},
    sync::mpsc,
    thread,
};

use clap::Parser;
use dining_philosophers::{cli::Options, render, Protocol, Simulation};
use libc::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;
use tracing_subscriber::EnvFilter;

// 停止のきっかけ
#[derive(Debug)]
enum Quit {
    Enter,
    Signal(i32),
    Timeout,
}

fn setup_tracing() {
    // RUST_LOG が無ければ warn 以上だけ。stdout は画面描画に使うので stderr へ
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn choose_protocol() -> Result<Protocol, Box<dyn Error>> {
    println!("Choose how the philosophers pick up chopsticks:");
    for (i, p) in Protocol::ALL.iter().enumerate() {
        println!("  {}. {}", i + 1, p.description());
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("Your choice (1-4): ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err("no protocol chosen".into());
        }
        match line.parse::<Protocol>() {
            Ok(p) => return Ok(p),
            Err(_) => println!("Invalid choice."),
        }
    }
}

fn wait_for_quit(opts: &Options) -> Result<Quit, Box<dyn Error>> {
    let (tx, rx) = mpsc::channel();

    let tx0 = tx.clone();
    thread::spawn(move || {
        let mut line = String::new();
        // EOF の場合は ENTER を待てないので、シグナルか --duration に任せる
        if matches!(io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
            let _ = tx0.send(Quit::Enter);
        }
    });

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).map_err(dining_philosophers::Error::Signal)?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let _ = tx.send(Quit::Signal(sig));
        }
    });

    let quit = match opts.duration() {
        Some(d) => rx.recv_timeout(d).unwrap_or(Quit::Timeout),
        None => rx.recv()?,
    };
    Ok(quit)
}

fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing();

    let opts = Options::parse();

    let protocol = match opts.protocol {
        Some(p) => p,
        None => choose_protocol()?,
    };
    let timing = opts.timing(protocol);

    println!(
        "{protocol}: think {:?}..={:?}, eat {:?}..={:?}, hold pause {:?}",
        timing.think.min(),
        timing.think.max(),
        timing.eat.min(),
        timing.eat.max(),
        timing.hold_pause
    );
    println!("Starting the simulation... press ENTER to stop.");

    let sim = Simulation::start(protocol, opts.philosophers, timing)?;
    let renderer = render::spawn(protocol, sim.table(), sim.run_flag(), opts.refresh())
        .map_err(dining_philosophers::Error::Spawn)?;

    match wait_for_quit(&opts)? {
        Quit::Enter => info!("stop requested from stdin"),
        Quit::Signal(sig) => info!(signal = sig, "stop requested by signal"),
        Quit::Timeout => info!("duration elapsed"),
    }
    sim.stop();

    println!("Stopping the simulation, please wait...");
    render::finish(renderer);

    let grace = sim.grace();
    let summary = sim.join_timeout(grace);

    println!("Simulation finished.\n");
    print!("{}", render::summary(&summary.meals));

    if !summary.is_clean() {
        // デッドロックした哲学者は acquire の中で寝たまま。プロセス終了でしか止まらない
        let names: Vec<String> = summary.stuck.iter().map(|i| render::name(*i)).collect();
        println!(
            "\n{} philosopher(s) still blocked on a chopstick ({}): deadlock, exiting anyway.",
            summary.stuck.len(),
            names.join(", ")
        );
    }

    Ok(())
}
