use std::{
    fmt::Write as _,
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::warn;

use crate::{
    philosopher::Protocol,
    simulation::RunFlag,
    table::{Snapshot, Table},
};

const NAMES: [&str; 5] = ["Shrek", "Fiona", "Osioł", "Kot", "Smoczyca"];

pub fn name(i: usize) -> String {
    match NAMES.get(i) {
        Some(n) => n.to_string(),
        None => format!("P{i}"),
    }
}

pub fn frame(protocol: Protocol, s: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- DINING PHILOSOPHERS ({protocol}) ---\n");

    let _ = writeln!(out, "PHILOSOPHERS:");
    for (i, (phase, meals)) in s.phases.iter().zip(&s.meals).enumerate() {
        let _ = writeln!(
            out,
            "  {:<10} ({i}): {phase:<8} (meals: {meals})",
            name(i)
        );
    }

    let _ = writeln!(out, "\nCHOPSTICKS:");
    for (i, holder) in s.holders.iter().enumerate() {
        match holder {
            Some(h) => {
                let _ = writeln!(out, "  Chopstick {i}: held by {} ({h})", name(*h));
            }
            None => {
                let _ = writeln!(out, "  Chopstick {i}: FREE");
            }
        }
    }
    out
}

pub fn summary(meals: &[u64]) -> String {
    let mut out = String::from("--- FINAL MEAL COUNT ---\n");
    for (i, m) in meals.iter().enumerate() {
        let _ = writeln!(out, "  {:<10} ({i}): ate {m} times", name(i));
    }
    out
}

// refresh ごとに状態を表示する。停止フラグが下りたら抜ける
pub fn spawn(
    protocol: Protocol,
    table: Arc<Table>,
    running: RunFlag,
    refresh: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("renderer".to_string())
        .spawn(move || {
            while running.is_running() {
                println!("{}", frame(protocol, &table.snapshot()));
                println!("Press ENTER to stop the simulation...");
                thread::sleep(refresh);
            }
        })
}

// 描画スレッドを回収する。panic していたら false
pub fn finish(renderer: JoinHandle<()>) -> bool {
    let ok = renderer.join().is_ok();
    if !ok {
        warn!("renderer thread panicked");
    }
    ok
}
