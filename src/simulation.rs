use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
    chopstick::Chopsticks,
    error::{Error, Result},
    philosopher::{Philosopher, Protocol, Seat},
    table::{Snapshot, Table},
    timing::Timing,
};

// join 待ちでポーリングする間隔
const JOIN_POLL: Duration = Duration::from_millis(10);

// 1 周期に足す余裕
const GRACE_SLACK: Duration = Duration::from_millis(500);

// 停止フラグ。true で開始し、false にするのは一度だけ
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    // 実際に止めた呼び出しだけ true
    pub fn stop(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub meals: Vec<u64>,
    // 終了しなかった哲学者 (デッドロック中)
    pub stuck: Vec<usize>,
}

impl Summary {
    pub fn total(&self) -> u64 {
        self.meals.iter().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.stuck.is_empty()
    }
}

pub struct Simulation {
    timing: Timing,
    table: Arc<Table>,
    running: RunFlag,
    handles: Vec<(usize, JoinHandle<()>)>,
}

impl Simulation {
    // 哲学者 1 人につきスレッド 1 本
    pub fn start(protocol: Protocol, n: usize, timing: Timing) -> Result<Self> {
        if n < 2 {
            return Err(Error::TooFewPhilosophers(n));
        }

        let chopsticks = Arc::new(Chopsticks::new(n));
        let table = Arc::new(Table::new(n));
        let running = RunFlag::new();
        let mut handles = Vec::with_capacity(n);

        for i in 0..n {
            let p = Philosopher::new(
                Seat::new(i, n),
                protocol,
                timing,
                chopsticks.clone(),
                table.clone(),
                running.clone(),
            );
            let spawned = thread::Builder::new()
                .name(format!("philosopher-{i}"))
                .spawn(move || p.run());

            match spawned {
                Ok(t) => handles.push((i, t)),
                Err(e) => {
                    // 起動済みのスレッドは次の周期で抜ける
                    running.stop();
                    return Err(Error::Spawn(e));
                }
            }
        }

        info!(%protocol, philosophers = n, ?timing, "simulation started");

        Ok(Simulation {
            timing,
            table,
            running,
            handles,
        })
    }

    pub fn run_flag(&self) -> RunFlag {
        self.running.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.table.snapshot()
    }

    // 描画スレッドに渡す読み取り用のハンドル
    pub fn table(&self) -> Arc<Table> {
        self.table.clone()
    }

    pub fn stop(&self) -> bool {
        let first = self.running.stop();
        if first {
            info!("stop requested");
        }
        first
    }

    // デッドロックしていなければ、この時間内に全員が停止に気づく
    pub fn grace(&self) -> Duration {
        self.timing.cycle() + GRACE_SLACK
    }

    // naive がデッドロックしていると戻ってこない
    // 止まったスレッドは acquire の中で寝ていて、フラグを二度と見ない
    pub fn join(mut self) -> Summary {
        for (i, t) in std::mem::take(&mut self.handles) {
            if t.join().is_err() {
                warn!(philosopher = i, "philosopher thread panicked");
            }
        }
        info!("all philosophers joined");
        Summary {
            meals: self.table.meals(),
            stuck: Vec::new(),
        }
    }

    // grace を過ぎても終わらないスレッドは諦めて stuck に入れる
    // 残ったスレッドはプロセスを終了するまで止まらない
    pub fn join_timeout(mut self, grace: Duration) -> Summary {
        let deadline = Instant::now() + grace;
        let mut pending = std::mem::take(&mut self.handles);

        loop {
            let (done, rest): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(_, t)| t.is_finished());
            for (i, t) in done {
                if t.join().is_err() {
                    warn!(philosopher = i, "philosopher thread panicked");
                }
            }
            pending = rest;

            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_POLL);
        }

        let stuck: Vec<usize> = pending.iter().map(|(i, _)| *i).collect();
        if stuck.is_empty() {
            info!("all philosophers joined");
        } else {
            warn!(?stuck, "philosophers did not exit, leaving them blocked");
        }

        Summary {
            meals: self.table.meals(),
            stuck,
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        // join はしない。デッドロック中だと戻ってこないため
        self.running.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{table::Phase, timing::DurationRange};

    fn ms(min: u64, max: u64) -> DurationRange {
        DurationRange::new("test", min, max).unwrap()
    }

    // deadline までに cond が成り立てば true
    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_rejects_single_philosopher() {
        let timing = Timing::new(ms(1, 1), ms(1, 1));
        assert!(matches!(
            Simulation::start(Protocol::Hierarchical, 1, timing),
            Err(Error::TooFewPhilosophers(1))
        ));
    }

    // 前提: 全員の考える時間が固定で等しく、1 本目を持ったまま少し待つ。
    // これで全員がほぼ同時に左の箸を握る。デッドロックしたスレッドはリークさせる
    #[test]
    fn test_naive_deadlocks() {
        let timing = Timing::new(DurationRange::fixed(5), ms(20, 40))
            .with_hold_pause(Duration::from_millis(10));
        let sim = Simulation::start(Protocol::Naive, 5, timing).unwrap();

        let deadlocked = |s: &Snapshot| {
            s.all_hungry() && s.holders.iter().enumerate().all(|(c, h)| *h == Some(c))
        };
        assert!(wait_until(Duration::from_secs(20), || deadlocked(
            &sim.snapshot()
        )));

        let before = sim.snapshot();
        thread::sleep(Duration::from_millis(200));
        let after = sim.snapshot();
        assert!(deadlocked(&after));
        assert_eq!(before.meals, after.meals);

        // 停止フラグは誰にも見られない
        assert!(sim.stop());
        let summary = sim.join_timeout(Duration::from_millis(200));
        assert_eq!(summary.stuck, vec![0, 1, 2, 3, 4]);
        assert!(!summary.is_clean());
    }

    // バックオフを足してはいけない。足すと飢餓のデモにならない
    #[test]
    fn test_spin_retry_both_make_progress() {
        let timing = Timing::new(ms(1, 3), ms(1, 3));
        let sim = Simulation::start(Protocol::SpinRetry, 2, timing).unwrap();

        assert!(wait_until(Duration::from_secs(10), || sim
            .snapshot()
            .meals
            .iter()
            .all(|m| *m > 0)));

        sim.stop();
        let grace = sim.grace();
        let summary = sim.join_timeout(grace);
        assert!(summary.is_clean());
        assert!(summary.meals.iter().all(|m| *m > 0));
    }

    fn assert_everyone_eats(protocol: Protocol) {
        for n in [2, 3, 5] {
            let timing = Timing::new(ms(1, 5), ms(1, 5));
            let sim = Simulation::start(protocol, n, timing).unwrap();

            thread::sleep(Duration::from_millis(300));
            assert!(
                wait_until(Duration::from_secs(10), || sim
                    .snapshot()
                    .meals
                    .iter()
                    .all(|m| *m > 0)),
                "{protocol} with {n} philosophers starved someone"
            );

            sim.stop();
            let grace = sim.grace();
            let summary = sim.join_timeout(grace);
            assert!(summary.is_clean(), "{protocol} with {n} did not shut down");
            assert_eq!(summary.meals.len(), n);
            assert!(summary.meals.iter().all(|m| *m > 0));
        }
    }

    #[test]
    fn test_asymmetric_everyone_eats() {
        assert_everyone_eats(Protocol::Asymmetric);
    }

    #[test]
    fn test_hierarchical_everyone_eats() {
        assert_everyone_eats(Protocol::Hierarchical);
    }

    // 実行中に何度も snapshot を取り、矛盾した組み合わせが見えないことを確かめる
    fn assert_snapshots_consistent(protocol: Protocol, timing: Timing) -> Summary {
        let n = 5;
        let sim = Simulation::start(protocol, n, timing).unwrap();

        let end = Instant::now() + Duration::from_millis(300);
        while Instant::now() < end {
            let s = sim.snapshot();
            for (c, holder) in s.holders.iter().enumerate() {
                let Some(h) = *holder else {
                    continue;
                };
                // 握っているのは隣の哲学者だけで、考え中ではない
                let seat = Seat::new(h, n);
                assert!(c == seat.left || c == seat.right);
                assert_ne!(s.phases[h], Phase::Thinking, "{s:?}");
            }
            for h in 0..n {
                // 2 本とも握っているのは空腹から食事に移る間と食事中だけ
                if s.held_by(h) == 2 {
                    assert!(
                        matches!(s.phases[h], Phase::Hungry | Phase::Eating),
                        "{s:?}"
                    );
                }
            }
        }

        sim.stop();
        let grace = sim.grace();
        sim.join_timeout(grace)
    }

    #[test]
    fn test_snapshot_consistency_hierarchical() {
        let timing = Timing::new(ms(0, 1), ms(0, 1));
        assert!(assert_snapshots_consistent(Protocol::Hierarchical, timing).is_clean());
    }

    #[test]
    fn test_snapshot_consistency_spin_retry() {
        let timing = Timing::new(ms(0, 1), ms(0, 1));
        assert!(assert_snapshots_consistent(Protocol::SpinRetry, timing).is_clean());
    }

    #[test]
    fn test_snapshot_consistency_asymmetric() {
        let timing = Timing::new(ms(0, 1), ms(0, 1)).with_hold_pause(Duration::from_millis(1));
        assert!(assert_snapshots_consistent(Protocol::Asymmetric, timing).is_clean());
    }

    // デッドロックしても snapshot は矛盾しない。止まったスレッドはリークさせる
    #[test]
    fn test_snapshot_consistency_naive() {
        let timing = Timing::new(ms(0, 1), ms(0, 2)).with_hold_pause(Duration::from_millis(1));
        let summary = assert_snapshots_consistent(Protocol::Naive, timing);
        assert_eq!(summary.meals.len(), 5);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let timing = Timing::new(ms(1, 5), ms(1, 5));
        let sim = Simulation::start(Protocol::Asymmetric, 5, timing).unwrap();
        let flag = sim.run_flag();
        thread::sleep(Duration::from_millis(50));

        assert!(sim.stop());
        assert!(!sim.stop());
        assert!(!flag.stop());
        assert!(!flag.is_running());

        let grace = sim.grace();
        let start = Instant::now();
        let summary = sim.join_timeout(grace);
        assert!(summary.is_clean());
        assert!(start.elapsed() < grace);
    }

    #[test]
    fn test_join_returns_final_counts() {
        let timing = Timing::new(ms(1, 2), ms(1, 2));
        let sim = Simulation::start(Protocol::Hierarchical, 3, timing).unwrap();
        thread::sleep(Duration::from_millis(100));
        sim.stop();
        let last = sim.snapshot();

        let summary = sim.join();
        assert!(summary.is_clean());
        assert!(summary.total() >= last.total_meals());
    }

    #[test]
    fn test_drop_stops_philosophers() {
        let timing = Timing::new(ms(1, 2), ms(1, 2));
        let sim = Simulation::start(Protocol::Hierarchical, 3, timing).unwrap();
        let flag = sim.run_flag();
        drop(sim);
        assert!(!flag.is_running());
    }
}
