use std::{fmt, str::FromStr, sync::Arc, thread};

use tracing::{debug, trace};

use crate::{
    chopstick::{ChopstickGuard, Chopsticks},
    error::Error,
    simulation::RunFlag,
    table::{Phase, Table},
    timing::Timing,
};

// 円卓上の席と、その両隣の箸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub id: usize,
    pub left: usize,
    pub right: usize,
}

impl Seat {
    pub fn new(id: usize, n: usize) -> Self {
        assert!(id < n);
        Seat {
            id,
            left: id,
            right: (id + 1) % n,
        }
    }
}

// 箸の取り方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    // 左 -> 右 の順にブロッキングで取る。デッドロックしうる
    Naive,
    // 左 -> 右 を try で取り、失敗したら全部置いてすぐやり直す。飢餓になりうる
    SpinRetry,
    // 偶数番は右から、奇数番は左から
    Asymmetric,
    // 番号の小さい箸から
    Hierarchical,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Naive,
        Protocol::SpinRetry,
        Protocol::Asymmetric,
        Protocol::Hierarchical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Naive => "naive",
            Protocol::SpinRetry => "spin",
            Protocol::Asymmetric => "asymmetric",
            Protocol::Hierarchical => "hierarchical",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Protocol::Naive => "deadlock (naive left-then-right)",
            Protocol::SpinRetry => "starvation (try-lock spin)",
            Protocol::Asymmetric => "correct (asymmetric by parity)",
            Protocol::Hierarchical => "correct (lowest chopstick first)",
        }
    }

    pub fn is_blocking(&self) -> bool {
        !matches!(self, Protocol::SpinRetry)
    }

    // 箸を取る順番
    pub fn pickup_order(&self, seat: Seat) -> [usize; 2] {
        match self {
            Protocol::Naive | Protocol::SpinRetry => [seat.left, seat.right],
            Protocol::Asymmetric => {
                if seat.id % 2 == 0 {
                    [seat.right, seat.left]
                } else {
                    [seat.left, seat.right]
                }
            }
            Protocol::Hierarchical => [seat.left.min(seat.right), seat.left.max(seat.right)],
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "naive" | "deadlock" => Ok(Protocol::Naive),
            "2" | "spin" | "spin-retry" | "starvation" => Ok(Protocol::SpinRetry),
            "3" | "asymmetric" => Ok(Protocol::Asymmetric),
            "4" | "hierarchical" => Ok(Protocol::Hierarchical),
            _ => Err(Error::UnknownProtocol(s.to_string())),
        }
    }
}

pub struct Philosopher {
    seat: Seat,
    protocol: Protocol,
    timing: Timing,
    chopsticks: Arc<Chopsticks>,
    table: Arc<Table>,
    running: RunFlag,
}

impl Philosopher {
    pub fn new(
        seat: Seat,
        protocol: Protocol,
        timing: Timing,
        chopsticks: Arc<Chopsticks>,
        table: Arc<Table>,
        running: RunFlag,
    ) -> Self {
        Philosopher {
            seat,
            protocol,
            timing,
            chopsticks,
            table,
            running,
        }
    }

    // 考える -> 空腹 -> 食べる を停止フラグが下りるまで繰り返す
    // Naive でデッドロックした場合は acquire から戻らないので、フラグは二度と見られない
    pub fn run(self) {
        let _span = tracing::debug_span!("philosopher", id = self.seat.id).entered();
        let [first, second] = self.protocol.pickup_order(self.seat);

        while self.running.is_running() {
            self.think();
            self.table.set_phase(self.seat.id, Phase::Hungry);

            if self.protocol.is_blocking() {
                self.dine_blocking(first, second);
            } else {
                self.dine_spinning(first, second);
            }
        }
    }

    fn think(&self) {
        self.table.set_phase(self.seat.id, Phase::Thinking);
        let d = self.timing.think.sample(&mut rand::thread_rng());
        thread::sleep(d);
    }

    fn eat(&self) {
        self.table.set_phase(self.seat.id, Phase::Eating);
        let meals = self.table.increment_meals(self.seat.id);
        debug!(meals, "eating");
        let d = self.timing.eat.sample(&mut rand::thread_rng());
        thread::sleep(d);
    }

    fn dine_blocking(&self, first: usize, second: usize) {
        let g1 = self.pick_up(first);
        // 1 本持ったまま待つ時間。他の哲学者も 1 本目を取れるようにする
        if !self.timing.hold_pause.is_zero() {
            thread::sleep(self.timing.hold_pause);
        }
        let g2 = self.pick_up(second);

        self.eat();

        self.put_down(second, g2);
        self.put_down(first, g1);
    }

    // バックオフは入れない。入れると飢餓が再現しなくなる
    fn dine_spinning(&self, first: usize, second: usize) {
        while self.running.is_running() {
            let Some(g1) = self.try_pick_up(first) else {
                continue;
            };

            match self.try_pick_up(second) {
                Some(g2) => {
                    self.eat();
                    self.put_down(second, g2);
                    self.put_down(first, g1);
                    return;
                }
                None => {
                    // 2 本目が取れなければ 1 本目も置いて最初から
                    trace!(chopstick = second, "second chopstick busy");
                    self.put_down(first, g1);
                }
            }
        }
    }

    fn pick_up(&self, id: usize) -> ChopstickGuard<'_> {
        let g = self.chopsticks.acquire(id);
        self.table.set_holder(id, Some(self.seat.id));
        g
    }

    fn try_pick_up(&self, id: usize) -> Option<ChopstickGuard<'_>> {
        let g = self.chopsticks.try_acquire(id)?;
        self.table.set_holder(id, Some(self.seat.id));
        Some(g)
    }

    // 表示上の持ち主を消してから箸を置く
    fn put_down(&self, id: usize, guard: ChopstickGuard<'_>) {
        self.table.set_holder(id, None);
        drop(guard);
    }
}
