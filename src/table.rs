use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Thinking,
    Hungry,
    Eating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Thinking => "THINKING",
            Phase::Hungry => "HUNGRY",
            Phase::Eating => "EATING",
        };
        // {:<8} などの幅指定を効かせるため pad を使う
        f.pad(s)
    }
}

// 表示用の状態。phases と holders は同じロックで守る
struct Seating {
    phases: Vec<Phase>,
    holders: Vec<Option<usize>>,
}

// 表示用に共有する状態
// 状態と持ち主の更新は snapshot と同じロックを通すので、更新途中は見えない
// 食事回数だけはロックの外のアトミック
pub struct Table {
    seating: Mutex<Seating>,
    meals: Vec<AtomicU64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub phases: Vec<Phase>,
    pub holders: Vec<Option<usize>>,
    pub meals: Vec<u64>,
}

impl Table {
    pub fn new(n: usize) -> Self {
        Table {
            seating: Mutex::new(Seating {
                phases: vec![Phase::Thinking; n],
                holders: vec![None; n],
            }),
            meals: (0..n).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn seating(&self) -> MutexGuard<'_, Seating> {
        self.seating.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_phase(&self, philosopher: usize, phase: Phase) {
        self.seating().phases[philosopher] = phase;
    }

    pub fn set_holder(&self, chopstick: usize, holder: Option<usize>) {
        self.seating().holders[chopstick] = holder;
    }

    pub fn increment_meals(&self, philosopher: usize) -> u64 {
        // 最終的な回数だけが分かればよいので Relaxed で十分
        self.meals[philosopher].fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn meals(&self) -> Vec<u64> {
        self.meals
            .iter()
            .map(|m| m.load(Ordering::Relaxed))
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        let seating = self.seating();
        Snapshot {
            phases: seating.phases.clone(),
            holders: seating.holders.clone(),
            meals: self.meals(),
        }
    }
}

impl Snapshot {
    pub fn all_hungry(&self) -> bool {
        self.phases.iter().all(|p| *p == Phase::Hungry)
    }

    pub fn held_by(&self, philosopher: usize) -> usize {
        self.holders
            .iter()
            .filter(|h| **h == Some(philosopher))
            .count()
    }

    pub fn total_meals(&self) -> u64 {
        self.meals.iter().sum()
    }
}
