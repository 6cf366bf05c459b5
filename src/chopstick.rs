use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

// 箸 1 本
// held が true の間は誰かが握っている。待つ側は cond で寝る
pub struct Chopstick {
    held: Mutex<bool>,
    cond: Condvar,
}

// 箸を握っている証。drop すると箸を置く
#[must_use = "dropping the guard puts the chopstick down immediately"]
pub struct ChopstickGuard<'a> {
    chopstick: &'a Chopstick,
}

impl Chopstick {
    pub fn new() -> Self {
        Chopstick {
            held: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        // 中身は bool だけなので poison されても値は壊れていない
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // 空くまで待ってから取る
    pub fn acquire(&self) -> ChopstickGuard<'_> {
        let mut held = self.state();
        while *held {
            held = self.cond.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
        ChopstickGuard { chopstick: self }
    }

    // 空いていれば取る。握られていても待たずに None を返す
    pub fn try_acquire(&self) -> Option<ChopstickGuard<'_>> {
        let mut held = self.state();
        if *held {
            return None;
        }
        *held = true;
        Some(ChopstickGuard { chopstick: self })
    }

    pub fn is_held(&self) -> bool {
        *self.state()
    }
}

impl Default for Chopstick {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Drop for ChopstickGuard<'a> {
    fn drop(&mut self) {
        let mut held = self.chopstick.state();
        *held = false;
        // 待っている哲学者を 1 人だけ起こす
        self.chopstick.cond.notify_one();
    }
}

// 円卓に並んだ箸。i 番目の哲学者の左が i、右が i + 1
pub struct Chopsticks {
    sticks: Vec<Chopstick>,
}

impl Chopsticks {
    pub fn new(n: usize) -> Self {
        Chopsticks {
            sticks: (0..n).map(|_| Chopstick::new()).collect(),
        }
    }

    pub fn acquire(&self, id: usize) -> ChopstickGuard<'_> {
        self.sticks[id].acquire()
    }

    pub fn try_acquire(&self, id: usize) -> Option<ChopstickGuard<'_>> {
        self.sticks[id].try_acquire()
    }

    pub fn is_held(&self, id: usize) -> bool {
        self.sticks[id].is_held()
    }
}
