use std::time::Duration;

use rand::Rng;

use crate::{
    error::{Error, Result},
    philosopher::Protocol,
};

// [min, max] ミリ秒の範囲。min == max なら固定時間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationRange {
    min_ms: u64,
    max_ms: u64,
}

impl DurationRange {
    pub fn new(phase: &'static str, min_ms: u64, max_ms: u64) -> Result<Self> {
        if min_ms > max_ms {
            return Err(Error::InvalidRange {
                phase,
                min_ms,
                max_ms,
            });
        }
        Ok(DurationRange { min_ms, max_ms })
    }

    pub fn fixed(ms: u64) -> Self {
        DurationRange {
            min_ms: ms,
            max_ms: ms,
        }
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    // 両端を含む一様乱数
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub think: DurationRange,
    pub eat: DurationRange,
    // 1 本目を握ってから 2 本目に手を伸ばすまでの間。ブロッキング系のみ
    pub hold_pause: Duration,
}

impl Timing {
    pub fn new(think: DurationRange, eat: DurationRange) -> Self {
        Timing {
            think,
            eat,
            hold_pause: Duration::ZERO,
        }
    }

    pub fn with_hold_pause(mut self, pause: Duration) -> Self {
        self.hold_pause = pause;
        self
    }

    pub fn preset(protocol: Protocol) -> Self {
        match protocol {
            // 考える時間を全員同じにして、左の箸を同時に取りに行かせる
            Protocol::Naive => Timing::new(DurationRange::fixed(2000), range(2000, 5000))
                .with_hold_pause(Duration::from_millis(100)),
            Protocol::SpinRetry | Protocol::Asymmetric | Protocol::Hierarchical => {
                Timing::new(range(2000, 5000), range(1000, 4000))
            }
        }
    }

    // 考える -> 取る -> 食べる 1 周期の上限
    pub fn cycle(&self) -> Duration {
        self.think.max() + self.hold_pause + self.eat.max()
    }
}

// プリセット専用。min <= max は自明
fn range(min_ms: u64, max_ms: u64) -> DurationRange {
    DurationRange { min_ms, max_ms }
}
