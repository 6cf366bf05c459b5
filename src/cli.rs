use std::time::Duration;

use clap::Parser;

use crate::{
    philosopher::Protocol,
    timing::{DurationRange, Timing},
};

/// Dining philosophers
///
/// Five (or more) philosophers share a ring of chopsticks. The protocol
/// decides how each of them picks up its two chopsticks.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "dining-philosophers")]
#[command(version, about, long_about = None)]
pub struct Options {
    /// naive|deadlock|1, spin|starvation|2, asymmetric|3, hierarchical|4.
    /// Omit to choose from a menu
    pub protocol: Option<Protocol>,

    /// Number of seats (at least 2)
    #[arg(short = 'n', long, default_value = "5", value_parser = parse_philosophers)]
    pub philosophers: usize,

    /// Think time in ms, MIN or MIN-MAX
    #[arg(long, value_parser = parse_think)]
    pub think: Option<DurationRange>,

    /// Eat time in ms, MIN or MIN-MAX
    #[arg(long, value_parser = parse_eat)]
    pub eat: Option<DurationRange>,

    /// Pause in ms between the first and second chopstick
    #[arg(long)]
    pub hold_pause: Option<u64>,

    /// Screen refresh interval in ms
    #[arg(long, default_value = "1000")]
    pub refresh: u64,

    /// Stop automatically after this many seconds
    #[arg(short = 'd', long)]
    pub duration: Option<u64>,
}

impl Options {
    // プリセットにコマンドラインの指定を上書きする
    pub fn timing(&self, protocol: Protocol) -> Timing {
        let mut timing = Timing::preset(protocol);
        if let Some(think) = self.think {
            timing.think = think;
        }
        if let Some(eat) = self.eat {
            timing.eat = eat;
        }
        if let Some(ms) = self.hold_pause {
            timing.hold_pause = Duration::from_millis(ms);
        }
        timing
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration.map(Duration::from_secs)
    }
}

fn parse_ms(value: &str) -> Result<u64, String> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("not a number of milliseconds: {value}"))
}

// "100" なら固定、"100-200" なら範囲。min > max はここで弾く
fn parse_range(phase: &'static str, value: &str) -> Result<DurationRange, String> {
    match value.split_once('-') {
        Some((min, max)) => {
            DurationRange::new(phase, parse_ms(min)?, parse_ms(max)?).map_err(|e| e.to_string())
        }
        None => Ok(DurationRange::fixed(parse_ms(value)?)),
    }
}

fn parse_think(value: &str) -> Result<DurationRange, String> {
    parse_range("think", value)
}

fn parse_eat(value: &str) -> Result<DurationRange, String> {
    parse_range("eat", value)
}

// 1 人だと左右の箸が同じになる
fn parse_philosophers(value: &str) -> Result<usize, String> {
    let n = value
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("not a number: {value}"))?;
    if n < 2 {
        return Err(format!("need at least 2 philosophers, got {n}"));
    }
    Ok(n)
}
