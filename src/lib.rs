// 食事する哲学者の問題
// 円卓に N 人、箸の取り方は 4 通り
// naive: 左 -> 右 (デッドロック)
// spin: try_lock で左 -> 右、失敗したら置いて即リトライ (飢餓)
// asymmetric: 偶数番は右から
// hierarchical: 番号の小さい箸から

pub mod chopstick;
pub mod cli;
pub mod error;
pub mod philosopher;
pub mod render;
pub mod simulation;
pub mod table;
pub mod timing;

pub use error::{Error, Result};
pub use philosopher::Protocol;
pub use simulation::{RunFlag, Simulation, Summary};
pub use table::{Phase, Snapshot};
pub use timing::{DurationRange, Timing};
