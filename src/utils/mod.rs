//! # 工具模块
//!
//! 可注入的时钟与随机源，以及基于它们的小工具函数

pub mod clock;
pub mod random;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use random::{OsRandom, RandomSource, SharedRandom, random_token};
