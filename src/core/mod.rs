// 核心数据结构和类型定义

pub mod types;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;

pub use types::*;
pub use clock::*;
pub use config::*;
pub use diagnostics::*;
pub use error::*;
