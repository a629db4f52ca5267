//! 核心模块
//!
//! - `engine` - 演示程序入口和运行循环
//! - `error` - 错误类型定义
//! - `macros` - 配置默认值宏

pub mod engine;
pub mod error;
#[macro_use]
pub mod macros;

pub use engine::{Engine, FixedTimestep};
pub use error::{ClothError, ClothResult, EngineError, EngineResult};
