//! 统一错误处理模块
//!
//! ## 错误类型分层
//!
//! - **布料核心错误** (`ClothError`): 构建约束图、创建 GPU 资源、逐帧派发时的错误
//! - **引擎错误** (`EngineError`): 演示程序的窗口、设备和事件循环错误
//!
//! 布料核心的错误从不终止宿主进程：构建失败得到一个惰性（inert）布料对象，
//! 逐帧失败只跳过当前帧。

use crate::config::ConfigError;
use thiserror::Error;

/// 布料核心错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClothError {
    /// 构建参数无效（网格退化、粒子数量不匹配等）
    #[error("Invalid cloth configuration: {0}")]
    InvalidConfiguration(String),

    /// 约束缓冲区无法分配或超出设备限制
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// GPU 缓冲区、绑定组或管线创建失败
    #[error("Failed to create GPU resource: {0}")]
    ResourceCreation(String),

    /// 本帧的计算派发无法提交
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// 粒子缓冲区回读失败
    #[error("Readback error: {0}")]
    Readback(String),
}

/// 演示引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Window creation failed: {0}")]
    Window(String),

    #[error("Event loop error: {0}")]
    EventLoop(String),

    #[error("Failed to create surface: {0}")]
    Surface(String),

    #[error("Failed to request adapter: no compatible GPU found")]
    NoAdapter,

    #[error("Failed to request device: {0}")]
    DeviceRequest(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cloth error: {0}")]
    Cloth(#[from] ClothError),
}

/// 布料结果类型别名
pub type ClothResult<T> = Result<T, ClothError>;
/// 引擎结果类型别名
pub type EngineResult<T> = Result<T, EngineError>;
