//! 演示渲染：窗口上下文和布料绘制

pub mod cloth_renderer;
pub mod context;

pub use cloth_renderer::{Camera, ClothRenderer};
pub use context::{request_headless_device, GpuContext};
