//! # Cloth Sim
//!
//! GPU 质点-弹簧布料模拟，基于 wgpu 计算着色器。
//!
//! ## Features
//!
//! - **Constraint graph colouring**: 结构弹簧和剪切弹簧被划分为 8 个互不共享粒子的批次
//! - **GPU solver**: 每帧一个计算通道：外力积分 → 锚点 → 8 个约束批次
//! - **CPU stage emulator**: 按同一阶段序列在 CPU 上执行，用于校验批次正确性
//! - **Demo**: winit 窗口，空格键切换锚点，R 键复位
//!
//! ### Example
//!
//! ```no_run
//! use cloth_sim::cloth::Cloth;
//! use cloth_sim::config::{ClothConfig, SolverConfig};
//!
//! # fn frame(device: &wgpu::Device, queue: &wgpu::Queue) {
//! let mut cloth = Cloth::new(device, &ClothConfig::with_grid(32, 32), &SolverConfig::default());
//! if cloth.is_valid() && cloth.update(device, queue).is_ok() {
//!     // cloth.particle_buffer() / cloth.index_buffer() 交给渲染器
//! }
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`cloth`]: 粒子、约束图、锚点和求解器
//! - [`config`]: 配置加载
//! - [`render`]: 演示渲染
//! - [`core`]: 错误类型和演示引擎

/// 布料模拟核心
pub mod cloth;
/// 配置系统
pub mod config;
/// 错误类型和演示引擎
pub mod core;
/// 演示渲染
pub mod render;

pub use cloth::{Cloth, ClothStats, StageEmulator};
pub use config::SimConfig;
pub use core::error::{ClothError, ClothResult};
