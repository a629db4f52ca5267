use super::{ConfigError, ConfigResult};
use crate::impl_default;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// 求解器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// 重力加速度
    pub gravity: Vec3,

    /// Verlet 速度阻尼（1.0 = 无阻尼）
    pub damping: f32,

    /// 时间步长（秒）
    pub time_step: f32,

    /// 每个渲染帧最多追赶的模拟步数
    pub max_substeps: u32,
}

impl_default!(SolverConfig {
    gravity: Vec3::new(0.0, -9.81, 0.0),
    damping: 0.99,
    time_step: 1.0 / 60.0,
    max_substeps: 4,
});

impl SolverConfig {
    /// 无外力、无阻尼的求解器（用于静止姿态校验）
    pub fn without_forces() -> Self {
        Self {
            gravity: Vec3::ZERO,
            damping: 1.0,
            ..Default::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid time step {}",
                self.time_step
            )));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(ConfigError::ValidationError(format!(
                "Damping must be within [0, 1], got {}",
                self.damping
            )));
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::ValidationError("Gravity must be finite".to_string()));
        }
        if self.max_substeps == 0 {
            return Err(ConfigError::ValidationError(
                "max_substeps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
