use super::{ConfigError, ConfigResult};
use crate::cloth::particle::GridDims;
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 布料配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClothConfig {
    /// 网格宽度（列数，≥2）
    pub width: u32,

    /// 网格高度（行数，≥2）
    pub height: u32,

    /// 第 0 行被固定的列
    ///
    /// `None` 使用参考布局：左端、中间列、右端。
    #[serde(default)]
    pub pin_columns: Option<Vec<u32>>,

    /// 启动时锚点是否启用
    pub anchors_enabled: bool,
}

impl_default!(ClothConfig {
    width: 32,
    height: 32,
    pin_columns: None,
    anchors_enabled: true,
});

impl ClothConfig {
    /// 指定网格尺寸，其余使用默认值
    pub fn with_grid(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// 指定固定列
    pub fn with_pin_columns(mut self, columns: Vec<u32>) -> Self {
        self.pin_columns = Some(columns);
        self
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.width < 2 || self.height < 2 {
            return Err(ConfigError::ValidationError(format!(
                "Cloth grid must be at least 2x2, got {}x{}",
                self.width, self.height
            )));
        }
        if let Some(columns) = &self.pin_columns {
            if let Some(column) = columns.iter().find(|&&c| c >= self.width) {
                return Err(ConfigError::ValidationError(format!(
                    "Pin column {} is outside the {}-wide grid",
                    column, self.width
                )));
            }
        }
        Ok(())
    }

    /// 解析出的固定列
    pub fn resolved_pin_columns(&self, dims: GridDims) -> Vec<u32> {
        match &self.pin_columns {
            Some(columns) => columns.clone(),
            None => crate::cloth::anchor::AnchorSet::reference_columns(dims),
        }
    }
}
