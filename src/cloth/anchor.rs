//! 锚点（固定点）
//!
//! 一组固定数量的粒子，其位置每帧被强制拉回模型空间中的固定目标，不受弹簧求解影响。
//! 目标位置在构建时从粒子初始位置捕获，之后不再改变；整组锚点可以整体启用/禁用。

use crate::cloth::particle::{GridDims, Particle};
use crate::core::error::{ClothError, ClothResult};
use glam::Vec3;

/// GPU 锚点结构（对应 WGSL `Anchor`），16 字节
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Anchor {
    /// 被固定的粒子索引
    pub index: u32,
    /// 目标位置（模型空间）
    pub position: [f32; 3],
}

impl Anchor {
    pub fn target(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// 锚点集合
#[derive(Debug, Clone, Default)]
pub struct AnchorSet {
    anchors: Vec<Anchor>,
    enabled: bool,
}

impl AnchorSet {
    /// 参考布局：第 0 行的左端、中间列和右端
    pub fn reference_columns(dims: GridDims) -> Vec<u32> {
        vec![0, dims.width() / 2, dims.width() - 1]
    }

    /// 把第 0 行的指定列固定在其初始位置
    ///
    /// 重复的列只保留一次，保证每个锚点控制的粒子互不相同。
    pub fn pin_row_zero(dims: GridDims, columns: &[u32], particles: &[Particle]) -> ClothResult<Self> {
        let mut anchors: Vec<Anchor> = Vec::with_capacity(columns.len());

        for &column in columns {
            if column >= dims.width() {
                return Err(ClothError::InvalidConfiguration(format!(
                    "anchor column {} is outside the {}-wide grid",
                    column,
                    dims.width()
                )));
            }
            let index = dims.index(column, 0);
            if anchors.iter().any(|a| a.index == index) {
                continue;
            }
            let particle = particles.get(index as usize).ok_or_else(|| {
                ClothError::InvalidConfiguration(format!("no particle at anchor index {}", index))
            })?;
            anchors.push(Anchor {
                index,
                position: particle.position,
            });
        }

        Ok(Self {
            anchors,
            enabled: true,
        })
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// 翻转启用状态，返回新的状态
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// 粒子当前是否被固定（锚点禁用时总是 `false`）
    pub fn pins(&self, index: u32) -> bool {
        self.enabled && self.anchors.iter().any(|a| a.index == index)
    }
}
