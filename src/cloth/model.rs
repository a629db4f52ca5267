//! 布料的 CPU 端描述：网格、初始粒子、约束图和锚点
//!
//! GPU 求解器和 CPU 阶段模拟器都从同一个 [`ClothModel`] 出发。

use crate::cloth::anchor::AnchorSet;
use crate::cloth::constraint::{build_constraint_graph, BatchLayout, ConstraintGraph, BATCH_COUNT};
use crate::cloth::particle::{initial_particles, GridDims, Particle};
use crate::config::ClothConfig;
use crate::core::error::{ClothError, ClothResult};

/// 构建完成的布料模型
#[derive(Debug, Clone)]
pub struct ClothModel {
    dims: GridDims,
    initial: Vec<Particle>,
    graph: ConstraintGraph,
    anchors: AnchorSet,
}

impl ClothModel {
    /// 按配置构建网格、约束图和锚点
    pub fn build(config: &ClothConfig) -> ClothResult<Self> {
        config
            .validate()
            .map_err(|e| ClothError::InvalidConfiguration(e.to_string()))?;

        let dims = GridDims::new(config.width, config.height)?;
        // 先用闭式公式确认约束数量可表示，再分配任何缓冲区
        BatchLayout::for_grid(dims)?;
        let initial = initial_particles(dims)?;
        let graph = build_constraint_graph(dims, &initial)?;

        let columns = config.resolved_pin_columns(dims);
        let mut anchors = AnchorSet::pin_row_zero(dims, &columns, &initial)?;
        anchors.set_enabled(config.anchors_enabled);

        Ok(Self {
            dims,
            initial,
            graph,
            anchors,
        })
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// 初始（静止）粒子
    pub fn initial_particles(&self) -> &[Particle] {
        &self.initial
    }

    pub fn graph(&self) -> &ConstraintGraph {
        &self.graph
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn anchors_mut(&mut self) -> &mut AnchorSet {
        &mut self.anchors
    }

    pub fn particle_count(&self) -> u32 {
        self.initial.len() as u32
    }

    /// 当前的统计快照
    pub fn stats(&self, frames: u64) -> ClothStats {
        ClothStats {
            width: self.dims.width(),
            height: self.dims.height(),
            particle_count: self.particle_count(),
            constraint_count: self.graph.len() as u32,
            batch_sizes: *self.graph.layout().sizes(),
            anchor_count: self.anchors.len() as u32,
            anchors_enabled: self.anchors.is_enabled(),
            frames,
        }
    }
}

/// 布料统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClothStats {
    pub width: u32,
    pub height: u32,
    pub particle_count: u32,
    pub constraint_count: u32,
    pub batch_sizes: [u32; BATCH_COUNT],
    pub anchor_count: u32,
    pub anchors_enabled: bool,
    /// 已模拟的帧数
    pub frames: u64,
}
