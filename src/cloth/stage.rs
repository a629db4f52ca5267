//! 逐帧求解阶段序列
//!
//! 每帧的求解是一条显式排序的阶段流水线：
//!
//! ```text
//! Forces ──▶ Anchors (可跳过) ──▶ Constraints[0] ──▶ ... ──▶ Constraints[7]
//! ```
//!
//! ## Happens-before 约定
//!
//! - 所有阶段在同一个计算通道（compute pass）中按程序顺序录制并提交到同一个队列；
//!   阶段 N 的读取能看到阶段 N−1 对粒子缓冲区的全部写入，不需要额外的栅栏。
//! - 阶段内部每个元素（粒子、锚点、约束）对应一个 GPU 线程，线程之间没有同步：
//!   力阶段每个线程只访问自己的粒子；锚点按构建保证互不重复；约束批次由图着色保证
//!   没有共享粒子。
//! - 批次之间必须串行（Gauss-Seidel），批次内部是 Jacobi 式的并行松弛。
//! - 最后一个约束批次之后，粒子缓冲区交给渲染器，同样只依赖程序顺序。
//!
//! GPU 求解器和 CPU 阶段模拟器都遍历同一个 [`FramePlan`]，因此阶段顺序只在这里定义一次。

use crate::cloth::anchor::AnchorSet;
use crate::cloth::constraint::{BatchLayout, BATCH_COUNT};

/// 计算着色器工作组大小（与 WGSL `@workgroup_size` 一致）
pub const WORKGROUP_SIZE: u32 = 64;

/// 覆盖 `elements` 个元素所需的工作组数
pub fn workgroup_count(elements: u32) -> u32 {
    (elements + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE
}

/// 单个求解阶段（一次计算派发）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStage {
    /// 外力积分，每个粒子一个线程
    Forces { particles: u32 },
    /// 锚点约束，每个锚点一个线程
    Anchors { anchors: u32 },
    /// 一个约束批次，每条约束一个线程
    Constraints { batch: usize, offset: u32, count: u32 },
}

impl SolverStage {
    /// 本阶段派发的元素数量
    pub fn element_count(&self) -> u32 {
        match *self {
            SolverStage::Forces { particles } => particles,
            SolverStage::Anchors { anchors } => anchors,
            SolverStage::Constraints { count, .. } => count,
        }
    }

    pub fn workgroups(&self) -> u32 {
        workgroup_count(self.element_count())
    }

    pub fn label(&self) -> &'static str {
        match self {
            SolverStage::Forces { .. } => "Cloth Forces",
            SolverStage::Anchors { .. } => "Cloth Anchors",
            SolverStage::Constraints { .. } => "Cloth Constraints",
        }
    }
}

/// 一帧的阶段序列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    stages: Vec<SolverStage>,
}

impl FramePlan {
    /// 生成本帧的阶段序列
    ///
    /// 锚点被禁用（或为空）时不产生锚点阶段；约束阶段总是 8 个，按批次 0..7 排列。
    pub fn for_frame(particle_count: u32, layout: &BatchLayout, anchors: &AnchorSet) -> Self {
        let mut stages = Vec::with_capacity(BATCH_COUNT + 2);
        stages.push(SolverStage::Forces {
            particles: particle_count,
        });

        if anchors.is_enabled() && !anchors.is_empty() {
            stages.push(SolverStage::Anchors {
                anchors: anchors.len() as u32,
            });
        }

        for batch in 0..BATCH_COUNT {
            stages.push(SolverStage::Constraints {
                batch,
                offset: layout.offset(batch),
                count: layout.size(batch),
            });
        }

        Self { stages }
    }

    /// 由显式的阶段列表构造（调试单个阶段时使用）
    pub fn from_stages(stages: Vec<SolverStage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[SolverStage] {
        &self.stages
    }

    /// 本帧的派发次数
    pub fn dispatch_count(&self) -> usize {
        self.stages.len()
    }

    pub fn has_anchor_stage(&self) -> bool {
        self.stages
            .iter()
            .any(|s| matches!(s, SolverStage::Anchors { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloth::particle::{initial_particles, GridDims};

    fn setup() -> (GridDims, BatchLayout, AnchorSet) {
        let dims = GridDims::new(4, 4).unwrap();
        let particles = initial_particles(dims).unwrap();
        let layout = BatchLayout::for_grid(dims).unwrap();
        let anchors = AnchorSet::pin_row_zero(dims, &[0, 1, 3], &particles).unwrap();
        (dims, layout, anchors)
    }

    #[test]
    fn test_stage_order() {
        let (dims, layout, anchors) = setup();
        let plan = FramePlan::for_frame(dims.particle_count() as u32, &layout, &anchors);

        assert_eq!(plan.dispatch_count(), 10);
        assert_eq!(plan.stages()[0], SolverStage::Forces { particles: 16 });
        assert_eq!(plan.stages()[1], SolverStage::Anchors { anchors: 3 });

        let batches: Vec<usize> = plan.stages()[2..]
            .iter()
            .map(|s| match s {
                SolverStage::Constraints { batch, .. } => *batch,
                other => panic!("unexpected stage {:?}", other),
            })
            .collect();
        assert_eq!(batches, (0..BATCH_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn test_disabled_anchors_skip_stage() {
        let (dims, layout, mut anchors) = setup();
        anchors.set_enabled(false);
        let plan = FramePlan::for_frame(dims.particle_count() as u32, &layout, &anchors);

        assert_eq!(plan.dispatch_count(), 9);
        assert!(!plan.has_anchor_stage());
    }

    #[test]
    fn test_explicit_plan() {
        let plan = FramePlan::from_stages(vec![
            SolverStage::Forces { particles: 130 },
            SolverStage::Constraints { batch: 2, offset: 0, count: 0 },
        ]);
        assert_eq!(plan.dispatch_count(), 2);
        assert!(!plan.has_anchor_stage());
        assert_eq!(plan.stages()[0].workgroups(), 3);
        assert_eq!(plan.stages()[1].workgroups(), 0);
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(64), 1);
        assert_eq!(workgroup_count(65), 2);
    }
}
