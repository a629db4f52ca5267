//! CPU 阶段模拟器
//!
//! 按与 GPU 完全相同的 [`FramePlan`] 逐阶段执行求解，用于无 GPU 环境下的行为校验和
//! GPU 结果的对照。每个阶段内部的语义与计算着色器一致：约束批次的所有线程读取批次开始时
//! 的粒子快照，写入时检查是否有两个线程写同一个粒子。

use crate::cloth::anchor::{Anchor, AnchorSet};
use crate::cloth::constraint::{Constraint, ConstraintGraph};
use crate::cloth::model::{ClothModel, ClothStats};
use crate::cloth::particle::Particle;
use crate::cloth::stage::{FramePlan, SolverStage};
use crate::config::{ClothConfig, SolverConfig};
use crate::core::error::{ClothError, ClothResult};
use glam::Vec3;

/// 外力阶段：Verlet 积分
pub fn apply_forces(particles: &mut [Particle], solver: &SolverConfig) {
    let dt = solver.time_step;
    let gravity_step = solver.gravity * (dt * dt);
    for particle in particles.iter_mut() {
        let pos = particle.position();
        let prev = particle.previous();
        let next = pos + (pos - prev) * solver.damping + gravity_step;
        particle.previous = pos.to_array();
        particle.position = next.to_array();
    }
}

/// 锚点阶段：把被固定的粒子拉回目标（同时清零速度）
pub fn apply_anchors(particles: &mut [Particle], anchors: &[Anchor]) -> ClothResult<()> {
    for anchor in anchors {
        let particle = particles.get_mut(anchor.index as usize).ok_or_else(|| {
            ClothError::Dispatch(format!("anchor targets missing particle {}", anchor.index))
        })?;
        particle.position = anchor.position;
        particle.previous = anchor.position;
    }
    Ok(())
}

/// 约束阶段：并行松弛一个批次
///
/// 所有约束读取同一份快照。两条约束写入同一粒子视为数据竞争，返回 [`ClothError::Dispatch`]。
pub fn relax_batch(
    particles: &mut [Particle],
    batch: &[Constraint],
    anchors: &AnchorSet,
) -> ClothResult<()> {
    let snapshot: Vec<Vec3> = particles.iter().map(Particle::position).collect();
    let mut written = vec![false; particles.len()];

    for c in batch {
        let (a, b) = (c.start as usize, c.end as usize);
        let (Some(&pa), Some(&pb)) = (snapshot.get(a), snapshot.get(b)) else {
            return Err(ClothError::Dispatch(format!(
                "constraint {}-{} references a missing particle",
                c.start, c.end
            )));
        };

        // 无论是否跳过写入，同批约束的端点都必须互不相交
        for index in [a, b] {
            if std::mem::replace(&mut written[index], true) {
                return Err(ClothError::Dispatch(format!(
                    "write race on particle {} within one constraint batch",
                    index
                )));
            }
        }

        let delta = pb - pa;
        let dist = delta.length();
        if dist < 1e-6 {
            continue;
        }

        let (weight_a, weight_b) = match (anchors.pins(c.start), anchors.pins(c.end)) {
            (true, true) => continue,
            (true, false) => (0.0, 1.0),
            (false, true) => (1.0, 0.0),
            (false, false) => (0.5, 0.5),
        };

        let correction = delta * ((dist - c.rest_length) / dist);
        particles[a].position = (pa + correction * weight_a).to_array();
        particles[b].position = (pb - correction * weight_b).to_array();
    }
    Ok(())
}

/// CPU 端的逐帧求解器
#[derive(Debug, Clone)]
pub struct StageEmulator {
    model: ClothModel,
    solver: SolverConfig,
    particles: Vec<Particle>,
    frames: u64,
}

impl StageEmulator {
    pub fn new(cloth: &ClothConfig, solver: &SolverConfig) -> ClothResult<Self> {
        solver
            .validate()
            .map_err(|e| ClothError::InvalidConfiguration(e.to_string()))?;
        let model = ClothModel::build(cloth)?;
        Ok(Self::from_model(model, solver.clone()))
    }

    pub fn from_model(model: ClothModel, solver: SolverConfig) -> Self {
        let particles = model.initial_particles().to_vec();
        Self {
            model,
            solver,
            particles,
            frames: 0,
        }
    }

    /// 当前帧的阶段序列
    pub fn plan(&self) -> FramePlan {
        FramePlan::for_frame(
            self.model.particle_count(),
            self.model.graph().layout(),
            self.model.anchors(),
        )
    }

    /// 模拟一帧
    pub fn step(&mut self) -> ClothResult<()> {
        for stage in self.plan().stages() {
            self.run_stage(*stage)?;
        }
        self.frames += 1;
        Ok(())
    }

    /// 执行单个阶段
    pub fn run_stage(&mut self, stage: SolverStage) -> ClothResult<()> {
        match stage {
            SolverStage::Forces { .. } => {
                apply_forces(&mut self.particles, &self.solver);
                Ok(())
            }
            SolverStage::Anchors { .. } => {
                apply_anchors(&mut self.particles, self.model.anchors().anchors())
            }
            SolverStage::Constraints { batch, .. } => relax_batch(
                &mut self.particles,
                self.model.graph().batch(batch),
                self.model.anchors(),
            ),
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn model(&self) -> &ClothModel {
        &self.model
    }

    pub fn graph(&self) -> &ConstraintGraph {
        self.model.graph()
    }

    pub fn anchors(&self) -> &AnchorSet {
        self.model.anchors()
    }

    /// 翻转锚点启用状态，返回新的状态
    pub fn toggle_anchors(&mut self) -> bool {
        self.model.anchors_mut().toggle()
    }

    /// 回到静止姿态
    pub fn reset(&mut self) {
        self.particles.clear();
        self.particles
            .extend_from_slice(self.model.initial_particles());
        self.frames = 0;
    }

    pub fn stats(&self) -> ClothStats {
        self.model.stats(self.frames)
    }
}
