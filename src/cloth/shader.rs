//! 布料求解计算着色器
//!
//! 三个入口共享同一个绑定组布局：
//!
//! | 绑定 | 资源 | 用途 |
//! |------|------|------|
//! | 0 | `SimParams` uniform | 重力、步长、阻尼、计数 |
//! | 1 | `array<Particle>` storage (read_write) | 粒子缓冲区 |
//! | 2 | `array<Constraint>` storage (read) | 约束图 |
//! | 3 | `array<Anchor>` storage (read) | 锚点 |
//! | 4 | `BatchParams` uniform | 当前约束批次的偏移和大小 |

use crate::cloth::anchor::AnchorSet;
use crate::config::SolverConfig;

/// 模拟参数 Uniform（对应 WGSL `SimParams`），32 字节
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SimParams {
    /// 重力加速度
    pub gravity: [f32; 3],
    /// 时间步长
    pub time_step: f32,
    /// 速度阻尼
    pub damping: f32,
    /// 粒子数量
    pub particle_count: u32,
    /// 锚点数量
    pub anchor_count: u32,
    /// 锚点是否启用（0/1）
    pub anchors_enabled: u32,
}

impl SimParams {
    pub fn new(solver: &SolverConfig, particle_count: u32, anchors: &AnchorSet) -> Self {
        Self {
            gravity: solver.gravity.to_array(),
            time_step: solver.time_step,
            damping: solver.damping,
            particle_count,
            anchor_count: anchors.len() as u32,
            anchors_enabled: anchors.is_enabled() as u32,
        }
    }
}

/// 约束批次 Uniform（对应 WGSL `BatchParams`），16 字节
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BatchParams {
    /// 批次在约束缓冲区中的起始下标
    pub base: u32,
    /// 批次中的约束数量
    pub count: u32,
    /// 填充
    pub _pad: [u32; 2],
}

impl BatchParams {
    pub fn new(base: u32, count: u32) -> Self {
        Self {
            base,
            count,
            _pad: [0; 2],
        }
    }
}

/// 外力积分入口
pub const FORCES_ENTRY: &str = "forces_main";
/// 锚点入口
pub const ANCHORS_ENTRY: &str = "anchors_main";
/// 约束松弛入口
pub const CONSTRAINTS_ENTRY: &str = "constraints_main";

/// 布料求解着色器源码
pub const CLOTH_SOLVER_SHADER: &str = r#"
struct SimParams {
    gravity: vec3<f32>,
    time_step: f32,
    damping: f32,
    particle_count: u32,
    anchor_count: u32,
    anchors_enabled: u32,
};

struct Particle {
    pos: array<f32, 3>,
    prev: array<f32, 3>,
};

struct Constraint {
    index_a: u32,
    index_b: u32,
    rest_length: f32,
};

struct Anchor {
    index: u32,
    pin: array<f32, 3>,
};

struct BatchParams {
    base: u32,
    count: u32,
    pad0: u32,
    pad1: u32,
};

@group(0) @binding(0) var<uniform> sim: SimParams;
@group(0) @binding(1) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(2) var<storage, read> constraints: array<Constraint>;
@group(0) @binding(3) var<storage, read> anchors: array<Anchor>;
@group(0) @binding(4) var<uniform> batch: BatchParams;

fn load_position(i: u32) -> vec3<f32> {
    return vec3<f32>(particles[i].pos[0], particles[i].pos[1], particles[i].pos[2]);
}

fn load_previous(i: u32) -> vec3<f32> {
    return vec3<f32>(particles[i].prev[0], particles[i].prev[1], particles[i].prev[2]);
}

fn store_position(i: u32, p: vec3<f32>) {
    particles[i].pos[0] = p.x;
    particles[i].pos[1] = p.y;
    particles[i].pos[2] = p.z;
}

fn store_previous(i: u32, p: vec3<f32>) {
    particles[i].prev[0] = p.x;
    particles[i].prev[1] = p.y;
    particles[i].prev[2] = p.z;
}

fn is_pinned(i: u32) -> bool {
    if (sim.anchors_enabled == 0u) {
        return false;
    }
    for (var k = 0u; k < sim.anchor_count; k = k + 1u) {
        if (anchors[k].index == i) {
            return true;
        }
    }
    return false;
}

// Verlet 积分：next = pos + (pos - prev) * damping + g * dt^2
@compute @workgroup_size(64)
fn forces_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= sim.particle_count) {
        return;
    }

    let pos = load_position(i);
    let prev = load_previous(i);
    let dt = sim.time_step;
    let next = pos + (pos - prev) * sim.damping + sim.gravity * (dt * dt);

    store_previous(i, pos);
    store_position(i, next);
}

@compute @workgroup_size(64)
fn anchors_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let k = gid.x;
    if (k >= sim.anchor_count) {
        return;
    }

    let a = anchors[k];
    let p = vec3<f32>(a.pin[0], a.pin[1], a.pin[2]);
    store_position(a.index, p);
    store_previous(a.index, p);
}

@compute @workgroup_size(64)
fn constraints_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let local_idx = gid.x;
    if (local_idx >= batch.count) {
        return;
    }

    let c = constraints[batch.base + local_idx];
    let pa = load_position(c.index_a);
    let pb = load_position(c.index_b);
    let delta = pb - pa;
    let dist = length(delta);
    if (dist < 1e-6) {
        return;
    }

    let pinned_a = is_pinned(c.index_a);
    let pinned_b = is_pinned(c.index_b);
    if (pinned_a && pinned_b) {
        return;
    }

    var weight_a: f32 = 0.5;
    var weight_b: f32 = 0.5;
    if (pinned_a) {
        weight_a = 0.0;
        weight_b = 1.0;
    } else if (pinned_b) {
        weight_a = 1.0;
        weight_b = 0.0;
    }

    let correction = delta * ((dist - c.rest_length) / dist);
    store_position(c.index_a, pa + correction * weight_a);
    store_position(c.index_b, pb - correction * weight_b);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloth::stage::WORKGROUP_SIZE;

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<SimParams>(), 32);
        assert_eq!(std::mem::size_of::<BatchParams>(), 16);
    }

    #[test]
    fn test_shader_entry_points() {
        for entry in [FORCES_ENTRY, ANCHORS_ENTRY, CONSTRAINTS_ENTRY] {
            assert!(CLOTH_SOLVER_SHADER.contains(&format!("fn {}(", entry)));
        }
        let attribute = format!("@workgroup_size({})", WORKGROUP_SIZE);
        assert_eq!(CLOTH_SOLVER_SHADER.matches(&attribute).count(), 3);
    }
}
