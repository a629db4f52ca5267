//! 粒子存储
//!
//! 布料是一个 W×H 的质点网格，每个质点保存当前位置和上一帧位置（Verlet 积分）。
//! 同一块 GPU 缓冲区既是计算着色器的读写存储，也是渲染器的顶点流。

use crate::core::error::{ClothError, ClothResult};
use glam::Vec3;

/// GPU 粒子结构（对应 WGSL `Particle`）
///
/// 布局固定为 24 字节：`position` 在偏移 0，`previous` 在偏移 12。
/// WGSL 侧使用 `array<f32, 3>` 而不是 `vec3<f32>`，避免 16 字节对齐带来的填充。
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    /// 当前位置
    pub position: [f32; 3],
    /// 上一帧位置
    pub previous: [f32; 3],
}

impl Particle {
    /// 静止粒子（上一帧位置等于当前位置，即初速度为零）
    pub fn at_rest(position: Vec3) -> Self {
        Self {
            position: position.to_array(),
            previous: position.to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn previous(&self) -> Vec3 {
        Vec3::from_array(self.previous)
    }

    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

    /// 渲染器使用的顶点布局
    ///
    /// 只暴露位置属性，`previous` 由步长跳过。
    pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Particle>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// 布料网格尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDims {
    width: u32,
    height: u32,
}

impl GridDims {
    /// 创建网格尺寸，宽高都必须不小于 2
    pub fn new(width: u32, height: u32) -> ClothResult<Self> {
        if width < 2 || height < 2 {
            return Err(ClothError::InvalidConfiguration(format!(
                "cloth grid must be at least 2x2, got {}x{}",
                width, height
            )));
        }
        if (width as u64) * (height as u64) > u32::MAX as u64 {
            return Err(ClothError::InvalidConfiguration(format!(
                "cloth grid {}x{} exceeds the u32 particle index range",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 粒子总数 W×H
    pub fn particle_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 网格坐标 (i, j) 对应的线性索引 `j*W + i`
    #[inline]
    pub fn index(&self, i: u32, j: u32) -> u32 {
        debug_assert!(i < self.width && j < self.height);
        j * self.width + i
    }

    /// 线性索引还原为网格坐标
    #[inline]
    pub fn coords(&self, index: u32) -> (u32, u32) {
        (index % self.width, index / self.width)
    }

    /// 静止姿态下 (i, j) 的位置：XZ 平面上的单位正方形
    pub fn rest_position(&self, i: u32, j: u32) -> Vec3 {
        Vec3::new(
            i as f32 / (self.width - 1) as f32,
            0.0,
            j as f32 / (self.height - 1) as f32,
        )
    }
}

/// 生成初始粒子数组（按行优先顺序，零初速度）
///
/// 内存不足时返回 [`ClothError::Allocation`]。
pub fn initial_particles(dims: GridDims) -> ClothResult<Vec<Particle>> {
    let mut particles: Vec<Particle> = Vec::new();
    particles.try_reserve_exact(dims.particle_count()).map_err(|e| {
        ClothError::Allocation(format!(
            "particle buffer ({} entries): {}",
            dims.particle_count(),
            e
        ))
    })?;
    for j in 0..dims.height() {
        for i in 0..dims.width() {
            particles.push(Particle::at_rest(dims.rest_position(i, j)));
        }
    }
    Ok(particles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_layout() {
        assert_eq!(std::mem::size_of::<Particle>(), 24);
        let layout = Particle::vertex_layout();
        assert_eq!(layout.array_stride, 24);
        assert_eq!(layout.attributes[0].offset, 0);
    }

    #[test]
    fn test_degenerate_grid_rejected() {
        assert!(matches!(
            GridDims::new(1, 4),
            Err(ClothError::InvalidConfiguration(_))
        ));
        assert!(GridDims::new(4, 0).is_err());
        assert!(GridDims::new(2, 2).is_ok());
    }

    #[test]
    fn test_index_roundtrip() {
        let dims = GridDims::new(5, 3).unwrap();
        assert_eq!(dims.index(4, 2), 14);
        assert_eq!(dims.coords(14), (4, 2));
    }

    #[test]
    fn test_initial_particles_unit_grid() {
        let dims = GridDims::new(3, 5).unwrap();
        let particles = initial_particles(dims).unwrap();
        assert_eq!(particles.len(), 15);

        let last = particles[dims.index(2, 4) as usize];
        assert_eq!(last.position, [1.0, 0.0, 1.0]);
        assert!(particles.iter().all(|p| p.position == p.previous));
    }
}
