//! 约束图构建（一次性，CPU 端）
//!
//! 枚举相邻粒子之间的所有结构弹簧和剪切弹簧，并把约束集合划分为 8 个互不冲突的批次
//! （图着色）：同一批次内任意两条约束都不共享粒子，因此一个批次可以在一次计算派发中
//! 完全并行地松弛而没有数据竞争。
//!
//! ```text
//!   (i-1,j-1)   (i,j-1)   (i+1,j-1)
//!         \        |        /
//!   ShearBack  Vertical  ShearForward
//!           \      |      /
//!   (i-1,j) ── Horizontal ── (i,j)
//! ```
//!
//! | 批次 | 约束类型 | 奇偶标志 |
//! |------|----------|----------|
//! | 0/1  | Horizontal   | 列标志（每个单元格翻转一次） |
//! | 2/3  | Vertical     | 行标志（每行翻转一次） |
//! | 4/5  | ShearBack    | 行标志 |
//! | 6/7  | ShearForward | 行标志 |
//!
//! 构建分两遍：先用闭式公式确定每个批次的大小和偏移（[`BatchLayout`]），
//! 再按扫描顺序把每条约束写入所属批次预先分配好的连续区间。

use crate::cloth::particle::{GridDims, Particle};
use crate::core::error::{ClothError, ClothResult};
use std::ops::Range;

/// 批次数量
pub const BATCH_COUNT: usize = 8;

/// 约束拓扑类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// 结构弹簧 (i-1,j)–(i,j)
    Horizontal,
    /// 结构弹簧 (i,j-1)–(i,j)
    Vertical,
    /// 剪切弹簧 (i-1,j-1)–(i,j)
    ShearBack,
    /// 剪切弹簧 (i+1,j-1)–(i,j)
    ShearForward,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 4] = [
        ConstraintKind::Horizontal,
        ConstraintKind::Vertical,
        ConstraintKind::ShearBack,
        ConstraintKind::ShearForward,
    ];

    /// 该类型使用的两个批次（标志为真时的批次，标志为假时的批次）
    pub fn batches(self) -> (usize, usize) {
        match self {
            ConstraintKind::Horizontal => (0, 1),
            ConstraintKind::Vertical => (2, 3),
            ConstraintKind::ShearBack => (4, 5),
            ConstraintKind::ShearForward => (6, 7),
        }
    }

    /// 批次编号对应的约束类型
    pub fn of_batch(batch: usize) -> Self {
        Self::ALL[(batch / 2).min(3)]
    }
}

/// GPU 约束结构（对应 WGSL `Constraint`），12 字节
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Constraint {
    /// 起点粒子索引
    pub start: u32,
    /// 终点粒子索引
    pub end: u32,
    /// 静止长度
    pub rest_length: f32,
}

/// 网格扫描中产生的一个约束槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConstraintSlot {
    pub kind: ConstraintKind,
    pub batch: usize,
    pub start: u32,
    pub end: u32,
}

/// 按行优先顺序扫描网格，依次产生每个单元格的约束槽位
///
/// 每个单元格按 Horizontal、ShearBack、Vertical、ShearForward 的顺序产生约束。
/// 列标志在每个单元格翻转一次（不论是否产生了水平约束，也不在换行时复位），
/// 行标志在每行开始时翻转一次。
pub(crate) fn walk_grid(dims: GridDims, mut emit: impl FnMut(ConstraintSlot)) {
    let w = dims.width();
    let mut column_flag = true;
    let mut row_flag = true;

    let pick = |kind: ConstraintKind, flag: bool| {
        let (on, off) = kind.batches();
        if flag {
            on
        } else {
            off
        }
    };

    for j in 0..dims.height() {
        row_flag = !row_flag;

        for i in 0..w {
            column_flag = !column_flag;
            let index = dims.index(i, j);

            if i > 0 {
                emit(ConstraintSlot {
                    kind: ConstraintKind::Horizontal,
                    batch: pick(ConstraintKind::Horizontal, column_flag),
                    start: index - 1,
                    end: index,
                });

                if j > 0 {
                    emit(ConstraintSlot {
                        kind: ConstraintKind::ShearBack,
                        batch: pick(ConstraintKind::ShearBack, row_flag),
                        start: index - (w + 1),
                        end: index,
                    });
                }
            }

            if j > 0 {
                emit(ConstraintSlot {
                    kind: ConstraintKind::Vertical,
                    batch: pick(ConstraintKind::Vertical, row_flag),
                    start: index - w,
                    end: index,
                });

                if i < w - 1 {
                    emit(ConstraintSlot {
                        kind: ConstraintKind::ShearForward,
                        batch: pick(ConstraintKind::ShearForward, row_flag),
                        start: index - (w - 1),
                        end: index,
                    });
                }
            }
        }
    }
}

/// 约束总数 (((W−2)·4)+5)·(H−1) + (W−1)
pub fn expected_constraint_count(dims: GridDims) -> u64 {
    let w = dims.width() as u64;
    let h = dims.height() as u64;
    ((w - 2) * 4 + 5) * (h - 1) + (w - 1)
}

/// 批次布局：每个批次的大小和在约束缓冲区中的起始偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLayout {
    sizes: [u32; BATCH_COUNT],
    offsets: [u32; BATCH_COUNT],
    total: u32,
}

impl BatchLayout {
    /// 由网格尺寸的闭式公式计算批次布局
    pub fn for_grid(dims: GridDims) -> ClothResult<Self> {
        let w = dims.width() as u64;
        let h = dims.height() as u64;

        let horizontal_even = h * (w / 2);
        let horizontal_odd = (w - 1) * h - horizontal_even;
        let vertical_even = w * (h / 2);
        let vertical_odd = (h - 1) * w - vertical_even;
        let diagonal_even = (w - 1) * (h / 2);
        let diagonal_odd = (w - 1) * (h - 1) - diagonal_even;

        let wide = [
            horizontal_even,
            horizontal_odd,
            vertical_even,
            vertical_odd,
            diagonal_even,
            diagonal_odd,
            diagonal_even,
            diagonal_odd,
        ];

        let total: u64 = wide.iter().sum();
        if total > u32::MAX as u64 {
            return Err(ClothError::Allocation(format!(
                "{} constraints exceed the u32 index range",
                total
            )));
        }

        let mut sizes = [0u32; BATCH_COUNT];
        let mut offsets = [0u32; BATCH_COUNT];
        let mut next = 0u32;
        for (batch, size) in wide.iter().enumerate() {
            sizes[batch] = *size as u32;
            offsets[batch] = next;
            next += *size as u32;
        }

        Ok(Self {
            sizes,
            offsets,
            total: total as u32,
        })
    }

    pub fn size(&self, batch: usize) -> u32 {
        self.sizes[batch]
    }

    pub fn offset(&self, batch: usize) -> u32 {
        self.offsets[batch]
    }

    pub fn sizes(&self) -> &[u32; BATCH_COUNT] {
        &self.sizes
    }

    /// 批次在约束数组中的区间
    pub fn range(&self, batch: usize) -> Range<usize> {
        let start = self.offsets[batch] as usize;
        start..start + self.sizes[batch] as usize
    }

    /// 约束总数
    pub fn total(&self) -> u32 {
        self.total
    }
}

/// 完整的约束图：按批次连续存放的约束数组
#[derive(Debug, Clone)]
pub struct ConstraintGraph {
    dims: GridDims,
    layout: BatchLayout,
    constraints: Vec<Constraint>,
}

impl ConstraintGraph {
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn layout(&self) -> &BatchLayout {
        &self.layout
    }

    /// 全部约束（批次 0..7 依次连续）
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// 单个批次的约束视图
    pub fn batch(&self, batch: usize) -> &[Constraint] {
        &self.constraints[self.layout.range(batch)]
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// 约束缓冲区字节数
    pub fn byte_size(&self) -> u64 {
        (self.constraints.len() * std::mem::size_of::<Constraint>()) as u64
    }

    /// 校验划分的完整性和正确性
    ///
    /// - 约束总数符合闭式公式
    /// - 所有端点都是合法粒子索引
    /// - 每个批次内没有共享粒子的约束
    pub fn validate(&self) -> ClothResult<()> {
        let expected = expected_constraint_count(self.dims);
        if self.constraints.len() as u64 != expected {
            return Err(ClothError::InvalidConfiguration(format!(
                "constraint graph holds {} constraints, expected {}",
                self.constraints.len(),
                expected
            )));
        }

        let particle_count = self.dims.particle_count();
        if let Some(c) = self
            .constraints
            .iter()
            .find(|c| c.start as usize >= particle_count || c.end as usize >= particle_count)
        {
            return Err(ClothError::InvalidConfiguration(format!(
                "constraint {}-{} references a particle outside 0..{}",
                c.start, c.end, particle_count
            )));
        }

        for batch in 0..BATCH_COUNT {
            if let Some(particle) = find_batch_conflict(self.batch(batch), particle_count) {
                return Err(ClothError::InvalidConfiguration(format!(
                    "batch {} touches particle {} more than once",
                    batch, particle
                )));
            }
        }
        Ok(())
    }
}

/// 查找批次中被多条约束共享（或越界）的粒子，没有冲突时返回 `None`
pub fn find_batch_conflict(batch: &[Constraint], particle_count: usize) -> Option<u32> {
    let mut touched = vec![false; particle_count];
    for c in batch {
        for index in [c.start, c.end] {
            match touched.get_mut(index as usize) {
                Some(seen) if !*seen => *seen = true,
                _ => return Some(index),
            }
        }
    }
    None
}

/// 构建约束图
///
/// 第一遍由 [`BatchLayout::for_grid`] 确定批次大小，第二遍按扫描顺序把约束写入所属批次的
/// 下一个空位。静止长度取两端点初始位置的欧氏距离。
pub fn build_constraint_graph(dims: GridDims, particles: &[Particle]) -> ClothResult<ConstraintGraph> {
    if particles.len() != dims.particle_count() {
        return Err(ClothError::InvalidConfiguration(format!(
            "expected {} particles for a {}x{} grid, got {}",
            dims.particle_count(),
            dims.width(),
            dims.height(),
            particles.len()
        )));
    }

    let layout = BatchLayout::for_grid(dims)?;
    let total = layout.total() as usize;

    let mut constraints: Vec<Constraint> = Vec::new();
    constraints
        .try_reserve_exact(total)
        .map_err(|e| ClothError::Allocation(format!("constraint buffer ({} entries): {}", total, e)))?;
    constraints.resize(total, bytemuck::Zeroable::zeroed());

    let mut cursor: [usize; BATCH_COUNT] = std::array::from_fn(|b| layout.offset(b) as usize);
    let mut overflow = None;

    walk_grid(dims, |slot| {
        let slot_end = layout.range(slot.batch).end;
        let at = cursor[slot.batch];
        if at >= slot_end {
            overflow.get_or_insert(slot.batch);
            return;
        }
        cursor[slot.batch] += 1;

        let a = particles[slot.start as usize].position();
        let b = particles[slot.end as usize].position();
        constraints[at] = Constraint {
            start: slot.start,
            end: slot.end,
            rest_length: a.distance(b),
        };
    });

    if let Some(batch) = overflow {
        return Err(ClothError::Allocation(format!(
            "batch {} received more constraints than its precomputed size {}",
            batch,
            layout.size(batch)
        )));
    }
    if let Some(batch) = (0..BATCH_COUNT).find(|&b| cursor[b] != layout.range(b).end) {
        return Err(ClothError::Allocation(format!(
            "batch {} filled {} of {} slots",
            batch,
            cursor[batch] - layout.offset(batch) as usize,
            layout.size(batch)
        )));
    }

    let graph = ConstraintGraph {
        dims,
        layout,
        constraints,
    };
    debug_assert!(graph.validate().is_ok());

    tracing::debug!(
        target: "cloth",
        "Built constraint graph for {}x{} grid: {} constraints, batch sizes {:?}",
        dims.width(),
        dims.height(),
        graph.len(),
        layout.sizes()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloth::particle::initial_particles;

    fn graph(w: u32, h: u32) -> ConstraintGraph {
        let dims = GridDims::new(w, h).unwrap();
        build_constraint_graph(dims, &initial_particles(dims).unwrap()).unwrap()
    }

    #[test]
    fn test_minimal_grid() {
        let g = graph(2, 2);
        assert_eq!(g.len(), 6);
        assert_eq!(g.layout().sizes(), &[2, 0, 2, 0, 1, 0, 1, 0]);
        assert!(g.validate().is_ok());

        assert_eq!(g.batch(4), &[Constraint { start: 0, end: 3, rest_length: 2f32.sqrt() }]);
        assert_eq!(g.batch(6)[0].start, 1);
        assert_eq!(g.batch(6)[0].end, 2);
    }

    #[test]
    fn test_batch_kinds() {
        let g = graph(4, 3);
        let dims = g.dims();
        for batch in 0..BATCH_COUNT {
            for c in g.batch(batch) {
                let (si, sj) = dims.coords(c.start);
                let (ei, ej) = dims.coords(c.end);
                let step = (ei as i64 - si as i64, ej as i64 - sj as i64);
                let expected = match ConstraintKind::of_batch(batch) {
                    ConstraintKind::Horizontal => (1, 0),
                    ConstraintKind::Vertical => (0, 1),
                    ConstraintKind::ShearBack => (1, 1),
                    ConstraintKind::ShearForward => (-1, 1),
                };
                assert_eq!(step, expected, "batch {} constraint {:?}", batch, c);
            }
        }
    }

    #[test]
    fn test_wrong_particle_count() {
        let dims = GridDims::new(3, 3).unwrap();
        let particles = initial_particles(GridDims::new(3, 2).unwrap()).unwrap();
        assert!(matches!(
            build_constraint_graph(dims, &particles),
            Err(ClothError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_find_batch_conflict() {
        let batch = [
            Constraint { start: 0, end: 1, rest_length: 1.0 },
            Constraint { start: 2, end: 3, rest_length: 1.0 },
            Constraint { start: 3, end: 4, rest_length: 1.0 },
        ];
        assert_eq!(find_batch_conflict(&batch, 5), Some(3));
        assert_eq!(find_batch_conflict(&batch[..2], 5), None);
    }

    #[test]
    fn test_odd_width_horizontal_split() {
        // W 为奇数时列标志跨行连续翻转，两种奇偶各占 ⌊W/2⌋ 条
        let g = graph(3, 3);
        assert_eq!(g.layout().size(0), 3);
        assert_eq!(g.layout().size(1), 3);
        assert!(g.validate().is_ok());
    }
}
