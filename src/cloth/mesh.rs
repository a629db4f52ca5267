//! 布料网格的三角形索引
//!
//! 拓扑每帧不变，只有粒子位置在动：每个网格单元两个三角形。

use crate::cloth::particle::GridDims;

/// 生成三角形列表索引
///
/// ```text
///   a ── d        a = j*W + i, b = a + W
///   │ ╲  │        c = b + 1,   d = a + 1
///   b ── c        三角形 (a, b, d) 和 (b, c, d)
/// ```
pub fn triangle_indices(dims: GridDims) -> Vec<u32> {
    let w = dims.width();
    let cells = (dims.width() as usize - 1) * (dims.height() as usize - 1);
    let mut indices = Vec::with_capacity(cells * 6);

    for j in 0..dims.height() - 1 {
        for i in 0..w - 1 {
            let a = dims.index(i, j);
            let b = a + w;
            let c = b + 1;
            let d = a + 1;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    indices
}
