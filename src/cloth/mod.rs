//! GPU 质点-弹簧布料
//!
//! ```text
//!  ClothConfig ──▶ ClothModel ──────────────┬──▶ ClothSolver (wgpu) ──▶ particle_buffer ──▶ 渲染器
//!                  ├─ initial_particles     │        ▲
//!                  ├─ ConstraintGraph (8批) │        │ FramePlan: Forces → Anchors → Constraints[0..8]
//!                  └─ AnchorSet             └──▶ StageEmulator (CPU 对照)
//! ```

pub mod anchor;
pub mod constraint;
pub mod emulator;
pub mod mesh;
pub mod model;
pub mod particle;
pub mod shader;
pub mod solver;
pub mod stage;


pub use anchor::{Anchor, AnchorSet};
pub use constraint::{
    build_constraint_graph, expected_constraint_count, BatchLayout, Constraint, ConstraintGraph,
    ConstraintKind, BATCH_COUNT,
};
pub use emulator::StageEmulator;
pub use mesh::triangle_indices;
pub use model::{ClothModel, ClothStats};
pub use particle::{initial_particles, GridDims, Particle};
pub use solver::{Cloth, ClothSolver};
pub use stage::{FramePlan, SolverStage};
