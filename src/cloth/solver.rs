//! GPU 逐帧求解器
//!
//! [`ClothSolver`] 持有全部 GPU 资源（粒子、约束、锚点缓冲区，三条计算管线，每个批次一个
//! 绑定组），按 [`FramePlan`] 把一帧录制为单个计算通道。[`Cloth`] 是面向宿主的外观：
//! 构建失败时得到惰性对象而不是错误，逐帧失败只跳过当前帧。

use crate::cloth::anchor::{Anchor, AnchorSet};
use crate::cloth::constraint::{BatchLayout, Constraint, BATCH_COUNT};
use crate::cloth::mesh::triangle_indices;
use crate::cloth::model::{ClothModel, ClothStats};
use crate::cloth::particle::{GridDims, Particle};
use crate::cloth::shader::{
    BatchParams, SimParams, ANCHORS_ENTRY, CLOTH_SOLVER_SHADER, CONSTRAINTS_ENTRY, FORCES_ENTRY,
};
use crate::cloth::stage::{FramePlan, SolverStage, WORKGROUP_SIZE};
use crate::config::{ClothConfig, SolverConfig};
use crate::core::error::{ClothError, ClothResult};
use std::num::NonZeroU64;
use wgpu::util::DeviceExt;

fn align_to(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

/// 在校验和内存不足两个错误作用域中执行 `f`，捕获到的 wgpu 错误由 `map_err` 转换
///
/// 两类错误都不会落到设备默认的未捕获错误处理器（它会 panic）。
fn with_error_scope<T>(
    device: &wgpu::Device,
    f: impl FnOnce() -> T,
    map_err: impl FnOnce(wgpu::Error) -> ClothError,
) -> ClothResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = f();
    // 作用域是栈：先弹出内存不足，再弹出校验
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());
    match out_of_memory.or(validation) {
        Some(error) => Err(map_err(error)),
        None => Ok(value),
    }
}

/// 按闭式公式检查布料是否能放进设备限制（不分配任何 CPU 或 GPU 内存）
fn check_device_limits(limits: &wgpu::Limits, dims: GridDims) -> ClothResult<()> {
    let layout = BatchLayout::for_grid(dims)?;
    let max_binding = limits.max_storage_buffer_binding_size as u64;

    let constraint_bytes = layout.total() as u64 * std::mem::size_of::<Constraint>() as u64;
    if constraint_bytes > max_binding {
        return Err(ClothError::Allocation(format!(
            "constraint buffer needs {} bytes, device allows {} per storage binding",
            constraint_bytes, max_binding
        )));
    }

    let particle_bytes = dims.particle_count() as u64 * std::mem::size_of::<Particle>() as u64;
    if particle_bytes > max_binding {
        return Err(ClothError::Allocation(format!(
            "particle buffer needs {} bytes, device allows {} per storage binding",
            particle_bytes, max_binding
        )));
    }

    let widest = (dims.particle_count() as u64)
        .max(layout.sizes().iter().copied().max().unwrap_or(0) as u64);
    let workgroups = (widest + WORKGROUP_SIZE as u64 - 1) / WORKGROUP_SIZE as u64;
    if workgroups > limits.max_compute_workgroups_per_dimension as u64 {
        return Err(ClothError::Allocation(format!(
            "{} workgroups exceed the device limit of {}",
            workgroups, limits.max_compute_workgroups_per_dimension
        )));
    }
    Ok(())
}

/// 布料求解的 GPU 资源
pub struct ClothSolver {
    forces_pipeline: wgpu::ComputePipeline,
    anchors_pipeline: wgpu::ComputePipeline,
    constraints_pipeline: wgpu::ComputePipeline,
    /// 每个约束批次一个绑定组，只有绑定 4 的偏移不同
    bind_groups: Vec<wgpu::BindGroup>,
    params_buffer: wgpu::Buffer,
    particle_buffer: wgpu::Buffer,
    _constraint_buffer: wgpu::Buffer,
    _anchor_buffer: wgpu::Buffer,
    _batch_buffer: wgpu::Buffer,
    particle_count: u32,
}

impl ClothSolver {
    /// 创建缓冲区、管线和绑定组，并上传初始粒子
    pub fn new(device: &wgpu::Device, model: &ClothModel) -> ClothResult<Self> {
        check_device_limits(&device.limits(), model.dims())?;

        with_error_scope(
            device,
            || Self::create(device, model),
            |e| ClothError::ResourceCreation(e.to_string()),
        )
    }

    fn create(device: &wgpu::Device, model: &ClothModel) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cloth Solver BGL"),
            entries: &[
                // 模拟参数
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<SimParams>() as u64),
                    },
                    count: None,
                },
                // 粒子
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 约束
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 锚点
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 批次参数
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<BatchParams>() as u64
                        ),
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cloth Solver Shader"),
            source: wgpu::ShaderSource::Wgsl(CLOTH_SOLVER_SHADER.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cloth Solver Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
        };
        let forces_pipeline = pipeline("Cloth Forces Pipeline", FORCES_ENTRY);
        let anchors_pipeline = pipeline("Cloth Anchors Pipeline", ANCHORS_ENTRY);
        let constraints_pipeline = pipeline("Cloth Constraints Pipeline", CONSTRAINTS_ENTRY);

        let particle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cloth Particles"),
            contents: bytemuck::cast_slice(model.initial_particles()),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });

        let constraint_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cloth Constraints"),
            contents: bytemuck::cast_slice(model.graph().constraints()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        // 存储缓冲区不能为空：没有锚点时放一个占位元素（anchor_count 为 0，着色器不会读取）
        let anchors = model.anchors().anchors();
        let placeholder: [Anchor; 1] = [bytemuck::Zeroable::zeroed()];
        let anchor_contents = if anchors.is_empty() { &placeholder[..] } else { anchors };
        let anchor_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cloth Anchors"),
            contents: bytemuck::cast_slice(anchor_contents),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloth Sim Params"),
            size: std::mem::size_of::<SimParams>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // 每个批次的 {base, count} 按 uniform 偏移对齐依次存放
        let batch_stride = align_to(
            std::mem::size_of::<BatchParams>() as u64,
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let layout = model.graph().layout();
        let mut batch_bytes = vec![0u8; (batch_stride as usize) * BATCH_COUNT];
        for batch in 0..BATCH_COUNT {
            let params = BatchParams::new(layout.offset(batch), layout.size(batch));
            let at = batch * batch_stride as usize;
            batch_bytes[at..at + std::mem::size_of::<BatchParams>()]
                .copy_from_slice(bytemuck::bytes_of(&params));
        }
        let batch_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cloth Batch Params"),
            contents: &batch_bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_groups = (0..BATCH_COUNT)
            .map(|batch| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Cloth Solver BG"),
                    layout: &bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: particle_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: constraint_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: anchor_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &batch_buffer,
                                offset: batch as u64 * batch_stride,
                                size: NonZeroU64::new(std::mem::size_of::<BatchParams>() as u64),
                            }),
                        },
                    ],
                })
            })
            .collect();

        Self {
            forces_pipeline,
            anchors_pipeline,
            constraints_pipeline,
            bind_groups,
            params_buffer,
            particle_buffer,
            _constraint_buffer: constraint_buffer,
            _anchor_buffer: anchor_buffer,
            _batch_buffer: batch_buffer,
            particle_count: model.particle_count(),
        }
    }

    /// 写入本帧的模拟参数
    pub fn write_params(&self, queue: &wgpu::Queue, solver: &SolverConfig, anchors: &AnchorSet) {
        let params = SimParams::new(solver, self.particle_count, anchors);
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }

    /// 把一帧的阶段序列录制到单个计算通道
    ///
    /// 空批次同样派发（0 个工作组），每帧的约束派发总是 8 次。
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, plan: &FramePlan) {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cloth Solver Pass"),
            timestamp_writes: None,
        });

        for stage in plan.stages() {
            let (pipeline, bind_group) = match *stage {
                SolverStage::Forces { .. } => (&self.forces_pipeline, &self.bind_groups[0]),
                SolverStage::Anchors { .. } => (&self.anchors_pipeline, &self.bind_groups[0]),
                SolverStage::Constraints { batch, .. } => {
                    (&self.constraints_pipeline, &self.bind_groups[batch])
                }
            };
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, bind_group, &[]);
            cpass.dispatch_workgroups(stage.workgroups(), 1, 1);
        }
    }

    /// 粒子缓冲区（STORAGE | VERTEX）
    pub fn particle_buffer(&self) -> &wgpu::Buffer {
        &self.particle_buffer
    }

    /// 覆盖粒子缓冲区
    pub fn upload_particles(&self, queue: &wgpu::Queue, particles: &[Particle]) {
        queue.write_buffer(&self.particle_buffer, 0, bytemuck::cast_slice(particles));
    }

    /// 把粒子缓冲区回读到 CPU（阻塞直到 GPU 完成）
    pub fn read_particles(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> ClothResult<Vec<Particle>> {
        let size = self.particle_buffer.size();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloth Readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Cloth Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.particle_buffer, 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver)
            .map_err(|e| ClothError::Readback(e.to_string()))?
            .map_err(|e| ClothError::Readback(e.to_string()))?;

        let particles = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, Particle>(&data).to_vec()
        };
        staging.unmap();
        Ok(particles)
    }
}

/// 布料网格的渲染资源和求解器
struct ClothResources {
    solver: ClothSolver,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// 宿主使用的布料对象
///
/// 构建失败时 [`Cloth::is_valid`] 返回 `false`，所有缓冲区访问返回 `None`，
/// [`Cloth::update`] 返回 [`ClothError::Dispatch`]。
pub struct Cloth {
    model: Option<ClothModel>,
    resources: Option<ClothResources>,
    solver_config: SolverConfig,
    frames: u64,
}

impl Cloth {
    /// 创建布料，失败时记录错误并返回惰性对象
    pub fn new(device: &wgpu::Device, cloth: &ClothConfig, solver: &SolverConfig) -> Self {
        match Self::try_new(device, cloth, solver) {
            Ok(cloth) => cloth,
            Err(e) => {
                tracing::error!(target: "cloth", "Cloth creation failed, continuing without cloth: {}", e);
                Self {
                    model: None,
                    resources: None,
                    solver_config: solver.clone(),
                    frames: 0,
                }
            }
        }
    }

    /// 创建布料
    pub fn try_new(
        device: &wgpu::Device,
        cloth: &ClothConfig,
        solver: &SolverConfig,
    ) -> ClothResult<Self> {
        solver
            .validate()
            .map_err(|e| ClothError::InvalidConfiguration(e.to_string()))?;

        let dims = GridDims::new(cloth.width, cloth.height)?;
        check_device_limits(&device.limits(), dims)?;

        let model = ClothModel::build(cloth)?;
        let cloth_solver = ClothSolver::new(device, &model)?;

        let indices = triangle_indices(model.dims());
        let index_buffer = with_error_scope(
            device,
            || {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Cloth Indices"),
                    contents: bytemuck::cast_slice(&indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
            },
            |e| ClothError::ResourceCreation(e.to_string()),
        )?;

        let stats = model.stats(0);
        tracing::info!(
            target: "cloth",
            "Cloth ready: {}x{} grid, {} particles, {} constraints, {} anchors",
            stats.width,
            stats.height,
            stats.particle_count,
            stats.constraint_count,
            stats.anchor_count
        );
        tracing::debug!(target: "cloth", "Batch sizes {:?}", stats.batch_sizes);

        Ok(Self {
            model: Some(model),
            resources: Some(ClothResources {
                solver: cloth_solver,
                index_buffer,
                index_count: indices.len() as u32,
            }),
            solver_config: solver.clone(),
            frames: 0,
        })
    }

    /// GPU 资源是否可用
    pub fn is_valid(&self) -> bool {
        self.resources.is_some()
    }

    /// 当前状态下一帧的阶段序列（惰性对象返回 `None`）
    pub fn frame_plan(&self) -> Option<FramePlan> {
        self.model.as_ref().map(|model| {
            FramePlan::for_frame(
                model.particle_count(),
                model.graph().layout(),
                model.anchors(),
            )
        })
    }

    /// 推进一帧
    ///
    /// 失败时粒子状态保持上一帧，调用方应跳过本帧的渲染。
    pub fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> ClothResult<()> {
        let plan = self
            .frame_plan()
            .ok_or_else(|| ClothError::Dispatch("cloth has no GPU resources".to_string()))?;
        self.run_plan(device, queue, &plan)
    }

    /// 按给定的阶段序列执行一帧
    ///
    /// 录制阶段出现任何 wgpu 错误时不提交命令，返回 [`ClothError::Dispatch`]。
    pub fn run_plan(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        plan: &FramePlan,
    ) -> ClothResult<()> {
        let (Some(model), Some(resources)) = (&self.model, &self.resources) else {
            return Err(ClothError::Dispatch("cloth has no GPU resources".to_string()));
        };
        if let Some(batch) = plan.stages().iter().find_map(|stage| match *stage {
            SolverStage::Constraints { batch, .. } if batch >= BATCH_COUNT => Some(batch),
            _ => None,
        }) {
            return Err(ClothError::Dispatch(format!("no constraint batch {}", batch)));
        }

        resources
            .solver
            .write_params(queue, &self.solver_config, model.anchors());

        let command_buffer = with_error_scope(
            device,
            || {
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Cloth Update Encoder"),
                });
                resources.solver.encode(&mut encoder, plan);
                encoder.finish()
            },
            |e| ClothError::Dispatch(e.to_string()),
        )?;
        queue.submit(std::iter::once(command_buffer));

        self.frames += 1;
        tracing::trace!(
            target: "cloth.solver",
            "Frame {}: {} dispatch stages",
            self.frames,
            plan.dispatch_count()
        );
        Ok(())
    }

    /// 翻转锚点启用状态，返回新状态（惰性对象返回 `false`）
    pub fn toggle_anchors(&mut self) -> bool {
        match &mut self.model {
            Some(model) => {
                let enabled = model.anchors_mut().toggle();
                tracing::info!(target: "cloth", "Anchors {}", if enabled { "enabled" } else { "disabled" });
                enabled
            }
            None => false,
        }
    }

    pub fn anchors_enabled(&self) -> bool {
        self.model
            .as_ref()
            .map_or(false, |m| m.anchors().is_enabled())
    }

    /// 恢复静止姿态
    pub fn reset(&mut self, queue: &wgpu::Queue) {
        if let (Some(model), Some(resources)) = (&self.model, &self.resources) {
            resources
                .solver
                .upload_particles(queue, model.initial_particles());
            self.frames = 0;
            tracing::info!(target: "cloth", "Cloth reset to rest pose");
        }
    }

    /// 回读当前粒子状态
    pub fn read_particles(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> ClothResult<Vec<Particle>> {
        let resources = self
            .resources
            .as_ref()
            .ok_or_else(|| ClothError::Readback("cloth has no GPU resources".to_string()))?;
        resources.solver.read_particles(device, queue)
    }

    pub fn particle_buffer(&self) -> Option<&wgpu::Buffer> {
        self.resources.as_ref().map(|r| r.solver.particle_buffer())
    }

    pub fn index_buffer(&self) -> Option<&wgpu::Buffer> {
        self.resources.as_ref().map(|r| &r.index_buffer)
    }

    pub fn index_count(&self) -> u32 {
        self.resources.as_ref().map_or(0, |r| r.index_count)
    }

    pub fn stats(&self) -> Option<ClothStats> {
        self.model.as_ref().map(|m| m.stats(self.frames))
    }

    pub fn model(&self) -> Option<&ClothModel> {
        self.model.as_ref()
    }
}
