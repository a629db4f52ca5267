//! 布料渲染器
//!
//! 直接把求解器的粒子缓冲区当作顶点流绘制（只借用，不持有）。法线在片元着色器中由
//! 世界坐标的屏幕空间导数求出，因此顶点流只需要位置。

use crate::cloth::{Cloth, Particle};
use crate::render::context::DEPTH_FORMAT;
use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

/// 相机 Uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    /// 视图投影矩阵
    pub view_proj: [[f32; 4]; 4],
    /// 光照方向（xyz，指向光源）
    pub light_dir: [f32; 4],
    /// 布料颜色
    pub color: [f32; 4],
}

/// 固定相机
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.5, 0.4, 2.4),
            target: Vec3::new(0.5, -0.4, 0.3),
            fov_y: 45f32.to_radians(),
            near: 0.01,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, self.target, Vec3::Y);
        let proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj * view
    }
}

const CLOTH_RENDER_SHADER: &str = r#"
struct CameraUniforms {
    view_proj: mat4x4<f32>,
    light_dir: vec4<f32>,
    color: vec4<f32>,
};
@group(0) @binding(0) var<uniform> camera: CameraUniforms;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = camera.view_proj * vec4<f32>(position, 1.0);
    out.world = position;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(cross(dpdx(in.world), dpdy(in.world)));
    let l = normalize(camera.light_dir.xyz);
    // 双面光照
    let diffuse = abs(dot(n, l));
    let shade = 0.25 + 0.75 * diffuse;
    return vec4<f32>(camera.color.rgb * shade, 1.0);
}
"#;

/// 布料渲染器
pub struct ClothRenderer {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    pub camera: Camera,
    pub color: Vec4,
}

impl ClothRenderer {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let camera = Camera::default();
        let color = Vec4::new(0.80, 0.25, 0.20, 1.0);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cloth Camera"),
            contents: bytemuck::bytes_of(&Self::uniforms(&camera, color, 1.0)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cloth Camera BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cloth Camera BG"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cloth Render Shader"),
            source: wgpu::ShaderSource::Wgsl(CLOTH_RENDER_SHADER.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cloth Render Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cloth Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Particle::vertex_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            camera_buffer,
            camera_bind_group,
            camera,
            color,
        }
    }

    fn uniforms(camera: &Camera, color: Vec4, aspect: f32) -> CameraUniforms {
        CameraUniforms {
            view_proj: camera.view_proj(aspect).to_cols_array_2d(),
            light_dir: [0.3, 1.0, 0.6, 0.0],
            color: color.to_array(),
        }
    }

    /// 更新相机（窗口尺寸变化后调用）
    pub fn update_camera(&self, queue: &wgpu::Queue, aspect: f32) {
        let uniforms = Self::uniforms(&self.camera, self.color, aspect);
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// 绘制布料，惰性布料不绘制任何东西
    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, cloth: &'a Cloth) {
        let (Some(vertices), Some(indices)) = (cloth.particle_buffer(), cloth.index_buffer()) else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..cloth.index_count(), 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_sees_cloth_center() {
        let camera = Camera::default();
        let clip = camera.view_proj(16.0 / 9.0) * Vec4::new(0.5, 0.0, 0.5, 1.0);
        let ndc = clip / clip.w;
        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1.0 && ndc.y.abs() < 1.0);
        assert!((0.0..1.0).contains(&ndc.z));
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 96);
    }
}
