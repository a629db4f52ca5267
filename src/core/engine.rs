//! 演示程序主入口
//!
//! 定义 Engine 结构和主运行循环：窗口、wgpu 表面、固定步长的布料更新和渲染。

use crate::cloth::Cloth;
use crate::config::{LoggingConfig, SimConfig, SolverConfig};
use crate::render::{ClothRenderer, GpuContext};
use std::sync::Arc;
use std::time::Instant;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use super::error::{EngineError, EngineResult};

/// 固定步长累加器
///
/// 每个渲染帧累加真实经过的时间，按 `step` 切分成模拟步；追赶步数超过 `max_substeps`
/// 时丢弃剩余积压，避免卡顿后的"死亡螺旋"。
#[derive(Debug, Clone, PartialEq)]
pub struct FixedTimestep {
    step: f32,
    max_substeps: u32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(solver: &SolverConfig) -> Self {
        Self {
            step: solver.time_step,
            max_substeps: solver.max_substeps,
            accumulator: 0.0,
        }
    }

    /// 累加 `elapsed` 秒，返回本帧应执行的模拟步数
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        self.accumulator += elapsed.max(0.0);
        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_substeps {
            self.accumulator -= self.step;
            steps += 1;
        }
        if steps == self.max_substeps {
            self.accumulator = self.accumulator.min(self.step);
        }
        steps
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// 布料演示引擎
///
/// # 示例
///
/// ```no_run
/// use cloth_sim::core::Engine;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     Engine::run()?;
///     Ok(())
/// }
/// ```
///
/// # 按键
///
/// - `Space`：启用/禁用锚点
/// - `R`：恢复静止姿态
/// - `Esc`：退出
pub struct Engine;

impl Engine {
    /// 加载配置并运行主循环
    pub fn run() -> EngineResult<()> {
        let mut config = SimConfig::load_or_default();
        config.apply_env_overrides();
        Self::run_with_config(config)
    }

    /// 使用给定配置运行主循环
    pub fn run_with_config(config: SimConfig) -> EngineResult<()> {
        Self::initialize_logging(&config.logging);
        config.validate()?;

        let event_loop = EventLoop::new()
            .map_err(|e| EngineError::EventLoop(format!("Failed to create event loop: {}", e)))?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(config.window.title.as_str())
                .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
                .build(&event_loop)
                .map_err(|e| EngineError::Window(e.to_string()))?,
        );

        let context = pollster::block_on(GpuContext::new(window.clone(), &config.window))?;
        let cloth = Cloth::new(&context.device, &config.cloth, &config.solver);
        if !cloth.is_valid() {
            tracing::warn!(target: "engine", "Running without a cloth; see the error above");
        }
        let renderer = ClothRenderer::new(&context.device, context.config.format);
        renderer.update_camera(&context.queue, context.aspect_ratio());

        let app = ClothApp {
            window,
            context,
            cloth,
            renderer,
            timestep: FixedTimestep::new(&config.solver),
            last_frame: Instant::now(),
            skipped_frames: 0,
        };
        Self::run_event_loop(event_loop, app)?;

        tracing::info!(target: "engine", "Engine shutting down");
        Ok(())
    }

    /// 初始化日志系统
    ///
    /// `RUST_LOG` 优先，未设置时使用配置中的日志级别。
    fn initialize_logging(logging: &LoggingConfig) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.as_filter()));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        tracing::info!(target: "engine", "Engine starting");
    }

    fn run_event_loop(event_loop: EventLoop<()>, mut app: ClothApp) -> EngineResult<()> {
        event_loop.set_control_flow(ControlFlow::Poll);

        let result = event_loop.run(move |event, elwt| match event {
            Event::WindowEvent { event, window_id } if window_id == app.window.id() => {
                app.handle_window_event(event, elwt);
            }
            Event::AboutToWait => app.window.request_redraw(),
            _ => {}
        });

        result.map_err(|e| EngineError::EventLoop(format!("Event loop error: {}", e)))
    }
}

struct ClothApp {
    window: Arc<Window>,
    context: GpuContext,
    cloth: Cloth,
    renderer: ClothRenderer,
    timestep: FixedTimestep,
    last_frame: Instant,
    skipped_frames: u64,
}

impl ClothApp {
    fn handle_window_event(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(size) => {
                self.context.resize(size.width, size.height);
                self.renderer
                    .update_camera(&self.context.queue, self.context.aspect_ratio());
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(code, elwt),
            WindowEvent::RedrawRequested => self.frame(elwt),
            _ => {}
        }
    }

    fn handle_key(&mut self, code: KeyCode, elwt: &EventLoopWindowTarget<()>) {
        match code {
            KeyCode::Space => {
                self.cloth.toggle_anchors();
            }
            KeyCode::KeyR => {
                self.cloth.reset(&self.context.queue);
                self.timestep.reset();
            }
            KeyCode::Escape => elwt.exit(),
            _ => {}
        }
    }

    /// 推进模拟并渲染一帧；任一模拟步失败时跳过本帧渲染
    fn frame(&mut self, elwt: &EventLoopWindowTarget<()>) {
        let now = Instant::now();
        let elapsed = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        let steps = self.timestep.advance(elapsed);
        for _ in 0..steps {
            if let Err(e) = self.cloth.update(&self.context.device, &self.context.queue) {
                self.skipped_frames += 1;
                // 惰性布料每帧都会失败，只在第一次时告警
                if self.skipped_frames == 1 || self.cloth.is_valid() {
                    tracing::warn!(target: "engine", "Skipping frame: {}", e);
                }
                return;
            }
        }

        self.render(elwt);
    }

    fn render(&mut self, elwt: &EventLoopWindowTarget<()>) {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                tracing::error!(target: "engine", "Surface out of memory, exiting");
                elwt.exit();
                return;
            }
            Err(e) => {
                tracing::warn!(target: "engine", "Surface error: {:?}", e);
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cloth Render Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Cloth Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.08,
                            g: 0.09,
                            b: 0.11,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.context.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.renderer.draw(&mut pass, &self.cloth);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestep(max_substeps: u32) -> FixedTimestep {
        FixedTimestep::new(&SolverConfig {
            time_step: 0.01,
            max_substeps,
            ..Default::default()
        })
    }

    #[test]
    fn test_fixed_timestep_accumulates() {
        let mut ts = timestep(4);
        assert_eq!(ts.advance(0.005), 0);
        assert_eq!(ts.advance(0.006), 1);
        assert_eq!(ts.advance(0.025), 2);
    }

    #[test]
    fn test_fixed_timestep_caps_backlog() {
        let mut ts = timestep(3);
        assert_eq!(ts.advance(1.0), 3);
        // 积压被丢弃，最多保留一个步长
        assert!(ts.advance(0.0) <= 1);
    }

    #[test]
    fn test_fixed_timestep_ignores_negative_time() {
        let mut ts = timestep(4);
        assert_eq!(ts.advance(-1.0), 0);
        ts.reset();
        assert_eq!(ts.advance(0.01), 1);
    }
}
