//! Terrain and particle demo
//!
//! Opens a window, uploads a procedural terrain and a handful of particles,
//! and draws both every frame under a camera orbiting the terrain.

use std::error::Error;
use std::path::{Path, PathBuf};

use ash::vk;
use terrain_engine::foundation::logging;
use terrain_engine::prelude::*;
use terrain_engine::render::vulkan::{shader, SurfaceSession};

const CONFIG_FILE: &str = "terrain_demo.toml";

/// GPU resources drawn every frame
struct Scene {
    terrain_pipeline: GraphicsPipeline,
    particle_pipeline: GraphicsPipeline,
    terrain: UploadedModel,
    particles: ParticleCloud,
}

impl Scene {
    fn new(renderer: &Renderer, shader_dir: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let load = |name: &str| -> VulkanResult<Vec<u8>> {
            shader::read_shader_file(&shader::shader_path(name, shader_dir)?)
        };

        let terrain_pipeline = renderer.make_pipeline(
            &load("terrain.vert.spv")?,
            &load("terrain.frag.spv")?,
            &Vertex::pipeline_description(std::mem::size_of::<MeshPushConstants>() as u32),
        )?;
        let particle_pipeline = renderer.make_pipeline(
            &load("particle.vert.spv")?,
            &load("particle.frag.spv")?,
            &Particle::pipeline_description(std::mem::size_of::<ParticlePushConstants>() as u32),
        )?;

        let terrain = UploadedModel::from_model(renderer.context(), &make_terrain_model())?;
        let particles = ParticleCloud::upload(renderer.context(), &make_particles())?;
        log::info!(
            "Scene ready: {} terrain indices, {} particles",
            terrain.index_count(), particles.count()
        );

        Ok(Self {
            terrain_pipeline,
            particle_pipeline,
            terrain,
            particles,
        })
    }

    /// Record the terrain draw and the particle draw into `command_buffer`
    fn record(
        &self,
        device: &ash::Device,
        session: &SurfaceSession,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        time: f64,
    ) -> VulkanResult<()> {
        let mvp = view_projection(time);
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 0.0] },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let mut recorder = CommandRecorder::begin(device, command_buffer)?;
        {
            let mut pass = recorder.begin_render_pass(
                session.render_pass(),
                session.framebuffer(image_index)?,
                session.scissor(),
                &clear_values,
            );

            pass.bind_pipeline(&self.terrain_pipeline);
            pass.set_viewport(&session.viewport());
            pass.set_scissor(&session.scissor());
            pass.push_constants(&self.terrain_pipeline, bytemuck::bytes_of(&MeshPushConstants::new(&mvp)))?;
            pass.bind_vertex_buffer(self.terrain.vertices());
            pass.bind_index_buffer(self.terrain.indices());
            pass.draw_indexed(self.terrain.index_count());

            pass.bind_pipeline(&self.particle_pipeline);
            pass.set_viewport(&session.viewport());
            pass.set_scissor(&session.scissor());
            pass.push_constants(
                &self.particle_pipeline,
                bytemuck::bytes_of(&ParticlePushConstants::new(&mvp, time)),
            )?;
            pass.bind_vertex_buffer(self.particles.buffer());
            pass.draw(self.particles.count());
        }
        recorder.end()?;
        Ok(())
    }

    /// Pipelines first, then the buffers
    fn destroy(self) {
        self.terrain_pipeline.destroy();
        self.particle_pipeline.destroy();
        drop(self.terrain);
        drop(self.particles);
    }
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Draw frames until the window is asked to close
fn frame_loop(window: &mut Window, renderer: &mut Renderer, scene: &Scene) -> Result<(), Box<dyn Error>> {
    let start_time = window.time();

    while !window.should_close() {
        // Nothing to draw into while minimised, so sleep until the window changes
        let events = if renderer.surface_empty() {
            window.wait_events()
        } else {
            window.poll_events()
        };
        for event in events {
            if let WindowEvent::Resized { width, height } = event {
                log::debug!("Framebuffer resized to {}x{}", width, height);
                renderer.request_recreate_swapchain();
            }
        }

        let Some((image_index, slot)) = renderer.acquire_image()? else {
            continue;
        };
        let command_buffer = slot.command_buffer;

        let time = window.time() - start_time;
        let session = renderer.session().ok_or(VulkanError::NoSurfaceBound)?;
        scene.record(renderer.context().device(), session, command_buffer, image_index, time)?;

        if renderer.submit_and_present(image_index)? == PresentOutcome::OutOfDate {
            log::debug!("Frame dropped, swapchain rebuild pending");
        }
    }
    Ok(())
}

/// Run `teardown` whatever the frame loop returned; the loop's error wins
fn finish<E>(frames: Result<(), E>, teardown: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
    let torn_down = teardown();
    frames.and(torn_down)
}

fn run(config: &DemoConfig) -> Result<(), Box<dyn Error>> {
    let mut window = Window::new(&config.window_title, config.window_width, config.window_height)?;

    let extensions = window.required_instance_extensions()?;
    let context = DeviceContext::new(&extensions, &config.window_title, config.enable_validation)?;
    let surface = window.create_vulkan_surface(context.instance().handle())?;

    let (width, height) = config.default_extent;
    let mut renderer = Renderer::new(context, vk::Extent2D { width, height });
    renderer.bind_surface(surface)?;

    let scene = Scene::new(&renderer, config.shader_dir.as_deref().map(Path::new))?;
    let frames = frame_loop(&mut window, &mut renderer, &scene);

    log::info!("Shutting down");
    finish(frames, || -> Result<(), Box<dyn Error>> {
        // In-flight frames still reference the scene
        let idle = renderer.wait_idle();
        scene.destroy();
        renderer.unbind_surface()?;
        Ok(idle?)
    })?;

    drop(renderer);
    drop(window);
    Ok(())
}

fn main() {
    let config_path = exe_dir().join(CONFIG_FILE);
    let loaded = DemoConfig::load_or_default(&config_path);
    let config = loaded.as_ref().cloned().unwrap_or_default();

    logging::init(config.log_level.into());
    if let Err(e) = &loaded {
        log::warn!("Ignoring {}: {}", config_path.display(), e);
    }
    log::info!("Starting {}", config.window_title);

    if let Err(e) = run(&config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_runs_after_clean_loop() {
        let mut ran = false;
        let result: Result<(), String> = finish(Ok(()), || {
            ran = true;
            Ok(())
        });
        assert!(ran);
        assert!(result.is_ok());
    }

    #[test]
    fn test_teardown_runs_when_loop_fails() {
        let mut ran = false;
        let result = finish(Err("device lost".to_string()), || {
            ran = true;
            Ok(())
        });
        assert!(ran);
        assert_eq!(result, Err("device lost".to_string()));
    }

    #[test]
    fn test_loop_error_takes_precedence_over_teardown_error() {
        let result = finish(Err("acquire failed".to_string()), || Err("unbind failed".to_string()));
        assert_eq!(result, Err("acquire failed".to_string()));
    }

    #[test]
    fn test_teardown_error_surfaces_after_clean_loop() {
        let result = finish(Ok(()), || Err("unbind failed".to_string()));
        assert_eq!(result, Err("unbind failed".to_string()));
    }
}
