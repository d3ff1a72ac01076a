pub use anyhow;
pub use dx12;

use std::time::Duration;

#[cfg(windows)]
use std::marker::PhantomData;
#[cfg(windows)]
use std::time::Instant;

#[cfg(windows)]
use anyhow::{anyhow, Result};
#[cfg(windows)]
use dx12::windows::Win32::Foundation::HWND;
#[cfg(windows)]
use dx12::windows::Win32::Graphics::Direct3D12::*;
#[cfg(windows)]
use dx12::{
    drop_barriers, transition_barrier, CommandList, Context, ContextBuilder, DepthBuffer, Image,
    Swapchain, FRAME_COUNT,
};
#[cfg(windows)]
use winit::platform::windows::WindowExtWindows;
#[cfg(windows)]
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

#[cfg(windows)]
pub struct BaseApp<B: App> {
    phantom: PhantomData<B>,
    raytracing_enabled: bool,
    pub swapchain: Swapchain,
    /// Output texture ray generation shaders write to, present when ray
    /// tracing is enabled. Recreated with the swapchain.
    pub storage_image: Option<Image>,
    pub depth: DepthBuffer,
    pub context: Context,
    frame_fence_values: [u64; FRAME_COUNT],
    vsync: bool,
}

#[cfg(windows)]
pub trait App: Sized {
    fn new(base: &mut BaseApp<Self>) -> Result<Self>;

    fn update(
        &mut self,
        base: &mut BaseApp<Self>,
        image_index: usize,
        frame_stats: &FrameStats,
    ) -> Result<()>;

    fn record_raytracing_commands(
        &self,
        base: &BaseApp<Self>,
        cmd: &CommandList,
        image_index: usize,
    ) -> Result<()> {
        // prevents reports of unused parameters without needing to use #[allow]
        let _ = base;
        let _ = cmd;
        let _ = image_index;

        Ok(())
    }

    fn record_raster_commands(
        &self,
        base: &BaseApp<Self>,
        cmd: &CommandList,
        image_index: usize,
    ) -> Result<()> {
        // prevents reports of unused parameters without needing to use #[allow]
        let _ = base;
        let _ = cmd;
        let _ = image_index;

        Ok(())
    }

    fn on_recreate_swapchain(&mut self, base: &BaseApp<Self>) -> Result<()>;
}

#[cfg(windows)]
pub fn run<A: App + 'static>(
    app_name: &str,
    width: u32,
    height: u32,
    enable_raytracing: bool,
) -> Result<()> {
    pretty_env_logger::init();
    let (window, event_loop) = create_window(app_name, width, height);
    let mut base_app = BaseApp::new(&window, app_name, enable_raytracing)?;
    let mut app = A::new(&mut base_app)?;

    let mut is_swapchain_dirty = false;
    let mut last_frame = Instant::now();
    let mut frame_stats = FrameStats::default();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        let app = &mut app; // Make sure it is dropped before base_app

        match event {
            Event::NewEvents(_) => {
                let now = Instant::now();
                frame_stats.set_frame_time(now - last_frame);
                last_frame = now;
            }
            // On resize
            Event::WindowEvent {
                event: WindowEvent::Resized(..),
                ..
            } => {
                log::debug!("Window has been resized");
                is_swapchain_dirty = true;
            }
            // Draw
            Event::MainEventsCleared => {
                if is_swapchain_dirty {
                    let dim = window.inner_size();
                    if dim.width > 0 && dim.height > 0 {
                        base_app
                            .recreate_swapchain(dim.width, dim.height)
                            .expect("Failed to recreate swapchain");
                        app.on_recreate_swapchain(&base_app)
                            .expect("Error on recreate swapchain callback");
                    } else {
                        return;
                    }
                    is_swapchain_dirty = false;
                }

                base_app
                    .draw(app, &mut frame_stats)
                    .expect("Failed to draw frame");
            }
            // Keyboard
            Event::WindowEvent {
                event:
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state: ElementState::Pressed,
                                virtual_keycode: Some(key_code),
                                ..
                            },
                        ..
                    },
                ..
            } => match key_code {
                VirtualKeyCode::V => base_app.toggle_vsync(),
                VirtualKeyCode::Escape => *control_flow = ControlFlow::Exit,
                _ => (),
            },
            // Exit app on request to close window
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => *control_flow = ControlFlow::Exit,
            // Wait for gpu to finish pending work before closing app
            Event::LoopDestroyed => base_app
                .wait_for_gpu()
                .expect("Failed to wait for gpu to finish work"),
            _ => (),
        }
    });
}

#[cfg(windows)]
fn create_window(app_name: &str, width: u32, height: u32) -> (Window, EventLoop<()>) {
    log::debug!("Creating window and event loop");
    let events_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(app_name)
        .with_inner_size(PhysicalSize::new(width, height))
        .with_resizable(true)
        .build(&events_loop)
        .unwrap();

    (window, events_loop)
}

#[cfg(windows)]
impl<B: App> BaseApp<B> {
    fn new(window: &Window, app_name: &str, enable_raytracing: bool) -> Result<Self> {
        log::info!("Create application: {}", app_name);

        let context = ContextBuilder::new()
            .with_raytracing(enable_raytracing)
            .build()?;

        let hwnd = HWND(window.hwnd() as _);
        let size = window.inner_size();
        let swapchain = Swapchain::new(&context, hwnd, size.width, size.height)?;
        let depth = DepthBuffer::new(&context, size.width, size.height)?;

        let storage_image = if enable_raytracing {
            Some(context.create_storage_image(size.width, size.height, swapchain.format)?)
        } else {
            None
        };

        Ok(Self {
            phantom: PhantomData,
            raytracing_enabled: enable_raytracing,
            swapchain,
            storage_image,
            depth,
            context,
            frame_fence_values: [0; FRAME_COUNT],
            vsync: true,
        })
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        log::debug!("Recreating the swapchain");

        self.wait_for_gpu()?;

        // Swapchain and dependent resources
        self.swapchain.resize(&self.context, width, height)?;
        self.depth.resize(&self.context, width, height)?;

        if self.raytracing_enabled {
            self.storage_image = Some(self.context.create_storage_image(
                width,
                height,
                self.swapchain.format,
            )?);
        }

        Ok(())
    }

    pub fn wait_for_gpu(&mut self) -> Result<()> {
        self.context.wait_idle()
    }

    fn draw(&mut self, app: &mut B, frame_stats: &mut FrameStats) -> Result<()> {
        // The resources tied to this back buffer may still be in flight from
        // FRAME_COUNT frames ago.
        let image_index = self.swapchain.current_back_buffer_index();
        self.context
            .queue
            .wait_for_fence_value(self.frame_fence_values[image_index])?;

        frame_stats.tick();

        app.update(self, image_index, frame_stats)?;

        let cmd = self.context.queue.get_command_list(&self.context.device)?;
        let back_buffer = self.swapchain.back_buffer(image_index);

        if self.raytracing_enabled {
            let storage = self
                .storage_image
                .as_ref()
                .ok_or_else(|| anyhow!("ray tracing output image missing"))?;

            unsafe {
                let barriers = [
                    transition_barrier(
                        back_buffer,
                        D3D12_RESOURCE_STATE_PRESENT,
                        D3D12_RESOURCE_STATE_COPY_DEST,
                    ),
                    transition_barrier(
                        &storage.inner,
                        D3D12_RESOURCE_STATE_COPY_SOURCE,
                        D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                    ),
                ];
                cmd.inner.ResourceBarrier(&barriers);
                drop_barriers(barriers);
            }

            app.record_raytracing_commands(self, &cmd, image_index)?;

            // Copy the traced image into the back buffer
            unsafe {
                let barriers = [transition_barrier(
                    &storage.inner,
                    D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                    D3D12_RESOURCE_STATE_COPY_SOURCE,
                )];
                cmd.inner.ResourceBarrier(&barriers);
                drop_barriers(barriers);

                cmd.inner.CopyResource(back_buffer, &storage.inner);

                let barriers = [transition_barrier(
                    back_buffer,
                    D3D12_RESOURCE_STATE_COPY_DEST,
                    D3D12_RESOURCE_STATE_PRESENT,
                )];
                cmd.inner.ResourceBarrier(&barriers);
                drop_barriers(barriers);
            }
        } else {
            unsafe {
                let barriers = [transition_barrier(
                    back_buffer,
                    D3D12_RESOURCE_STATE_PRESENT,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                )];
                cmd.inner.ResourceBarrier(&barriers);
                drop_barriers(barriers);
            }

            app.record_raster_commands(self, &cmd, image_index)?;

            unsafe {
                let barriers = [transition_barrier(
                    back_buffer,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                    D3D12_RESOURCE_STATE_PRESENT,
                )];
                cmd.inner.ResourceBarrier(&barriers);
                drop_barriers(barriers);
            }
        }

        self.frame_fence_values[image_index] = self.context.queue.execute_command_list(cmd)?;

        self.swapchain.present(self.vsync)?;

        Ok(())
    }

    fn toggle_vsync(&mut self) {
        self.vsync = !self.vsync;
        log::info!("Vsync: {}", self.vsync);
    }
}

#[derive(Debug, Default)]
pub struct FrameStats {
    pub frame_time: Duration,
    pub frame_count: u32,
    fps_counter: u32,
    timer: Duration,
}

impl FrameStats {
    const ONE_SEC: Duration = Duration::from_secs(1);

    pub fn set_frame_time(&mut self, frame_time: Duration) {
        self.frame_time = frame_time;
    }

    pub fn tick(&mut self) {
        self.frame_count += 1;
        self.timer += self.frame_time;

        // reset counter if a sec has passed
        if self.timer > Self::ONE_SEC {
            self.fps_counter = self.frame_count;
            log::debug!("FPS: {}", self.fps_counter);
            self.frame_count = 0;
            self.timer -= Self::ONE_SEC;
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps_counter
    }
}

#[test]
fn test_fps_counter_rolls_over_each_second() {
    let mut stats = FrameStats::default();
    stats.set_frame_time(Duration::from_millis(100));

    for _ in 0..11 {
        stats.tick();
    }

    assert_eq!(stats.fps(), 11);
    assert_eq!(stats.frame_count, 0);
    assert_eq!(stats.timer, Duration::from_millis(100));
}
