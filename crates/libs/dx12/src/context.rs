use std::ffi::c_void;
use std::mem::size_of;

use anyhow::{anyhow, bail, Result};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::{CommandList, CommandQueue};

pub struct Context {
    pub queue: CommandQueue,
    pub device: ID3D12Device5,
    pub adapter: IDXGIAdapter1,
    pub factory: IDXGIFactory4,
}

pub struct ContextBuilder {
    with_raytracing: bool,
    debug_layer: bool,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            with_raytracing: false,
            debug_layer: cfg!(debug_assertions),
        }
    }

    pub fn with_raytracing(self, with_raytracing: bool) -> Self {
        Self {
            with_raytracing,
            ..self
        }
    }

    pub fn debug_layer(self, debug_layer: bool) -> Self {
        Self {
            debug_layer,
            ..self
        }
    }

    pub fn build(self) -> Result<Context> {
        Context::new(self)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    fn new(
        ContextBuilder {
            with_raytracing,
            debug_layer,
        }: ContextBuilder,
    ) -> Result<Self> {
        let mut factory_flags = 0;
        if debug_layer {
            let mut debug: Option<ID3D12Debug> = None;
            if let Some(debug) = unsafe { D3D12GetDebugInterface(&mut debug) }.ok().and(debug) {
                unsafe { debug.EnableDebugLayer() };
                log::debug!("D3D12 debug layer enabled");
            }
            factory_flags = DXGI_CREATE_FACTORY_DEBUG;
        }

        let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(factory_flags)? };

        let (adapter, device) = select_suitable_adapter(&factory)?;

        if with_raytracing {
            let mut options5 = D3D12_FEATURE_DATA_D3D12_OPTIONS5::default();
            unsafe {
                device.CheckFeatureSupport(
                    D3D12_FEATURE_D3D12_OPTIONS5,
                    &mut options5 as *mut _ as *mut c_void,
                    size_of::<D3D12_FEATURE_DATA_D3D12_OPTIONS5>() as u32,
                )?
            };
            if options5.RaytracingTier.0 < D3D12_RAYTRACING_TIER_1_0.0 {
                bail!("the selected adapter does not support DXR ray tracing");
            }
            log::debug!("Raytracing tier: {:?}", options5.RaytracingTier);
        }

        let queue = CommandQueue::new(&device, D3D12_COMMAND_LIST_TYPE_DIRECT)?;

        Ok(Self {
            queue,
            device,
            adapter,
            factory,
        })
    }
}

fn select_suitable_adapter(factory: &IDXGIFactory4) -> Result<(IDXGIAdapter1, ID3D12Device5)> {
    log::debug!("Choosing DXGI adapter");

    for i in 0.. {
        let adapter = match unsafe { factory.EnumAdapters1(i) } {
            Ok(adapter) => adapter,
            Err(_) => break,
        };

        let desc = unsafe { adapter.GetDesc1()? };
        if desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0 {
            // Skip the Basic Render Driver adapter.
            continue;
        }

        let mut device: Option<ID3D12Device5> = None;
        if unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_12_1, &mut device) }.is_ok() {
            if let Some(device) = device {
                let name = String::from_utf16_lossy(&desc.Description);
                log::info!("Selected adapter: {}", name.trim_end_matches('\0'));
                return Ok((adapter, device));
            }
        }
    }

    Err(anyhow!("Could not find a suitable adapter"))
}

impl Context {
    /// Blocks until the GPU is idle on the direct queue.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.queue.flush()
    }

    pub fn execute_one_time_commands<R, F: FnOnce(&CommandList) -> R>(
        &mut self,
        executor: F,
    ) -> Result<R> {
        let cmd = self.queue.get_command_list(&self.device)?;

        // Execute user function
        let executor_result = executor(&cmd);

        // Submit and wait
        let fence_value = self.queue.execute_command_list(cmd)?;
        self.queue.wait_for_fence_value(fence_value)?;

        Ok(executor_result)
    }
}
