use std::ffi::c_void;
use std::mem::size_of;

use anyhow::Result;
use windows::core::Interface;
use windows::Win32::Foundation::{BOOL, HWND};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::{Context, DescriptorHeap, FRAME_COUNT};

pub struct Swapchain {
    pub inner: IDXGISwapChain3,
    pub format: DXGI_FORMAT,
    pub width: u32,
    pub height: u32,
    pub back_buffers: Vec<ID3D12Resource>,
    rtv_heap: DescriptorHeap,
    flags: u32,
    allow_tearing: bool,
}

impl Swapchain {
    pub fn new(context: &Context, hwnd: HWND, width: u32, height: u32) -> Result<Self> {
        let format = DXGI_FORMAT_R8G8B8A8_UNORM;
        let allow_tearing = supports_tearing(context);
        log::debug!("Tearing supported: {}", allow_tearing);

        let flags = if allow_tearing {
            DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32
        } else {
            0
        };
        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: FRAME_COUNT as u32,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            Flags: flags,
            ..Default::default()
        };

        let inner: IDXGISwapChain3 = unsafe {
            context
                .factory
                .CreateSwapChainForHwnd(&context.queue.inner, hwnd, &desc, None, None)?
        }
        .cast()?;

        // Alt-Enter fullscreen toggling does not mix with the flip model.
        unsafe { context.factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER)? };

        let rtv_heap =
            context.create_descriptor_heap(D3D12_DESCRIPTOR_HEAP_TYPE_RTV, FRAME_COUNT as u32, false)?;

        let mut swapchain = Self {
            inner,
            format,
            width,
            height,
            back_buffers: Vec::new(),
            rtv_heap,
            flags,
            allow_tearing,
        };
        swapchain.update_render_target_views(context)?;

        Ok(swapchain)
    }

    fn update_render_target_views(&mut self, context: &Context) -> Result<()> {
        for i in 0..FRAME_COUNT {
            let back_buffer: ID3D12Resource = unsafe { self.inner.GetBuffer(i as u32)? };
            unsafe {
                context
                    .device
                    .CreateRenderTargetView(&back_buffer, None, self.rtv_heap.cpu_handle(i as u32))
            };
            self.back_buffers.push(back_buffer);
        }

        Ok(())
    }

    /// The caller must have flushed the queue so no back buffer is still
    /// referenced by in-flight command lists.
    pub fn resize(&mut self, context: &Context, width: u32, height: u32) -> Result<()> {
        // Buffer references must be dropped before ResizeBuffers.
        self.back_buffers.clear();

        unsafe {
            self.inner
                .ResizeBuffers(FRAME_COUNT as u32, width, height, self.format, self.flags)?
        };
        self.width = width;
        self.height = height;
        self.update_render_target_views(context)?;

        log::debug!("Swapchain resized to {}x{}", width, height);

        Ok(())
    }

    pub fn current_back_buffer_index(&self) -> usize {
        unsafe { self.inner.GetCurrentBackBufferIndex() as usize }
    }

    pub fn back_buffer(&self, index: usize) -> &ID3D12Resource {
        &self.back_buffers[index]
    }

    pub fn rtv_handle(&self, index: usize) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.rtv_heap.cpu_handle(index as u32)
    }

    pub fn present(&self, vsync: bool) -> Result<()> {
        let interval = u32::from(vsync);
        let flags = if !vsync && self.allow_tearing {
            DXGI_PRESENT_ALLOW_TEARING
        } else {
            0
        };
        unsafe { self.inner.Present(interval, flags) }.ok()?;

        Ok(())
    }
}

fn supports_tearing(context: &Context) -> bool {
    let mut support = BOOL::default();
    if let Ok(factory5) = context.factory.cast::<IDXGIFactory5>() {
        let checked = unsafe {
            factory5.CheckFeatureSupport(
                DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                &mut support as *mut _ as *mut c_void,
                size_of::<BOOL>() as u32,
            )
        };
        if checked.is_err() {
            return false;
        }
    }

    support.as_bool()
}
