use anyhow::{anyhow, Result};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::{buffer::DEFAULT_HEAP_PROPS, Context, DescriptorHeap};

pub struct DepthBuffer {
    pub inner: ID3D12Resource,
    pub format: DXGI_FORMAT,
    dsv_heap: DescriptorHeap,
}

impl DepthBuffer {
    pub fn new(context: &Context, width: u32, height: u32) -> Result<Self> {
        let format = DXGI_FORMAT_D32_FLOAT;
        let dsv_heap = context.create_descriptor_heap(D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1, false)?;
        let inner = create_depth_texture(context, format, width, height)?;

        let mut depth = Self {
            inner,
            format,
            dsv_heap,
        };
        depth.update_view(context);

        Ok(depth)
    }

    pub fn resize(&mut self, context: &Context, width: u32, height: u32) -> Result<()> {
        self.inner = create_depth_texture(context, self.format, width, height)?;
        self.update_view(context);

        Ok(())
    }

    fn update_view(&mut self, context: &Context) {
        let desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
            Format: self.format,
            ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
            Flags: D3D12_DSV_FLAG_NONE,
            Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 },
            },
        };
        unsafe {
            context
                .device
                .CreateDepthStencilView(&self.inner, Some(&desc), self.dsv_heap.cpu_handle(0))
        };
    }

    pub fn dsv_handle(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.dsv_heap.cpu_handle(0)
    }
}

fn create_depth_texture(
    context: &Context,
    format: DXGI_FORMAT,
    width: u32,
    height: u32,
) -> Result<ID3D12Resource> {
    let clear_value = D3D12_CLEAR_VALUE {
        Format: format,
        Anonymous: D3D12_CLEAR_VALUE_0 {
            DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                Depth: 1.0,
                Stencil: 0,
            },
        },
    };
    let desc = D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        Alignment: 0,
        Width: width as u64,
        Height: height,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: format,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
    };

    let mut resource: Option<ID3D12Resource> = None;
    unsafe {
        context.device.CreateCommittedResource(
            &DEFAULT_HEAP_PROPS,
            D3D12_HEAP_FLAG_NONE,
            &desc,
            D3D12_RESOURCE_STATE_DEPTH_WRITE,
            Some(&clear_value),
            &mut resource,
        )?
    };

    resource.ok_or_else(|| anyhow!("CreateCommittedResource returned nothing"))
}
