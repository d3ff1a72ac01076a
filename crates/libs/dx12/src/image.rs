use anyhow::{anyhow, Result};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::{buffer::DEFAULT_HEAP_PROPS, Context};

pub struct Image {
    pub inner: ID3D12Resource,
    pub format: DXGI_FORMAT,
    pub width: u32,
    pub height: u32,
}

impl Context {
    /// Creates a texture that ray generation shaders write through a UAV. The
    /// texture starts out in COPY_SOURCE, the state the per-frame barriers
    /// return it to after each dispatch.
    pub fn create_storage_image(
        &self,
        width: u32,
        height: u32,
        format: DXGI_FORMAT,
    ) -> Result<Image> {
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
            Flags: D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS,
        };

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &DEFAULT_HEAP_PROPS,
                D3D12_HEAP_FLAG_NONE,
                &desc,
                D3D12_RESOURCE_STATE_COPY_SOURCE,
                None,
                &mut resource,
            )?
        };
        let inner = resource.ok_or_else(|| anyhow!("CreateCommittedResource returned nothing"))?;

        Ok(Image {
            inner,
            format,
            width,
            height,
        })
    }
}
