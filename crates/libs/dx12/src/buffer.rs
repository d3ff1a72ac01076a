use std::mem::size_of_val;

use anyhow::{anyhow, Result};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::utils::compute_aligned_size;
use crate::{drop_barriers, transition_barrier, Context};

pub const UPLOAD_HEAP_PROPS: D3D12_HEAP_PROPERTIES = D3D12_HEAP_PROPERTIES {
    Type: D3D12_HEAP_TYPE_UPLOAD,
    CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
    MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
    CreationNodeMask: 1,
    VisibleNodeMask: 1,
};

pub const DEFAULT_HEAP_PROPS: D3D12_HEAP_PROPERTIES = D3D12_HEAP_PROPERTIES {
    Type: D3D12_HEAP_TYPE_DEFAULT,
    CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
    MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
    CreationNodeMask: 1,
    VisibleNodeMask: 1,
};

pub struct Buffer {
    pub inner: ID3D12Resource,
    pub size: u64,
}

impl Buffer {
    pub(crate) fn new(
        device: &ID3D12Device5,
        size: u64,
        heap_props: &D3D12_HEAP_PROPERTIES,
        initial_state: D3D12_RESOURCE_STATES,
        flags: D3D12_RESOURCE_FLAGS,
    ) -> Result<Self> {
        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Alignment: 0,
            Width: size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DXGI_FORMAT_UNKNOWN,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: flags,
        };

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            device.CreateCommittedResource(
                heap_props,
                D3D12_HEAP_FLAG_NONE,
                &desc,
                initial_state,
                None,
                &mut resource,
            )?
        };
        let inner = resource.ok_or_else(|| anyhow!("CreateCommittedResource returned nothing"))?;

        Ok(Self { inner, size })
    }

    /// Only valid for buffers on the upload heap.
    pub fn copy_data_to_buffer<T: Copy>(&self, data: &[T]) -> Result<()> {
        unsafe {
            let mut ptr = std::ptr::null_mut();
            self.inner.Map(0, None, Some(&mut ptr))?;
            std::ptr::copy_nonoverlapping(
                data.as_ptr() as *const u8,
                ptr as *mut u8,
                size_of_val(data),
            );
            self.inner.Unmap(0, None);
        };

        Ok(())
    }

    pub fn gpu_virtual_address(&self) -> u64 {
        unsafe { self.inner.GetGPUVirtualAddress() }
    }
}

impl Context {
    pub fn create_buffer(
        &self,
        size: u64,
        heap_props: &D3D12_HEAP_PROPERTIES,
        initial_state: D3D12_RESOURCE_STATES,
        flags: D3D12_RESOURCE_FLAGS,
    ) -> Result<Buffer> {
        Buffer::new(&self.device, size, heap_props, initial_state, flags)
    }

    pub fn create_upload_buffer_from_data<T: Copy>(&self, data: &[T]) -> Result<Buffer> {
        let buffer = Buffer::new(
            &self.device,
            size_of_val(data) as u64,
            &UPLOAD_HEAP_PROPS,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )?;
        buffer.copy_data_to_buffer(data)?;

        Ok(buffer)
    }

    /// Creates a buffer on the default heap and fills it through an upload
    /// staging buffer, leaving it in `final_state`.
    pub fn create_gpu_buffer_from_data<T: Copy>(
        &mut self,
        data: &[T],
        final_state: D3D12_RESOURCE_STATES,
    ) -> Result<Buffer> {
        let size = size_of_val(data) as u64;
        let staging = self.create_upload_buffer_from_data(data)?;
        let buffer = Buffer::new(
            &self.device,
            size,
            &DEFAULT_HEAP_PROPS,
            D3D12_RESOURCE_STATE_COPY_DEST,
            D3D12_RESOURCE_FLAG_NONE,
        )?;

        self.execute_one_time_commands(|cmd| unsafe {
            cmd.inner.CopyBufferRegion(&buffer.inner, 0, &staging.inner, 0, size);
            let barriers = [transition_barrier(
                &buffer.inner,
                D3D12_RESOURCE_STATE_COPY_DEST,
                final_state,
            )];
            cmd.inner.ResourceBarrier(&barriers);
            drop_barriers(barriers);
        })?;

        Ok(buffer)
    }

    /// Upload-heap buffer for root or descriptor CBV binding, sized up to the
    /// 256 byte constant-buffer placement alignment.
    pub fn create_constant_buffer_from_data<T: Copy>(&self, data: &[T]) -> Result<Buffer> {
        let size = compute_aligned_size(
            size_of_val(data) as u64,
            D3D12_CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT as u64,
        );
        let buffer = Buffer::new(
            &self.device,
            size,
            &UPLOAD_HEAP_PROPS,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )?;
        buffer.copy_data_to_buffer(data)?;

        Ok(buffer)
    }
}
