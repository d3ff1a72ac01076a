use anyhow::Result;
use windows::Win32::Graphics::Direct3D12::*;

use crate::Context;

pub struct DescriptorHeap {
    pub inner: ID3D12DescriptorHeap,
    increment: u32,
    capacity: u32,
    shader_visible: bool,
}

impl DescriptorHeap {
    pub fn cpu_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        debug_assert!(index < self.capacity);
        let start = unsafe { self.inner.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index as usize * self.increment as usize,
        }
    }

    pub fn gpu_handle(&self, index: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        debug_assert!(self.shader_visible && index < self.capacity);
        let start = unsafe { self.inner.GetGPUDescriptorHandleForHeapStart() };
        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index as u64 * self.increment as u64,
        }
    }
}

impl Context {
    pub fn create_descriptor_heap(
        &self,
        kind: D3D12_DESCRIPTOR_HEAP_TYPE,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeap> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: kind,
            NumDescriptors: capacity,
            Flags: if shader_visible {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };
        let inner: ID3D12DescriptorHeap = unsafe { self.device.CreateDescriptorHeap(&desc)? };
        let increment = unsafe { self.device.GetDescriptorHandleIncrementSize(kind) };

        Ok(DescriptorHeap {
            inner,
            increment,
            capacity,
            shader_visible,
        })
    }
}
