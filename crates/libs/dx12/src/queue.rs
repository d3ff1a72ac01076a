use std::collections::VecDeque;

use anyhow::Result;
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject};
use windows::Win32::System::WindowsProgramming::INFINITE;

/// An open command list together with the allocator backing it. The allocator
/// can only be recycled once the GPU has finished the recorded work, so the
/// pair travels back to the queue on execute.
pub struct CommandList {
    pub inner: ID3D12GraphicsCommandList4,
    pub(crate) allocator: ID3D12CommandAllocator,
}

pub struct CommandQueue {
    pub inner: ID3D12CommandQueue,
    fence: ID3D12Fence,
    fence_event: HANDLE,
    next_fence_value: u64,
    kind: D3D12_COMMAND_LIST_TYPE,
    free_allocators: VecDeque<(u64, ID3D12CommandAllocator)>,
    free_lists: VecDeque<ID3D12GraphicsCommandList4>,
}

impl CommandQueue {
    pub(crate) fn new(device: &ID3D12Device5, kind: D3D12_COMMAND_LIST_TYPE) -> Result<Self> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: kind,
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        let inner: ID3D12CommandQueue = unsafe { device.CreateCommandQueue(&desc)? };
        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE)? };
        let fence_event = unsafe { CreateEventA(None, false, false, None)? };

        Ok(Self {
            inner,
            fence,
            fence_event,
            next_fence_value: 1,
            kind,
            free_allocators: VecDeque::new(),
            free_lists: VecDeque::new(),
        })
    }

    /// Returns an open command list, reusing a retired allocator and list when
    /// the fence shows the GPU is done with them.
    pub fn get_command_list(&mut self, device: &ID3D12Device5) -> Result<CommandList> {
        let allocator = match self.free_allocators.pop_front() {
            Some((ready_value, allocator)) if self.is_fence_complete(ready_value) => {
                unsafe { allocator.Reset()? };
                allocator
            }
            Some(entry) => {
                self.free_allocators.push_front(entry);
                unsafe { device.CreateCommandAllocator(self.kind)? }
            }
            None => unsafe { device.CreateCommandAllocator(self.kind)? },
        };

        let inner = match self.free_lists.pop_front() {
            Some(list) => {
                unsafe { list.Reset(&allocator, None)? };
                list
            }
            None => unsafe { device.CreateCommandList(0, self.kind, &allocator, None)? },
        };

        Ok(CommandList { inner, allocator })
    }

    /// Closes and submits the list, then signals the fence. The returned value
    /// marks the point the GPU reports through [`is_fence_complete`].
    ///
    /// [`is_fence_complete`]: CommandQueue::is_fence_complete
    pub fn execute_command_list(&mut self, cmd: CommandList) -> Result<u64> {
        unsafe { cmd.inner.Close()? };
        let lists = [Some(cmd.inner.cast::<ID3D12CommandList>()?)];
        unsafe { self.inner.ExecuteCommandLists(&lists) };
        let fence_value = self.signal()?;

        self.free_allocators.push_back((fence_value, cmd.allocator));
        self.free_lists.push_back(cmd.inner);

        Ok(fence_value)
    }

    pub fn signal(&mut self) -> Result<u64> {
        let fence_value = self.next_fence_value;
        self.next_fence_value += 1;
        unsafe { self.inner.Signal(&self.fence, fence_value)? };

        Ok(fence_value)
    }

    pub fn is_fence_complete(&self, fence_value: u64) -> bool {
        unsafe { self.fence.GetCompletedValue() } >= fence_value
    }

    pub fn wait_for_fence_value(&self, fence_value: u64) -> Result<()> {
        if !self.is_fence_complete(fence_value) {
            unsafe {
                self.fence.SetEventOnCompletion(fence_value, self.fence_event)?;
                WaitForSingleObject(self.fence_event, INFINITE);
            }
        }

        Ok(())
    }

    /// Blocks until the GPU has drained everything submitted so far.
    pub fn flush(&mut self) -> Result<()> {
        let fence_value = self.signal()?;
        self.wait_for_fence_value(fence_value)
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.fence_event);
        }
    }
}
