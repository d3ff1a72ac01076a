use std::mem::ManuallyDrop;

use windows::Win32::Graphics::Direct3D12::*;

pub fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: Some(resource.clone()),
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: state_before,
                StateAfter: state_after,
            }),
        },
    }
}

/// Orders a write to `resource` before any following read or write of it on
/// the same queue. Acceleration structure builds and refits require one on the
/// destination buffer.
pub fn uav_barrier(resource: &ID3D12Resource) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_UAV,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            UAV: ManuallyDrop::new(D3D12_RESOURCE_UAV_BARRIER {
                pResource: Some(resource.clone()),
            }),
        },
    }
}

/// Releases the resource reference a barrier holds. The payload sits in a
/// union behind ManuallyDrop, so dropping the barrier value alone leaks that
/// reference; call this once the barrier has been recorded.
///
/// # Safety
/// The barrier must come from [`transition_barrier`] or [`uav_barrier`] and
/// must not have been released already.
pub unsafe fn drop_barrier(barrier: D3D12_RESOURCE_BARRIER) {
    match barrier.Type {
        D3D12_RESOURCE_BARRIER_TYPE_TRANSITION => {
            ManuallyDrop::into_inner(barrier.Anonymous.Transition);
        }
        D3D12_RESOURCE_BARRIER_TYPE_UAV => {
            ManuallyDrop::into_inner(barrier.Anonymous.UAV);
        }
        _ => {}
    }
}

/// See [`drop_barrier`].
///
/// # Safety
/// Same as [`drop_barrier`], for every element.
pub unsafe fn drop_barriers<const N: usize>(barriers: [D3D12_RESOURCE_BARRIER; N]) {
    for barrier in barriers {
        drop_barrier(barrier);
    }
}
