use std::mem::size_of;

use anyhow::{anyhow, bail, Result};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::buffer::{DEFAULT_HEAP_PROPS, UPLOAD_HEAP_PROPS};
use crate::{
    drop_barriers, instance_transform_rows, uav_barrier, Buffer, CommandList, Context,
    InstanceRecord, TableLayout,
};

const INSTANCE_MASK_ALL: u32 = 0xFF;

/// Result and scratch of one acceleration structure build. Scratch stays
/// alive with the structure: the GPU reads it during the build, and top-level
/// refits keep reusing it.
pub struct AccelerationStructureBuffers {
    pub scratch: Buffer,
    pub result: Buffer,
}

/// One triangle geometry feeding a bottom-level build. Positions are read as
/// three consecutive 32-bit floats every `vertex_stride` bytes.
pub struct TriangleGeometry<'a> {
    pub vertex_buffer: &'a Buffer,
    pub vertex_count: u32,
    pub vertex_stride: u64,
}

pub struct BottomLevel {
    pub buffers: AccelerationStructureBuffers,
}

impl BottomLevel {
    /// Records a build over the given geometries. The caller owns the command
    /// list and may batch several builds before executing; the vertex buffers
    /// must stay alive until the list completes.
    pub fn build(
        context: &Context,
        cmd: &CommandList,
        geometries: &[TriangleGeometry],
    ) -> Result<Self> {
        if geometries.is_empty() {
            bail!("bottom-level build needs at least one geometry");
        }

        let geometry_descs: Vec<D3D12_RAYTRACING_GEOMETRY_DESC> = geometries
            .iter()
            .map(|geometry| D3D12_RAYTRACING_GEOMETRY_DESC {
                Type: D3D12_RAYTRACING_GEOMETRY_TYPE_TRIANGLES,
                Flags: D3D12_RAYTRACING_GEOMETRY_FLAG_OPAQUE,
                Anonymous: D3D12_RAYTRACING_GEOMETRY_DESC_0 {
                    Triangles: D3D12_RAYTRACING_GEOMETRY_TRIANGLES_DESC {
                        Transform3x4: 0,
                        IndexFormat: DXGI_FORMAT_UNKNOWN,
                        VertexFormat: DXGI_FORMAT_R32G32B32_FLOAT,
                        IndexCount: 0,
                        VertexCount: geometry.vertex_count,
                        IndexBuffer: 0,
                        VertexBuffer: D3D12_GPU_VIRTUAL_ADDRESS_AND_STRIDE {
                            StartAddress: geometry.vertex_buffer.gpu_virtual_address(),
                            StrideInBytes: geometry.vertex_stride,
                        },
                    },
                },
            })
            .collect();

        let inputs = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS {
            Type: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_TYPE_BOTTOM_LEVEL,
            Flags: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_BUILD_FLAG_NONE,
            NumDescs: geometry_descs.len() as u32,
            DescsLayout: D3D12_ELEMENTS_LAYOUT_ARRAY,
            Anonymous: D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS_0 {
                pGeometryDescs: geometry_descs.as_ptr(),
            },
        };

        let buffers = create_acceleration_structure_buffers(context, &inputs)?;

        let desc = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_DESC {
            DestAccelerationStructureData: buffers.result.gpu_virtual_address(),
            Inputs: inputs,
            SourceAccelerationStructureData: 0,
            ScratchAccelerationStructureData: buffers.scratch.gpu_virtual_address(),
        };
        unsafe {
            cmd.inner.BuildRaytracingAccelerationStructure(&desc, None);
            // The result must be fully written before anything traverses it.
            let barriers = [uav_barrier(&buffers.result.inner)];
            cmd.inner.ResourceBarrier(&barriers);
            drop_barriers(barriers);
        }

        Ok(Self { buffers })
    }

    pub fn gpu_virtual_address(&self) -> u64 {
        self.buffers.result.gpu_virtual_address()
    }
}

pub struct TopLevel {
    pub buffers: AccelerationStructureBuffers,
    instance_buffer: Buffer,
    instance_count: u32,
    contributions: Vec<u32>,
}

impl TopLevel {
    /// Records the initial build. The structure is always built with
    /// ALLOW_UPDATE so later frames can refit it in place.
    ///
    /// Hit-group contributions are taken from `layout`, which must describe
    /// the same instances in the same order.
    pub fn build(
        context: &Context,
        cmd: &CommandList,
        blas: &[BottomLevel],
        instances: &[InstanceRecord],
        layout: &TableLayout,
    ) -> Result<Self> {
        if instances.len() != layout.instance_count() {
            bail!(
                "instance list ({}) does not match table layout ({} instances)",
                instances.len(),
                layout.instance_count()
            );
        }

        let mut inputs = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS {
            Type: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_TYPE_TOP_LEVEL,
            Flags: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_BUILD_FLAG_ALLOW_UPDATE,
            NumDescs: instances.len() as u32,
            DescsLayout: D3D12_ELEMENTS_LAYOUT_ARRAY,
            Anonymous: D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS_0 {
                InstanceDescs: 0,
            },
        };

        let buffers = create_acceleration_structure_buffers(context, &inputs)?;

        let instance_buffer = context.create_buffer(
            (instances.len() * size_of::<D3D12_RAYTRACING_INSTANCE_DESC>()) as u64,
            &UPLOAD_HEAP_PROPS,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )?;

        let contributions: Vec<u32> = (0..instances.len())
            .map(|i| layout.instance_contribution(i))
            .collect();
        write_instance_descs(&instance_buffer, blas, instances, &contributions)?;
        inputs.Anonymous.InstanceDescs = instance_buffer.gpu_virtual_address();

        let desc = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_DESC {
            DestAccelerationStructureData: buffers.result.gpu_virtual_address(),
            Inputs: inputs,
            SourceAccelerationStructureData: 0,
            ScratchAccelerationStructureData: buffers.scratch.gpu_virtual_address(),
        };
        unsafe {
            cmd.inner.BuildRaytracingAccelerationStructure(&desc, None);
            let barriers = [uav_barrier(&buffers.result.inner)];
            cmd.inner.ResourceBarrier(&barriers);
            drop_barriers(barriers);
        }

        Ok(Self {
            buffers,
            instance_buffer,
            instance_count: instances.len() as u32,
            contributions,
        })
    }

    /// Rewrites the instance buffer with fresh transforms and records an
    /// in-place update (source == destination). Geometry counts cannot change
    /// in an update, only instance data.
    pub fn record_refit(
        &self,
        cmd: &CommandList,
        blas: &[BottomLevel],
        instances: &[InstanceRecord],
    ) -> Result<()> {
        if instances.len() as u32 != self.instance_count {
            bail!(
                "refit with {} instances, structure was built with {}",
                instances.len(),
                self.instance_count
            );
        }

        write_instance_descs(&self.instance_buffer, blas, instances, &self.contributions)?;

        let result_address = self.buffers.result.gpu_virtual_address();
        let inputs = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS {
            Type: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_TYPE_TOP_LEVEL,
            Flags: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_BUILD_FLAG_ALLOW_UPDATE
                | D3D12_RAYTRACING_ACCELERATION_STRUCTURE_BUILD_FLAG_PERFORM_UPDATE,
            NumDescs: self.instance_count,
            DescsLayout: D3D12_ELEMENTS_LAYOUT_ARRAY,
            Anonymous: D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS_0 {
                InstanceDescs: self.instance_buffer.gpu_virtual_address(),
            },
        };

        let desc = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_DESC {
            DestAccelerationStructureData: result_address,
            Inputs: inputs,
            SourceAccelerationStructureData: result_address,
            ScratchAccelerationStructureData: self.buffers.scratch.gpu_virtual_address(),
        };

        unsafe {
            // The update reads the current structure, so rays from the
            // previous frame must be done traversing it first.
            let barriers = [uav_barrier(&self.buffers.result.inner)];
            cmd.inner.ResourceBarrier(&barriers);
            drop_barriers(barriers);

            cmd.inner.BuildRaytracingAccelerationStructure(&desc, None);

            let barriers = [uav_barrier(&self.buffers.result.inner)];
            cmd.inner.ResourceBarrier(&barriers);
            drop_barriers(barriers);
        }

        Ok(())
    }

    pub fn gpu_virtual_address(&self) -> u64 {
        self.buffers.result.gpu_virtual_address()
    }
}

fn create_acceleration_structure_buffers(
    context: &Context,
    inputs: &D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS,
) -> Result<AccelerationStructureBuffers> {
    let mut info = D3D12_RAYTRACING_ACCELERATION_STRUCTURE_PREBUILD_INFO::default();
    unsafe {
        context
            .device
            .GetRaytracingAccelerationStructurePrebuildInfo(inputs, &mut info)
    };

    let scratch = context.create_buffer(
        info.ScratchDataSizeInBytes,
        &DEFAULT_HEAP_PROPS,
        D3D12_RESOURCE_STATE_COMMON,
        D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS,
    )?;
    let result = context.create_buffer(
        info.ResultDataMaxSizeInBytes,
        &DEFAULT_HEAP_PROPS,
        D3D12_RESOURCE_STATE_RAYTRACING_ACCELERATION_STRUCTURE,
        D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS,
    )?;

    Ok(AccelerationStructureBuffers { scratch, result })
}

fn write_instance_descs(
    instance_buffer: &Buffer,
    blas: &[BottomLevel],
    instances: &[InstanceRecord],
    contributions: &[u32],
) -> Result<()> {
    let mut descs = Vec::with_capacity(instances.len());
    for (i, instance) in instances.iter().enumerate() {
        let bottom = blas.get(instance.blas_index).ok_or_else(|| {
            anyhow!(
                "instance {} references unknown bottom-level structure {}",
                i,
                instance.blas_index
            )
        })?;
        debug_assert!(instance.instance_id < 1 << 24);
        debug_assert!(contributions[i] < 1 << 24);

        // The first instance keeps matrix memory order, the rest are stored
        // transposed. See instance_transform_rows.
        descs.push(D3D12_RAYTRACING_INSTANCE_DESC {
            Transform: instance_transform_rows(&instance.transform, i != 0),
            _bitfield1: (instance.instance_id | INSTANCE_MASK_ALL << 24) as _,
            _bitfield2: (contributions[i]
                | (D3D12_RAYTRACING_INSTANCE_FLAG_NONE.0 as u32) << 24) as _,
            AccelerationStructure: bottom.gpu_virtual_address(),
        });
    }

    instance_buffer.copy_data_to_buffer(&descs)
}
