use anyhow::{anyhow, bail, Result};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D12::*;

use crate::utils::WideString;
use crate::{Buffer, Context, DescriptorHeap};

use super::layout::{DispatchRegions, LocalArg, TableLayout};
use super::SHADER_IDENTIFIER_SIZE;

/// Resolves the indexed forms of [`LocalArg`] while records are written.
pub struct RecordArgs<'a> {
    pub cbv_addresses: &'a [u64],
    pub heap: &'a DescriptorHeap,
}

/// The shader table buffer plus the region layout DispatchRays needs to read
/// it. Rebuild it whenever an identifier source changes, which in practice
/// means whenever the pipeline is recreated.
pub struct ShaderBindingTable {
    pub buffer: Buffer,
    regions: DispatchRegions,
}

impl Context {
    /// Writes one record per layout entry: the export's identifier queried
    /// from the pipeline, then the local root argument right behind it.
    pub fn create_shader_binding_table(
        &self,
        pipeline: &ID3D12StateObject,
        layout: &TableLayout,
        args: &RecordArgs,
    ) -> Result<ShaderBindingTable> {
        let props: ID3D12StateObjectProperties = pipeline.cast()?;
        let identifier_size = SHADER_IDENTIFIER_SIZE as usize;

        let mut data = vec![0u8; layout.total_size() as usize];
        for (offset, record) in layout.records_with_offsets() {
            let offset = offset as usize;
            let export = WideString::new(&record.export);
            let identifier = unsafe { props.GetShaderIdentifier(export.pcwstr()) };
            if identifier.is_null() {
                bail!("pipeline exports no shader named {}", record.export);
            }
            let identifier =
                unsafe { std::slice::from_raw_parts(identifier as *const u8, identifier_size) };
            data[offset..offset + identifier_size].copy_from_slice(identifier);

            let value = match record.arg {
                LocalArg::None => None,
                LocalArg::ConstantBuffer(index) => {
                    let address = args.cbv_addresses.get(index).ok_or_else(|| {
                        anyhow!(
                            "record {} reads constant buffer {} but only {} were given",
                            record.export,
                            index,
                            args.cbv_addresses.len()
                        )
                    })?;
                    Some(*address)
                }
                LocalArg::HeapTable(slot) => Some(args.heap.gpu_handle(slot).ptr),
            };
            if let Some(value) = value {
                let arg_offset = offset + identifier_size;
                // Root arguments must sit on an 8 byte boundary in the record.
                debug_assert_eq!(arg_offset % 8, 0);
                data[arg_offset..arg_offset + 8].copy_from_slice(&value.to_le_bytes());
            }
        }

        let buffer = self.create_upload_buffer_from_data(&data)?;

        Ok(ShaderBindingTable {
            buffer,
            regions: layout.dispatch_regions(),
        })
    }
}

impl ShaderBindingTable {
    pub fn dispatch_rays_desc(&self, width: u32, height: u32) -> D3D12_DISPATCH_RAYS_DESC {
        let base = self.buffer.gpu_virtual_address();
        let regions = self.regions;

        // Empty sections keep a null start address.
        let section_start = |offset: u64, size: u64| if size == 0 { 0 } else { base + offset };

        D3D12_DISPATCH_RAYS_DESC {
            RayGenerationShaderRecord: D3D12_GPU_VIRTUAL_ADDRESS_RANGE {
                StartAddress: section_start(regions.raygen_offset, regions.raygen_size),
                SizeInBytes: regions.raygen_size,
            },
            MissShaderTable: D3D12_GPU_VIRTUAL_ADDRESS_RANGE_AND_STRIDE {
                StartAddress: section_start(regions.miss_offset, regions.miss_size),
                SizeInBytes: regions.miss_size,
                StrideInBytes: regions.miss_stride,
            },
            HitGroupTable: D3D12_GPU_VIRTUAL_ADDRESS_RANGE_AND_STRIDE {
                StartAddress: section_start(regions.hit_offset, regions.hit_size),
                SizeInBytes: regions.hit_size,
                StrideInBytes: regions.hit_stride,
            },
            CallableShaderTable: D3D12_GPU_VIRTUAL_ADDRESS_RANGE_AND_STRIDE::default(),
            Width: width,
            Height: height,
            Depth: 1,
        }
    }
}
