use std::ffi::c_void;
use std::ptr::null;

use anyhow::{anyhow, bail, Result};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::Context;

pub struct DescriptorRange {
    pub kind: D3D12_DESCRIPTOR_RANGE_TYPE,
    pub base_register: u32,
    pub count: u32,
    pub table_offset: u32,
}

pub enum RootParam {
    DescriptorTable(Vec<DescriptorRange>),
    Cbv { shader_register: u32 },
    Constants { shader_register: u32, num_32bit_values: u32 },
}

/// Serializes and creates a root signature from the given parameters. Each
/// parameter keeps its position, so parameter N here is root parameter N at
/// bind time.
pub fn create_root_signature(
    device: &ID3D12Device5,
    params: &[RootParam],
    flags: D3D12_ROOT_SIGNATURE_FLAGS,
) -> Result<ID3D12RootSignature> {
    // Range arrays must stay alive until serialization is done.
    let ranges: Vec<Vec<D3D12_DESCRIPTOR_RANGE>> = params
        .iter()
        .map(|param| match param {
            RootParam::DescriptorTable(ranges) => ranges
                .iter()
                .map(|range| D3D12_DESCRIPTOR_RANGE {
                    RangeType: range.kind,
                    NumDescriptors: range.count,
                    BaseShaderRegister: range.base_register,
                    RegisterSpace: 0,
                    OffsetInDescriptorsFromTableStart: range.table_offset,
                })
                .collect(),
            _ => Vec::new(),
        })
        .collect();

    let lowered: Vec<D3D12_ROOT_PARAMETER> = params
        .iter()
        .zip(ranges.iter())
        .map(|(param, ranges)| match param {
            RootParam::DescriptorTable(_) => D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                        NumDescriptorRanges: ranges.len() as u32,
                        pDescriptorRanges: ranges.as_ptr(),
                    },
                },
                ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            },
            RootParam::Cbv { shader_register } => D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_CBV,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    Descriptor: D3D12_ROOT_DESCRIPTOR {
                        ShaderRegister: *shader_register,
                        RegisterSpace: 0,
                    },
                },
                ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            },
            RootParam::Constants {
                shader_register,
                num_32bit_values,
            } => D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    Constants: D3D12_ROOT_CONSTANTS {
                        ShaderRegister: *shader_register,
                        RegisterSpace: 0,
                        Num32BitValues: *num_32bit_values,
                    },
                },
                ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            },
        })
        .collect();

    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: lowered.len() as u32,
        pParameters: if lowered.is_empty() {
            null()
        } else {
            lowered.as_ptr()
        },
        NumStaticSamplers: 0,
        pStaticSamplers: null(),
        Flags: flags,
    };

    let mut blob: Option<ID3DBlob> = None;
    let mut error: Option<ID3DBlob> = None;
    let serialized = unsafe {
        D3D12SerializeRootSignature(
            &desc,
            D3D_ROOT_SIGNATURE_VERSION_1,
            &mut blob,
            Some(&mut error),
        )
    };
    if serialized.is_err() {
        let message = error
            .map(|blob| blob_to_string(&blob))
            .unwrap_or_else(|| "no error blob".to_string());
        bail!("root signature serialization failed: {}", message);
    }
    let blob = blob.ok_or_else(|| anyhow!("D3D12SerializeRootSignature returned nothing"))?;

    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };
    let root_signature = unsafe { device.CreateRootSignature(0, bytes)? };

    Ok(root_signature)
}

fn blob_to_string(blob: &ID3DBlob) -> String {
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };

    String::from_utf8_lossy(bytes).trim_end().to_string()
}

pub struct GraphicsPipelineCreateInfo<'a> {
    pub vertex_shader: &'a [u8],
    pub pixel_shader: &'a [u8],
    pub input_layout: &'a [D3D12_INPUT_ELEMENT_DESC],
    pub root_signature: &'a ID3D12RootSignature,
    pub rtv_format: DXGI_FORMAT,
    pub dsv_format: DXGI_FORMAT,
}

impl Context {
    pub fn create_graphics_pipeline(
        &self,
        info: GraphicsPipelineCreateInfo,
    ) -> Result<ID3D12PipelineState> {
        let mut desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: Some(info.root_signature.clone()),
            VS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: info.vertex_shader.as_ptr() as *const c_void,
                BytecodeLength: info.vertex_shader.len(),
            },
            PS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: info.pixel_shader.as_ptr() as *const c_void,
                BytecodeLength: info.pixel_shader.len(),
            },
            BlendState: default_blend_desc(),
            SampleMask: u32::MAX,
            RasterizerState: default_rasterizer_desc(),
            DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
                DepthEnable: true.into(),
                DepthWriteMask: D3D12_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D12_COMPARISON_FUNC_LESS,
                ..Default::default()
            },
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: info.input_layout.as_ptr(),
                NumElements: info.input_layout.len() as u32,
            },
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            NumRenderTargets: 1,
            DSVFormat: info.dsv_format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            ..Default::default()
        };
        desc.RTVFormats[0] = info.rtv_format;

        let pipeline: ID3D12PipelineState =
            unsafe { self.device.CreateGraphicsPipelineState(&desc)? };

        Ok(pipeline)
    }
}

fn default_rasterizer_desc() -> D3D12_RASTERIZER_DESC {
    D3D12_RASTERIZER_DESC {
        FillMode: D3D12_FILL_MODE_SOLID,
        CullMode: D3D12_CULL_MODE_BACK,
        DepthClipEnable: true.into(),
        ..Default::default()
    }
}

fn default_blend_desc() -> D3D12_BLEND_DESC {
    let render_target = D3D12_RENDER_TARGET_BLEND_DESC {
        SrcBlend: D3D12_BLEND_ONE,
        DestBlend: D3D12_BLEND_ZERO,
        BlendOp: D3D12_BLEND_OP_ADD,
        SrcBlendAlpha: D3D12_BLEND_ONE,
        DestBlendAlpha: D3D12_BLEND_ZERO,
        BlendOpAlpha: D3D12_BLEND_OP_ADD,
        LogicOp: D3D12_LOGIC_OP_NOOP,
        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
        ..Default::default()
    };

    D3D12_BLEND_DESC {
        RenderTarget: [render_target; 8],
        ..Default::default()
    }
}
