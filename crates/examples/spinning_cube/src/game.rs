use std::ffi::c_void;
use std::mem::size_of;

use app::anyhow::Result;
use app::dx12::windows::core::s;
use app::dx12::windows::Win32::Foundation::RECT;
use app::dx12::windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST;
use app::dx12::windows::Win32::Graphics::Direct3D12::*;
use app::dx12::windows::Win32::Graphics::Dxgi::Common::*;
use app::dx12::{
    compile_hlsl, create_root_signature, Buffer, CommandList, Context, GraphicsPipelineCreateInfo,
    RootParam,
};
use app::{App, BaseApp, FrameStats};
use glam::{vec3, Mat4, Vec3};
use memoffset::offset_of;

const CUBE_SHADERS: &str = include_str!("../shaders/cube.hlsl");

const CLEAR_COLOR: [f32; 4] = [0.4, 0.6, 0.9, 1.0];

/// Radians per second around the spin axis.
const ROTATION_SPEED: f32 = std::f32::consts::FRAC_PI_2;

const CUBE_INDICES: [u16; 36] = [
    0, 1, 2, 0, 2, 3, // front
    4, 6, 5, 4, 7, 6, // back
    4, 5, 1, 4, 1, 0, // left
    3, 2, 6, 3, 6, 7, // right
    1, 5, 6, 1, 6, 2, // top
    4, 0, 3, 4, 3, 7, // bottom
];

pub struct SpinningCube {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    root_signature: ID3D12RootSignature,
    pipeline: ID3D12PipelineState,
    angle: f32,
    mvp: Mat4,
}

impl App for SpinningCube {
    fn new(base: &mut BaseApp<Self>) -> Result<Self> {
        let context = &mut base.context;

        let vertex_buffer = create_vertex_buffer(context)?;
        let index_buffer =
            context.create_gpu_buffer_from_data(&CUBE_INDICES, D3D12_RESOURCE_STATE_INDEX_BUFFER)?;

        // The whole model-view-projection matrix fits in root constants.
        let root_signature = create_root_signature(
            &context.device,
            &[RootParam::Constants {
                shader_register: 0,
                num_32bit_values: 16,
            }],
            D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        )?;

        let pipeline = create_pipeline(
            context,
            &root_signature,
            base.swapchain.format,
            base.depth.format,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            root_signature,
            pipeline,
            angle: 0.0,
            mvp: Mat4::IDENTITY,
        })
    }

    fn update(
        &mut self,
        base: &mut BaseApp<Self>,
        _image_index: usize,
        frame_stats: &FrameStats,
    ) -> Result<()> {
        self.angle += ROTATION_SPEED * frame_stats.frame_time.as_secs_f32();

        let aspect = base.swapchain.width as f32 / base.swapchain.height as f32;
        let projection = Mat4::perspective_lh(45f32.to_radians(), aspect, 0.1, 100.0);
        let view = Mat4::look_at_lh(vec3(0.0, 0.0, -10.0), Vec3::ZERO, Vec3::Y);
        let model = Mat4::from_axis_angle(vec3(0.0, 1.0, 1.0).normalize(), self.angle);
        self.mvp = projection * view * model;

        Ok(())
    }

    fn record_raster_commands(
        &self,
        base: &BaseApp<Self>,
        cmd: &CommandList,
        image_index: usize,
    ) -> Result<()> {
        let rtv = base.swapchain.rtv_handle(image_index);
        let dsv = base.depth.dsv_handle();

        let vertex_buffer_view = D3D12_VERTEX_BUFFER_VIEW {
            BufferLocation: self.vertex_buffer.gpu_virtual_address(),
            SizeInBytes: self.vertex_buffer.size as u32,
            StrideInBytes: size_of::<Vertex>() as u32,
        };
        let index_buffer_view = D3D12_INDEX_BUFFER_VIEW {
            BufferLocation: self.index_buffer.gpu_virtual_address(),
            SizeInBytes: self.index_buffer.size as u32,
            Format: DXGI_FORMAT_R16_UINT,
        };
        let viewport = D3D12_VIEWPORT {
            Width: base.swapchain.width as f32,
            Height: base.swapchain.height as f32,
            MaxDepth: 1.0,
            ..Default::default()
        };
        let scissor = RECT {
            right: base.swapchain.width as i32,
            bottom: base.swapchain.height as i32,
            ..Default::default()
        };

        unsafe {
            cmd.inner.ClearRenderTargetView(rtv, CLEAR_COLOR.as_ptr(), &[]);
            cmd.inner
                .ClearDepthStencilView(dsv, D3D12_CLEAR_FLAG_DEPTH, 1.0, 0, &[]);

            cmd.inner.SetPipelineState(&self.pipeline);
            cmd.inner.SetGraphicsRootSignature(&self.root_signature);
            cmd.inner
                .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            cmd.inner.IASetVertexBuffers(0, Some(&[vertex_buffer_view]));
            cmd.inner.IASetIndexBuffer(Some(&index_buffer_view));
            cmd.inner.RSSetViewports(&[viewport]);
            cmd.inner.RSSetScissorRects(&[scissor]);
            cmd.inner
                .OMSetRenderTargets(1, Some(&rtv), false, Some(&dsv));

            cmd.inner.SetGraphicsRoot32BitConstants(
                0,
                16,
                self.mvp.as_ref().as_ptr() as *const c_void,
                0,
            );
            cmd.inner
                .DrawIndexedInstanced(CUBE_INDICES.len() as u32, 1, 0, 0, 0);
        }

        Ok(())
    }

    fn on_recreate_swapchain(&mut self, _: &BaseApp<Self>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
#[repr(C)]
struct Vertex {
    position: Vec3,
    color: Vec3,
}

fn create_vertex_buffer(context: &mut Context) -> Result<Buffer> {
    let vertices: [Vertex; 8] = [
        Vertex {
            position: vec3(-1.0, -1.0, -1.0),
            color: vec3(0.0, 0.0, 0.0),
        },
        Vertex {
            position: vec3(-1.0, 1.0, -1.0),
            color: vec3(0.0, 1.0, 0.0),
        },
        Vertex {
            position: vec3(1.0, 1.0, -1.0),
            color: vec3(1.0, 1.0, 0.0),
        },
        Vertex {
            position: vec3(1.0, -1.0, -1.0),
            color: vec3(1.0, 0.0, 0.0),
        },
        Vertex {
            position: vec3(-1.0, -1.0, 1.0),
            color: vec3(0.0, 0.0, 1.0),
        },
        Vertex {
            position: vec3(-1.0, 1.0, 1.0),
            color: vec3(0.0, 1.0, 1.0),
        },
        Vertex {
            position: vec3(1.0, 1.0, 1.0),
            color: vec3(1.0, 1.0, 1.0),
        },
        Vertex {
            position: vec3(1.0, -1.0, 1.0),
            color: vec3(1.0, 0.0, 1.0),
        },
    ];

    let vertex_buffer = context.create_gpu_buffer_from_data(
        &vertices,
        D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
    )?;

    Ok(vertex_buffer)
}

fn create_pipeline(
    context: &Context,
    root_signature: &ID3D12RootSignature,
    rtv_format: DXGI_FORMAT,
    dsv_format: DXGI_FORMAT,
) -> Result<ID3D12PipelineState> {
    let vertex_shader = compile_hlsl(CUBE_SHADERS, "VSMain", "vs_6_0")?;
    let pixel_shader = compile_hlsl(CUBE_SHADERS, "PSMain", "ps_6_0")?;

    let input_layout = [
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: s!("POSITION"),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32B32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: offset_of!(Vertex, position) as u32,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: s!("COLOR"),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32B32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: offset_of!(Vertex, color) as u32,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
    ];

    let pipeline = context.create_graphics_pipeline(GraphicsPipelineCreateInfo {
        vertex_shader: &vertex_shader,
        pixel_shader: &pixel_shader,
        input_layout: &input_layout,
        root_signature,
        rtv_format,
        dsv_format,
    })?;

    Ok(pipeline)
}

#[test]
fn test_cube_indices_form_twelve_triangles() {
    assert_eq!(CUBE_INDICES.len(), 36);
    assert!(CUBE_INDICES.iter().all(|&i| i < 8));

    // No degenerate triangles.
    for triangle in CUBE_INDICES.chunks_exact(3) {
        assert!(triangle[0] != triangle[1]);
        assert!(triangle[1] != triangle[2]);
        assert!(triangle[0] != triangle[2]);
    }
}
