use std::mem::size_of;

use app::anyhow::{anyhow, Result};
use app::dx12::windows::Win32::Graphics::Direct3D12::*;
use app::dx12::windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN;
use app::dx12::{
    compile_hlsl_library, create_global_root_signature, create_local_root_signature, BottomLevel,
    Buffer, CommandList, Context, DescriptorHeap, DescriptorRange, Image, InstanceRecord,
    LocalArg, RecordArgs, RootParam, ShaderBindingTable, StateObjectBuilder, TableLayout,
    TopLevel, TriangleGeometry,
};
use app::{App, BaseApp, FrameStats};
use glam::{vec3, Mat4, Vec3};

const RAYTRACING_SHADERS: &str = include_str!("../shaders/raytracing.hlsl");

const SHADER_EXPORTS: [&str; 6] = [
    "rayGen",
    "miss",
    "triangleChs",
    "planeChs",
    "shadowChs",
    "shadowMiss",
];

/// Radians per second for the two side triangles.
const ROTATION_SPEED: f32 = 0.3;

/// Per-instance triangle colors, one constant buffer each. Every buffer
/// holds the three corner colors the closest-hit shader blends.
const INSTANCE_COLORS: [[[f32; 4]; 3]; 3] = [
    [
        [1.0, 0.0, 0.0, 1.0],
        [0.0, 1.0, 0.0, 1.0],
        [0.0, 0.0, 1.0, 1.0],
    ],
    [
        [0.0, 1.0, 0.0, 1.0],
        [0.0, 0.0, 1.0, 1.0],
        [1.0, 0.0, 0.0, 1.0],
    ],
    [
        [0.0, 0.0, 1.0, 1.0],
        [1.0, 0.0, 0.0, 1.0],
        [0.0, 1.0, 0.0, 1.0],
    ],
];

pub struct TrianglesRefit {
    _vertex_buffers: [Buffer; 2],
    _constant_buffers: Vec<Buffer>,
    blas: Vec<BottomLevel>,
    tlas: TopLevel,
    global_root_signature: ID3D12RootSignature,
    pipeline: ID3D12StateObject,
    sbt: ShaderBindingTable,
    heap: DescriptorHeap,
    instances: Vec<InstanceRecord>,
    angle: f32,
}

impl App for TrianglesRefit {
    fn new(base: &mut BaseApp<Self>) -> Result<Self> {
        let context = &mut base.context;

        let vertex_buffers = create_vertex_buffers(context)?;
        let vertex_stride = size_of::<Vec3>() as u64;

        let layout = build_table_layout();
        let instances = build_instances(0.0);

        // All initial builds go through one submission. The refit each frame
        // reuses the scratch allocated here.
        let cmd = context.queue.get_command_list(&context.device)?;
        let blas = vec![
            BottomLevel::build(
                context,
                &cmd,
                &[
                    TriangleGeometry {
                        vertex_buffer: &vertex_buffers[0],
                        vertex_count: 3,
                        vertex_stride,
                    },
                    TriangleGeometry {
                        vertex_buffer: &vertex_buffers[1],
                        vertex_count: 6,
                        vertex_stride,
                    },
                ],
            )?,
            BottomLevel::build(
                context,
                &cmd,
                &[TriangleGeometry {
                    vertex_buffer: &vertex_buffers[0],
                    vertex_count: 3,
                    vertex_stride,
                }],
            )?,
        ];
        let tlas = TopLevel::build(context, &cmd, &blas, &instances, &layout)?;
        let fence_value = context.queue.execute_command_list(cmd)?;
        context.queue.wait_for_fence_value(fence_value)?;

        let (pipeline, global_root_signature) = create_raytracing_pipeline(&context.device)?;

        let heap =
            context.create_descriptor_heap(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, 2, true)?;
        let storage = base
            .storage_image
            .as_ref()
            .ok_or_else(|| anyhow!("ray tracing output image missing"))?;
        write_output_uav(&context.device, &heap, storage);
        write_tlas_srv(&context.device, &heap, &tlas);

        let constant_buffers = INSTANCE_COLORS
            .iter()
            .map(|colors| context.create_constant_buffer_from_data(colors))
            .collect::<Result<Vec<_>>>()?;
        let cbv_addresses: Vec<u64> = constant_buffers
            .iter()
            .map(|buffer| buffer.gpu_virtual_address())
            .collect();

        let sbt = context.create_shader_binding_table(
            &pipeline,
            &layout,
            &RecordArgs {
                cbv_addresses: &cbv_addresses,
                heap: &heap,
            },
        )?;

        Ok(Self {
            _vertex_buffers: vertex_buffers,
            _constant_buffers: constant_buffers,
            blas,
            tlas,
            global_root_signature,
            pipeline,
            sbt,
            heap,
            instances,
            angle: 0.0,
        })
    }

    fn update(
        &mut self,
        _: &mut BaseApp<Self>,
        _: usize,
        frame_stats: &FrameStats,
    ) -> Result<()> {
        self.angle += ROTATION_SPEED * frame_stats.frame_time.as_secs_f32();
        self.instances = build_instances(self.angle);

        Ok(())
    }

    fn record_raytracing_commands(
        &self,
        base: &BaseApp<Self>,
        cmd: &CommandList,
        _image_index: usize,
    ) -> Result<()> {
        let storage = base
            .storage_image
            .as_ref()
            .ok_or_else(|| anyhow!("ray tracing output image missing"))?;

        self.tlas.record_refit(cmd, &self.blas, &self.instances)?;

        unsafe {
            cmd.inner.SetDescriptorHeaps(&[Some(self.heap.inner.clone())]);
            cmd.inner.SetComputeRootSignature(&self.global_root_signature);
            cmd.inner.SetPipelineState1(&self.pipeline);
            cmd.inner
                .DispatchRays(&self.sbt.dispatch_rays_desc(storage.width, storage.height));
        }

        Ok(())
    }

    fn on_recreate_swapchain(&mut self, base: &BaseApp<Self>) -> Result<()> {
        let storage = base
            .storage_image
            .as_ref()
            .ok_or_else(|| anyhow!("ray tracing output image missing"))?;

        // Slot 0 gets the recreated output image. The shader table keeps its
        // heap addresses, so nothing else moves.
        write_output_uav(&base.context.device, &self.heap, storage);

        Ok(())
    }
}

fn build_instances(angle: f32) -> Vec<InstanceRecord> {
    vec![
        InstanceRecord {
            instance_id: 0,
            transform: Mat4::IDENTITY,
            blas_index: 0,
        },
        InstanceRecord {
            instance_id: 1,
            transform: Mat4::from_translation(vec3(-2.0, 0.0, 0.0)) * Mat4::from_rotation_y(angle),
            blas_index: 1,
        },
        InstanceRecord {
            instance_id: 2,
            transform: Mat4::from_translation(vec3(2.0, 0.0, 0.0)) * Mat4::from_rotation_y(angle),
            blas_index: 1,
        },
    ]
}

/// Table with one raygen record, two miss records and per-instance hit
/// records. Primary rays skip over every other record (geometry multiplier
/// 2 in the center instance), shadow rays always land one record past the
/// primary one.
fn build_table_layout() -> TableLayout {
    let mut layout = TableLayout::new();
    layout.add_raygen("rayGen", LocalArg::HeapTable(0));
    layout.add_miss("miss", LocalArg::None);
    layout.add_miss("shadowMiss", LocalArg::None);

    let center = layout.add_instance();
    layout.add_hit_record(center, "TriHitGroup", LocalArg::ConstantBuffer(0));
    layout.add_hit_record(center, "ShadowHitGroup", LocalArg::None);
    layout.add_hit_record(center, "PlaneHitGroup", LocalArg::HeapTable(1));
    layout.add_hit_record(center, "ShadowHitGroup", LocalArg::None);

    for i in 1..3 {
        let instance = layout.add_instance();
        layout.add_hit_record(instance, "TriHitGroup", LocalArg::ConstantBuffer(i));
        layout.add_hit_record(instance, "ShadowHitGroup", LocalArg::None);
    }

    layout
}

fn create_vertex_buffers(context: &Context) -> Result<[Buffer; 2]> {
    let triangle: [Vec3; 3] = [
        vec3(0.0, 1.0, 0.0),
        vec3(0.866, -0.5, 0.0),
        vec3(-0.866, -0.5, 0.0),
    ];
    // Two triangles spanning the floor at y = -1.
    let plane: [Vec3; 6] = [
        vec3(-100.0, -1.0, -2.0),
        vec3(100.0, -1.0, 100.0),
        vec3(-100.0, -1.0, 100.0),
        vec3(-100.0, -1.0, -2.0),
        vec3(100.0, -1.0, -2.0),
        vec3(100.0, -1.0, 100.0),
    ];

    Ok([
        context.create_upload_buffer_from_data(&triangle)?,
        context.create_upload_buffer_from_data(&plane)?,
    ])
}

fn create_raytracing_pipeline(
    device: &ID3D12Device5,
) -> Result<(ID3D12StateObject, ID3D12RootSignature)> {
    let library = compile_hlsl_library(RAYTRACING_SHADERS)?;

    let mut builder = StateObjectBuilder::new();
    builder.add_dxil_library(library, &SHADER_EXPORTS);
    builder.add_hit_group("TriHitGroup", "triangleChs");
    builder.add_hit_group("PlaneHitGroup", "planeChs");
    builder.add_hit_group("ShadowHitGroup", "shadowChs");

    // Ray generation writes the output through u0 and traces through t0,
    // both from the shared descriptor heap.
    let raygen_signature = create_local_root_signature(
        device,
        &[RootParam::DescriptorTable(vec![
            DescriptorRange {
                kind: D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
                base_register: 0,
                count: 1,
                table_offset: 0,
            },
            DescriptorRange {
                kind: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
                base_register: 0,
                count: 1,
                table_offset: 1,
            },
        ])],
    )?;
    let raygen = builder.add_local_root_signature(&raygen_signature);
    builder.add_association(raygen, &["rayGen"]);

    let triangle_signature =
        create_local_root_signature(device, &[RootParam::Cbv { shader_register: 0 }])?;
    let triangle = builder.add_local_root_signature(&triangle_signature);
    builder.add_association(triangle, &["TriHitGroup"]);

    // The plane shader fires the shadow ray, so it reads the scene too.
    let plane_signature = create_local_root_signature(
        device,
        &[RootParam::DescriptorTable(vec![DescriptorRange {
            kind: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
            base_register: 0,
            count: 1,
            table_offset: 0,
        }])],
    )?;
    let plane = builder.add_local_root_signature(&plane_signature);
    builder.add_association(plane, &["PlaneHitGroup"]);

    let empty_signature = create_local_root_signature(device, &[])?;
    let empty = builder.add_local_root_signature(&empty_signature);
    builder.add_association(empty, &["miss", "shadowChs", "shadowMiss"]);

    // Payload covers the larger of the color and shadow payloads, the
    // attributes are the two triangle barycentrics.
    let shader_config = builder.add_shader_config(16, 8);
    builder.add_association(shader_config, &SHADER_EXPORTS);

    // A primary ray may spawn one shadow ray.
    builder.add_pipeline_config(2);

    let global_root_signature = create_global_root_signature(device, &[])?;
    builder.add_global_root_signature(&global_root_signature);

    let pipeline = builder.build(device)?;

    Ok((pipeline, global_root_signature))
}

fn write_output_uav(device: &ID3D12Device5, heap: &DescriptorHeap, image: &Image) {
    let desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
        Format: image.format,
        ViewDimension: D3D12_UAV_DIMENSION_TEXTURE2D,
        ..Default::default()
    };
    unsafe { device.CreateUnorderedAccessView(&image.inner, None, Some(&desc), heap.cpu_handle(0)) };
}

fn write_tlas_srv(device: &ID3D12Device5, heap: &DescriptorHeap, tlas: &TopLevel) {
    let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
        Format: DXGI_FORMAT_UNKNOWN,
        ViewDimension: D3D12_SRV_DIMENSION_RAYTRACING_ACCELERATION_STRUCTURE,
        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
        Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
            RaytracingAccelerationStructure: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_SRV {
                Location: tlas.gpu_virtual_address(),
            },
        },
    };
    unsafe { device.CreateShaderResourceView(None, Some(&desc), heap.cpu_handle(1)) };
}
