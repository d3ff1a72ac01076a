use std::ffi::c_void;
use std::ptr::{null, null_mut};

use anyhow::{bail, Result};
use windows::core::PCWSTR;
use windows::Win32::Graphics::Direct3D12::*;

use crate::pipeline::{create_root_signature, RootParam};
use crate::utils::WideString;

/// Root signature a single shader table record binds through.
pub fn create_local_root_signature(
    device: &ID3D12Device5,
    params: &[RootParam],
) -> Result<ID3D12RootSignature> {
    create_root_signature(device, params, D3D12_ROOT_SIGNATURE_FLAG_LOCAL_ROOT_SIGNATURE)
}

pub fn create_global_root_signature(
    device: &ID3D12Device5,
    params: &[RootParam],
) -> Result<ID3D12RootSignature> {
    create_root_signature(device, params, D3D12_ROOT_SIGNATURE_FLAG_NONE)
}

/// One subobject of a raytracing pipeline, described by value. Cross
/// references use builder indices instead of pointers; the raw pointer graph
/// D3D12 wants only exists inside [`StateObjectBuilder::build`].
pub enum StateSubobject {
    DxilLibrary {
        bytecode: Vec<u8>,
        exports: Vec<String>,
    },
    HitGroup {
        name: String,
        closest_hit: String,
    },
    LocalRootSignature(ID3D12RootSignature),
    GlobalRootSignature(ID3D12RootSignature),
    ShaderConfig {
        max_payload_size: u32,
        max_attribute_size: u32,
    },
    PipelineConfig {
        max_recursion_depth: u32,
    },
    /// Associates the subobject at `subobject` with the named exports.
    Association {
        subobject: usize,
        exports: Vec<String>,
    },
}

#[derive(Default)]
pub struct StateObjectBuilder {
    subobjects: Vec<StateSubobject>,
}

impl StateObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subobject: StateSubobject) -> usize {
        self.subobjects.push(subobject);
        self.subobjects.len() - 1
    }

    pub fn add_dxil_library(&mut self, bytecode: Vec<u8>, exports: &[&str]) -> usize {
        self.add(StateSubobject::DxilLibrary {
            bytecode,
            exports: exports.iter().map(|e| e.to_string()).collect(),
        })
    }

    /// Triangle hit group with a closest-hit shader only.
    pub fn add_hit_group(&mut self, name: &str, closest_hit: &str) -> usize {
        self.add(StateSubobject::HitGroup {
            name: name.to_string(),
            closest_hit: closest_hit.to_string(),
        })
    }

    pub fn add_local_root_signature(&mut self, signature: &ID3D12RootSignature) -> usize {
        self.add(StateSubobject::LocalRootSignature(signature.clone()))
    }

    pub fn add_global_root_signature(&mut self, signature: &ID3D12RootSignature) -> usize {
        self.add(StateSubobject::GlobalRootSignature(signature.clone()))
    }

    pub fn add_shader_config(&mut self, max_payload_size: u32, max_attribute_size: u32) -> usize {
        self.add(StateSubobject::ShaderConfig {
            max_payload_size,
            max_attribute_size,
        })
    }

    pub fn add_pipeline_config(&mut self, max_recursion_depth: u32) -> usize {
        self.add(StateSubobject::PipelineConfig {
            max_recursion_depth,
        })
    }

    pub fn add_association(&mut self, subobject: usize, exports: &[&str]) -> usize {
        self.add(StateSubobject::Association {
            subobject,
            exports: exports.iter().map(|e| e.to_string()).collect(),
        })
    }

    /// Lowers the description to the raw subobject array and creates the
    /// pipeline. Payloads live in per-kind vectors sized up front so their
    /// addresses survive until CreateStateObject returns; association targets
    /// are patched in a second pass once the subobject array is complete.
    pub fn build(&self, device: &ID3D12Device5) -> Result<ID3D12StateObject> {
        let count = self.subobjects.len();

        for subobject in &self.subobjects {
            if let StateSubobject::Association { subobject: target, .. } = subobject {
                if *target >= count {
                    bail!("association references subobject {} of {}", target, count);
                }
                if matches!(self.subobjects[*target], StateSubobject::Association { .. }) {
                    bail!("association target {} is itself an association", target);
                }
            }
        }

        let mut kinds = KindCounts::default();
        for subobject in &self.subobjects {
            kinds.count(subobject);
        }

        // Interned UTF-16 names. Growing the vector moves the WideString
        // headers, not the character data the PCWSTRs point at.
        let mut names: Vec<WideString> = Vec::new();

        let mut dxil_descs = Vec::with_capacity(kinds.dxil_libraries);
        let mut export_descs: Vec<Vec<D3D12_EXPORT_DESC>> = Vec::new();
        let mut hit_group_descs = Vec::with_capacity(kinds.hit_groups);
        let mut local_root_descs = Vec::with_capacity(kinds.local_root_signatures);
        let mut global_root_descs = Vec::with_capacity(kinds.global_root_signatures);
        let mut shader_configs = Vec::with_capacity(kinds.shader_configs);
        let mut pipeline_configs = Vec::with_capacity(kinds.pipeline_configs);
        let mut association_descs = Vec::with_capacity(kinds.associations);
        let mut association_exports: Vec<Vec<PCWSTR>> = Vec::new();
        let mut association_fixups: Vec<(usize, usize)> = Vec::new();

        let mut raw: Vec<D3D12_STATE_SUBOBJECT> = Vec::with_capacity(count);

        for subobject in &self.subobjects {
            let (kind, desc_ptr) = match subobject {
                StateSubobject::DxilLibrary { bytecode, exports } => {
                    let descs: Vec<D3D12_EXPORT_DESC> = exports
                        .iter()
                        .map(|export| D3D12_EXPORT_DESC {
                            Name: intern(&mut names, export),
                            ExportToRename: PCWSTR::null(),
                            Flags: D3D12_EXPORT_FLAG_NONE,
                        })
                        .collect();
                    let exports_ptr = if descs.is_empty() {
                        null_mut()
                    } else {
                        descs.as_ptr() as *mut D3D12_EXPORT_DESC
                    };
                    let num_exports = descs.len() as u32;
                    export_descs.push(descs);

                    dxil_descs.push(D3D12_DXIL_LIBRARY_DESC {
                        DXILLibrary: D3D12_SHADER_BYTECODE {
                            pShaderBytecode: bytecode.as_ptr() as *const c_void,
                            BytecodeLength: bytecode.len(),
                        },
                        NumExports: num_exports,
                        pExports: exports_ptr,
                    });
                    (
                        D3D12_STATE_SUBOBJECT_TYPE_DXIL_LIBRARY,
                        last_ptr(&dxil_descs),
                    )
                }
                StateSubobject::HitGroup { name, closest_hit } => {
                    hit_group_descs.push(D3D12_HIT_GROUP_DESC {
                        HitGroupExport: intern(&mut names, name),
                        Type: D3D12_HIT_GROUP_TYPE_TRIANGLES,
                        AnyHitShaderImport: PCWSTR::null(),
                        ClosestHitShaderImport: intern(&mut names, closest_hit),
                        IntersectionShaderImport: PCWSTR::null(),
                    });
                    (
                        D3D12_STATE_SUBOBJECT_TYPE_HIT_GROUP,
                        last_ptr(&hit_group_descs),
                    )
                }
                StateSubobject::LocalRootSignature(signature) => {
                    local_root_descs.push(D3D12_LOCAL_ROOT_SIGNATURE {
                        pLocalRootSignature: Some(signature.clone()),
                    });
                    (
                        D3D12_STATE_SUBOBJECT_TYPE_LOCAL_ROOT_SIGNATURE,
                        last_ptr(&local_root_descs),
                    )
                }
                StateSubobject::GlobalRootSignature(signature) => {
                    global_root_descs.push(D3D12_GLOBAL_ROOT_SIGNATURE {
                        pGlobalRootSignature: Some(signature.clone()),
                    });
                    (
                        D3D12_STATE_SUBOBJECT_TYPE_GLOBAL_ROOT_SIGNATURE,
                        last_ptr(&global_root_descs),
                    )
                }
                StateSubobject::ShaderConfig {
                    max_payload_size,
                    max_attribute_size,
                } => {
                    shader_configs.push(D3D12_RAYTRACING_SHADER_CONFIG {
                        MaxPayloadSizeInBytes: *max_payload_size,
                        MaxAttributeSizeInBytes: *max_attribute_size,
                    });
                    (
                        D3D12_STATE_SUBOBJECT_TYPE_RAYTRACING_SHADER_CONFIG,
                        last_ptr(&shader_configs),
                    )
                }
                StateSubobject::PipelineConfig {
                    max_recursion_depth,
                } => {
                    pipeline_configs.push(D3D12_RAYTRACING_PIPELINE_CONFIG {
                        MaxTraceRecursionDepth: *max_recursion_depth,
                    });
                    (
                        D3D12_STATE_SUBOBJECT_TYPE_RAYTRACING_PIPELINE_CONFIG,
                        last_ptr(&pipeline_configs),
                    )
                }
                StateSubobject::Association { subobject, exports } => {
                    let wide: Vec<PCWSTR> = exports
                        .iter()
                        .map(|export| intern(&mut names, export))
                        .collect();
                    let exports_ptr = if wide.is_empty() {
                        null_mut()
                    } else {
                        wide.as_ptr() as *mut PCWSTR
                    };
                    let num_exports = wide.len() as u32;
                    association_exports.push(wide);

                    association_fixups.push((association_descs.len(), *subobject));
                    association_descs.push(D3D12_SUBOBJECT_TO_EXPORTS_ASSOCIATION {
                        pSubobjectToAssociate: null(),
                        NumExports: num_exports,
                        pExports: exports_ptr,
                    });
                    (
                        D3D12_STATE_SUBOBJECT_TYPE_SUBOBJECT_TO_EXPORTS_ASSOCIATION,
                        last_ptr(&association_descs),
                    )
                }
            };

            raw.push(D3D12_STATE_SUBOBJECT {
                Type: kind,
                pDesc: desc_ptr,
            });
        }

        // The subobject array is complete, association targets can now be
        // resolved to addresses.
        for (association, target) in association_fixups {
            association_descs[association].pSubobjectToAssociate = &raw[target];
        }

        let desc = D3D12_STATE_OBJECT_DESC {
            Type: D3D12_STATE_OBJECT_TYPE_RAYTRACING_PIPELINE,
            NumSubobjects: raw.len() as u32,
            pSubobjects: raw.as_ptr(),
        };

        let state_object: ID3D12StateObject = unsafe { device.CreateStateObject(&desc)? };

        Ok(state_object)
    }
}

#[derive(Default)]
struct KindCounts {
    dxil_libraries: usize,
    hit_groups: usize,
    local_root_signatures: usize,
    global_root_signatures: usize,
    shader_configs: usize,
    pipeline_configs: usize,
    associations: usize,
}

impl KindCounts {
    fn count(&mut self, subobject: &StateSubobject) {
        match subobject {
            StateSubobject::DxilLibrary { .. } => self.dxil_libraries += 1,
            StateSubobject::HitGroup { .. } => self.hit_groups += 1,
            StateSubobject::LocalRootSignature(_) => self.local_root_signatures += 1,
            StateSubobject::GlobalRootSignature(_) => self.global_root_signatures += 1,
            StateSubobject::ShaderConfig { .. } => self.shader_configs += 1,
            StateSubobject::PipelineConfig { .. } => self.pipeline_configs += 1,
            StateSubobject::Association { .. } => self.associations += 1,
        }
    }
}

fn intern(names: &mut Vec<WideString>, s: &str) -> PCWSTR {
    let name = WideString::new(s);
    let ptr = name.pcwstr();
    names.push(name);
    ptr
}

/// Address of the most recently pushed element. The vectors this is used on
/// are sized with_capacity up front, so the address stays valid while later
/// elements are pushed.
fn last_ptr<T>(v: &[T]) -> *const c_void {
    &v[v.len() - 1] as *const T as *const c_void
}
