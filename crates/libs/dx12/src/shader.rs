use std::ffi::c_void;

use anyhow::{anyhow, bail, Result};
use windows::core::*;
use windows::Win32::Graphics::Direct3D::Dxc::*;

use crate::utils::WideString;

/// Compiles an HLSL library for DXR use (lib_6_3 profile, entry points are
/// the exported shaders themselves).
pub fn compile_hlsl_library(source: &str) -> Result<Vec<u8>> {
    compile_hlsl(source, "", "lib_6_3")
}

pub fn compile_hlsl(source: &str, entry_point: &str, target_profile: &str) -> Result<Vec<u8>> {
    let compiler: IDxcCompiler3 = unsafe { DxcCreateInstance(&CLSID_DxcCompiler)? };

    // Argument strings must stay alive until Compile returns.
    let target_flag = WideString::new("-T");
    let target = WideString::new(target_profile);
    let entry_flag = WideString::new("-E");
    let entry = (!entry_point.is_empty()).then(|| WideString::new(entry_point));

    let mut args: Vec<PWSTR> = vec![target_flag.pwstr(), target.pwstr()];
    if let Some(entry) = &entry {
        args.push(entry_flag.pwstr());
        args.push(entry.pwstr());
    }

    let buffer = DxcBuffer {
        Ptr: source.as_ptr() as *const c_void,
        Size: source.len(),
        Encoding: DXC_CP_UTF8.0,
    };

    let mut result: Option<IDxcResult> = None;
    unsafe {
        compiler.Compile(
            &buffer,
            Some(&args),
            None,
            &IDxcResult::IID,
            <*mut _>::cast(&mut result),
        )?
    };
    let result = result.ok_or_else(|| anyhow!("DXC returned no result object"))?;

    let status = unsafe { result.GetStatus()? };
    if status.is_err() {
        let errors = unsafe { result.GetErrorBuffer()? };
        bail!(
            "shader compilation failed: {}",
            blob_to_string(&errors)
        );
    }

    let blob = unsafe { result.GetResult()? };
    let bytecode = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };

    Ok(bytecode.to_vec())
}

fn blob_to_string(blob: &IDxcBlobEncoding) -> String {
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };

    String::from_utf8_lossy(bytes).trim_end().to_string()
}
