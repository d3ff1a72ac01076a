#[cfg(windows)]
mod acceleration_structure;
mod instance;
mod layout;
#[cfg(windows)]
mod pipeline;
#[cfg(windows)]
mod shader_binding_table;

#[cfg(windows)]
pub use acceleration_structure::*;
pub use instance::*;
pub use layout::*;
#[cfg(windows)]
pub use pipeline::*;
#[cfg(windows)]
pub use shader_binding_table::*;

/// Size of the opaque shader identifier that starts every shader table
/// record (D3D12_SHADER_IDENTIFIER_SIZE_IN_BYTES).
pub const SHADER_IDENTIFIER_SIZE: u64 = 32;

/// Minimum alignment of a shader table record
/// (D3D12_RAYTRACING_SHADER_RECORD_BYTE_ALIGNMENT).
pub const SHADER_RECORD_ALIGNMENT: u64 = 32;

/// Minimum alignment of the table start addresses passed to DispatchRays
/// (D3D12_RAYTRACING_SHADER_TABLE_BYTE_ALIGNMENT).
pub const SHADER_TABLE_ALIGNMENT: u64 = 64;
