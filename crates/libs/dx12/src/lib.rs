#[cfg(windows)]
pub use windows;

#[cfg(windows)]
mod barrier;
#[cfg(windows)]
mod buffer;
#[cfg(windows)]
mod context;
#[cfg(windows)]
mod depth;
#[cfg(windows)]
mod descriptor;
#[cfg(windows)]
mod image;
#[cfg(windows)]
mod pipeline;
#[cfg(windows)]
mod queue;
#[cfg(windows)]
mod shader;
#[cfg(windows)]
mod swapchain;

mod ray_tracing;

pub mod utils;

#[cfg(windows)]
pub use barrier::*;
#[cfg(windows)]
pub use buffer::*;
#[cfg(windows)]
pub use context::*;
#[cfg(windows)]
pub use depth::*;
#[cfg(windows)]
pub use descriptor::*;
#[cfg(windows)]
pub use image::*;
#[cfg(windows)]
pub use pipeline::*;
#[cfg(windows)]
pub use queue::*;
#[cfg(windows)]
pub use shader::*;
#[cfg(windows)]
pub use swapchain::*;

pub use ray_tracing::*;

pub const FRAME_COUNT: usize = 3;
