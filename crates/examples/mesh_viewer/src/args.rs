use clap::Parser;

/// Turntable viewer for glTF meshes
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Path of the glTF file
    #[clap(short, long, value_parser)]
    pub file: String,

    /// Uniform scale applied to the mesh at load time
    #[clap(long, value_parser, default_value_t = 1.0)]
    pub scale: f32,

    /// Mirror the mesh along the z axis
    #[clap(long)]
    pub flip_z: bool,
}
