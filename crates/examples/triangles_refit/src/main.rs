use app::anyhow::Result;

#[cfg(windows)]
mod game;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const APP_NAME: &str = "Ray traced triangles";
const ENABLE_RAYTRACING: bool = true;

#[cfg(windows)]
fn main() -> Result<()> {
    app::run::<game::TrianglesRefit>(APP_NAME, WIDTH, HEIGHT, ENABLE_RAYTRACING)
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    let _ = (WIDTH, HEIGHT, ENABLE_RAYTRACING);
    eprintln!("{} needs Direct3D 12 and only runs on Windows", APP_NAME);
    Ok(())
}
