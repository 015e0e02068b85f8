//! Demo viewer for the stereo HMD pipeline.
//!
//! Renders an instanced cube field per eye through the frame controller
//! and presents both distortion-corrected eye images side-by-side in a
//! desktop window, driven by the debug HMD's synthetic head motion.

pub mod app;
pub mod overlay;
pub mod scene;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "rig_viewer", about = "Stereo HMD pipeline demo viewer")]
pub struct Args {
    /// Eye render-target scale in (0, 1].
    #[arg(long, default_value_t = 1.0)]
    pub render_scale: f32,

    /// Interpupillary distance in meters.
    #[arg(long, default_value_t = 0.064)]
    pub ipd: f32,

    /// Texels per display pixel at screen center.
    #[arg(long, default_value_t = 1.0)]
    pub pixel_density: f32,

    /// Render one eye per frame, alternating.
    #[arg(long)]
    pub eye_per_frame: bool,

    /// Disable the lens distortion pass (raw side-by-side output).
    #[arg(long)]
    pub no_distortion: bool,

    /// Disable the synthetic head motion.
    #[arg(long)]
    pub static_pose: bool,

    /// Present without vsync.
    #[arg(long)]
    pub no_vsync: bool,
}
