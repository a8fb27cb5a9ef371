//! Run the detection + pose pipeline once over a still image.

use clap::Parser;
use log::LevelFilter;
use marker_pose::{detect, pipeline_from_config, PipelineConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "marker-pose",
    about = "Detect square fiducial markers and report their 6-DoF poses"
)]
struct Args {
    /// Pipeline configuration (camera matrix, distortion, marker length,
    /// dictionary).
    #[arg(long)]
    config: PathBuf,

    /// Input image (any format the `image` crate decodes).
    #[arg(long)]
    image: PathBuf,

    /// Log more detail about intermediate pipeline stages.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = marker_pose::core::init_with_level(level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(&args.config)?;
    let pipeline = pipeline_from_config(&config)?;

    let img = image::ImageReader::open(&args.image)?.decode()?;
    let result = detect::process_image(&pipeline, &img);

    if result.markers.is_empty() {
        println!("no markers detected");
    }
    for m in &result.markers {
        println!(
            "id {:3}  t = [{:8.3} {:8.3} {:8.3}]  r = [{:7.4} {:7.4} {:7.4}]",
            m.id, m.tvec.x, m.tvec.y, m.tvec.z, m.rvec.x, m.rvec.y, m.rvec.z
        );
    }
    if result.dropped_poses > 0 {
        log::warn!("{} decoded markers had no usable pose", result.dropped_poses);
    }
    Ok(())
}
