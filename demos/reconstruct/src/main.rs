use argh::FromArgs;
use std::path::PathBuf;

use depthfuse::k3d::{depth::ConfidenceFilter, io::ply::PlyEncoding};
use depthfuse::recon::{ExecutionStrategy, ReconstructionConfig, Reconstructor};

#[derive(FromArgs)]
/// Fuse batch depth artifacts (.npz) into a single point cloud.
struct Args {
    /// input .npz batches, processed in the given order
    #[argh(positional)]
    inputs: Vec<PathBuf>,

    /// path of the output PLY file
    #[argh(option, short = 'o', default = "PathBuf::from(\"output.ply\")")]
    output: PathBuf,

    /// JSON file with the base configuration; flags below override it
    #[argh(option)]
    config: Option<PathBuf>,

    /// voxel size for downsampling [default: 0.05]
    #[argh(option)]
    voxel_size: Option<f64>,

    /// pixel stride for backprojection [default: 4]
    #[argh(option)]
    stride: Option<usize>,

    /// maximum depth; farther points are discarded [default: 20.0]
    #[argh(option)]
    max_depth: Option<f64>,

    /// divide raw depth values by this factor [default: 1.0]
    #[argh(option)]
    depth_scale: Option<f64>,

    /// use every n-th frame of each batch [default: 1]
    #[argh(option)]
    frame_step: Option<usize>,

    /// index of the first frame used in each batch [default: 0]
    #[argh(option)]
    frame_offset: Option<usize>,

    /// keep pixels whose confidence is at least this value
    #[argh(option)]
    min_confidence: Option<f32>,

    /// keep pixels whose confidence map value is at most this value
    #[argh(option)]
    max_uncertainty: Option<f32>,

    /// process the frames of a batch on the current thread
    #[argh(switch)]
    serial: bool,

    /// write an ascii PLY instead of binary little endian
    #[argh(switch)]
    ascii: bool,
}

fn build_config(args: &Args) -> Result<ReconstructionConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ReconstructionConfig::from_json_file(path)?,
        None => ReconstructionConfig::default(),
    };

    if let Some(voxel_size) = args.voxel_size {
        config.voxel_size = voxel_size;
    }
    if let Some(stride) = args.stride {
        config.stride = stride;
    }
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }
    if let Some(depth_scale) = args.depth_scale {
        config.depth_scale = depth_scale;
    }
    if let Some(frame_step) = args.frame_step {
        config.frame_step = frame_step;
    }
    if let Some(frame_offset) = args.frame_offset {
        config.frame_offset = frame_offset;
    }

    config.confidence = match (args.min_confidence, args.max_uncertainty) {
        (Some(_), Some(_)) => {
            return Err("--min-confidence and --max-uncertainty are mutually exclusive".into())
        }
        (Some(t), None) => ConfidenceFilter::MinConfidence(t),
        (None, Some(t)) => ConfidenceFilter::MaxUncertainty(t),
        (None, None) => config.confidence,
    };

    if args.serial {
        config.execution = ExecutionStrategy::Serial;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = build_config(&args)?;
    log::debug!("Configuration: {config:?}");

    if args.inputs.is_empty() {
        log::warn!("No input files given, writing an empty cloud");
    }

    let reconstructor = Reconstructor::new(config)?;
    let result = reconstructor.run(&args.inputs)?;

    let encoding = if args.ascii {
        PlyEncoding::Ascii
    } else {
        PlyEncoding::BinaryLittleEndian
    };
    result.write_output(&args.output, encoding)?;

    println!(
        "Wrote {} points to {} ({})",
        result.cloud.len(),
        args.output.display(),
        result.summary
    );

    Ok(())
}
