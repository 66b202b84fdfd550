use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde::Serialize;

use trackfeat_core::encoding::domain::box_encoder::BoxEncoder;
use trackfeat_core::encoding::domain::fallback_patch::UniformNoise;
use trackfeat_core::encoding::infrastructure::onnx_image_encoder::OnnxImageEncoder;
use trackfeat_core::shared::bounding_box::BoundingBox;
use trackfeat_core::shared::frame::Frame;
use trackfeat_core::shared::model_resolver::{self, ModelSource};
use trackfeat_core::shared::patch_shape::PatchShape;

/// Appearance embeddings for bounding boxes in an image.
#[derive(Parser)]
#[command(name = "trackfeat")]
struct Cli {
    /// Input image file.
    image: PathBuf,

    /// Bounding box as x,y,width,height in pixels (repeatable).
    #[arg(long = "box", value_name = "X,Y,W,H", required = true, allow_hyphen_values = true, value_parser = parse_box)]
    boxes: Vec<BoundingBox>,

    /// Path to an ONNX re-identification model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// URL of an ONNX re-identification model, cached after first download.
    #[arg(long)]
    model_url: Option<String>,

    /// Patches per inference call.
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Patch height in pixels.
    #[arg(long, default_value = "128")]
    patch_height: u32,

    /// Patch width in pixels.
    #[arg(long, default_value = "64")]
    patch_width: u32,

    /// Emit raw model output instead of L2-normalized features.
    #[arg(long)]
    no_normalize: bool,

    /// Seed for fallback patches of boxes that cannot be cropped.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct BoxFeature<'a> {
    index: usize,
    #[serde(rename = "box")]
    bbox: [f64; 4],
    reliable: bool,
    feature: &'a [f32],
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let source = model_source(&cli)?;
    log::info!("Resolving model: {source:?}");
    let model_path = model_resolver::resolve(&source, None, Some(Box::new(download_progress)))?;
    if matches!(source, ModelSource::Url(_)) {
        eprintln!();
    }

    let frame = Frame::from_rgb(image::open(&cli.image)?.to_rgb8());
    let patch_shape = PatchShape::new(cli.patch_height, cli.patch_width)?;
    let fallback = match cli.seed {
        Some(seed) => UniformNoise::seeded(seed),
        None => UniformNoise::from_entropy(),
    };
    let onnx = OnnxImageEncoder::with_options(&model_path, cli.batch_size, !cli.no_normalize)?;
    let mut encoder = BoxEncoder::with_fallback(onnx, patch_shape, fallback);

    let embeddings = encoder.encode(&frame, &cli.boxes)?;
    for (index, (bbox, embedding)) in cli.boxes.iter().zip(&embeddings).enumerate() {
        let line = serde_json::to_string(&BoxFeature {
            index,
            bbox: bbox.to_tlwh(),
            reliable: embedding.is_reliable(),
            feature: &embedding.vector,
        })?;
        println!("{line}");
    }
    let unreliable = embeddings.iter().filter(|e| !e.is_reliable()).count();
    if unreliable > 0 {
        log::warn!("{unreliable} of {} boxes used fallback patches", embeddings.len());
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.image.exists() {
        return Err(format!("Input file not found: {}", cli.image.display()).into());
    }
    if cli.model.is_some() == cli.model_url.is_some() {
        return Err("Exactly one of --model and --model-url is required".into());
    }
    if cli.batch_size == 0 {
        return Err("Batch size must be at least 1".into());
    }
    if cli.patch_height == 0 || cli.patch_width == 0 {
        return Err(format!(
            "Patch size must be non-zero, got {}x{}",
            cli.patch_height, cli.patch_width
        )
        .into());
    }
    Ok(())
}

fn model_source(cli: &Cli) -> Result<ModelSource, Box<dyn std::error::Error>> {
    match (&cli.model, &cli.model_url) {
        (Some(path), None) => Ok(ModelSource::Path(path.clone())),
        (None, Some(url)) => Ok(ModelSource::Url(url.clone())),
        _ => Err("Exactly one of --model and --model-url is required".into()),
    }
}

fn parse_box(s: &str) -> Result<BoundingBox, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid box '{s}': {e}"))?;
    match values.as_slice() {
        &[x, y, w, h] => Ok(BoundingBox::new(x, y, w, h)),
        _ => Err(format!("box '{s}' must have 4 values, got {}", values.len())),
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading embedding model... {pct}%");
    } else {
        eprint!("\rDownloading embedding model... {downloaded} bytes");
    }
}
