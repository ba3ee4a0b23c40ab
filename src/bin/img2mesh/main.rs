// img2mesh - Convert an image into a printable relief or sculpture
//
// Pipeline:
//   1. Load image
//   2. Estimate depth (ONNX model, or image proxy when unavailable)
//   3. Segment the subject
//   4. Synthesize relief / figure / voxel geometry
//   5. Sanitize and write OBJ or STL
//
// Usage: img2mesh -i <image> -o <mesh.stl|mesh.obj> [--mode relief] [--quality high]
//
// Exit code 0 on success (including degraded output), 1 on failure.

#[cfg(not(target_arch = "wasm32"))]
mod args;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use clap::Parser;
    use log::error;

    let args = args::Args::parse();
    let level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn run(args: &args::Args) -> anyhow::Result<()> {
    use anyhow::Context;
    use log::{info, warn};
    use relief_engine::Pipeline;

    let config = args.to_config()?;
    let mut pipeline = Pipeline::new(config);
    let (out, format) = pipeline
        .run_file(&args.input, &args.output)
        .with_context(|| format!("converting {}", args.input.display()))?;

    if out.degraded() {
        warn!(
            "output degraded: depth {:?}, mask fallback {}, synthesis fallback {}, sanitizer fallback {}",
            out.depth_source, out.mask_fallback, out.synthesis_fallback, out.report.fell_back
        );
    }
    info!(
        "{} -> {} ({format:?}, {} vertices, {} triangles)",
        args.input.display(),
        args.output.display(),
        out.mesh.vertex_count(),
        out.mesh.triangle_count()
    );
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
