use clap::Parser;
use plysplat_lib::common::{DEFAULT_LOG_OPACITY, DEFAULT_QUAD_HALF_EXTENT, POINT_ELEMENT};
use plysplat_lib::{load, load_async, write_render_mesh, ImportOptions, RenderMesh};
use std::error::Error;
use std::fs;
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "PLY Splat Importer",
    version = "1.0",
    author = "Denis Avvakumov",
    about = "Converts Gaussian splat PLY files into quad meshes with per-face render attributes"
)]
struct Cli {
    #[arg(
        short = 'i',
        long = "input",
        value_name = "INPUT",
        required = true,
        help = "Path to the input splat PLY file."
    )]
    input: String,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "OUTPUT",
        help = "Write the render mesh as a binary PLY to this path."
    )]
    output: Option<String>,

    #[arg(
        short = 'e',
        long = "element",
        value_name = "NAME",
        default_value = POINT_ELEMENT,
        help = "Name of the element group holding the splats."
    )]
    element: String,

    #[arg(
        long = "default-opacity",
        value_name = "LOG_ODDS",
        default_value_t = DEFAULT_LOG_OPACITY,
        allow_negative_numbers = true,
        help = "Log-odds opacity used when the file has no opacity property."
    )]
    default_log_opacity: f32,

    #[arg(
        long = "half-extent",
        value_name = "SIZE",
        default_value_t = DEFAULT_QUAD_HALF_EXTENT,
        help = "Half size of each quad in local units."
    )]
    half_extent: f32,

    #[arg(
        short = 'a',
        long = "async",
        default_value = "false",
        help = "Read the input file asynchronously."
    )]
    async_mode: bool,
}

fn summarize(render: &RenderMesh) {
    if render.records.is_empty() {
        tracing::warn!("the point element is empty, nothing to summarize");
        return;
    }

    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    let mut opacity_sum = 0.0f64;
    for record in &render.records {
        for axis in 0..3 {
            min[axis] = min[axis].min(record.center[axis]);
            max[axis] = max[axis].max(record.center[axis]);
        }
        opacity_sum += record.color[3] as f64;
    }

    tracing::info!(
        points = render.point_count(),
        faces = render.face_count(),
        vertices = render.mesh.vertices.len(),
        "bounds min {:?} max {:?}, mean opacity {:.4}",
        min,
        max,
        opacity_sum / render.point_count() as f64
    );
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if !(cli.half_extent.is_finite() && cli.half_extent > 0.0) {
        eprintln!("Error: --half-extent must be a positive number.");
        process::exit(1);
    }

    let options = ImportOptions::default()
        .with_point_element(cli.element.clone())
        .with_default_log_opacity(cli.default_log_opacity)
        .with_quad_half_extent(cli.half_extent);

    let mode = if cli.async_mode {
        "Asynchronous"
    } else {
        "Synchronous"
    };
    tracing::info!(input = %cli.input, element = %options.point_element, "{} import", mode);

    let start = Instant::now();

    let render = if cli.async_mode {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(load_async(&cli.input, &options))
    } else {
        load(&cli.input, &options)
    };
    let render = render.unwrap_or_else(|e| {
        eprintln!("Error importing '{}': {}", cli.input, e);
        process::exit(1);
    });

    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "import finished");
    summarize(&render);

    if let Some(output) = &cli.output {
        let mut buf = Vec::new();
        write_render_mesh(&render, &mut buf)?;
        fs::write(output, &buf).unwrap_or_else(|e| {
            eprintln!("Error writing output '{}': {}", output, e);
            process::exit(1);
        });
        println!("Successfully wrote to '{}'.", output);
    }

    Ok(())
}
