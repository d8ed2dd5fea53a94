use clap::Parser;
use facecast::{
    cli::Args,
    tracking::{self, PipelineParts, ShutdownToken},
};
use tracing::info;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let _telemetry = tracking::enter_runtime(&args.telemetry_options());
    let config = args.load_config()?;
    tracking::init_metrics_recorder()?;

    let shutdown = ShutdownToken::new();
    shutdown.cancel_on_ctrlc()?;

    let backends = tracking::open_backends(&config)?;
    let sink = tracking::open_frame_sink(&config.output.frame_sink())?;
    let report = tracking::run(
        &config,
        PipelineParts {
            source: backends.source,
            detector: backends.detector,
            solver: backends.solver,
            sink,
        },
        shutdown,
    )?;
    info!(
        frames = report.broadcast.frames,
        faces = report.processing.faces,
        "facecast finished"
    );
    Ok(())
}
