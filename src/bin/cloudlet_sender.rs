use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

use cloudlet::{Cloudlet, CloudletConfig, CloudletError, FieldLayout, SampleValues, ValueSource};

/// Stream synthetic samples to a collector on the configured group
#[derive(Parser, Debug)]
#[command(name = "cloudlet-sender", version, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recording length in seconds
    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..=5))]
    duration: u64,

    /// Classification label sent with the handshake
    #[arg(short, long, default_value = "0")]
    label: String,

    /// Comma separated field keys (a-z, except n)
    #[arg(short, long, default_value = "a,b,c,d")]
    fields: String,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    cloudlet::logging::init_tracing(if args.verbose { "debug" } else { "info" });

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            if let Some(cloudlet_error) = e.downcast_ref::<CloudletError>() {
                for suggestion in cloudlet_error.recovery_suggestions() {
                    error!("  - {}", suggestion);
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => CloudletConfig::from_file(path)?,
        None => CloudletConfig::default(),
    };
    let layout = FieldLayout::parse_list(&args.fields).context("invalid --fields")?;
    let width = layout.len();

    let mut controller = Cloudlet::udp(config).await?;
    info!("Device {} streaming for {}s", controller.device_identity(), args.duration);

    controller.configure_fields(layout.keys().iter().copied())?;

    let origin = Instant::now();
    controller.set_sample_producer(ValueSource::new(move |_tally| {
        let t = origin.elapsed().as_secs_f64();
        let wave = [t.sin(), t.cos(), (2.0 * t).sin(), t];
        SampleValues::from(&wave[..width])
    }));
    controller.set_on_recording_started(|| info!("Recording started"));
    controller.set_on_recording_finished(|| info!("Recording finished"));

    let summary = controller.stream_for(args.duration, &args.label).await?;
    info!(
        "Session {}: {} samples, {} frames, terminator at {}",
        summary.session_id, summary.samples, summary.frames_sent, summary.terminator_sequence
    );
    Ok(())
}
