use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use hts_synth::{
    engines::hts::{workspace, HtsEngine, HtsInferenceParams, HtsModelParams},
    SynthesisEngine,
};

/// Exit status after an interrupt (128 + SIGINT).
const INTERRUPTED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "hts-synth")]
#[command(about = "Synthesize HTS full-context labels with unseen models and STRAIGHT")]
#[command(version)]
struct Cli {
    /// Voice directory holding cmp.mmf, dur.mmf, full.list, trees/ and voice.json
    #[arg(long, default_value = ".")]
    voice: PathBuf,

    /// Coefficient model file
    #[arg(short = 'm', long = "cmp", value_name = "FILE")]
    cmp_model: Option<PathBuf>,

    /// Duration model file
    #[arg(short = 'd', long = "dur", value_name = "FILE")]
    dur_model: Option<PathBuf>,

    /// Full-context model list
    #[arg(short = 'l', long = "list", value_name = "FILE")]
    model_list: Option<PathBuf>,

    /// Directory which contains the coefficient trees
    #[arg(short = 't', long = "cmp_tree", value_name = "DIR")]
    cmp_tree_dir: Option<PathBuf>,

    /// Directory which contains the duration tree
    #[arg(short = 'u', long = "dur_tree", value_name = "DIR")]
    dur_tree_dir: Option<PathBuf>,

    /// The input is an scp formatted list of label files
    #[arg(short = 's', long = "with_scp")]
    with_scp: bool,

    /// Global variance model directory (enables GV)
    #[arg(short = 'g', long = "gv", value_name = "DIR")]
    gv_dir: Option<PathBuf>,

    /// Parameter generation type
    #[arg(short = 'p', long = "pg_type", default_value_t = 0)]
    pg_type: u8,

    /// Input label file (or list with --with_scp)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Output wav directory
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: PathBuf,

    /// Root directory for run workspaces
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Keep the run workspace after synthesis
    #[arg(long)]
    keep_workspace: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Remove the run workspaces under `workdir` on SIGINT or SIGTERM, since
/// destructors do not run when the process is killed.
fn install_interrupt_handler(workdir: PathBuf) {
    let installed = ctrlc::set_handler(move || {
        for dir in workspace::release_active_under(&workdir) {
            log::warn!("Interrupted, removed workspace {}", dir.display());
        }
        std::process::exit(INTERRUPTED);
    });
    if let Err(e) = installed {
        log::warn!("Could not install the interrupt handler: {e}");
    }
}

fn run(cli: Cli, workdir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = HtsEngine::new();
    engine.load_model_with_params(
        &cli.voice,
        HtsModelParams {
            cmp_model: cli.cmp_model,
            dur_model: cli.dur_model,
            model_list: cli.model_list,
            cmp_tree_dir: cli.cmp_tree_dir,
            dur_tree_dir: cli.dur_tree_dir,
            gv_dir: cli.gv_dir,
        },
    )?;

    let params = HtsInferenceParams {
        generation_type: cli.pg_type,
        input_is_list: cli.with_scp,
        verbose: cli.verbose,
        workdir,
        keep_workspace: cli.keep_workspace,
    };

    let report = engine.synthesize(&cli.input, &cli.output, Some(params))?;
    for (utt, secs) in report.utterances.iter().zip(report.durations()?) {
        log::info!("{} -> {} ({secs:.2}s)", utt.base, utt.wav_path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    let workdir = cli
        .workdir
        .clone()
        .unwrap_or_else(|| HtsInferenceParams::default().workdir);
    install_interrupt_handler(workdir.clone());

    let start = Instant::now();
    let verbose = cli.verbose;
    match run(cli, workdir) {
        Ok(()) => {
            if verbose {
                log::debug!(
                    "TOTAL TIME IN MINUTES: {:.4}",
                    start.elapsed().as_secs_f64() / 60.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            let mut source = e.source();
            while let Some(cause) = source {
                log::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
