use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use colored::Colorize;
use structopt::StructOpt;

use gnss_rcv::config::ReceiverConfig;
use gnss_rcv::errors::ReceiverError;
use gnss_rcv::events::ReceiverEvent;
use gnss_rcv::receiver::{Receiver, SampleSource};
use gnss_rcv::recording::{IQFileType, IQRecording};

#[derive(StructOpt)]
#[structopt(name = "l1ca-rcv", about = "software-defined GPS L1 C/A receiver")]
struct Options {
    #[structopt(
        short = "f",
        long,
        default_value = "resources/nov_3_time_18_48_st_ives"
    )]
    file: PathBuf,

    #[structopt(short = "t", long, default_value = "2xf32")]
    iq_file_type: IQFileType,

    #[structopt(long, default_value = "2046000")]
    sample_rate: f64,

    /// Optional JSON file overriding the default `ReceiverConfig`.
    #[structopt(short = "c", long)]
    config: Option<PathBuf>,

    #[structopt(long, short = "v")]
    verbose: bool,
}

fn load_config(opt: &Options) -> Result<ReceiverConfig, ReceiverError> {
    let mut cfg = match &opt.config {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| ReceiverError::ConfigInvalid(format!("{}: {e}", path.display())))?;
            serde_json::from_reader(file)
                .map_err(|e| ReceiverError::ConfigInvalid(format!("{}: {e}", path.display())))?
        }
        None => ReceiverConfig::default(),
    };
    cfg.sample_rate_hz = opt.sample_rate;
    cfg.validate()?;
    Ok(cfg)
}

fn print_event(event: &ReceiverEvent) {
    match event {
        ReceiverEvent::Acquired {
            sv_id,
            doppler_hz,
            code_phase_samples,
            ..
        } => println!(
            "{} sv {:>2}: doppler={:+.0} Hz phase={:.0}",
            "ACQUIRED".green(),
            sv_id,
            doppler_hz,
            code_phase_samples
        ),
        ReceiverEvent::Locked { sv_id, cn0_db, .. } => {
            println!("{} sv {:>2}: cn0={:.1} dB-Hz", "LOCKED".green().bold(), sv_id, cn0_db)
        }
        ReceiverEvent::Unlocked { sv_id, .. } => {
            println!("{} sv {:>2}", "UNLOCKED".yellow(), sv_id)
        }
        ReceiverEvent::BitSync {
            sv_id,
            bit_boundary_phase,
            ..
        } => println!(
            "{} sv {:>2}: phase={}",
            "BITSYNC".cyan(),
            sv_id,
            bit_boundary_phase
        ),
        ReceiverEvent::FrameSync { sv_id, .. } => {
            println!("{} sv {:>2}", "FRAMESYNC".cyan(), sv_id)
        }
        ReceiverEvent::Subframe {
            sv_id,
            subframe_id,
            tow,
            ..
        } => println!(
            "{} sv {:>2}: subframe={} tow={}",
            "SUBFRAME".blue(),
            sv_id,
            subframe_id,
            tow
        ),
        ReceiverEvent::Ephemeris { sv_id, iode, .. } => {
            println!("{} sv {:>2}: iode={}", "EPHEMERIS".blue().bold(), sv_id, iode)
        }
        ReceiverEvent::Fix(solution) => println!(
            "{} ecef=({:.1}, {:.1}, {:.1}) clock_bias={:.1} m svs={} pdop={:.2}",
            "FIX".green().bold(),
            solution.ecef_x_m,
            solution.ecef_y_m,
            solution.ecef_z_m,
            solution.clock_bias_m,
            solution.num_svs,
            solution.dops.pdop
        ),
        ReceiverEvent::Overrun { dropped_samples } => {
            println!("{} dropped {} samples", "OVERRUN".red(), dropped_samples)
        }
        ReceiverEvent::Error { sv_id, stage, error } => println!(
            "{} [{}] {}: {}",
            "ERROR".red().bold(),
            stage,
            sv_id.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            error
        ),
    }
}

fn main() {
    let opt = Options::from_args();

    let log_level = if opt.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let cfg = match load_config(&opt) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "config error".red().bold());
            std::process::exit(e.exit_code());
        }
    };

    let sample_rate_hz = cfg.sample_rate_hz;
    let mut recording = IQRecording::new(opt.file, sample_rate_hz, opt.iq_file_type);

    let exit_req = Arc::new(AtomicBool::new(false));
    {
        let exit_req = exit_req.clone();
        if ctrlc::set_handler(move || exit_req.store(true, Ordering::SeqCst)).is_err() {
            log::warn!("failed to install ctrl-c handler");
        }
    }

    let (tx, rx) = mpsc::channel();
    let mut receiver = match Receiver::new(cfg.clone(), tx) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}: {e}", "config error".red().bold());
            std::process::exit(e.exit_code());
        }
    };

    let samples_per_code = (cfg.sample_rate_hz * 1e-3).round() as usize;
    let ts = Instant::now();

    let worker = std::thread::spawn(move || -> Result<(), ReceiverError> {
        let mut off_samples = 0usize;
        loop {
            if exit_req.load(Ordering::SeqCst) {
                return Ok(());
            }
            match recording.read(off_samples, samples_per_code) {
                Ok(block) => {
                    off_samples += samples_per_code;
                    receiver.process_block(block);
                }
                Err(_) => return Err(ReceiverError::SampleSourceExhausted),
            }
        }
    });

    let mut exit_code = 0;
    let mut got_fix = false;
    for event in rx {
        if let ReceiverEvent::Fix(_) = &event {
            got_fix = true;
        }
        if let ReceiverEvent::Error { error, .. } = &event {
            if !error.is_sv_local() {
                exit_code = error.exit_code();
            }
        }
        print_event(&event);
    }

    match worker.join() {
        Ok(Ok(())) => {}
        // A clean sample-source exhaustion after at least one fix isn't a
        // failure: the receiver ran the file to completion and did its job.
        Ok(Err(ReceiverError::SampleSourceExhausted)) if got_fix => {}
        Ok(Err(e)) => {
            eprintln!("{}: {e}", "receiver error".red().bold());
            exit_code = e.exit_code();
        }
        Err(_) => {
            eprintln!("{}: receiver thread panicked", "internal error".red().bold());
            exit_code = ReceiverError::InternalInvariant("worker panic".to_string()).exit_code();
        }
    }

    println!("duration: {} msec", ts.elapsed().as_millis());
    std::process::exit(exit_code);
}
