use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use vcs_atari2600::{Console, FrameSync};
use vcs_core::logging::{LogConfig, LogLevel};
use vcs_core::System;

/// Headless runner for the VCS core: load a ROM, run frames, dump state.
#[derive(Parser)]
struct Args {
    /// Path to a ROM image (2K/4K/8K/16K raw binary)
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Dump the save state to this file as JSON
    #[arg(long, default_value = "state.json")]
    save: String,

    /// Print per-frame stats (pixel checksum, beam position, audio)
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Suppress all per-frame output (still writes --save)
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// Core log verbosity for all categories (off/error/warn/info/debug/trace)
    #[arg(long, default_value = "off")]
    core_log: String,

    /// Use fixed 262-scanline frame pacing instead of VSYNC anchoring
    #[arg(long, default_value_t = false)]
    fixed_sync: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(level) = LogLevel::from_str(&args.core_log) {
        LogConfig::global().set_all(level);
    } else {
        anyhow::bail!("unknown log level: {}", args.core_log);
    }

    let rom = std::fs::read(&args.rom)
        .with_context(|| format!("reading ROM {}", args.rom.display()))?;
    let mut console = Console::new(&rom).context("powering on")?;
    if args.fixed_sync {
        console.set_frame_sync(FrameSync::Fixed262);
    }

    for fnum in 1..=args.frames {
        console.run_frame();
        let audio = console.drain_audio();

        if args.quiet {
            continue;
        }

        if args.debug {
            let frame = console.framebuffer();
            let checksum: u32 = frame
                .pixels
                .iter()
                .fold(0u32, |acc, &p| acc.rotate_left(1) ^ p);
            let non_black = frame.pixels.iter().filter(|&&p| p != 0xFF000000).count();
            let tia = console.tia_debug();
            let (cycles, instructions, unknown) = console.cpu_counters();
            println!(
                "frame {fnum}: checksum={checksum:08X} non_black={non_black} \
                 sl={} visible_start={} samples={} cpu_cycles={cycles} \
                 instructions={instructions} unknown_ops={unknown}",
                tia.sl,
                tia.visible_start,
                audio.len(),
            );
        }
    }

    let state = console.save_state();
    let mut f = File::create(&args.save)
        .with_context(|| format!("creating {}", args.save))?;
    write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
    if !args.quiet {
        println!("wrote save state to {}", args.save);
    }

    Ok(())
}
