use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use moaimaker::patch::ips_write::create_ips_patch;
use moaimaker::patch::Rom;
use moaimaker::LayoutStore;
use moaimaker_game::codec::{decode_header, enemy_count};
use moaimaker_game::LogicalLevel;
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    input_rom: PathBuf,

    #[arg(long)]
    output_rom: Option<PathBuf>,

    /// Also write the changes as an IPS patch against the input image.
    #[arg(long)]
    output_ips: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the levels and how full each region is.
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Write one level (1-based) as JSON.
    ExportLevel {
        #[arg(long)]
        level: usize,
        #[arg(long)]
        output: PathBuf,
    },
    /// Replace one level (1-based) with a JSON level.
    ImportLevel {
        #[arg(long)]
        level: usize,
        #[arg(long)]
        input: PathBuf,
    },
    SetCount {
        #[arg(long)]
        count: usize,
    },
    MoveLevel {
        #[arg(long)]
        from: usize,
        #[arg(long)]
        to: usize,
    },
    /// Apply the bug-fix patches and rewrite the levels.
    Fix,
    /// Convert to the expanded layout (up to 127 levels).
    Expand,
}

fn level_index(level: usize, store: &LayoutStore) -> Result<usize> {
    if level == 0 || level > store.level_count() {
        bail!(
            "Level {level} does not exist (the image has {} levels)",
            store.level_count()
        );
    }
    Ok(level - 1)
}

fn print_info(store: &LayoutStore, json: bool) -> Result<()> {
    let usage = store.usage();
    if json {
        println!("{}", serde_json::to_string_pretty(&usage)?);
        return Ok(());
    }
    println!(
        "{} layout, {} levels (max {})",
        store.layout(),
        store.level_count(),
        store.layout().max_level_count()
    );
    println!(
        "level data: {}/{} bytes, enemy data: {}/{} bytes, enemies: {}/{}",
        usage.level_data_used,
        usage.level_data_capacity,
        usage.enemy_data_used,
        usage.enemy_data_capacity,
        usage.enemy_count,
        usage.max_enemies
    );
    for level in store.active_levels() {
        let header = decode_header(level.data())?;
        let address = level
            .placement()
            .map(|p| format!("${:04X}", p.cpu_address))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:3}: {address} {:4} bytes, background {:2}{}, {} enemies",
            level.index + 1,
            level.data().len(),
            header.background,
            if header.wide_screen { " wide" } else { "" },
            enemy_count(level.enemy_data())
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let input_rom = Rom::load(&args.input_rom)?;
    let mut store = LayoutStore::parse(input_rom.data.clone())
        .with_context(|| format!("Unable to read levels from {}", args.input_rom.display()))?;

    match &args.command {
        Command::Info { json } => {
            return print_info(&store, *json);
        }
        Command::ExportLevel { level, output } => {
            let index = level_index(*level, &store)?;
            let logical = store.logical_level(index)?;
            let json = serde_json::to_string_pretty(&logical)?;
            std::fs::write(output, json)
                .with_context(|| format!("Unable to write level to {}", output.display()))?;
            info!("Wrote level {level} to {}", output.display());
            return Ok(());
        }
        Command::ImportLevel { level, input } => {
            let index = level_index(*level, &store)?;
            let json = std::fs::read_to_string(input)
                .with_context(|| format!("Unable to read level from {}", input.display()))?;
            let logical: LogicalLevel = serde_json::from_str(&json)
                .with_context(|| format!("Unable to parse level JSON in {}", input.display()))?;
            store.set_level_from_logical(index, &logical)?;
        }
        Command::SetCount { count } => {
            store.set_level_count(*count)?;
        }
        Command::MoveLevel { from, to } => {
            let from = level_index(*from, &store)?;
            let to = level_index(*to, &store)?;
            store.move_level(from, to)?;
        }
        Command::Fix => {
            store.apply_fixes()?;
        }
        Command::Expand => {
            store.expand()?;
        }
    }

    let output_rom = Rom::new(store.build()?);
    let usage = store.usage();
    info!(
        "Level data {}/{} bytes, enemy data {}/{} bytes",
        usage.level_data_used,
        usage.level_data_capacity,
        usage.enemy_data_used,
        usage.enemy_data_capacity
    );

    if args.output_rom.is_none() && args.output_ips.is_none() {
        warn!("No --output-rom or --output-ips given; nothing written");
    }
    if let Some(output_rom_path) = &args.output_rom {
        println!("Writing output ROM to {}", output_rom_path.display());
        output_rom.save(output_rom_path)?;
    }
    if let Some(output_ips_path) = &args.output_ips {
        println!("Writing IPS patch to {}", output_ips_path.display());
        let patch = create_ips_patch(&input_rom.data, &output_rom.data)?;
        std::fs::write(output_ips_path, patch)
            .with_context(|| format!("Unable to write IPS patch to {}", output_ips_path.display()))?;
    }
    Ok(())
}
