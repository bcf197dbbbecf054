//! STEREO CLI: load, channels, combine and cache commands.
//!
//! Commands:
//! - `load`: fetch instrument data for a date range and write CSV or Parquet
//! - `channels`: print the SEPT energy channel table for a species
//! - `combine`: average a channel range of a saved SEPT table
//! - `cache status`: report the contents of the local store
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use stereo_core::config::parse_date;
use stereo_core::data::LocalStore;
use stereo_core::table::format_millis;
use stereo_core::{
    combine_channels, ChannelTable, DataColumn, Instrument, LoadConfig, LoadOutput, Metadata,
    Species, TimeTable,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stereo",
    about = "STEREO CLI: particle and magnetic-field data loader"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load instrument data for a date range.
    Load {
        /// Instrument: HET, LET, MAG, MAGB or SEPT. Optional with --config.
        instrument: Option<String>,

        /// First day (YYYY-MM-DD or YYYY/MM/DD).
        #[arg(long)]
        start: Option<String>,

        /// Last day, inclusive. Defaults to the start day.
        #[arg(long)]
        end: Option<String>,

        /// Spacecraft: ahead (a) or behind (b).
        #[arg(long)]
        spacecraft: Option<String>,

        /// Magnetometer coordinate system: RTN or SC.
        #[arg(long)]
        coord: Option<String>,

        /// SEPT species: e (electrons) or p (ions).
        #[arg(long)]
        species: Option<String>,

        /// SEPT viewing direction: sun, asun, north or south.
        #[arg(long)]
        viewing: Option<String>,

        /// Resample frequency, e.g. 1min, 10min, 1h.
        #[arg(long)]
        resample: Option<String>,

        /// Timestamp position of resampled rows: center or start.
        #[arg(long)]
        pos_timestamp: Option<String>,

        /// Maximum number of parallel downloads.
        #[arg(long)]
        max_conn: Option<usize>,

        /// Local storage directory. Defaults to ./data.
        #[arg(long)]
        path: Option<PathBuf>,

        /// SEPT: keep time-bookkeeping and integration-time columns.
        #[arg(long, default_value_t = false)]
        all_columns: bool,

        /// TOML file with load options; flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file (.csv or .parquet). Without it a summary is printed.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the SEPT energy channel table.
    Channels {
        /// Species: e (electrons) or p (ions).
        species: String,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Average a channel range of a SEPT table saved with `load --output x.csv`.
    Combine {
        /// CSV file written by `load`.
        file: PathBuf,

        /// Species the file was loaded for: e or p.
        #[arg(long, default_value = "e")]
        species: String,

        /// First and last channel number.
        #[arg(long, num_args = 2, value_names = ["FIRST", "LAST"], required = true)]
        channels: Vec<u32>,

        /// Write the combined series to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Local store management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report file counts and sizes per directory.
    Status {
        /// Storage directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        path: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// `load` flags, applied on top of an optional config file.
struct LoadArgs {
    instrument: Option<String>,
    start: Option<String>,
    end: Option<String>,
    spacecraft: Option<String>,
    coord: Option<String>,
    species: Option<String>,
    viewing: Option<String>,
    resample: Option<String>,
    pos_timestamp: Option<String>,
    max_conn: Option<usize>,
    path: Option<PathBuf>,
    all_columns: bool,
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Load {
            instrument,
            start,
            end,
            spacecraft,
            coord,
            species,
            viewing,
            resample,
            pos_timestamp,
            max_conn,
            path,
            all_columns,
            config,
            output,
        } => {
            let args = LoadArgs {
                instrument,
                start,
                end,
                spacecraft,
                coord,
                species,
                viewing,
                resample,
                pos_timestamp,
                max_conn,
                path,
                all_columns,
                config,
            };
            run_load(args, output.as_deref())
        }
        Commands::Channels { species, json } => run_channels(&species, json),
        Commands::Combine {
            file,
            species,
            channels,
            output,
        } => run_combine(&file, &species, &channels, output.as_deref()),
        Commands::Cache { action } => match action {
            CacheAction::Status { path, json } => run_cache_status(&path, json),
        },
    }
}

fn build_config(args: LoadArgs) -> Result<LoadConfig> {
    let mut config = match &args.config {
        Some(path) => LoadConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let Some(instrument) = args.instrument.as_deref() else {
                bail!("an instrument is required (or --config FILE)");
            };
            let Some(start) = args.start.as_deref() else {
                bail!("--start is required (or --config FILE)");
            };
            let instrument: Instrument = instrument.parse()?;
            let start = parse_date(start)?;
            LoadConfig::new(instrument, start, start)
        }
    };

    // Flags override file values
    if let Some(instrument) = &args.instrument {
        config.instrument = instrument.parse()?;
    }
    if let Some(start) = &args.start {
        config.start = parse_date(start)?;
        if args.config.is_none() && args.end.is_none() {
            config.end = config.start;
        }
    }
    if let Some(end) = &args.end {
        config.end = parse_date(end)?;
    }
    if let Some(s) = &args.spacecraft {
        config.spacecraft = s.parse()?;
    }
    if let Some(s) = &args.coord {
        config.mag_coord = s.parse()?;
    }
    if let Some(s) = &args.species {
        config.sept_species = s.parse()?;
    }
    if let Some(s) = &args.viewing {
        config.sept_viewing = s.parse()?;
    }
    if let Some(s) = &args.resample {
        config.resample = Some(s.parse()?);
    }
    if let Some(s) = &args.pos_timestamp {
        config.pos_timestamp = s.parse()?;
    }
    if let Some(n) = args.max_conn {
        config.max_conn = n;
    }
    if let Some(path) = args.path {
        config.path = Some(path);
    }
    if args.all_columns {
        config.all_columns = true;
    }

    config.validate()?;
    Ok(config)
}

fn run_load(args: LoadArgs, output: Option<&Path>) -> Result<()> {
    let config = build_config(args)?;
    let LoadOutput { table, metadata } = stereo_core::load(&config)?;

    match output {
        Some(path) => {
            write_table(&table, path)?;
            info!(path = %path.display(), rows = table.len(), "table written");
        }
        None => print_summary(&config, &table, &metadata),
    }
    Ok(())
}

fn write_table(table: &TimeTable, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => table.write_csv(path)?,
        Some("parquet") => table.write_parquet(path)?,
        _ => bail!(
            "unsupported output format for '{}' (use .csv or .parquet)",
            path.display()
        ),
    }
    Ok(())
}

fn print_summary(config: &LoadConfig, table: &TimeTable, metadata: &Metadata) {
    println!();
    println!("=== {} ({}) ===", config.instrument, config.spacecraft);
    println!("Period:   {} to {}", config.start, config.end);
    println!("Rows:     {}", table.len());
    if let (Some(first), Some(last)) = (table.times().first(), table.times().last()) {
        println!("First:    {}", format_millis(*first));
        println!("Last:     {}", format_millis(*last));
    }
    println!("Columns:  {}", table.column_names().join(", "));

    match metadata {
        Metadata::Channels(channels) => {
            println!();
            print_channel_table(channels);
        }
        Metadata::Archive {
            dataset,
            files,
            parameters,
        } => {
            println!("Dataset:  {dataset}");
            println!("Files:    {}", files.len());
            for p in parameters {
                println!(
                    "  {:<16} {:<8} {:<6} {}",
                    p.name,
                    p.kind,
                    p.units.as_deref().unwrap_or("-"),
                    p.width()
                );
            }
        }
    }
    println!();
}

fn print_channel_table(channels: &ChannelTable) {
    println!(
        "{:>4} {:<22} {:>10} {:>10}",
        "Bin", "Energy", "dE [MeV]", "E [keV]"
    );
    println!("{}", "-".repeat(49));
    for ch in channels.channels() {
        println!(
            "{:>4} {:<22} {:>10.4} {:>10.2}",
            ch.bin,
            ch.label(),
            ch.de_mev,
            ch.mean_kev
        );
    }
}

fn run_channels(species: &str, json: bool) -> Result<()> {
    let species: Species = species.parse()?;
    let channels = ChannelTable::sept(species);
    if json {
        println!("{}", serde_json::to_string_pretty(&channels)?);
    } else {
        println!("SEPT {species}: {} channels", channels.len());
        print_channel_table(&channels);
    }
    Ok(())
}

fn run_combine(file: &Path, species: &str, range: &[u32], output: Option<&Path>) -> Result<()> {
    let [first, last] = range else {
        bail!("--channels takes exactly two channel numbers");
    };
    let species: Species = species.parse()?;
    let channels = ChannelTable::sept(species);
    let table =
        TimeTable::read_csv(file).with_context(|| format!("reading {}", file.display()))?;

    let (values, label) = combine_channels(&table, &channels, [*first, *last])?;

    let combined = TimeTable::new(
        table.times().to_vec(),
        vec![DataColumn::new(label.clone(), values)],
    )?;

    match output {
        Some(path) => {
            combined.write_csv(path)?;
            info!(path = %path.display(), label = %label, "combined series written");
        }
        None => {
            println!("time,{label}");
            for (ms, v) in combined.times().iter().zip(combined.columns()[0].values.iter()) {
                if v.is_nan() {
                    println!("{},", format_millis(*ms));
                } else {
                    println!("{},{v}", format_millis(*ms));
                }
            }
        }
    }
    Ok(())
}

fn run_cache_status(path: &Path, json: bool) -> Result<()> {
    if !path.exists() {
        println!("Storage directory does not exist: {}", path.display());
        return Ok(());
    }

    let store = LocalStore::new(path);
    let status = store.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.is_empty() {
        println!("Store is empty: {}", path.display());
        return Ok(());
    }

    let total: u64 = status.iter().map(|s| s.total_bytes).sum();
    let files: usize = status.iter().map(|s| s.file_count).sum();

    println!("Store: {}", path.display());
    println!("Files: {files}");
    println!("Total size: {}", format_size(total));
    println!();
    println!(
        "{:<24} {:>6} {:>8} {:>11} {:>10}",
        "Directory", "Files", "Tracked", "Quarantined", "Size"
    );
    println!("{}", "-".repeat(63));
    for s in &status {
        println!(
            "{:<24} {:>6} {:>8} {:>11} {:>10}",
            s.name,
            s.file_count,
            s.tracked_files,
            s.quarantined_files,
            format_size(s.total_bytes)
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::{MagCoord, Spacecraft, TimestampPosition};

    fn args(instrument: Option<&str>, start: Option<&str>) -> LoadArgs {
        LoadArgs {
            instrument: instrument.map(String::from),
            start: start.map(String::from),
            end: None,
            spacecraft: None,
            coord: None,
            species: None,
            viewing: None,
            resample: None,
            pos_timestamp: None,
            max_conn: None,
            path: None,
            all_columns: false,
            config: None,
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn single_day_when_end_is_omitted() {
        let config = build_config(args(Some("mag"), Some("2021/04/15"))).unwrap();
        assert_eq!(config.instrument, Instrument::Mag);
        assert_eq!(config.start, config.end);
    }

    #[test]
    fn flags_are_applied() {
        let mut a = args(Some("magb"), Some("2021-04-15"));
        a.end = Some("2021-04-17".into());
        a.spacecraft = Some("b".into());
        a.coord = Some("sc".into());
        a.pos_timestamp = Some("start".into());
        a.resample = Some("10min".into());

        let config = build_config(a).unwrap();
        assert_eq!(config.spacecraft, Spacecraft::Behind);
        assert_eq!(config.mag_coord, MagCoord::Sc);
        assert_eq!(config.pos_timestamp, TimestampPosition::Start);
        assert_eq!(config.resample.unwrap().as_millis(), 600_000);
        assert_eq!(config.days().len(), 3);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("load.toml");
        std::fs::write(
            &file,
            "instrument = \"sept\"\nstart = \"2021-04-15\"\nend = \"2021-04-20\"\nsept_viewing = \"north\"\n",
        )
        .unwrap();

        let mut a = args(None, None);
        a.config = Some(file);
        a.viewing = Some("south".into());
        a.end = Some("2021-04-16".into());

        let config = build_config(a).unwrap();
        assert_eq!(config.instrument, Instrument::Sept);
        assert_eq!(config.sept_viewing, stereo_core::Viewing::South);
        assert_eq!(config.days().len(), 2);
    }

    #[test]
    fn missing_instrument_or_start_is_an_error() {
        assert!(build_config(args(None, Some("2021-04-15"))).is_err());
        assert!(build_config(args(Some("het"), None)).is_err());
        assert!(build_config(args(Some("cris"), Some("2021-04-15"))).is_err());
    }

    #[test]
    fn unknown_output_extension_is_rejected() {
        let table = TimeTable::empty();
        assert!(write_table(&table, Path::new("out.xlsx")).is_err());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1_048_576), "5.0 MB");
    }
}
