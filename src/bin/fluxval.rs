use chrono::NaiveDateTime;
use clap::Parser;
use crossbeam_channel::{bounded, Sender};
use fluxval::{
    archive_dirs, find_products, CollocationFile, CollocationSettings, CollocationWriter,
    Collocator, FluxValError, FluxValResult, HourLabel, ObservationFormat, ObservationStore,
    ProcessingMode, ProductArea, ProductFile, SatelliteProduct, StationList, WindowSize,
};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
    thread::{self, JoinHandle},
};

/// One product decoded ahead of the one being collocated.
const CHANNEL_SIZE: usize = 1;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Collocate satellite flux estimates with station observations.
///
/// Every product acquired within the time range is sampled around each station in the station
/// list and matched with the station's observation for the same hour or day. The collocated
/// records are appended to the output file.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "fluxval")]
#[clap(author, version, about)]
struct FluxValOptionsInit {
    /// The start time (UTC) as YYYYMMDDHH, only products acquired after it are used.
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_time))]
    start: NaiveDateTime,

    /// The end time (UTC) as YYYYMMDDHH, only products acquired before it are used.
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_time))]
    end: NaiveDateTime,

    /// The product area, one of ns, nr, at or gr. Required for passes.
    #[clap(short = 'p', long)]
    area: Option<ProductArea>,

    /// Read products from this directory instead of the archive.
    #[clap(short = 'r', long)]
    input_dir: Option<PathBuf>,

    /// The root of the product archive, organized as YYYY/MM/DD/ssi.
    ///
    /// If this is not specified, then the program will check for it in the "FLUXVAL_ARCHIVE"
    /// environment variable.
    #[clap(long)]
    #[clap(env = "FLUXVAL_ARCHIVE")]
    archive: Option<PathBuf>,

    /// The directory holding the monthly observation files.
    ///
    /// If this is not specified, then the program will check for it in the "FLUXVAL_OBS_DIR"
    /// environment variable.
    #[clap(short = 'm', long)]
    #[clap(env = "FLUXVAL_OBS_DIR")]
    obs_dir: Option<PathBuf>,

    /// The station list.
    #[clap(short = 'i', long)]
    stations: PathBuf,

    /// The collocation file to append to.
    #[clap(short, long)]
    output: PathBuf,

    /// The observation file format, one of native, r-extract, kdvh or gts.
    #[clap(short, long, default_value = "native")]
    format: ObservationFormat,

    /// The kind of products to process, one of pass, daily-old or daily-new.
    #[clap(long, default_value = "pass")]
    mode: ProcessingMode,

    /// The width of the square sampling window, it must be odd.
    ///
    /// Defaults to 13 for passes and 1 for daily products.
    #[clap(short, long)]
    window: Option<usize>,

    /// The minute used in hourly observation labels, top (hh00) or half (hh30).
    #[clap(long, default_value = "top")]
    hour_label: HourLabel,

    /// Only sample the products, write placeholders instead of observations.
    #[clap(short = 'a', long)]
    satellite_only: bool,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/// Parse a command line time.
fn parse_time(t_str: &str) -> Result<NaiveDateTime, String> {
    if t_str.len() != 10 || !t_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("expected YYYYMMDDHH, got {}", t_str));
    }

    NaiveDateTime::parse_from_str(&format!("{}0000", t_str), "%Y%m%d%H%M%S")
        .map_err(|err| format!("invalid time {}: {}", t_str, err))
}

#[derive(Debug)]
struct FluxValOptionsChecked {
    /// Start of the time range.
    start: NaiveDateTime,

    /// End of the time range.
    end: NaiveDateTime,

    /// The product area.
    area: Option<ProductArea>,

    /// The directories to scan for products.
    product_dirs: Vec<PathBuf>,

    /// Where the observations are.
    obs_dir: Option<PathBuf>,

    /// The station list.
    stations: PathBuf,

    /// The output file.
    output: PathBuf,

    /// The observation format.
    format: ObservationFormat,

    /// How to collocate.
    settings: CollocationSettings,

    /// Verbose output
    verbose: bool,
}

impl Display for FluxValOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let area = self.area.map(|a| a.name()).unwrap_or("any");
        let window = self.settings.window;

        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "          Start: {}", self.start)?;
        writeln!(f, "            End: {}", self.end)?;
        writeln!(f, "           Mode: {}", self.settings.mode)?;
        writeln!(f, "           Area: {}", area)?;
        writeln!(f, "         Window: {}x{}", window.width, window.height)?;
        writeln!(f, "     Hour label: {}", self.settings.hour_label.name())?;
        writeln!(f, "       Stations: {}", self.stations.display())?;
        if self.settings.satellite_only {
            writeln!(f, "   Observations: satellite only")?;
        } else if let Some(obs_dir) = &self.obs_dir {
            writeln!(f, "   Observations: {} ({})", obs_dir.display(), self.format)?;
        }
        writeln!(f, "         Output: {}", self.output.display())?;
        for dir in &self.product_dirs {
            writeln!(f, "  Products from: {}", dir.display())?;
        }
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> FluxValResult<FluxValOptionsChecked> {
    let FluxValOptionsInit {
        start,
        end,
        area,
        input_dir,
        archive,
        obs_dir,
        stations,
        output,
        format,
        mode,
        window,
        hour_label,
        satellite_only,
        verbose,
    } = FluxValOptionsInit::parse();

    if start >= end {
        return Err(FluxValError::Config(format!(
            "start ({}) must be before end ({})",
            start, end
        )));
    }

    if mode == ProcessingMode::Pass && area.is_none() {
        return Err(FluxValError::Config(
            "an area is required when processing passes".to_owned(),
        ));
    }

    let product_dirs = match (input_dir, archive) {
        (Some(input_dir), _) => vec![input_dir],
        (None, Some(archive)) => archive_dirs(archive, start, end),
        (None, None) => {
            return Err(FluxValError::Config(
                "either an input directory or the archive root is required".to_owned(),
            ))
        }
    };

    if obs_dir.is_none() && !satellite_only {
        return Err(FluxValError::Config(
            "an observation directory is required unless running satellite only".to_owned(),
        ));
    }

    let window = match window {
        Some(side) => WindowSize::square(side),
        None => mode.default_window(),
    };
    window.validate()?;

    let settings = CollocationSettings {
        mode,
        window,
        hour_label,
        satellite_only,
    };

    Ok(FluxValOptionsChecked {
        start,
        end,
        area,
        product_dirs,
        obs_dir,
        stations,
        output,
        format,
        settings,
        verbose,
    })
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> Result<(), Box<dyn Error>> {
    let opts = parse_args()?;

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    log::debug!("{}", opts);

    let stations = StationList::load(&opts.stations)?;
    log::info!("loaded {} stations", stations.len());

    let products = find_products(
        &opts.product_dirs,
        opts.settings.mode,
        opts.area,
        opts.start,
        opts.end,
    );
    if products.is_empty() {
        log::warn!("no products found between {} and {}", opts.start, opts.end);
        return Ok(());
    }
    log::info!("found {} products", products.len());

    let store = match (&opts.obs_dir, opts.settings.satellite_only) {
        (Some(obs_dir), false) => Some(ObservationStore::new(obs_dir, opts.format.into_source())),
        _ => None,
    };
    let mut collocator = Collocator::new(&stations, store, opts.settings)?;
    let mut output = CollocationFile::append(&opts.output)?;

    let (to_main, from_load_thread) = bounded(CHANNEL_SIZE);
    let load_thread = start_load_thread(products, to_main)?;

    for product in from_load_thread {
        log::info!("processing {}", product.file_name());

        let records = collocator.process(&product);
        let written = output.write_records(&records)?;
        log::debug!("{} records from {}", written, product.file_name());
    }

    output.flush()?;

    let unreadable = load_thread
        .join()
        .map_err(|_| "the product loading thread panicked")?;

    let stats = collocator.finish();

    log::info!("");
    log::info!("Collocation summary:");
    log::info!("      products - {:>19}", stats.products);
    log::info!("    unreadable - {:>19}", unreadable);
    log::info!("       records - {:>19}", stats.records);
    log::info!("       skipped - {:>19}", stats.skipped);
    log::info!("");

    Ok(())
}

/// Decode products in order and pass them on, returns the number that could not be read.
fn start_load_thread(
    products: Vec<ProductFile>,
    to_main: Sender<SatelliteProduct>,
) -> Result<JoinHandle<usize>, Box<dyn Error>> {
    let jh = thread::Builder::new()
        .name("fluxval-load".to_owned())
        .spawn(move || {
            let mut unreadable = 0;

            for ProductFile { path, acquired } in products {
                let product = match SatelliteProduct::open(&path) {
                    Ok(product) => product,
                    Err(err) => {
                        log::warn!("skipping {} ({}): {}", path.display(), acquired, err);
                        unreadable += 1;
                        continue;
                    }
                };

                if to_main.send(product).is_err() {
                    break;
                }
            }

            unreadable
        })?;

    Ok(jh)
}
