use std::fs;
use std::io::{self, prelude::*};
use std::path::PathBuf;
use std::process::exit;
use std::time;

use clap::Parser;
use log::info;

use mzspecsim::io::{read_queries, write_matches};
use mzspecsim::settings::{ComparatorKind, SpecSimSettings, TransformationKind, VectorizationKind};
use mzspecsim::{SimilaritySearch, SpectralLibrary};

/// Annotate query spectra by their similarity to a spectral library
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// MGF file of query spectra, optionally gzipped
    queries: PathBuf,

    /// MGF files of library spectra, optionally gzipped
    #[arg(required = true)]
    library: Vec<PathBuf>,

    /// Where to write the matches, defaults to STDOUT
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load the search settings from a JSON file. Flags given explicitly override it.
    #[cfg(feature = "serde")]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Precursor m/z tolerance in Da
    #[arg(short = 't', long)]
    tol_mz: Option<f64>,

    /// Number of most intense query peaks to compare
    #[arg(short = 'k', long)]
    pick_count: Option<usize>,

    /// Minimum similarity to report a match
    #[arg(short = 's', long)]
    thresh_score: Option<f64>,

    /// peak-matching, direct-binning or profiling, or its index
    #[arg(long)]
    vectorization: Option<VectorizationKind>,

    /// none, sqrt or log, or its index
    #[arg(long)]
    transformation: Option<TransformationKind>,

    /// euclidean, dot-product, pearson or xcorr, or its index
    #[arg(long)]
    comparator: Option<ComparatorKind>,

    #[arg(long)]
    bin_width: Option<f64>,

    #[arg(long)]
    bin_shift: Option<f64>,

    /// 0 for a piecewise linear peak profile, 1 for a Gaussian one
    #[arg(long)]
    profile_index: Option<i32>,

    #[arg(long)]
    base_width: Option<f64>,

    /// Cross-correlation lag window half-width in bins
    #[arg(long)]
    xcorr_offset: Option<usize>,

    /// Score queries on all cores
    #[cfg(feature = "parallelism")]
    #[arg(short, long)]
    parallel: bool,
}

impl App {
    fn base_settings(&self) -> io::Result<SpecSimSettings> {
        #[cfg(feature = "serde")]
        if let Some(path) = self.config.as_ref() {
            let handle = io::BufReader::new(fs::File::open(path)?);
            return Ok(SpecSimSettings::from_json(handle)?);
        }
        Ok(SpecSimSettings::default())
    }

    fn settings(&self) -> io::Result<SpecSimSettings> {
        let mut settings = self.base_settings()?;
        if let Some(v) = self.tol_mz {
            settings.tol_mz = v;
        }
        if let Some(v) = self.pick_count {
            settings.pick_count = v;
        }
        if let Some(v) = self.thresh_score {
            settings.thresh_score = v;
        }
        if let Some(v) = self.vectorization {
            settings.vectorization = v;
        }
        if let Some(v) = self.transformation {
            settings.transformation = v;
        }
        if let Some(v) = self.comparator {
            settings.comparator = v;
        }
        if let Some(v) = self.bin_width {
            settings.bin_width = v;
        }
        if let Some(v) = self.bin_shift {
            settings.bin_shift = v;
        }
        if let Some(v) = self.profile_index {
            settings.profile_index = v;
        }
        if let Some(v) = self.base_width {
            settings.base_width = v;
        }
        if let Some(v) = self.xcorr_offset {
            settings.xcorr_offset = v;
        }
        Ok(settings)
    }

    fn output(&self) -> io::Result<Box<dyn Write>> {
        match self.output.as_ref() {
            Some(path) => Ok(Box::new(io::BufWriter::new(fs::File::create(path)?))),
            None => Ok(Box::new(io::BufWriter::new(io::stdout().lock()))),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let app = App::parse();
    let start = time::Instant::now();

    let settings = app.settings()?;
    let search = SimilaritySearch::new(settings.clone()).unwrap_or_else(|e| {
        eprintln!("{e}");
        exit(2)
    });

    let queries = read_queries(&app.queries)?;
    info!("Read {} query spectra from {}", queries.len(), app.queries.display());

    let mut library = SpectralLibrary::new();
    for path in app.library.iter() {
        let n = library.load_mgf(settings.experiment_id, path)?;
        info!("Read {n} library spectra from {}", path.display());
    }

    #[cfg(feature = "parallelism")]
    let outcome = if app.parallel {
        search.search_parallel(&queries, &mut library)?
    } else {
        search.search(&queries, &mut library)?
    };
    #[cfg(not(feature = "parallelism"))]
    let outcome = search.search(&queries, &mut library)?;

    write_matches(app.output()?, &outcome.matches, &queries)?;

    let elapsed = time::Instant::now() - start;
    eprintln!(
        "{}: {:0.2} seconds",
        outcome.stats,
        elapsed.as_secs_f64()
    );
    Ok(())
}
