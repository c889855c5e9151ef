use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use scenestack::{
    AoiKind, AreaOfInterest, FeatureEngine, FeatureParams, PreprocessParams, Preprocessor,
    ReflectanceScale,
};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AoiVariant {
    Buffered,
    Unbuffered,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Scale {
    /// Integers, 10000 = 100 % reflectance
    Scaled,
    /// Fractions in 0..1
    Unit,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Unpack scene archives and stack every band into a cropped time series
    Preprocess {
        /// Directory containing the scene archives
        directory: PathBuf,

        /// Sensor name (Landsat5, Landsat7, Landsat8)
        #[arg(default_value = "Landsat8")]
        sensor: String,

        /// Area-of-interest polygon file
        #[arg(long, default_value = "data/BB_povodi_WGS_UTM33_buffer500m.shp")]
        aoi: PathBuf,

        #[arg(long, value_enum, default_value_t = AoiVariant::Buffered)]
        aoi_kind: AoiVariant,

        /// Re-extract scene directories left incomplete by an earlier run
        #[arg(long)]
        overwrite_partial: bool,
    },

    /// Add tasseled cap, spectral indices and elevation to a composite
    Features {
        /// Composite GeoTIFF (reflectance bands + cdist, doy, score)
        composite: PathBuf,

        /// Sensor name (Landsat5, Landsat7, Landsat8)
        #[arg(default_value = "Landsat8")]
        sensor: String,

        /// Elevation raster aligned to the composite grid
        #[arg(long, default_value = "data/srtm.tif")]
        srtm: PathBuf,

        /// Scale of the composite's reflectance values
        #[arg(long, value_enum, default_value_t = Scale::Scaled)]
        scale: Scale,

        /// Output directory (defaults to the current directory)
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Landsat time-series stacking and composite enrichment", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Preprocess {
            directory,
            sensor,
            aoi,
            aoi_kind,
            overwrite_partial,
        } => {
            let kind = match aoi_kind {
                AoiVariant::Buffered => AoiKind::Buffered,
                AoiVariant::Unbuffered => AoiKind::Unbuffered,
            };
            let aoi = AreaOfInterest::open(&aoi, kind)
                .with_context(|| format!("Failed to read area of interest {}", aoi.display()))?;
            let params = PreprocessParams {
                overwrite_partial,
                ..PreprocessParams::default()
            };
            let summary = Preprocessor::new(&sensor, params)?
                .run(&directory, &aoi)
                .with_context(|| format!("Preprocessing {} failed", directory.display()))?;

            info!(
                "Stacked {} bands over {} acquisition dates",
                summary.outputs.len(),
                summary.dates.len()
            );
            println!("Preprocessing complete: {}", directory.display());
        }
        Command::Features {
            composite,
            sensor,
            srtm,
            scale,
            output_dir,
        } => {
            let params = FeatureParams {
                scale: match scale {
                    Scale::Scaled => ReflectanceScale::Scaled,
                    Scale::Unit => ReflectanceScale::Unit,
                },
                ..FeatureParams::default()
            };
            let exported = FeatureEngine::new(&sensor, params)?
                .run(&composite, &srtm, &output_dir)
                .with_context(|| format!("Adding features to {} failed", composite.display()))?;

            info!("Metadata bands written to {}", exported.metadata_path.display());
            println!(
                "Feature composite complete: {} ({} bands)",
                exported.composite_path.display(),
                exported.band_count
            );
        }
    }
    Ok(())
}
