mod core;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

use crate::core::config::{ExtractConfig, InputSource};
use crate::core::driver;
use crate::core::recognizer;
use crate::core::region::RegionTable;
use crate::core::video_source::VideoSource;
use crate::core::writer::{FilenamePolicy, RetentionPolicy};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract overlay timestamps and frames from video
    Extract {
        /// Single video file to process
        #[arg(long, conflicts_with = "video_folder")]
        video: Option<PathBuf>,
        /// Folder of videos to process (.mp4/.avi/.mov)
        #[arg(long)]
        video_folder: Option<PathBuf>,
        #[arg(long)]
        output_folder: PathBuf,
        /// Process every Nth decoded frame
        #[arg(long, default_value_t = 5)]
        frame_interval: u64,
        /// JSON preset file overriding the built-in region table
        #[arg(long)]
        region_table: Option<PathBuf>,
        /// Skip the grayscale+threshold preprocessing on every region
        #[arg(long, default_value_t = false)]
        no_preprocess: bool,
        /// Characters tesseract is allowed to recognize
        #[arg(long, default_value = recognizer::DEFAULT_WHITELIST)]
        whitelist: String,
        /// Tesseract page segmentation mode (6 = uniform block, 7 = single line)
        #[arg(long, default_value_t = recognizer::DEFAULT_PSM)]
        psm: u32,
        /// Overlay wall-clock offset, seconds east of UTC
        #[arg(long, default_value_t = 0)]
        utc_offset: i32,
        /// Timestamp layout (chrono format string); repeat for several, tried in order
        #[arg(long = "layout")]
        layouts: Vec<String>,
        #[arg(long, value_enum, default_value_t = RetentionPolicy::OnSuccess)]
        retention: RetentionPolicy,
        #[arg(long, value_enum, default_value_t = FilenamePolicy::FromTimestamp)]
        names: FilenamePolicy,
        /// Videos processed in parallel (0 = one per CPU)
        #[arg(long, default_value_t = 1)]
        jobs: usize,
        /// Print the run summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print a video's metadata and the region the table would select
    Probe {
        video: PathBuf,
        #[arg(long)]
        region_table: Option<PathBuf>,
    },
    /// Print the effective region table
    Regions {
        #[arg(long)]
        region_table: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            video,
            video_folder,
            output_folder,
            frame_interval,
            region_table,
            no_preprocess,
            whitelist,
            psm,
            utc_offset,
            layouts,
            retention,
            names,
            jobs,
            json,
        } => {
            let input = match (video, video_folder) {
                (Some(path), None) => InputSource::Video(path),
                (None, Some(dir)) => InputSource::Folder(dir),
                _ => anyhow::bail!("exactly one of --video or --video-folder is required"),
            };
            let mut table = load_region_table(region_table.as_deref())?;
            if no_preprocess {
                table = table.without_preprocessing();
            }
            let config = ExtractConfig {
                input,
                output_folder,
                frame_interval,
                region_table: table,
                whitelist,
                psm,
                utc_offset_secs: utc_offset,
                layouts,
                retention,
                filenames: names,
                jobs: if jobs == 0 { num_cpus::get() } else { jobs },
                ..Default::default()
            };

            let summary = driver::run_batch(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "videos: {} ok, {} failed | frames: {} sampled, {} parsed, {} saved",
                    summary.videos_processed,
                    summary.videos_failed.len(),
                    summary.frames_processed,
                    summary.frames_parsed,
                    summary.frames_saved
                );
                for path in &summary.videos_failed {
                    println!("  failed to open: {}", path);
                }
            }
        }
        Commands::Probe {
            video,
            region_table,
        } => {
            let table = load_region_table(region_table.as_deref())?;
            let source = VideoSource::open(&video)?;
            let region = table.select(source.width(), source.height());
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "path": video.display().to_string(),
                    "width": source.width(),
                    "height": source.height(),
                    "fps": source.fps(),
                    "frame_count": source.frame_count(),
                    "region": region,
                }))?
            );
        }
        Commands::Regions { region_table } => {
            let table = load_region_table(region_table.as_deref())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "presets": table.presets(),
                    "fallback": table.fallback(),
                }))?
            );
        }
    }

    Ok(())
}

fn load_region_table(path: Option<&std::path::Path>) -> Result<RegionTable> {
    match path {
        Some(path) => RegionTable::from_file(path),
        None => Ok(RegionTable::default()),
    }
}
