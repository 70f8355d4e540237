use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::config::{ExtractConfig, InputSource};
use crate::core::recognizer::TextRecognizer;
use crate::core::stamp::StampParser;
use crate::core::video_source::VideoSource;
use crate::core::writer::{FrameWriter, StampRecord};

/// Containers we treat as video input when scanning a folder.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// Aggregate result of one batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub videos_processed: u64,
    pub videos_failed: Vec<String>,
    pub frames_processed: u64,
    pub frames_parsed: u64,
    pub frames_saved: u64,
}

impl BatchSummary {
    fn absorb(&mut self, video: VideoSummary) {
        self.videos_processed += 1;
        self.frames_processed += video.frames_processed;
        self.frames_parsed += video.frames_parsed;
        self.frames_saved += video.frames_saved;
    }
}

#[derive(Debug, Default)]
struct VideoSummary {
    frames_processed: u64,
    frames_parsed: u64,
    frames_saved: u64,
}

/// True when frame `index` falls on the sampling grid.
fn is_sampled(index: u64, interval: u64) -> bool {
    index % interval == 0
}

/// How many of `frames` sequential frames the sampler passes through.
fn expected_samples(frames: u64, interval: u64) -> u64 {
    if interval == 0 {
        return 0;
    }
    (frames + interval - 1) / interval
}

/// Builds a timestamp record from one frame's OCR candidates.
///
/// Only the first line is a timestamp candidate; later lines (geocoordinate
/// overlay) ride along as metadata. Any parse failure degrades to the
/// sentinel record instead of an error.
pub fn correlate(frame_index: u64, candidates: &[String], parser: &StampParser) -> StampRecord {
    let mut record = StampRecord::unparsed(frame_index);
    if let Some(first) = candidates.first() {
        if let Some(utc) = parser.parse(first) {
            record.raw_text = Some(first.clone());
            record.utc = Some(utc);
        }
        record.extra_lines = candidates[1..].to_vec();
    }
    record
}

/// Collects the videos named by the input source. A folder scan filters by
/// extension and sorts for deterministic batch order.
fn collect_videos(input: &InputSource) -> Result<Vec<PathBuf>> {
    match input {
        InputSource::Video(path) => Ok(vec![path.clone()]),
        InputSource::Folder(dir) => {
            let mut videos = Vec::new();
            for entry in std::fs::read_dir(dir)
                .with_context(|| format!("cannot read video folder {}", dir.display()))?
            {
                let path = entry?.path();
                if path.is_file() && has_video_extension(&path) {
                    videos.push(path);
                }
            }
            videos.sort();
            Ok(videos)
        }
    }
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Runs the extraction pipeline over every input video.
///
/// A video that fails to open is reported and counted, and the batch moves
/// on; per-frame OCR/parse failures were already absorbed as sentinel
/// records further down.
pub fn run_batch(config: &ExtractConfig) -> Result<BatchSummary> {
    config.validate()?;
    let videos = collect_videos(&config.input)?;
    if videos.is_empty() {
        anyhow::bail!("no video files found in {}", config.input.describe());
    }
    std::fs::create_dir_all(&config.output_folder)
        .with_context(|| format!("cannot create {}", config.output_folder.display()))?;

    // Stop after the current frame on ctrl-c.
    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        s.store(true, Ordering::SeqCst);
    })
    .context("error registering ctrl-c handler")?;

    let mut summary = BatchSummary::default();

    if config.jobs > 1 {
        // Videos are independent; one recognizer and one writer per worker,
        // no shared mutable state. Progress bars stay off in this mode.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs)
            .build()
            .context("cannot build worker pool")?;
        let results: Vec<(PathBuf, Result<VideoSummary>)> = pool.install(|| {
            videos
                .par_iter()
                .map(|path| (path.clone(), process_video(config, path, &stop, false)))
                .collect()
        });
        for (path, result) in results {
            match result {
                Ok(video) => summary.absorb(video),
                Err(e) => {
                    warn!("skipping {}: {:#}", path.display(), e);
                    summary.videos_failed.push(path.display().to_string());
                }
            }
        }
    } else {
        for path in &videos {
            if stop.load(Ordering::SeqCst) {
                info!("interrupted, stopping batch");
                break;
            }
            match process_video(config, path, &stop, true) {
                Ok(video) => summary.absorb(video),
                Err(e) => {
                    warn!("skipping {}: {:#}", path.display(), e);
                    summary.videos_failed.push(path.display().to_string());
                }
            }
        }
    }

    Ok(summary)
}

/// Processes one video sequentially; frame ordering correctness depends on
/// monotonic decode order, so there is no intra-video parallelism.
fn process_video(
    config: &ExtractConfig,
    path: &Path,
    stop: &AtomicBool,
    progress: bool,
) -> Result<VideoSummary> {
    let mut source = VideoSource::open(path)?;
    info!(
        "processing {}: {}x{}, {} fps",
        path.display(),
        source.width(),
        source.height(),
        source.fps()
    );
    if let Some(total) = source.frame_count() {
        info!(
            "~{} frames, sampling every {} -> ~{} to OCR",
            total,
            config.frame_interval,
            expected_samples(total, config.frame_interval)
        );
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let out_dir = config.output_folder.join(stem);
    let mut writer = FrameWriter::new(&out_dir, config.retention, config.filenames)?;
    let mut recognizer = TextRecognizer::new(
        &config.whitelist,
        config.psm,
        config.threshold,
        config.threshold_max,
    )?;
    let parser = StampParser::new(&config.layouts, config.utc_offset_secs)?;

    let bar = if progress {
        let bar = match source.frame_count() {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(path.display().to_string());
        Some(bar)
    } else {
        None
    };

    let mut video = VideoSummary::default();
    while let Some(frame) = source.next_frame()? {
        if let Some(bar) = &bar {
            bar.inc(1);
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if !is_sampled(frame.index, config.frame_interval) {
            continue;
        }

        let region = config.region_table.select(frame.width, frame.height);
        let candidates = recognizer.recognize(&frame, &region)?;
        let record = correlate(frame.index, &candidates, &parser);

        video.frames_processed += 1;
        if record.parse_succeeded() {
            video.frames_parsed += 1;
        }
        writer.record(&frame, &record)?;
    }
    video.frames_saved = writer.saved_frames();

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    info!(
        "{}: {} frames sampled, {} parsed, {} saved",
        path.display(),
        video.frames_processed,
        video.frames_parsed,
        video.frames_saved
    );
    Ok(video)
}
