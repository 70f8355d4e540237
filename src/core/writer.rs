use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use log::warn;
use opencv::{core, imgcodecs, prelude::*};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::stamp::{self, SENTINEL};
use crate::core::video_source::Frame;

/// Which sampled frames get their image persisted.
#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum RetentionPolicy {
    /// Save every sampled frame, parsed or not.
    All,
    /// Save only frames whose timestamp parsed.
    OnSuccess,
}

/// How persisted frame files are named.
#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum FilenamePolicy {
    /// `frame_0000.png`, `frame_0001.png`, ...
    Sequence,
    /// The recognized text with path-illegal characters substituted.
    FromTimestamp,
}

/// Outcome of one sampled frame: what was read and what it normalized to.
///
/// `raw_text` is `None` whenever parsing failed, in which case both logs get
/// the `N/A` sentinel. Records are append-only; one per frame, in frame
/// order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StampRecord {
    pub frame_index: u64,
    pub raw_text: Option<String>,
    pub utc: Option<DateTime<Utc>>,
    /// Trailing overlay lines (usually the geocoordinate), kept as metadata.
    pub extra_lines: Vec<String>,
}

impl StampRecord {
    pub fn unparsed(frame_index: u64) -> Self {
        Self {
            frame_index,
            raw_text: None,
            utc: None,
            extra_lines: Vec::new(),
        }
    }

    pub fn parse_succeeded(&self) -> bool {
        self.utc.is_some()
    }
}

/// Persists frames and timestamp logs for one video.
///
/// Layout under the per-video output folder:
///   frames/               saved frame images
///   timestamps/timestamps.txt   raw overlay text, one line per frame
///   timestamps/UTC.txt          normalized times, one line per frame
///   timestamps/extra.txt        geocoordinate lines, tab-prefixed by index
pub struct FrameWriter {
    frames_dir: PathBuf,
    raw_log: File,
    utc_log: File,
    extra_log: File,
    retention: RetentionPolicy,
    filenames: FilenamePolicy,
    saved: u64,
}

impl FrameWriter {
    pub fn new(
        video_output_dir: &Path,
        retention: RetentionPolicy,
        filenames: FilenamePolicy,
    ) -> Result<Self> {
        let frames_dir = video_output_dir.join("frames");
        let stamps_dir = video_output_dir.join("timestamps");
        fs::create_dir_all(&frames_dir)
            .with_context(|| format!("cannot create {}", frames_dir.display()))?;
        fs::create_dir_all(&stamps_dir)
            .with_context(|| format!("cannot create {}", stamps_dir.display()))?;

        let open_append = |name: &str| -> Result<File> {
            let path = stamps_dir.join(name);
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("cannot open {}", path.display()))
        };

        Ok(Self {
            frames_dir,
            raw_log: open_append("timestamps.txt")?,
            utc_log: open_append("UTC.txt")?,
            extra_log: open_append("extra.txt")?,
            retention,
            filenames,
            saved: 0,
        })
    }

    /// Appends exactly one line to each log and persists the frame image
    /// according to policy. Log line number stays in lockstep with frame
    /// ordinal even on parse failure.
    pub fn record(&mut self, frame: &Frame, record: &StampRecord) -> Result<()> {
        let raw_line = record.raw_text.as_deref().unwrap_or(SENTINEL);
        writeln!(self.raw_log, "{}", raw_line)?;

        let utc_line = match &record.utc {
            Some(utc) => stamp::format_utc(utc),
            None => SENTINEL.to_string(),
        };
        writeln!(self.utc_log, "{}", utc_line)?;

        for line in &record.extra_lines {
            writeln!(self.extra_log, "{}\t{}", record.frame_index, line)?;
        }

        // Flush per record so an interrupted run leaves matching prefixes.
        self.raw_log.flush()?;
        self.utc_log.flush()?;
        self.extra_log.flush()?;

        if self.retention == RetentionPolicy::All || record.parse_succeeded() {
            self.save_frame(frame, record)?;
        }
        Ok(())
    }

    fn save_frame(&mut self, frame: &Frame, record: &StampRecord) -> Result<()> {
        let name = match (&self.filenames, &record.raw_text) {
            (FilenamePolicy::FromTimestamp, Some(raw)) => {
                format!("{}.png", sanitize_filename(raw))
            }
            // No readable text to name by; fall back to the sequence name.
            _ => format!("frame_{:04}.png", self.saved),
        };
        let path = self.frames_dir.join(name);
        let ok = imgcodecs::imwrite(
            &path.to_string_lossy(),
            &frame.mat,
            &core::Vector::new(),
        )?;
        if !ok {
            warn!("failed to write frame image {}", path.display());
        } else {
            self.saved += 1;
        }
        Ok(())
    }

    /// Number of frame images written so far.
    pub fn saved_frames(&self) -> u64 {
        self.saved
    }
}

/// Replaces characters that are illegal or hazardous in filenames. `/` and
/// `:` are what the overlays actually contain; backslash is covered for the
/// same reason on Windows shares.
pub fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | ':' | '\\' => '-',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stamp::StampParser;
    use std::fs;
    use std::path::PathBuf;

    fn test_frame(index: u64) -> Frame {
        let mat = Mat::zeros(24, 32, core::CV_8UC3).unwrap().to_mat().unwrap();
        Frame {
            index,
            presentation_time: std::time::Duration::from_millis(index * 40),
            width: 32,
            height: 24,
            mat,
        }
    }

    fn record_for(parser: &StampParser, index: u64, raw: &str) -> StampRecord {
        let mut record = StampRecord::unparsed(index);
        if let Some(utc) = parser.parse(raw) {
            record.raw_text = Some(raw.to_string());
            record.utc = Some(utc);
        }
        record
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framestamp-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(
            sanitize_filename("10/26/2024 16:18:42.482"),
            "10-26-2024 16-18-42.482"
        );
        let name = sanitize_filename("../10:26\\evil");
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
        assert!(!name.contains('\\'));
    }

    #[test]
    fn three_frame_scenario_keeps_logs_in_lockstep() {
        let dir = temp_dir("scenario");
        let parser = StampParser::new(&[], 0).unwrap();
        let mut writer =
            FrameWriter::new(&dir, RetentionPolicy::OnSuccess, FilenamePolicy::FromTimestamp)
                .unwrap();

        for (i, raw) in ["15.10.1993", "qqq", "16.10.1993"].iter().enumerate() {
            let record = record_for(&parser, i as u64, raw);
            writer.record(&test_frame(i as u64), &record).unwrap();
        }

        let raw = read_lines(&dir.join("timestamps").join("timestamps.txt"));
        assert_eq!(raw, vec!["15.10.1993", "N/A", "16.10.1993"]);

        let utc = read_lines(&dir.join("timestamps").join("UTC.txt"));
        assert_eq!(
            utc,
            vec![
                "1993-10-15T00:00:00.000Z",
                "N/A",
                "1993-10-16T00:00:00.000Z"
            ]
        );

        // OnSuccess: only the two parsed frames leave artifacts.
        assert_eq!(writer.saved_frames(), 2);
        let images: Vec<_> = fs::read_dir(dir.join("frames")).unwrap().collect();
        assert_eq!(images.len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn retain_all_saves_unparsed_frames_with_sequence_names() {
        let dir = temp_dir("retain-all");
        let parser = StampParser::new(&[], 0).unwrap();
        let mut writer =
            FrameWriter::new(&dir, RetentionPolicy::All, FilenamePolicy::FromTimestamp).unwrap();

        writer
            .record(&test_frame(0), &record_for(&parser, 0, "garbage"))
            .unwrap();
        writer
            .record(&test_frame(1), &record_for(&parser, 1, "15.10.1993"))
            .unwrap();

        assert_eq!(writer.saved_frames(), 2);
        assert!(dir.join("frames").join("frame_0000.png").exists());
        assert!(dir.join("frames").join("15.10.1993.png").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn timestamp_named_artifact_has_no_illegal_characters() {
        let dir = temp_dir("names");
        let parser = StampParser::new(&[], 0).unwrap();
        let mut writer =
            FrameWriter::new(&dir, RetentionPolicy::OnSuccess, FilenamePolicy::FromTimestamp)
                .unwrap();

        let record = record_for(&parser, 0, "10/26/2024 16:18:42.482");
        assert!(record.parse_succeeded());
        writer.record(&test_frame(0), &record).unwrap();

        assert!(dir
            .join("frames")
            .join("10-26-2024 16-18-42.482.png")
            .exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn extra_lines_are_kept_as_indexed_metadata() {
        let dir = temp_dir("extra");
        let mut writer =
            FrameWriter::new(&dir, RetentionPolicy::OnSuccess, FilenamePolicy::Sequence).unwrap();

        let mut record = StampRecord::unparsed(7);
        record.extra_lines = vec!["N 47.6062 W 122.3321".to_string()];
        writer.record(&test_frame(7), &record).unwrap();

        let extra = read_lines(&dir.join("timestamps").join("extra.txt"));
        assert_eq!(extra, vec!["7\tN 47.6062 W 122.3321"]);

        let _ = fs::remove_dir_all(&dir);
    }
}
