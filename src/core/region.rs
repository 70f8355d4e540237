use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// How the cropped region is prepared before OCR.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    None,
    GrayscaleThreshold,
}

/// Rectangular area of a frame believed to contain the overlay text.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub preprocessing: Preprocessing,
}

impl Region {
    /// Clamps the region so it lies fully inside a `frame_w` x `frame_h`
    /// frame. A region that doesn't overlap the frame at all collapses to
    /// zero size, which the recognizer treats as "no text".
    pub fn clamp_to(&self, frame_w: i32, frame_h: i32) -> Region {
        let x = self.x.clamp(0, frame_w.max(0));
        let y = self.y.clamp(0, frame_h.max(0));
        Region {
            x,
            y,
            width: self.width.max(0).min(frame_w - x),
            height: self.height.max(0).min(frame_h - y),
            preprocessing: self.preprocessing,
        }
    }
}

/// One hand-measured crop rectangle for an exact recording resolution.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RegionPreset {
    pub width: i32,
    pub height: i32,
    pub region: Region,
}

/// JSON shape of a region-table preset file.
#[derive(Serialize, Deserialize)]
struct RegionTableFile {
    presets: Vec<RegionPreset>,
    #[serde(default)]
    fallback: Option<Region>,
}

/// Maps frame resolutions to overlay crop rectangles.
///
/// Known recording setups get exact hand-measured rectangles; anything else
/// falls back to a bottom-strip heuristic so an unexpected resolution only
/// degrades OCR quality instead of failing the batch.
#[derive(Clone, Debug)]
pub struct RegionTable {
    entries: HashMap<(i32, i32), Region>,
    fallback: Option<Region>,
    heuristic_preprocessing: Preprocessing,
}

const FALLBACK_BAND_HEIGHT: i32 = 100;

impl Default for RegionTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        // Measured on the stereo rig footage (timestamp overlay bottom-left).
        entries.insert(
            (1920, 1080),
            Region {
                x: 0,
                y: 1018,
                width: 565,
                height: 100,
                preprocessing: Preprocessing::GrayscaleThreshold,
            },
        );
        entries.insert(
            (1600, 1200),
            Region {
                x: 0,
                y: 1132,
                width: 425,
                height: 111,
                preprocessing: Preprocessing::GrayscaleThreshold,
            },
        );
        Self {
            entries,
            fallback: None,
            heuristic_preprocessing: Preprocessing::GrayscaleThreshold,
        }
    }
}

impl RegionTable {
    /// Loads a preset file, replacing the built-in table. Duplicate
    /// resolutions keep the last entry.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read region table {}", path.display()))?;
        let file: RegionTableFile = serde_json::from_str(&text)
            .with_context(|| format!("invalid region table {}", path.display()))?;
        let mut entries = HashMap::new();
        for preset in file.presets {
            entries.insert((preset.width, preset.height), preset.region);
        }
        Ok(Self {
            entries,
            fallback: file.fallback,
            heuristic_preprocessing: Preprocessing::GrayscaleThreshold,
        })
    }

    /// Picks the crop region for a frame of the given dimensions.
    ///
    /// Total function: unknown resolutions get the fallback strip, clamped
    /// into the frame. Never fails.
    pub fn select(&self, width: i32, height: i32) -> Region {
        if let Some(region) = self.entries.get(&(width, height)) {
            return *region;
        }
        if let Some(fallback) = self.fallback {
            return fallback.clamp_to(width, height);
        }
        // Bottom strip spanning a quarter of the width; the overlay sits in
        // the lower-left corner on every camera we've seen.
        let band = FALLBACK_BAND_HEIGHT.min(height.max(0));
        Region {
            x: 0,
            y: (height - band).max(0),
            width: (width / 4).max(1).min(width.max(1)),
            height: band,
            preprocessing: self.heuristic_preprocessing,
        }
        .clamp_to(width, height)
    }

    /// All exact-resolution presets, sorted for stable output.
    pub fn presets(&self) -> Vec<RegionPreset> {
        let mut presets: Vec<RegionPreset> = self
            .entries
            .iter()
            .map(|(&(width, height), &region)| RegionPreset {
                width,
                height,
                region,
            })
            .collect();
        presets.sort_by_key(|p| (p.width, p.height));
        presets
    }

    pub fn fallback(&self) -> Option<Region> {
        self.fallback
    }

    /// Same table with preprocessing disabled everywhere; OCR then runs on
    /// the raw color crop.
    pub fn without_preprocessing(mut self) -> Self {
        for region in self.entries.values_mut() {
            region.preprocessing = Preprocessing::None;
        }
        if let Some(fallback) = &mut self.fallback {
            fallback.preprocessing = Preprocessing::None;
        }
        self.heuristic_preprocessing = Preprocessing::None;
        self
    }
}
