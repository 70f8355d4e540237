use anyhow::{anyhow, Result};
use log::{debug, warn};
use opencv::{prelude::*, videoio};
use std::path::Path;
use std::time::Duration;

/// One decoded frame, tagged with its position in the stream.
///
/// `mat` holds the raw BGR pixels as decoded by OpenCV. Frames are handed
/// read-only to the region selector / recognizer and dropped once the writer
/// is done with them.
pub struct Frame {
    pub index: u64,
    pub presentation_time: Duration,
    pub width: i32,
    pub height: i32,
    pub mat: Mat,
}

/// Wraps an OpenCV `VideoCapture` and yields frames in presentation order.
///
/// Not restartable: reopening the file is the only way to rewind. The
/// underlying decoder is released when the source is dropped.
pub struct VideoSource {
    capture: videoio::VideoCapture,
    path: String,
    fps: f64,
    frame_count: i64,
    width: i32,
    height: i32,
    next_index: u64,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy().into_owned();

        // CAP_ANY lets OpenCV pick the best backend per platform
        // (AVFoundation / Media Foundation / V4L2+GStreamer).
        let capture = videoio::VideoCapture::from_file(&path_str, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("cannot open video file: {}", path_str));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        // Container metadata; may be 0 or wrong for some files. Callers only
        // use these for progress estimates.
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        debug!(
            "opened {}: {}x{}, {:.2} fps, ~{} frames",
            path_str, width, height, fps, frame_count
        );

        Ok(Self {
            capture,
            path: path_str,
            fps,
            frame_count,
            width,
            height,
            next_index: 0,
        })
    }

    /// Rounded frames-per-second as reported by the container.
    pub fn fps(&self) -> u32 {
        self.fps.round().max(0.0) as u32
    }

    /// Best-effort total frame count; `None` when the container doesn't say.
    pub fn frame_count(&self) -> Option<u64> {
        if self.frame_count > 0 {
            Some(self.frame_count as u64)
        } else {
            None
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Reads the next frame, or `None` at end of stream.
    ///
    /// A decode error mid-stream is treated as end of stream (truncated
    /// containers are common in this footage), not propagated.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        let got = match self.capture.read(&mut mat) {
            Ok(got) => got,
            Err(e) => {
                warn!("decode error in {} at frame {}: {}", self.path, self.next_index, e);
                return Ok(None);
            }
        };
        if !got || mat.empty() {
            return Ok(None);
        }

        let pos_ms = self.capture.get(videoio::CAP_PROP_POS_MSEC)?.max(0.0);
        let frame = Frame {
            index: self.next_index,
            presentation_time: Duration::from_millis(pos_ms as u64),
            width: mat.cols(),
            height: mat.rows(),
            mat,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}
