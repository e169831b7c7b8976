//! Synthetic RGB0 test pattern, used as a frame source when no raw video file is
//! available and to generate one (`rt-workload generate`).

use crate::error::AppResult;
use crate::video::{FrameGeometry, RAW_BYTES_PER_PIXEL};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Simple pseudo-random number generator (LCG) for reproducible noise.
/// Uses the same algorithm as glibc for predictable cross-platform behavior.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Fill `frame` with frame number `frame_num` of the animated test pattern.
///
/// The pattern includes:
/// - Checkerboard background with light per-frame noise
/// - Red-to-blue gradient bar on top, grey ramp at the bottom
/// - A bright hotspot orbiting the center (one turn every ~125 frames)
///
/// The output is a pure function of `(geometry, frame_num)`, so a looped source
/// replays bit-identical frames.
pub fn fill_test_pattern(frame: &mut [u8], geometry: FrameGeometry, frame_num: u64) {
    let w = geometry.width as usize;
    let h = geometry.height as usize;
    if w == 0 || h == 0 {
        return;
    }

    let checker_size = (w.min(h) / 16).max(1);
    let gradient_height = (h / 10).max(1);

    let orbit_radius = (w.min(h) / 4) as f64;
    let angle = (frame_num as f64 * 0.05) % (2.0 * std::f64::consts::PI);
    let hotspot_x = (w / 2) as f64 + orbit_radius * angle.cos();
    let hotspot_y = (h / 2) as f64 + orbit_radius * angle.sin();
    let hotspot_radius = (w.min(h) as f64 / 12.0).max(1.0);

    let frame_seed = frame_num.wrapping_mul(2654435761);

    for (idx, pixel) in frame
        .chunks_exact_mut(RAW_BYTES_PER_PIXEL)
        .take(geometry.pixels())
        .enumerate()
    {
        let x = idx % w;
        let y = idx / w;

        let noise = (prng(frame_seed ^ idx as u64) & 0x0F) as u8;
        let base: u8 = if ((x / checker_size) + (y / checker_size)) % 2 == 0 {
            64
        } else {
            80
        };
        let mut rgb = [base + noise, base + noise, base + noise];

        if y < gradient_height {
            let ramp = (x * 255 / w.max(1)) as u8;
            rgb = [255 - ramp, 0, ramp];
        } else if y >= h - gradient_height {
            let ramp = (x * 255 / w.max(1)) as u8;
            rgb = [ramp, ramp, ramp];
        }

        let dx = x as f64 - hotspot_x;
        let dy = y as f64 - hotspot_y;
        if dx * dx + dy * dy <= hotspot_radius * hotspot_radius {
            rgb = [255, 220, 40];
        }

        pixel[0] = rgb[0];
        pixel[1] = rgb[1];
        pixel[2] = rgb[2];
        pixel[3] = 0;
    }
}

/// Write `frames` frames of the test pattern as a headerless RGB0 raw video.
pub fn write_pattern_video(path: &Path, geometry: FrameGeometry, frames: u64) -> AppResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut frame = vec![0u8; geometry.raw_len()];
    for frame_num in 0..frames {
        fill_test_pattern(&mut frame, geometry, frame_num);
        writer.write_all(&frame)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_deterministic_and_animated() {
        let geometry = FrameGeometry::new(64, 48);
        let mut a = vec![0u8; geometry.raw_len()];
        let mut b = vec![0u8; geometry.raw_len()];
        let mut c = vec![0u8; geometry.raw_len()];

        fill_test_pattern(&mut a, geometry, 3);
        fill_test_pattern(&mut b, geometry, 3);
        fill_test_pattern(&mut c, geometry, 4);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn padding_byte_is_zero() {
        let geometry = FrameGeometry::new(16, 16);
        let mut frame = vec![0xAAu8; geometry.raw_len()];
        fill_test_pattern(&mut frame, geometry, 0);
        assert!(frame.chunks_exact(4).all(|px| px[3] == 0));
    }

    #[test]
    fn written_video_has_whole_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.raw");
        let geometry = FrameGeometry::new(8, 4);

        write_pattern_video(&path, geometry, 5).unwrap();

        let len = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(len, 5 * geometry.raw_len());
    }
}
