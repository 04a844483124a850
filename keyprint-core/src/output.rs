//! CSV fingerprint output and grayscale debug images

use crate::{DebugImageFormat, FrameFingerprint, GrayscaleBuffer, Result};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Significant digits of every number written to the CSV
const CSV_PRECISION: i32 = 6;

/// Formats one CSV row: `timestamp,value_0,...,value_n` without the newline.
///
/// Timestamps are recorded at single precision and every field uses
/// [`format_general`].
pub fn format_csv_row(fingerprint: &FrameFingerprint) -> String {
    let mut row = format_general(fingerprint.timestamp as f32);
    for &value in &fingerprint.values {
        row.push(',');
        row.push_str(&format_general(value));
    }
    row
}

/// Formats `value` the way C's `%g` does: six significant digits, trailing
/// zeros dropped, and exponent notation below `1e-4` or from `1e6` up.
pub fn format_general(value: f32) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Rounding to the precision first decides the exponent, as in C
    let scientific = format!("{:.*e}", (CSV_PRECISION - 1) as usize, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific.clone();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific.clone();
    };

    if exponent < -4 || exponent >= CSV_PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (CSV_PRECISION - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Writes one row per fingerprint, in the order given, with no header
pub fn write_csv<W: Write>(mut writer: W, fingerprints: &[FrameFingerprint]) -> Result<()> {
    for fingerprint in fingerprints {
        writeln!(writer, "{}", format_csv_row(fingerprint))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the fingerprints to `path`, replacing any existing file.
///
/// Rows go to a temporary file next to `path` that is renamed into place
/// once complete, so a failed write never leaves a partial CSV behind.
pub fn write_csv_file(path: &Path, fingerprints: &[FrameFingerprint]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staging = NamedTempFile::new_in(dir)?;
    write_csv(BufWriter::new(staging.as_file_mut()), fingerprints)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| e.error)?;

    tracing::info!(path = %path.display(), rows = fingerprints.len(), "Wrote frame analysis");
    Ok(())
}

/// Removes the output of a previous run, if any
pub fn remove_stale_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed previous frame analysis");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Writes `buffer` as a binary PGM (P5) image, dropping row padding
pub fn write_pgm<W: Write>(mut writer: W, buffer: &GrayscaleBuffer) -> Result<()> {
    write!(writer, "P5\n{} {}\n255\n", buffer.width(), buffer.height())?;
    for y in 0..buffer.height() {
        writer.write_all(buffer.row(y))?;
    }
    writer.flush()?;
    Ok(())
}

/// Saves one analyzed frame into `dir` as `frame-{frame_number}.{ext}`
pub fn save_debug_image(
    dir: &Path,
    frame_number: u64,
    buffer: &GrayscaleBuffer,
    format: DebugImageFormat,
) -> Result<PathBuf> {
    let path = dir.join(format!("frame-{}.{}", frame_number, format.extension()));

    match format {
        DebugImageFormat::Pgm => {
            let file = File::create(&path)?;
            write_pgm(BufWriter::new(file), buffer)?;
        }
        DebugImageFormat::Png => {
            buffer
                .to_image()?
                .save_with_format(&path, image::ImageFormat::Png)?;
        }
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_row_layout() {
        let fingerprint = FrameFingerprint::new(3, 1.5, vec![0.0, 25.0, 127.5]);
        assert_eq!(format_csv_row(&fingerprint), "1.5,0,25,127.5");
    }

    #[test]
    fn test_csv_timestamp_six_significant_digits() {
        let fingerprint = FrameFingerprint::new(1, 3003.0 / 90000.0, vec![127.5; 9]);
        let row = format_csv_row(&fingerprint);
        assert!(row.starts_with("0.0333667,127.5,"));
        assert_eq!(row.split(',').count(), 10);
    }

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(0.0), "0");
        assert_eq!(format_general(255.0), "255");
        assert_eq!(format_general(0.08), "0.08");
        assert_eq!(format_general(100000.0), "100000");
        assert_eq!(format_general(1234567.0), "1.23457e+06");
        assert_eq!(format_general(3600.1), "3600.1");
        assert_eq!(format_general(1001.0 / 30.0), "33.3667");
        assert_eq!(format_general(0.0001), "0.0001");
        assert_eq!(format_general(0.00001), "1e-05");
        assert_eq!(format_general(-2.5), "-2.5");
    }

    #[test]
    fn test_write_csv_rows_in_given_order() {
        let rows = vec![
            FrameFingerprint::new(0, 0.0, vec![0.0; 9]),
            FrameFingerprint::new(1, 2.0, vec![255.0; 9]),
        ];

        let mut out = Vec::new();
        write_csv(&mut out, &rows).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "0,0,0,0,0,0,0,0,0,0\n2,255,255,255,255,255,255,255,255,255\n"
        );
    }

    #[test]
    fn test_write_csv_file_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.csv");
        fs::write(&path, "stale contents that are longer than the new file\n").unwrap();

        write_csv_file(&path, &[FrameFingerprint::new(0, 0.0, vec![1.0])]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0,1\n");
    }

    #[test]
    fn test_failed_csv_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way makes the final rename fail
        let path = dir.path().join("analysis.csv");
        fs::create_dir(&path).unwrap();

        let rows = vec![FrameFingerprint::new(0, 0.0, vec![1.0; 9]); 100];
        assert!(write_csv_file(&path, &rows).is_err());

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(path.is_dir());
    }

    #[test]
    fn test_remove_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.csv");

        // Missing file is not an error
        remove_stale_output(&path).unwrap();

        fs::write(&path, "old").unwrap();
        remove_stale_output(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_pgm_strips_padding() {
        let buffer = GrayscaleBuffer::new(2, 2, 3, vec![1, 2, 0, 3, 4, 0]).unwrap();

        let mut out = Vec::new();
        write_pgm(&mut out, &buffer).unwrap();

        let mut expected = b"P5\n2 2\n255\n".to_vec();
        expected.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_save_debug_image_names() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = GrayscaleBuffer::from_pixels(3, 3, vec![9; 9]).unwrap();

        let pgm = save_debug_image(dir.path(), 12, &buffer, DebugImageFormat::Pgm).unwrap();
        assert_eq!(pgm.file_name().unwrap(), "frame-12.pgm");
        assert_eq!(fs::read(&pgm).unwrap().len(), "P5\n3 3\n255\n".len() + 9);

        let png = save_debug_image(dir.path(), 12, &buffer, DebugImageFormat::Png).unwrap();
        assert_eq!(png.file_name().unwrap(), "frame-12.png");
        assert!(png.exists());
    }
}
