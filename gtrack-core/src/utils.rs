use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::errors::{GtrackError, Result};

///
/// Compare two sequence names using natural (alphanumeric) collation.
///
/// Runs of ASCII digits are compared by their numeric value, everything else
/// byte by byte. This keeps `chr2` ahead of `chr10`, which plain lexicographic
/// ordering gets wrong. Two runs with the same value but different zero padding
/// are ordered by run length, so the order is total and only returns
/// `Ordering::Equal` for identical strings.
///
/// # Examples
///
/// ```
/// use gtrack_core::utils::natural_cmp;
///
/// let mut names = vec!["a10", "a2", "a1"];
/// names.sort_by(|a, b| natural_cmp(a, b));
/// assert_eq!(names, vec!["a1", "a2", "a10"]);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let run_a = digit_run(a, i);
            let run_b = digit_run(b, j);
            i += run_a.len();
            j += run_b.len();

            let value_a = strip_leading_zeros(run_a);
            let value_b = strip_leading_zeros(run_b);
            let ord = value_a
                .len()
                .cmp(&value_b.len())
                .then_with(|| value_a.cmp(value_b))
                .then_with(|| run_a.len().cmp(&run_b.len()));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = a[i].cmp(&b[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

fn digit_run(bytes: &[u8], from: usize) -> &[u8] {
    let len = bytes[from..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    &bytes[from..from + len]
}

fn strip_leading_zeros(run: &[u8]) -> &[u8] {
    let zeros = run.iter().take_while(|&&b| b == b'0').count();
    &run[zeros..]
}

///
/// Get a reader for either a gzip'd or non-gzip'd file.
///
/// # Arguments
///
/// - path: path to the file to read
///
pub fn get_dynamic_reader(path: &Path) -> Result<BufReader<Box<dyn Read>>> {
    let is_gzipped = path.extension() == Some(OsStr::new("gz"));
    let file = File::open(path)?;
    let file: Box<dyn Read> = match is_gzipped {
        true => Box::new(MultiGzDecoder::new(file)),
        false => Box::new(file),
    };
    Ok(BufReader::new(file))
}

///
/// Read a chrom sizes file (`name<whitespace>length` per line).
///
/// Blank lines and lines starting with `#` are skipped. The order of the file
/// is preserved.
///
/// # Arguments
///
/// - path: path to the chrom sizes file, optionally gzipped
///
pub fn read_chrom_sizes<T: AsRef<Path>>(path: T) -> Result<Vec<(String, u32)>> {
    let reader = get_dynamic_reader(path.as_ref())?;
    let mut chrom_sizes = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let (Some(name), Some(length)) = (parts.next(), parts.next()) else {
            return Err(GtrackError::Format(format!(
                "chrom sizes line {} has fewer than two columns",
                line_number + 1
            )));
        };
        let length = length.parse::<u32>().map_err(|_| {
            GtrackError::Format(format!(
                "chrom sizes line {}: '{}' is not a valid length",
                line_number + 1,
                length
            ))
        })?;

        chrom_sizes.push((name.to_string(), length));
    }

    Ok(chrom_sizes)
}
