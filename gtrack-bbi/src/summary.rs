//! Aggregate statistics over base-weighted values.
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use gtrack_core::{GtrackError, Result};

/// A run of bases `[start, end)` (0-based) sharing one value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueSegment {
    pub start: u32,
    pub end: u32,
    pub value: f64,
}

impl ValueSegment {
    /// The part of the segment inside `[start, end)`, if any.
    pub fn clip(&self, start: u32, end: u32) -> Option<ValueSegment> {
        let start = self.start.max(start);
        let end = self.end.min(end);
        (start < end).then_some(ValueSegment {
            start,
            end,
            value: self.value,
        })
    }

    pub fn bases(&self) -> u64 {
        (self.end - self.start) as u64
    }
}

///
/// Covered bases, min, max, sum and sum of squares of the values over a range.
///
/// Every covered base counts once, so a record spanning 10 bases with value 2
/// adds 10 to the coverage, 20 to the sum and 40 to the sum of squares.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    covered_bases: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_squares: f64,
}

impl Default for Summary {
    fn default() -> Self {
        Summary {
            covered_bases: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_squares: 0.0,
        }
    }
}

impl Summary {
    pub(crate) fn from_parts(
        covered_bases: u64,
        min: f64,
        max: f64,
        sum: f64,
        sum_squares: f64,
    ) -> Self {
        if covered_bases == 0 {
            return Summary::default();
        }
        Summary {
            covered_bases,
            min,
            max,
            sum,
            sum_squares,
        }
    }

    /// Account for `bases` consecutive bases all holding `value`.
    pub fn add_run(&mut self, value: f64, bases: u64) {
        if bases == 0 {
            return;
        }
        self.covered_bases += bases;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value * bases as f64;
        self.sum_squares += value * value * bases as f64;
    }

    pub fn merge(&mut self, other: &Summary) {
        if other.is_empty() {
            return;
        }
        self.covered_bases += other.covered_bases;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.sum_squares += other.sum_squares;
    }

    pub fn is_empty(&self) -> bool {
        self.covered_bases == 0
    }

    pub fn covered_bases(&self) -> u64 {
        self.covered_bases
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_squares(&self) -> f64 {
        self.sum_squares
    }

    /// Base-weighted mean, `None` when nothing is covered.
    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.sum / self.covered_bases as f64)
    }

    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    pub(crate) fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        let (min, max) = if self.is_empty() {
            (0.0, 0.0)
        } else {
            (self.min, self.max)
        };
        out.write_u64::<LittleEndian>(self.covered_bases)?;
        out.write_f64::<LittleEndian>(min)?;
        out.write_f64::<LittleEndian>(max)?;
        out.write_f64::<LittleEndian>(self.sum)?;
        out.write_f64::<LittleEndian>(self.sum_squares)?;
        Ok(())
    }

    pub(crate) fn read<R: Read>(input: &mut R) -> Result<Self> {
        let mut read = || -> std::io::Result<Summary> {
            let covered_bases = input.read_u64::<LittleEndian>()?;
            let min = input.read_f64::<LittleEndian>()?;
            let max = input.read_f64::<LittleEndian>()?;
            let sum = input.read_f64::<LittleEndian>()?;
            let sum_squares = input.read_f64::<LittleEndian>()?;
            Ok(Summary::from_parts(covered_bases, min, max, sum, sum_squares))
        };
        read().map_err(|e| GtrackError::from_read(e, "total summary"))
    }
}

///
/// Running count/mean/M2 for a numerically stable variance.
///
/// Runs of equal values are folded in with a weighted Welford update. Two
/// partial results (for example one per zoom bin) are combined with Chan's
/// pairwise formula, so the variance never comes from subtracting two large
/// sums of squares over the whole range.
///
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    count: f64,
    mean: f64,
    m2: f64,
}

impl Moments {
    pub fn add_run(&mut self, value: f64, bases: u64) {
        if bases == 0 {
            return;
        }
        let weight = bases as f64;
        let count = self.count + weight;
        let delta = value - self.mean;
        self.mean += delta * weight / count;
        self.m2 += delta * (value - self.mean) * weight;
        self.count = count;
    }

    ///
    /// Moments of a single pre-aggregated bin.
    ///
    /// A bin only carries sums, so M2 is `sum_squares - sum * mean`; rounding in
    /// the stored sums can push that slightly below zero, hence the clamp.
    pub fn from_summary(summary: &Summary) -> Self {
        if summary.is_empty() {
            return Moments::default();
        }
        let count = summary.covered_bases() as f64;
        let mean = summary.sum() / count;
        let m2 = (summary.sum_squares() - summary.sum() * mean).max(0.0);
        Moments { count, mean, m2 }
    }

    pub fn merge(&mut self, other: &Moments) {
        if other.count == 0.0 {
            return;
        }
        if self.count == 0.0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count / count;
        self.m2 += other.m2 + delta * delta * self.count * other.count / count;
        self.count = count;
    }

    /// Population standard deviation over the covered bases.
    pub fn stddev(&self) -> Option<f64> {
        (self.count > 0.0).then(|| (self.m2 / self.count).max(0.0).sqrt())
    }
}
