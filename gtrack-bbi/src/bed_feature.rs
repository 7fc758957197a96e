//! Optional BED columns carried by feature tracks.
use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use gtrack_core::models::Strand;
use gtrack_core::{GtrackError, Result};

///
/// The optional columns of a BED record (name, score, thick range, color and
/// exon blocks). The strand lives on the interval that carries the feature.
///
/// Absent fields stay absent: the accessors fail with
/// [`GtrackError::MissingField`] instead of inventing a default, so callers
/// check `has_*` first or handle the error.
///
/// # Examples
///
/// ```
/// use gtrack_bbi::BedFeature;
///
/// let feature = BedFeature::new().with_name("BRCA1").with_score(960);
/// assert!(feature.has_name());
/// assert_eq!(feature.name().unwrap(), "BRCA1");
/// assert!(!feature.has_thick());
/// assert!(feature.thick().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BedFeature {
    name: Option<String>,
    score: Option<u16>,
    /// `(thick_start, thick_end)`, 0-based half-open like the BED columns
    thick: Option<(u32, u32)>,
    item_rgb: Option<(u8, u8, u8)>,
    /// `(offset from feature start, size)` per block
    blocks: Option<Vec<(u32, u32)>>,
}

impl BedFeature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_score(mut self, score: u16) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_thick(mut self, thick_start: u32, thick_end: u32) -> Self {
        self.thick = Some((thick_start, thick_end));
        self
    }

    pub fn with_item_rgb(mut self, r: u8, g: u8, b: u8) -> Self {
        self.item_rgb = Some((r, g, b));
        self
    }

    pub fn with_blocks(mut self, blocks: Vec<(u32, u32)>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    pub fn has_score(&self) -> bool {
        self.score.is_some()
    }

    pub fn has_thick(&self) -> bool {
        self.thick.is_some()
    }

    pub fn has_item_rgb(&self) -> bool {
        self.item_rgb.is_some()
    }

    pub fn has_blocks(&self) -> bool {
        self.blocks.is_some()
    }

    pub fn name(&self) -> Result<&str> {
        self.name.as_deref().ok_or(GtrackError::MissingField("name"))
    }

    pub fn score(&self) -> Result<u16> {
        self.score.ok_or(GtrackError::MissingField("score"))
    }

    pub fn thick(&self) -> Result<(u32, u32)> {
        self.thick.ok_or(GtrackError::MissingField("thick"))
    }

    pub fn item_rgb(&self) -> Result<(u8, u8, u8)> {
        self.item_rgb.ok_or(GtrackError::MissingField("item_rgb"))
    }

    pub fn blocks(&self) -> Result<&[(u32, u32)]> {
        self.blocks
            .as_deref()
            .ok_or(GtrackError::MissingField("blocks"))
    }

    ///
    /// Check that the feature can be written as BED columns and read back
    /// unchanged. A name may not be empty, `.` (the absent marker) or contain
    /// tabs, line breaks or NUL bytes.
    ///
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.is_empty() || name == "." || name.contains(['\t', '\n', '\r', '\0']) {
                return Err(GtrackError::Precondition(format!(
                    "feature name {name:?} cannot be stored in a BED column"
                )));
            }
        }
        Ok(())
    }

    ///
    /// Number of BED columns after `chrom, start, end` needed to store this
    /// feature with `strand`.
    ///
    pub fn column_count(&self, strand: Strand) -> u16 {
        if self.blocks.is_some() {
            9
        } else if self.item_rgb.is_some() {
            6
        } else if self.thick.is_some() {
            5
        } else if strand != Strand::Both {
            3
        } else if self.score.is_some() {
            2
        } else if self.name.is_some() {
            1
        } else {
            0
        }
    }

    ///
    /// Encode the optional columns as the tab-separated "rest" of a BED line.
    ///
    /// Columns are written up to the last one present; absent columns before
    /// it are written as `.`.
    pub fn encode(&self, strand: Strand) -> String {
        let columns = self.column_count(strand);
        let mut rest = String::new();
        let mut push = |value: &str| {
            if !rest.is_empty() {
                rest.push('\t');
            }
            rest.push_str(value);
        };

        if columns >= 1 {
            push(self.name.as_deref().unwrap_or("."));
        }
        if columns >= 2 {
            push(&self.score.map_or(".".to_string(), |s| s.to_string()));
        }
        if columns >= 3 {
            push(&strand.to_string());
        }
        if columns >= 5 {
            match self.thick {
                Some((start, end)) => {
                    push(&start.to_string());
                    push(&end.to_string());
                }
                None => {
                    push(".");
                    push(".");
                }
            }
        }
        if columns >= 6 {
            push(
                &self
                    .item_rgb
                    .map_or(".".to_string(), |(r, g, b)| format!("{r},{g},{b}")),
            );
        }
        if columns >= 9 {
            let blocks = self.blocks.as_deref().unwrap_or(&[]);
            push(&blocks.len().to_string());
            let mut sizes = String::new();
            let mut starts = String::new();
            for (start, size) in blocks {
                let _ = write!(sizes, "{size},");
                let _ = write!(starts, "{start},");
            }
            push(&sizes);
            push(&starts);
        }
        rest
    }

    ///
    /// Parse the "rest" of a BED line back into a feature and its strand.
    ///
    pub fn decode(rest: &str) -> Result<(BedFeature, Strand)> {
        let mut feature = BedFeature::new();
        let mut strand = Strand::Both;
        if rest.is_empty() {
            return Ok((feature, strand));
        }

        let columns: Vec<&str> = rest.split('\t').collect();
        let column = |i: usize| columns.get(i).copied().filter(|c| *c != ".");

        feature.name = column(0).map(str::to_string);
        feature.score = column(1).map(|s| parse_number(s, "score")).transpose()?;
        if let Some(s) = columns.get(2) {
            strand = s.parse::<Strand>().map_err(|_| {
                GtrackError::Format(format!("invalid strand column '{s}'"))
            })?;
        }
        if let (Some(start), Some(end)) = (column(3), column(4)) {
            feature.thick = Some((
                parse_number(start, "thick start")?,
                parse_number(end, "thick end")?,
            ));
        }
        if let Some(rgb) = column(5) {
            feature.item_rgb = Some(parse_rgb(rgb)?);
        }
        if let Some(count) = column(6) {
            let count: usize = parse_number(count, "block count")?;
            let sizes = parse_list(columns.get(7).copied().unwrap_or(""), "block sizes")?;
            let starts = parse_list(columns.get(8).copied().unwrap_or(""), "block starts")?;
            if sizes.len() != count || starts.len() != count {
                return Err(GtrackError::Format(format!(
                    "block count {count} does not match {} sizes and {} starts",
                    sizes.len(),
                    starts.len()
                )));
            }
            feature.blocks = Some(starts.into_iter().zip(sizes).collect());
        }

        Ok((feature, strand))
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, field: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| GtrackError::Format(format!("invalid {field} '{value}'")))
}

fn parse_list(value: &str, field: &str) -> Result<Vec<u32>> {
    value
        .split(',')
        .filter(|v| !v.is_empty())
        .map(|v| parse_number(v, field))
        .collect()
}

fn parse_rgb(value: &str) -> Result<(u8, u8, u8)> {
    let parts: Vec<&str> = value.split(',').collect();
    match parts.as_slice() {
        // a single 0 is the conventional "no color"
        [single] => {
            let v: u8 = parse_number(single, "item rgb")?;
            Ok((v, v, v))
        }
        [r, g, b] => Ok((
            parse_number(r, "item rgb")?,
            parse_number(g, "item rgb")?,
            parse_number(b, "item rgb")?,
        )),
        _ => Err(GtrackError::Format(format!("invalid item rgb '{value}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn test_empty() {
        let feature = BedFeature::new();
        assert_eq!(feature.encode(Strand::Both), "");
        assert_eq!(
            BedFeature::decode("").unwrap(),
            (BedFeature::new(), Strand::Both)
        );
        assert!(matches!(feature.name(), Err(GtrackError::MissingField("name"))));
        assert!(matches!(feature.score(), Err(GtrackError::MissingField("score"))));
        assert!(matches!(feature.blocks(), Err(GtrackError::MissingField("blocks"))));
    }

    #[rstest]
    #[case(BedFeature::new().with_name("a"), Strand::Both, "a")]
    #[case(BedFeature::new().with_score(5), Strand::Both, ".\t5")]
    #[case(BedFeature::new(), Strand::Reverse, ".\t.\t-")]
    #[case(BedFeature::new().with_name("a").with_thick(10, 20), Strand::Both, "a\t.\t.\t10\t20")]
    #[case(BedFeature::new().with_item_rgb(255, 0, 0), Strand::Forward, ".\t.\t+\t.\t.\t255,0,0")]
    #[case(
        BedFeature::new().with_name("tx").with_score(1000).with_thick(1, 9).with_item_rgb(0, 0, 255).with_blocks(vec![(0, 3), (6, 4)]),
        Strand::Reverse,
        "tx\t1000\t-\t1\t9\t0,0,255\t2\t3,4,\t0,6,"
    )]
    fn test_encode_decode(
        #[case] feature: BedFeature,
        #[case] strand: Strand,
        #[case] encoded: &str,
    ) {
        assert_eq!(feature.encode(strand), encoded);
        assert_eq!(BedFeature::decode(encoded).unwrap(), (feature, strand));
    }

    #[rstest]
    fn test_column_count() {
        assert_eq!(BedFeature::new().column_count(Strand::Both), 0);
        assert_eq!(BedFeature::new().column_count(Strand::Forward), 3);
        assert_eq!(
            BedFeature::new().with_blocks(vec![]).column_count(Strand::Both),
            9
        );
    }

    #[rstest]
    #[case("a\tnotascore")]
    #[case("a\t1\tx")]
    #[case("a\t1\t+\t1\t2\t1,2")]
    #[case("a\t1\t+\t1\t2\t0\t2\t3,\t0,")]
    fn test_decode_invalid(#[case] rest: &str) {
        assert!(matches!(BedFeature::decode(rest), Err(GtrackError::Format(_))));
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("a\tb")]
    #[case("line\nbreak")]
    #[case("nul\0")]
    fn test_validate_rejects_name(#[case] name: &str) {
        let feature = BedFeature::new().with_name(name).with_score(3);
        assert!(matches!(feature.validate(), Err(GtrackError::Precondition(_))));
    }

    #[rstest]
    fn test_validate_accepts() {
        assert!(BedFeature::new().validate().is_ok());
        assert!(BedFeature::new().with_name("peak 1.5").validate().is_ok());
    }

    #[rstest]
    fn test_decode_zero_rgb() {
        let (feature, _) = BedFeature::decode("a\t0\t+\t1\t2\t0").unwrap();
        assert_eq!(feature.item_rgb().unwrap(), (0, 0, 0));
    }
}
