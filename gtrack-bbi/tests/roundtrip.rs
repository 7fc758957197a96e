use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;

use gtrack_bbi::{
    BedFeature, BigBedReader, BigBedWriter, BigWigReader, BigWigWriter, Summary, SummaryPath,
    TrackReader, TrackValue, TrackWriter, TrackWriterOptions, open_bigbed, open_bigwig,
};
use gtrack_core::GtrackError;
use gtrack_core::models::{Interval, Strand};
use gtrack_overlaprs::{FallibleSource, intersect};

const GENOME: [(&str, u32); 4] = [("chr1", 60_000), ("chr2", 25_000), ("chr10", 40_000), ("chrM", 16_569)];

fn chrom_sizes(genome: &[(&str, u32)]) -> Vec<(String, u32)> {
    genome.iter().map(|(n, l)| (n.to_string(), *l)).collect()
}

/// Non-overlapping signal records, roughly `n` of them spread over `genome`.
fn random_signal(rng: &mut StdRng, genome: &[(&str, u32)], n: usize) -> Vec<Interval<f32>> {
    let total: u64 = genome.iter().map(|(_, l)| *l as u64).sum();
    let mut intervals = Vec::with_capacity(n);
    for (name, length) in genome {
        let share = (n as u64 * *length as u64).div_ceil(total) as usize;
        let mean_step = (*length as usize / share.max(1)).max(2) as u32;
        let mut next = 1u32;
        for _ in 0..share {
            let first = next + rng.random_range(0..mean_step / 2);
            let last = first + rng.random_range(0..mean_step / 2);
            if last > *length {
                break;
            }
            let value = rng.random_range(-10.0f32..10.0);
            intervals.push(Interval::new(*name, first, last, value).unwrap());
            next = last + 1;
        }
    }
    intervals
}

fn random_feature(rng: &mut StdRng, name: &str, length: u32, id: usize) -> Interval<BedFeature> {
    let first = rng.random_range(1..=length);
    let last = (first + rng.random_range(0..2_000)).min(length);
    let mut feature = BedFeature::new();
    if rng.random_bool(0.8) {
        feature = feature.with_name(format!("feature{id}"));
    }
    if rng.random_bool(0.5) {
        feature = feature.with_score(rng.random_range(0..=1000));
    }
    if rng.random_bool(0.3) {
        feature = feature.with_thick(first - 1, last);
    }
    if rng.random_bool(0.2) {
        feature = feature.with_item_rgb(rng.random(), rng.random(), rng.random());
    }
    if rng.random_bool(0.2) {
        let span = last - first + 1;
        feature = feature.with_blocks(vec![(0, 1), (span - 1, 1)]);
    }
    let strand = match rng.random_range(0..4) {
        0 => Strand::Forward,
        1 => Strand::Reverse,
        2 => Strand::Unknown,
        _ => Strand::Both,
    };
    Interval::new(name, first, last, feature)
        .unwrap()
        .with_strand(strand)
}

fn random_features(rng: &mut StdRng, genome: &[(&str, u32)], n: usize) -> Vec<Interval<BedFeature>> {
    (0..n)
        .map(|i| {
            let (name, length) = genome[rng.random_range(0..genome.len())];
            random_feature(rng, name, length, i)
        })
        .collect()
}

fn sorted<M: Clone>(intervals: &[Interval<M>]) -> Vec<Interval<M>> {
    let mut intervals = intervals.to_vec();
    intervals.sort_by(|a, b| a.cmp_position(b));
    intervals
}

fn brute_force<M: Clone>(intervals: &[Interval<M>], chrom: &str, first: u32, last: u32) -> Vec<Interval<M>> {
    let hits: Vec<Interval<M>> = intervals
        .iter()
        .filter(|iv| iv.seqname() == chrom && iv.first() <= last && first <= iv.last())
        .cloned()
        .collect();
    sorted(&hits)
}

fn write_signal(path: &Path, genome: &[(&str, u32)], options: TrackWriterOptions, records: &[Interval<f32>]) {
    let mut writer = TrackWriter::create(path, chrom_sizes(genome), options).unwrap();
    writer.push_all(records.iter().cloned()).unwrap();
    writer.close().unwrap();
    writer.close().unwrap();
}

fn approx(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= 1e-5 * b.abs().max(1.0),
        (None, None) => true,
        _ => false,
    }
}

#[rstest]
#[case(0, 1)]
#[case(1, 2)]
#[case(12_000, 3)]
fn test_signal_roundtrip(#[case] n: usize, #[case] seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let records = if n == 1 {
        vec![Interval::new("chr2", 100, 100, 7.25f32).unwrap()]
    } else {
        random_signal(&mut rng, &GENOME, n)
    };
    assert!(records.len() >= n.min(10_000));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signal.bw");
    let options = TrackWriterOptions::default().with_block_record_limit(128);
    write_signal(&path, &GENOME, options, &records);

    let mut reader = open_bigwig(&path).unwrap();
    assert_eq!(
        reader.chromosomes(),
        vec![("chr1", 60_000), ("chr2", 25_000), ("chr10", 40_000), ("chrM", 16_569)]
    );
    let read: Vec<Interval<f32>> = reader.records().collect::<Result<_, _>>().unwrap();
    assert_eq!(read, sorted(&records));

    let covered: u64 = records.iter().map(|r| r.span() as u64).sum();
    assert_eq!(reader.summary().covered_bases(), covered);

    for _ in 0..50 {
        let (chrom, length) = GENOME[rng.random_range(0..GENOME.len())];
        let first = rng.random_range(1..=length);
        let last = (first + rng.random_range(0..5_000)).min(length);
        assert_eq!(
            reader.query(chrom, first, last).unwrap(),
            brute_force(&records, chrom, first, last)
        );
    }
}

#[rstest]
#[case(0, 4)]
#[case(1, 5)]
#[case(10_000, 6)]
fn test_feature_roundtrip(#[case] n: usize, #[case] seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let records = random_features(&mut rng, &GENOME, n);

    let options = TrackWriterOptions::default().with_block_record_limit(200);
    let mut writer = BigBedWriter::new(Vec::new(), chrom_sizes(&GENOME), options).unwrap();
    writer.push_all(records.iter().cloned()).unwrap();
    let bytes = writer.into_inner().unwrap();

    let mut reader = BigBedReader::new(Cursor::new(bytes)).unwrap();
    let read: Vec<Interval<BedFeature>> = reader.records().collect::<Result<_, _>>().unwrap();
    assert_eq!(read, sorted(&records));
    if n == 0 {
        assert!(reader.zoom_levels().is_empty());
        assert!(reader.summary().is_empty());
    }

    for _ in 0..50 {
        let (chrom, length) = GENOME[rng.random_range(0..GENOME.len())];
        let first = rng.random_range(1..=length);
        let last = (first + rng.random_range(0..3_000)).min(length);
        assert_eq!(
            reader.query(chrom, first, last).unwrap(),
            brute_force(&records, chrom, first, last)
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum TrackKind {
    Signal,
    Feature,
}

#[rstest]
#[case(TrackKind::Signal)]
#[case(TrackKind::Feature)]
fn test_zoom_bins_match_raw_records(#[case] kind: TrackKind) {
    let genome = [("chr1", 20_000), ("chr2", 7_000), ("chr10", 3_001)];
    let mut rng = StdRng::seed_from_u64(7);
    let options = TrackWriterOptions::default()
        .with_bin_size(16)
        .with_block_record_limit(50);

    match kind {
        TrackKind::Signal => {
            let records = random_signal(&mut rng, &genome, 1_500);
            let mut writer = BigWigWriter::new(Vec::new(), chrom_sizes(&genome), options).unwrap();
            writer.push_all(records).unwrap();
            let mut reader = BigWigReader::new(Cursor::new(writer.into_inner().unwrap())).unwrap();
            check_zoom_against_raw(&mut reader, &genome, &mut rng);
        }
        TrackKind::Feature => {
            let records = random_features(&mut rng, &genome, 600);
            let mut writer = BigBedWriter::new(Vec::new(), chrom_sizes(&genome), options).unwrap();
            writer.push_all(records).unwrap();
            let mut reader = BigBedReader::new(Cursor::new(writer.into_inner().unwrap())).unwrap();
            check_zoom_against_raw(&mut reader, &genome, &mut rng);
        }
    }
}

/// Every bin of every level agrees with the raw records, and so do ranges that cut through bins.
fn check_zoom_against_raw<R: Read + Seek, V: TrackValue>(
    reader: &mut TrackReader<R, V>,
    genome: &[(&str, u32)],
    rng: &mut StdRng,
) {
    let levels = reader.zoom_levels();
    assert_eq!(levels, vec![16, 64, 256, 1024, 4096, 16384]);

    for (level, width) in levels.iter().enumerate() {
        for &(chrom, length) in genome {
            let mut bin_start = 0;
            while bin_start < length {
                let (first, last) = (bin_start + 1, (bin_start + width).min(length));
                let zoom = reader
                    .summarize_with(chrom, first, last, SummaryPath::Zoom(level + 1))
                    .unwrap();
                let raw: Summary = reader
                    .summarize_with(chrom, first, last, SummaryPath::Raw)
                    .unwrap();
                assert_eq!(zoom.covered_bases(), raw.covered_bases(), "{chrom}:{first}-{last}");
                assert!(approx(zoom.mean(), raw.mean()), "{chrom}:{first}-{last} level {}", level + 1);
                assert!(approx(zoom.min(), raw.min()));
                assert!(approx(zoom.max(), raw.max()));
                bin_start += width;
            }
        }
    }

    // ranges that do not line up with any bin mix zoom bins and raw records
    for _ in 0..200 {
        let (chrom, length) = genome[rng.random_range(0..genome.len())];
        let first = rng.random_range(1..=length);
        let last = (first + rng.random_range(0..10_000)).min(length);
        let auto = reader.summarize(chrom, first, last).unwrap();
        let raw = reader.summarize_with(chrom, first, last, SummaryPath::Raw).unwrap();
        assert_eq!(auto.covered_bases(), raw.covered_bases());
        assert!(approx(auto.mean(), raw.mean()));
        assert!(approx(auto.min(), raw.min()));
        assert!(approx(auto.max(), raw.max()));

        let auto_sd = reader.stddev(chrom, first, last).unwrap();
        let raw_sd = reader.stddev_with(chrom, first, last, SummaryPath::Raw).unwrap();
        match (auto_sd, raw_sd) {
            (Some(a), Some(b)) => assert!((a - b).abs() <= 1e-2 * b.max(1.0), "{a} vs {b}"),
            (a, b) => assert_eq!(a, b),
        }
    }
}

#[rstest]
fn test_thousand_chromosome_feature_track() {
    let names: Vec<String> = (1..=1000).map(|i| format!("chr{i}")).collect();
    let genome: Vec<(&str, u32)> = names.iter().map(|n| (n.as_str(), 50_000)).collect();
    let mut rng = StdRng::seed_from_u64(1000);
    let records = random_features(&mut rng, &genome, 4_000);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.bb");
    let mut writer = BigBedWriter::create(&path, chrom_sizes(&genome), TrackWriterOptions::default())
        .unwrap();
    writer.push_all(records.iter().cloned()).unwrap();
    writer.close().unwrap();

    let mut reader = open_bigbed(&path).unwrap();
    assert_eq!(reader.chromosomes().len(), 1000);
    assert_eq!(reader.chromosomes()[9], ("chr10", 50_000));

    for _ in 0..200 {
        let chrom = names[rng.random_range(0..names.len())].as_str();
        let first = rng.random_range(1..=50_000);
        let last = (first + rng.random_range(0..10_000)).min(50_000);
        assert_eq!(
            reader.query(chrom, first, last).unwrap(),
            brute_force(&records, chrom, first, last)
        );
    }
}

#[rstest]
fn test_records_feed_intersect() {
    let mut rng = StdRng::seed_from_u64(11);
    let signal = random_signal(&mut rng, &GENOME, 2_000);
    let features = random_features(&mut rng, &GENOME, 300);

    let mut signal_writer = BigWigWriter::new(Vec::new(), chrom_sizes(&GENOME), TrackWriterOptions::default()).unwrap();
    signal_writer.push_all(signal.iter().cloned()).unwrap();
    let mut feature_writer =
        BigBedWriter::new(Vec::new(), chrom_sizes(&GENOME), TrackWriterOptions::default()).unwrap();
    feature_writer.push_all(features.iter().cloned()).unwrap();

    let mut signal_reader = BigWigReader::new(Cursor::new(signal_writer.into_inner().unwrap())).unwrap();
    let mut feature_reader =
        BigBedReader::new(Cursor::new(feature_writer.into_inner().unwrap())).unwrap();

    let pairs: Vec<(Interval<BedFeature>, Interval<f32>)> = intersect(
        FallibleSource::new(feature_reader.records()),
        FallibleSource::new(signal_reader.records()),
    )
    .collect::<Result<_, _>>()
    .unwrap();

    let mut expected = 0;
    for f in &features {
        expected += signal.iter().filter(|s| s.overlaps(f)).count();
    }
    assert_eq!(pairs.len(), expected);
    assert!(pairs.iter().all(|(f, s)| f.overlaps(s)));
}

#[rstest]
fn test_bad_magic_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.bw");
    fs::write(&path, vec![0xAB; 200]).unwrap();
    assert!(matches!(open_bigwig(&path), Err(GtrackError::Format(_))));

    fs::write(&path, b"").unwrap();
    assert!(matches!(open_bigwig(&path), Err(GtrackError::Format(_))));

    let bytes = BigBedWriter::new(Vec::new(), chrom_sizes(&GENOME), TrackWriterOptions::default())
        .unwrap()
        .into_inner()
        .unwrap();
    let result = TrackReader::<_, f32>::new(Cursor::new(bytes));
    assert!(matches!(result, Err(GtrackError::Format(_))));
}

#[rstest]
#[case(1)]
#[case(41)]
#[case(2)]
fn test_truncated_file_is_format_error(#[case] cut: usize) {
    let mut rng = StdRng::seed_from_u64(21);
    let records = random_signal(&mut rng, &GENOME, 500);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signal.bw");
    write_signal(&path, &GENOME, TrackWriterOptions::default(), &records);

    let bytes = fs::read(&path).unwrap();
    // cut = 2 keeps half the file
    let keep = if cut == 2 { bytes.len() / 2 } else { bytes.len() - cut };
    fs::write(&path, &bytes[..keep]).unwrap();
    assert!(matches!(open_bigwig(&path), Err(GtrackError::Format(_))));
}

#[rstest]
fn test_unknown_chromosome_yields_nothing() {
    let bytes = BigWigWriter::new(Vec::new(), chrom_sizes(&GENOME), TrackWriterOptions::default())
        .unwrap()
        .into_inner()
        .unwrap();
    let mut reader = BigWigReader::new(Cursor::new(bytes)).unwrap();
    assert!(reader.query("chrUn", 1, 100).unwrap().is_empty());
    assert!(reader.query("chr1", 1, 100).unwrap().is_empty());
    assert!(reader.summarize("chr1", 1, 60_000).unwrap().is_empty());
}
