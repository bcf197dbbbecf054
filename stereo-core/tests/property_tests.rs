//! Property tests for table, resampling and channel invariants.
//!
//! Uses proptest to verify:
//! 1. Assembly: concatenated tables are strictly increasing in time
//! 2. Resampling: row count never grows, timestamps sit on bucket boundaries
//! 3. Channel combination: single channel is the identity, ranges are means

use proptest::prelude::*;
use stereo_core::{
    combine_channels, resample, ChannelTable, DataColumn, Frequency, Species, TimeTable,
    TimestampPosition,
};

const MS_PER_DAY: i64 = 86_400_000;

// ── Strategies (proptest) ────────────────────────────────────────────

/// 2021-04-15T00:00:00Z
const BASE: i64 = 1_618_444_800_000;

fn arb_times() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0..3 * MS_PER_DAY, 1..200).prop_map(|offsets| {
        let mut times: Vec<i64> = offsets.into_iter().map(|o| BASE + o).collect();
        times.sort_unstable();
        times.dedup();
        times
    })
}

fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        9 => -1.0e4..1.0e4_f64,
        1 => Just(f64::NAN),
    ]
}

fn arb_table() -> impl Strategy<Value = TimeTable> {
    arb_times().prop_flat_map(|times| {
        let n = times.len();
        prop::collection::vec(arb_value(), n).prop_map(move |values| {
            TimeTable::new(times.clone(), vec![DataColumn::new("x", values)]).unwrap()
        })
    })
}

fn arb_frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just("1s"),
        Just("30s"),
        Just("1min"),
        Just("7min"),
        Just("1h"),
        Just("1D"),
    ]
    .prop_map(|s| s.parse::<Frequency>().unwrap())
}

/// SEPT electron table with a flux column per channel.
fn arb_electron_table() -> impl Strategy<Value = TimeTable> {
    let channels = ChannelTable::sept(Species::Electrons);
    let n_channels = channels.len();
    (1usize..30).prop_flat_map(move |rows| {
        let bins = channels.bins();
        prop::collection::vec(prop::collection::vec(0.0..1.0e5_f64, rows), n_channels).prop_map(
            move |columns| {
                let times = (0..rows as i64).map(|i| BASE + i * 60_000).collect();
                let columns = bins
                    .iter()
                    .zip(columns)
                    .map(|(bin, values)| DataColumn::new(format!("ch_{bin}"), values))
                    .collect();
                TimeTable::new(times, columns).unwrap()
            },
        )
    })
}

// ── 1. Assembly ──────────────────────────────────────────────────────

proptest! {
    /// Concatenating overlapping, shuffled pieces gives a strictly increasing axis.
    #[test]
    fn concat_is_canonical(a in arb_table(), b in arb_table()) {
        let out = TimeTable::concat(vec![b.clone(), a.clone()]);
        prop_assert!(out.is_canonical());
        prop_assert!(out.len() <= a.len() + b.len());
        prop_assert!(out.len() >= a.len().max(b.len()));
    }
}

// ── 2. Resampling ────────────────────────────────────────────────────

proptest! {
    /// Resampling never adds rows.
    #[test]
    fn resample_does_not_grow(table in arb_table(), freq in arb_frequency()) {
        let out = resample(&table, freq, TimestampPosition::Center);
        prop_assert!(out.len() <= table.len());
        prop_assert!(out.is_canonical());
        prop_assert_eq!(out.column_names(), table.column_names());
    }

    /// Bucket starts are multiples of the frequency from midnight.
    #[test]
    fn resample_aligns_to_frequency(table in arb_table(), freq in arb_frequency()) {
        let every = freq.as_millis();
        let midnight = table.times()[0].div_euclid(MS_PER_DAY) * MS_PER_DAY;

        let start = resample(&table, freq, TimestampPosition::Start);
        for &t in start.times() {
            prop_assert_eq!((t - midnight).rem_euclid(every), 0);
        }

        let center = resample(&table, freq, TimestampPosition::Center);
        prop_assert_eq!(center.len(), start.len());
        for (&c, &s) in center.times().iter().zip(start.times()) {
            prop_assert_eq!(c - s, every / 2);
        }
    }

    /// Every input row lands in exactly one output bucket.
    #[test]
    fn resample_buckets_cover_inputs(table in arb_table(), freq in arb_frequency()) {
        let every = freq.as_millis();
        let out = resample(&table, freq, TimestampPosition::Start);
        for &t in table.times() {
            let hits = out.times().iter().filter(|&&b| b <= t && t < b + every).count();
            prop_assert_eq!(hits, 1);
        }
    }
}

// ── 3. Channel combination ───────────────────────────────────────────

proptest! {
    /// A single-channel range returns the raw column.
    #[test]
    fn single_channel_is_identity(table in arb_electron_table(), bin in 2u32..=16) {
        let channels = ChannelTable::sept(Species::Electrons);
        let (values, label) = combine_channels(&table, &channels, [bin, bin]).unwrap();
        prop_assert_eq!(values.as_slice(), table.column(&format!("ch_{bin}")).unwrap());
        prop_assert_eq!(label, channels.get(bin).unwrap().label());
    }

    /// A range is the unweighted per-row mean; the label spans its bounds.
    #[test]
    fn range_is_unweighted_mean(
        table in arb_electron_table(),
        (low, high) in (2u32..=16).prop_flat_map(|l| (Just(l), l..=16)),
    ) {
        let channels = ChannelTable::sept(Species::Electrons);
        let (values, label) = combine_channels(&table, &channels, [low, high]).unwrap();

        for (row, &v) in values.iter().enumerate() {
            let picked: Vec<f64> = (low..=high)
                .map(|b| table.column(&format!("ch_{b}")).unwrap()[row])
                .collect();
            let mean = picked.iter().sum::<f64>() / picked.len() as f64;
            prop_assert!((v - mean).abs() <= 1e-9 * mean.abs().max(1.0));
        }

        let expected = format!(
            "{:.1} - {:.1} keV",
            channels.get(low).unwrap().low_kev,
            channels.get(high).unwrap().high_kev
        );
        prop_assert_eq!(label, expected);
    }

    /// Inverted ranges are rejected.
    #[test]
    fn inverted_range_is_error(table in arb_electron_table(), low in 3u32..=16) {
        let channels = ChannelTable::sept(Species::Electrons);
        prop_assert!(combine_channels(&table, &channels, [low, low - 1]).is_err());
    }
}
