//! Watering-status evaluation from soil-moisture readings.
//!
//! Readings come from watermark sensors buried at 30, 60 and 90 cm. Each
//! depth is scored against age-dependent centibar thresholds and the worst
//! score wins.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::status::WateringStatus;

/// Depths, in centimetres, a valid reading must cover.
pub const DEPTHS: [i32; 3] = [30, 60, 90];

/// Threshold value that disables the moderate band.
const NO_MID_BAND: i32 = -1;

/// A single soil-moisture measurement at one depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Soil-moisture tension; higher is drier.
    pub centibar: i32,
    /// Raw sensor resistance.
    pub resistance: i32,
    /// Depth in centimetres.
    pub depth: i32,
}

impl Watermark {
    /// Create a watermark reading.
    #[must_use]
    pub const fn new(depth: i32, centibar: i32, resistance: i32) -> Self {
        Self {
            centibar,
            resistance,
            depth,
        }
    }
}

/// `(lo, hi)` centibar bounds per depth, ordered 30, 60, 90.
type Bands = [(i32, i32); 3];

fn bands_for(lifetime: i32) -> Option<Bands> {
    match lifetime {
        0 | 1 => Some([(25, 33), (25, 33), (25, 33)]),
        2 => Some([(62, 81), (25, 33), (25, 33)]),
        3 => Some([(1585, NO_MID_BAND), (80, NO_MID_BAND), (80, NO_MID_BAND)]),
        _ => None,
    }
}

/// Score one reading: 0 good, 1 moderate, 2 bad. Bounds are inclusive.
fn score(centibar: i32, lo: i32, hi: i32) -> u8 {
    if centibar <= lo {
        0
    } else if hi != NO_MID_BAND && centibar <= hi {
        1
    } else {
        2
    }
}

/// Evaluate the watering status for a tree planted in `planting_year`.
///
/// Returns [`WateringStatus::Unknown`] when the readings do not cover exactly
/// the depths 30, 60 and 90, or when the tree is older than three years (or
/// planted in the future).
#[must_use]
pub fn evaluate(planting_year: i32, current_year: i32, watermarks: &[Watermark]) -> WateringStatus {
    let Some(lifetime) = current_year.checked_sub(planting_year) else {
        return WateringStatus::Unknown;
    };
    let Some(bands) = bands_for(lifetime) else {
        return WateringStatus::Unknown;
    };

    let mut sorted = watermarks.to_vec();
    sorted.sort_by_key(|wm| wm.depth);
    if sorted.len() != DEPTHS.len() || sorted.iter().zip(DEPTHS).any(|(wm, d)| wm.depth != d) {
        return WateringStatus::Unknown;
    }

    let worst = sorted
        .iter()
        .zip(bands)
        .map(|(wm, (lo, hi))| score(wm.centibar, lo, hi))
        .max()
        .unwrap_or(0);

    match worst {
        0 => WateringStatus::Good,
        1 => WateringStatus::Moderate,
        _ => WateringStatus::Bad,
    }
}

/// Evaluate against the current calendar year.
#[must_use]
pub fn status(planting_year: i32, watermarks: &[Watermark]) -> WateringStatus {
    evaluate(planting_year, chrono::Utc::now().year(), watermarks)
}

/// Average readings of several sensors per depth.
///
/// Only the depths 30, 60 and 90 are kept. Depths no sensor reported are
/// omitted, which makes the averaged set evaluate to unknown. Means are
/// rounded to the nearest integer.
#[must_use]
pub fn average_by_depth<'a, I>(readings: I) -> Vec<Watermark>
where
    I: IntoIterator<Item = &'a [Watermark]>,
{
    let mut sums = [(0i64, 0i64, 0i64); 3];
    for reading in readings {
        for wm in reading {
            if let Some(slot) = DEPTHS.iter().position(|d| *d == wm.depth) {
                sums[slot].0 += i64::from(wm.centibar);
                sums[slot].1 += i64::from(wm.resistance);
                sums[slot].2 += 1;
            }
        }
    }

    DEPTHS
        .iter()
        .zip(sums)
        .filter(|(_, (_, _, n))| *n > 0)
        .map(|(depth, (centibar, resistance, n))| {
            Watermark::new(*depth, rounded_mean(centibar, n), rounded_mean(resistance, n))
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn rounded_mean(sum: i64, n: i64) -> i32 {
    (sum as f64 / n as f64).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wms(c30: i32, c60: i32, c90: i32) -> Vec<Watermark> {
        vec![
            Watermark::new(30, c30, 0),
            Watermark::new(60, c60, 0),
            Watermark::new(90, c90, 0),
        ]
    }

    #[test]
    fn second_year_moderate_band() {
        assert_eq!(
            evaluate(2022, 2024, &wms(62, 33, 33)),
            WateringStatus::Moderate
        );
    }

    #[test]
    fn first_year_thresholds() {
        assert_eq!(evaluate(2024, 2024, &wms(25, 25, 25)), WateringStatus::Good);
        assert_eq!(evaluate(2023, 2024, &wms(26, 10, 10)), WateringStatus::Moderate);
        assert_eq!(evaluate(2023, 2024, &wms(10, 10, 34)), WateringStatus::Bad);
    }

    #[test]
    fn third_year_has_no_moderate_band() {
        assert_eq!(evaluate(2021, 2024, &wms(1585, 80, 80)), WateringStatus::Good);
        assert_eq!(evaluate(2021, 2024, &wms(1585, 81, 80)), WateringStatus::Bad);
    }

    #[test]
    fn order_of_readings_does_not_matter() {
        let mut readings = wms(10, 30, 40);
        readings.reverse();
        assert_eq!(evaluate(2024, 2024, &readings), WateringStatus::Bad);
    }

    #[test]
    fn malformed_depths_are_unknown() {
        let missing = vec![Watermark::new(30, 1, 0), Watermark::new(60, 1, 0)];
        assert_eq!(evaluate(2024, 2024, &missing), WateringStatus::Unknown);

        let duplicate = vec![
            Watermark::new(30, 1, 0),
            Watermark::new(30, 1, 0),
            Watermark::new(90, 1, 0),
        ];
        assert_eq!(evaluate(2024, 2024, &duplicate), WateringStatus::Unknown);
        assert_eq!(evaluate(2024, 2024, &[]), WateringStatus::Unknown);
    }

    #[test]
    fn future_planting_is_unknown() {
        assert_eq!(evaluate(2025, 2024, &wms(1, 1, 1)), WateringStatus::Unknown);
    }

    #[test]
    fn average_rounds_per_depth() {
        let a = wms(10, 20, 30);
        let b = wms(11, 40, 30);
        let avg = average_by_depth([a.as_slice(), b.as_slice()]);
        assert_eq!(avg, vec![
            Watermark::new(30, 11, 0),
            Watermark::new(60, 30, 0),
            Watermark::new(90, 30, 0),
        ]);
    }

    #[test]
    fn average_of_nothing_is_unknown() {
        let avg = average_by_depth(std::iter::empty::<&[Watermark]>());
        assert!(avg.is_empty());
        assert_eq!(evaluate(2024, 2024, &avg), WateringStatus::Unknown);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn status_is_never_just_watered(
            lifetime in -2i32..8,
            c30 in -100i32..3000,
            c60 in -100i32..3000,
            c90 in -100i32..3000,
        ) {
            let result = evaluate(2024 - lifetime, 2024, &wms(c30, c60, c90));
            prop_assert_ne!(result, WateringStatus::JustWatered);
        }

        #[test]
        fn first_year_green_band_is_good(
            lifetime in 0i32..=1,
            c30 in 0i32..=25,
            c60 in 0i32..=25,
            c90 in 0i32..=25,
        ) {
            prop_assert_eq!(
                evaluate(2024 - lifetime, 2024, &wms(c30, c60, c90)),
                WateringStatus::Good
            );
        }

        #[test]
        fn older_than_three_years_is_unknown(
            lifetime in 4i32..200,
            c30 in 0i32..3000,
            c60 in 0i32..3000,
            c90 in 0i32..3000,
        ) {
            prop_assert_eq!(
                evaluate(2024 - lifetime, 2024, &wms(c30, c60, c90)),
                WateringStatus::Unknown
            );
        }

        #[test]
        fn wrong_depths_are_unknown(
            depths in proptest::collection::vec(0i32..120, 0..5),
            centibar in 0i32..100,
        ) {
            prop_assume!({
                let mut sorted = depths.clone();
                sorted.sort_unstable();
                sorted != DEPTHS
            });
            let readings: Vec<_> = depths.iter().map(|d| Watermark::new(*d, centibar, 0)).collect();
            prop_assert_eq!(evaluate(2024, 2024, &readings), WateringStatus::Unknown);
        }

        #[test]
        fn raising_one_reading_never_improves_status(
            lifetime in 0i32..=3,
            c30 in 0i32..2000,
            c60 in 0i32..200,
            c90 in 0i32..200,
            bump in 0i32..500,
        ) {
            let rank = |s: WateringStatus| match s {
                WateringStatus::Good => 0,
                WateringStatus::Moderate => 1,
                _ => 2,
            };
            let before = evaluate(2024 - lifetime, 2024, &wms(c30, c60, c90));
            let after = evaluate(2024 - lifetime, 2024, &wms(c30, c60 + bump, c90));
            prop_assert!(rank(after) >= rank(before));
        }
    }
}
