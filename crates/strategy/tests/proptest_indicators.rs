use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, Signal};
use strategy::indicators::{BollingerIndicator, RsiIndicator, RSI_NEUTRAL};
use strategy::{SignalAnalyzer, MIN_CANDLES};

fn to_candles(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0 + i as f64,
            start_time: start + Duration::minutes(i as i64),
        })
        .collect()
}

fn analyzer() -> SignalAnalyzer {
    SignalAnalyzer::from_config(
        &common::Config::from_lookup(|_| None).unwrap(),
        &strategy::IndicatorSettings::default(),
    )
}

proptest! {
    /// RSI stays within [0, 100] for any finite price series.
    #[test]
    fn rsi_is_bounded(
        prices in prop::collection::vec(0.01f64..1_000_000.0f64, 0..120),
        period in 2usize..30,
    ) {
        let rsi = RsiIndicator::new(period, 70.0, 30.0).compute(&prices);
        prop_assert!((0.0..=100.0).contains(&rsi), "RSI out of range: {}", rsi);
        if prices.len() <= period {
            prop_assert_eq!(rsi, RSI_NEUTRAL);
        }
    }

    /// Bands stay ordered and collapse on a constant series.
    #[test]
    fn bollinger_bands_are_ordered(
        prices in prop::collection::vec(0.01f64..1_000_000.0f64, 1..80),
        constant in 0.01f64..1_000_000.0f64,
    ) {
        let bb = BollingerIndicator::default();
        let bands = bb.compute(&prices);
        prop_assert!(bands.lower <= bands.middle && bands.middle <= bands.upper);

        let flat = bb.compute(&vec![constant; prices.len()]);
        prop_assert!((flat.upper - constant).abs() <= constant * 1e-9);
        prop_assert!((flat.lower - constant).abs() <= constant * 1e-9);
    }

    /// Short windows always hold, whatever the prices look like.
    #[test]
    fn short_windows_always_hold(
        prices in prop::collection::vec(0.01f64..1_000_000.0f64, 0..MIN_CANDLES),
    ) {
        let result = analyzer().analyze(&to_candles(&prices));
        prop_assert_eq!(result.signal, Signal::Hold);
        prop_assert_eq!(result.strength, 0.0);
    }

    /// Strength is the magnitude of the score and matches the signal.
    #[test]
    fn strength_matches_signal(
        prices in prop::collection::vec(1.0f64..1_000.0f64, MIN_CANDLES..120),
    ) {
        let result = analyzer().analyze(&to_candles(&prices));
        prop_assert!(result.strength >= 0.0);
        match result.signal {
            Signal::Buy | Signal::Sell => prop_assert!(result.strength >= 2.0),
            Signal::Hold => prop_assert!(result.strength < 2.0),
        }
    }
}
