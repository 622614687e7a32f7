use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Position, PositionSide, Signal, SignalResult};
use risk::{EntryDecision, EntryRejection, ExitDecision, ExitReason, PositionManager, RiskConfig, StrategyState};

fn side_strategy() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

proptest! {
    /// Exit rules on randomized prices never panic and agree with the PnL.
    #[test]
    fn exit_rules_agree_with_pnl(
        entry_price in 0.0001f64..1_000_000.0f64,
        current_price in 0.0001f64..1_000_000.0f64,
        size in 0.0001f64..1000.0f64,
        side in side_strategy(),
        held_secs in 0i64..1_000,
    ) {
        let config = RiskConfig {
            profit_target: 0.002,
            stop_loss: 0.001,
            max_positions: 3,
            position_timeout_secs: 300,
        };
        let manager = PositionManager::new(config.clone());
        let opened_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let position = Position {
            symbol: "TESTUSDT".into(),
            side,
            size,
            entry_price,
            opened_at,
            order_id: "p1".into(),
        };

        let pnl = position.pnl_pct(current_price);
        let decision = manager.should_close(&position, current_price, opened_at + Duration::seconds(held_secs));

        match decision {
            ExitDecision::Close(ExitReason::TakeProfit { .. }) => prop_assert!(pnl >= config.profit_target),
            ExitDecision::Close(ExitReason::StopLoss { .. }) => prop_assert!(pnl <= -config.stop_loss),
            ExitDecision::Close(ExitReason::Timeout { .. }) => prop_assert!(held_secs > 300),
            ExitDecision::Hold { .. } => {
                prop_assert!(pnl < config.profit_target && pnl > -config.stop_loss);
                prop_assert!(held_secs <= 300);
            }
            ExitDecision::AlreadyClosed => prop_assert!(false, "size is always positive here"),
        }
    }

    /// No signal strength ever opens a position once the cap is reached.
    #[test]
    fn cap_is_never_exceeded(
        max_positions in 1usize..6,
        strength in 0.0f64..100.0f64,
    ) {
        let manager = PositionManager::new(RiskConfig { max_positions, ..RiskConfig::default() });
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut state = StrategyState::new();
        for _ in 0..max_positions {
            state.insert(Position {
                symbol: "TESTUSDT".into(),
                side: PositionSide::Long,
                size: 1.0,
                entry_price: 100.0,
                opened_at: now,
                order_id: "p".into(),
            });
        }

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let decision = runtime.block_on(manager.should_open(&mut state, now, || async move {
            Some(SignalResult {
                signal: Signal::Buy,
                strength,
                reasons: Vec::new(),
                indicators: None,
            })
        }));
        let is_limit_rejection = matches!(
            decision,
            EntryDecision::Skip(EntryRejection::PositionLimitReached { .. })
        );
        prop_assert!(is_limit_rejection);
    }
}
