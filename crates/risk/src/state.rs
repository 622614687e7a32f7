use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use common::{Position, PositionId, StrategyStatus};

/// Mutable state of one symbol's strategy.
///
/// Owned by exactly one task (the strategy loop); every mutation goes through
/// `&mut self`. Positions are keyed by a generated id so two positions with
/// identical fields stay distinguishable.
#[derive(Debug, Default, Clone)]
pub struct StrategyState {
    positions: BTreeMap<PositionId, Position>,
    next_id: u64,
    last_signal_at: Option<DateTime<Utc>>,
}

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly filled position. Zero-size positions are refused.
    pub fn insert(&mut self, position: Position) -> Option<PositionId> {
        if position.size.is_nan() || position.size <= 0.0 {
            return None;
        }
        let id = PositionId(self.next_id);
        self.next_id += 1;
        self.positions.insert(id, position);
        Some(id)
    }

    /// Stop tracking a closed position.
    pub fn remove(&mut self, id: PositionId) -> Option<Position> {
        self.positions.remove(&id)
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn positions(&self) -> impl Iterator<Item = (PositionId, &Position)> {
        self.positions.iter().map(|(id, p)| (*id, p))
    }

    pub fn ids(&self) -> Vec<PositionId> {
        self.positions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn last_signal_at(&self) -> Option<DateTime<Utc>> {
        self.last_signal_at
    }

    pub(crate) fn record_signal(&mut self, at: DateTime<Utc>) {
        self.last_signal_at = Some(at);
    }

    pub fn status(&self, symbol: &str, max_positions: usize) -> StrategyStatus {
        StrategyStatus {
            symbol: symbol.to_string(),
            active_positions: self.len(),
            max_positions,
            last_signal_at: self.last_signal_at,
            positions: self.positions().map(|(id, p)| (id, p.clone())).collect(),
        }
    }
}
