//! Price domain — ticks, annotated updates, direction derivation.

pub mod cache;
mod convert;
pub mod state;
pub mod wire;

pub use cache::{InMemoryPriceCache, NoPriceCache, PriceCache};
pub use state::PriceDirectionTracker;

use crate::shared::CoinId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One validated inbound tick from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub coin_id: CoinId,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Movement of a price relative to the previously observed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Unchanged,
}

impl Direction {
    pub fn between(previous_price: Decimal, price: Decimal) -> Self {
        match price.cmp(&previous_price) {
            std::cmp::Ordering::Greater => Direction::Up,
            std::cmp::Ordering::Less => Direction::Down,
            std::cmp::Ordering::Equal => Direction::Unchanged,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
            Direction::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Percent change from `previous_price` to `price`; zero when there is no base.
///
/// Saturates at `Decimal::MAX` / `Decimal::MIN` when the ratio is not representable.
pub fn change_percent(price: Decimal, previous_price: Decimal) -> Decimal {
    if previous_price.is_zero() {
        return Decimal::ZERO;
    }
    price
        .checked_sub(previous_price)
        .and_then(|diff| diff.checked_div(previous_price))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or_else(|| {
            tracing::warn!(
                "Change from {} to {} out of range, saturating",
                previous_price,
                price
            );
            if price > previous_price {
                Decimal::MAX
            } else {
                Decimal::MIN
            }
        })
}

/// A tick annotated with its movement against the last known price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub coin_id: CoinId,
    pub price: Decimal,
    pub previous_price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub change_percent: Decimal,
}

impl PriceUpdate {
    pub fn new(
        coin_id: CoinId,
        price: Decimal,
        previous_price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            direction: Direction::between(previous_price, price),
            change_percent: change_percent(price, previous_price),
            coin_id,
            price,
            previous_price,
            timestamp,
        }
    }

    /// Signed display string, e.g. `"+10.00%"`.
    pub fn change_label(&self) -> String {
        let rounded = self.change_percent.round_dp(2);
        let sign = if rounded > Decimal::ZERO { "+" } else { "" };
        format!("{}{:.2}%", sign, rounded)
    }
}
