//! Wire types for price ticks as the feed sends them.

use crate::shared::CoinId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw tick payload. `price` arrives as a decimal string, `timestamp` as epoch millis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickWire {
    pub coin_id: CoinId,
    pub price: Decimal,
    pub timestamp: i64,
}
