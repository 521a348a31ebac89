use super::wire::TickWire;
use super::Tick;
use crate::error::SdkError;
use chrono::DateTime;
use rust_decimal::Decimal;

impl TryFrom<TickWire> for Tick {
    type Error = SdkError;

    fn try_from(wire: TickWire) -> Result<Self, Self::Error> {
        if wire.coin_id.as_str().is_empty() {
            return Err(SdkError::Validation("tick has an empty coin_id".to_string()));
        }
        if wire.price < Decimal::ZERO {
            return Err(SdkError::Validation(format!(
                "negative price {} for {}",
                wire.price, wire.coin_id
            )));
        }
        let timestamp = DateTime::from_timestamp_millis(wire.timestamp).ok_or_else(|| {
            SdkError::Validation(format!(
                "timestamp {} out of range for {}",
                wire.timestamp, wire.coin_id
            ))
        })?;

        Ok(Tick {
            coin_id: wire.coin_id,
            price: wire.price,
            timestamp,
        })
    }
}
