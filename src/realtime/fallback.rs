//! Offline fallback policy: what a screen should show for a coin right now.

use rust_decimal::Decimal;

use crate::error::PriceDataError;
use crate::shared::CoinId;

/// Display outcome for one coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceView {
    /// Live value from the feed.
    Live(Decimal),
    /// Cached value shown while offline; must be flagged as stale in the UI.
    Stale(Decimal),
    /// Connected but no tick has arrived yet.
    Loading,
}

impl PriceView {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            PriceView::Live(p) | PriceView::Stale(p) => Some(*p),
            PriceView::Loading => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, PriceView::Stale(_))
    }
}

/// Resolve the view for `coin_id`.
///
/// | connected | live | cached | outcome            |
/// |-----------|------|--------|--------------------|
/// | yes       | some | any    | `Live(live)`       |
/// | yes       | none | any    | `Loading`          |
/// | no        | any  | some   | `Stale(cached)`    |
/// | no        | any  | none   | `Err(NoData)`      |
///
/// While offline the live value is never shown, even if one was observed before the drop.
pub fn resolve(
    coin_id: &CoinId,
    connected: bool,
    live: Option<Decimal>,
    cached: Option<Decimal>,
) -> Result<PriceView, PriceDataError> {
    match (connected, live, cached) {
        (true, Some(price), _) => Ok(PriceView::Live(price)),
        (true, None, _) => Ok(PriceView::Loading),
        (false, _, Some(price)) => Ok(PriceView::Stale(price)),
        (false, _, None) => Err(PriceDataError::NoData {
            coin_id: coin_id.clone(),
        }),
    }
}
