//! Continuous price-time-priority matcher.
//!
//! ```text
//! match_book(&mut OrderBook, now) -> Vec<Fill>
//! ```
//!
//! While the best bid is at or above the best ask, the two front orders are
//! paired. The fill executes at the maker's price, for
//! `min(remaining(bid), remaining(ask))` units. The maker is whichever of the
//! two entered the book first; order timestamps only rank orders within a
//! price level. Fully filled orders are evicted from the book immediately.

use bourse_types::{BourseError, Fill, FillId, OrderId, OrderSide, Result};
use chrono::{DateTime, Utc};

use crate::OrderBook;

/// Run the matching loop until the book is no longer crossed.
///
/// The orders left in the book carry their updated `filled_qty`. The returned
/// fills are ordered by their `sequence`.
pub fn match_book(book: &mut OrderBook, now: DateTime<Utc>) -> Result<Vec<Fill>> {
    let mut fills = Vec::new();
    while let Some(fill) = match_top(book, now)? {
        tracing::debug!(
            resource = %fill.resource,
            sequence = fill.sequence,
            buy_order_id = %fill.buy_order_id,
            sell_order_id = %fill.sell_order_id,
            price = %fill.price,
            quantity = fill.quantity,
            "Fill"
        );
        fills.push(fill);
    }
    Ok(fills)
}

/// Pair the two front orders once. `None` when the book is not crossed.
fn match_top(book: &mut OrderBook, now: DateTime<Utc>) -> Result<Option<Fill>> {
    let (Some(mut bid_level), Some(mut ask_level)) = (book.bids.first_entry(), book.asks.first_entry())
    else {
        return Ok(None);
    };
    if bid_level.get().price < ask_level.get().price {
        return Ok(None);
    }

    let index = &book.index;
    let (fill, bid_done, ask_done) = {
        let (Some(bid), Some(ask)) = (bid_level.get_mut().front_mut(), ask_level.get_mut().front_mut())
        else {
            return Err(BourseError::MatchingFailed {
                reason: "empty price level left in book".into(),
            });
        };

        let quantity = bid.remaining_qty().min(ask.remaining_qty());
        if quantity == 0 {
            return Err(BourseError::MatchingFailed {
                reason: format!("zero-remaining order resting in book: {} / {}", bid.id, ask.id),
            });
        }

        let arrival = |id: &OrderId| {
            index
                .get(id)
                .map(|&(_, _, arrival)| arrival)
                .ok_or_else(|| BourseError::MatchingFailed {
                    reason: format!("order {id} resting in book but missing from index"),
                })
        };
        let maker_side = if arrival(&ask.id)? < arrival(&bid.id)? {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let price = match maker_side {
            OrderSide::Sell => ask.price,
            OrderSide::Buy => bid.price,
        };

        bid.record_fill(quantity, now)?;
        ask.record_fill(quantity, now)?;
        book.fill_sequence += 1;

        let fill = Fill {
            id: FillId::new(),
            resource: book.resource,
            buy_order_id: bid.id,
            sell_order_id: ask.id,
            buyer_city: bid.city_id,
            seller_city: ask.city_id,
            price,
            quantity,
            maker_side,
            sequence: book.fill_sequence,
        };
        (fill, bid.is_filled(), ask.is_filled())
    };

    if bid_done {
        bid_level.get_mut().pop_front();
        book.index.remove(&fill.buy_order_id);
        if bid_level.get().is_empty() {
            bid_level.remove();
        }
    }
    if ask_done {
        ask_level.get_mut().pop_front();
        book.index.remove(&fill.sell_order_id);
        if ask_level.get().is_empty() {
            ask_level.remove();
        }
    }

    Ok(Some(fill))
}
