//! Determinism verification for the matcher.
//!
//! Replaying the same insertions into a fresh book must produce the same
//! fills. The `fill_root` is a SHA-256 over the economically relevant
//! fields of every fill, so two runs can be compared without diffing full
//! payloads. Fill ids are random and deliberately left out.

use bourse_types::Fill;
use sha2::{Digest, Sha256};

/// Compute the root hash over an ordered list of fills.
#[must_use]
pub fn compute_fill_root(fills: &[Fill]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"bourse:fill_root:v1:");
    hasher.update((fills.len() as u64).to_le_bytes());

    for fill in fills {
        hasher.update(fill.sequence.to_le_bytes());
        hasher.update(fill.resource.code().as_bytes());
        hasher.update(fill.buy_order_id.0.as_bytes());
        hasher.update(fill.sell_order_id.0.as_bytes());
        hasher.update(fill.buyer_city.0.to_le_bytes());
        hasher.update(fill.seller_city.0.to_le_bytes());
        hasher.update(fill.price.normalize().to_string().as_bytes());
        hasher.update(fill.quantity.to_le_bytes());
    }

    hasher.finalize().into()
}

/// Hex form of [`compute_fill_root`], for logs.
#[must_use]
pub fn fill_root_hex(fills: &[Fill]) -> String {
    hex::encode(compute_fill_root(fills))
}

#[must_use]
pub fn verify_fill_root(fills: &[Fill], expected_root: &[u8; 32]) -> bool {
    compute_fill_root(fills) == *expected_root
}

#[cfg(test)]
mod tests {
    use bourse_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn make_fill(sequence: u64) -> Fill {
        Fill {
            id: FillId::new(),
            resource: ResourceCode::Wood,
            buy_order_id: OrderId::from_bytes([1; 16]),
            sell_order_id: OrderId::from_bytes([2; 16]),
            buyer_city: CityId(2),
            seller_city: CityId(1),
            price: Decimal::new(5, 0),
            quantity: 10,
            maker_side: OrderSide::Sell,
            sequence,
        }
    }

    #[test]
    fn same_fills_same_root() {
        let a = vec![make_fill(1), make_fill(2)];
        let b = vec![make_fill(1), make_fill(2)];
        assert_eq!(compute_fill_root(&a), compute_fill_root(&b));
    }

    #[test]
    fn order_matters() {
        let root_ab = compute_fill_root(&[make_fill(1), make_fill(2)]);
        let root_ba = compute_fill_root(&[make_fill(2), make_fill(1)]);
        assert_ne!(root_ab, root_ba);
    }

    #[test]
    fn price_scale_does_not_matter() {
        let mut scaled = make_fill(1);
        scaled.price = Decimal::new(500, 2);
        assert_eq!(compute_fill_root(&[make_fill(1)]), compute_fill_root(&[scaled]));
    }

    #[test]
    fn verify_roots() {
        let fills = vec![make_fill(1)];
        let root = compute_fill_root(&fills);
        assert!(verify_fill_root(&fills, &root));
        assert!(!verify_fill_root(&fills, &[0xAB; 32]));
        assert_eq!(fill_root_hex(&fills).len(), 64);
    }
}
