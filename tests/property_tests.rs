//! Property-based tests for pricing, metadata and code handling.
//!
//! These use proptest to check the arithmetic identities across a wide range of
//! carts and balances.

use proptest::prelude::*;
use rust_decimal_macros::dec;
use storefront_api::entities::inventory_variant::VariantKey;
use storefront_api::payments::SessionMetadata;
use storefront_api::services::catalog::merge_lines;
use storefront_api::services::gift_cards::{mask_code, normalize_code};
use storefront_api::services::pricing::{price_with_balance, CartLine};

fn line_strategy() -> impl Strategy<Value = CartLine> {
    (1i32..50, 1i32..6, 1i32..6, 1i32..10, 0i64..500_000).prop_map(
        |(product, size, color, quantity, price)| {
            CartLine::new(VariantKey::new(product, size, color), quantity, price)
        },
    )
}

fn cart_strategy() -> impl Strategy<Value = Vec<CartLine>> {
    prop::collection::vec(line_strategy(), 1..8)
}

// Property: subtotal == discount + total and the discount never exceeds either side
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn breakdown_always_balances(
        lines in cart_strategy(),
        balance in prop::option::of(0i64..5_000_000),
    ) {
        let breakdown = price_with_balance(&lines, balance).unwrap();
        let expected_subtotal: i64 = lines
            .iter()
            .map(|l| l.unit_price * i64::from(l.quantity))
            .sum();

        prop_assert_eq!(breakdown.subtotal, expected_subtotal);
        prop_assert_eq!(breakdown.subtotal, breakdown.discount + breakdown.total);
        prop_assert!(breakdown.discount >= 0);
        prop_assert!(breakdown.total >= 0);
        prop_assert!(breakdown.discount <= balance.unwrap_or(0));
        prop_assert_eq!(
            breakdown.is_fully_covered(),
            balance.unwrap_or(0) >= expected_subtotal
        );
    }

    #[test]
    fn included_tax_never_exceeds_the_total(
        lines in cart_strategy(),
        balance in prop::option::of(0i64..5_000_000),
    ) {
        let breakdown = price_with_balance(&lines, balance).unwrap();
        let tax = breakdown.included_tax(dec!(0.25));
        prop_assert!(tax >= 0);
        prop_assert!(tax <= breakdown.total);
    }
}

// Property: merging preserves the total quantity per variant
proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn merged_lines_keep_quantities(lines in cart_strategy()) {
        let merged = merge_lines(&lines).unwrap();

        let mut seen = std::collections::HashSet::new();
        for line in &merged {
            prop_assert!(seen.insert(line.variant), "variant merged twice");
            let expected: i32 = lines
                .iter()
                .filter(|l| l.variant == line.variant)
                .map(|l| l.quantity)
                .sum();
            prop_assert_eq!(line.quantity, expected);
        }
        prop_assert!(merged.len() <= lines.len());
    }
}

// Property: metadata written for a session decodes back to the same settlement input
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn session_metadata_survives_the_processor(
        lines in prop::collection::vec(line_strategy(), 1..6),
        discount in 0i64..100_000,
    ) {
        let metadata = SessionMetadata {
            lines,
            customer_id: None,
            gift_card_code: (discount > 0).then(|| "GIFT-PROP-0001".to_string()),
            discount,
            shipping: None,
            customer: None,
        };
        let decoded = SessionMetadata::decode(&metadata.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, metadata);
    }
}

// Property: codes normalize idempotently and masks never leak more than four characters
proptest! {
    #[test]
    fn code_normalization_is_idempotent(raw in "[a-zA-Z0-9-]{4,64}") {
        let once = normalize_code(&raw).unwrap();
        prop_assert_eq!(normalize_code(&once).unwrap(), once.clone());

        let masked = mask_code(&once);
        let visible: String = masked.chars().filter(|c| *c != '*').collect();
        prop_assert!(visible.len() <= 4);
    }
}
