//! Property-based tests for the discount arithmetic.
//!
//! These use proptest to check the pricing invariants across a wide range of
//! totals, coupon values and caps.

use chrono::{Duration, Utc};
use marketplace_api::{
    entities::coupon::{self, DiscountType},
    services::{
        promotions::{compute_discount, evaluate, normalize_code},
        reviews::average_rating,
    },
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|basis| Decimal::new(basis, 2))
}

fn discount_type_strategy() -> impl Strategy<Value = DiscountType> {
    prop_oneof![Just(DiscountType::Percentage), Just(DiscountType::Fixed)]
}

fn open_coupon(discount_type: DiscountType, value: Decimal, cap: Option<Decimal>) -> coupon::Model {
    let now = Utc::now();
    coupon::Model {
        id: Uuid::new_v4(),
        shop_id: Uuid::new_v4(),
        code: "PROP".to_string(),
        description: None,
        discount_type,
        discount_value: value,
        min_purchase: Decimal::ZERO,
        max_discount: cap,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(1),
        usage_limit: None,
        used_count: 0,
        applicable_products: json!([]),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// Property: a discount never exceeds the total and is never negative
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn discount_is_bounded_by_total(
        discount_type in discount_type_strategy(),
        value in money_strategy(),
        total in money_strategy(),
    ) {
        let discount = compute_discount(discount_type, value, None, total);
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= total, "discount {} exceeds total {}", discount, total);
    }

    #[test]
    fn percentage_cap_is_respected(
        pct in percentage_strategy(),
        cap in money_strategy(),
        total in money_strategy(),
    ) {
        let discount = compute_discount(DiscountType::Percentage, pct, Some(cap), total);
        prop_assert!(discount <= cap, "discount {} exceeds cap {}", discount, cap);
        prop_assert!(discount.scale() <= 2);
    }

    #[test]
    fn fixed_discount_ignores_the_cap(value in money_strategy(), cap in money_strategy()) {
        let total = value + Decimal::ONE;
        let discount = compute_discount(DiscountType::Fixed, value, Some(cap), total);
        prop_assert_eq!(discount, value);
    }
}

// Property: evaluation keeps final price and discount consistent
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn final_price_plus_discount_is_the_total(
        discount_type in discount_type_strategy(),
        value in percentage_strategy(),
        cap in proptest::option::of(money_strategy()),
        total in money_strategy(),
    ) {
        let coupon = open_coupon(discount_type, value, cap);
        let evaluation = evaluate(&coupon, &[], total, Utc::now()).expect("open coupon applies");
        prop_assert_eq!(evaluation.final_price + evaluation.discount, total);
        prop_assert!(evaluation.final_price >= Decimal::ZERO);
    }
}

// Property: codes normalize idempotently
proptest! {
    #[test]
    fn normalizing_twice_changes_nothing(code in "[ a-zA-Z0-9_-]{0,40}") {
        let once = normalize_code(&code);
        prop_assert_eq!(normalize_code(&once), once.clone());
        prop_assert_eq!(once.trim(), once.as_str());
    }

    #[test]
    fn average_rating_stays_in_range(ratings in proptest::collection::vec(1i16..=5, 1..50)) {
        let avg = average_rating(&ratings);
        prop_assert!((1.0..=5.0).contains(&avg), "average {} out of range", avg);
    }
}
