//! Coupon evaluation against stored coupons: preview validation, rejection
//! codes and the guarded redemption counter.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{coupon_request, TestApp};
use marketplace_api::{
    entities::coupon::{self, DiscountType},
    errors::ServiceError,
    services::promotions::{CouponOutcome, CouponRejection, PromotionService, ValidateCouponRequest},
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

fn validate_request(code: &str, shop_id: Uuid, product_ids: Vec<Uuid>, total: rust_decimal::Decimal) -> ValidateCouponRequest {
    ValidateCouponRequest {
        code: code.to_string(),
        shop_id,
        product_ids,
        total_price: total,
    }
}

#[tokio::test]
async fn percentage_coupon_is_capped_by_max_discount() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Cap Shop").await;
    let product = app.product(&seller, dec!(1000), 5).await;

    let mut request = coupon_request("BIG20", DiscountType::Percentage, dec!(20));
    request.max_discount = Some(dec!(50));
    app.coupon(&seller, request).await;

    let result = app
        .services()
        .promotions
        .validate_coupon(validate_request("BIG20", seller.shop.id, vec![product.id], dec!(1000)))
        .await
        .expect("coupon applies");

    assert!(result.valid);
    assert_eq!(result.discount, dec!(50));
    assert_eq!(result.final_price, dec!(950));
    assert_eq!(result.coupon.code, "BIG20");
    assert_eq!(result.coupon.max_discount, Some(dec!(50)));
}

#[tokio::test]
async fn codes_are_matched_case_insensitively() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Case Shop").await;
    let product = app.product(&seller, dec!(100), 5).await;
    app.coupon(&seller, coupon_request("welcome10", DiscountType::Percentage, dec!(10)))
        .await;

    let result = app
        .services()
        .promotions
        .validate_coupon(validate_request(" Welcome10 ", seller.shop.id, vec![product.id], dec!(100)))
        .await
        .expect("coupon applies");

    assert_eq!(result.coupon.code, "WELCOME10");
    assert_eq!(result.discount, dec!(10));
    assert_eq!(result.final_price, dec!(90));
}

#[tokio::test]
async fn validation_does_not_consume_usage() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Preview Shop").await;
    let product = app.product(&seller, dec!(40), 5).await;
    let mut request = coupon_request("ONCE", DiscountType::Fixed, dec!(5));
    request.usage_limit = Some(1);
    let coupon = app.coupon(&seller, request).await;

    for _ in 0..3 {
        app.services()
            .promotions
            .validate_coupon(validate_request("ONCE", seller.shop.id, vec![product.id], dec!(40)))
            .await
            .expect("preview applies");
    }

    let stored = coupon::Entity::find_by_id(coupon.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 0);
}

#[tokio::test]
async fn unknown_code_and_other_shop_code_are_not_found() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Own Shop").await;
    let other = app.verified_seller("Other Shop").await;
    let product = app.product(&seller, dec!(40), 5).await;
    app.coupon(&other, coupon_request("THEIRS", DiscountType::Fixed, dec!(5)))
        .await;

    for code in ["NOPE", "THEIRS"] {
        let err = app
            .services()
            .promotions
            .validate_coupon(validate_request(code, seller.shop.id, vec![product.id], dec!(40)))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Coupon(CouponRejection::NotFound));
    }
}

#[tokio::test]
async fn rejections_carry_their_reason() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Rules Shop").await;
    let product = app.product(&seller, dec!(30), 5).await;
    let other_product = app.product(&seller, dec!(30), 5).await;
    let now = Utc::now();

    let mut expired = coupon_request("EXPIRED", DiscountType::Fixed, dec!(5));
    expired.start_date = now - Duration::days(10);
    expired.end_date = now - Duration::days(1);
    app.coupon(&seller, expired).await;

    let mut future = coupon_request("LATER", DiscountType::Fixed, dec!(5));
    future.start_date = now + Duration::days(2);
    future.end_date = now + Duration::days(9);
    app.coupon(&seller, future).await;

    let mut minimum = coupon_request("MIN50", DiscountType::Fixed, dec!(5));
    minimum.min_purchase = Some(dec!(50));
    app.coupon(&seller, minimum).await;

    let mut scoped = coupon_request("ONLYONE", DiscountType::Fixed, dec!(5));
    scoped.applicable_products = vec![other_product.id];
    app.coupon(&seller, scoped).await;

    let cases = [
        ("EXPIRED", CouponRejection::Expired),
        ("LATER", CouponRejection::NotStarted),
        ("MIN50", CouponRejection::MinPurchaseNotMet(dec!(50))),
        ("ONLYONE", CouponRejection::ProductNotApplicable),
    ];
    for (code, expected) in cases {
        let err = app
            .services()
            .promotions
            .validate_coupon(validate_request(code, seller.shop.id, vec![product.id], dec!(30)))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Coupon(rejection) if rejection == expected, "code {code}");
    }
}

#[tokio::test]
async fn redeem_stops_at_usage_limit() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Limit Shop").await;
    let product = app.product(&seller, dec!(20), 5).await;
    let mut request = coupon_request("TWICE", DiscountType::Fixed, dec!(2));
    request.usage_limit = Some(2);
    let coupon = app.coupon(&seller, request).await;

    assert!(PromotionService::redeem(app.db(), coupon.id).await.unwrap());
    assert!(PromotionService::redeem(app.db(), coupon.id).await.unwrap());
    assert!(!PromotionService::redeem(app.db(), coupon.id).await.unwrap());

    let outcome = PromotionService::evaluate_code(
        app.db(),
        "TWICE",
        seller.shop.id,
        &[product.id],
        dec!(20),
        Utc::now(),
    )
    .await
    .unwrap();
    assert_matches!(outcome, CouponOutcome::Rejected(CouponRejection::UsageLimitReached));

    let stored = coupon::Entity::find_by_id(coupon.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 2);
}

#[tokio::test]
async fn empty_product_list_is_a_validation_error() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Empty Shop").await;

    let err = app
        .services()
        .promotions
        .validate_coupon(validate_request("ANY", seller.shop.id, vec![], dec!(10)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
