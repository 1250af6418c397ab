//! Admin dashboard counters and the seller directory.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use marketplace_api::{errors::ServiceError, services::admin::SellerFilter};
use test_case::test_case;

#[tokio::test]
async fn platform_stats_count_sellers_by_verification() {
    let app = TestApp::new().await;
    app.verified_seller("Verified One").await;
    app.verified_seller("Verified Two").await;
    app.seller("Still Pending").await;
    app.buyer().await;

    let admin = app.admin().await;
    let ctx = app.ctx(&admin).await;
    let stats = app.services().admin.platform_stats(&ctx).await.unwrap();

    assert_eq!(stats.total_sellers, 3);
    assert_eq!(stats.verified_sellers, 2);
    assert_eq!(stats.pending_sellers, 1);
    assert_eq!(stats.total_shops, 3);
    // each verification also registers its approving admin, plus one buyer
    // and the admin asking
    assert!(stats.total_users >= 5);
}

#[test_case(SellerFilter::All, &["Verified", "Pending"] ; "all sellers")]
#[test_case(SellerFilter::Pending, &["Pending"] ; "pending only")]
#[test_case(SellerFilter::Verified, &["Verified"] ; "verified only")]
#[tokio::test]
async fn seller_directory_filters_by_status(filter: SellerFilter, expected: &[&str]) {
    let app = TestApp::new().await;
    app.verified_seller("Verified").await;
    app.seller("Pending").await;
    app.buyer().await;

    let admin = app.admin().await;
    let ctx = app.ctx(&admin).await;
    let (sellers, total) = app
        .services()
        .admin
        .list_sellers(&ctx, filter, 1, 20)
        .await
        .unwrap();

    assert_eq!(total, expected.len() as u64);
    let mut names: Vec<_> = sellers
        .iter()
        .map(|s| s.shop.as_ref().expect("seller shop").shop_name.as_str())
        .collect();
    names.sort_unstable();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn dashboard_is_admin_only() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Curious").await;
    let ctx = app.ctx(&seller.actor).await;

    assert_matches!(
        app.services().admin.platform_stats(&ctx).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.services()
            .admin
            .list_sellers(&ctx, SellerFilter::All, 1, 20)
            .await,
        Err(ServiceError::Forbidden(_))
    );
}
