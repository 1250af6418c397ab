//! Reviews keep product and shop ratings in step; stock drives availability.

mod common;

use assert_matches::assert_matches;
use common::{Actor, Seller, TestApp};
use marketplace_api::{
    entities::{product, review, shop},
    errors::ServiceError,
    services::reviews::{
        CreateReviewRequest, HelpfulVote, RespondToReviewRequest, UpdateReviewRequest,
    },
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

fn review_request(product_id: Uuid, order_id: Uuid, rating: i16) -> CreateReviewRequest {
    CreateReviewRequest {
        product_id,
        order_id,
        rating,
        comment: "Solid purchase".to_string(),
        images: vec![],
    }
}

/// Places and delivers an order for one unit of `product_id`.
async fn delivered_order(app: &TestApp, seller: &Seller, buyer: &Actor, product_id: Uuid) -> Uuid {
    let order = app
        .order(buyer, seller.shop.id, &[(product_id, 1)], None)
        .await;
    app.deliver(seller, order.order.id).await;
    order.order.id
}

async fn product_rating(app: &TestApp, id: Uuid) -> f64 {
    product::Entity::find_by_id(id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap()
        .rating
}

async fn shop_rating(app: &TestApp, id: Uuid) -> f64 {
    shop::Entity::find_by_id(id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap()
        .rating
}

#[tokio::test]
async fn only_delivered_orders_can_be_reviewed() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Review Shop").await;
    let product = app.product(&seller, dec!(20), 10).await;
    let buyer = app.buyer().await;
    let ctx = app.ctx(&buyer).await;

    let pending = app
        .order(&buyer, seller.shop.id, &[(product.id, 1)], None)
        .await;
    let err = app
        .services()
        .reviews
        .create_review(&ctx, review_request(product.id, pending.order.id, 5))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let order_id = delivered_order(&app, &seller, &buyer, product.id).await;
    let other_product = app.product(&seller, dec!(5), 10).await;
    let err = app
        .services()
        .reviews
        .create_review(&ctx, review_request(other_product.id, order_id, 5))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let stranger = app.buyer().await;
    let stranger_ctx = app.ctx(&stranger).await;
    let err = app
        .services()
        .reviews
        .create_review(&stranger_ctx, review_request(product.id, order_id, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    app.services()
        .reviews
        .create_review(&ctx, review_request(product.id, order_id, 5))
        .await
        .expect("review of a delivered order");
    let err = app
        .services()
        .reviews
        .create_review(&ctx, review_request(product.id, order_id, 4))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn ratings_follow_every_review_change() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Average Shop").await;
    let lamp = app.product(&seller, dec!(20), 10).await;
    let chair = app.product(&seller, dec!(80), 10).await;
    let alice = app.buyer().await;
    let bob = app.buyer().await;

    let alice_order = delivered_order(&app, &seller, &alice, lamp.id).await;
    let bob_order = delivered_order(&app, &seller, &bob, lamp.id).await;
    let chair_order = delivered_order(&app, &seller, &alice, chair.id).await;
    let alice_ctx = app.ctx(&alice).await;
    let bob_ctx = app.ctx(&bob).await;

    app.services()
        .reviews
        .create_review(&alice_ctx, review_request(lamp.id, alice_order, 5))
        .await
        .unwrap();
    let bob_review = app
        .services()
        .reviews
        .create_review(&bob_ctx, review_request(lamp.id, bob_order, 4))
        .await
        .unwrap();
    assert_eq!(product_rating(&app, lamp.id).await, 4.5);
    assert_eq!(shop_rating(&app, seller.shop.id).await, 4.5);

    let chair_review = app
        .services()
        .reviews
        .create_review(&alice_ctx, review_request(chair.id, chair_order, 4))
        .await
        .unwrap();
    assert_eq!(product_rating(&app, chair.id).await, 4.0);
    // (5 + 4 + 4) / 3 rounds to one decimal
    assert_eq!(shop_rating(&app, seller.shop.id).await, 4.3);

    app.services()
        .reviews
        .update_review(
            &bob_ctx,
            bob_review.id,
            UpdateReviewRequest {
                rating: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(product_rating(&app, lamp.id).await, 3.5);
    assert_eq!(shop_rating(&app, seller.shop.id).await, 3.7);

    let err = app
        .services()
        .reviews
        .delete_review(&bob_ctx, chair_review.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    app.services()
        .reviews
        .delete_review(&alice_ctx, chair_review.id)
        .await
        .unwrap();
    assert_eq!(product_rating(&app, chair.id).await, 0.0);
    assert_eq!(shop_rating(&app, seller.shop.id).await, 3.5);

    let listing = app
        .services()
        .reviews
        .list_product_reviews(lamp.id, 1, 10)
        .await
        .unwrap();
    assert_eq!(listing.total, 2);
    assert_eq!(listing.stats.average_rating, 3.5);
    assert_eq!(listing.stats.distribution, [0, 1, 0, 0, 1]);
}

#[tokio::test]
async fn deleting_a_product_drops_its_reviews_from_the_shop_rating() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Cascade Shop").await;
    let kept = app.product(&seller, dec!(10), 10).await;
    let removed = app.product(&seller, dec!(10), 10).await;
    let buyer = app.buyer().await;
    let ctx = app.ctx(&buyer).await;

    let kept_order = delivered_order(&app, &seller, &buyer, kept.id).await;
    let removed_order = delivered_order(&app, &seller, &buyer, removed.id).await;
    app.services()
        .reviews
        .create_review(&ctx, review_request(kept.id, kept_order, 5))
        .await
        .unwrap();
    app.services()
        .reviews
        .create_review(&ctx, review_request(removed.id, removed_order, 1))
        .await
        .unwrap();
    assert_eq!(shop_rating(&app, seller.shop.id).await, 3.0);

    let seller_ctx = app.ctx(&seller.actor).await;
    app.services()
        .products
        .delete_product(&seller_ctx, removed.id)
        .await
        .unwrap();
    assert_eq!(shop_rating(&app, seller.shop.id).await, 5.0);

    let stored = shop::Entity::find_by_id(seller.shop.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_products, 1);
}

#[tokio::test]
async fn only_the_shop_owner_responds() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Reply Shop").await;
    let other = app.verified_seller("Nosy Shop").await;
    let product = app.product(&seller, dec!(10), 10).await;
    let buyer = app.buyer().await;
    let order_id = delivered_order(&app, &seller, &buyer, product.id).await;
    let ctx = app.ctx(&buyer).await;
    let review = app
        .services()
        .reviews
        .create_review(&ctx, review_request(product.id, order_id, 3))
        .await
        .unwrap();

    let response = RespondToReviewRequest {
        response: "  Thanks, we are improving packaging.  ".to_string(),
    };
    let other_ctx = app.ctx(&other.actor).await;
    let err = app
        .services()
        .reviews
        .respond_to_review(&other_ctx, review.id, response.clone())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let seller_ctx = app.ctx(&seller.actor).await;
    let answered = app
        .services()
        .reviews
        .respond_to_review(&seller_ctx, review.id, response)
        .await
        .unwrap();
    assert_eq!(
        answered.seller_response.as_deref(),
        Some("Thanks, we are improving packaging.")
    );
    assert!(answered.responded_at.is_some());
}

#[tokio::test]
async fn stock_adjustments_toggle_availability() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Stock Toggle Shop").await;
    let product = app.product(&seller, dec!(10), 2).await;
    let ctx = app.ctx(&seller.actor).await;

    let drained = app
        .services()
        .products
        .adjust_stock(&ctx, product.id, -2)
        .await
        .unwrap();
    assert_eq!(drained.stock, 0);
    assert!(!drained.is_active);

    let err = app
        .services()
        .products
        .adjust_stock(&ctx, product.id, -1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let restocked = app
        .services()
        .products
        .adjust_stock(&ctx, product.id, 5)
        .await
        .unwrap();
    assert_eq!(restocked.stock, 5);
    assert!(restocked.is_active);

    let buyer = app.buyer().await;
    let buyer_ctx = app.ctx(&buyer).await;
    let err = app
        .services()
        .products
        .adjust_stock(&buyer_ctx, product.id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn helpful_votes_toggle_per_user() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Helpful Shop").await;
    let lamp = app.product(&seller, dec!(20), 10).await;
    let author = app.buyer().await;
    let order_id = delivered_order(&app, &seller, &author, lamp.id).await;
    let author_ctx = app.ctx(&author).await;
    let review = app
        .services()
        .reviews
        .create_review(&author_ctx, review_request(lamp.id, order_id, 5))
        .await
        .unwrap();
    assert_eq!(review.helpful_votes, 0);

    let reader = app.buyer().await;
    let reader_ctx = app.ctx(&reader).await;
    let other = app.buyer().await;
    let other_ctx = app.ctx(&other).await;
    let reviews = &app.services().reviews;

    let first = reviews.vote_review(&reader_ctx, review.id).await.unwrap();
    assert_eq!(first, HelpfulVote { helpful_votes: 1, has_voted: true });
    let second = reviews.vote_review(&other_ctx, review.id).await.unwrap();
    assert_eq!(second, HelpfulVote { helpful_votes: 2, has_voted: true });

    // voting again withdraws the vote
    let withdrawn = reviews.vote_review(&reader_ctx, review.id).await.unwrap();
    assert_eq!(withdrawn, HelpfulVote { helpful_votes: 1, has_voted: false });

    let stored = review::Entity::find_by_id(review.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.helpful_votes, 1);

    assert_matches!(
        reviews.vote_review(&reader_ctx, Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn reviews_list_by_shop_and_by_author() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Listed Shop").await;
    let other_seller = app.verified_seller("Elsewhere").await;
    let lamp = app.product(&seller, dec!(20), 10).await;
    let chair = app.product(&seller, dec!(60), 10).await;
    let mug = app.product(&other_seller, dec!(8), 10).await;
    let alice = app.buyer().await;
    let bob = app.buyer().await;
    let alice_ctx = app.ctx(&alice).await;
    let bob_ctx = app.ctx(&bob).await;

    for (ctx, buyer, shop, product, rating) in [
        (&alice_ctx, &alice, &seller, lamp.id, 5),
        (&alice_ctx, &alice, &other_seller, mug.id, 3),
        (&bob_ctx, &bob, &seller, chair.id, 4),
    ] {
        let order_id = delivered_order(&app, shop, buyer, product).await;
        app.services()
            .reviews
            .create_review(ctx, review_request(product, order_id, rating))
            .await
            .unwrap();
    }

    let (shop_reviews, shop_total) = app
        .services()
        .reviews
        .list_shop_reviews(seller.shop.id, 1, 10)
        .await
        .unwrap();
    assert_eq!(shop_total, 2);
    assert!(shop_reviews.iter().all(|r| r.shop_id == seller.shop.id));

    let (mine, my_total) = app
        .services()
        .reviews
        .list_my_reviews(&alice_ctx, 1, 10)
        .await
        .unwrap();
    assert_eq!(my_total, 2);
    assert!(mine.iter().all(|r| r.buyer_id == alice.id));

    let (first_page, total) = app
        .services()
        .reviews
        .list_my_reviews(&alice_ctx, 1, 1)
        .await
        .unwrap();
    assert_eq!((first_page.len(), total), (1, 2));
}
