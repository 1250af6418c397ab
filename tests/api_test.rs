//! End-to-end checks through the HTTP router: envelopes, error codes and auth.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::{decimal, response_json, TestApp};
use marketplace_api::auth::ROLE_SELLER;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn shipping_address() -> Value {
    json!({
        "street": "1 Rua Augusta",
        "city": "Lisbon",
        "zipCode": "1100-048",
        "country": "Portugal"
    })
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/shops", None, Some(json!({ "shopName": "Nope" })))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "AUTH_MISSING");

    let response = app
        .request(Method::GET, "/api/v1/orders/mine", Some("not-a-jwt"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "AUTH_INVALID_TOKEN");

    let response = app.request(Method::GET, "/api/v1/nowhere", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shop_creation_and_public_lookup() {
    let app = TestApp::new().await;
    let seller = app.actor(&[ROLE_SELLER]);

    let response = app
        .request(
            Method::POST,
            "/api/v1/shops",
            Some(&seller.token),
            Some(json!({ "shopName": "Corner Store", "location": "Porto" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    let shop_id = body["data"]["id"].as_str().expect("shop id").to_string();
    assert_eq!(body["data"]["shopName"], "Corner Store");

    let response = app
        .request(Method::GET, &format!("/api/v1/shops/{shop_id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["ownerId"], seller.id.to_string());

    let response = app
        .request(Method::GET, "/api/v1/shops/me", Some(&seller.token), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["id"], shop_id.as_str());

    let response = app
        .request(
            Method::POST,
            "/api/v1/shops",
            Some(&seller.token),
            Some(json!({ "shopName": "Second Store" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unverified_sellers_get_a_hint() {
    let app = TestApp::new().await;
    let seller = app.seller("Hint Shop").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(&seller.actor.token),
            Some(json!({
                "title": "Desk",
                "description": "Oak desk",
                "price": "150.00",
                "stock": 2
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(body["code"], "NOT_VERIFIED");
    assert_eq!(body["details"]["verificationStatus"], "unverified");
    assert!(body["hint"].as_str().is_some_and(|h| !h.is_empty()));
}

#[tokio::test]
async fn approve_accepts_an_empty_body() {
    let app = TestApp::new().await;
    let seller = app.seller("Empty Body Shop").await;
    let ctx = app.ctx(&seller.actor).await;
    let submitted = app
        .services()
        .verification
        .submit(&ctx, common::verification_request("Empty Body Shop"))
        .await
        .unwrap();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/verification/{}/approve", submitted.id),
            Some(&seller.actor.token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = app.admin().await;
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/verification/{}/approve", submitted.id),
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["verificationLevel"], "standard");

    let response = app
        .request(Method::GET, "/api/v1/verification/status", Some(&seller.actor.token), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["isVerified"], true);
    assert_eq!(body["data"]["verificationStatus"], "verified");
}

#[tokio::test]
async fn checkout_flow_over_http() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Http Shop").await;
    let buyer = app.buyer().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(&seller.actor.token),
            Some(json!({
                "title": "Kettle",
                "description": "Stovetop kettle",
                "price": "100.00",
                "stock": 4
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let product = response_json(response).await["data"].clone();
    let product_id = product["id"].as_str().unwrap().to_string();
    assert_eq!(product["isActive"], true);

    let now = Utc::now();
    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons",
            Some(&seller.actor.token),
            Some(json!({
                "code": "welcome10",
                "discountType": "percentage",
                "discountValue": "10",
                "startDate": (now - Duration::days(1)).to_rfc3339(),
                "endDate": (now + Duration::days(7)).to_rfc3339()
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let coupon = response_json(response).await["data"].clone();
    assert_eq!(coupon["code"], "WELCOME10");

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(&buyer.token),
            Some(json!({
                "code": " Welcome10 ",
                "shopId": seller.shop.id,
                "productIds": [product_id],
                "totalPrice": "100"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let validation = response_json(response).await["data"].clone();
    assert_eq!(validation["valid"], true);
    assert_eq!(decimal(&validation["discount"]), dec!(10));
    assert_eq!(decimal(&validation["finalPrice"]), dec!(90));

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(&buyer.token),
            Some(json!({
                "code": "NOPE",
                "shopId": seller.shop.id,
                "productIds": [product_id],
                "totalPrice": "100"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(response).await["code"], "COUPON_NOT_FOUND");

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(&buyer.token),
            Some(json!({
                "shopId": seller.shop.id,
                "items": [{ "productId": product_id, "quantity": 1 }],
                "couponCode": "WELCOME10",
                "shippingAddress": shipping_address()
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = response_json(response).await["data"].clone();
    assert_eq!(decimal(&order["originalPrice"]), dec!(100));
    assert_eq!(decimal(&order["discount"]), dec!(10));
    assert_eq!(decimal(&order["totalPrice"]), dec!(90));
    assert_eq!(order["coupon"]["code"], "WELCOME10");
    assert_eq!(order["status"], "pending");
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(&buyer.token),
            Some(json!({ "status": "confirmed" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(&seller.actor.token),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "INVALID_TRANSITION");
    assert_eq!(body["details"]["from"], "pending");
    assert_eq!(body["details"]["to"], "delivered");

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(&seller.actor.token),
            Some(json!({ "status": "teleported" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders/shop?status=pending",
            Some(&seller.actor.token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response_json(response).await["data"].clone();
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["data"][0]["id"], order_id.as_str());

    let response = app
        .request(
            Method::POST,
            "/api/v1/complaints",
            Some(&buyer.token),
            Some(json!({
                "orderId": order_id,
                "type": "late_delivery",
                "title": "Still waiting",
                "description": "No tracking updates for a week."
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let complaint = response_json(response).await["data"].clone();
    assert_eq!(complaint["status"], "new");
    assert_eq!(complaint["type"], "late_delivery");

    let response = app
        .request(
            Method::GET,
            "/api/v1/complaints?status=processed&limit=500",
            Some(&seller.actor.token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response_json(response).await["data"].clone();
    assert_eq!(page["appliedFilter"]["status"], "processed");
    assert_eq!(page["appliedFilter"]["shop"], seller.shop.id.to_string());
    assert_eq!(page["data"].as_array().map(Vec::len), Some(0));
    assert_eq!(page["pagination"]["limit"], 100);

    let response = app
        .request(
            Method::GET,
            "/api/v1/complaints?status=closed",
            Some(&seller.actor.token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn product_reviews_are_public() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Public Reviews").await;
    let product = app.product(&seller, dec!(10), 1).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}/reviews", product.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["stats"]["averageRating"], 0.0);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/shops/{}/products", seller.shop.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/shops/{}/reviews", seller.shop.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn shipping_labels_and_admin_routes_over_http() {
    let app = TestApp::new().await;
    let seller = app.verified_seller("Dispatch").await;
    let product = app.product(&seller, dec!(30), 3).await;
    let buyer = app.buyer().await;
    let placed = app
        .order(&buyer, seller.shop.id, &[(product.id, 1)], None)
        .await;
    let label_uri = format!("/api/v1/shipping/label/{}", placed.order.id);

    let response = app.request(Method::GET, &label_uri, None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, &label_uri, Some(&buyer.token), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::GET, &label_uri, Some(&seller.actor.token), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["orderNumber"], placed.order.order_number.as_str());
    assert_eq!(decimal(&body["data"]["totalPrice"]), dec!(30));
    assert!(body["data"]["trackingNumber"]
        .as_str()
        .expect("tracking number")
        .starts_with("TRK-"));

    let response = app
        .request(Method::GET, "/api/v1/admin/stats", Some(&seller.actor.token), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = app.admin().await;
    let response = app
        .request(Method::GET, "/api/v1/admin/stats", Some(&admin.token), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["verifiedSellers"], 1);

    let response = app
        .request(
            Method::GET,
            "/api/v1/admin/sellers?status=verified",
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["data"][0]["shop"]["shopName"], "Dispatch");

    let response = app
        .request(
            Method::GET,
            "/api/v1/admin/sellers?status=banned",
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_id_is_echoed_into_headers_and_errors() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/orders/mine")
        .header("x-request-id", "req-abc-123")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-abc-123")
    );
    let body = response_json(response).await;
    assert_eq!(body["request_id"], "req-abc-123");
}
