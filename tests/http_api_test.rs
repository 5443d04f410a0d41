mod common;

use axum::http::{Method, StatusCode};
use food_ordering_api::auth::Role;
use rust_decimal_macros::dec;
use serde_json::json;

use common::{decimal, TestApp};

#[tokio::test]
async fn health_and_catalog_are_public() {
    let app = TestApp::new().await;
    app.food("Burger", "10.00").await;

    let (status, body) = app.get("/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"]["status"], "up");

    let (status, body) = app.get("/api/v1/foods?search=burg", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Burger");
    assert!(body["meta"]["request_id"].is_string());

    let (status, _) = app.get("/api/v1/foods/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_writes_require_admin() {
    let app = TestApp::new().await;
    let (_, customer) = app.login("shopper@example.com", &[Role::Customer]).await;
    let (_, admin) = app.login("admin@example.com", &[Role::Admin]).await;
    let payload = json!({ "name": "Tacos", "price": "7.50", "category": "Mexican" });

    let (status, body) = app
        .request(Method::POST, "/api/v1/foods", Some(payload.clone()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_MISSING");

    let (status, _) = app
        .request(Method::POST, "/api/v1/foods", Some(payload.clone()), Some(&customer))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::POST, "/api/v1/foods", Some(payload), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["data"]["price"]), dec!(7.50));
    assert_eq!(body["data"]["is_available"], true);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/foods",
            Some(json!({ "name": "", "price": "1.00" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "name");
}

#[tokio::test]
async fn bad_tokens_are_rejected_before_handlers_run() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/v1/foods", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_INVALID_TOKEN");

    // A well-formed token for an account that was never provisioned.
    let ghost = food_ordering_api::auth::user::Model {
        id: uuid::Uuid::new_v4(),
        email: "ghost@example.com".into(),
        first_name: None,
        last_name: None,
        phone_number: None,
        address: None,
        customer_id: None,
        is_active: true,
        created_at: chrono::Utc::now(),
        updated_at: None,
    };
    let token = app.token_for(&ghost);
    let (status, body) = app.get("/api/v1/dashboard", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_USER_NOT_FOUND");
}

#[tokio::test]
async fn order_flow_over_http_keeps_total_in_sync() {
    let app = TestApp::new().await;
    let (_, token) = app.login("owner@example.com", &[Role::Customer]).await;
    let burger = app.food("Burger", "10.00").await;
    let fries = app.food("Fries", "5.50").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "delivery_address": "12 Harbour Street" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "Pending");
    let order_id = body["data"]["id"].as_i64().unwrap();

    let (status, first) = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/lines"),
            Some(json!({ "food_id": burger.id, "quantity": 3 })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let first_line = first["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/lines"),
            Some(json!({ "food_id": fries.id, "quantity": 2 })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.get(&format!("/api/v1/orders/{order_id}"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(41.00));
    assert_eq!(body["data"]["lines"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .request(
            Method::DELETE,
            &format!("/api/v1/order-lines/{first_line}"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(11.00));

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/lines"),
            Some(json!({ "food_id": burger.id, "quantity": 0 })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "quantity");

    let (status, body) = app.get("/api/v1/orders/mine", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn customers_cannot_touch_other_orders() {
    let app = TestApp::new().await;
    let (alice, alice_token) = app.login("alice@example.com", &[Role::Customer]).await;
    let (_, bob_token) = app.login("bob@example.com", &[Role::Customer]).await;
    let (_, staff_token) = app.login("staff@example.com", &[Role::Staff]).await;
    let burger = app.food("Burger", "10.00").await;

    let (_, body) = app
        .request(Method::POST, "/api/v1/orders", Some(json!({})), Some(&alice_token))
        .await;
    let order_id = body["data"]["id"].as_i64().unwrap();
    let (_, line) = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/lines"),
            Some(json!({ "food_id": burger.id, "quantity": 1 })),
            Some(&alice_token),
        )
        .await;
    let line_id = line["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .get(&format!("/api/v1/orders/{order_id}"), Some(&bob_token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/lines"),
            Some(json!({ "food_id": burger.id, "quantity": 5 })),
            Some(&bob_token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/v1/order-lines/{line_id}"),
            None,
            Some(&bob_token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Nothing changed for the owner.
    let (_, body) = app
        .get(&format!("/api/v1/orders/{order_id}"), Some(&alice_token))
        .await;
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(10.00));

    // Customers cannot open orders for somebody else; staff can.
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "owner_id": alice.id })),
            Some(&bob_token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "owner_id": alice.id })),
            Some(&staff_token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user_id"], alice.id.to_string());

    let (status, body) = app
        .get(&format!("/api/v1/orders/{order_id}"), Some(&staff_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["owner_email"], "alice@example.com");
}

#[tokio::test]
async fn order_administration_is_role_gated() {
    let app = TestApp::new().await;
    let (_, customer) = app.login("shopper@example.com", &[Role::Customer]).await;
    let (_, staff) = app.login("staff@example.com", &[Role::Staff]).await;
    let (_, manager) = app.login("manager@example.com", &[Role::Manager]).await;
    let burger = app.food("Burger", "10.00").await;

    let (_, body) = app
        .request(Method::POST, "/api/v1/orders", Some(json!({})), Some(&customer))
        .await;
    let order_id = body["data"]["id"].as_i64().unwrap();
    app.request(
        Method::POST,
        &format!("/api/v1/orders/{order_id}/lines"),
        Some(json!({ "food_id": burger.id, "quantity": 2 })),
        Some(&customer),
    )
    .await;

    let (status, _) = app.get("/api/v1/orders", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.get("/api/v1/orders?status=Pending", Some(&staff)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let status_uri = format!("/api/v1/orders/{order_id}/status");
    let (status, _) = app
        .request(
            Method::PUT,
            &status_uri,
            Some(json!({ "status": "Delivered" })),
            Some(&customer),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .request(
            Method::PUT,
            &status_uri,
            Some(json!({ "status": "OutForDelivery" })),
            Some(&staff),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "OutForDelivery");

    let order_uri = format!("/api/v1/orders/{order_id}");
    let (status, _) = app
        .request(Method::DELETE, &order_uri, None, Some(&staff))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .request(Method::DELETE, &order_uri, None, Some(&manager))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["lines_removed"], 1);

    let (status, _) = app.get(&order_uri, Some(&manager)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn customer_records_are_for_managers() {
    let app = TestApp::new().await;
    let (_, staff) = app.login("staff@example.com", &[Role::Staff]).await;
    let (_, manager) = app.login("manager@example.com", &[Role::Manager]).await;
    let payload = json!({ "name": "Ana Lima", "email": "ana@example.com" });

    let (status, _) = app
        .request(Method::POST, "/api/v1/customers", Some(payload.clone()), Some(&staff))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::POST, "/api/v1/customers", Some(payload.clone()), Some(&manager))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let customer_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app
        .request(Method::POST, "/api/v1/customers", Some(payload), Some(&manager))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "email");

    let (status, body) = app
        .get(&format!("/api/v1/customers/{customer_id}"), Some(&manager))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ana@example.com");
    assert_eq!(body["data"]["orders"], json!([]));

    let (status, body) = app
        .request(
            Method::DELETE,
            &format!("/api/v1/customers/{customer_id}"),
            None,
            Some(&manager),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["detached_orders"], 0);
}

#[tokio::test]
async fn dashboard_and_menus_follow_the_caller() {
    let app = TestApp::new().await;
    let (_, both) = app
        .login("both@example.com", &[Role::Admin, Role::Customer])
        .await;
    let (shopper, shopper_token) = app.login("shopper@example.com", &[Role::Customer]).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/menus",
            Some(json!({ "name": "Orders", "display_order": 2 })),
            Some(&both),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let orders_menu = body["data"]["id"].as_i64().unwrap();
    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/menus",
            Some(json!({ "name": "Dashboard", "display_order": 1 })),
            Some(&both),
        )
        .await;
    let dashboard_menu = body["data"]["id"].as_i64().unwrap();

    for menu_id in [orders_menu, dashboard_menu] {
        let (status, body) = app
            .request(
                Method::POST,
                &format!("/api/v1/menus/{menu_id}/grants"),
                Some(json!({ "user_id": shopper.id })),
                Some(&both),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["assigned_by"], "both@example.com");
    }

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/menus",
            Some(json!({ "name": "Sneaky" })),
            Some(&shopper_token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/v1/menus/mine", Some(&shopper_token)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Dashboard", "Orders"]);

    let (status, body) = app.get("/api/v1/dashboard", Some(&both)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["view"], "Admin");
    assert!(body["data"]["total_users"].is_number());

    let (_, body) = app.get("/api/v1/dashboard", Some(&shopper_token)).await;
    assert_eq!(body["data"]["view"], "Customer");
    assert_eq!(body["data"]["menus"].as_array().unwrap().len(), 2);
    assert!(body["data"].get("total_revenue").is_none());

    let (status, _) = app.get("/api/v1/dashboard", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_are_reread_on_every_request() {
    let app = TestApp::new().await;
    let (_, admin) = app.login("admin@example.com", &[Role::Admin]).await;
    let (staff, staff_token) = app.login("staff@example.com", &[Role::Staff]).await;

    let (status, _) = app.get("/api/v1/orders", Some(&staff_token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/v1/accounts/{}/roles/staff", staff.id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get("/api/v1/orders", Some(&staff_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/accounts/{}/roles", staff.id),
            Some(json!({ "role": "Manager" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role_name"], "Manager");

    let (status, body) = app
        .get(&format!("/api/v1/accounts/{}", staff.id), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["roles"], json!(["Manager"]));

    let (status, _) = app.get("/api/v1/orders", Some(&staff_token)).await;
    assert_eq!(status, StatusCode::OK);
}
