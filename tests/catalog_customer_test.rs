mod common;

use assert_matches::assert_matches;
use food_ordering_api::{
    auth::Role,
    errors::ServiceError,
    services::{catalog::FoodInput, customers::CustomerInput, orders::NewOrder},
};
use rstest::rstest;
use rust_decimal_macros::dec;

use common::TestApp;

fn food_input(name: &str, category: Option<&str>) -> FoodInput {
    FoodInput {
        name: name.to_string(),
        description: None,
        price: dec!(4.25),
        category: category.map(str::to_string),
        image_url: None,
        is_available: true,
    }
}

fn customer_input(name: &str, email: &str) -> CustomerInput {
    CustomerInput {
        name: name.to_string(),
        email: email.to_string(),
        phone_number: Some("555-0199".to_string()),
        address: None,
    }
}

async fn seed_menu_items(app: &TestApp) {
    let catalog = &app.state.services.catalog;
    for (name, category) in [
        ("Margherita Pizza", Some("Pizza")),
        ("Pepperoni Pizza", Some("Pizza")),
        ("Caesar Salad", Some("Salads")),
        ("Lemonade", Some("Drinks")),
        ("100% Juice", Some("Drinks")),
    ] {
        catalog.create_food(food_input(name, category)).await.unwrap();
    }
}

#[tokio::test]
async fn search_pages_are_ordered_by_id() {
    let app = TestApp::new().await;
    seed_menu_items(&app).await;
    let catalog = &app.state.services.catalog;

    let first = catalog.search_paged(None, 1, 2).await.unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.total_pages, 3);
    let names: Vec<_> = first.items.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["Margherita Pizza", "Pepperoni Pizza"]);

    let last = catalog.search_paged(None, 3, 2).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].name, "100% Juice");

    let ids: Vec<_> = catalog.list_all().await.unwrap().iter().map(|f| f.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[rstest]
#[case("pizza", 2)]
#[case("PIZZA", 2)]
#[case("drinks", 2)]
#[case("salad", 1)]
#[case("   ", 5)]
#[case("sushi", 0)]
#[tokio::test]
async fn insensitive_search_matches_name_or_category(#[case] term: &str, #[case] expected: u64) {
    let app = TestApp::new().await;
    seed_menu_items(&app).await;

    let page = app
        .state
        .services
        .catalog
        .search_paged(Some(term), 1, 20)
        .await
        .unwrap();
    assert_eq!(page.total, expected, "term {term:?}");
}

#[tokio::test]
async fn sensitive_search_respects_case() {
    let app = TestApp::with_config(|cfg| cfg.catalog_search_case_sensitive = true).await;
    seed_menu_items(&app).await;
    let catalog = &app.state.services.catalog;

    assert_eq!(catalog.search_paged(Some("Pizza"), 1, 20).await.unwrap().total, 2);
    assert_eq!(catalog.search_paged(Some("pizza"), 1, 20).await.unwrap().total, 0);
}

#[tokio::test]
async fn wildcards_in_search_terms_are_literal() {
    let app = TestApp::new().await;
    seed_menu_items(&app).await;
    let catalog = &app.state.services.catalog;

    let percent = catalog.search_paged(Some("%"), 1, 20).await.unwrap();
    assert_eq!(percent.total, 1);
    assert_eq!(percent.items[0].name, "100% Juice");
    assert_eq!(catalog.search_paged(Some("_"), 1, 20).await.unwrap().total, 0);
}

#[tokio::test]
async fn food_validation_reports_fields() {
    let app = TestApp::new().await;
    let catalog = &app.state.services.catalog;

    let mut negative = food_input("Water", None);
    negative.price = dec!(-1);
    assert_matches!(
        catalog.create_food(negative).await,
        Err(ServiceError::ValidationError(failure)) if failure.fields.iter().any(|f| f.field == "price")
    );

    let mut fractional = food_input("Water", None);
    fractional.price = dec!(1.005);
    assert_matches!(
        catalog.create_food(fractional).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut priceless = food_input("Water", None);
    priceless.price = dec!(100000000000000000000.00);
    assert_matches!(
        catalog.create_food(priceless).await,
        Err(ServiceError::ValidationError(failure)) if failure.fields.iter().any(|f| f.field == "price")
    );

    assert_matches!(
        catalog.create_food(food_input("   ", None)).await,
        Err(ServiceError::ValidationError(failure)) if failure.fields.iter().any(|f| f.field == "name")
    );
    assert_eq!(catalog.count_foods().await.unwrap(), 0);
}

#[tokio::test]
async fn referenced_food_cannot_be_deleted() {
    let app = TestApp::new().await;
    let owner = app.account("eater@example.com", &[Role::Customer]).await;
    let burger = app.food("Burger", "10.00").await;
    let spare = app.food("Spare", "1.00").await;
    let orders = &app.state.services.orders;
    let order = orders
        .create_order(NewOrder {
            owner_id: owner.id,
            customer_id: None,
            delivery_address: None,
            contact_number: None,
        })
        .await
        .unwrap();
    orders.add_line(order.id, burger.id, 1).await.unwrap();

    let catalog = &app.state.services.catalog;
    assert_matches!(catalog.delete_food(burger.id).await, Err(ServiceError::Conflict(_)));
    assert!(catalog.exists(burger.id).await.unwrap());

    catalog.delete_food(spare.id).await.unwrap();
    assert!(!catalog.exists(spare.id).await.unwrap());
    assert_matches!(catalog.delete_food(spare.id).await, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_customer_email_leaves_count_unchanged() {
    let app = TestApp::new().await;
    let customers = &app.state.services.customers;

    customers
        .create_customer(customer_input("Ana Lima", "ana@example.com"))
        .await
        .unwrap();
    let before = customers.count_customers().await.unwrap();

    assert_matches!(
        customers
            .create_customer(customer_input("Another Ana", "ANA@example.com"))
            .await,
        Err(ServiceError::ValidationError(failure)) if failure.fields[0].field == "email"
    );
    assert_eq!(customers.count_customers().await.unwrap(), before);
}

#[tokio::test]
async fn customer_update_keeps_its_own_email_and_rejects_others() {
    let app = TestApp::new().await;
    let customers = &app.state.services.customers;
    let ana = customers
        .create_customer(customer_input("Ana Lima", "ana@example.com"))
        .await
        .unwrap();
    customers
        .create_customer(customer_input("Bruno Costa", "bruno@example.com"))
        .await
        .unwrap();

    let renamed = customers
        .update_customer(ana.id, customer_input("Ana L.", "ana@example.com"))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Ana L.");

    assert_matches!(
        customers
            .update_customer(ana.id, customer_input("Ana", "bruno@example.com"))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        customers
            .update_customer(ana.id + 100, customer_input("Ghost", "ghost@example.com"))
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn customer_search_ignores_case() {
    let app = TestApp::new().await;
    let customers = &app.state.services.customers;
    for (name, email) in [
        ("Zoe Park", "zoe@example.com"),
        ("Ana Lima", "ana@example.com"),
        ("Bruno Costa", "bruno@sample.org"),
    ] {
        customers.create_customer(customer_input(name, email)).await.unwrap();
    }

    let everyone = customers.search(None, 1, 10).await.unwrap();
    let names: Vec<_> = everyone.items.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Ana Lima", "Bruno Costa", "Zoe Park"]);

    let example = customers.search(Some("EXAMPLE"), 1, 10).await.unwrap();
    assert_eq!(example.total, 2);
    let bruno = customers.search(Some("bruno"), 1, 10).await.unwrap();
    assert_eq!(bruno.total, 1);
}

#[tokio::test]
async fn deleting_customer_detaches_orders_and_accounts() {
    let app = TestApp::new().await;
    let owner = app.account("owner@example.com", &[Role::Customer]).await;
    let customers = &app.state.services.customers;
    let orders = &app.state.services.orders;

    let customer = customers
        .create_customer(customer_input("Ana Lima", "ana@example.com"))
        .await
        .unwrap();
    app.state
        .services
        .accounts
        .link_customer(owner.id, Some(customer.id))
        .await
        .unwrap();
    for _ in 0..2 {
        orders
            .create_order(NewOrder {
                owner_id: owner.id,
                customer_id: Some(customer.id),
                delivery_address: None,
                contact_number: None,
            })
            .await
            .unwrap();
    }

    let with_orders = customers.get_with_orders(customer.id).await.unwrap();
    assert_eq!(with_orders.orders.len(), 2);

    assert_eq!(customers.delete_customer(customer.id).await.unwrap(), 2);
    assert_matches!(
        customers.get_customer(customer.id).await,
        Err(ServiceError::NotFound(_))
    );

    let remaining = orders.list_orders_for_owner(owner.id, 1, 10).await.unwrap();
    assert_eq!(remaining.total, 2);
    assert!(remaining.items.iter().all(|o| o.customer_id.is_none()));
    let account = app.state.services.accounts.get_account(owner.id).await.unwrap();
    assert_eq!(account.customer_id, None);
}
