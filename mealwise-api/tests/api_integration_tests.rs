//! Integration tests for the mealwise-api HTTP surface
//!
//! Auth, profile, recipe CRUD and meal plan endpoints, driven through the
//! real router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::http::StatusCode;
use helpers::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::without_model().await;

    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mealwise-api");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["git_hash"].is_string());
    assert_eq!(body["llm_configured"], false);
}

#[tokio::test]
async fn test_register_login_logout() {
    let app = TestApp::without_model().await;
    let token = app.register("Cook@Example.com").await;

    let (status, me) = app.send("GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "cook@example.com");
    assert_eq!(me["household_size"], 2);

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "cook@example.com", "password": "correct horse battery"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second = body["token"].as_str().unwrap().to_string();
    assert_ne!(second, token);
    assert_eq!(body["user"]["id"], me["id"]);

    let (status, _) = app.send("POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.send("GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Other sessions survive
    let (status, _) = app.send("GET", "/api/users/me", Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::without_model().await;
    app.register("cook@example.com").await;

    let (status, wrong_password) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "cook@example.com", "password": "not the password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password["error"]["code"], "INVALID_CREDENTIALS");

    let (status, unknown_user) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "nobody@example.com", "password": "not the password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user, wrong_password);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let app = TestApp::without_model().await;
    app.register("cook@example.com").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "COOK@example.com", "password": "another password", "display_name": "Twin"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "new@example.com", "password": "short", "display_name": "New"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "new@example.com", "password": "long enough", "display_name": "New", "admin": true})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::without_model().await;

    for (method, uri) in [
        ("GET", "/api/users/me"),
        ("GET", "/api/recipes"),
        ("GET", "/api/meal-plan?from=2024-01-01&to=2024-01-07"),
        ("GET", "/api/chat/conversations"),
        ("POST", "/api/auth/logout"),
    ] {
        let (status, _) = app.send(method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        let (status, _) = app.send(method, uri, Some("not-a-real-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_update_profile() {
    let app = TestApp::without_model().await;
    let token = app.register("cook@example.com").await;

    let (status, body) = app
        .send(
            "PATCH",
            "/api/users/me",
            Some(&token),
            Some(json!({
                "household_size": 3,
                "dietary_preferences": ["Vegetarian", "nut-free"],
                "timezone": "Europe/Berlin"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["household_size"], 3);
    assert_eq!(body["dietary_preferences"], json!(["vegetarian", "nut-free"]));
    assert_eq!(body["timezone"], "Europe/Berlin");
    assert_eq!(body["display_name"], "Test Cook");

    let (status, body) = app
        .send("PATCH", "/api/users/me", Some(&token), Some(json!({"household_size": 0})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_recipe_crud() {
    let app = TestApp::without_model().await;
    let token = app.register("cook@example.com").await;

    let created = app.create_recipe(&token, "Weeknight Chili", &["Dinner", "spicy"]).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["ingredients"].as_array().unwrap().len(), 2);
    assert_eq!(created["tags"], json!(["dinner", "spicy"]));

    let (status, fetched) = app.send("GET", &format!("/api/recipes/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Weeknight Chili");
    assert_eq!(fetched["ingredients"][1]["unit"], "tbsp");

    let (status, replaced) = app
        .send(
            "PUT",
            &format!("/api/recipes/{}", id),
            Some(&token),
            Some(json!({
                "title": "Weekend Chili",
                "ingredients": [{"name": "beans", "quantity": 400, "unit": "g"}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["title"], "Weekend Chili");
    assert_eq!(replaced["ingredients"].as_array().unwrap().len(), 1);
    assert_eq!(replaced["tags"], json!([]));

    let (status, _) = app.send("DELETE", &format!("/api/recipes/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.send("GET", &format!("/api/recipes/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_recipe_validation() {
    let app = TestApp::without_model().await;
    let token = app.register("cook@example.com").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/recipes",
            Some(&token),
            Some(json!({"title": "   ", "ingredients": [{"name": "salt"}]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .send(
            "POST",
            "/api/recipes",
            Some(&token),
            Some(json!({"title": "Soup", "servings": 1000})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("GET", "/api/recipes/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recipes_are_isolated_per_user() {
    let app = TestApp::without_model().await;
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;

    let recipe = app.create_recipe(&alice, "Alice's Stew", &[]).await;
    let uri = format!("/api/recipes/{}", recipe["id"].as_str().unwrap());

    let (status, _) = app.send("GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send("PUT", &uri, Some(&bob), Some(json!({"title": "Stolen", "ingredients": [{"name": "x"}]})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, page) = app.send("GET", "/api/recipes", Some(&bob), None).await;
    assert_eq!(page["total"], 0);

    let (status, _) = app.send("GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_recipe_list_filters_and_pagination() {
    let app = TestApp::without_model().await;
    let token = app.register("cook@example.com").await;

    app.create_recipe(&token, "Tomato Soup", &["soup", "vegetarian"]).await;
    app.create_recipe(&token, "Chicken Soup", &["soup"]).await;
    app.create_recipe(&token, "Green Salad", &["vegetarian"]).await;

    let (status, page) = app.send("GET", "/api/recipes?limit=2", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let (_, page) = app.send("GET", "/api/recipes?limit=2&offset=2", Some(&token), None).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let (_, page) = app.send("GET", "/api/recipes?q=soup", Some(&token), None).await;
    assert_eq!(page["total"], 2);

    let (_, page) = app.send("GET", "/api/recipes?tag=vegetarian&q=soup", Some(&token), None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["title"], "Tomato Soup");

    let (status, _) = app.send("GET", "/api/recipes?limit=1000", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.send("GET", "/api/recipes?sort=title", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_meal_plan_entries() {
    let app = TestApp::without_model().await;
    let token = app.register("cook@example.com").await;
    let recipe = app.create_recipe(&token, "Lentil Curry", &[]).await;

    let (status, dinner) = app
        .send(
            "POST",
            "/api/meal-plan",
            Some(&token),
            Some(json!({"plan_date": "2024-05-06", "meal_slot": "dinner", "recipe_id": recipe["id"]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dinner["title"], "Lentil Curry");

    let (status, _) = app
        .send(
            "POST",
            "/api/meal-plan",
            Some(&token),
            Some(json!({"plan_date": "2024-05-06", "meal_slot": "breakfast", "title": "Porridge"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, entries) = app
        .send("GET", "/api/meal-plan?from=2024-05-06&to=2024-05-12", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let slots: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["meal_slot"].as_str().unwrap())
        .collect();
    assert_eq!(slots, vec!["breakfast", "dinner"]);

    let uri = format!("/api/meal-plan/{}", dinner["id"].as_str().unwrap());
    let (status, _) = app.send("DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_meal_plan_validation() {
    let app = TestApp::without_model().await;
    let token = app.register("cook@example.com").await;
    let other = app.register("other@example.com").await;
    let foreign = app.create_recipe(&other, "Not Yours", &[]).await;

    let (status, _) = app
        .send("GET", "/api/meal-plan?from=2024-01-01&to=2024-06-01", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("GET", "/api/meal-plan?from=2024-01-07&to=2024-01-01", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/api/meal-plan",
            Some(&token),
            Some(json!({"plan_date": "2024-05-06", "meal_slot": "brunch", "title": "Eggs"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/api/meal-plan",
            Some(&token),
            Some(json!({"plan_date": "2024-05-06", "meal_slot": "lunch", "recipe_id": foreign["id"]})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
