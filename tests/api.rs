mod common;

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use sheetbudget::store::Store;
use sheetbudget::types::GoogleCredentials;

use common::{BOT_USERNAME, TestServer, data};

async fn create_category(server: &TestServer, token: &str, name: &str) -> String {
    let category = data(
        server
            .post(token, "/categories", json!({"name": name, "color": "#22c55e"}))
            .await,
    )
    .await;
    category["id"].as_str().expect("category id").to_string()
}

async fn link_chat(server: &TestServer, token: &str, chat_id: i64) {
    let link = data(server.post(token, "/telegram/link", json!({})).await).await;
    let code = link["code"].as_str().unwrap();
    let resp = server
        .telegram_update(chat_id, &format!("/link {code}"))
        .await;
    assert_eq!(resp.status(), 200);
}

async fn spreadsheet_id(server: &TestServer, token: &str) -> String {
    let info = data(server.get(token, "/sheets").await).await;
    info["spreadsheet_id"].as_str().unwrap().to_string()
}

async fn create_transaction(
    server: &TestServer,
    token: &str,
    category_id: &str,
    amount: f64,
    date: &str,
) -> Value {
    data(
        server
            .post(
                token,
                "/transactions",
                json!({"category_id": category_id, "amount": amount, "date": date}),
            )
            .await,
    )
    .await
}

#[tokio::test]
async fn login_refresh_and_logout() {
    let server = TestServer::start().await;
    let login = server.login("alice").await;
    assert_eq!(login.user["email"], "alice@example.com");
    assert!(login.access_token.starts_with("sb_"));

    let me = data(server.get(&login.access_token, "/auth/me").await).await;
    assert_eq!(me["email"], "alice@example.com");
    assert!(
        me["spreadsheet_url"]
            .as_str()
            .is_some_and(|u| u.starts_with("https://docs.google.com/spreadsheets/d/"))
    );

    let resp = server
        .client
        .get(server.url("/auth/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().contains_key("www-authenticate"));

    // A refresh token is not an access token.
    let resp = server.get(&login.refresh_token, "/auth/me").await;
    assert_eq!(resp.status(), 401);

    let refreshed = data(
        server
            .client
            .post(server.url("/auth/refresh"))
            .json(&json!({"refresh_token": login.refresh_token}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    let new_access = refreshed["access_token"].as_str().unwrap().to_string();
    assert_ne!(new_access, login.access_token);
    assert_eq!(refreshed["user"]["email"], "alice@example.com");

    // Refresh tokens rotate.
    let resp = server
        .client
        .post(server.url("/auth/refresh"))
        .json(&json!({"refresh_token": login.refresh_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = server.post(&new_access, "/auth/logout", json!({})).await;
    assert_eq!(resp.status(), 204);
    let resp = server.get(&new_access, "/auth/me").await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn oauth_callback_rejects_unknown_state() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/auth/google/callback"))
        .query(&[("code", "alice"), ("state", "not-a-real-state")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = server
        .client
        .get(server.url("/auth/google/callback"))
        .query(&[("error", "access_denied")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn relogin_reuses_spreadsheet() {
    let server = TestServer::start().await;
    let first = server.login("alice").await;
    let second = server.login("alice").await;

    assert_eq!(first.user["id"], second.user["id"]);
    assert_eq!(first.user["spreadsheet_url"], second.user["spreadsheet_url"]);

    // The schema was checked at sign-in; later reads cost the same.
    let mut costs = Vec::new();
    for _ in 0..2 {
        let before = server.sheets.call_count();
        data(server.get(&second.access_token, "/categories").await).await;
        costs.push(server.sheets.call_count() - before);
    }
    assert!(costs[0] > 0);
    assert_eq!(costs[0], costs[1]);
}

#[tokio::test]
async fn category_names_are_unique_per_user() {
    let server = TestServer::start().await;
    let alice = server.login("alice").await.access_token;
    let bob = server.login("bob").await.access_token;

    create_category(&server, &alice, "Food").await;
    let resp = server
        .post(&alice, "/categories", json!({"name": "food"}))
        .await;
    assert_eq!(resp.status(), 409);

    // Another user may reuse the name.
    create_category(&server, &bob, "Food").await;

    let resp = server
        .post(&alice, "/categories", json!({"name": "Rent", "color": "green"}))
        .await;
    assert_eq!(resp.status(), 400);

    let list = data(server.get(&alice, "/categories").await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_used_category_requires_force() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    let food = create_category(&server, &token, "Food").await;
    create_transaction(&server, &token, &food, 12.5, "2026-03-02").await;

    let resp = server.delete(&token, &format!("/categories/{food}")).await;
    assert_eq!(resp.status(), 409);

    let resp = server
        .delete(&token, &format!("/categories/{food}?force=true"))
        .await;
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn category_used_by_budget_or_goal_is_protected() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    let rent = create_category(&server, &token, "Rent").await;
    let travel = create_category(&server, &token, "Travel").await;

    let budget = data(
        server
            .post(
                &token,
                "/budgets",
                json!({"year": 2026, "month": 6, "items": [{"category_id": rent, "amount": 900.0}]}),
            )
            .await,
    )
    .await;
    data(
        server
            .post(
                &token,
                "/goals",
                json!({"name": "Trips", "category_id": travel, "limit_amount": 300.0}),
            )
            .await,
    )
    .await;

    for category in [&rent, &travel] {
        let resp = server.delete(&token, &format!("/categories/{category}")).await;
        assert_eq!(resp.status(), 409);
    }

    let resp = server
        .delete(&token, &format!("/categories/{rent}?force=true"))
        .await;
    assert_eq!(resp.status(), 204);
    let budget_id = budget["id"].as_str().unwrap();
    let items = data(server.get(&token, &format!("/budgets/{budget_id}/items")).await).await;
    assert!(items.as_array().unwrap().is_empty());

    let resp = server
        .delete(&token, &format!("/categories/{travel}?force=true"))
        .await;
    assert_eq!(resp.status(), 204);
    let goals = data(server.get(&token, "/goals").await).await;
    assert!(goals.as_array().unwrap().is_empty());

    let transactions = data(server.get(&token, "/transactions").await).await;
    assert!(transactions.as_array().unwrap().is_empty());
    let resp = server.get(&token, &format!("/categories/{food}")).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn transaction_validation_and_ownership() {
    let server = TestServer::start().await;
    let alice = server.login("alice").await.access_token;
    let bob = server.login("bob").await.access_token;
    let food = create_category(&server, &alice, "Food").await;

    let cases = [
        json!({"category_id": food, "amount": 10.0, "date": "03/02/2026"}),
        json!({"category_id": food, "amount": 0.0, "date": "2026-03-02"}),
        json!({"category_id": "missing", "amount": 10.0, "date": "2026-03-02"}),
    ];
    for body in cases {
        let resp = server.post(&alice, "/transactions", body.clone()).await;
        assert_eq!(resp.status(), 400, "accepted {body}");
    }

    // Bob cannot book against Alice's category.
    let resp = server
        .post(
            &bob,
            "/transactions",
            json!({"category_id": food, "amount": 10.0, "date": "2026-03-02"}),
        )
        .await;
    assert_eq!(resp.status(), 400);

    let tx = create_transaction(&server, &alice, &food, 10.0, "2026-03-02").await;
    let id = tx["id"].as_str().unwrap();
    assert_eq!(tx["date"], "2026-03-02");

    let resp = server.get(&bob, &format!("/transactions/{id}")).await;
    assert_eq!(resp.status(), 404);

    let updated = data(
        server
            .patch(
                &alice,
                &format!("/transactions/{id}"),
                json!({"amount": 15.25, "description": "Groceries"}),
            )
            .await,
    )
    .await;
    assert_eq!(updated["amount"].as_f64(), Some(15.25));
    assert_eq!(updated["description"], "Groceries");

    let march = data(
        server
            .get(&alice, "/transactions?year=2026&month=3")
            .await,
    )
    .await;
    assert_eq!(march.as_array().unwrap().len(), 1);
    let april = data(
        server
            .get(&alice, "/transactions?year=2026&month=4")
            .await,
    )
    .await;
    assert!(april.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn budget_detail_tracks_spending() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    let food = create_category(&server, &token, "Food").await;
    let fun = create_category(&server, &token, "Fun").await;

    create_transaction(&server, &token, &food, 30.0, "2026-03-05").await;
    create_transaction(&server, &token, &food, 20.0, "2026-03-20").await;
    create_transaction(&server, &token, &food, 99.0, "2026-04-01").await;
    create_transaction(&server, &token, &fun, 15.0, "2026-03-07").await;

    let budget = data(
        server
            .post(
                &token,
                "/budgets",
                json!({
                    "year": 2026,
                    "month": 3,
                    "income": 1000.0,
                    "items": [{"category_id": food, "amount": 100.0}]
                }),
            )
            .await,
    )
    .await;
    let id = budget["id"].as_str().unwrap().to_string();
    assert_eq!(budget["items"][0]["spent"].as_f64(), Some(50.0));

    let resp = server
        .post(&token, "/budgets", json!({"year": 2026, "month": 3}))
        .await;
    assert_eq!(resp.status(), 409);

    let resp = server
        .post(
            &token,
            &format!("/budgets/{id}/items"),
            json!({"category_id": food, "amount": 10.0}),
        )
        .await;
    assert_eq!(resp.status(), 409);

    let item = data(
        server
            .post(
                &token,
                &format!("/budgets/{id}/items"),
                json!({"category_id": fun, "amount": 40.0}),
            )
            .await,
    )
    .await;
    assert_eq!(item["spent"].as_f64(), Some(15.0));

    data(
        server
            .post(
                &token,
                "/incomes",
                json!({"year": 2026, "month": 3, "amount": 250.0, "source": "Freelance"}),
            )
            .await,
    )
    .await;

    let detail = data(server.get(&token, "/budgets/period/2026/3").await).await;
    assert_eq!(detail["id"], id.as_str());
    assert_eq!(detail["items"].as_array().unwrap().len(), 2);
    assert_eq!(detail["total_income"].as_f64(), Some(1250.0));
    assert_eq!(detail["total_budgeted"].as_f64(), Some(140.0));
    assert_eq!(detail["total_spent"].as_f64(), Some(65.0));

    let resp = server.get(&token, "/budgets/period/2026/5").await;
    assert_eq!(resp.status(), 404);

    let summary = data(server.get(&token, "/data/summary?year=2026&month=3").await).await;
    assert_eq!(summary["income"].as_f64(), Some(1250.0));
    assert_eq!(summary["expenses"].as_f64(), Some(65.0));
    assert_eq!(summary["remaining"].as_f64(), Some(1185.0));
    assert_eq!(summary["transaction_count"], 3);

    let resp = server.delete(&token, &format!("/budgets/{id}")).await;
    assert_eq!(resp.status(), 204);
    let sheet = spreadsheet_id(&server, &token).await;
    let items_tab = server.sheets.grid(&sheet, "budget_items").unwrap();
    assert_eq!(items_tab.len(), 1, "items left behind: {items_tab:?}");
    let everything = data(server.get(&token, "/data").await).await;
    assert!(everything["budgets"].as_array().unwrap().is_empty());
    assert!(everything["budget_items"].as_array().unwrap().is_empty());
    assert_eq!(everything["transactions"].as_array().unwrap().len(), 4);
    assert_eq!(everything["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn goal_alert_reaches_linked_chat_once() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    let food = create_category(&server, &token, "Food").await;

    let goal = data(
        server
            .post(
                &token,
                "/goals",
                json!({"name": "Food cap", "category_id": food, "limit_amount": 100.0}),
            )
            .await,
    )
    .await;
    assert_eq!(goal["period"], "monthly");
    assert_eq!(goal["notify"], true);

    let link = data(server.post(&token, "/telegram/link", json!({})).await).await;
    let code = link["code"].as_str().unwrap().to_string();
    assert_eq!(
        link["deep_link"],
        format!("https://t.me/{BOT_USERNAME}?start={code}")
    );

    let chat_id = 4242;
    let resp = server
        .telegram_update(chat_id, &format!("/start {code}"))
        .await;
    assert_eq!(resp.status(), 200);
    let replies = server.notifier.sent_to(chat_id);
    assert!(replies[0].contains("alice@example.com"), "{replies:?}");

    let status = data(server.get(&token, "/telegram/status").await).await;
    assert_eq!(status["linked"], true);
    assert_eq!(status["chat_id"], chat_id);

    create_transaction(&server, &token, &food, 60.0, "2026-05-10").await;
    create_transaction(&server, &token, &food, 50.0, "2026-05-12").await;
    create_transaction(&server, &token, &food, 10.0, "2026-05-13").await;

    let alerts: Vec<String> = server
        .notifier
        .sent_to(chat_id)
        .into_iter()
        .filter(|m| m.contains("Food cap"))
        .collect();
    assert_eq!(alerts.len(), 1, "{alerts:?}");
    assert!(alerts[0].contains("110.00"));

    let messages = data(server.get(&token, "/telegram/messages").await).await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["status"], "sent");

    let goal_id = goal["id"].as_str().unwrap();
    let progress = data(
        server
            .get(&token, &format!("/goals/{goal_id}/progress?date=2026-05-20"))
            .await,
    )
    .await;
    assert_eq!(progress["spent"].as_f64(), Some(120.0));
    assert_eq!(progress["exceeded"], true);
    assert_eq!(progress["period_start"], "2026-05-01");

    let resp = server.telegram_update(chat_id, "/unlink").await;
    assert_eq!(resp.status(), 200);
    let status = data(server.get(&token, "/telegram/status").await).await;
    assert_eq!(status["linked"], false);
}

#[tokio::test]
async fn webhook_requires_secret_and_valid_code() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/telegram/webhook"))
        .json(&json!({"update_id": 1, "message": {"message_id": 1, "chat": {"id": 1}, "text": "/status"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = server.telegram_update(77, "/link ZZZZZZ").await;
    assert_eq!(resp.status(), 200);
    assert!(server.notifier.sent_to(77)[0].contains("invalid"));

    let token = server.login("alice").await.access_token;
    let resp = server.post(&token, "/telegram/test", json!({})).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn settings_defaults_and_updates() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;

    let settings = data(server.get(&token, "/settings").await).await;
    assert_eq!(settings["currency"], "USD");
    assert_eq!(settings["notifications_enabled"], true);

    let settings = data(
        server
            .put(&token, "/settings", json!({"currency": "eur", "theme": "dark"}))
            .await,
    )
    .await;
    assert_eq!(settings["currency"], "EUR");
    assert_eq!(settings["theme"], "dark");

    let resp = server
        .put(&token, "/settings", json!({"theme": "neon"}))
        .await;
    assert_eq!(resp.status(), 400);

    let settings = data(server.get(&token, "/settings").await).await;
    assert_eq!(settings["theme"], "dark");
}

#[tokio::test]
async fn spreadsheet_maintenance_endpoints() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    create_category(&server, &token, "Groceries").await;
    data(
        server
            .post(&token, "/categories", json!({"name": "Travel", "emoji": "✈️"}))
            .await,
    )
    .await;

    let info = data(server.get(&token, "/sheets").await).await;
    let tabs: Vec<&str> = info["tabs"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["title"].as_str())
        .collect();
    assert!(tabs.contains(&"transactions"));
    assert!(tabs.contains(&"telegram_messages"));

    let report = data(server.post(&token, "/sheets/init", json!({})).await).await;
    assert!(report["created_tabs"].as_array().unwrap().is_empty());

    let report = data(
        server
            .post(&token, "/sheets/migrations/category-emoji", json!({}))
            .await,
    )
    .await;
    assert_eq!(report["scanned"], 2);
    assert_eq!(report["updated"], 1);

    let categories = data(server.get(&token, "/categories").await).await;
    assert!(
        categories
            .as_array()
            .unwrap()
            .iter()
            .all(|c| c["emoji"].as_str().is_some_and(|e| !e.is_empty()))
    );
}

#[tokio::test]
async fn client_ids_cannot_be_reused() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    let food = create_category(&server, &token, "Food").await;
    let fun = create_category(&server, &token, "Fun").await;

    let body = json!({"id": "tx1", "category_id": food, "amount": 5.0, "date": "2026-03-02"});
    let resp = server.post(&token, "/transactions", body.clone()).await;
    assert_eq!(resp.status(), 201);
    let resp = server.post(&token, "/transactions", body).await;
    assert_eq!(resp.status(), 409);
    let transactions = data(server.get(&token, "/transactions").await).await;
    assert_eq!(transactions.as_array().unwrap().len(), 1);

    let resp = server
        .post(
            &token,
            "/budgets",
            json!({"year": 2026, "month": 3, "items": [
                {"id": "item1", "category_id": food, "amount": 10.0},
                {"id": "item1", "category_id": fun, "amount": 10.0}
            ]}),
        )
        .await;
    assert_eq!(resp.status(), 400);

    let march = data(
        server
            .post(
                &token,
                "/budgets",
                json!({"id": "b1", "year": 2026, "month": 3, "items": [
                    {"id": "item1", "category_id": food, "amount": 10.0}
                ]}),
            )
            .await,
    )
    .await;
    assert_eq!(march["id"], "b1");

    let resp = server
        .post(&token, "/budgets", json!({"id": "b1", "year": 2026, "month": 4}))
        .await;
    assert_eq!(resp.status(), 409);
    let april = data(
        server
            .post(&token, "/budgets", json!({"year": 2026, "month": 4}))
            .await,
    )
    .await;
    let april_id = april["id"].as_str().unwrap();
    let resp = server
        .post(
            &token,
            &format!("/budgets/{april_id}/items"),
            json!({"id": "item1", "category_id": food, "amount": 10.0}),
        )
        .await;
    assert_eq!(resp.status(), 409);

    for path in ["/incomes", "/goals"] {
        let body = match path {
            "/incomes" => json!({"id": "x1", "year": 2026, "month": 3, "amount": 10.0}),
            _ => json!({"id": "x1", "name": "Cap", "limit_amount": 10.0}),
        };
        assert_eq!(server.post(&token, path, body.clone()).await.status(), 201);
        assert_eq!(server.post(&token, path, body).await.status(), 409);
    }
}

#[tokio::test]
async fn income_updates_and_deletes() {
    let server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    let bob = server.login("bob").await.access_token;

    let income = data(
        server
            .post(&token, "/incomes", json!({"year": 2026, "month": 3, "amount": 250.0}))
            .await,
    )
    .await;
    assert_eq!(income["source"], "Income");
    let id = income["id"].as_str().unwrap();

    let updated = data(
        server
            .patch(
                &token,
                &format!("/incomes/{id}"),
                json!({"amount": 300.0, "source": "Bonus", "month": 4}),
            )
            .await,
    )
    .await;
    assert_eq!(updated["amount"].as_f64(), Some(300.0));
    assert_eq!(updated["source"], "Bonus");
    assert_eq!(updated["month"], 4);

    let resp = server
        .patch(&token, &format!("/incomes/{id}"), json!({"amount": -5.0}))
        .await;
    assert_eq!(resp.status(), 400);
    let resp = server.delete(&bob, &format!("/incomes/{id}")).await;
    assert_eq!(resp.status(), 404);

    let april = data(server.get(&token, "/incomes?year=2026&month=4").await).await;
    assert_eq!(april.as_array().unwrap().len(), 1);

    let resp = server.delete(&token, &format!("/incomes/{id}")).await;
    assert_eq!(resp.status(), 204);
    let resp = server.delete(&token, &format!("/incomes/{id}")).await;
    assert_eq!(resp.status(), 404);
    let incomes = data(server.get(&token, "/incomes").await).await;
    assert!(incomes.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn revoked_google_grant_requires_sign_in() {
    let server = TestServer::start().await;
    let login = server.login("alice").await;
    let account_id = login.user["id"].as_str().unwrap();

    server
        .store
        .upsert_credentials(&GoogleCredentials {
            account_id: account_id.to_string(),
            access_token: "stale".to_string(),
            refresh_token: Some("google-refresh-revoked".to_string()),
            expires_at: Utc::now() - Duration::hours(1),
        })
        .unwrap();

    let resp = server.get(&login.access_token, "/categories").await;
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().contains_key("www-authenticate"));
}

#[tokio::test]
async fn relinked_chat_stops_alerting_previous_owner() {
    let server = TestServer::start().await;
    let alice = server.login("alice").await.access_token;
    let bob = server.login("bob").await.access_token;
    let food = create_category(&server, &alice, "Food").await;
    data(
        server
            .post(
                &alice,
                "/goals",
                json!({"name": "Alice cap", "category_id": food, "limit_amount": 10.0}),
            )
            .await,
    )
    .await;

    let chat_id = 500;
    link_chat(&server, &alice, chat_id).await;
    link_chat(&server, &bob, chat_id).await;

    let status = data(server.get(&alice, "/telegram/status").await).await;
    assert_eq!(status["linked"], false);
    let settings = data(server.get(&alice, "/settings").await).await;
    assert!(settings["telegram_chat_id"].is_null());

    let status = data(server.get(&bob, "/telegram/status").await).await;
    assert_eq!(status["chat_id"], chat_id);

    create_transaction(&server, &alice, &food, 20.0, "2026-05-10").await;
    let leaked: Vec<String> = server
        .notifier
        .sent_to(chat_id)
        .into_iter()
        .filter(|m| m.contains("Alice cap"))
        .collect();
    assert!(leaked.is_empty(), "{leaked:?}");
}

#[tokio::test]
async fn telegram_link_survives_restart() {
    let mut server = TestServer::start().await;
    let token = server.login("alice").await.access_token;
    let chat_id = 700;
    link_chat(&server, &token, chat_id).await;

    server.restart().await;

    let resp = server.telegram_update(chat_id, "/status").await;
    assert_eq!(resp.status(), 200);
    let replies = server.notifier.sent_to(chat_id);
    assert!(
        replies.last().unwrap().contains("alice@example.com"),
        "{replies:?}"
    );

    server.telegram_update(chat_id, "/unlink").await;
    let replies = server.notifier.sent_to(chat_id);
    assert!(replies.last().unwrap().starts_with("Unlinked"), "{replies:?}");

    let status = data(server.get(&token, "/telegram/status").await).await;
    assert_eq!(status["linked"], false);
    let settings = data(server.get(&token, "/settings").await).await;
    assert!(settings["telegram_chat_id"].is_null());
}
