#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use sarv_db::models::panel::Panel;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::marzban::types::{AccountPatch, NewAccount};
    use crate::marzban::{MarzbanClient, PanelError};

    fn panel_for(server: &MockServer) -> Panel {
        Panel {
            id: 1,
            name: "test".into(),
            url: server.uri(),
            username: "admin".into(),
            password: "secret".into(),
            is_active: true,
        }
    }

    fn token_mock(token: &str) -> Mock {
        Mock::given(method("POST"))
            .and(path("/api/admin/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "token_type": "bearer"
            })))
    }

    fn account_body(username: &str) -> serde_json::Value {
        json!({
            "username": username,
            "status": "active",
            "expire": 1_900_000_000i64,
            "data_limit": 10_737_418_240i64,
            "used_traffic": 1_073_741_824i64,
            "subscription_url": format!("/sub/{}", username),
            "links": []
        })
    }

    #[tokio::test]
    async fn authenticates_with_form_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/token"))
            .and(body_string_contains("username=admin"))
            .and(body_string_contains("password=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        let token = client.authenticate().await.unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        assert!(matches!(client.authenticate().await, Err(PanelError::Auth)));
    }

    #[tokio::test]
    async fn get_account_sends_bearer_token() {
        let server = MockServer::start().await;
        token_mock("tok-2").mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/user/user_1_abc123"))
            .and(header("authorization", "Bearer tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_body("user_1_abc123")))
            .expect(1)
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        let account = client.get_account("user_1_abc123").await.unwrap();
        assert_eq!(account.username, "user_1_abc123");
        assert_eq!(account.expire_ts(), Some(1_900_000_000));
    }

    #[tokio::test]
    async fn missing_account_maps_to_not_found() {
        let server = MockServer::start().await;
        token_mock("tok").mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/user/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "detail": "User not found"
            })))
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        assert!(matches!(
            client.get_account("ghost").await,
            Err(PanelError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_token_triggers_one_retry() {
        let server = MockServer::start().await;
        // First token is stale; the 401 below must cause exactly one re-auth.
        token_mock("fresh").mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/user/u1"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/user/u1"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_body("u1")))
            .expect(1)
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        client.seed_token("stale").await;
        let account = client.get_account("u1").await.unwrap();
        assert_eq!(account.username, "u1");
    }

    #[tokio::test]
    async fn create_account_posts_full_payload() {
        let server = MockServer::start().await;
        token_mock("tok").mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/user"))
            .and(body_string_contains("\"data_limit\":10737418240"))
            .and(body_string_contains("\"expire\":1900000000"))
            .and(body_string_contains("\"data_limit_reset_strategy\":\"no_reset\""))
            .and(body_string_contains("VLESS_TCP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_body("u2")))
            .expect(1)
            .mount(&server)
            .await;

        let mut inbounds = HashMap::new();
        inbounds.insert("vless".to_string(), vec!["VLESS_TCP".to_string()]);
        let account = NewAccount::new("u2".into(), 10_737_418_240, 1_900_000_000, inbounds);

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        let created = client.create_account(&account).await.unwrap();
        assert_eq!(created.username, "u2");
    }

    #[tokio::test]
    async fn update_account_puts_patch_body() {
        let server = MockServer::start().await;
        token_mock("tok").mount(&server).await;
        Mock::given(method("PUT"))
            .and(path("/api/user/u3"))
            .and(body_string_contains("\"expire\":1950000000"))
            .and(body_string_contains("\"data_limit\":21474836480"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_body("u3")))
            .expect(1)
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        let patch = AccountPatch {
            expire: 1_950_000_000,
            data_limit: 21_474_836_480,
        };
        client.update_account("u3", &patch).await.unwrap();
    }

    // Full renewal round trip against the mock panel: read the account,
    // extend additively, write the patch back.
    #[tokio::test]
    async fn renewal_round_trip_is_additive() {
        use crate::marzban::types::{data_limit_bytes, renewed_expire};

        let server = MockServer::start().await;
        token_mock("tok").mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/user/u4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_body("u4")))
            .mount(&server)
            .await;

        let now = 1_850_000_000i64; // before the account's 1_900_000_000 expiry
        let expected_expire = 1_900_000_000 + 30 * 86400;
        let expected_limit = 10_737_418_240 + data_limit_bytes(10.0);
        Mock::given(method("PUT"))
            .and(path("/api/user/u4"))
            .and(body_string_contains(format!("\"expire\":{}", expected_expire)))
            .and(body_string_contains(format!("\"data_limit\":{}", expected_limit)))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_body("u4")))
            .expect(1)
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        let account = client.get_account("u4").await.unwrap();
        let patch = AccountPatch {
            expire: renewed_expire(account.expire, now, 30),
            data_limit: account.data_limit_bytes() + data_limit_bytes(10.0),
        };
        client.update_account("u4", &patch).await.unwrap();
    }

    #[tokio::test]
    async fn marzban_detail_text_is_preserved() {
        let server = MockServer::start().await;
        token_mock("tok").mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "detail": "User already exists"
            })))
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        let err = client
            .create_account(&NewAccount::new("dup".into(), 0, 0, HashMap::new()))
            .await
            .unwrap_err();
        match err {
            PanelError::Api(text) => assert!(text.contains("User already exists")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn validation_detail_array_is_flattened() {
        let server = MockServer::start().await;
        token_mock("tok").mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": [
                    {"msg": "username too long", "loc": ["body", "username"]},
                    {"msg": "invalid proxy", "loc": ["body", "proxies"]}
                ]
            })))
            .mount(&server)
            .await;

        let client = MarzbanClient::from_panel(&panel_for(&server)).unwrap();
        let err = client
            .create_account(&NewAccount::new("x".into(), 0, 0, HashMap::new()))
            .await
            .unwrap_err();
        match err {
            PanelError::Api(text) => {
                assert!(text.contains("username too long"));
                assert!(text.contains("invalid proxy"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejects_panel_with_blank_credentials() {
        let panel = Panel {
            id: 9,
            name: "broken".into(),
            url: String::new(),
            username: "admin".into(),
            password: "pw".into(),
            is_active: true,
        };
        assert!(MarzbanClient::from_panel(&panel).is_err());
    }
}
