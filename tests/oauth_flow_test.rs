//! # OAuth PKCE 流程集成测试

mod common;

use common::{START_MS, oauth_config, token_server};
use request_guard::GuardError;
use request_guard::auth::OAuthPkceFlow;
use request_guard::auth::oauth_client::pkce::challenge_for;
use request_guard::store::{
    AccountLinkStore, ExchangeStore, MemoryAccountLinkStore, MemoryExchangeStore,
};
use request_guard::types::LinkOutcome;
use request_guard::utils::{Clock, ManualClock, OsRandom};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::{Url, form_urlencoded};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    flow: OAuthPkceFlow,
    clock: Arc<ManualClock>,
    store: Arc<MemoryExchangeStore>,
    links: Arc<MemoryAccountLinkStore>,
}

fn harness(server: &MockServer) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let store = Arc::new(MemoryExchangeStore::with_clock(clock.clone()));
    let links = Arc::new(MemoryAccountLinkStore::new());
    let flow = OAuthPkceFlow::with_sources(
        oauth_config(server),
        store.clone(),
        Some(links.clone()),
        clock.clone(),
        OsRandom::shared(),
    )
    .unwrap();
    Harness {
        flow,
        clock,
        store,
        links,
    }
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

#[tokio::test]
async fn test_callback_replay_rejected() {
    let server = token_server("acct-1").await;
    let h = harness(&server);

    let request = h.flow.start("web", None).await.unwrap();
    assert_eq!(h.store.len(), 1);

    let outcome = h.flow.complete("auth-code", &request.state).await.unwrap();
    assert_eq!(outcome.tokens.access_token, "provider-access-token");
    assert!(h.store.is_empty());

    let replay = h.flow.complete("auth-code", &request.state).await;
    assert!(matches!(replay, Err(GuardError::Exchange { .. })));
}

#[tokio::test]
async fn test_verifier_sent_matches_challenge() {
    let server = MockServer::start().await;
    let h = harness(&server);
    let request = h.flow.start("cli", None).await.unwrap();
    let params = query(&request.url);
    let challenge = params["code_challenge"].clone();

    // 只从暂存记录中取出 verifier 来搭建匹配规则，再放回去
    let payload = h.store.consume(&request.state).await.unwrap().unwrap();
    assert_eq!(challenge_for(&payload.code_verifier), challenge);
    assert_eq!(payload.client_identifier, "cli");
    h.store
        .put(&request.state, payload.clone(), Duration::from_secs(600))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!(
            "code_verifier={}",
            form_urlencoded::byte_serialize(payload.code_verifier.as_bytes()).collect::<String>()
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at",
            "account_id": 42
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = h.flow.complete("the-code", &request.state).await.unwrap();
    assert_eq!(outcome.external_account_id.as_deref(), Some("42"));
    assert_eq!(outcome.client_identifier, "cli");
}

#[tokio::test]
async fn test_state_expires_after_ttl() {
    let server = token_server("acct-1").await;
    let h = harness(&server);
    let request = h.flow.start("web", None).await.unwrap();

    h.clock.advance(Duration::from_secs(600));
    assert!(h.flow.complete("code", &request.state).await.is_err());
}

#[tokio::test]
async fn test_unknown_state_rejected_without_provider_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let h = harness(&server);

    assert!(h.flow.complete("code", "forged-state").await.is_err());
}

#[tokio::test]
async fn test_provider_error_consumes_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "code expired"
        })))
        .mount(&server)
        .await;
    let h = harness(&server);
    let request = h.flow.start("web", None).await.unwrap();

    assert!(h.flow.complete("code", &request.state).await.is_err());
    // state 在调用提供商之前已被消费，不能重试
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_link_mode_applies_conflict_policy() {
    let server = token_server("acct-7").await;
    let h = harness(&server);
    h.links
        .link("acme", "acct-7", "owner-a", h.clock.now())
        .await
        .unwrap();

    let request = h.flow.start("web", Some("owner-b")).await.unwrap();
    assert!(h.flow.complete("code", &request.state).await.is_err());
    assert_eq!(
        h.links.owner_of("acme", "acct-7").await.unwrap().as_deref(),
        Some("owner-a")
    );

    let request = h.flow.start("web", Some("owner-a")).await.unwrap();
    let outcome = h.flow.complete("code", &request.state).await.unwrap();
    assert!(!outcome.is_login());
    assert_eq!(outcome.link, Some(LinkOutcome::AlreadyLinked));
}

#[tokio::test]
async fn test_each_start_gets_fresh_state() {
    let server = token_server("acct-1").await;
    let h = harness(&server);

    let a = h.flow.start("web", None).await.unwrap();
    let b = h.flow.start("web", None).await.unwrap();
    assert_ne!(a.state, b.state);
    assert_ne!(
        query(&a.url)["code_challenge"],
        query(&b.url)["code_challenge"]
    );
    assert_eq!(h.store.len(), 2);
}
