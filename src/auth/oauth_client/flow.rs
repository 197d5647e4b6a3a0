//! # OAuth PKCE 两阶段流程

use super::OAuthConfig;
use super::pkce::PkcePair;
use super::token_exchange::{TokenExchangeClient, TokenResponse};
use crate::error::{GuardError, Result};
use crate::exchange_error;
use crate::logging::{LogComponent, LogStage};
use crate::store::{AccountLinkStore, ExchangeStore};
use crate::types::{ExchangePayload, LinkOutcome};
use crate::utils::clock::{SharedClock, SystemClock};
use crate::utils::random::{OsRandom, SharedRandom, random_token};
use crate::{linfo, lwarn};
use std::sync::Arc;
use url::Url;

/// `state` 随机字节数
const STATE_BYTES: usize = 32;

/// 授权请求：跳转地址与对应的 `state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// 回调完成后的结果
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub tokens: TokenResponse,
    pub external_account_id: Option<String>,
    pub client_identifier: String,
    /// 绑定模式下发起流程的本地实体
    pub owner_context: Option<String>,
    /// 绑定模式下的绑定结果
    pub link: Option<LinkOutcome>,
}

impl ExchangeOutcome {
    /// 是否为登录流程
    #[must_use]
    pub const fn is_login(&self) -> bool {
        self.owner_context.is_none()
    }
}

/// OAuth 授权码 + PKCE 流程
#[derive(Clone)]
pub struct OAuthPkceFlow {
    config: OAuthConfig,
    authorize_url: Url,
    exchange_store: Arc<dyn ExchangeStore>,
    link_store: Option<Arc<dyn AccountLinkStore>>,
    token_client: TokenExchangeClient,
    clock: SharedClock,
    random: SharedRandom,
}

impl std::fmt::Debug for OAuthPkceFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthPkceFlow")
            .field("provider", &self.config.provider)
            .field("authorize_url", &self.authorize_url.as_str())
            .field("link_mode_enabled", &self.link_store.is_some())
            .finish_non_exhaustive()
    }
}

impl OAuthPkceFlow {
    pub fn new(
        config: OAuthConfig,
        exchange_store: Arc<dyn ExchangeStore>,
        link_store: Option<Arc<dyn AccountLinkStore>>,
    ) -> Result<Self> {
        Self::with_sources(
            config,
            exchange_store,
            link_store,
            SystemClock::shared(),
            OsRandom::shared(),
        )
    }

    pub fn with_sources(
        config: OAuthConfig,
        exchange_store: Arc<dyn ExchangeStore>,
        link_store: Option<Arc<dyn AccountLinkStore>>,
        clock: SharedClock,
        random: SharedRandom,
    ) -> Result<Self> {
        config.validate()?;
        let authorize_url = Url::parse(&config.authorize_url).map_err(|e| {
            GuardError::config_with_source(
                format!("invalid oauth.authorize_url: {}", config.authorize_url),
                e,
            )
        })?;
        let token_client = TokenExchangeClient::new(&config)?;

        Ok(Self {
            config,
            authorize_url,
            exchange_store,
            link_store,
            token_client,
            clock,
            random,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// 开始授权：生成 PKCE 与 `state`，暂存一次性记录并构造授权 URL
    pub async fn start(
        &self,
        client_identifier: &str,
        owner_context: Option<&str>,
    ) -> Result<AuthorizationRequest> {
        let pkce = PkcePair::generate(self.random.as_ref());
        let state = random_token(self.random.as_ref(), STATE_BYTES);

        let payload = ExchangePayload {
            code_verifier: pkce.verifier.clone(),
            client_identifier: client_identifier.to_string(),
            owner_context: owner_context.map(ToString::to_string),
        };
        self.exchange_store
            .put(&state, payload, self.config.state_ttl())
            .await?;

        let url = self.build_authorize_url(&pkce, &state);

        linfo!(
            "system",
            LogStage::OAuthStart,
            LogComponent::OAuth,
            "authorization_started",
            "oauth authorization started",
            provider = %self.config.provider,
            client = %client_identifier,
            link_mode = owner_context.is_some()
        );

        Ok(AuthorizationRequest { url, state })
    }

    fn build_authorize_url(&self, pkce: &PkcePair, state: &str) -> String {
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri);
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            for (name, value) in pkce.authorization_params() {
                query.append_pair(name, value);
            }
            query.append_pair("state", state);
            for (name, value) in &self.config.extra_authorize_params {
                query.append_pair(name, value);
            }
        }
        url.into()
    }

    /// 完成授权：消费 `state`，换取令牌，绑定模式下应用冲突策略
    pub async fn complete(&self, code: &str, state: &str) -> Result<ExchangeOutcome> {
        if code.is_empty() || state.is_empty() {
            return Err(exchange_error!("缺少 code 或 state 参数"));
        }

        let Some(payload) = self.exchange_store.consume(state).await? else {
            lwarn!(
                "system",
                LogStage::OAuthCallback,
                LogComponent::OAuth,
                "state_rejected",
                "oauth state missing, expired or already used",
                provider = %self.config.provider
            );
            return Err(exchange_error!("state 无效、已过期或已被使用"));
        };

        let tokens = self
            .token_client
            .exchange_code(code, &payload.code_verifier)
            .await
            .inspect_err(|e| {
                lwarn!(
                    "system",
                    LogStage::OAuthCallback,
                    LogComponent::OAuth,
                    "token_exchange_failed",
                    "authorization code exchange failed",
                    provider = %self.config.provider,
                    error = %e
                );
            })?;

        let external_account_id = tokens.account_id(&self.config.account_id_field);

        let link = match (&payload.owner_context, &self.link_store) {
            (Some(owner_id), Some(links)) => {
                let Some(account_id) = external_account_id.as_deref() else {
                    return Err(exchange_error!(
                        "令牌响应缺少外部账户标识: {}",
                        self.config.account_id_field
                    ));
                };
                Some(self.apply_link(links.as_ref(), account_id, owner_id).await?)
            }
            _ => None,
        };

        linfo!(
            "system",
            LogStage::OAuthCallback,
            LogComponent::OAuth,
            "authorization_completed",
            "oauth authorization completed",
            provider = %self.config.provider,
            client = %payload.client_identifier,
            scopes = ?tokens.scopes(),
            link = ?link
        );

        Ok(ExchangeOutcome {
            tokens,
            external_account_id,
            client_identifier: payload.client_identifier,
            owner_context: payload.owner_context,
            link,
        })
    }

    async fn apply_link(
        &self,
        links: &dyn AccountLinkStore,
        account_id: &str,
        owner_id: &str,
    ) -> Result<LinkOutcome> {
        let outcome = links
            .link(&self.config.provider, account_id, owner_id, self.clock.now())
            .await?;
        if let LinkOutcome::Conflict { .. } = outcome {
            lwarn!(
                "system",
                LogStage::OAuthCallback,
                LogComponent::OAuth,
                "account_link_conflict",
                "external account already linked to another owner",
                provider = %self.config.provider
            );
            return Err(exchange_error!("外部账户已绑定到其他实体"));
        }
        Ok(outcome)
    }

    /// 登录模式下解析本地实体：已有绑定则沿用，否则以 `provider:account` 建立绑定
    pub async fn resolve_login_owner(&self, outcome: &ExchangeOutcome) -> Result<String> {
        let account_id = outcome.external_account_id.as_deref().ok_or_else(|| {
            exchange_error!(
                "令牌响应缺少外部账户标识: {}",
                self.config.account_id_field
            )
        })?;
        let provisional_owner = format!("{}:{}", self.config.provider, account_id);

        let Some(links) = &self.link_store else {
            return Ok(provisional_owner);
        };
        if let Some(owner) = links.owner_of(&self.config.provider, account_id).await? {
            return Ok(owner);
        }
        match links
            .link(
                &self.config.provider,
                account_id,
                &provisional_owner,
                self.clock.now(),
            )
            .await?
        {
            LinkOutcome::Conflict { existing_owner } => Ok(existing_owner),
            LinkOutcome::Linked | LinkOutcome::AlreadyLinked => Ok(provisional_owner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryAccountLinkStore, MemoryExchangeStore};
    use crate::utils::clock::{Clock, ManualClock};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn token_server(account_id: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "token_type": "Bearer",
                "account_id": account_id
            })))
            .mount(&server)
            .await;
        server
    }

    fn config(server: &MockServer) -> OAuthConfig {
        OAuthConfig {
            provider: "acme".to_string(),
            client_id: "client-1".to_string(),
            authorize_url: "https://idp.example.com/authorize?prompt=consent".to_string(),
            token_url: format!("{}/token", server.uri()),
            redirect_uri: "https://app.example.com/oauth/callback".to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            ..OAuthConfig::default()
        }
    }

    fn flow(
        server: &MockServer,
        clock: Arc<ManualClock>,
        links: Option<Arc<dyn AccountLinkStore>>,
    ) -> OAuthPkceFlow {
        let store = Arc::new(MemoryExchangeStore::with_clock(clock.clone()));
        OAuthPkceFlow::with_sources(config(server), store, links, clock, OsRandom::shared())
            .unwrap()
    }

    #[tokio::test]
    async fn test_authorize_url_carries_pkce_params() {
        let server = token_server("acct-1").await;
        let flow = flow(&server, Arc::new(ManualClock::new(0)), None);
        let request = flow.start("web", None).await.unwrap();

        let url = Url::parse(&request.url).unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["scope"], "openid profile");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["code_challenge"].len(), 43);
    }

    #[tokio::test]
    async fn test_callback_succeeds_once() {
        let server = token_server("acct-1").await;
        let flow = flow(&server, Arc::new(ManualClock::new(0)), None);
        let request = flow.start("web", None).await.unwrap();

        let outcome = flow.complete("code", &request.state).await.unwrap();
        assert_eq!(outcome.tokens.access_token, "at-1");
        assert_eq!(outcome.external_account_id.as_deref(), Some("acct-1"));
        assert_eq!(outcome.client_identifier, "web");
        assert!(outcome.is_login());

        let err = flow.complete("code", &request.state).await.unwrap_err();
        assert!(matches!(err, GuardError::Exchange { .. }));
    }

    #[tokio::test]
    async fn test_expired_state_rejected() {
        let server = token_server("acct-1").await;
        let clock = Arc::new(ManualClock::new(0));
        let flow = flow(&server, clock.clone(), None);
        let request = flow.start("web", None).await.unwrap();

        clock.advance(Duration::from_secs(601));
        assert!(flow.complete("code", &request.state).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_parameters_rejected() {
        let server = token_server("acct-1").await;
        let flow = flow(&server, Arc::new(ManualClock::new(0)), None);
        assert!(flow.complete("", "state").await.is_err());
        assert!(flow.complete("code", "").await.is_err());
    }

    #[tokio::test]
    async fn test_link_conflict_rejected() {
        let server = token_server("acct-1").await;
        let links: Arc<dyn AccountLinkStore> = Arc::new(MemoryAccountLinkStore::new());
        let clock = Arc::new(ManualClock::new(0));
        links
            .link("acme", "acct-1", "owner-a", clock.now())
            .await
            .unwrap();
        let flow = flow(&server, clock, Some(links));

        let request = flow.start("web", Some("owner-b")).await.unwrap();
        let err = flow.complete("code", &request.state).await.unwrap_err();
        assert!(matches!(err, GuardError::Exchange { .. }));

        let request = flow.start("web", Some("owner-a")).await.unwrap();
        let outcome = flow.complete("code", &request.state).await.unwrap();
        assert_eq!(outcome.link, Some(LinkOutcome::AlreadyLinked));
    }

    #[tokio::test]
    async fn test_login_owner_resolution() {
        let server = token_server("acct-9").await;
        let links: Arc<dyn AccountLinkStore> = Arc::new(MemoryAccountLinkStore::new());
        let flow = flow(&server, Arc::new(ManualClock::new(0)), Some(links.clone()));

        let request = flow.start("web", None).await.unwrap();
        let outcome = flow.complete("code", &request.state).await.unwrap();
        assert_eq!(
            flow.resolve_login_owner(&outcome).await.unwrap(),
            "acme:acct-9"
        );
        assert_eq!(
            links.owner_of("acme", "acct-9").await.unwrap().as_deref(),
            Some("acme:acct-9")
        );
    }
}
