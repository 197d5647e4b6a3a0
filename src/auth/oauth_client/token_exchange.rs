//! # Token交换逻辑
//!
//! 授权码 + PKCE verifier 换取访问令牌。只发一次请求，失败即终止本次流程。

use super::OAuthConfig;
use crate::error::{GuardError, Result};
use crate::exchange_error;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 令牌端点响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    // 错误响应字段
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    /// 提供商附带的其他字段，例如账户标识
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// 按字段路径（`.` 分隔）提取账户标识，支持字符串与数字
    #[must_use]
    pub fn account_id(&self, field_path: &str) -> Option<String> {
        let mut segments = field_path.split('.');
        let first = segments.next()?;
        let mut value = self.extra.get(first)?;
        for segment in segments {
            value = value.get(segment)?;
        }
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// 空格分隔的授权范围
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| {
            format!(
                "{}: {}",
                error,
                self.error_description.as_deref().unwrap_or_default()
            )
        })
    }
}

/// Token交换客户端
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl TokenExchangeClient {
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("request-guard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GuardError::config_with_source("无法创建 OAuth HTTP 客户端", e))?;

        Ok(Self {
            http_client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone().filter(|s| !s.is_empty()),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// 交换授权码获取访问令牌
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            ldebug!(
                "system",
                LogStage::ExternalApi,
                LogComponent::OAuth,
                "token_exchange_http_error",
                "token endpoint returned an error status",
                status = status.as_u16()
            );
            if let Some(message) = serde_json::from_str::<TokenResponse>(&body)
                .ok()
                .and_then(|r| r.error_message())
            {
                return Err(exchange_error!(message));
            }
            return Err(exchange_error!("HTTP {}", status.as_u16()));
        }

        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GuardError::exchange_with_source("令牌端点返回了无法解析的响应", e))?;

        if let Some(message) = tokens.error_message() {
            return Err(exchange_error!(message));
        }
        if tokens.access_token.trim().is_empty() {
            return Err(exchange_error!("令牌端点响应缺少 access_token"));
        }

        ldebug!(
            "system",
            LogStage::ExternalApi,
            LogComponent::OAuth,
            "token_exchange_ok",
            "authorization code exchanged",
            token_type = ?tokens.token_type,
            expires_in = ?tokens.expires_in,
            has_refresh_token = tokens.refresh_token.is_some()
        );

        Ok(tokens)
    }
}
