//! Reddit "script" application authentication.
//!
//! Uses the OAuth2 resource-owner password grant, which is what Reddit offers
//! for personal scripts running under the developer's own account.

use listener_core::{ConfigError, CoreError, FeedError, RedditCredentials};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Reddit tokens last an hour; used when the response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    pub fn needs_refresh(&self) -> bool {
        SystemTime::now() + REFRESH_MARGIN >= self.expires_at
    }
}

#[derive(Debug)]
pub struct RedditAuthenticator {
    oauth_client: BasicClient,
    http_client: reqwest::Client,
    username: ResourceOwnerUsername,
    password: ResourceOwnerPassword,
}

impl RedditAuthenticator {
    pub fn new(credentials: &RedditCredentials) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "auth_url".to_string(),
                value: e.to_string(),
            }
        })?;
        let token_url = TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "token_url".to_string(),
                value: e.to_string(),
            }
        })?;

        let oauth_client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        let http_client = reqwest::Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            oauth_client,
            http_client,
            username: ResourceOwnerUsername::new(credentials.username.clone()),
            password: ResourceOwnerPassword::new(credentials.password.clone()),
        })
    }

    pub fn required_scopes() -> Vec<&'static str> {
        vec!["identity", "read"]
    }

    pub async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        info!("Authenticating with Reddit as {}", self.username.as_str());

        let mut request = self
            .oauth_client
            .exchange_password(&self.username, &self.password);
        for scope in Self::required_scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let response = request
            .request_async(|request| send_request(&self.http_client, request))
            .await
            .map_err(token_error)?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let scope = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();

        debug!("Obtained Reddit access token valid for {:?}", lifetime);
        Ok(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + lifetime,
            scope,
        })
    }
}

/// Sends the token request with our own client so Reddit sees the configured
/// user agent.
async fn send_request(
    client: &reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn token_error<TE>(error: RequestTokenError<reqwest::Error, TE>) -> CoreError
where
    TE: oauth2::ErrorResponse + 'static,
{
    match error {
        RequestTokenError::ServerResponse(response) => FeedError::AuthenticationFailed {
            reason: format!("{:?}", response),
        }
        .into(),
        RequestTokenError::Request(e) => CoreError::Network(e),
        // Reddit answers a wrong password with HTTP 200 and `{"error": "invalid_grant"}`.
        RequestTokenError::Parse(e, body) => {
            let body = String::from_utf8_lossy(&body);
            if body.contains("\"error\"") {
                FeedError::AuthenticationFailed {
                    reason: body.into_owned(),
                }
                .into()
            } else {
                FeedError::InvalidResponse {
                    details: format!("token response: {}", e),
                }
                .into()
            }
        }
        RequestTokenError::Other(reason) => FeedError::AuthenticationFailed { reason }.into(),
    }
}
