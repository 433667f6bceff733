//! Bearer token for the solar API

use super::{Feed, FeedDescriptor, FeedUpdate, FetchContext, FetchError};
use crate::config::SolarConfig;
use crate::state::{AuthToken, Dashboard};
use crate::transport::HttpRequest;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Account credentials, all read from the environment
#[derive(Clone)]
struct Credentials {
    app_secret: String,
    email: String,
    password_hash: String,
}

pub struct SolarTokenFeed {
    descriptor: FeedDescriptor,
    url: String,
    credentials: Credentials,
}

impl SolarTokenFeed {
    /// `None` unless secret, email and password hash are all configured
    pub fn new(config: &SolarConfig) -> Option<Self> {
        let credentials = Credentials {
            app_secret: config.app_secret.clone()?,
            email: config.email.clone()?,
            password_hash: config.password_hash.clone()?,
        };
        Some(Self {
            descriptor: FeedDescriptor {
                name: "solar_token",
                label: "Solar token",
                interval_secs: 0,
                requires_token: false,
            },
            url: format!("{}/account/v1.0/token?appId={}", config.base_url, config.app_id),
            credentials,
        })
    }
}

#[async_trait]
impl Feed for SolarTokenFeed {
    fn descriptor(&self) -> &FeedDescriptor {
        &self.descriptor
    }

    fn last_update(&self, dashboard: &Dashboard) -> i64 {
        dashboard.token.acquired_at
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FeedUpdate, FetchError> {
        let body = json!({
            "appSecret": self.credentials.app_secret,
            "email": self.credentials.email,
            "password": self.credentials.password_hash,
        });
        let response: TokenResponse = ctx
            .fetch_json(HttpRequest::post_json(&self.url, body.to_string()))
            .await?;

        match response.access_token {
            Some(token) => Ok(FeedUpdate::Token(AuthToken {
                token: format!("bearer {token}"),
                acquired_at: ctx.timestamp(),
            })),
            None => Err(FetchError::Api(
                response.msg.unwrap_or_else(|| "no access token".to_string()),
            )),
        }
    }
}
