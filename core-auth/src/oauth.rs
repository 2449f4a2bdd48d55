//! OAuth 2.0 client with PKCE support
//!
//! Builds authorization-code URLs (RFC 6749 with RFC 7636 S256 challenge)
//! and the form-encoded token requests for the authorization-code and
//! refresh-token grants. Executing those requests and interpreting the
//! response is the job of [`AuthSession`](crate::AuthSession).
//!
//! Never logs codes, verifiers or tokens.

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpMethod, HttpRequest};
use core_runtime::config::{OAuthConfig, ServerEndpoints};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

/// PKCE verifier plus the CSRF `state` of one authorization attempt.
///
/// The verifier stays on the device; only the derived challenge is sent to
/// the authorization server.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// 32 random bytes for the verifier, 16 for the state, both
    /// base64url-encoded without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);

        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// `BASE64URL(SHA256(verifier))`
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Request builder for one OAuth2 client registration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    authorize_url: Url,
    token_url: Url,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, endpoints: &ServerEndpoints) -> Self {
        Self {
            config,
            authorize_url: endpoints.authorize_url.clone(),
            token_url: endpoints.token_url.clone(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Authorization-code URL for `scopes` (or the configured scopes when
    /// empty). `extra_query` pairs are appended after the standard ones.
    pub fn authorization_url(
        &self,
        scopes: &[String],
        extra_query: &[(String, String)],
        pkce: &PkceVerifier,
    ) -> Url {
        let scopes = if scopes.is_empty() {
            &self.config.scopes
        } else {
            scopes
        };

        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("scope", &scopes.join(" "));
            query.append_pair("state", pkce.state());
            query.append_pair("code_challenge", &pkce.challenge());
            query.append_pair("code_challenge_method", "S256");
            for (key, value) in extra_query {
                query.append_pair(key, value);
            }
        }

        debug!(authorize_url = %self.authorize_url, scopes = scopes.len(), "Built authorization URL");
        url
    }

    /// Token request for the authorization-code grant.
    pub fn code_request(&self, code: &str, pkce: Option<&PkceVerifier>) -> Result<HttpRequest> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(pkce) = pkce {
            params.push(("code_verifier", pkce.verifier()));
        }
        self.token_request(params)
    }

    /// Token request for the refresh-token grant.
    pub fn refresh_request(&self, refresh_token: &str) -> Result<HttpRequest> {
        self.token_request(vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
    }

    fn token_request<'a>(&'a self, mut params: Vec<(&'a str, &'a str)>) -> Result<HttpRequest> {
        params.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        HttpRequest::new(HttpMethod::Post, self.token_url.as_str())
            .header("Accept", "application/json")
            .form(&params)
            .map_err(AuthError::from)
    }
}

/// Body of a token endpoint response.
///
/// Every field is optional on the wire; a response without `access_token`
/// or `expires_in` is rejected by the session.
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn client() -> OAuthClient {
        let endpoints = ServerEndpoints::public().unwrap();
        let config = OAuthConfig::new("client-1", "videosync://oauth2/callback")
            .with_client_secret("s3cret");
        OAuthClient::new(config, &endpoints)
    }

    fn form(request: &HttpRequest) -> HashMap<String, String> {
        let body = request.body.as_ref().unwrap();
        url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_pkce_values() {
        let pkce = PkceVerifier::new();
        assert_eq!(pkce.verifier().len(), 43);
        assert!(!pkce.state().is_empty());
        assert_ne!(pkce.challenge(), pkce.verifier());
        assert_ne!(PkceVerifier::new().state(), pkce.state());
        assert!(!format!("{:?}", pkce).contains(pkce.verifier()));
    }

    #[test]
    fn test_authorization_url() {
        let client = client();
        let pkce = PkceVerifier::new();
        let url = client.authorization_url(
            &[],
            &[("prompt".to_string(), "login".to_string())],
            &pkce,
        );

        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert!(url.as_str().starts_with("https://api.learning-layers.eu/o/oauth2/authorize?"));
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["scope"], "openid profile email offline_access");
        assert_eq!(query["state"], pkce.state());
        assert_eq!(query["code_challenge"], pkce.challenge());
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["prompt"], "login");
    }

    #[test]
    fn test_code_request() {
        let pkce = PkceVerifier::new();
        let request = client().code_request("the-code", Some(&pkce)).unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://api.learning-layers.eu/o/oauth2/token");
        let form = form(&request);
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "the-code");
        assert_eq!(form["code_verifier"], pkce.verifier());
        assert_eq!(form["client_secret"], "s3cret");
    }

    #[test]
    fn test_refresh_request() {
        let request = client().refresh_request("r-1").unwrap();
        let form = form(&request);
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "r-1");
        assert_eq!(form["client_id"], "client-1");
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_token_response_fields_are_optional() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"error":"invalid_grant"}"#).unwrap();
        assert!(parsed.access_token.is_none());
        assert!(parsed.expires_in.is_none());

        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3600,"token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(parsed.access_token.as_deref(), Some("a"));
        assert_eq!(parsed.expires_in, Some(3600));
        assert!(parsed.refresh_token.is_none());
    }
}
