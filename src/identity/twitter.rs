//! Twitter "Sign in with Twitter" via three-legged OAuth 1.0a.
//!
//! ## Flow
//!
//! 1. `POST /oauth/request_token` (signed with the consumer secret) → request
//!    token + secret; user is redirected to `/oauth/authenticate`
//! 2. Twitter redirects back with `oauth_token` + `oauth_verifier`
//! 3. `POST /oauth/access_token` (signed with the request-token secret) →
//!    access token + secret
//! 4. `GET /1.1/account/verify_credentials.json` (signed with the access
//!    token) → `screen_name` + `name`

use super::{
    HandshakeError, HandshakeKey, HandshakeSecret, IdentityProvider, PendingHandshake,
    ProviderKind, VerifiedIdentity,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Production API base URL.
pub const TWITTER_API_BASE: &str = "https://api.twitter.com";

pub struct TwitterProvider {
    client: reqwest::Client,
    consumer_key: String,
    consumer_secret: String,
    api_base: String,
}

impl TwitterProvider {
    pub fn new(
        client: reqwest::Client,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            api_base: TWITTER_API_BASE.to_string(),
        }
    }

    /// Point at a different API host (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the `Authorization: OAuth ...` header for one request.
    ///
    /// `oauth_extra` are additional `oauth_*` protocol parameters
    /// (`oauth_callback`, `oauth_verifier`). None of the calls made here
    /// carry query or body parameters, so only protocol parameters are signed.
    fn authorization_header(
        &self,
        method: &str,
        url: &str,
        token: Option<&str>,
        token_secret: &str,
        oauth_extra: &[(&str, &str)],
    ) -> String {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();

        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some(token) = token {
            oauth.push(("oauth_token".into(), token.to_string()));
        }
        for (k, v) in oauth_extra {
            oauth.push(((*k).to_string(), (*v).to_string()));
        }

        let signature = sign(method, url, &oauth, &self.consumer_secret, token_secret);
        oauth.push(("oauth_signature".into(), signature));

        let fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    async fn post_form(
        &self,
        url: &str,
        authorization: String,
    ) -> Result<HashMap<String, String>, HandshakeError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| HandshakeError::Provider(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HandshakeError::Provider(format!("unreadable response: {e}")))?;
        if !status.is_success() {
            return Err(HandshakeError::Provider(format!(
                "{url} returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(parse_form(&body))
    }
}

#[derive(serde::Deserialize)]
struct Credentials {
    screen_name: String,
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl IdentityProvider for TwitterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twitter
    }

    async fn begin_handshake(&self, callback_url: &str) -> Result<PendingHandshake, HandshakeError> {
        let url = format!("{}/oauth/request_token", self.api_base);
        let auth = self.authorization_header(
            "POST",
            &url,
            None,
            "",
            &[("oauth_callback", callback_url)],
        );
        let mut form = self.post_form(&url, auth).await?;

        if form.get("oauth_callback_confirmed").map(String::as_str) != Some("true") {
            return Err(HandshakeError::Provider(
                "callback URL was not confirmed".into(),
            ));
        }
        let token = form
            .remove("oauth_token")
            .ok_or_else(|| HandshakeError::Provider("missing oauth_token".into()))?;
        let secret = form
            .remove("oauth_token_secret")
            .ok_or_else(|| HandshakeError::Provider("missing oauth_token_secret".into()))?;

        Ok(PendingHandshake {
            redirect_url: format!(
                "{}/oauth/authenticate?oauth_token={}",
                self.api_base,
                encode(&token)
            ),
            key: HandshakeKey::new(ProviderKind::Twitter, token),
            secret: HandshakeSecret::new(secret),
        })
    }

    async fn complete_handshake(
        &self,
        key: &HandshakeKey,
        secret: &HandshakeSecret,
        verifier: &str,
    ) -> Result<VerifiedIdentity, HandshakeError> {
        if verifier.is_empty() {
            return Err(HandshakeError::Denied);
        }

        let url = format!("{}/oauth/access_token", self.api_base);
        let auth = self.authorization_header(
            "POST",
            &url,
            Some(key.token.as_str()),
            secret.expose(),
            &[("oauth_verifier", verifier)],
        );
        let form = self.post_form(&url, auth).await?;
        let access_token = form
            .get("oauth_token")
            .ok_or_else(|| HandshakeError::Provider("missing access token".into()))?;
        let access_secret = form
            .get("oauth_token_secret")
            .ok_or_else(|| HandshakeError::Provider("missing access token secret".into()))?;

        let url = format!("{}/1.1/account/verify_credentials.json", self.api_base);
        let auth =
            self.authorization_header("GET", &url, Some(access_token.as_str()), access_secret, &[]);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| HandshakeError::Provider(format!("verify_credentials failed: {e}")))?;
        if !response.status().is_success() {
            return Err(HandshakeError::Provider(format!(
                "verify_credentials returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let creds: Credentials = response
            .json()
            .await
            .map_err(|e| HandshakeError::Provider(format!("bad verify_credentials body: {e}")))?;

        tracing::debug!(provider = %ProviderKind::Twitter, "Handshake completed");
        Ok(VerifiedIdentity {
            display_name: creds.name.unwrap_or_else(|| creds.screen_name.clone()),
            username: creds.screen_name,
        })
    }
}

/// RFC 3986 percent-encoding as OAuth 1.0a requires (unreserved set only).
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// HMAC-SHA1 signature over the OAuth 1.0a signature base string.
fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(url),
        encode(&param_string)
    );
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(key.as_bytes()) else {
        // HMAC accepts keys of any length.
        return String::new();
    };
    mac.update(base.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Parse an `application/x-www-form-urlencoded` response body.
fn parse_form(body: &str) -> HashMap<String, String> {
    body.trim()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let k = urlencoding::decode(&k.replace('+', " ")).ok()?.into_owned();
            let v = urlencoding::decode(&v.replace('+', " ")).ok()?.into_owned();
            Some((k, v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn signature_matches_published_example() {
        // Worked example from Twitter's "Creating a signature" guide.
        let params: Vec<(String, String)> = [
            ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

        let signature = sign(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &params,
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        );
        assert_eq!(signature, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn encode_uses_unreserved_set() {
        assert_eq!(encode("a b+c/~_.-"), "a%20b%2Bc%2F~_.-");
    }

    #[test]
    fn parse_form_decodes_pairs() {
        let form = parse_form("oauth_token=abc&oauth_token_secret=d%2Fe&screen_name=Al+Ice\n");
        assert_eq!(form["oauth_token"], "abc");
        assert_eq!(form["oauth_token_secret"], "d/e");
        assert_eq!(form["screen_name"], "Al Ice");
    }

    fn provider(server: &MockServer) -> TwitterProvider {
        TwitterProvider::new(reqwest::Client::new(), "ckey", "csecret").with_api_base(server.uri())
    }

    #[tokio::test]
    async fn begin_handshake_returns_redirect_and_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
            ))
            .mount(&server)
            .await;

        let pending = provider(&server)
            .begin_handshake("https://gw.example.com/callback/twitter")
            .await
            .unwrap();
        assert_eq!(pending.key, HandshakeKey::new(ProviderKind::Twitter, "req-token"));
        assert_eq!(pending.secret.expose(), "req-secret");
        assert_eq!(
            pending.redirect_url,
            format!("{}/oauth/authenticate?oauth_token=req-token", server.uri())
        );
    }

    #[tokio::test]
    async fn begin_handshake_requires_confirmed_callback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("oauth_token=t&oauth_token_secret=s&oauth_callback_confirmed=false"),
            )
            .mount(&server)
            .await;

        let err = provider(&server).begin_handshake("cb").await.unwrap_err();
        assert!(matches!(err, HandshakeError::Provider(_)));
    }

    #[tokio::test]
    async fn complete_handshake_returns_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=acc-token&oauth_token_secret=acc-secret&user_id=1&screen_name=Alice",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.1/account/verify_credentials.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "screen_name": "Alice",
                "name": "Alice Liddell"
            })))
            .mount(&server)
            .await;

        let identity = provider(&server)
            .complete_handshake(
                &HandshakeKey::new(ProviderKind::Twitter, "req-token"),
                &HandshakeSecret::new("req-secret"),
                "verifier",
            )
            .await
            .unwrap();
        assert_eq!(identity.username, "Alice");
        assert_eq!(identity.display_name, "Alice Liddell");
    }

    #[tokio::test]
    async fn complete_handshake_surfaces_provider_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete_handshake(
                &HandshakeKey::new(ProviderKind::Twitter, "req-token"),
                &HandshakeSecret::new("req-secret"),
                "bad-verifier",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Provider(_)));
    }

    #[tokio::test]
    async fn empty_verifier_is_denied_without_network() {
        let server = MockServer::start().await;
        let err = provider(&server)
            .complete_handshake(
                &HandshakeKey::new(ProviderKind::Twitter, "t"),
                &HandshakeSecret::new("s"),
                "",
            )
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::Denied);
    }
}
