//! Google consent flow used to obtain the delegated Gmail tokens that an
//! ingestion request carries. The ingestion job itself never refreshes them.
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::OAuthSettings;
use crate::errors::{IngestError, IngestResult};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

#[derive(Clone, Debug)]
pub struct TokenBundle {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
}

pub struct AuthorizationRequest {
    pub url: String,
    pub csrf: CsrfToken,
    pub verifier: PkceCodeVerifier,
}

/// Query parameters Google appends to the redirect.
#[derive(Debug, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

pub fn authorization_url(
    settings: &OAuthSettings,
    redirect: &str,
) -> IngestResult<AuthorizationRequest> {
    let client = build_client(settings, redirect)?;
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let mut req = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(GMAIL_READONLY_SCOPE.to_string()))
        .add_extra_param("access_type", "offline")
        .set_pkce_challenge(challenge);
    if settings.force_consent {
        req = req.add_extra_param("prompt", "consent");
    }
    let (url, csrf) = req.url();
    Ok(AuthorizationRequest {
        url: url.to_string(),
        csrf,
        verifier,
    })
}

pub async fn exchange_code(
    settings: &OAuthSettings,
    redirect: &str,
    code: String,
    verifier: PkceCodeVerifier,
) -> IngestResult<TokenBundle> {
    let client = build_client(settings, redirect)?;
    let token_res = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(verifier)
        .request_async(async_http_client)
        .await
        .map_err(|e| IngestError::Auth(format!("token exchange failed: {e}")))?;

    Ok(TokenBundle {
        access_token: token_res.access_token().secret().to_string(),
        expires_at: token_res
            .expires_in()
            .map(|d| Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::seconds(0))),
        refresh_token: token_res.refresh_token().map(|r| r.secret().to_string()),
    })
}

/// Runs the consent flow end to end on a loopback redirect: opens the browser,
/// waits for Google's callback, and exchanges the code for tokens.
pub async fn authorize_via_loopback(settings: &OAuthSettings) -> IngestResult<TokenBundle> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| IngestError::Config(format!("failed to bind loopback port: {e}")))?;
    let local_port = listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| IngestError::Config(format!("failed to read local addr: {e}")))?;

    let redirect = build_redirect_url(&settings.redirect_uri, local_port)?;
    let request = authorization_url(settings, &redirect)?;
    info!(redirect = %redirect, force_consent = settings.force_consent, "Opening browser for Google OAuth consent");
    open_in_browser(&request.url);

    let callback = listen_for_callback(listener).await?;
    if callback.state != *request.csrf.secret() {
        return Err(IngestError::Auth("OAuth state mismatch".into()));
    }

    exchange_code(settings, &redirect, callback.code, request.verifier).await
}

/// Extracts the authorization code from a callback request path. A denied
/// consent or a missing code is an authorization failure.
pub fn parse_callback(path: &str) -> IngestResult<CallbackParams> {
    let parsed = url::Url::parse(&format!("http://localhost{path}"))
        .map_err(|e| IngestError::Protocol(format!("failed to parse callback url: {e}")))?;
    let param = |name: &str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
    };

    if let Some(error) = param("error") {
        return Err(IngestError::Auth(format!("access denied: {error}")));
    }
    let code = param("code")
        .ok_or_else(|| IngestError::Auth("No authorization code received".into()))?;
    Ok(CallbackParams {
        code,
        state: param("state").unwrap_or_default(),
    })
}

fn build_redirect_url(base: &str, port: u16) -> IngestResult<String> {
    let mut url = url::Url::parse(base)
        .map_err(|e| IngestError::Config(format!("invalid redirect uri {base}: {e}")))?;
    url.set_port(Some(port))
        .map_err(|_| IngestError::Config("failed to set redirect port".into()))?;
    Ok(url.to_string())
}

fn build_client(settings: &OAuthSettings, redirect: &str) -> IngestResult<BasicClient> {
    let auth_url = AuthUrl::new(AUTH_URL.to_string())
        .map_err(|e| IngestError::Config(format!("invalid auth url: {e}")))?;
    let token_url = TokenUrl::new(TOKEN_URL.to_string())
        .map_err(|e| IngestError::Config(format!("invalid token url: {e}")))?;
    let redirect_url = RedirectUrl::new(redirect.to_string())
        .map_err(|e| IngestError::Config(format!("invalid redirect uri {redirect}: {e}")))?;

    Ok(BasicClient::new(
        ClientId::new(settings.client_id.clone()),
        Some(ClientSecret::new(settings.client_secret.clone())),
        auth_url,
        Some(token_url),
    )
    .set_redirect_uri(redirect_url)
    .set_auth_type(oauth2::AuthType::RequestBody))
}

async fn listen_for_callback(listener: TcpListener) -> IngestResult<CallbackParams> {
    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| IngestError::Transient(format!("redirect accept failed: {e}")))?;

    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| IngestError::Transient(format!("reading auth callback failed: {e}")))?;
    let req = String::from_utf8_lossy(&buf[..n]);
    let path = req
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| IngestError::Protocol("invalid HTTP request on redirect".into()))?;

    let parsed = parse_callback(path);
    let reply = if parsed.is_ok() {
        "Gmail connected. You can close this tab."
    } else {
        "Gmail authorization failed. Check the terminal for details."
    };
    let response =
        format!("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n{reply}");
    let _ = stream.write_all(response.as_bytes()).await;
    parsed
}

fn open_in_browser(url: &str) {
    let attempt = if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(url).status()
    } else if cfg!(target_os = "windows") {
        std::process::Command::new("rundll32.exe")
            .args(["url.dll,FileProtocolHandler", url])
            .status()
    } else {
        std::process::Command::new("xdg-open").arg(url).status()
    };
    if let Err(e) = attempt {
        warn!("Could not auto-open browser: {e}. Open this URL manually:\n{url}");
    } else {
        eprintln!("If your browser did not open, navigate to:\n{url}");
    }
}
