//! Credential fallback chain for git-hosting adapters
//!
//! Providers are consulted in a fixed order and the first one that yields a
//! token wins:
//!
//! 1. **explicit**: the token configured on the source
//! 2. **session**: an ambient platform session ([`SessionProvider`])
//! 3. **cli**: `gh auth token` / `glab auth token`
//! 4. **none**: anonymous access
//!
//! The resolved token is cached on the chain. When the server rejects it the
//! adapter calls [`AuthChain::invalidate`] and resolves again, which restarts
//! from the top but skips an explicit token that was already rejected.

use crate::error::{Result, SourceError};
use async_trait::async_trait;
use cairn_core::token_preview;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Hosting platform a chain resolves credentials for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    GitHub,
    GitLab,
}

impl Platform {
    /// Environment variables holding an ambient session token, in priority order
    pub fn session_env_vars(&self) -> &'static [&'static str] {
        match self {
            Platform::GitHub => &["GITHUB_TOKEN", "GH_TOKEN"],
            Platform::GitLab => &["GITLAB_TOKEN"],
        }
    }

    /// Platform CLI able to print the logged-in user's token
    pub fn cli_command(&self) -> &'static str {
        match self {
            Platform::GitHub => "gh",
            Platform::GitLab => "glab",
        }
    }

    fn remediation_hint(&self) -> String {
        match self {
            Platform::GitHub => "Add a token with repo read access to the source, or run `gh auth login`.".to_string(),
            Platform::GitLab => "Add a token with read_api scope to the source, or run `glab auth login`.".to_string(),
        }
    }
}

/// How a token was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    Explicit,
    Session,
    Cli,
    None,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Explicit => "explicit",
            AuthMethod::Session => "session",
            AuthMethod::Cli => "cli",
            AuthMethod::None => "none",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A token together with the method that produced it
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: String,
    pub method: AuthMethod,
}

impl fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("token", &token_preview(&self.token))
            .field("method", &self.method)
            .finish()
    }
}

/// One step of the chain
///
/// Returns `None` when this provider has nothing to offer; that is not an
/// error and the chain simply moves on.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn method(&self) -> AuthMethod;

    async fn token(&self) -> Option<String>;
}

/// Source of an ambient platform session token
///
/// Injected so hosts embedding the registry can hand over their own signed-in
/// session; the default reads the platform's environment variables.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session_token(&self, platform: Platform) -> Option<String>;
}

/// Session provider backed by `GITHUB_TOKEN`/`GH_TOKEN`/`GITLAB_TOKEN`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSession;

#[async_trait]
impl SessionProvider for EnvSession {
    async fn session_token(&self, platform: Platform) -> Option<String> {
        platform
            .session_env_vars()
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }
}

/// Token configured directly on the source
pub struct ExplicitToken(Option<String>);

impl ExplicitToken {
    pub fn new(token: Option<&str>) -> Self {
        Self(
            token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from),
        )
    }
}

#[async_trait]
impl TokenProvider for ExplicitToken {
    fn method(&self) -> AuthMethod {
        AuthMethod::Explicit
    }

    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Adapts a [`SessionProvider`] into a chain step
pub struct SessionToken {
    platform: Platform,
    session: Arc<dyn SessionProvider>,
}

impl SessionToken {
    pub fn new(platform: Platform, session: Arc<dyn SessionProvider>) -> Self {
        Self { platform, session }
    }
}

#[async_trait]
impl TokenProvider for SessionToken {
    fn method(&self) -> AuthMethod {
        AuthMethod::Session
    }

    async fn token(&self) -> Option<String> {
        self.session.session_token(self.platform).await
    }
}

/// Asks the platform CLI for its stored token
pub struct CliToken {
    platform: Platform,
    timeout: Duration,
}

impl CliToken {
    pub fn new(platform: Platform, timeout: Duration) -> Self {
        Self { platform, timeout }
    }
}

#[async_trait]
impl TokenProvider for CliToken {
    fn method(&self) -> AuthMethod {
        AuthMethod::Cli
    }

    async fn token(&self) -> Option<String> {
        let command = self.platform.cli_command();
        if which::which(command).is_err() {
            debug!("{} not found on PATH, skipping CLI auth", command);
            return None;
        }

        let result = tokio::time::timeout(self.timeout, async {
            Command::new(command).args(["auth", "token"]).output().await
        })
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!token.is_empty()).then_some(token)
            }
            Ok(Ok(_)) => {
                debug!("`{} auth token` exited unsuccessfully", command);
                None
            }
            Ok(Err(e)) => {
                debug!("Failed to run {}: {}", command, e);
                None
            }
            Err(_) => {
                warn!(
                    "`{} auth token` did not finish within {}s",
                    command,
                    self.timeout.as_secs()
                );
                None
            }
        }
    }
}

#[derive(Default)]
struct ChainState {
    cached: Option<ResolvedToken>,
    attempted: Vec<AuthMethod>,
    explicit_rejected: bool,
}

impl ChainState {
    fn record(&mut self, method: AuthMethod) {
        if !self.attempted.contains(&method) {
            self.attempted.push(method);
        }
    }
}

/// Ordered credential resolution with a per-instance cache
pub struct AuthChain {
    platform: Platform,
    providers: Vec<Box<dyn TokenProvider>>,
    state: Mutex<ChainState>,
}

impl AuthChain {
    /// Build a chain from providers in the order they should be consulted
    pub fn new(platform: Platform, providers: Vec<Box<dyn TokenProvider>>) -> Self {
        Self {
            platform,
            providers,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// The standard explicit, session, cli chain
    pub fn standard(
        platform: Platform,
        explicit: Option<&str>,
        session: Arc<dyn SessionProvider>,
        cli_timeout: Option<Duration>,
    ) -> Self {
        let mut providers: Vec<Box<dyn TokenProvider>> = vec![
            Box::new(ExplicitToken::new(explicit)),
            Box::new(SessionToken::new(platform, session)),
        ];
        if let Some(timeout) = cli_timeout {
            providers.push(Box::new(CliToken::new(platform, timeout)));
        }
        Self::new(platform, providers)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Resolve a token, consulting providers only when nothing is cached
    pub async fn resolve(&self) -> Option<ResolvedToken> {
        let mut state = self.state.lock().await;
        if let Some(cached) = &state.cached {
            return Some(cached.clone());
        }

        for provider in &self.providers {
            let method = provider.method();
            if method == AuthMethod::Explicit && state.explicit_rejected {
                continue;
            }

            state.record(method);
            if let Some(token) = provider.token().await {
                info!(
                    "Using {} credentials for {:?} ({})",
                    method,
                    self.platform,
                    token_preview(&token)
                );
                let resolved = ResolvedToken { token, method };
                state.cached = Some(resolved.clone());
                return Some(resolved);
            }
        }

        state.record(AuthMethod::None);
        debug!("No credentials available for {:?}, using anonymous access", self.platform);
        None
    }

    /// Drop the cached token after the server rejected it
    ///
    /// Returns the method that was invalidated, or `None` when the rejected
    /// request was anonymous.
    pub async fn invalidate(&self, reason: &str) -> Option<AuthMethod> {
        let mut state = self.state.lock().await;
        let previous = state.cached.take()?;
        warn!(
            "Invalidating {} credentials ({}): {}",
            previous.method,
            token_preview(&previous.token),
            reason
        );
        state.record(previous.method);
        if previous.method == AuthMethod::Explicit {
            state.explicit_rejected = true;
        }
        Some(previous.method)
    }

    /// Methods consulted so far, in order
    pub async fn attempted(&self) -> Vec<AuthMethod> {
        self.state.lock().await.attempted.clone()
    }

    /// Error describing every method tried for a rejected request
    pub async fn exhausted(&self, status: u16) -> SourceError {
        let attempted = self
            .attempted()
            .await
            .iter()
            .map(AuthMethod::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        SourceError::AuthExhausted {
            status,
            attempted,
            hint: self.platform.remediation_hint(),
        }
    }

    /// Run `op` with the current credentials, retrying once on 401/403
    ///
    /// The retry only happens when invalidation leads to different
    /// credentials; otherwise the rejection is reported straight away.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let first = self.resolve().await;
        let first_token = first.as_ref().map(|t| t.token.clone());

        let status = match op(first_token.clone()).await {
            Err(e) if e.is_auth_failure() => e.status().unwrap_or(401),
            other => return other,
        };

        if self
            .invalidate(&format!("server responded with HTTP {}", status))
            .await
            .is_none()
        {
            return Err(self.exhausted(status).await);
        }

        let second_token = self.resolve().await.map(|t| t.token);
        if second_token.is_some() && second_token == first_token {
            return Err(self.exhausted(status).await);
        }

        match op(second_token).await {
            Err(e) if e.is_auth_failure() => {
                let status = e.status().unwrap_or(status);
                self.invalidate(&format!("retry rejected with HTTP {}", status))
                    .await;
                Err(self.exhausted(status).await)
            }
            other => other,
        }
    }
}
