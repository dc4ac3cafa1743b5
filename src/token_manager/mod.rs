mod source;

pub use source::{AuthProviderClient, TokenSource};

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use oauth2::TokenResponse;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SyncEngineConfig;
use crate::db::DbActorHandle;
use crate::error::{IsRetryable, TokenError};

/// `last_refresh_time == 0` is the sentinel meaning "never refreshed" —
/// forces a refresh on first use regardless of `refresh_interval`, matching
/// the source system's `token_manager.py` policy exactly.
const NEVER_REFRESHED: i64 = 0;

struct TokenState {
    access_token: Option<String>,
    last_refresh_time: i64,
}

/// Brokers access tokens for one source connection. Concurrent callers all
/// share one `Mutex<TokenState>`; the refresh decision is made *inside* the
/// lock, so a caller that waited on the mutex behind a refresh in progress
/// re-checks freshness once it acquires the lock and finds there is nothing
/// left to do — a single mutex is enough to get double-checked-locking
/// semantics here because there is no read path that bypasses the lock.
pub struct TokenManager {
    source: TokenSource,
    http: reqwest::Client,
    retry_policy: ExponentialBuilder,
    state: Mutex<TokenState>,
    refresh_interval: Duration,
    /// Credential persistence goes through its own DB session, never the
    /// worker's, so a failed credential write can never poison the sync
    /// transaction the worker is mid-way through.
    credential_store: Option<CredentialStore>,
}

/// Where a successfully-refreshed access token is durably written back to,
/// kept deliberately separate from any worker's DB session/transaction.
struct CredentialStore {
    db: DbActorHandle,
    connection_key: String,
}

impl TokenManager {
    pub fn new(source: TokenSource, config: &SyncEngineConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeouts.http());
        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url).expect("invalid proxy url for TokenManager");
            builder = builder.proxy(proxy);
        }
        if config.disable_http2 {
            builder = builder.http1_only();
        }
        let http = builder.build().expect("failed to build TokenManager HTTP client");

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(3);

        Self {
            source,
            http,
            retry_policy,
            state: Mutex::new(TokenState {
                access_token: None,
                last_refresh_time: NEVER_REFRESHED,
            }),
            refresh_interval: Duration::from_secs(config.token_refresh_interval_seconds.max(0) as u64),
            credential_store: None,
        }
    }

    /// Attaches a dedicated DB session that successful refreshes write the
    /// new credential through, independent of any worker's session.
    pub fn with_credential_store(mut self, db: DbActorHandle, connection_key: String) -> Self {
        self.credential_store = Some(CredentialStore { db, connection_key });
        self
    }

    /// Returns a valid access token, proactively refreshing if the last
    /// refresh happened more than `refresh_interval` ago (or never did).
    pub async fn get_valid_token(&self) -> Result<String, TokenError> {
        if let TokenSource::DirectInjection(token) = &self.source {
            return Ok(token.clone());
        }

        let mut state = self.state.lock().await;
        if self.needs_refresh(&state) {
            self.do_refresh(&mut state).await?;
        }
        state.access_token.clone().ok_or(TokenError::NoCredential)
    }

    /// Forces a refresh regardless of the interval, used by callers after
    /// observing a 401 from the upstream API. `DirectInjection` sources
    /// have nothing to refresh and return the same static token.
    pub async fn refresh_on_unauthorized(&self) -> Result<String, TokenError> {
        if let TokenSource::DirectInjection(token) = &self.source {
            return Ok(token.clone());
        }
        if !self.source.supports_refresh() {
            return Err(TokenError::RefreshUnsupported);
        }

        let mut state = self.state.lock().await;
        self.do_refresh(&mut state).await?;
        state.access_token.clone().ok_or(TokenError::NoCredential)
    }

    fn needs_refresh(&self, state: &TokenState) -> bool {
        if state.access_token.is_none() || state.last_refresh_time == NEVER_REFRESHED {
            return true;
        }
        let elapsed = Utc::now().timestamp() - state.last_refresh_time;
        elapsed >= self.refresh_interval.as_secs() as i64
    }

    async fn do_refresh(&self, state: &mut TokenState) -> Result<(), TokenError> {
        let access_token = match &self.source {
            TokenSource::DirectInjection(token) => token.clone(),
            TokenSource::AuthProvider(provider) => {
                (|| async { provider.fetch_token().await })
                    .retry(self.retry_policy)
                    .when(TokenError::is_retryable)
                    .notify(|err, dur: Duration| {
                        warn!(error = %err, delay = ?dur, "retrying auth-provider token fetch");
                    })
                    .await?
            }
            TokenSource::OAuthRefresh { client, refresh_token } => {
                (|| async { exchange_refresh_token(&self.http, client, refresh_token).await })
                    .retry(self.retry_policy)
                    .when(TokenError::is_retryable)
                    .notify(|err, dur: Duration| {
                        warn!(error = %err, delay = ?dur, "retrying OAuth2 refresh-token exchange");
                    })
                    .await?
            }
            TokenSource::ClientCredentials { client } => {
                (|| async { exchange_client_credentials(&self.http, client).await })
                    .retry(self.retry_policy)
                    .when(TokenError::is_retryable)
                    .notify(|err, dur: Duration| {
                        warn!(error = %err, delay = ?dur, "retrying OAuth2 client-credentials exchange");
                    })
                    .await?
            }
        };

        state.access_token = Some(access_token.clone());
        state.last_refresh_time = Utc::now().timestamp();
        debug!("token refreshed");

        if let Some(store) = &self.credential_store {
            // Keyed on a deterministic UUID derived from the connection so
            // repeated refreshes for the same connection overwrite the same
            // cursor-table row rather than accumulating one per refresh.
            let connection_id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, store.connection_key.as_bytes());
            let payload = serde_json::json!({ "access_token": access_token }).to_string();
            if let Err(e) = store.db.set_sync_cursor(connection_id, payload).await {
                warn!(error = %e, "failed to persist refreshed credential (sync continues)");
            }
        }

        Ok(())
    }
}

async fn exchange_refresh_token(
    http: &reqwest::Client,
    client: &oauth2::basic::BasicClient<
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointSet,
    >,
    refresh_token: &oauth2::RefreshToken,
) -> Result<String, TokenError> {
    let response = client
        .exchange_refresh_token(refresh_token)
        .request_async(http)
        .await?;
    info!("OAuth2 refresh-token grant succeeded");
    Ok(response.access_token().secret().to_string())
}

async fn exchange_client_credentials(
    http: &reqwest::Client,
    client: &oauth2::basic::BasicClient<
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointSet,
    >,
) -> Result<String, TokenError> {
    let response = client.exchange_client_credentials().request_async(http).await?;
    info!("OAuth2 client-credentials grant succeeded");
    Ok(response.access_token().secret().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl AuthProviderClient for CountingProvider {
        async fn fetch_token(&self) -> Result<String, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("fresh-token".to_string())
        }
    }

    #[tokio::test]
    async fn direct_injection_never_refreshes() {
        let manager = TokenManager::new(TokenSource::DirectInjection("static-token".into()), &SyncEngineConfig::default());
        assert_eq!(manager.get_valid_token().await.unwrap(), "static-token");
        assert_eq!(manager.get_valid_token().await.unwrap(), "static-token");
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_exactly_one_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(TokenManager::new(
            TokenSource::AuthProvider(Arc::new(CountingProvider { calls: calls.clone() })),
            &SyncEngineConfig::default(),
        ));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.get_valid_token().await.unwrap() }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), "fresh-token");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_on_unauthorized_forces_a_second_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = TokenManager::new(
            TokenSource::AuthProvider(Arc::new(CountingProvider { calls: calls.clone() })),
            &SyncEngineConfig::default(),
        );
        manager.get_valid_token().await.unwrap();
        manager.refresh_on_unauthorized().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
