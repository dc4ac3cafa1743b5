use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{EndpointNotSet, EndpointSet, RefreshToken};

/// The configuration state this crate requires of an oauth2 `Client`: only
/// the token endpoint set (the other optional endpoints are unused here).
type ConfiguredBasicClient = BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

use crate::error::TokenError;

/// A pluggable "go fetch a fresh token" strategy used by connectors that
/// don't fit the OAuth2 refresh-token grant (e.g. an external auth-provider
/// SDK that manages its own token lifecycle).
#[async_trait]
pub trait AuthProviderClient: Send + Sync + fmt::Debug {
    async fn fetch_token(&self) -> Result<String, TokenError>;
}

/// The four ways a connection can obtain a valid access token. Modeled as
/// an enum rather than one trait per source: `TokenManager` needs to know
/// which branch it is in order to decide whether refreshing is even
/// possible (`DirectInjection` never refreshes; `refresh_on_unauthorized`
/// on it is a no-op returning the same static token).
pub enum TokenSource {
    /// A token supplied directly by the caller (e.g. a long-lived PAT).
    /// Never expires from this crate's point of view.
    DirectInjection(String),

    /// Delegates fetching to an external provider client.
    AuthProvider(Arc<dyn AuthProviderClient>),

    /// Standard OAuth2 refresh-token grant against `client`.
    OAuthRefresh {
        client: Box<ConfiguredBasicClient>,
        refresh_token: RefreshToken,
    },

    /// OAuth2 client-credentials grant (service-to-service, no user
    /// refresh token involved).
    ClientCredentials {
        client: Box<ConfiguredBasicClient>,
    },
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::DirectInjection(_) => write!(f, "TokenSource::DirectInjection(..)"),
            TokenSource::AuthProvider(_) => write!(f, "TokenSource::AuthProvider(..)"),
            TokenSource::OAuthRefresh { .. } => write!(f, "TokenSource::OAuthRefresh {{ .. }}"),
            TokenSource::ClientCredentials { .. } => write!(f, "TokenSource::ClientCredentials {{ .. }}"),
        }
    }
}

impl TokenSource {
    /// `DirectInjection` has no refresh concept; treating it as "always
    /// fresh" lets `TokenManager` skip the refresh-interval bookkeeping for
    /// it entirely.
    pub fn supports_refresh(&self) -> bool {
        !matches!(self, TokenSource::DirectInjection(_))
    }
}
