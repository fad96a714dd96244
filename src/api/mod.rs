//! Remote collaborators
//!
//! The crawler talks to the remote directory service through two traits so
//! the pipeline can run against the real API or an in-memory fake:
//!
//! - [`CommunitySearch`] answers keyword lookups
//! - [`DescriptionSource`] fetches a community's description text
//!
//! Both are synchronous and may fail. Implementations are responsible for
//! their own rate limiting.

pub mod reddit;

pub use reddit::{RedditClient, RedditCredentials};

use crate::error::ApiResult;

/// A single search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Community name (unique key)
    pub name: String,

    /// Sensitive-content classification
    pub is_restricted: bool,
}

impl SearchHit {
    pub fn new(name: impl Into<String>, is_restricted: bool) -> Self {
        Self {
            name: name.into(),
            is_restricted,
        }
    }
}

/// Descriptive text and access flags for one community
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityDescription {
    /// Free-form description text
    pub description_text: String,

    /// Whether the community is publicly accessible
    pub is_public: bool,

    /// Sensitive-content classification
    pub is_restricted: bool,
}

/// Keyword search against the directory service
pub trait CommunitySearch: Send + Sync {
    /// Return at most `limit` communities matching `term`
    fn search(&self, term: &str, limit: usize) -> ApiResult<Vec<SearchHit>>;
}

/// Description lookup for a named community
pub trait DescriptionSource: Send + Sync {
    /// Fetch the description of `name`
    ///
    /// Fails with `ApiError::NotFound` or `ApiError::Private` when the
    /// community cannot be read.
    fn get_description(&self, name: &str) -> ApiResult<CommunityDescription>;
}
