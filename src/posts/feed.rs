use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{BackendResult, Store};
use crate::models::{Post, PostQuery, SortOrder};
use crate::state::lock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedScope {
    #[default]
    Mine,
    All,
}

impl FeedScope {
    pub fn heading(self) -> &'static str {
        match self {
            FeedScope::Mine => "My Blog Posts",
            FeedScope::All => "All Blog Posts",
        }
    }
}

/// Client-side filters. Changing them never re-queries.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    pub search: String,
    pub images_only: bool,
}

impl FeedFilter {
    pub fn matches(&self, post: &Post) -> bool {
        if self.images_only && !post.has_image() {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || post.title.to_lowercase().contains(&needle)
            || post.content.to_lowercase().contains(&needle)
    }
}

pub fn filter_posts<'a>(posts: &'a [Post], filter: &FeedFilter) -> Vec<&'a Post> {
    posts.iter().filter(|post| filter.matches(post)).collect()
}

/// Everything a query depends on. The feed re-queries when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeedKey {
    owner: Uuid,
    scope: FeedScope,
    order: SortOrder,
    refresh: u64,
}

#[derive(Debug)]
pub struct FeedRequest {
    generation: u64,
    pub query: PostQuery,
}

#[derive(Debug, Default)]
pub struct PostFeed {
    scope: FeedScope,
    order: SortOrder,
    refresh: u64,
    generation: u64,
    requested: Option<FeedKey>,
    posts: Vec<Post>,
    loading: bool,
    error: Option<String>,
}

impl PostFeed {
    pub fn scope(&self) -> FeedScope {
        self.scope
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_scope(&mut self, scope: FeedScope) {
        self.scope = scope;
    }

    pub fn set_order(&mut self, order: SortOrder) {
        self.order = order;
    }

    pub fn toggle_order(&mut self) {
        self.order = self.order.toggled();
    }

    /// Forces a re-query on the next load, e.g. after a new post.
    pub fn refresh(&mut self) {
        self.refresh += 1;
    }

    /// Starts a query if the parameters changed since the last one.
    pub fn begin(&mut self, owner: Uuid) -> Option<FeedRequest> {
        let key = FeedKey {
            owner,
            scope: self.scope,
            order: self.order,
            refresh: self.refresh,
        };
        if self.requested == Some(key) {
            return None;
        }

        self.generation += 1;
        self.requested = Some(key);
        self.loading = true;
        Some(FeedRequest {
            generation: self.generation,
            query: PostQuery {
                owner: (key.scope == FeedScope::Mine).then_some(owner),
                order: key.order,
            },
        })
    }

    /// Applies a query result. Returns false when a newer query superseded it.
    pub fn complete(&mut self, request: FeedRequest, result: BackendResult<Vec<Post>>) -> bool {
        if request.generation != self.generation {
            tracing::debug!(
                generation = request.generation,
                current = self.generation,
                "discarding stale feed response"
            );
            return false;
        }

        self.loading = false;
        match result {
            Ok(posts) => {
                self.posts = posts;
                self.error = None;
            }
            Err(e) => {
                tracing::warn!("error fetching posts: {e}");
                self.error = Some(e.to_string());
                self.requested = None;
            }
        }
        true
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn visible(&self, filter: &FeedFilter) -> Vec<&Post> {
        filter_posts(&self.posts, filter)
    }
}

/// Runs a query for `owner` if one is due. The lock is only held around the
/// bookkeeping, never across the request.
pub async fn load(feed: &Mutex<PostFeed>, store: &dyn Store, owner: Uuid) -> bool {
    let request = {
        let mut feed = lock(feed);
        feed.begin(owner)
    };
    let Some(request) = request else {
        return false;
    };

    let result = store.list_posts(&request.query).await;
    let mut feed = lock(feed);
    feed.complete(request, result)
}
