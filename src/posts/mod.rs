pub mod composer;
pub mod feed;
mod page;

use axum::{routing::post, Router};

use crate::AppState;

pub use composer::{post_image_path, PostComposer, POST_IMAGES_BUCKET};
pub use feed::{filter_posts, FeedFilter, FeedRequest, FeedScope, PostFeed};
pub use page::{composer as render_composer, feed as render_feed};

pub fn router() -> Router<AppState> {
    Router::new().route("/posts", post(page::create))
}
