use axum::{debug_handler, extract::{Multipart, State}, response::Redirect};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::models::{Post, SortOrder};
use crate::state::lock;
use crate::{form::FormData, include_res, res, AppResult, AppState, Markdown};

use super::{FeedFilter, FeedScope, PostComposer, PostFeed};

pub fn composer(composer: &PostComposer) -> String {
    include_res!(str, "/pages/posts/composer.html")
        .replace("{error}", &res::error_line(composer.error.as_deref()))
        .replace("{title}", &res::escape(&composer.title))
        .replace("{content}", &res::escape(&composer.content))
}

fn order_label(order: SortOrder) -> &'static str {
    match order {
        SortOrder::NewestFirst => "Oldest first",
        SortOrder::OldestFirst => "Newest first",
    }
}

fn author(post: &Post) -> String {
    let (name, avatar) = match &post.author {
        Some(author) => (
            author.username.as_deref().filter(|name| !name.is_empty()),
            author.avatar_url.as_deref(),
        ),
        None => (None, None),
    };
    format!(
        r#"<span class="author">{}<span>{}</span></span>"#,
        res::avatar(avatar),
        res::escape(name.unwrap_or("Anonymous")),
    )
}

fn post(post: &Post, show_author: bool) -> String {
    let image = match post.image_url.as_deref() {
        Some(url) if !url.is_empty() => {
            format!(r#"<img class="post-image" src="{}" alt="Post">"#, res::escape(url))
        }
        _ => String::new(),
    };
    let created_at = post.created_at.format(&Rfc3339).unwrap_or_default();
    let created_at_label = post
        .created_at
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default();

    include_res!(str, "/pages/posts/post.html")
        .replace("{content}", &Markdown(post.content.as_str()).to_html())
        .replace("{image}", &image)
        .replace("{created_at_label}", &created_at_label)
        .replace("{created_at}", &created_at)
        .replace("{author}", &if show_author { author(post) } else { String::new() })
        .replace("{title}", &res::escape(&post.title))
}

pub fn feed(feed: &PostFeed, filter: &FeedFilter) -> String {
    let scope = feed.scope();
    let posts = if feed.is_loading() {
        r#"<div class="loading">Loading...</div>"#.to_owned()
    } else {
        let visible = feed.visible(filter);
        if visible.is_empty() {
            "<div>No posts yet.</div>".to_owned()
        } else {
            visible
                .into_iter()
                .map(|p| post(p, scope == FeedScope::All))
                .collect()
        }
    };

    let (mine_class, all_class) = match scope {
        FeedScope::Mine => ("active", ""),
        FeedScope::All => ("", "active"),
    };

    include_res!(str, "/pages/posts/feed.html")
        .replace("{mine_class}", mine_class)
        .replace("{all_class}", all_class)
        .replace("{images_checked}", if filter.images_only { "checked" } else { "" })
        .replace("{other_order}", feed.order().toggled().as_str())
        .replace("{order_label}", order_label(feed.order()))
        .replace("{heading}", scope.heading())
        .replace("{error}", &res::error_line(feed.error()))
        .replace("{posts}", &posts)
        .replace("{search}", &res::escape(&filter.search))
}

#[debug_handler]
pub(crate) async fn create(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Redirect> {
    let Some(identity) = state.session.identity() else {
        return Ok(Redirect::to("/login"));
    };
    let mut form = FormData::read(multipart).await?;
    let image = form.take_file("image");

    let mut composer = state.ui.composer.lock().await;
    composer.title = form.text("title").to_owned();
    composer.content = form.text("content").to_owned();

    if form.text("action") == "generate" {
        let _ = composer.generate(state.services.generator.as_ref()).await;
    } else if composer.submit(&state.services, identity.id, image).await.is_ok() {
        lock(&state.ui.feed).refresh();
    }

    Ok(Redirect::to("/"))
}
