use std::fmt::Display;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::backend::{BackendResult, MESSAGES, POSTS, PROFILES, Store};
use crate::models::{Message, NewMessage, NewPost, Post, PostQuery, Profile};

use super::{SupabaseClient, check};

pub const POST_COLUMNS: &str =
    "id, title, content, created_at, image_url, profiles(username, avatar_url), user_id";

/// A PostgREST read, compiled to query-string parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RestQuery {
    table: &'static str,
    params: Vec<(String, String)>,
}

impl RestQuery {
    pub fn from(table: &'static str) -> Self {
        RestQuery {
            table,
            params: Vec::new(),
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_owned(), columns.to_owned()));
        self
    }

    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.params.push((column.to_owned(), format!("eq.{value}")));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Display) -> Self {
        self.params.push((column.to_owned(), format!("neq.{value}")));
        self
    }

    /// `clauses` are already in PostgREST's logic-tree syntax.
    pub fn or(mut self, clauses: &str) -> Self {
        self.params.push(("or".to_owned(), format!("({clauses})")));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params.push(("order".to_owned(), format!("{column}.{direction}")));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

fn conversation_filter(a: Uuid, b: Uuid) -> String {
    format!("and(sender_id.eq.{a},receiver_id.eq.{b}),and(sender_id.eq.{b},receiver_id.eq.{a})")
}

pub fn posts_query(query: &PostQuery) -> RestQuery {
    let rest = RestQuery::from(POSTS)
        .select(POST_COLUMNS)
        .order("created_at", query.order.ascending());
    match query.owner {
        Some(owner) => rest.eq("user_id", owner),
        None => rest,
    }
}

impl SupabaseClient {
    async fn select<T: DeserializeOwned>(&self, query: RestQuery) -> BackendResult<Vec<T>> {
        let token = self.access_token().await?;
        let request = self
            .http
            .get(self.endpoint(["rest", "v1", query.table]))
            .query(query.params());
        let response = check(self.with_key(request, &token).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, rows: &T, upsert: bool) -> BackendResult<()> {
        let token = self.access_token().await?;
        let prefer = if upsert {
            "return=minimal,resolution=merge-duplicates"
        } else {
            "return=minimal"
        };
        let request = self
            .http
            .post(self.endpoint(["rest", "v1", table]))
            .header("Prefer", prefer)
            .json(rows);
        check(self.with_key(request, &token).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SupabaseClient {
    async fn fetch_profile(&self, id: Uuid) -> BackendResult<Option<Profile>> {
        let rows: Vec<Profile> = self
            .select(
                RestQuery::from(PROFILES)
                    .select("id, username, avatar_url, isModal")
                    .eq("id", id),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_profile(&self, profile: &Profile) -> BackendResult<()> {
        self.insert(PROFILES, std::slice::from_ref(profile), true).await
    }

    async fn list_profiles_except(&self, id: Uuid) -> BackendResult<Vec<Profile>> {
        self.select(
            RestQuery::from(PROFILES)
                .select("id, username, avatar_url")
                .neq("id", id),
        )
        .await
    }

    async fn list_posts(&self, query: &PostQuery) -> BackendResult<Vec<Post>> {
        self.select(posts_query(query)).await
    }

    async fn insert_post(&self, post: &NewPost) -> BackendResult<()> {
        self.insert(POSTS, std::slice::from_ref(post), false).await
    }

    async fn conversation(&self, a: Uuid, b: Uuid) -> BackendResult<Vec<Message>> {
        self.select(
            RestQuery::from(MESSAGES)
                .select("*")
                .or(&conversation_filter(a, b))
                .order("created_at", true),
        )
        .await
    }

    async fn insert_message(&self, message: &NewMessage) -> BackendResult<()> {
        self.insert(MESSAGES, std::slice::from_ref(message), false).await
    }
}
