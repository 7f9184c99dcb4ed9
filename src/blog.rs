//! Client for the blog REST API that accompanies the assistant.
//!
//! Plain request/response JSON calls: posts with search/tag/sort/pagination,
//! comments, tags, newsletter signup, and bearer-token auth. On a `401` the
//! client refreshes the access token once and retries; if the refresh also
//! fails, stored credentials are cleared and the error surfaces to the
//! caller.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChatError;

// ---------------------------------------------------------------------------
// Token store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Durable access/refresh token storage. Unlike the conversation context,
/// tokens survive across sessions when file-backed.
#[derive(Debug)]
pub struct TokenStore {
    inner: Mutex<Option<TokenPair>>,
    path: Option<PathBuf>,
}

impl TokenStore {
    pub fn in_memory() -> Self {
        TokenStore {
            inner: Mutex::new(None),
            path: None,
        }
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let tokens = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());
        TokenStore {
            inner: Mutex::new(tokens),
            path: Some(path),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("token lock poisoned")
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("token lock poisoned")
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    pub fn store(&self, tokens: TokenPair) {
        let mut guard = self.inner.lock().expect("token lock poisoned");
        *guard = Some(tokens);
        self.persist(&guard);
    }

    /// Replace only the access token, keeping the refresh token.
    pub fn store_access(&self, access_token: String) {
        let mut guard = self.inner.lock().expect("token lock poisoned");
        if let Some(pair) = guard.as_mut() {
            pair.access_token = access_token;
        }
        self.persist(&guard);
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("token lock poisoned");
        *guard = None;
        self.persist(&guard);
    }

    fn persist(&self, tokens: &Option<TokenPair>) {
        let Some(path) = &self.path else { return };
        let result = match tokens {
            Some(pair) => serde_json::to_string_pretty(pair)
                .map_err(std::io::Error::other)
                .and_then(|raw| {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, raw)
                }),
            None => match std::fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to persist tokens");
        }
    }
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub reading_time: Option<u32>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub featured: bool,
}

/// One page of the post listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
}

/// Search / filter / sort / pagination parameters for the post listing.
#[derive(Debug, Clone, Serialize)]
pub struct PostQuery {
    pub search: String,
    pub page: u32,
    pub limit: u32,
    /// Comma-joined tag filter, empty for all.
    pub tags: String,
    pub sort: String,
}

impl Default for PostQuery {
    fn default() -> Self {
        PostQuery {
            search: String::new(),
            page: 1,
            limit: 9,
            tags: String::new(),
            sort: "date_desc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub author_name: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub author_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub tags: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

// ---------------------------------------------------------------------------
// API client
// ---------------------------------------------------------------------------

pub struct BlogApi {
    client: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl BlogApi {
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenStore>) -> Self {
        let base_url = base_url.into();
        BlogApi {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    // -- public, unauthenticated ---------------------------------------------

    pub async fn list_posts(&self, query: &PostQuery) -> Result<PostPage, ChatError> {
        let url = format!("{}/blog/posts", self.base_url);
        let response = self.client.get(&url).query(query).send().await?;
        Self::into_json(response).await
    }

    pub async fn get_post(&self, slug: &str) -> Result<Post, ChatError> {
        let url = format!("{}/blog/posts/{slug}", self.base_url);
        Self::into_json(self.client.get(&url).send().await?).await
    }

    pub async fn related_posts(&self, post_id: u64, limit: u32) -> Result<Vec<Post>, ChatError> {
        let url = format!("{}/blog/posts/{post_id}/related", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Record one view of a post. Fire-and-forget on the frontend, so the
    /// body is ignored.
    pub async fn increment_views(&self, post_id: u64) -> Result<(), ChatError> {
        let url = format!("{}/blog/posts/{post_id}/views", self.base_url);
        let response = self.client.post(&url).send().await?;
        Self::check_status(response).await.map(|_| ())
    }

    pub async fn comments(&self, post_id: u64) -> Result<Vec<Comment>, ChatError> {
        let url = format!("{}/blog/posts/{post_id}/comments", self.base_url);
        Self::into_json(self.client.get(&url).send().await?).await
    }

    pub async fn tags(&self) -> Result<Vec<Tag>, ChatError> {
        let url = format!("{}/blog/tags", self.base_url);
        Self::into_json(self.client.get(&url).send().await?).await
    }

    pub async fn subscribe_newsletter(&self, email: &str) -> Result<(), ChatError> {
        let url = format!("{}/blog/newsletter/subscribe", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        Self::check_status(response).await.map(|_| ())
    }

    // -- authenticated -------------------------------------------------------

    pub async fn add_comment(
        &self,
        post_id: u64,
        comment: &NewComment,
    ) -> Result<Comment, ChatError> {
        let path = format!("/blog/posts/{post_id}/comments");
        self.authed_json(Method::POST, &path, comment).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post, ChatError> {
        self.authed_json(Method::POST, "/blog/posts", post).await
    }

    pub async fn create_tag(&self, name: &str) -> Result<Tag, ChatError> {
        let body = serde_json::json!({ "name": name });
        self.authed_json(Method::POST, "/blog/tags", &body).await
    }

    // -- auth ----------------------------------------------------------------

    /// Log in and store the returned token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ChatError> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        if !response.status().is_success() {
            let detail = response.text().await?;
            return Err(ChatError::Auth(detail));
        }
        let pair: TokenPair = response.json().await?;
        self.tokens.store(pair.clone());
        Ok(pair)
    }

    /// Exchange the refresh token for a new access token. On failure the
    /// stored credentials are cleared.
    pub async fn refresh(&self) -> Result<String, ChatError> {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            return Err(ChatError::Auth("no refresh token stored".to_string()));
        };
        let url = format!("{}/auth/refresh", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(detail, "token refresh failed, clearing credentials");
            self.tokens.clear();
            return Err(ChatError::Auth(detail));
        }
        let refreshed: RefreshResponse = response.json().await?;
        self.tokens.store_access(refreshed.access_token.clone());
        Ok(refreshed.access_token)
    }

    // -- plumbing ------------------------------------------------------------

    /// Issue an authenticated request, refreshing the access token once on a
    /// `401` before retrying.
    async fn authed_json<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, ChatError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.authed_request(&method, path, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path, "401 received, attempting token refresh");
            self.refresh().await?;
            let retried = self.authed_request(&method, path, body).await?;
            return Self::into_json(retried).await;
        }
        Self::into_json(response).await
    }

    async fn authed_request<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ChatError> {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self.client.request(method.clone(), &url).json(body);
        if let Some(token) = self.tokens.access_token() {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        Ok(builder.send().await?)
    }

    async fn into_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ChatError> {
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(ChatError::Transport { status, detail })
    }
}
