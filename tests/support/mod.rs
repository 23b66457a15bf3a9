//! In-memory repositories and a router harness for HTTP tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use sqlx::Error as SqlxError;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime, macros::datetime};
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use scrivo::application::auth::{AuthService, SESSION_COOKIE};
use scrivo::application::comments::CommentService;
use scrivo::application::feed::FeedService;
use scrivo::application::follows::FollowService;
use scrivo::application::media::MediaStore;
use scrivo::application::pagination::PageRequest;
use scrivo::application::posts::PostService;
use scrivo::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateSessionParams,
    CreateUserParams, FollowsRepo, GroupsRepo, PostQueryFilter, PostsRepo, PostsWriteRepo,
    RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
};
use scrivo::cache::{CacheConfig, ListingCache};
use scrivo::domain::entities::{
    CommentRecord, GroupRecord, PostGroupRef, PostRecord, SessionRecord, UserRecord,
};
use scrivo::infra::http::{AdminState, HealthProbe, HttpState, build_admin_router, build_router};
use scrivo::infra::uploads::UploadStorage;

pub const PASSWORD: &str = "correct horse battery";
pub const UPLOAD_LIMIT: usize = 1024 * 1024;

struct StoredPost {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    image: Option<String>,
    author_id: i64,
    group_id: Option<i64>,
}

#[derive(Default)]
struct State {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<CommentRecord>,
    follows: Vec<(i64, i64)>,
    sessions: Vec<SessionRecord>,
    next_id: i64,
    clock: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing publication times so ordering is deterministic.
    fn tick(&mut self) -> OffsetDateTime {
        self.clock += 1;
        datetime!(2024-03-05 10:00 UTC) + Duration::minutes(self.clock)
    }

    fn username(&self, id: i64) -> String {
        self.users
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    fn record(&self, post: &StoredPost) -> PostRecord {
        let group = post.group_id.and_then(|group_id| {
            self.groups
                .iter()
                .find(|group| group.id == group_id)
                .map(|group| PostGroupRef {
                    id: group.id,
                    title: group.title.clone(),
                    slug: group.slug.clone(),
                })
        });
        PostRecord {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            image: post.image.clone(),
            author_id: post.author_id,
            author_username: self.username(post.author_id),
            group,
        }
    }

    fn matches(&self, post: &StoredPost, filter: &PostQueryFilter) -> bool {
        filter.group_id.is_none_or(|id| post.group_id == Some(id))
            && filter.author_id.is_none_or(|id| post.author_id == id)
            && filter
                .followed_by
                .is_none_or(|user_id| self.follows.contains(&(user_id, post.author_id)))
    }
}

/// Every repository trait backed by one mutex-guarded state.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    health_down: std::sync::atomic::AtomicBool,
    post_writes_fail: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    /// Make `create_post` and `update_post` fail like a rejected row write.
    pub fn set_post_writes_failing(&self, failing: bool) {
        self.post_writes_fail
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_post_write(&self) -> Result<(), RepoError> {
        if self.post_writes_fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RepoError::Persistence(
                "value too long for type character varying(100)".to_string(),
            ));
        }
        Ok(())
    }

    /// Remove every post and, as the foreign key does, their comments.
    pub async fn delete_all_posts(&self) {
        let mut state = self.state.lock().await;
        state.posts.clear();
        state.comments.clear();
    }

    pub fn set_health_down(&self, down: bool) {
        self.health_down
            .store(down, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn add_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        })
        .await
        .expect("group inserts")
    }

    pub async fn add_post(&self, author_id: i64, text: &str, group_id: Option<i64>) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id,
            text: text.to_string(),
            group_id,
            image: None,
        })
        .await
        .expect("post inserts")
    }

    pub async fn post(&self, id: i64) -> Option<PostRecord> {
        self.find_post(id).await.expect("lookup works")
    }

    pub async fn post_count(&self) -> usize {
        self.state.lock().await.posts.len()
    }

    pub async fn comment_count(&self) -> usize {
        self.state.lock().await.comments.len()
    }

    pub async fn follow_count(&self) -> usize {
        self.state.lock().await.follows.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state
            .users
            .iter()
            .any(|user| user.username == params.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_unique".to_string(),
            });
        }
        let user = UserRecord {
            id: state.next_id(),
            username: params.username,
            password_hash: params.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        state.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut groups = state.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_unique".to_string(),
            });
        }
        let group = GroupRecord {
            id: state.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        state.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&StoredPost> = state
            .posts
            .iter()
            .filter(|post| state.matches(post, filter))
            .collect();
        matching.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|post| state.record(post))
            .collect())
    }

    async fn count_posts(&self, filter: &PostQueryFilter) -> Result<u64, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .iter()
            .filter(|post| state.matches(post, filter))
            .count() as u64)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| state.record(post)))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.check_post_write()?;
        let mut state = self.state.lock().await;
        let post = StoredPost {
            id: state.next_id(),
            text: params.text,
            pub_date: state.tick(),
            image: params.image,
            author_id: params.author_id,
            group_id: params.group_id,
        };
        let record = state.record(&post);
        state.posts.push(post);
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        self.check_post_write()?;
        let mut state = self.state.lock().await;
        let index = state
            .posts
            .iter()
            .position(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        let post = &mut state.posts[index];
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let record = state.record(&state.posts[index]);
        Ok(record)
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.state.lock().await;
        let comment = CommentRecord {
            id: state.next_id(),
            post_id: params.post_id,
            author_id: params.author_id,
            author_username: state.username(params.author_id),
            text: params.text,
            created: state.tick(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        if state.follows.contains(&(user_id, author_id)) {
            return Ok(false);
        }
        state.follows.push((user_id, author_id));
        Ok(true)
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        let before = state.follows.len();
        state
            .follows
            .retain(|edge| *edge != (user_id, author_id));
        Ok(state.follows.len() < before)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let state = self.state.lock().await;
        Ok(state.follows.contains(&(user_id, author_id)))
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut state = self.state.lock().await;
        let session = SessionRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .iter()
            .find(|session| session.prefix == prefix)
            .cloned())
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state.sessions.retain(|session| session.id != id);
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|session| session.expires_at > now);
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl HealthProbe for MemoryStore {
    async fn ping(&self) -> Result<(), SqlxError> {
        if self.health_down.load(std::sync::atomic::Ordering::SeqCst) {
            Err(SqlxError::PoolTimedOut)
        } else {
            Ok(())
        }
    }
}

/// Number of files stored under `<media root>/posts`.
pub fn stored_image_count(app: &TestApp) -> usize {
    std::fs::read_dir(app.media_root().join("posts"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// A wired application over [`MemoryStore`] with media in a temp directory.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub auth: Arc<AuthService>,
    pub listing_cache: Arc<ListingCache>,
    pub uploads: Arc<UploadStorage>,
    pub router: Router,
    pub admin: Router,
    _media_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub fn with_cache(cache: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        let media_dir = TempDir::new().expect("temp media dir");
        let uploads = Arc::new(
            UploadStorage::new(media_dir.path().to_path_buf()).expect("upload storage"),
        );
        let media: Arc<dyn MediaStore> = uploads.clone();
        let listing_cache = Arc::new(ListingCache::new(cache));

        let auth = Arc::new(AuthService::new(
            store.clone(),
            store.clone(),
            Duration::days(14),
        ));
        let state = HttpState {
            feed: Arc::new(FeedService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
            )),
            posts: Arc::new(PostService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                media,
            )),
            comments: Arc::new(CommentService::new(store.clone(), store.clone())),
            follows: Arc::new(FollowService::new(store.clone(), store.clone())),
            auth: auth.clone(),
            listing_cache: listing_cache.clone(),
            uploads: uploads.clone(),
            health: store.clone(),
            secure_cookie: false,
            upload_body_limit: UPLOAD_LIMIT,
        };
        let admin_state = AdminState {
            listing_cache: listing_cache.clone(),
            health: store.clone(),
        };

        Self {
            router: build_router(state),
            admin: build_admin_router(admin_state),
            store,
            auth,
            listing_cache,
            uploads,
            _media_dir: media_dir,
        }
    }

    pub fn media_root(&self) -> &std::path::Path {
        self._media_dir.path()
    }

    /// Register `username` and return the user with a ready-to-send cookie header.
    pub async fn sign_in(&self, username: &str) -> (UserRecord, String) {
        let user = self
            .auth
            .create_user(username, PASSWORD)
            .await
            .expect("user is created");
        let issued = self.auth.open_session(user.id).await.expect("session opens");
        (user, format!("{SESSION_COOKIE}={}", issued.token))
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::get(path);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).expect("request builds"))
            .await
    }

    pub async fn post_form(&self, path: &str, cookie: Option<&str>, body: &str) -> Response<Body> {
        let mut request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::from(body.to_string())).expect("request builds"))
            .await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        cookie: Option<&str>,
        form: MultipartForm,
    ) -> Response<Body> {
        let mut request = Request::post(path).header(header::CONTENT_TYPE, form.content_type());
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::from(form.finish())).expect("request builds"))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds")
    }

    pub async fn send_admin(&self, request: Request<Body>) -> Response<Body> {
        self.admin
            .clone()
            .oneshot(request)
            .await
            .expect("admin router responds")
    }
}

const BOUNDARY: &str = "scrivo-test-boundary";

/// Minimal `multipart/form-data` body builder.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

/// The 1x1 GIF used for image uploads.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00,
    0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body collects");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Number of rendered post cards in a listing page.
pub fn card_count(html: &str) -> usize {
    html.matches("class=\"post-card\"").count()
}
