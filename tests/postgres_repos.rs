//! Repository tests against a real Postgres.
//!
//! Run with `cargo test -- --ignored` after exporting `DATABASE_URL`.

use scrivo::application::media::MAX_IMAGE_PATH_LEN;
use scrivo::application::pagination::PageRequest;
use scrivo::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateSessionParams,
    CreateUserParams, FollowsRepo, GroupsRepo, PostQueryFilter, PostsRepo, PostsWriteRepo,
    RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
};
use scrivo::domain::entities::UserRecord;
use scrivo::infra::db::PostgresRepositories;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

async fn user(repos: &PostgresRepositories, username: &str) -> UserRecord {
    repos
        .create_user(CreateUserParams {
            username: username.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        })
        .await
        .expect("user inserts")
}

fn everything() -> PageRequest {
    PageRequest {
        offset: 0,
        limit: 100,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn usernames_are_unique(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    user(&repos, "taken").await;

    let err = repos
        .create_user(CreateUserParams {
            username: "taken".to_string(),
            password_hash: "x".to_string(),
        })
        .await
        .expect_err("duplicate username rejected");
    assert!(matches!(err, RepoError::Duplicate { .. }), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn posts_join_author_and_group_newest_first(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "joined").await;
    let group = repos
        .create_group(CreateGroupParams {
            title: "Joined group".to_string(),
            slug: "joined".to_string(),
            description: "Posts with a group".to_string(),
        })
        .await
        .expect("group inserts");

    let plain = repos
        .create_post(CreatePostParams {
            author_id: author.id,
            text: "plain".to_string(),
            group_id: None,
            image: None,
        })
        .await
        .expect("post inserts");
    let grouped = repos
        .create_post(CreatePostParams {
            author_id: author.id,
            text: "grouped".to_string(),
            group_id: Some(group.id),
            image: Some("posts/test.gif".to_string()),
        })
        .await
        .expect("post inserts");

    assert_eq!(grouped.author_username, "joined");
    assert_eq!(grouped.group.as_ref().map(|g| g.slug.as_str()), Some("joined"));
    assert!(plain.group.is_none());

    let listed = repos
        .list_posts(&PostQueryFilter::all(), everything())
        .await
        .expect("list works");
    let ids: Vec<i64> = listed.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![grouped.id, plain.id]);

    let in_group = repos
        .count_posts(&PostQueryFilter::group(group.id))
        .await
        .expect("count works");
    assert_eq!(in_group, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn update_keeps_pub_date_and_author(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "updater").await;
    let post = repos
        .create_post(CreatePostParams {
            author_id: author.id,
            text: "before".to_string(),
            group_id: None,
            image: Some("posts/old.gif".to_string()),
        })
        .await
        .expect("post inserts");

    let updated = repos
        .update_post(UpdatePostParams {
            id: post.id,
            text: "after".to_string(),
            group_id: None,
            image: None,
        })
        .await
        .expect("post updates");

    assert_eq!(updated.text, "after");
    assert_eq!(updated.pub_date, post.pub_date);
    assert_eq!(updated.author_id, author.id);
    assert!(updated.image.is_none());

    let missing = repos
        .update_post(UpdatePostParams {
            id: post.id + 1000,
            text: "ghost".to_string(),
            group_id: None,
            image: None,
        })
        .await
        .expect_err("unknown post");
    assert!(matches!(missing, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn follow_edges_are_unique_and_filter_the_feed(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let reader = user(&repos, "reader").await;
    let author = user(&repos, "author").await;
    let other = user(&repos, "other").await;
    for (owner, text) in [(&author, "followed"), (&other, "ignored")] {
        repos
            .create_post(CreatePostParams {
                author_id: owner.id,
                text: text.to_string(),
                group_id: None,
                image: None,
            })
            .await
            .expect("post inserts");
    }

    assert!(repos.follow(reader.id, author.id).await.expect("follow"));
    assert!(!repos.follow(reader.id, author.id).await.expect("repeat follow"));
    assert!(repos.is_following(reader.id, author.id).await.expect("check"));

    let feed = repos
        .list_posts(&PostQueryFilter::followed_by(reader.id), everything())
        .await
        .expect("feed lists");
    let texts: Vec<&str> = feed.iter().map(|post| post.text.as_str()).collect();
    assert_eq!(texts, vec!["followed"]);

    assert!(repos.unfollow(reader.id, author.id).await.expect("unfollow"));
    assert!(!repos.unfollow(reader.id, author.id).await.expect("repeat unfollow"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn comments_list_in_insertion_order(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "talker").await;
    let post = repos
        .create_post(CreatePostParams {
            author_id: author.id,
            text: "discuss".to_string(),
            group_id: None,
            image: None,
        })
        .await
        .expect("post inserts");

    for text in ["first", "second"] {
        repos
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text: text.to_string(),
            })
            .await
            .expect("comment inserts");
    }

    let comments = repos.list_for_post(post.id).await.expect("comments list");
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(comments[0].author_username, "talker");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn expired_sessions_are_pruned(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let owner = user(&repos, "sessions").await;
    let now = OffsetDateTime::now_utc();

    for (prefix, expires_at) in [("live", now + Duration::hours(1)), ("dead", now)] {
        repos
            .create_session(CreateSessionParams {
                user_id: owner.id,
                prefix: prefix.to_string(),
                hashed_secret: vec![1, 2, 3],
                expires_at,
            })
            .await
            .expect("session inserts");
    }

    let pruned = repos.delete_expired(now).await.expect("prune works");
    assert_eq!(pruned, 1);
    assert!(repos.find_by_prefix("live").await.expect("lookup").is_some());
    assert!(repos.find_by_prefix("dead").await.expect("lookup").is_none());
}

async fn post_by(repos: &PostgresRepositories, author_id: i64, group_id: Option<i64>) -> i64 {
    repos
        .create_post(CreatePostParams {
            author_id,
            text: "cascading".to_string(),
            group_id,
            image: None,
        })
        .await
        .expect("post inserts")
        .id
}

async fn exec(repos: &PostgresRepositories, sql: &str, id: i64) {
    sqlx::query(sql)
        .bind(id)
        .execute(repos.pool())
        .await
        .expect("statement runs");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn deleting_a_group_detaches_its_posts(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "grouped").await;
    let group = repos
        .create_group(CreateGroupParams {
            title: "Short lived".to_string(),
            slug: "short-lived".to_string(),
            description: String::new(),
        })
        .await
        .expect("group inserts");
    let post_id = post_by(&repos, author.id, Some(group.id)).await;

    exec(&repos, "DELETE FROM groups WHERE id = $1", group.id).await;

    let post = repos
        .find_post(post_id)
        .await
        .expect("lookup")
        .expect("post survives its group");
    assert!(post.group.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn deleting_a_post_removes_its_comments(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "commented").await;
    let post_id = post_by(&repos, author.id, None).await;
    repos
        .create_comment(CreateCommentParams {
            post_id,
            author_id: author.id,
            text: "going away".to_string(),
        })
        .await
        .expect("comment inserts");

    exec(&repos, "DELETE FROM posts WHERE id = $1", post_id).await;

    assert!(repos.list_for_post(post_id).await.expect("comments list").is_empty());
    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(repos.pool())
        .await
        .expect("count runs");
    assert_eq!(orphans, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn deleting_a_user_removes_posts_follows_and_sessions(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let leaving = user(&repos, "leaving").await;
    let staying = user(&repos, "staying").await;
    post_by(&repos, leaving.id, None).await;
    let kept = post_by(&repos, staying.id, None).await;
    repos.follow(staying.id, leaving.id).await.expect("follow");
    repos.follow(leaving.id, staying.id).await.expect("follow back");
    repos
        .create_session(CreateSessionParams {
            user_id: leaving.id,
            prefix: "leaving".to_string(),
            hashed_secret: vec![9],
            expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
        })
        .await
        .expect("session inserts");

    exec(&repos, "DELETE FROM users WHERE id = $1", leaving.id).await;

    let remaining = repos
        .list_posts(&PostQueryFilter::all(), everything())
        .await
        .expect("list works");
    let ids: Vec<i64> = remaining.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![kept]);
    assert!(!repos.is_following(staying.id, leaving.id).await.expect("check"));
    assert!(!repos.is_following(leaving.id, staying.id).await.expect("check"));
    assert!(repos.find_by_prefix("leaving").await.expect("lookup").is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn image_column_holds_the_longest_stored_path(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "wide").await;
    let image = format!("posts/{}.gif", "a".repeat(MAX_IMAGE_PATH_LEN - "posts/.gif".len()));
    assert_eq!(image.len(), MAX_IMAGE_PATH_LEN);

    let post = repos
        .create_post(CreatePostParams {
            author_id: author.id,
            text: "fits".to_string(),
            group_id: None,
            image: Some(image.clone()),
        })
        .await
        .expect("post inserts");
    assert_eq!(post.image.as_deref(), Some(image.as_str()));
}
