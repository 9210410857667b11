use crate::server::{ServerState, app, session::SessionLifetime};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    SignedCookieJar,
    cookie::{Cookie, Key},
};
use inkpost_common::{
    model::{
        Id,
        auth::{CreateSession, SessionToken, SessionTokenHash},
        post::PostMarker,
        user::{Email, UserMarker},
    },
    util::PositiveDuration,
};
use inkpost_db::client::DbClient;
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc};
use time::{Duration, UtcDateTime};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    db: Arc<DbClient>,
    cookie_key: Key,
}

/// A client that keeps cookies between requests, like a browser would.
struct Browser {
    router: Router,
    cookies: HashMap<String, String>,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_session_lifetime(SessionLifetime::default()).await
    }

    async fn with_session_lifetime(session_lifetime: SessionLifetime) -> Self {
        let db = Arc::new(DbClient::connect_in_memory().await.unwrap());
        db.migrate().await.unwrap();
        let cookie_key = Key::generate();

        let state = ServerState {
            db_client: Arc::clone(&db),
            cookie_key: cookie_key.clone(),
            session_lifetime,
        };

        Self {
            router: app(state),
            db,
            cookie_key,
        }
    }

    fn browser(&self) -> Browser {
        Browser {
            router: self.router.clone(),
            cookies: HashMap::new(),
        }
    }

    async fn post_count(&self) -> usize {
        self.db.fetch_posts().await.unwrap().len()
    }

    async fn user_id(&self, email_address: &str) -> Id<UserMarker> {
        let user = self.db.fetch_user_by_email(&email(email_address)).await.unwrap();
        user.unwrap().id
    }

    /// Stores a session directly and hands `browser` a correctly signed cookie for it.
    async fn plant_session(
        &self,
        browser: &mut Browser,
        user: Id<UserMarker>,
        created_at: UtcDateTime,
        lifetime: Duration,
    ) -> SessionTokenHash {
        let token = SessionToken::generate_random(user);
        let token_hash = token.hash().unwrap();
        self.db
            .create_session(&CreateSession {
                user,
                token_hash: token_hash.clone(),
                created_at,
                expires_after: PositiveDuration::new(lifetime),
            })
            .await
            .unwrap();

        let jar = SignedCookieJar::new(self.cookie_key.clone())
            .add(Cookie::new("session", token.as_token_str()));
        browser.absorb_cookies(&jar.into_response());

        token_hash
    }
}

impl Browser {
    async fn send(&mut self, method: Method, uri: &str, body: Option<(&str, String)>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            let cookie_header = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(header::COOKIE, cookie_header);
        }

        let body = match body {
            Some((content_type, content)) => {
                request = request.header(header::CONTENT_TYPE, content_type);
                Body::from(content)
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        self.absorb_cookies(&response);

        response
    }

    fn absorb_cookies(&mut self, response: &Response) {
        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let cookie = Cookie::parse(set_cookie.to_str().unwrap().to_owned()).unwrap();
            if cookie.value().is_empty() {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_owned(), cookie.value().to_owned());
            }
        }
    }

    async fn get(&mut self, uri: &str) -> Response {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> Response {
        let content = serde_urlencoded::to_string(form).unwrap();
        let body = ("application/x-www-form-urlencoded", content);
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn post_raw(&mut self, uri: &str, content_type: &str, content: &str) -> Response {
        self.send(Method::POST, uri, Some((content_type, content.to_owned())))
            .await
    }

    async fn get_json(&mut self, uri: &str) -> Value {
        let response = self.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        body_json(response).await
    }

    async fn register(&mut self, name: &str, email: &str) -> Response {
        self.post(
            "/register",
            &[("name", name), ("email", email), ("password", "hunter2")],
        )
        .await
    }

    async fn publish(&mut self, title: &str) -> Id<PostMarker> {
        let response = self.post("/new-post", &post_form(title, "https://example.com/a.png")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let index = self.get_json("/").await;
        let post = index["posts"]
            .as_array()
            .unwrap()
            .iter()
            .find(|post| post["title"] == title)
            .unwrap();
        Id::new(post["id"].as_u64().unwrap())
    }
}

fn post_form<'a>(title: &'a str, img_url: &'a str) -> [(&'static str, &'a str); 4] {
    [
        ("title", title),
        ("subtitle", "A subtitle"),
        ("body", "<p>Some words.</p>"),
        ("img_url", img_url),
    ]
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

fn email(email: &str) -> Email {
    Email::new(email.to_owned()).unwrap()
}

#[tokio::test]
async fn registering_twice_redirects_to_login() {
    let app = TestApp::new().await;
    let mut ada = app.browser();
    let mut eve = app.browser();

    let response = ada.register("Ada", "a@x.com").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = eve.register("Eve", "a@x.com").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(!eve.cookies.contains_key("session"));

    let stored = app.db.fetch_user_by_email(&email("a@x.com")).await.unwrap().unwrap();
    assert_eq!(stored.name.get(), "Ada");

    let login_page = eve.get_json("/login").await;
    assert_eq!(
        login_page["flashes"],
        json!([{
            "category": "warning",
            "message": "You already signed up with that email, log in instead."
        }])
    );
    assert_eq!(login_page["current_user"], Value::Null);
}

#[tokio::test]
async fn first_user_is_the_admin() {
    let app = TestApp::new().await;
    let mut ada = app.browser();
    let mut bob = app.browser();

    ada.register("Ada", "ada@example.com").await;
    bob.register("Bob", "bob@example.com").await;

    assert_eq!(ada.get_json("/").await["current_user"]["role"], "admin");
    assert_eq!(bob.get_json("/").await["current_user"]["role"], "member");
}

#[tokio::test]
async fn fresh_registration_can_comment_immediately() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let post_id = admin.publish("Hello").await;

    let mut reader = app.browser();
    reader.register("Bob", "bob@example.com").await;
    let post_uri = format!("/post/{post_id}");
    let response = reader.post(&post_uri, &[("text", "First!")]).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), post_uri);

    let view = reader.get_json(&post_uri).await;
    assert_eq!(view["post"]["title"], "Hello");
    assert_eq!(view["comments"][0]["text"], "First!");
    assert_eq!(view["comments"][0]["author"]["name"], "Bob");
}

#[tokio::test]
async fn anonymous_comment_redirects_to_login() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let post_id = admin.publish("Hello").await;

    let mut visitor = app.browser();
    let response = visitor
        .post(&format!("/post/{post_id}"), &[("text", "Drive-by")])
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(app.db.fetch_post_comments(post_id).await.unwrap().is_empty());
    assert_eq!(
        visitor.get_json("/login").await["flashes"][0]["message"],
        "You need to log in to leave a comment."
    );
}

#[tokio::test]
async fn blank_comment_is_rerendered() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let post_id = admin.publish("Hello").await;

    let response = admin.post(&format!("/post/{post_id}"), &[("text", " ")]).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let view = body_json(response).await;
    assert_eq!(view["errors"], json!(["Comment must not be blank"]));
    assert_eq!(view["post"]["id"], post_id.get());
    assert!(app.db.fetch_post_comments(post_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn member_cannot_delete_a_post() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let post_id = admin.publish("Hello").await;
    assert_eq!(post_id, Id::new(1));

    let mut member = app.browser();
    member.register("Bob", "bob@example.com").await;
    let response = member.get("/delete/1").await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({"status": 403}));
    assert!(app.db.fetch_post(post_id).await.unwrap().is_some());
}

#[tokio::test]
async fn only_the_admin_reaches_post_mutations() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let post_id = admin.publish("Hello").await;
    let original = app.db.fetch_post(post_id).await.unwrap();

    let mut member = app.browser();
    member.register("Bob", "bob@example.com").await;
    let anonymous = app.browser();

    let edit_uri = format!("/edit-post/{post_id}");
    let delete_uri = format!("/delete/{post_id}");
    let form = post_form("Hijacked", "https://example.com/evil.png");

    for mut caller in [member, anonymous] {
        assert_eq!(caller.get("/new-post").await.status(), StatusCode::FORBIDDEN);
        assert_eq!(caller.post("/new-post", &form).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(caller.get(&edit_uri).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(caller.post(&edit_uri, &form).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(caller.get(&delete_uri).await.status(), StatusCode::FORBIDDEN);
    }

    assert_eq!(app.post_count().await, 1);
    assert_eq!(app.db.fetch_post(post_id).await.unwrap(), original);
}

#[tokio::test]
async fn admin_creates_then_deletes_a_post_with_comments() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let mut reader = app.browser();
    reader.register("Bob", "bob@example.com").await;

    let post_id = admin.publish("Short-lived").await;
    let kept_id = admin.publish("Evergreen").await;
    let post_uri = format!("/post/{post_id}");
    reader.post(&post_uri, &[("text", "Nice")]).await;
    admin.post(&post_uri, &[("text", "Thanks")]).await;
    reader.post(&format!("/post/{kept_id}"), &[("text", "Still here")]).await;
    assert_eq!(app.db.fetch_post_comments(post_id).await.unwrap().len(), 2);

    let response = admin.get(&format!("/delete/{post_id}")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let index = admin.get_json("/").await;
    let titles: Vec<_> = index["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Evergreen"]);
    assert!(app.db.fetch_post_comments(post_id).await.unwrap().is_empty());
    assert_eq!(app.db.fetch_post_comments(kept_id).await.unwrap().len(), 1);
    assert_eq!(admin.get(&post_uri).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn new_posts_are_stamped_with_the_admin_and_date() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;

    let post_id = admin.publish("Dated").await;

    let post = app.db.fetch_post(post_id).await.unwrap().unwrap();
    assert_eq!(post.author.name.get(), "Ada");
    let today = inkpost_common::model::post::format_post_date(UtcDateTime::now().date());
    assert_eq!(post.date, today);
}

#[tokio::test]
async fn editing_preserves_id_and_other_posts() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let post_id = admin.publish("Draft").await;
    let other_id = admin.publish("Other").await;
    let before = app.db.fetch_post(post_id).await.unwrap().unwrap();
    let other_before = app.db.fetch_post(other_id).await.unwrap();

    let edit_uri = format!("/edit-post/{post_id}");
    let editor = admin.get_json(&edit_uri).await;
    assert_eq!(editor["form"]["title"], "Draft");
    assert_eq!(editor["form"]["img_url"], "https://example.com/a.png");

    let response = admin
        .post(&edit_uri, &post_form("Final", "https://example.com/b.png"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/post/{post_id}"));

    let after = app.db.fetch_post(post_id).await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.author, before.author);
    assert_eq!(after.date, before.date);
    assert_eq!(after.content.title.get(), "Final");
    assert_eq!(after.content.img_url.get(), "https://example.com/b.png");
    assert_eq!(app.db.fetch_post(other_id).await.unwrap(), other_before);
}

#[tokio::test]
async fn post_editor_rejects_bad_input() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    admin.publish("Taken").await;

    let response = admin
        .post("/new-post", &post_form("Fresh", "not a url"))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let view = body_json(response).await;
    assert_eq!(view["errors"], json!(["Image URL is malformed"]));
    assert_eq!(view["form"]["title"], "Fresh");

    let response = admin
        .post("/new-post", &post_form("Taken", "https://example.com/c.png"))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await["errors"],
        json!(["A post with that title already exists."])
    );

    assert_eq!(app.post_count().await, 1);
}

#[tokio::test]
async fn unknown_posts_are_not_found() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;

    let response = admin.get("/post/999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"status": 404}));

    assert_eq!(
        admin.post("/post/999", &[("text", "Hello?")]).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(admin.get("/edit-post/999").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(admin.get("/delete/999").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(admin.get("/post/not-a-number").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(admin.get("/nowhere").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let app = TestApp::new().await;
    let mut ada = app.browser();
    ada.register("Ada", "ada@example.com").await;
    ada.get("/logout").await;

    let mut visitor = app.browser();
    let unknown_email = visitor
        .post("/login", &[("email", "eve@example.com"), ("password", "hunter2")])
        .await;
    let wrong_password = visitor
        .post("/login", &[("email", "ada@example.com"), ("password", "hunter3")])
        .await;

    for response in [unknown_email, wrong_password] {
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let view = body_json(response).await;
        assert_eq!(view["errors"], json!(["Invalid email or password."]));
        assert!(view["form"].get("password").is_none());
    }
    assert!(!visitor.cookies.contains_key("session"));

    let response = visitor
        .post("/login", &[("email", "ada@example.com"), ("password", "hunter2")])
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let index = visitor.get_json("/").await;
    assert_eq!(index["current_user"]["email"], "ada@example.com");
    assert_eq!(index["flashes"][0]["message"], "Logged in successfully.");
}

#[tokio::test]
async fn logout_ends_the_session_for_good() {
    let app = TestApp::new().await;
    let mut ada = app.browser();
    ada.register("Ada", "ada@example.com").await;
    let stolen_cookies = ada.cookies.clone();
    assert_eq!(ada.get_json("/").await["current_user"]["name"], "Ada");

    let response = ada.get("/logout").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let index = ada.get_json("/").await;
    assert_eq!(index["current_user"], Value::Null);
    assert_eq!(index["flashes"][0]["message"], "You have been logged out.");

    let mut replay = app.browser();
    replay.cookies = stolen_cookies;
    assert_eq!(replay.get_json("/").await["current_user"], Value::Null);
}

#[tokio::test]
async fn tampered_session_cookie_is_anonymous() {
    let app = TestApp::new().await;
    let mut ada = app.browser();
    ada.register("Ada", "ada@example.com").await;

    let mut forger = app.browser();
    forger
        .cookies
        .insert("session".to_owned(), "1:AAAA:AAAA".to_owned());

    assert_eq!(forger.get_json("/").await["current_user"], Value::Null);
    assert_eq!(forger.get("/new-post").await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_registration_is_rerendered() {
    let app = TestApp::new().await;
    let mut visitor = app.browser();

    let response = visitor
        .post(
            "/register",
            &[("name", "Ada"), ("email", "ada-at-example"), ("password", "")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let view = body_json(response).await;
    assert_eq!(
        view["errors"],
        json!(["Email is malformed", "Password must not be blank"])
    );
    assert_eq!(view["form"], json!({"name": "Ada", "email": "ada-at-example"}));
    assert!(
        app.db
            .fetch_user_by_email(&email("ada@example.com"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn static_pages() {
    let app = TestApp::new().await;
    let mut visitor = app.browser();

    assert_eq!(visitor.get_json("/about").await["title"], "About");
    assert_eq!(visitor.get_json("/contact").await["title"], "Contact");
    assert_eq!(visitor.get_json("/register").await["form"]["name"], "");
}

#[tokio::test]
async fn anonymous_comment_body_is_not_parsed() {
    let app = TestApp::new().await;
    let mut admin = app.browser();
    admin.register("Ada", "ada@example.com").await;
    let post_id = admin.publish("Hello").await;
    let post_uri = format!("/post/{post_id}");

    let mut visitor = app.browser();
    let response = visitor.post_raw(&post_uri, "text/plain", "text=Drive-by").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let mut member = app.browser();
    member.register("Bob", "bob@example.com").await;
    let response = member.post_raw(&post_uri, "text/plain", "text=Hi").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.db.fetch_post_comments(post_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_session_cookie_is_anonymous() {
    let app = TestApp::new().await;
    app.browser().register("Ada", "ada@example.com").await;
    let ada = app.user_id("ada@example.com").await;
    let now = UtcDateTime::now();

    let mut fresh = app.browser();
    app.plant_session(&mut fresh, ada, now, Duration::hours(1)).await;
    assert_eq!(fresh.get_json("/").await["current_user"]["name"], "Ada");
    assert_eq!(fresh.get("/new-post").await.status(), StatusCode::OK);

    let mut stale = app.browser();
    let stale_hash = app
        .plant_session(&mut stale, ada, now - Duration::hours(2), Duration::hours(1))
        .await;
    assert_eq!(stale.get_json("/").await["current_user"], Value::Null);
    assert_eq!(stale.get("/new-post").await.status(), StatusCode::FORBIDDEN);
    assert!(app.db.fetch_session(&stale_hash).await.unwrap().is_none());
}

#[tokio::test]
async fn new_sessions_purge_expired_ones() {
    let app = TestApp::new().await;
    app.browser().register("Ada", "ada@example.com").await;
    let ada = app.user_id("ada@example.com").await;
    let now = UtcDateTime::now();

    let mut forgotten = app.browser();
    let expired_hash = app
        .plant_session(&mut forgotten, ada, now - Duration::days(2), Duration::days(1))
        .await;
    let mut idle = app.browser();
    let live_hash = app
        .plant_session(&mut idle, ada, now - Duration::hours(1), Duration::days(1))
        .await;

    app.browser().register("Bob", "bob@example.com").await;

    assert!(app.db.fetch_session(&expired_hash).await.unwrap().is_none());
    assert!(app.db.fetch_session(&live_hash).await.unwrap().is_some());
}

#[tokio::test]
async fn signing_in_again_replaces_the_old_session() {
    let app = TestApp::new().await;
    let mut ada = app.browser();
    ada.register("Ada", "ada@example.com").await;
    let earlier_cookies = ada.cookies.clone();

    let response = ada
        .post("/login", &[("email", "ada@example.com"), ("password", "hunter2")])
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_ne!(ada.cookies.get("session"), earlier_cookies.get("session"));
    assert_eq!(ada.get_json("/").await["current_user"]["name"], "Ada");

    let mut replay = app.browser();
    replay.cookies = earlier_cookies;
    assert_eq!(replay.get_json("/").await["current_user"], Value::Null);
}

#[tokio::test]
async fn configured_lifetime_bounds_new_sessions() {
    let lifetime = PositiveDuration::from_seconds(3600);
    let app = TestApp::with_session_lifetime(SessionLifetime(lifetime)).await;
    let mut ada = app.browser();

    let response = ada.register("Ada", "ada@example.com").await;

    let session_cookie = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| Cookie::parse(value.to_str().unwrap().to_owned()).unwrap())
        .find(|cookie| cookie.name() == "session")
        .unwrap();
    assert_eq!(session_cookie.max_age(), Some(Duration::hours(1)));
    assert_eq!(ada.get_json("/").await["current_user"]["name"], "Ada");
}
