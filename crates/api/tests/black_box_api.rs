use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use coursedesk_api::app::sessions::{Profile, sign_in};
use coursedesk_api::app::{AppState, build_app};
use coursedesk_core::{Course, CourseId, NewCourse, NewUser, User, UserId, UserType};
use coursedesk_auth::{Session, SessionToken};
use coursedesk_core::{LocationId, NewLocation};
use coursedesk_infra::{
    AttendanceStore, CourseStore, InMemoryStore, ReferenceStore, SessionStore, UserStore,
};

struct TestServer {
    base_url: String,
    state: AppState,
    store: Arc<InMemoryStore>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(store.clone(), Duration::hours(1));

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            store,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a user of `usertype` and sign them in; returns the user and a session token.
    async fn login(&self, name: &str, usertype: UserType) -> (User, String) {
        let email = format!("{}@school.org", name.to_lowercase());
        self.store
            .create_user(NewUser::new(name, email.clone(), usertype, None).unwrap())
            .await
            .unwrap();
        let signed = sign_in(
            &self.state,
            Profile {
                email: Some(email),
                name: name.to_string(),
            },
        )
        .await
        .unwrap();
        (signed.user, signed.session.token.to_string())
    }

    /// Plain users with no session, to push ids forward.
    async fn filler_users(&self, count: usize) {
        let existing = self.store.list_users(None).await.unwrap().len();
        for n in existing..existing + count {
            self.store
                .create_user(
                    NewUser::new(format!("Filler {n}"), format!("filler{n}@school.org"), UserType::Teacher, None)
                        .unwrap(),
                )
                .await
                .unwrap();
        }
    }

    /// `count` courses of 3h30m each.
    async fn courses(&self, count: usize) -> Vec<Course> {
        let starts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut out = Vec::new();
        for n in 0..count {
            let course = NewCourse::new(
                format!("Course {}", n + 1),
                None,
                starts,
                starts + Duration::minutes(210),
                None,
                None,
            )
            .unwrap();
            out.push(self.store.create_course(course).await.unwrap());
        }
        out
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap()
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).bearer_auth(token).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_without_a_valid_session_are_rejected() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/courses")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthenticated");

    let res = server.get("/courses", &uuid_like_garbage()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

fn uuid_like_garbage() -> String {
    "0000000000000000000000000000beef".to_string()
}

#[tokio::test]
async fn admin_adds_a_link_to_course_five() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    server.courses(5).await;

    let res = server
        .post("/courses/5/links", &admin, json!({ "title": "Slides", "url": "http://x" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let link: Value = res.json().await.unwrap();
    assert_eq!(link["course_id"], 5);
    assert_eq!(link["title"], "Slides");

    let res = server.get("/courses/5/links", &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let links: Vec<Value> = res.json().await.unwrap();
    assert!(links.iter().any(|l| l["id"] == link["id"] && l["url"] == "http://x"));
}

#[tokio::test]
async fn teacher_cannot_list_users() {
    let server = TestServer::spawn().await;
    let (_, teacher) = server.login("Teacher", UserType::Teacher).await;

    for path in ["/users", "/users?user_type=4", "/users?user_type=1", "/users?user_type=9"] {
        let res = server.get(path, &teacher).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(error_code(res).await, "unauthorized");
    }
}

#[tokio::test]
async fn user_list_filters_follow_the_role_table() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (_, observer) = server.login("Observer", UserType::Observer).await;
    server.login("Presenter", UserType::Presenter).await;
    server.login("Teacher", UserType::Teacher).await;

    let all: Vec<Value> = server.get("/users", &admin).await.json().await.unwrap();
    assert_eq!(all.len(), 4);

    let presenters: Vec<Value> = server
        .get("/users?user_type=2", &admin)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(presenters.len(), 1);
    assert_eq!(presenters[0]["usertype"], "Presenter");

    assert_eq!(server.get("/users", &observer).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        server.get("/users?user_type=1", &observer).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        server.get("/users?user_type=9", &observer).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        server.get("/users?user_type=abc", &observer).await.status(),
        StatusCode::BAD_REQUEST
    );

    let teachers: Vec<Value> = server
        .get("/users?user_type=4", &observer)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(teachers.len(), 1);
    assert_eq!(teachers[0]["usertype_id"], 4);
}

#[tokio::test]
async fn confirmed_courses_are_self_only_and_carry_hours() {
    let server = TestServer::spawn().await;
    server.filler_users(6).await;
    let (seven, other) = server.login("Seven", UserType::Teacher).await;
    server.filler_users(1).await;
    let (nine, token) = server.login("Nine", UserType::Teacher).await;
    assert_eq!(seven.id, UserId::new(7));
    assert_eq!(nine.id, UserId::new(9));

    server.courses(3).await;
    let course = CourseId::new(3);
    server.store.register(course, nine.id).await.unwrap();
    server.store.confirm(course, nine.id).await.unwrap();

    let res = server.get("/users/9/confirmed", &token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let confirmed: Vec<Value> = res.json().await.unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0]["course"]["id"], 3);
    assert_eq!(confirmed[0]["attended"], true);
    assert_eq!(confirmed[0]["hours"], 3);

    let res = server.get("/users/9/confirmed", &other).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_then_confirmation() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (presenter, presenter_token) = server.login("Presenter", UserType::Presenter).await;
    let (teacher, teacher_token) = server.login("Teacher", UserType::Teacher).await;
    server.courses(1).await;

    let res = server.post("/courses/1/registrations", &teacher_token, json!({})).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let row: Value = res.json().await.unwrap();
    assert_eq!(row["user_id"], teacher.id.get());
    assert_eq!(row["attended"], false);

    let res = server.post("/courses/1/registrations", &teacher_token, json!({})).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let confirm_path = format!("/courses/1/registrations/{}", teacher.id);

    // Neither the attendee nor a presenter of another course may confirm.
    assert_eq!(
        server.put(&confirm_path, &teacher_token, json!({})).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        server.put(&confirm_path, &presenter_token, json!({})).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let res = server
        .post("/courses/1/presenters", &admin, json!({ "user_id": presenter.id }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    for _ in 0..2 {
        let res = server.put(&confirm_path, &presenter_token, json!({})).await;
        assert_eq!(res.status(), StatusCode::OK);
        let row: Value = res.json().await.unwrap();
        assert_eq!(row["attended"], true);
    }

    let attendees: Vec<Value> = server
        .get("/courses/1/registrations", &presenter_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(attendees.len(), 1);
    assert_eq!(attendees[0]["attended"], true);

    assert_eq!(
        server.get("/courses/1/registrations", &teacher_token).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn bulk_confirmation_is_all_or_nothing() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (a, _) = server.login("Alice", UserType::Teacher).await;
    let (b, _) = server.login("Bob", UserType::Teacher).await;
    server.courses(1).await;
    server.store.register(CourseId::new(1), a.id).await.unwrap();

    let res = server
        .put("/courses/1/registrations", &admin, json!({ "user_ids": [] }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .put("/courses/1/registrations", &admin, json!({ "user_ids": [a.id, b.id] }))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let attendees = server.store.list_attendees(CourseId::new(1)).await.unwrap();
    assert!(attendees.iter().all(|x| !x.attended));

    let res = server
        .put("/courses/1/registrations", &admin, json!({ "user_ids": [a.id] }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let attendees: Vec<Value> = res.json().await.unwrap();
    assert_eq!(attendees[0]["attended"], true);
}

#[tokio::test]
async fn unregistering_hides_the_roster_from_attendees() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (a, a_token) = server.login("Alice", UserType::Teacher).await;
    let (b, _) = server.login("Bob", UserType::Teacher).await;
    server.courses(1).await;
    let course = CourseId::new(1);
    server.store.register(course, a.id).await.unwrap();
    server.store.register(course, b.id).await.unwrap();

    let res = server
        .delete(&format!("/courses/1/registrations/{}", b.id), &a_token)
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server
        .delete(&format!("/courses/1/registrations/{}", a.id), &a_token)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].is_string());
    assert!(body.get("attendees").is_none());

    let res = server
        .delete(&format!("/courses/1/registrations/{}", b.id), &admin)
        .await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["attendees"], json!([]));
}

#[tokio::test]
async fn deleting_a_user_cascades() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (teacher, teacher_token) = server.login("Teacher", UserType::Teacher).await;
    server.courses(1).await;
    let course = CourseId::new(1);
    server.store.register(course, teacher.id).await.unwrap();
    server.store.add_presenter(course, teacher.id).await.unwrap();
    let hq = server
        .store
        .create_location(NewLocation::new("HQ").unwrap())
        .await
        .unwrap();
    server.store.set_user_location(teacher.id, Some(hq.id)).await.unwrap();

    let res = server.delete(&format!("/users/{}", teacher.id), &admin).await;
    assert_eq!(res.status(), StatusCode::OK);

    assert!(server.store.list_attendees(course).await.unwrap().is_empty());
    assert!(server.store.list_presenters(course).await.unwrap().is_empty());

    let location: Value = server
        .get(&format!("/locations/{}", hq.id), &admin)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(location["name"], "HQ");
    let at_hq: Vec<Value> = server
        .get(&format!("/locations/{}/users", hq.id), &admin)
        .await
        .json()
        .await
        .unwrap();
    assert!(at_hq.is_empty());
    // No user points at it any more, so it can go.
    let res = server.delete(&format!("/locations/{}", hq.id), &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(server.get("/courses/1", &admin).await.status(), StatusCode::OK);
    assert_eq!(server.get("/courses", &teacher_token).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_a_course_cascades() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (teacher, teacher_token) = server.login("Teacher", UserType::Teacher).await;
    let (presenter, _) = server.login("Presenter", UserType::Presenter).await;
    server.courses(2).await;

    server
        .post("/courses/1/links", &admin, json!({ "title": "Slides", "url": "http://x" }))
        .await;
    server
        .post("/courses/1/presenters", &admin, json!({ "user_id": presenter.id }))
        .await;
    assert!(server.store.is_presenting(CourseId::new(1), presenter.id).await.unwrap());
    server.post("/courses/1/registrations", &teacher_token, json!({})).await;
    server.post("/courses/2/registrations", &teacher_token, json!({})).await;

    let res = server.delete("/courses/1", &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["courses"].as_array().map(Vec::len), Some(1));

    assert_eq!(server.get("/courses/1/links", &admin).await.status(), StatusCode::NOT_FOUND);
    let regs: Vec<Value> = server
        .get(&format!("/users/{}/registrations", teacher.id), &teacher_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(regs.len(), 1);
    assert_eq!(regs[0]["course"]["id"], 2);

    assert!(server.store.presenting(presenter.id).await.unwrap().is_empty());
    assert!(!server.store.is_presenting(CourseId::new(1), presenter.id).await.unwrap());
    assert!(server.store.get_user(presenter.id).await.unwrap().is_some());
}

#[tokio::test]
async fn bad_input_is_a_validation_error() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;

    let res = server
        .post(
            "/courses",
            &admin,
            json!({
                "title": "Backwards",
                "starts": "2024-05-01T12:00:00Z",
                "ends": "2024-05-01T09:00:00Z",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "validation_error");

    let res = server
        .post("/courses", &admin, json!({ "starts": "2024-05-01T12:00:00Z" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.get("/courses/abc", &admin).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.get("/courses/42", &admin).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn course_types_are_admin_managed_and_protected_while_used() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (_, teacher) = server.login("Teacher", UserType::Teacher).await;

    let res = server.post("/courses/types", &teacher, json!({ "name": "Workshop" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server.post("/courses/types", &admin, json!({ "name": "Workshop" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let kind: Value = res.json().await.unwrap();

    let res = server
        .post(
            "/courses",
            &admin,
            json!({
                "title": "Robotics",
                "starts": "2024-05-01T09:00:00Z",
                "ends": "2024-05-01T12:00:00Z",
                "coursetype_id": kind["id"],
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let course: Value = res.json().await.unwrap();
    assert_eq!(course["hours"], 3);

    let types: Vec<Value> = server.get("/courses/types", &teacher).await.json().await.unwrap();
    assert_eq!(types.len(), 1);

    let res = server.delete(&format!("/courses/types/{}", kind["id"]), &admin).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn usertype_names_can_be_changed_but_not_added() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;

    let res = server
        .post("/usertypes", &admin, json!({ "id": 3, "name": "Auditor" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let row: Value = server.get("/usertypes/3", &admin).await.json().await.unwrap();
    assert_eq!(row["name"], "Auditor");

    let res = server
        .post("/usertypes", &admin, json!({ "id": 9, "name": "Guest" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let all: Vec<Value> = server.get("/usertypes", &admin).await.json().await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn cookie_session_and_logout() {
    let server = TestServer::spawn().await;
    let (user, token) = server.login("Teacher", UserType::Teacher).await;
    let cookie = format!("theme=dark; session={token}");

    let res = server
        .client
        .get(server.url("/getsession"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["login"], true);
    assert_eq!(body["user"]["id"], user.id.get());

    let res = server
        .client
        .post(server.url("/logout"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("set-cookie"));

    let res = server
        .client
        .get(server.url("/getsession"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "login": false }));
}

#[tokio::test]
async fn getsession_without_credentials_reports_logged_out() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/getsession")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "login": false }));

    let res = server.get("/getsession", "not-a-token").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap()["login"], false);

    let stranger = SessionToken::generate().to_string();
    let res = server.get("/getsession", &stranger).await;
    assert_eq!(res.json::<Value>().await.unwrap()["login"], false);
}

#[tokio::test]
async fn expired_sessions_are_rejected_and_removed() {
    let server = TestServer::spawn().await;
    let (user, _) = server.login("Teacher", UserType::Teacher).await;

    let now = Utc::now();
    let session = Session {
        token: SessionToken::generate(),
        user_id: user.id,
        issued_at: now - Duration::hours(3),
        expires_at: now - Duration::hours(1),
    };
    server.store.create_session(session.clone()).await.unwrap();
    let token = session.token.to_string();

    let res = server.get("/courses", &token).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthenticated");
    assert_eq!(server.store.get_session(session.token).await.unwrap(), None);

    // A second expired session, seen through the public session check.
    let session = Session {
        token: SessionToken::generate(),
        ..session
    };
    server.store.create_session(session.clone()).await.unwrap();
    let body: Value = server
        .get("/getsession", &session.token.to_string())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "login": false }));
    assert_eq!(server.store.get_session(session.token).await.unwrap(), None);
}

#[tokio::test]
async fn popular_course_needs_a_course() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (teacher, _) = server.login("Teacher", UserType::Teacher).await;

    assert_eq!(server.get("/popular", &admin).await.status(), StatusCode::NOT_FOUND);

    server.courses(2).await;
    server.store.register(CourseId::new(2), teacher.id).await.unwrap();
    let course: Value = server.get("/popular", &admin).await.json().await.unwrap();
    assert_eq!(course["id"], 2);
    assert_eq!(course["registrations"], 1);
}

#[tokio::test]
async fn attendance_documents_sum_confirmed_hours() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (teacher, token) = server.login("Teacher", UserType::Teacher).await;
    let (_, other) = server.login("Other", UserType::Teacher).await;
    server.courses(3).await;
    for id in 1..=3 {
        server.store.register(CourseId::new(id), teacher.id).await.unwrap();
    }
    server.store.confirm(CourseId::new(1), teacher.id).await.unwrap();
    server.store.confirm(CourseId::new(3), teacher.id).await.unwrap();

    let path = format!("/users/{}/documents", teacher.id);
    let summary: Value = server.get(&path, &token).await.json().await.unwrap();
    assert_eq!(summary["events"].as_array().map(Vec::len), Some(2));
    assert_eq!(summary["events"][0]["start"], "May 01, 2024");
    assert_eq!(summary["total"], 6);

    assert_eq!(server.get(&path, &admin).await.status(), StatusCode::OK);
    assert_eq!(server.get(&path, &other).await.status(), StatusCode::UNAUTHORIZED);

    let single = format!("/users/{}/documents/2", teacher.id);
    assert_eq!(server.get(&single, &token).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn presenter_leaving_their_own_course_still_sees_the_roster() {
    let server = TestServer::spawn().await;
    let (presenter, token) = server.login("Presenter", UserType::Presenter).await;
    let (teacher, _) = server.login("Teacher", UserType::Teacher).await;
    server.courses(1).await;
    let course = CourseId::new(1);
    server.store.add_presenter(course, presenter.id).await.unwrap();
    server.store.register(course, presenter.id).await.unwrap();
    server.store.register(course, teacher.id).await.unwrap();

    let res = server
        .delete(&format!("/courses/1/registrations/{}", presenter.id), &token)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let attendees = body["attendees"].as_array().unwrap();
    assert_eq!(attendees.len(), 1);
    assert_eq!(attendees[0]["user"]["id"], teacher.id.get());
}

#[tokio::test]
async fn links_can_be_edited_and_removed() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (_, teacher) = server.login("Teacher", UserType::Teacher).await;
    server.courses(1).await;
    for title in ["Slides", "Recording"] {
        let res = server
            .post("/courses/1/links", &admin, json!({ "title": title, "url": "http://x" }))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = server
        .put("/courses/1/links/1", &admin, json!({ "url": "https://slides.example" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let link: Value = res.json().await.unwrap();
    assert_eq!(link["title"], "Slides");
    assert_eq!(link["url"], "https://slides.example");

    let res = server.put("/courses/1/links/1", &teacher, json!({ "title": "Mine" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.delete("/courses/1/links/1", &teacher).await.status(), StatusCode::UNAUTHORIZED);

    let res = server.delete("/courses/1/links/1", &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].is_string());
    let links = body["links"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["id"], 2);

    assert_eq!(server.delete("/courses/1/links/1", &admin).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn presenters_can_be_removed() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (first, first_token) = server.login("First", UserType::Presenter).await;
    let (second, _) = server.login("Second", UserType::Presenter).await;
    server.courses(1).await;

    let res = server
        .post("/courses/1/presenters", &admin, json!({ "user_id": first.id }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = server
        .post(&format!("/courses/1/presenters/{}", second.id), &admin, json!({}))
        .await;
    let presenters: Vec<Value> = res.json().await.unwrap();
    assert_eq!(presenters.len(), 2);

    let res = server
        .delete(&format!("/courses/1/presenters/{}", second.id), &first_token)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].is_string());
    let remaining = body["presenters"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], first.id.get());

    let res = server
        .delete(&format!("/courses/1/presenters/{}", second.id), &admin)
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_location_can_be_set_read_and_cleared() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (teacher, token) = server.login("Teacher", UserType::Teacher).await;
    let (_, other) = server.login("Other", UserType::Teacher).await;
    let hq = server
        .store
        .create_location(NewLocation::new("HQ").unwrap())
        .await
        .unwrap();
    let path = format!("/users/{}/locations", teacher.id);

    let body: Value = server.get(&path, &token).await.json().await.unwrap();
    assert_eq!(body["user_id"], teacher.id.get());
    assert_eq!(body["location"], Value::Null);

    let res = server.post(&path, &other, json!({ "location_id": hq.id })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server.post(&path, &token, json!({ "location_id": hq.id })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["location_id"], hq.id.get());

    let body: Value = server.get(&path, &admin).await.json().await.unwrap();
    assert_eq!(body["location"]["name"], "HQ");

    let res = server.post(&path, &token, json!({ "location_id": 99 })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server.delete(&path, &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["location_id"], Value::Null);
}

#[tokio::test]
async fn users_and_courses_can_be_edited() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (teacher, token) = server.login("Teacher", UserType::Teacher).await;
    let (presenter, presenter_token) = server.login("Presenter", UserType::Presenter).await;
    server.courses(2).await;
    server.store.add_presenter(CourseId::new(1), presenter.id).await.unwrap();

    let path = format!("/users/{}", teacher.id);
    let res = server.put(&path, &token, json!({ "name": "Me" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server
        .put(&path, &admin, json!({ "name": "Renamed", "usertype_id": 3 }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["name"], "Renamed");
    assert_eq!(user["usertype_id"], 3);
    assert_eq!(user["email"], "teacher@school.org");

    let res = server.put(&path, &admin, json!({ "usertype_id": 42 })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .put("/courses/1", &presenter_token, json!({ "title": "Robotics" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let course: Value = res.json().await.unwrap();
    assert_eq!(course["title"], "Robotics");
    assert_eq!(course["hours"], 3);

    let res = server
        .put("/courses/2", &presenter_token, json!({ "title": "Not mine" }))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server
        .put("/courses/2", &admin, json!({ "ends": "2024-05-01T08:00:00Z" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn locations_are_admin_managed_and_protected_while_used() {
    let server = TestServer::spawn().await;
    let (_, admin) = server.login("Admin", UserType::SuperAdmin).await;
    let (teacher, token) = server.login("Teacher", UserType::Teacher).await;

    let res = server.post("/locations", &token, json!({ "name": "Annex" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let mut ids = Vec::new();
    for name in ["HQ", "Annex"] {
        let res = server.post("/locations", &admin, json!({ "name": name })).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let location: Value = res.json().await.unwrap();
        ids.push(LocationId::new(location["id"].as_i64().unwrap()));
    }
    let (hq, annex) = (ids[0], ids[1]);

    let res = server.post("/locations", &admin, json!({ "name": "  " })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .put(&format!("/locations/{annex}"), &admin, json!({ "name": "North Annex" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let renamed: Value = server
        .get(&format!("/locations/{annex}"), &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(renamed["name"], "North Annex");

    let all: Vec<Value> = server.get("/locations", &token).await.json().await.unwrap();
    assert_eq!(all.len(), 2);

    server.store.set_user_location(teacher.id, Some(hq)).await.unwrap();
    let users: Vec<Value> = server
        .get(&format!("/locations/{hq}/users"), &admin)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], teacher.id.get());
    assert_eq!(
        server.get(&format!("/locations/{hq}/users"), &token).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let res = server
        .post(
            "/courses",
            &admin,
            json!({
                "title": "On site",
                "starts": "2024-05-01T09:00:00Z",
                "ends": "2024-05-01T12:00:00Z",
                "location_id": annex,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let courses: Vec<Value> = server
        .get(&format!("/locations/{annex}/courses"), &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(courses.len(), 1);

    let res = server.delete(&format!("/locations/{hq}"), &admin).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(res).await, "conflict");
    let res = server.delete(&format!("/locations/{annex}"), &admin).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    server.store.set_user_location(teacher.id, None).await.unwrap();
    let res = server.delete(&format!("/locations/{hq}"), &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].is_string());
    let remaining = body["locations"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["name"], "North Annex");

    assert_eq!(server.get(&format!("/locations/{hq}"), &token).await.status(), StatusCode::NOT_FOUND);
}
