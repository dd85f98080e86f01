use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, photo, Db, BOUNDARY, SESSION_COOKIE, SINGLE_PHOTO_LEN};
use tower::ServiceExt;

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_text(response: axum::response::Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn get_with_session(uri: &str, session: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header(http::header::COOKIE, format!("{SESSION_COOKIE}={session}"))
        .body(String::new())
        .unwrap()
}

fn digest_login() -> Request<String> {
    Request::builder()
        .uri("/rets/login")
        .header(http::header::AUTHORIZATION, r#"Digest username="mock", nc=00000001"#)
        .body(String::new())
        .unwrap()
}

/// Log in against `db` and return the issued session id.
async fn login(db: &Db) -> String {
    let resp = app_with_state(db.clone()).oneshot(digest_login()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    resp.headers()
        .get("rets-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

// --- login ---

#[tokio::test]
async fn login_without_credentials_is_challenged() {
    let resp = app().oneshot(get("/rets/login")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp
        .headers()
        .get(http::header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(challenge.starts_with("Digest realm=\"mock-rets\""));
    assert!(challenge.contains("nonce=\""));
}

#[tokio::test]
async fn login_with_digest_sets_session_cookie() {
    let db = Db::default();
    let resp = app_with_state(db.clone()).oneshot(digest_login()).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .headers()
        .get(http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let session = resp.headers().get("rets-session-id").unwrap().to_str().unwrap().to_string();
    assert_eq!(cookie, format!("{SESSION_COOKIE}={session}; path=/"));

    let body = body_text(resp).await;
    assert!(body.contains("GetObject=/rets/getobject"));
    assert_eq!(db.read().await.logins, 1);
}

// --- search ---

#[tokio::test]
async fn search_requires_session() {
    let resp = app()
        .oneshot(get("/rets/search?SearchType=Property&Class=RES&Query=(Status%3DA)"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_echoes_class_in_rows() {
    let db = Db::default();
    let session = login(&db).await;

    let resp = app_with_state(db)
        .oneshot(get_with_session(
            "/rets/search?SearchType=Property&Class=RES&Query=%28Status%3DA%29&QueryType=DMQL2",
            &session,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains(r#"ReplyCode="0""#));
    assert!(body.contains("<DATA>\tLN1\tRES\t300000\t</DATA>"));
}

#[tokio::test]
async fn search_without_class_replies_error() {
    let db = Db::default();
    let session = login(&db).await;

    let resp = app_with_state(db)
        .oneshot(get_with_session("/rets/search?SearchType=Property", &session))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains(r#"ReplyCode="20203""#));
}

// --- getmetadata ---

#[tokio::test]
async fn metadata_system_is_served() {
    let db = Db::default();
    let session = login(&db).await;

    let resp = app_with_state(db)
        .oneshot(get_with_session(
            "/rets/getmetadata?Type=METADATA-SYSTEM&ID=*&Format=COMPACT",
            &session,
        ))
        .await
        .unwrap();

    let body = body_text(resp).await;
    assert!(body.contains("<SYSTEM SystemID=\"MOCK\""));
}

// --- getobject ---

#[tokio::test]
async fn get_object_all_photos_is_multipart() {
    let db = Db::default();
    let session = login(&db).await;

    let resp = app_with_state(db)
        .oneshot(get_with_session(
            "/rets/getobject?Resource=Property&Type=Photo&ID=LN1%3A*&Location=0",
            &session,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers().get(http::header::CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
    assert_eq!(content_type, format!("multipart/parallel; boundary={BOUNDARY}"));
    let body = body_bytes(resp).await;
    let text = String::from_utf8_lossy(&body);
    assert_eq!(text.matches(&format!("--{BOUNDARY}\r\n")).count(), 2);
    assert!(text.ends_with(&format!("--{BOUNDARY}--\r\n")));
}

#[tokio::test]
async fn get_object_single_photo_has_length() {
    let db = Db::default();
    let session = login(&db).await;

    let resp = app_with_state(db)
        .oneshot(get_with_session(
            "/rets/getobject?Resource=Property&Type=Photo&ID=LN1%3A2&Location=0",
            &session,
        ))
        .await
        .unwrap();

    assert_eq!(resp.headers().get("object-id").unwrap(), "2");
    let body = body_bytes(resp).await;
    assert_eq!(body.len(), SINGLE_PHOTO_LEN);
    assert_eq!(body.to_vec(), photo(2, SINGLE_PHOTO_LEN));
}

#[tokio::test]
async fn get_object_unknown_listing_is_xml_error() {
    let db = Db::default();
    let session = login(&db).await;

    let resp = app_with_state(db)
        .oneshot(get_with_session(
            "/rets/getobject?Resource=Property&Type=Photo&ID=LN404%3A*",
            &session,
        ))
        .await
        .unwrap();

    assert_eq!(resp.headers().get(http::header::CONTENT_TYPE).unwrap(), "text/xml");
    assert!(body_text(resp).await.contains(r#"ReplyCode="20403""#));
}

// --- logout ---

#[tokio::test]
async fn logout_ends_session() {
    let db = Db::default();
    let session = login(&db).await;

    let resp = app_with_state(db.clone())
        .oneshot(get_with_session("/rets/logout", &session))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(db.read().await.logouts, 1);

    let resp = app_with_state(db.clone())
        .oneshot(get_with_session("/rets/search?SearchType=Property&Class=RES&Query=x", &session))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app_with_state(db.clone())
        .oneshot(get_with_session("/rets/logout", &session))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(db.read().await.logouts, 1);
}
