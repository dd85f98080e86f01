use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "RETS-Session-ID";
pub const BOUNDARY: &str = "mock-rets-boundary";
/// Size of the photo served for a single-object GetObject.
pub const SINGLE_PHOTO_LEN: usize = 512;
/// Listing with photos; any other listing id yields "No Object Found".
pub const KNOWN_LISTING: &str = "LN1";

const RETS_SESSION_ID: HeaderName = HeaderName::from_static("rets-session-id");
const XML: &str = "text/xml";

#[derive(Debug, Default)]
pub struct ServerState {
    pub sessions: HashSet<String>,
    pub challenges: usize,
    pub logins: usize,
    pub logouts: usize,
}

pub type Db = Arc<RwLock<ServerState>>;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "SearchType")]
    pub search_type: Option<String>,
    #[serde(rename = "Class")]
    pub class: Option<String>,
    #[serde(rename = "Query")]
    pub query: Option<String>,
}

#[derive(Deserialize)]
pub struct MetadataQuery {
    #[serde(rename = "Type")]
    pub metadata_type: String,
    #[serde(rename = "ID", default)]
    pub id: String,
}

#[derive(Deserialize)]
pub struct ObjectQuery {
    #[serde(rename = "Resource")]
    pub resource: String,
    #[serde(rename = "Type")]
    pub object_type: String,
    #[serde(rename = "ID")]
    pub id: String,
}

pub fn app() -> Router {
    app_with_state(Db::default())
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/rets/login", get(login))
        .route("/rets/action", get(action))
        .route("/rets/search", get(search))
        .route("/rets/getmetadata", get(get_metadata))
        .route("/rets/getobject", get(get_object))
        .route("/rets/logout", get(logout))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, Db::default()).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

/// Deterministic JPEG-looking bytes for photo `index`.
pub fn photo(index: u8, len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend((0..len.saturating_sub(6)).map(|i| (i as u8) ^ index));
    bytes.extend([0xFF, 0xD9]);
    bytes
}

pub fn login_body() -> String {
    [
        r#"<RETS ReplyCode="0" ReplyText="Operation Successful">"#,
        "<RETS-RESPONSE>",
        "MemberName=Mock Agent",
        "User=mock,1,Agent,MOCK1",
        "MetadataVersion=1.00.000",
        "Action=/rets/action",
        "Search=/rets/search",
        "GetMetadata=/rets/getmetadata",
        "GetObject=/rets/getobject",
        "Logout=/rets/logout",
        "</RETS-RESPONSE>",
        "</RETS>",
    ]
    .join("\r\n")
}

fn reply(code: u32, text: &str) -> String {
    format!(r#"<RETS ReplyCode="{code}" ReplyText="{text}"/>"#)
}

fn challenge() -> Response {
    let value = format!(
        r#"Digest realm="mock-rets", nonce="{}", opaque="{}", qop="auth""#,
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, value)],
        reply(20037, "Authorization required"),
    )
        .into_response()
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .map(str::trim)
        .find_map(|c| c.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .map(str::to_string)
}

async fn has_session(db: &Db, headers: &HeaderMap) -> bool {
    match session_id(headers) {
        Some(id) => db.read().await.sessions.contains(&id),
        None => false,
    }
}

async fn login(State(db): State<Db>, headers: HeaderMap) -> Response {
    let digest = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Digest "));
    if !digest {
        db.write().await.challenges += 1;
        debug!("login without digest credentials, issuing challenge");
        return challenge();
    }

    let id = Uuid::new_v4().simple().to_string();
    {
        let mut state = db.write().await;
        state.sessions.insert(id.clone());
        state.logins += 1;
    }
    info!(session = %id, "mock login");
    (
        [
            (header::SET_COOKIE, format!("{SESSION_COOKIE}={id}; path=/")),
            (RETS_SESSION_ID, id),
            (header::CONTENT_TYPE, XML.to_string()),
        ],
        login_body(),
    )
        .into_response()
}

async fn action(State(db): State<Db>, headers: HeaderMap) -> Response {
    if !has_session(&db, &headers).await {
        return challenge();
    }
    ([(header::CONTENT_TYPE, "text/plain")], "Welcome to the mock RETS server").into_response()
}

async fn search(State(db): State<Db>, headers: HeaderMap, Query(q): Query<SearchQuery>) -> Response {
    if !has_session(&db, &headers).await {
        return challenge();
    }
    let (Some(search_type), Some(class), Some(query)) = (q.search_type, q.class, q.query) else {
        return ([(header::CONTENT_TYPE, XML)], reply(20203, "Missing search parameter")).into_response();
    };
    debug!(%search_type, %class, %query, "mock search");
    let body = [
        r#"<RETS ReplyCode="0" ReplyText="Operation Successful">"#.to_string(),
        r#"<COUNT Records="2"/>"#.to_string(),
        r#"<DELIMITER value="09"/>"#.to_string(),
        "<COLUMNS>\tListingID\tClass\tListPrice\t</COLUMNS>".to_string(),
        format!("<DATA>\tLN1\t{class}\t300000\t</DATA>"),
        format!("<DATA>\tLN2\t{class}\t450000\t</DATA>"),
        "</RETS>".to_string(),
    ]
    .join("\r\n");
    ([(header::CONTENT_TYPE, XML)], body).into_response()
}

async fn get_metadata(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(q): Query<MetadataQuery>,
) -> Response {
    if !has_session(&db, &headers).await {
        return challenge();
    }
    if q.metadata_type != "METADATA-SYSTEM" {
        return ([(header::CONTENT_TYPE, XML)], reply(20502, "Invalid Identifier")).into_response();
    }
    let body = format!(
        "{}\r\n<METADATA-SYSTEM Version=\"1.00.000\" Date=\"2024-01-01T00:00:00Z\">\r\n<SYSTEM SystemID=\"MOCK\" SystemDescription=\"Mock RETS ({})\"/>\r\n</METADATA-SYSTEM>\r\n</RETS>",
        r#"<RETS ReplyCode="0" ReplyText="Operation Successful">"#,
        q.id
    );
    ([(header::CONTENT_TYPE, XML)], body).into_response()
}

async fn get_object(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(q): Query<ObjectQuery>,
) -> Response {
    if !has_session(&db, &headers).await {
        return challenge();
    }
    let (listing, object) = q.id.split_once(':').unwrap_or((q.id.as_str(), "*"));
    if listing != KNOWN_LISTING || q.resource != "Property" || q.object_type != "Photo" {
        return ([(header::CONTENT_TYPE, XML)], reply(20403, "No Object Found")).into_response();
    }

    if object == "*" {
        let mut body = b"This is a multipart message.\r\n".to_vec();
        for index in 1..=2u8 {
            body.extend(format!("--{BOUNDARY}\r\n").into_bytes());
            body.extend(
                format!(
                    "Content-Type: image/jpeg\r\nContent-ID: {listing}\r\nObject-ID: {index}\r\n\r\n"
                )
                .into_bytes(),
            );
            body.extend(photo(index, 256));
            body.extend(b"\r\n");
        }
        body.extend(format!("--{BOUNDARY}--\r\n").into_bytes());
        let content_type = format!("multipart/parallel; boundary={BOUNDARY}");
        return ([(header::CONTENT_TYPE, content_type)], body).into_response();
    }

    let index: u8 = object.parse().unwrap_or(1);
    (
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (HeaderName::from_static("content-id"), listing.to_string()),
            (HeaderName::from_static("object-id"), index.to_string()),
        ],
        photo(index, SINGLE_PHOTO_LEN),
    )
        .into_response()
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return challenge();
    };
    let mut state = db.write().await;
    if !state.sessions.remove(&id) {
        return challenge();
    }
    state.logouts += 1;
    info!(session = %id, "mock logout");
    ([(header::CONTENT_TYPE, XML)], reply(0, "Logged out")).into_response()
}
