//! Mock Discord API and archive read-back helpers

use std::io::Read;
use std::path::Path;

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token the mock server accepts
pub const TEST_TOKEN: &str = "test-token";

/// API prefix mounted on the mock server
pub const API_PREFIX: &str = "/api/v9";

/// A message as the service returns it
pub fn message_json(channel: &str, id: u64) -> Value {
    json!({
        "id": id.to_string(),
        "channel_id": channel,
        "timestamp": format!("2024-02-01T10:00:{:02}+00:00", id % 60),
        "content": format!("message {id}"),
        "author": {"id": "42", "username": "ferris"},
        "attachments": [],
    })
}

/// Base URL to configure for `server`
pub fn api_base(server: &MockServer) -> String {
    format!("{}{}", server.uri(), API_PREFIX)
}

/// Mount the account, one guild and its channel list.
///
/// The guild has a voice channel between the two text channels; text-only
/// listings index `general` as 0 and `random` as 1.
pub async fn mount_guild(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{API_PREFIX}/users/@me")))
        .and(header("authorization", TEST_TOKEN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "1000", "username": "archivist"})),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API_PREFIX}/users/@me/guilds")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "1", "name": "Rustaceans"}])),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API_PREFIX}/guilds/1/channels")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "10", "name": "general", "type": 0, "position": 0},
            {"id": "12", "name": "Voice", "type": 2, "position": 1},
            {"id": "11", "name": "random", "type": 0, "position": 2},
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API_PREFIX}/users/@me")))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"message": "401: Unauthorized", "code": 0})),
        )
        .mount(server)
        .await;
}

/// Mount the history of `channel` as pages of `page_size`, ids `count..=1` newest first.
///
/// Each page request is expected exactly once, including the terminating empty page.
pub async fn mount_history(server: &MockServer, channel: &str, count: u64, page_size: usize) {
    let ids: Vec<u64> = (1..=count).rev().collect();
    let pages: Vec<&[u64]> = ids.chunks(page_size).collect();
    let messages_path = format!("{API_PREFIX}/channels/{channel}/messages");

    let mut before: Option<u64> = None;
    for page in pages.iter().copied().chain(std::iter::once(&[][..])) {
        let body: Vec<Value> = page.iter().map(|id| message_json(channel, *id)).collect();
        let mock = Mock::given(method("GET"))
            .and(path(messages_path.as_str()))
            .and(query_param("limit", page_size.to_string()));
        let mock = match before {
            None => mock.and(query_param_is_missing("before")),
            Some(cursor) => mock.and(query_param("before", cursor.to_string())),
        };
        mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;

        if let Some(last) = page.last() {
            before = Some(*last);
        }
    }
}

/// Make every message request for `channel` fail with `status`
pub async fn mount_failing_history(server: &MockServer, channel: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("{API_PREFIX}/channels/{channel}/messages")))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(json!({"message": "Missing Access", "code": 50001})),
        )
        .mount(server)
        .await;
}

/// Read every entry of a zip archive as `(name, lines)`, in archive order
pub fn read_archive(path: &Path) -> Vec<(String, Vec<String>)> {
    let file = std::fs::File::open(path).expect("archive exists");
    let mut archive = zip::ZipArchive::new(file).expect("valid zip archive");

    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).expect("entry readable");
            let mut contents = String::new();
            entry
                .read_to_string(&mut contents)
                .expect("entry is UTF-8");
            (
                entry.name().to_string(),
                contents.lines().map(str::to_string).collect(),
            )
        })
        .collect()
}
