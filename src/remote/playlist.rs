//! Remote playlist sources yielding the ordered target track list

use std::{
    path::PathBuf,
    sync::LazyLock,
};

use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    domain::{normalize::Normalizer, track::RemoteTrackRef},
    remote::{error::RemoteError, http::HttpTransport},
    reporter::Reporter,
};

pub const YTMUSIC_BROWSE_URL: &str = "https://music.youtube.com/youtubei/v1/browse?prettyPrint=false";
const YTMUSIC_CLIENT_VERSION: &str = "1.20240918.01.00";
const MAX_CONTINUATION_PAGES: usize = 100;
const ARTIST_PAGE_TYPE: &str = "MUSIC_PAGE_TYPE_ARTIST";

static PLAYLIST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"list=([a-zA-Z0-9_-]+)").unwrap());

/// One playlist entry before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaylistItem {
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
}

pub trait PlaylistSource {
    fn fetch(&self) -> Result<Vec<PlaylistItem>, RemoteError>;

    fn describe(&self) -> String;
}

/// A local JSON export: `[{"title": "...", "artists": ["..."]}]`.
pub struct FilePlaylist {
    path: PathBuf,
}

impl FilePlaylist {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl PlaylistSource for FilePlaylist {
    fn fetch(&self) -> Result<Vec<PlaylistItem>, RemoteError> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn describe(&self) -> String {
        format!("playlist file {}", self.path.to_string_lossy())
    }
}

pub fn extract_playlist_id(url: &str) -> Option<String> {
    PLAYLIST_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Public YouTube Music playlist, read through the web client's browse endpoint.
pub struct YtMusicPlaylist<T: HttpTransport> {
    url: String,
    transport: T,
}

impl<T: HttpTransport> YtMusicPlaylist<T> {
    pub fn new(url: String, transport: T) -> Self {
        Self { url, transport }
    }

    fn context() -> Value {
        json!({
            "client": {
                "clientName": "WEB_REMIX",
                "clientVersion": YTMUSIC_CLIENT_VERSION,
                "hl": "en",
            }
        })
    }
}

impl<T: HttpTransport> PlaylistSource for YtMusicPlaylist<T> {
    fn fetch(&self) -> Result<Vec<PlaylistItem>, RemoteError> {
        let id = extract_playlist_id(&self.url)
            .ok_or_else(|| RemoteError::InvalidPlaylistUrl(self.url.clone()))?;
        let browse_id = if id.starts_with("VL") {
            id
        } else {
            format!("VL{id}")
        };

        let mut items = Vec::new();
        let mut body = json!({ "context": Self::context(), "browseId": browse_id });

        for _ in 0..MAX_CONTINUATION_PAGES {
            let reply = self.transport.post_json(YTMUSIC_BROWSE_URL, &body)?;
            if reply.status != 200 {
                return Err(RemoteError::Status {
                    status: reply.status,
                    body: reply.body,
                });
            }
            let page: Value = serde_json::from_str(&reply.body)?;

            let (page_items, continuation) = read_page(&page);
            items.extend(page_items);

            match continuation {
                Some(token) => {
                    body = json!({ "context": Self::context(), "continuation": token });
                }
                None => break,
            }
        }

        Ok(items)
    }

    fn describe(&self) -> String {
        format!("YouTube Music playlist {}", self.url)
    }
}

/// Depth-first lookup of the first object member named `key`.
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|child| find_key(child, key))),
        Value::Array(values) => values.iter().find_map(|child| find_key(child, key)),
        _ => None,
    }
}

/// Items and the next-page token of one browse response.
///
/// Only the playlist shelf is read: the first page's `musicPlaylistShelfRenderer`,
/// later pages' `appendContinuationItemsAction`. Suggestion shelves and their
/// section-level continuations are ignored.
fn read_page(page: &Value) -> (Vec<PlaylistItem>, Option<String>) {
    if let Some(shelf) = find_key(page, "musicPlaylistShelfRenderer")
        .or_else(|| find_key(page, "musicPlaylistShelfContinuation"))
    {
        let (items, token) = read_shelf_entries(shelf.get("contents"));
        let token = token.or_else(|| {
            shelf
                .pointer("/continuations/0/nextContinuationData/continuation")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        return (items, token);
    }

    let appended = find_key(page, "appendContinuationItemsAction")
        .and_then(|action| action.get("continuationItems"));
    read_shelf_entries(appended)
}

fn read_shelf_entries(entries: Option<&Value>) -> (Vec<PlaylistItem>, Option<String>) {
    let mut items = Vec::new();
    let mut token = None;

    for entry in entries.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]) {
        if let Some(renderer) = entry.get("musicResponsiveListItemRenderer") {
            items.extend(parse_list_item(renderer));
        } else if let Some(next) = entry
            .pointer("/continuationItemRenderer/continuationEndpoint/continuationCommand/token")
            .and_then(Value::as_str)
        {
            token = Some(next.to_string());
        }
    }

    (items, token)
}

fn column_runs(renderer: &Value, column: usize) -> &[Value] {
    renderer
        .get("flexColumns")
        .and_then(|cols| cols.get(column))
        .and_then(|col| col.pointer("/musicResponsiveListItemFlexColumnRenderer/text/runs"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn run_text(run: &Value) -> Option<&str> {
    run.get("text").and_then(Value::as_str)
}

fn parse_list_item(renderer: &Value) -> Option<PlaylistItem> {
    let title = column_runs(renderer, 0)
        .iter()
        .filter_map(run_text)
        .collect::<String>();
    if title.trim().is_empty() {
        return None;
    }

    let runs = column_runs(renderer, 1);
    let linked = runs
        .iter()
        .filter(|run| {
            run.pointer("/navigationEndpoint/browseEndpoint/browseEndpointContextSupportedConfigs/browseEndpointContextMusicConfig/pageType")
                .and_then(Value::as_str)
                == Some(ARTIST_PAGE_TYPE)
        })
        .filter_map(run_text)
        .map(str::to_string)
        .collect::<Vec<_>>();

    let artists = if linked.is_empty() {
        runs.iter()
            .filter_map(run_text)
            .map(str::trim)
            .filter(|t| !t.is_empty() && !matches!(*t, "," | "&" | "•"))
            .map(str::to_string)
            .collect()
    } else {
        linked
    };

    Some(PlaylistItem {
        title: title.trim().to_string(),
        artists,
    })
}

/// Fetches the playlist and builds track refs in playlist order.
///
/// Source failures are logged and yield an empty list.
pub fn load_tracks(
    source: &dyn PlaylistSource,
    normalizer: &Normalizer,
    reporter: &dyn Reporter,
) -> Vec<RemoteTrackRef> {
    reporter.info(&format!("loading {}", source.describe()));

    let items = match source.fetch() {
        Ok(items) => items,
        Err(e) => {
            reporter.error(&format!("could not load playlist: {e}"));
            return Vec::new();
        }
    };

    let total = items.len();
    if total == 0 {
        reporter.warn("playlist is empty or could not be parsed");
        return Vec::new();
    }
    reporter.info(&format!("found {total} tracks"));

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            if (idx + 1) % 20 == 0 {
                reporter.info(&format!("processing track {}/{total}", idx + 1));
            }
            let track = RemoteTrackRef::new(item.title, item.artists.join(", "), normalizer);
            reporter.debug(&format!(
                "[REMOTE] {} -> {} / {}",
                track.label(),
                track.patterns()[0],
                track.patterns()[1]
            ));
            track
        })
        .collect()
}
