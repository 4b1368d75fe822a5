//! Locating fields in upstream JSON responses whose envelope varies between
//! API deployments.
//!
//! A [`ResponseSchema`] lists the known shapes as JSON pointers, tried in order.
//! Only when none of them match does it fall back to a breadth-first search for
//! the key, limited to a fixed depth.

use std::collections::VecDeque;

use serde_json::Value;

/// Default depth limit for the generic search.
pub const DEFAULT_SEARCH_DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub struct ResponseSchema {
    /// Schema revision, bumped whenever `shapes` changes.
    pub version: u32,
    /// JSON pointers to the wanted value, most specific first.
    pub shapes: &'static [&'static str],
    /// Key looked up by the fallback search; `None` disables the fallback.
    pub fallback_key: Option<&'static str>,
    /// Subtrees the fallback search never enters.
    pub skip_keys: &'static [&'static str],
    pub max_depth: usize,
}

/// Base64 manifest in a `/track/` response.
pub const MANIFEST_SCHEMA: ResponseSchema = ResponseSchema {
    version: 1,
    shapes: &["/data/manifest", "/manifest", "/info/manifest", "/data/info/manifest"],
    fallback_key: Some("manifest"),
    skip_keys: &[],
    max_depth: DEFAULT_SEARCH_DEPTH,
};

/// Track object in an `/info/` response.
pub const TRACK_INFO_SCHEMA: ResponseSchema = ResponseSchema {
    version: 1,
    shapes: &["/data", ""],
    fallback_key: None,
    skip_keys: &[],
    max_depth: DEFAULT_SEARCH_DEPTH,
};

/// Page of track entries in an `/album/` or `/playlist/` response. Album
/// responses come either wrapped in `data` or as `[album, {items}]`.
pub const ITEMS_SCHEMA: ResponseSchema = ResponseSchema {
    version: 1,
    shapes: &[
        "/data/items",
        "/items",
        "/1/items",
        "/tracks/items",
        "/data/tracks/items",
    ],
    fallback_key: Some("items"),
    skip_keys: &["albums", "artists", "playlists"],
    max_depth: DEFAULT_SEARCH_DEPTH,
};

/// Album object in an `/album/` response.
pub const ALBUM_INFO_SCHEMA: ResponseSchema = ResponseSchema {
    version: 1,
    shapes: &[
        "/0",
        "/data/album",
        "/album",
        "/data/items/0/item/album",
        "/data/items/0/album",
        "/items/0/item/album",
    ],
    fallback_key: None,
    skip_keys: &[],
    max_depth: DEFAULT_SEARCH_DEPTH,
};

/// Playlist object in a `/playlist/` response.
pub const PLAYLIST_INFO_SCHEMA: ResponseSchema = ResponseSchema {
    version: 1,
    shapes: &["/playlist", "/data/playlist", "/info", "/data", ""],
    fallback_key: None,
    skip_keys: &[],
    max_depth: DEFAULT_SEARCH_DEPTH,
};

impl ResponseSchema {
    /// Return the first value matched by a known shape or, failing that, by the
    /// bounded fallback search. `null` values never match.
    pub fn locate<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        self.shapes
            .iter()
            .filter_map(|pointer| body.pointer(pointer))
            .find(|value| !value.is_null())
            .or_else(|| {
                self.fallback_key
                    .and_then(|key| find_key(body, key, self.skip_keys, self.max_depth))
            })
    }

    /// First match that is an array. A shape holding some other value is
    /// skipped rather than ending the lookup.
    pub fn locate_array<'a>(&self, body: &'a Value) -> Option<&'a [Value]> {
        self.shapes
            .iter()
            .filter_map(|pointer| body.pointer(pointer))
            .find_map(Value::as_array)
            .or_else(|| {
                self.fallback_key
                    .and_then(|key| find_key(body, key, self.skip_keys, self.max_depth))
                    .and_then(Value::as_array)
            })
            .map(Vec::as_slice)
    }

    /// First match that is an object.
    pub fn locate_object<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        self.shapes
            .iter()
            .filter_map(|pointer| body.pointer(pointer))
            .find(|value| value.is_object())
    }

    /// Like [`locate`](Self::locate) but requires the match to be a non-empty string.
    pub fn locate_str<'a>(&self, body: &'a Value) -> Option<&'a str> {
        self.locate(body)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Breadth-first search for `key`, looking at most `max_depth` levels below
/// `root` and never descending into members named in `skip`.
pub fn find_key<'a>(
    root: &'a Value,
    key: &str,
    skip: &[&str],
    max_depth: usize,
) -> Option<&'a Value> {
    let mut queue = VecDeque::from([(root, 0usize)]);
    while let Some((value, depth)) = queue.pop_front() {
        match value {
            Value::Object(map) => {
                if let Some(found) = map.get(key).filter(|v| !v.is_null()) {
                    return Some(found);
                }
                if depth < max_depth {
                    queue.extend(
                        map.iter()
                            .filter(|(name, _)| !skip.contains(&name.as_str()))
                            .map(|(_, child)| (child, depth + 1)),
                    );
                }
            }
            Value::Array(items) if depth < max_depth => {
                queue.extend(items.iter().map(|child| (child, depth + 1)));
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_shapes_win_in_order() {
        let body = json!({"manifest": "top", "data": {"manifest": "nested"}});
        assert_eq!(MANIFEST_SCHEMA.locate_str(&body), Some("nested"));

        let body = json!({"info": {"manifest": "info"}});
        assert_eq!(MANIFEST_SCHEMA.locate_str(&body), Some("info"));
    }

    #[test]
    fn falls_back_to_bounded_search() {
        let body = json!({"version": "2.0", "payload": [{"stream": {"manifest": "deep"}}]});
        assert_eq!(MANIFEST_SCHEMA.locate_str(&body), Some("deep"));

        let too_deep = json!({"a": {"b": {"c": {"d": {"e": {"manifest": "x"}}}}}});
        assert_eq!(MANIFEST_SCHEMA.locate(&too_deep), None);
    }

    #[test]
    fn null_and_empty_values_do_not_match() {
        let body = json!({"data": {"manifest": null}, "manifest": ""});
        assert_eq!(MANIFEST_SCHEMA.locate_str(&body), None);
    }

    #[test]
    fn track_info_accepts_wrapped_or_bare_objects() {
        let wrapped = json!({"data": {"id": 1}});
        assert_eq!(TRACK_INFO_SCHEMA.locate(&wrapped), Some(&json!({"id": 1})));
        let bare = json!({"id": 2});
        assert_eq!(TRACK_INFO_SCHEMA.locate(&bare), Some(&bare));
    }

    #[test]
    fn items_are_found_in_every_known_envelope() {
        let wrapped = json!({"data": {"items": [{"id": 1}]}});
        assert_eq!(ITEMS_SCHEMA.locate_array(&wrapped).unwrap().len(), 1);

        let album_pair = json!([{"id": 9, "title": "LP"}, {"items": [{"item": {"id": 1}}, {"item": {"id": 2}}]}]);
        assert_eq!(ITEMS_SCHEMA.locate_array(&album_pair).unwrap().len(), 2);
        assert_eq!(
            ALBUM_INFO_SCHEMA.locate_object(&album_pair),
            Some(&json!({"id": 9, "title": "LP"}))
        );
    }

    #[test]
    fn items_fallback_skips_unrelated_collections() {
        let body = json!({
            "albums": {"items": [{"id": "wrong"}]},
            "result": {"page": {"items": [{"id": "right"}]}}
        });
        let items = ITEMS_SCHEMA.locate_array(&body).unwrap();
        assert_eq!(items[0]["id"], "right");
    }

    #[test]
    fn non_array_shape_does_not_hide_a_later_one() {
        let body = json!({"data": {"items": "n/a"}, "items": [{"id": 3}]});
        assert_eq!(ITEMS_SCHEMA.locate_array(&body).unwrap()[0]["id"], 3);
    }

    #[test]
    fn playlist_info_prefers_the_playlist_member() {
        let body = json!({"playlist": {"title": "Mix"}, "items": []});
        assert_eq!(
            PLAYLIST_INFO_SCHEMA.locate_object(&body).unwrap()["title"],
            "Mix"
        );
        let bare = json!({"title": "Bare", "items": []});
        assert_eq!(PLAYLIST_INFO_SCHEMA.locate_object(&bare), Some(&bare));
    }
}
