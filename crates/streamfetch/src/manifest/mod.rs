//! Manifest resolution: JSON or DASH manifest text into a descriptor, and a
//! descriptor into the ordered list of URLs that make up the asset.

mod xml;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::AcquireError;
use xml::{XmlElement, decode_entities, parse_document};

/// Token substituted with the running segment number in a media template.
pub const NUMBER_TOKEN: &str = "$Number$";

/// Upper bound on media segments a single manifest may expand to.
pub const MAX_MEDIA_SEGMENTS: u64 = 1 << 20;

/// One run-length encoded timeline entry (`<S d=".." r=".."/>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub duration: u64,
    /// Additional repetitions after the first segment.
    pub repeat: i64,
}

impl TimelineEntry {
    /// Number of media segments this entry expands to.
    pub fn segment_count(&self) -> u64 {
        u64::try_from(self.repeat.saturating_add(1)).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedManifest {
    pub base_url: String,
    pub initialization: String,
    pub media_template: String,
    pub start_number: u64,
    /// Empty means exactly one media segment.
    pub timeline: Vec<TimelineEntry>,
}

impl SegmentedManifest {
    pub fn media_segment_count(&self) -> u64 {
        if self.timeline.is_empty() {
            return 1;
        }
        self.timeline
            .iter()
            .map(TimelineEntry::segment_count)
            .fold(0u64, u64::saturating_add)
    }
}

/// How a track is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestDescriptor {
    Direct { url: String },
    Segmented(SegmentedManifest),
}

impl ManifestDescriptor {
    pub fn is_segmented(&self) -> bool {
        matches!(self, Self::Segmented(_))
    }
}

/// Pull a direct URL out of a JSON manifest (`{"urls": [...]}` or `{"url": ...}`).
///
/// Fields are read leniently: a field of the wrong type is treated as absent
/// rather than failing the whole document.
fn json_descriptor(value: &Value) -> Option<ManifestDescriptor> {
    if let Some(encryption) = value.get("encryptionType").and_then(Value::as_str)
        && !encryption.eq_ignore_ascii_case("NONE")
    {
        debug!(encryption, "JSON manifest declares encryption");
    }
    trace!(mime_type = ?value.get("mimeType"), "Decoded JSON manifest");

    let from_list = value
        .get("urls")
        .and_then(Value::as_array)
        .and_then(|urls| urls.first())
        .and_then(Value::as_str);
    let url = from_list
        .or_else(|| value.get("url").and_then(Value::as_str))
        .filter(|url| !url.is_empty())?;
    Some(ManifestDescriptor::Direct {
        url: url.to_string(),
    })
}

/// Parse manifest text into a [`ManifestDescriptor`].
///
/// JSON objects are tried first; anything else (or a JSON object without a
/// usable URL) is parsed as DASH XML after one round of entity decoding.
/// Every failure is reported as [`AcquireError::ManifestParse`].
pub fn resolve(text: &str) -> Result<ManifestDescriptor, AcquireError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AcquireError::manifest_parse("manifest is empty"));
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                if let Some(descriptor) = json_descriptor(&value) {
                    return Ok(descriptor);
                }
                debug!("JSON manifest has no usable url, trying XML");
            }
            Err(e) => debug!(error = %e, "Manifest is not valid JSON, trying XML"),
        }
    }

    let root = parse_xml(trimmed)?;
    resolve_dash(&root)
}

fn parse_xml(text: &str) -> Result<XmlElement, AcquireError> {
    let decoded = decode_entities(text);
    match parse_document(&decoded) {
        Ok(root) => Ok(root),
        // Decoding may have broken a document that was only escaped once.
        Err(e) if decoded != text => {
            trace!(error = %e, "Entity-decoded manifest did not parse, using raw text");
            parse_document(text)
        }
        Err(e) => Err(e),
    }
}

fn resolve_dash(root: &XmlElement) -> Result<ManifestDescriptor, AcquireError> {
    let base_url = root
        .find_first("BaseURL")
        .map(|element| element.text.trim().to_string())
        .unwrap_or_default();

    let Some(template) = root.find_first("SegmentTemplate") else {
        if base_url.is_empty() {
            return Err(AcquireError::manifest_parse(
                "manifest has neither SegmentTemplate nor BaseURL",
            ));
        }
        return Ok(ManifestDescriptor::Direct { url: base_url });
    };

    let initialization = required_attr(template, "initialization")?;
    let media_template = required_attr(template, "media")?;
    let start_number = numeric_attr(template, "startNumber", 1u64)?;

    let mut timeline = Vec::new();
    if let Some(segment_timeline) = template.child("SegmentTimeline") {
        for entry in segment_timeline.children_named("S") {
            timeline.push(TimelineEntry {
                duration: numeric_attr(entry, "d", 0u64)?,
                repeat: numeric_attr(entry, "r", 0i64)?,
            });
        }
    }

    Ok(ManifestDescriptor::Segmented(SegmentedManifest {
        base_url,
        initialization,
        media_template,
        start_number,
        timeline,
    }))
}

fn required_attr(element: &XmlElement, name: &str) -> Result<String, AcquireError> {
    element
        .attr(name)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AcquireError::manifest_parse(format!("SegmentTemplate is missing `{name}`"))
        })
}

fn numeric_attr<T>(element: &XmlElement, name: &str, default: T) -> Result<T, AcquireError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match element.attr(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            AcquireError::manifest_parse(format!(
                "invalid `{name}` on <{}>: `{raw}` ({e})",
                element.name
            ))
        }),
    }
}

/// Join a path fragment onto the manifest base URL.
fn resolve_fragment(base_url: &str, fragment: &str) -> String {
    if fragment.starts_with("http") {
        return fragment.to_string();
    }
    if !base_url.is_empty() && !base_url.ends_with('/') && !fragment.starts_with('/') {
        return format!("{base_url}/{fragment}");
    }
    format!("{base_url}{fragment}")
}

/// Expand a descriptor into its ordered segment URLs.
///
/// Segmented descriptors always yield the initialization URL first, followed
/// by `1 + repeat` media URLs per timeline entry numbered from `start_number`.
pub fn build_segment_urls(descriptor: &ManifestDescriptor) -> Result<Vec<String>, AcquireError> {
    let manifest = match descriptor {
        ManifestDescriptor::Direct { url } => return Ok(vec![url.clone()]),
        ManifestDescriptor::Segmented(manifest) => manifest,
    };

    let media_count = manifest.media_segment_count();
    if media_count == 0 {
        return Err(AcquireError::EmptySegmentList);
    }

    if media_count > MAX_MEDIA_SEGMENTS {
        return Err(AcquireError::manifest_parse(format!(
            "timeline expands to {media_count} segments (limit {MAX_MEDIA_SEGMENTS})"
        )));
    }
    let last_number = manifest
        .start_number
        .checked_add(media_count - 1)
        .ok_or_else(|| {
            AcquireError::manifest_parse(format!(
                "segment numbers overflow starting at {}",
                manifest.start_number
            ))
        })?;

    let mut urls = Vec::with_capacity(media_count as usize + 1);
    urls.push(resolve_fragment(&manifest.base_url, &manifest.initialization));
    for number in manifest.start_number..=last_number {
        let media = manifest
            .media_template
            .replace(NUMBER_TOKEN, &number.to_string());
        urls.push(resolve_fragment(&manifest.base_url, &media));
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dash(base: &str, timeline: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet mimeType="audio/mp4">
      <Representation id="FLAC,0" codecs="flac" bandwidth="1000000">
        {base}
        <SegmentTemplate timescale="44100" initialization="init.mp4" media="seg-$Number$.mp4" startNumber="1">
          {timeline}
        </SegmentTemplate>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#
        )
    }

    #[test]
    fn json_urls_takes_first_element() {
        let descriptor = resolve(r#"{"urls":["A","B"]}"#).unwrap();
        assert_eq!(descriptor, ManifestDescriptor::Direct { url: "A".into() });
    }

    #[test]
    fn json_url_field_and_metadata() {
        let descriptor = resolve(
            r#" {"mimeType":"audio/flac","codecs":"flac","encryptionType":"NONE","url":"https://x/y.flac"} "#,
        )
        .unwrap();
        assert_eq!(
            descriptor,
            ManifestDescriptor::Direct {
                url: "https://x/y.flac".into()
            }
        );
    }

    #[test]
    fn json_without_url_falls_through_to_parse_error() {
        let err = resolve(r#"{"urls":[]}"#).unwrap_err();
        assert!(matches!(err, AcquireError::ManifestParse { .. }));
        let err = resolve(r#"{"urls": 5"#).unwrap_err();
        assert!(matches!(err, AcquireError::ManifestParse { .. }));
    }

    #[test]
    fn json_fields_of_the_wrong_type_are_ignored() {
        for text in [
            r#"{"urls":null,"url":"https://x/y.flac"}"#,
            r#"{"url":"https://x/y.flac","urls":"n/a"}"#,
            r#"{"urls":[7],"url":"https://x/y.flac"}"#,
        ] {
            assert_eq!(
                resolve(text).unwrap(),
                ManifestDescriptor::Direct {
                    url: "https://x/y.flac".into()
                },
                "{text}"
            );
        }

        let descriptor = resolve(r#"{"urls":["https://x/a.flac"],"mimeType":5,"encryptionType":[]}"#)
            .unwrap();
        assert_eq!(
            descriptor,
            ManifestDescriptor::Direct {
                url: "https://x/a.flac".into()
            }
        );
    }

    #[test]
    fn dash_with_timeline() {
        let text = dash(
            "<BaseURL>https://cdn/</BaseURL>",
            r#"<SegmentTimeline><S d="10" r="2"/></SegmentTimeline>"#,
        );
        let descriptor = resolve(&text).unwrap();
        let urls = build_segment_urls(&descriptor).unwrap();
        assert_eq!(
            urls,
            [
                "https://cdn/init.mp4",
                "https://cdn/seg-1.mp4",
                "https://cdn/seg-2.mp4",
                "https://cdn/seg-3.mp4",
            ]
        );
    }

    #[test]
    fn dash_without_timeline_yields_single_media_segment() {
        let text = dash("<BaseURL>https://cdn/a</BaseURL>", "");
        let urls = build_segment_urls(&resolve(&text).unwrap()).unwrap();
        assert_eq!(urls, ["https://cdn/a/init.mp4", "https://cdn/a/seg-1.mp4"]);
    }

    #[test]
    fn dash_numbering_honours_start_number_and_multiple_entries() {
        let text = r#"<MPD><SegmentTemplate initialization="/i.mp4" media="/m/$Number$.m4s" startNumber="5"><SegmentTimeline><S d="4"/><S d="2" r="1"/></SegmentTimeline></SegmentTemplate><BaseURL>https://cdn</BaseURL></MPD>"#;
        let descriptor = resolve(text).unwrap();
        let ManifestDescriptor::Segmented(manifest) = &descriptor else {
            panic!("expected segmented manifest");
        };
        assert_eq!(manifest.start_number, 5);
        assert_eq!(
            manifest.timeline,
            [
                TimelineEntry {
                    duration: 4,
                    repeat: 0
                },
                TimelineEntry {
                    duration: 2,
                    repeat: 1
                }
            ]
        );
        assert_eq!(
            build_segment_urls(&descriptor).unwrap(),
            [
                "https://cdn/i.mp4",
                "https://cdn/m/5.m4s",
                "https://cdn/m/6.m4s",
                "https://cdn/m/7.m4s",
            ]
        );
    }

    #[test]
    fn absolute_fragments_are_used_verbatim() {
        let text = r#"<MPD><BaseURL>https://ignored/</BaseURL><SegmentTemplate initialization="https://a/init" media="http://b/$Number$"/></MPD>"#;
        let urls = build_segment_urls(&resolve(text).unwrap()).unwrap();
        assert_eq!(urls, ["https://a/init", "http://b/1"]);
    }

    #[test]
    fn base_url_only_collapses_to_direct() {
        let text = r#"<MPD><Period><BaseURL>https://cdn/track.flac</BaseURL></Period></MPD>"#;
        assert_eq!(
            resolve(text).unwrap(),
            ManifestDescriptor::Direct {
                url: "https://cdn/track.flac".into()
            }
        );
    }

    #[test]
    fn missing_template_attributes_fail() {
        let text = r#"<MPD><BaseURL>https://cdn/</BaseURL><SegmentTemplate media="m-$Number$"/></MPD>"#;
        assert!(matches!(
            resolve(text),
            Err(AcquireError::ManifestParse { .. })
        ));
    }

    #[test]
    fn unusable_documents_fail() {
        for text in ["", "   ", "<MPD/>", "<MPD><Period>", "not a manifest"] {
            assert!(
                matches!(resolve(text), Err(AcquireError::ManifestParse { .. })),
                "{text:?} should not resolve"
            );
        }
    }

    #[test]
    fn invalid_numbers_are_parse_errors() {
        let text = r#"<MPD><SegmentTemplate initialization="i" media="m" startNumber="one"/></MPD>"#;
        assert!(matches!(
            resolve(text),
            Err(AcquireError::ManifestParse { .. })
        ));
    }

    #[test]
    fn entity_encoded_manifest_is_decoded() {
        let text = dash(
            "<BaseURL>https://cdn/</BaseURL>",
            r#"<SegmentTimeline><S d="10" r="1"/></SegmentTimeline>"#,
        )
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
        let urls = build_segment_urls(&resolve(&text).unwrap()).unwrap();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[2], "https://cdn/seg-2.mp4");
    }

    #[test]
    fn singly_escaped_ampersands_survive() {
        let text = r#"<MPD><BaseURL>https://cdn/</BaseURL><SegmentTemplate initialization="init.mp4?a=1&amp;b=2" media="$Number$.mp4?a=1&amp;b=2"/></MPD>"#;
        let urls = build_segment_urls(&resolve(text).unwrap()).unwrap();
        assert_eq!(
            urls,
            ["https://cdn/init.mp4?a=1&b=2", "https://cdn/1.mp4?a=1&b=2"]
        );
    }

    #[test]
    fn template_is_found_anywhere_in_document_order() {
        let text = r#"<MPD><Period><AdaptationSet><SegmentTemplate initialization="first-init" media="first-$Number$"/></AdaptationSet><AdaptationSet><SegmentTemplate initialization="second-init" media="second-$Number$"/></AdaptationSet></Period><BaseURL>https://cdn/</BaseURL></MPD>"#;
        let urls = build_segment_urls(&resolve(text).unwrap()).unwrap();
        assert_eq!(urls, ["https://cdn/first-init", "https://cdn/first-1"]);
    }

    #[test]
    fn negative_repeat_contributes_no_segments() {
        let descriptor = ManifestDescriptor::Segmented(SegmentedManifest {
            base_url: "https://cdn/".into(),
            initialization: "init".into(),
            media_template: "$Number$".into(),
            start_number: 1,
            timeline: vec![TimelineEntry {
                duration: 5,
                repeat: -1,
            }],
        });
        assert!(matches!(
            build_segment_urls(&descriptor),
            Err(AcquireError::EmptySegmentList)
        ));
    }

    #[test]
    fn segment_number_overflow_is_a_parse_error() {
        let text = r#"<MPD><BaseURL>https://cdn/</BaseURL><SegmentTemplate initialization="i" media="m$Number$" startNumber="18446744073709551615"><SegmentTimeline><S d="1" r="1"/></SegmentTimeline></SegmentTemplate></MPD>"#;
        let descriptor = resolve(text).unwrap();
        assert!(matches!(
            build_segment_urls(&descriptor),
            Err(AcquireError::ManifestParse { .. })
        ));

        // The largest number is still usable when nothing follows it.
        let text = text.replace(r#" r="1""#, "");
        let urls = build_segment_urls(&resolve(&text).unwrap()).unwrap();
        assert_eq!(urls[1], "https://cdn/m18446744073709551615");
    }

    #[test]
    fn oversized_timeline_is_rejected() {
        for repeat in [i64::MAX, MAX_MEDIA_SEGMENTS as i64] {
            let text = format!(
                r#"<MPD><BaseURL>https://cdn/</BaseURL><SegmentTemplate initialization="i" media="m$Number$"><SegmentTimeline><S d="1" r="{repeat}"/><S d="1" r="{repeat}"/></SegmentTimeline></SegmentTemplate></MPD>"#
            );
            let err = build_segment_urls(&resolve(&text).unwrap()).unwrap_err();
            assert!(
                matches!(err, AcquireError::ManifestParse { .. }),
                "r={repeat}: {err}"
            );
        }
    }

    proptest! {
        #[test]
        fn segment_count_matches_timeline(
            entries in prop::collection::vec((0u64..100_000, 0i64..20), 1..12),
            start in 0u64..1_000,
        ) {
            let timeline: String = entries
                .iter()
                .map(|(d, r)| format!(r#"<S d="{d}" r="{r}"/>"#))
                .collect();
            let text = format!(
                r#"<MPD><BaseURL>https://cdn/</BaseURL><SegmentTemplate initialization="init.mp4" media="seg-$Number$.mp4" startNumber="{start}"><SegmentTimeline>{timeline}</SegmentTimeline></SegmentTemplate></MPD>"#
            );
            let urls = build_segment_urls(&resolve(&text).unwrap()).unwrap();
            let expected: i64 = 1 + entries.iter().map(|(_, r)| 1 + r).sum::<i64>();
            prop_assert_eq!(urls.len() as i64, expected);
            prop_assert_eq!(&urls[0], "https://cdn/init.mp4");
            let last = format!("https://cdn/seg-{}.mp4", start + expected as u64 - 2);
            prop_assert_eq!(urls.last().unwrap(), &last);
        }
    }
}
