//! Segmented-delivery (MPEG-DASH) manifest parsing.
//!
//! Only the subset the catalogue emits is understood: audio adaptation sets,
//! one `SegmentTemplate` per representation (or inherited from the
//! adaptation set) and an optional `SegmentTimeline`.

use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::debug;

use super::error::ManifestError;
use super::AudioRendition;
use crate::codec::Codec;

#[allow(clippy::expect_used)]
static DEFAULT_NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\sxmlns="[^"]*""#).expect("namespace regex is valid") // Static pattern, safe to panic
});

/// Upper bound on media segments in one representation.
pub const MAX_SEGMENTS: u64 = 100_000;

/// One `S` element of a segment timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Explicit start time; `None` continues from the previous entry's end.
    pub start_time: Option<u64>,
    /// Number of additional repetitions of this entry.
    pub repeat_count: u32,
    pub duration: u64,
}

/// Expands timeline entries into the start time of every segment, in order.
#[must_use]
pub fn expand_timeline(entries: &[TimelineEntry]) -> Vec<u64> {
    let mut starts = Vec::new();
    let mut cursor: u64 = 0;
    for entry in entries {
        if let Some(start) = entry.start_time {
            cursor = start;
        }
        for _ in 0..=entry.repeat_count {
            starts.push(cursor);
            cursor = cursor.saturating_add(entry.duration);
        }
    }
    starts
}

/// Substitutes a segment number into a media URL template.
///
/// Handles `$Number$`, the zero-padded `$Number%0Nd$` form and the `$$` escape.
#[must_use]
pub fn substitute_number(template: &str, number: u64) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;
    while let Some(open) = rest.find('$') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('$') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let identifier = &after[..close];
        match identifier {
            "" => out.push('$'),
            "Number" => out.push_str(&number.to_string()),
            _ => match identifier
                .strip_prefix("Number%0")
                .and_then(|spec| spec.strip_suffix('d'))
                .and_then(|width| width.parse::<usize>().ok())
            {
                Some(width) => out.push_str(&format!("{number:0width$}")),
                None => {
                    out.push('$');
                    out.push_str(identifier);
                    out.push('$');
                }
            },
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Normalises a DASH `codecs` attribute into a [`Codec`].
pub fn normalize_codec(raw: &str) -> Result<Codec, ManifestError> {
    let upper = raw.trim().to_ascii_uppercase();
    let name = if upper.starts_with("MP4A") {
        "AAC"
    } else {
        upper.as_str()
    };
    Codec::from_normalized(name).ok_or_else(|| ManifestError::UnsupportedCodec {
        codec: name.to_string(),
    })
}

/// Parses a segmented manifest document into renditions, in document order.
///
/// # Errors
///
/// Returns [`ManifestError`] when the document is not well-formed XML, has no
/// audio adaptation set, or contains a non-audio adaptation set.
pub fn parse(document: &[u8]) -> Result<Vec<AudioRendition>, ManifestError> {
    let text = std::str::from_utf8(document)
        .map_err(|_| ManifestError::malformed("document is not valid UTF-8"))?;
    let stripped = DEFAULT_NAMESPACE.replace(text, "");
    let root = read_tree(&stripped)?;
    if root.name != "MPD" {
        return Err(ManifestError::malformed(format!(
            "root element is <{}>, expected <MPD>",
            root.name
        )));
    }

    let mut renditions = Vec::new();
    for period in root.children_named("Period") {
        for adaptation_set in period.children_named("AdaptationSet") {
            ensure_audio(adaptation_set)?;
            for representation in adaptation_set.children_named("Representation") {
                renditions.push(build_rendition(adaptation_set, representation)?);
            }
        }
    }

    if renditions.is_empty() {
        return Err(ManifestError::NoAudio);
    }
    debug!(renditions = renditions.len(), "parsed segmented manifest");
    Ok(renditions)
}

fn ensure_audio(adaptation_set: &Element) -> Result<(), ManifestError> {
    let content_type = adaptation_set.attr("contentType");
    let is_audio = match content_type {
        Some(kind) => kind == "audio",
        None => adaptation_set
            .attr("mimeType")
            .is_some_and(|mime| mime.starts_with("audio/")),
    };
    if is_audio {
        Ok(())
    } else {
        Err(ManifestError::NonAudio {
            content_type: content_type.unwrap_or("unspecified").to_string(),
        })
    }
}

fn build_rendition(
    adaptation_set: &Element,
    representation: &Element,
) -> Result<AudioRendition, ManifestError> {
    let raw_codec = representation
        .attr("codecs")
        .or_else(|| adaptation_set.attr("codecs"))
        .ok_or_else(|| ManifestError::malformed("Representation has no codecs attribute"))?;
    let codec = normalize_codec(raw_codec)?;

    let sample_rate_hz = representation
        .attr("audioSamplingRate")
        .or_else(|| adaptation_set.attr("audioSamplingRate"))
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let bitrate_bps = representation
        .attr("bandwidth")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let template = representation
        .child("SegmentTemplate")
        .or_else(|| adaptation_set.child("SegmentTemplate"))
        .ok_or_else(|| ManifestError::malformed("Representation has no SegmentTemplate"))?;
    let initialization = template
        .attr("initialization")
        .ok_or_else(|| ManifestError::malformed("SegmentTemplate has no initialization URL"))?;

    let mut segment_urls = vec![initialization.to_string()];
    let mut duration_secs = None;

    if let Some(timeline) = template.child("SegmentTimeline") {
        let media = template
            .attr("media")
            .ok_or_else(|| ManifestError::malformed("SegmentTemplate has no media URL template"))?;
        let start_number = parse_u64_attr(template, "startNumber")?.unwrap_or(1);
        let timescale = parse_u64_attr(template, "timescale")?.unwrap_or(1).max(1);

        let entries = timeline
            .children_named("S")
            .map(timeline_entry)
            .collect::<Result<Vec<_>, _>>()?;
        let count = segment_count(&entries)?;
        if count > 0 && start_number.checked_add(count - 1).is_none() {
            return Err(ManifestError::malformed(format!(
                "segment numbers starting at {start_number} overflow"
            )));
        }
        let starts = expand_timeline(&entries);
        debug_assert_eq!(starts.len() as u64, count);

        segment_urls.extend((0..count).map(|offset| substitute_number(media, start_number + offset)));

        let total_ticks: u64 = entries
            .iter()
            .map(|entry| entry.duration.saturating_mul(u64::from(entry.repeat_count) + 1))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let seconds = total_ticks as f64 / timescale as f64;
        duration_secs = Some(seconds);
    }

    Ok(AudioRendition {
        codec,
        sample_rate_hz,
        bitrate_bps,
        segment_urls,
        duration_secs,
    })
}

/// Total segments the timeline expands to, bounded by [`MAX_SEGMENTS`].
fn segment_count(entries: &[TimelineEntry]) -> Result<u64, ManifestError> {
    let mut total: u64 = 0;
    for entry in entries {
        total = total.saturating_add(u64::from(entry.repeat_count) + 1);
        if total > MAX_SEGMENTS {
            return Err(ManifestError::malformed(format!(
                "timeline expands to more than {MAX_SEGMENTS} segments"
            )));
        }
    }
    Ok(total)
}

fn timeline_entry(element: &Element) -> Result<TimelineEntry, ManifestError> {
    let duration = parse_u64_attr(element, "d")?
        .ok_or_else(|| ManifestError::malformed("timeline entry has no duration"))?;
    let repeat_count = match element.attr("r") {
        None => 0,
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| ManifestError::malformed(format!("invalid repeat count '{raw}'")))?;
            if value < 0 {
                return Err(ManifestError::malformed(
                    "open-ended timeline repeat is not supported",
                ));
            }
            u32::try_from(value)
                .map_err(|_| ManifestError::malformed(format!("repeat count {value} too large")))?
        }
    };
    Ok(TimelineEntry {
        start_time: parse_u64_attr(element, "t")?,
        repeat_count,
        duration,
    })
}

fn parse_u64_attr(element: &Element, name: &str) -> Result<Option<u64>, ManifestError> {
    element
        .attr(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| {
                ManifestError::malformed(format!(
                    "invalid {name} '{raw}' on <{}>",
                    element.name
                ))
            })
        })
        .transpose()
}

// ==================== Minimal element tree ====================

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }
}

fn read_tree(xml: &str) -> Result<Element, ManifestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(ManifestError::xml)? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ManifestError::malformed("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ManifestError::malformed("document ended inside an element"));
    }
    root.ok_or_else(|| ManifestError::malformed("document has no root element"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ManifestError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(ManifestError::malformed("document has more than one root element"))
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, ManifestError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| ManifestError::xml(err.into()))?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(ManifestError::xml)?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}
