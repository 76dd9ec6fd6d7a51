use std::io::Write;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::codec::FeedCodec;
use crate::error::{AppcastError, Result};
use crate::feed::{Feed, FeedItem};
use crate::trust::Algorithm;

/// Namespace of the release attributes (`sparkle:version`, `sparkle:os`, ...).
pub const SPARKLE_NAMESPACE: &str = "http://www.andymatuschak.org/xml-namespaces/sparkle";
const DUBLIN_CORE_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// Feeds as RSS 2.0 documents with one `enclosure` per item.
#[derive(Debug, Clone)]
pub struct XmlFeedCodec {
    human_readable: bool,
}

impl XmlFeedCodec {
    /// Indented output by default.
    pub fn new() -> Self {
        Self {
            human_readable: true,
        }
    }

    /// Toggle indentation in serialized output.
    pub fn human_readable(mut self, enabled: bool) -> Self {
        self.human_readable = enabled;
        self
    }
}

impl Default for XmlFeedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedCodec for XmlFeedCodec {
    fn extension(&self) -> &'static str {
        "xml"
    }

    fn deserialize(&self, text: &str, should_sort: bool) -> Feed {
        let mut feed = match parse_document(text) {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!("ignoring malformed xml feed: {err}");
                return Feed::default();
            }
        };
        if should_sort {
            feed.sort_descending();
        }
        feed
    }

    fn serialize(&self, feed: &Feed) -> Result<String> {
        let buffer = if self.human_readable {
            write_document(Writer::new_with_indent(Vec::new(), b' ', 4), feed)?
        } else {
            write_document(Writer::new(Vec::new()), feed)?
        };
        String::from_utf8(buffer).map_err(AppcastError::xml)
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn parse_document(text: &str) -> Result<Feed> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut feed = Feed::default();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event().map_err(AppcastError::xml)? {
            Event::Start(start) => {
                let name = local_name(&start);
                if name == "item" && current.is_none() {
                    current = Some(FeedItem::new("", "", ""));
                } else if name == "enclosure" {
                    if let Some(item) = current.as_mut() {
                        apply_enclosure(item, &start);
                    }
                }
                path.push(name);
                text_buf.clear();
            }
            Event::Empty(start) => {
                let name = local_name(&start);
                let in_item = path.last().map(String::as_str) == Some("item");
                if let (true, Some(item)) = (in_item, current.as_mut()) {
                    if name == "enclosure" {
                        apply_enclosure(item, &start);
                    } else {
                        apply_item_field(item, &name, String::new());
                    }
                }
            }
            Event::Text(text) => text_buf.push_str(&text.unescape().map_err(AppcastError::xml)?),
            Event::CData(data) => text_buf.push_str(&String::from_utf8_lossy(&data)),
            Event::End(_) => {
                let name = path.pop().unwrap_or_default();
                let value = text_buf.trim().to_string();
                text_buf.clear();
                match (path.last().map(String::as_str), current.as_mut()) {
                    (Some("item"), Some(item)) => apply_item_field(item, &name, value),
                    (Some("channel"), _) if name == "item" => {
                        if let Some(item) = current.take() {
                            feed.items.push(item);
                        }
                    }
                    (Some("channel"), None) => apply_channel_field(&mut feed, &name, value),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(feed)
}

fn apply_channel_field(feed: &mut Feed, name: &str, value: String) {
    match name {
        "title" => feed.title = non_empty(value),
        "link" => feed.link = non_empty(value),
        "description" => feed.description = non_empty(value),
        "language" => feed.language = non_empty(value),
        _ => {}
    }
}

fn apply_item_field(item: &mut FeedItem, name: &str, value: String) {
    match name {
        "title" => item.title = value,
        "description" => item.description = non_empty(value),
        "pubDate" => item.publication_date = parse_date(&value),
        "releaseNotesLink" => item.release_notes_link = non_empty(value),
        "channel" => item.channel = non_empty(value),
        "criticalUpdate" => item.is_critical = true,
        "version" if item.version.is_empty() => item.version = value,
        "shortVersionString" => item.short_version = non_empty(value),
        _ => {}
    }
}

fn apply_enclosure(item: &mut FeedItem, start: &BytesStart<'_>) {
    for attribute in start.attributes().flatten() {
        let value = match attribute.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(err) => {
                tracing::debug!("skipping undecodable enclosure attribute: {err}");
                continue;
            }
        };
        match attribute.key.local_name().as_ref() {
            b"url" => item.download_link = value,
            b"version" => item.version = value,
            b"shortVersionString" => item.short_version = non_empty(value),
            b"os" => item.operating_system = value,
            b"length" => item.length = value.trim().parse().unwrap_or(0),
            b"type" => item.mime_type = value,
            b"signature" => item.signature = non_empty(value),
            b"edSignature" => item.signature = tagged_signature(Algorithm::Ed25519, value),
            b"dsaSignature" => item.signature = tagged_signature(Algorithm::Dsa, value),
            b"criticalUpdate" => item.is_critical = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Signatures from algorithm-specific attributes are untagged; record the
/// algorithm the attribute implies.
fn tagged_signature(algorithm: Algorithm, value: String) -> Option<String> {
    let value = non_empty(value)?;
    if value.contains(':') {
        Some(value)
    } else {
        Some(format!("{algorithm}:{}", value.trim()))
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|date| date.with_timezone(&Utc))
        .map_err(|err| tracing::debug!(value, "unparseable publication date: {err}"))
        .ok()
}

fn write_document<W: Write>(mut writer: Writer<W>, feed: &Feed) -> Result<W> {
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(AppcastError::xml)?;

    let rss = BytesStart::new("rss").with_attributes([
        ("version", "2.0"),
        ("xmlns:sparkle", SPARKLE_NAMESPACE),
        ("xmlns:dc", DUBLIN_CORE_NAMESPACE),
    ]);
    start(&mut writer, rss)?;
    start(&mut writer, BytesStart::new("channel"))?;

    optional_element(&mut writer, "title", feed.title.as_deref())?;
    optional_element(&mut writer, "link", feed.link.as_deref())?;
    optional_element(&mut writer, "description", feed.description.as_deref())?;
    optional_element(&mut writer, "language", feed.language.as_deref())?;

    for item in &feed.items {
        write_item(&mut writer, item)?;
    }

    end(&mut writer, "channel")?;
    end(&mut writer, "rss")?;
    Ok(writer.into_inner())
}

fn write_item<W: Write>(writer: &mut Writer<W>, item: &FeedItem) -> Result<()> {
    start(writer, BytesStart::new("item"))?;
    text_element(writer, "title", &item.title)?;
    optional_element(writer, "sparkle:releaseNotesLink", item.release_notes_link.as_deref())?;
    optional_element(writer, "description", item.description.as_deref())?;
    let published = item.publication_date.map(|date| date.to_rfc2822());
    optional_element(writer, "pubDate", published.as_deref())?;
    optional_element(writer, "sparkle:channel", item.channel.as_deref())?;

    let length = item.length.to_string();
    let mut enclosure = BytesStart::new("enclosure");
    enclosure.push_attribute(("url", item.download_link.as_str()));
    enclosure.push_attribute(("sparkle:version", item.version.as_str()));
    if let Some(short_version) = &item.short_version {
        enclosure.push_attribute(("sparkle:shortVersionString", short_version.as_str()));
    }
    enclosure.push_attribute(("sparkle:os", item.operating_system.as_str()));
    enclosure.push_attribute(("length", length.as_str()));
    enclosure.push_attribute(("type", item.mime_type.as_str()));
    if let Some(signature) = &item.signature {
        enclosure.push_attribute(("sparkle:signature", signature.as_str()));
    }
    if item.is_critical {
        enclosure.push_attribute(("sparkle:criticalUpdate", "true"));
    }
    writer
        .write_event(Event::Empty(enclosure))
        .map_err(AppcastError::xml)?;

    end(writer, "item")
}

fn start<W: Write>(writer: &mut Writer<W>, element: BytesStart<'_>) -> Result<()> {
    writer
        .write_event(Event::Start(element))
        .map_err(AppcastError::xml)
}

fn end<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(AppcastError::xml)
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    start(writer, BytesStart::new(name))?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(AppcastError::xml)?;
    end(writer, name)
}

fn optional_element<W: Write>(writer: &mut Writer<W>, name: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => text_element(writer, name, value),
        None => Ok(()),
    }
}
