//! Quick-XML based XMLTV parser
//!
//! Streams an XMLTV document and produces the `<channel>` catalog plus
//! canonical [`Programme`] values. Programmes with an unparseable start time
//! are skipped with a warning rather than failing the whole document.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::models::{
    Audio, Credit, EpisodeNumber, Icon, LangText, Logo, PreviouslyShown, Programme, Rating, Subtitle, Video,
};

/// A `<channel>` element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvChannel {
    pub id: String,
    pub display_names: Vec<String>,
    pub icons: Vec<Logo>,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct XmltvDocument {
    pub channels: Vec<XmltvChannel>,
    pub programmes: Vec<Programme>,
}

type Attributes = HashMap<String, String>;

/// Parse XMLTV time formats: "20240101120000 +0000", with or without offset
pub fn parse_xmltv_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y%m%d%H%M%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    let digits = value.split_whitespace().next().unwrap_or(value);
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse XMLTV content using the streaming quick-xml reader
pub fn parse_xmltv_document(content: &str) -> AppResult<XmltvDocument> {
    let mut reader = Reader::from_str(content);

    let mut document = XmltvDocument::default();
    let mut state = ParseState::default();
    let mut stack: Vec<(String, Attributes)> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e)?;
                let attrs = parse_attributes(e);
                state.open(&name, &attrs);
                stack.push((name, attrs));
                text.clear();
            }

            Ok(Event::Empty(ref e)) => {
                let name = element_name(e)?;
                let attrs = parse_attributes(e);
                state.open(&name, &attrs);
                state.close(&name, &attrs, "", stack.last(), &mut document);
                text.clear();
            }

            Ok(Event::End(_)) => {
                if let Some((name, attrs)) = stack.pop() {
                    state.close(&name, &attrs, text.trim(), stack.last(), &mut document);
                }
                text.clear();
            }

            Ok(Event::Text(e)) => {
                let raw = std::str::from_utf8(&e)
                    .map_err(|e| AppError::source_error(format!("Invalid UTF-8 in text: {e}")))?;
                text.push_str(raw);
            }

            Ok(Event::CData(e)) => {
                let raw = std::str::from_utf8(&e)
                    .map_err(|e| AppError::source_error(format!("Invalid UTF-8 in CDATA: {e}")))?;
                text.push_str(raw);
            }

            Ok(Event::GeneralRef(e)) => {
                let name = std::str::from_utf8(&e)
                    .map_err(|e| AppError::source_error(format!("Invalid UTF-8 in entity: {e}")))?;
                match resolve_entity(name) {
                    Some(c) => text.push(c),
                    None => {
                        text.push('&');
                        text.push_str(name);
                        text.push(';');
                    }
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(AppError::source_error(format!("XML parsing error: {e}")));
            }

            _ => {}
        }
    }

    if state.skipped > 0 {
        warn!("Skipped {} programmes with unparseable start times", state.skipped);
    }
    debug!(
        "Parsed XMLTV document: {} channels, {} programmes",
        document.channels.len(),
        document.programmes.len()
    );

    Ok(document)
}

#[derive(Default)]
struct ParseState {
    channel: Option<XmltvChannel>,
    programme: Option<Programme>,
    skipped: usize,
}

impl ParseState {
    fn open(&mut self, name: &str, attrs: &Attributes) {
        match name {
            "channel" if self.programme.is_none() => {
                self.channel = Some(XmltvChannel {
                    id: attrs.get("id").cloned().unwrap_or_default(),
                    ..Default::default()
                });
            }
            "programme" => {
                let channel = attrs.get("channel").cloned().unwrap_or_default();
                let start = attrs.get("start").and_then(|s| parse_xmltv_time(s));
                match start {
                    Some(start) => {
                        let mut programme = Programme::new(channel, String::new(), start);
                        programme.stop = attrs.get("stop").and_then(|s| parse_xmltv_time(s));
                        self.programme = Some(programme);
                    }
                    None => {
                        self.skipped += 1;
                        self.programme = None;
                    }
                }
            }
            "video" => {
                if let Some(p) = self.programme.as_mut() {
                    p.video = Some(Video {
                        present: true,
                        ..Default::default()
                    });
                }
            }
            "audio" => {
                if let Some(p) = self.programme.as_mut() {
                    p.audio = Some(Audio {
                        present: true,
                        ..Default::default()
                    });
                }
            }
            _ => {}
        }
    }

    fn close(
        &mut self,
        name: &str,
        attrs: &Attributes,
        text: &str,
        parent: Option<&(String, Attributes)>,
        document: &mut XmltvDocument,
    ) {
        let parent_name = parent.map(|(n, _)| n.as_str()).unwrap_or_default();

        if let Some(programme) = self.programme.as_mut() {
            let lang = attrs.get("lang").cloned();
            match name {
                "title" => programme.titles.push(LangText::with_lang(text, lang)),
                "sub-title" => programme.secondary_titles.push(LangText::with_lang(text, lang)),
                "desc" => programme.descriptions.push(LangText::with_lang(text, lang)),
                "director" | "actor" | "writer" | "producer" | "presenter" | "guest" => {
                    let credit = Credit {
                        name: text.to_string(),
                        role: attrs.get("role").cloned().unwrap_or_default(),
                        character: None,
                    };
                    let bucket = match name {
                        "director" => &mut programme.credits.directors,
                        "actor" => &mut programme.credits.actors,
                        "writer" => &mut programme.credits.writers,
                        "producer" => &mut programme.credits.producers,
                        "presenter" => &mut programme.credits.presenters,
                        _ => &mut programme.credits.guests,
                    };
                    bucket.push(credit);
                }
                "date" if parent_name == "programme" => programme.date = Some(text.to_string()),
                "category" => programme.categories.push(LangText::with_lang(text, lang)),
                "keyword" => programme.keywords.push(LangText::with_lang(text, lang)),
                "language" => programme.languages.push(LangText::with_lang(text, lang)),
                "icon" if parent_name == "programme" => {
                    if let Some(src) = attrs.get("src") {
                        programme.icons.push(Icon {
                            src: src.clone(),
                            width: attrs.get("width").and_then(|w| w.parse().ok()),
                            height: attrs.get("height").and_then(|h| h.parse().ok()),
                        });
                    }
                }
                "episode-num" => programme.episode_numbers.push(EpisodeNumber {
                    system: attrs.get("system").cloned().unwrap_or_else(|| "onscreen".to_string()),
                    value: text.to_string(),
                }),
                "present" => {
                    let present = text.eq_ignore_ascii_case("yes");
                    match parent_name {
                        "video" => {
                            if let Some(v) = programme.video.as_mut() {
                                v.present = present;
                            }
                        }
                        "audio" => {
                            if let Some(a) = programme.audio.as_mut() {
                                a.present = present;
                            }
                        }
                        _ => {}
                    }
                }
                "colour" => {
                    if let Some(v) = programme.video.as_mut() {
                        v.colour = Some(text.eq_ignore_ascii_case("yes"));
                    }
                }
                "aspect" => {
                    if let Some(v) = programme.video.as_mut() {
                        v.aspect = Some(text.to_string());
                    }
                }
                "quality" => {
                    if let Some(v) = programme.video.as_mut() {
                        v.quality = Some(text.to_string());
                    }
                }
                "stereo" => {
                    if let Some(a) = programme.audio.as_mut() {
                        a.stereo = Some(text.to_string());
                    }
                }
                "previously-shown" => {
                    programme.previously_shown = Some(PreviouslyShown {
                        start: attrs.get("start").cloned(),
                        channel: attrs.get("channel").cloned(),
                    });
                }
                "premiere" => programme.premiere = Some(LangText::with_lang(text, lang)),
                "last-chance" => programme.last_chance = Some(LangText::with_lang(text, lang)),
                "new" => programme.new = true,
                "subtitles" => programme.subtitles.push(Subtitle {
                    kind: attrs.get("type").cloned().unwrap_or_else(|| "onscreen".to_string()),
                }),
                "value" => {
                    let system = parent.and_then(|(_, a)| a.get("system").cloned());
                    let rating = Rating {
                        value: text.to_string(),
                        system,
                    };
                    match parent_name {
                        "rating" => programme.ratings.push(rating),
                        "star-rating" => programme.star_ratings.push(rating),
                        _ => {}
                    }
                }
                "programme" => {
                    if let Some(mut finished) = self.programme.take() {
                        if finished.new {
                            finished.previously_shown = None;
                        }
                        finished.id = programme_id(&finished);
                        document.programmes.push(finished);
                    }
                }
                _ => {}
            }
            return;
        }

        if let Some(channel) = self.channel.as_mut() {
            match name {
                "display-name" if !text.is_empty() => channel.display_names.push(text.to_string()),
                "icon" => {
                    if let Some(src) = attrs.get("src") {
                        channel.icons.push(Logo {
                            url: src.clone(),
                            width: attrs.get("width").and_then(|w| w.parse().ok()).unwrap_or_default(),
                            height: attrs.get("height").and_then(|h| h.parse().ok()).unwrap_or_default(),
                        });
                    }
                }
                "url" if !text.is_empty() => channel.urls.push(text.to_string()),
                "channel" => {
                    if let Some(finished) = self.channel.take() {
                        document.channels.push(finished);
                    }
                }
                _ => {}
            }
        }
    }
}

/// XMLTV has no programme identifier; prefer a provider id, else channel + start
fn programme_id(programme: &Programme) -> String {
    programme
        .episode_number("dd_progid")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", programme.channel, programme.start.format("%Y%m%d%H%M%S")))
}

fn element_name(element: &BytesStart) -> AppResult<String> {
    std::str::from_utf8(element.name().as_ref())
        .map(str::to_string)
        .map_err(|e| AppError::source_error(format!("Invalid UTF-8 in XML element name: {e}")))
}

/// Parse XML attributes into a HashMap
fn parse_attributes(element: &BytesStart) -> Attributes {
    let mut attrs = HashMap::new();

    for attr in element.attributes().flatten() {
        if let Ok(key) = std::str::from_utf8(attr.key.as_ref()) {
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attrs.insert(key.to_string(), value);
        }
    }
    attrs
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="bbc1.uk">
    <display-name>BBC One</display-name>
    <display-name>101</display-name>
    <icon src="http://img/bbc1.png" width="100" height="50"/>
  </channel>
  <channel id="itv.uk">
    <display-name>ITV</display-name>
  </channel>
  <programme start="20240101120000 +0000" stop="20240101130000 +0000" channel="bbc1.uk">
    <title lang="en">News &amp; Weather</title>
    <sub-title>Lunchtime</sub-title>
    <desc lang="en">The latest headlines.</desc>
    <credits>
      <presenter>Jane Doe</presenter>
      <actor role="Herself">Ann Other</actor>
    </credits>
    <category lang="en">News</category>
    <episode-num system="xmltv_ns">0.4.</episode-num>
    <video><aspect>16:9</aspect><quality>HDTV</quality></video>
    <previously-shown start="20231231120000 +0000"/>
    <new/>
    <subtitles type="teletext"/>
    <rating system="VCHIP"><value>TV-PG</value></rating>
    <star-rating><value>3/4</value></star-rating>
  </programme>
  <programme start="garbage" channel="itv.uk">
    <title>Broken</title>
  </programme>
  <programme start="20240101140000" channel="itv.uk">
    <title>Quiz</title>
  </programme>
</tv>"#;

    #[test]
    fn test_parses_channels() {
        let doc = parse_xmltv_document(SAMPLE).unwrap();
        assert_eq!(doc.channels.len(), 2);
        assert_eq!(doc.channels[0].id, "bbc1.uk");
        assert_eq!(doc.channels[0].display_names, vec!["BBC One", "101"]);
        assert_eq!(doc.channels[0].icons[0].width, 100);
    }

    #[test]
    fn test_parses_programme_fields() {
        let doc = parse_xmltv_document(SAMPLE).unwrap();
        assert_eq!(doc.programmes.len(), 2);

        let news = &doc.programmes[0];
        assert_eq!(news.title(), Some("News & Weather"));
        assert_eq!(news.titles[0].lang.as_deref(), Some("en"));
        assert_eq!(news.secondary_titles[0].value, "Lunchtime");
        assert_eq!(news.credits.presenters[0].name, "Jane Doe");
        assert_eq!(news.credits.actors[0].role, "Herself");
        assert_eq!(news.episode_number("xmltv_ns"), Some("0.4."));
        assert_eq!(news.video.as_ref().unwrap().quality.as_deref(), Some("HDTV"));
        assert!(news.new);
        assert!(news.previously_shown.is_none());
        assert_eq!(news.ratings[0].system.as_deref(), Some("VCHIP"));
        assert_eq!(news.star_ratings[0].value, "3/4");
        assert_eq!(news.stop.unwrap() - news.start, chrono::Duration::hours(1));
    }

    #[test]
    fn test_time_without_offset_is_utc() {
        let t = parse_xmltv_time("20240101140000").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-01T14:00:00+00:00");
        assert!(parse_xmltv_time("2024").is_none());
    }

    #[test]
    fn test_programme_id_falls_back_to_channel_and_start() {
        let doc = parse_xmltv_document(SAMPLE).unwrap();
        assert_eq!(doc.programmes[1].id, "itv.uk-20240101140000");
    }
}
