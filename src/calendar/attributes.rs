//! Free-text description → [`AttributeBag`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::event::{Link, LinkKind};

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s+[^>]*?href=["']([^"']+)["'][^>]*>[^<]*</a>"#).expect("anchor regex")
});
static BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("break regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^:=\-]+)[:=\-]\s*(.+)").expect("key-value regex"));

/// Canonical attribute keys after synonym folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKey {
    Bar,
    Cover,
    Tea,
    Website,
    Instagram,
    Facebook,
    Gmaps,
    EventType,
    ShortName,
    Other(String),
}

impl AttributeKey {
    /// Case-insensitive lookup through the synonym table.
    pub fn canonicalize(raw: &str) -> Self {
        let key = raw.trim().to_lowercase();
        match key.as_str() {
            "bar" | "location" | "host" => Self::Bar,
            "cover" | "cost" | "price" => Self::Cover,
            "tea" | "info" | "description" => Self::Tea,
            "website" => Self::Website,
            "instagram" => Self::Instagram,
            "facebook" => Self::Facebook,
            "gmaps" | "google maps" => Self::Gmaps,
            "type" | "eventtype" | "event type" => Self::EventType,
            "shortname" | "short name" | "shorttitle" | "short title" | "nickname" => {
                Self::ShortName
            }
            _ => Self::Other(key),
        }
    }

    pub fn expects_url(&self) -> bool {
        matches!(
            self,
            Self::Website | Self::Instagram | Self::Facebook | Self::Gmaps
        )
    }
}

/// Normalized attributes from a description. Every field is optional, so the
/// same type doubles as a sparse per-date override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeBag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tea: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gmaps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl AttributeBag {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn set(&mut self, key: AttributeKey, value: String) {
        let slot = match key {
            AttributeKey::Bar => &mut self.bar,
            AttributeKey::Cover => &mut self.cover,
            AttributeKey::Tea => &mut self.tea,
            AttributeKey::Website => &mut self.website,
            AttributeKey::Instagram => &mut self.instagram,
            AttributeKey::Facebook => &mut self.facebook,
            AttributeKey::Gmaps => &mut self.gmaps,
            AttributeKey::EventType => &mut self.event_type,
            AttributeKey::ShortName => &mut self.short_name,
            AttributeKey::Other(name) => {
                self.extra.insert(name, value);
                return;
            }
        };
        *slot = Some(value);
    }

    pub fn get(&self, key: &AttributeKey) -> Option<&str> {
        match key {
            AttributeKey::Bar => self.bar.as_deref(),
            AttributeKey::Cover => self.cover.as_deref(),
            AttributeKey::Tea => self.tea.as_deref(),
            AttributeKey::Website => self.website.as_deref(),
            AttributeKey::Instagram => self.instagram.as_deref(),
            AttributeKey::Facebook => self.facebook.as_deref(),
            AttributeKey::Gmaps => self.gmaps.as_deref(),
            AttributeKey::EventType => self.event_type.as_deref(),
            AttributeKey::ShortName => self.short_name.as_deref(),
            AttributeKey::Other(name) => self.extra.get(name).map(String::as_str),
        }
    }

    /// Shallow merge: each key present in `overrides` replaces ours whole.
    pub fn overlay(&self, overrides: &AttributeBag) -> AttributeBag {
        let pick = |ours: &Option<String>, theirs: &Option<String>| {
            theirs.clone().or_else(|| ours.clone())
        };
        let mut extra = self.extra.clone();
        extra.extend(overrides.extra.clone());
        AttributeBag {
            bar: pick(&self.bar, &overrides.bar),
            cover: pick(&self.cover, &overrides.cover),
            tea: pick(&self.tea, &overrides.tea),
            website: pick(&self.website, &overrides.website),
            instagram: pick(&self.instagram, &overrides.instagram),
            facebook: pick(&self.facebook, &overrides.facebook),
            gmaps: pick(&self.gmaps, &overrides.gmaps),
            event_type: pick(&self.event_type, &overrides.event_type),
            short_name: pick(&self.short_name, &overrides.short_name),
            extra,
        }
    }

    /// Present URL attributes, always in website, instagram, facebook, gmaps order.
    pub fn links(&self) -> Vec<Link> {
        [
            (LinkKind::Website, &self.website),
            (LinkKind::Instagram, &self.instagram),
            (LinkKind::Facebook, &self.facebook),
            (LinkKind::Gmaps, &self.gmaps),
        ]
        .into_iter()
        .filter_map(|(kind, url)| url.as_ref().map(|url| Link::new(kind, url.clone())))
        .collect()
    }
}

/// Markup-stripping capability used when a description carries HTML.
pub trait MarkupStripper: Send + Sync {
    fn strip(&self, markup: &str) -> String;
}

/// Drops tags and decodes the handful of entities calendar exports produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexMarkupStripper;

impl MarkupStripper for RegexMarkupStripper {
    fn strip(&self, markup: &str) -> String {
        TAG.replace_all(markup, "")
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// `None` when no key/value pair was found at all.
    pub attributes: Option<AttributeBag>,
    pub rejected_urls: usize,
}

fn contains_markup(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("<a ") || lower.contains("<br")
}

pub fn extract_attributes(description: &str, stripper: &dyn MarkupStripper) -> Extracted {
    let mut text = description.replace('\r', "");

    if contains_markup(&text) {
        text = ANCHOR.replace_all(&text, "$1").into_owned();
        text = BREAK.replace_all(&text, "\n").into_owned();
        text = stripper.strip(&text);
    }
    let text = text.replace("\\n", "\n");

    let mut bag = AttributeBag::default();
    let mut found = false;
    let mut rejected_urls = 0;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(caps) = KEY_VALUE.captures(line) else {
            continue;
        };
        let key = AttributeKey::canonicalize(&caps[1]);
        let value = caps[2].trim().to_string();

        if key.expects_url() && !(value.starts_with("http://") || value.starts_with("https://")) {
            tracing::warn!("Invalid URL format for {key:?}: {value}");
            rejected_urls += 1;
            continue;
        }
        tracing::debug!("Extracted {key:?}: {value}");
        bag.set(key, value);
        found = true;
    }

    Extracted {
        attributes: found.then_some(bag),
        rejected_urls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(text: &str) -> Extracted {
        extract_attributes(text, &RegexMarkupStripper)
    }

    #[test]
    fn synonyms_are_canonicalized() {
        let bag = extract("Location: The Eagle\nPrice: $10\nInfo: Wear leather\nGoogle Maps: https://maps.app/x")
            .attributes
            .unwrap();
        assert_eq!(bag.bar.as_deref(), Some("The Eagle"));
        assert_eq!(bag.cover.as_deref(), Some("$10"));
        assert_eq!(bag.tea.as_deref(), Some("Wear leather"));
        assert_eq!(bag.gmaps.as_deref(), Some("https://maps.app/x"));
    }

    #[test]
    fn separators_colon_equals_and_dash() {
        let bag = extract("Bar = Eagle\nCover - $5\nShort Name: GOLDI").attributes.unwrap();
        assert_eq!(bag.bar.as_deref(), Some("Eagle"));
        assert_eq!(bag.cover.as_deref(), Some("$5"));
        assert_eq!(bag.short_name.as_deref(), Some("GOLDI"));
    }

    #[test]
    fn value_keeps_everything_after_first_separator() {
        let bag = extract("Website: https://example.com/a-b?c=d").attributes.unwrap();
        assert_eq!(bag.website.as_deref(), Some("https://example.com/a-b?c=d"));
    }

    #[test]
    fn unknown_keys_pass_through_lowercased() {
        let bag = extract("DJ: Bearbie\nRecurring: yes").attributes.unwrap();
        assert_eq!(bag.extra.get("dj").map(String::as_str), Some("Bearbie"));
        assert_eq!(bag.extra.get("recurring").map(String::as_str), Some("yes"));
    }

    #[test]
    fn non_url_values_for_url_keys_are_dropped() {
        let extracted = extract("Instagram: @goldiloxx\nBar: Pony");
        let bag = extracted.attributes.unwrap();
        assert_eq!(bag.instagram, None);
        assert_eq!(bag.bar.as_deref(), Some("Pony"));
        assert_eq!(extracted.rejected_urls, 1);
    }

    #[test]
    fn nothing_found_is_an_explicit_empty_signal() {
        assert_eq!(extract("just a sentence with no pairs").attributes, None);
        assert_eq!(extract("").attributes, None);
        assert_eq!(extract("Website: nope").attributes, None);
    }

    #[test]
    fn html_descriptions_are_flattened() {
        let html = "Bar: Pony<br>Website: <a href=\"https://pony.bar\" target=\"_blank\">pony.bar</a><br/>Tea: Drinks &amp; dancing<b></b>";
        let bag = extract(html).attributes.unwrap();
        assert_eq!(bag.bar.as_deref(), Some("Pony"));
        assert_eq!(bag.website.as_deref(), Some("https://pony.bar"));
        assert_eq!(bag.tea.as_deref(), Some("Drinks & dancing"));
    }

    #[test]
    fn escaped_newlines_and_carriage_returns() {
        let bag = extract("Bar: Eagle\\nCover: $10\r\n").attributes.unwrap();
        assert_eq!(bag.bar.as_deref(), Some("Eagle"));
        assert_eq!(bag.cover.as_deref(), Some("$10"));
    }

    #[test]
    fn overlay_replaces_whole_fields() {
        let master = AttributeBag {
            bar: Some("Eagle".into()),
            cover: Some("$10".into()),
            ..Default::default()
        };
        let overrides = AttributeBag {
            cover: Some("Free".into()),
            ..Default::default()
        };
        let merged = master.overlay(&overrides);
        assert_eq!(merged.bar.as_deref(), Some("Eagle"));
        assert_eq!(merged.cover.as_deref(), Some("Free"));
        assert_eq!(master.overlay(&AttributeBag::default()), master);
    }

    #[test]
    fn links_follow_fixed_order() {
        let bag = AttributeBag {
            gmaps: Some("https://maps".into()),
            website: Some("https://site".into()),
            ..Default::default()
        };
        let links = bag.links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].kind, LinkKind::Website);
        assert_eq!(links[1].kind, LinkKind::Gmaps);
        assert!(AttributeBag::default().links().is_empty());
    }
}
