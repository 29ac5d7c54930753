use chrono::{DateTime, Utc};
use regex::Regex;

use crate::db::PinRecord;
use crate::page::RawPin;

const CDN_PREFIX: &str = "https://i.pinimg.com/";
const DATA_PREFIX: &str = "data:image";

/// Turn one raw pin snapshot into a record, or nothing.
///
/// A record is only materialized when the image URL has a valid shape AND a
/// pinterest id could be derived; anything else yields `None`, never an
/// error, so one malformed pin can't abort a pass.
pub fn pin_record(
    raw: &RawPin,
    board_url: &str,
    collected_at: DateTime<Utc>,
) -> Option<PinRecord> {
    let image_url = raw.image_src.as_deref().filter(|u| valid_image_url(u))?;

    let pin_url = raw
        .pin_href
        .as_deref()
        .map(|href| absolutize(href, &site_origin(board_url)));

    let pinterest_id = derive_id(pin_url.as_deref(), image_url)?;

    Some(PinRecord {
        pinterest_id,
        title: raw.title.as_deref().and_then(normalize_text),
        description: raw.description.as_deref().and_then(normalize_text),
        image_url: image_url.to_string(),
        board_url: board_url.to_string(),
        pin_url,
        collected_at,
    })
}

/// Accepted shapes: CDN-hosted absolute URL or inline data URL. Everything
/// else (placeholders, tracking pixels) rejects the element.
fn valid_image_url(src: &str) -> bool {
    src.starts_with(CDN_PREFIX) || src.starts_with(DATA_PREFIX)
}

/// Collapse newlines to spaces and trim; empty text becomes `None`.
fn normalize_text(text: &str) -> Option<String> {
    let normalized = text.replace(['\n', '\r'], " ").trim().to_string();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn absolutize(href: &str, origin: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", origin, href)
    }
}

/// Scheme + host of the board URL, for resolving relative pin hrefs.
pub(crate) fn site_origin(board_url: &str) -> String {
    let after_scheme = board_url.find("://").map(|i| i + 3).unwrap_or(0);
    match board_url[after_scheme..].find('/') {
        Some(i) => board_url[..after_scheme + i].to_string(),
        None => board_url.to_string(),
    }
}

/// Derive the pin id: a detail-page URL wins; otherwise fall back to the
/// image URL's `{dims}x/{digits}.ext` pattern, then a trailing
/// `{digits}.ext` segment.
fn derive_id(pin_url: Option<&str>, image_url: &str) -> Option<String> {
    if let Some(url) = pin_url {
        let re = Regex::new(r"/pin/(\d+)/").unwrap();
        return re.captures(url).map(|c| c[1].to_string());
    }

    let sized = Regex::new(r"/(\d+)x/(\d+)\.\w+$").unwrap();
    if let Some(c) = sized.captures(image_url) {
        return Some(c[2].to_string());
    }
    let trailing = Regex::new(r"/(\d+)\.\w+$").unwrap();
    trailing.captures(image_url).map(|c| c[1].to_string())
}

// ── Tests ──
