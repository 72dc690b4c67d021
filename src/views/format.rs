//! Display helpers for bookmark rows.

use chrono::{DateTime, Datelike, Utc};
use url::Url;

const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";

/// Short age of `created_at` relative to `now`.
///
/// Under a week the age is rounded down to minutes, hours or days; older
/// dates render as `Mon D`, with the year appended when it differs from
/// `now`'s. Dates in the future count as "Just now".
pub fn relative_date(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - created_at).num_seconds();
    match secs {
        s if s < 60 => "Just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s if s < 604_800 => format!("{}d ago", s / 86_400),
        _ if created_at.year() != now.year() => created_at.format("%b %-d, %Y").to_string(),
        _ => created_at.format("%b %-d").to_string(),
    }
}

/// Host of `url` without a leading `www.`; the input itself if it does not
/// parse.
pub fn domain(url: &str) -> String {
    match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        Some(host) => host.strip_prefix("www.").map(str::to_string).unwrap_or(host),
        None => url.to_string(),
    }
}

/// Favicon image URL for the bookmark's host.
pub fn favicon_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}?domain={}&sz=32", FAVICON_SERVICE, host))
}

/// "1 Bookmark" / "N Bookmarks".
pub fn count_label(count: usize) -> String {
    if count == 1 {
        "1 Bookmark".to_string()
    } else {
        format!("{} Bookmarks", count)
    }
}
