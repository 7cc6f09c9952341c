// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::episode::AssetKind;
use crate::error::ListingError;

/// Container of the episode list on the listing page
const LISTING_WIDGET: &str = "widget-bbcle-coursecontentlist";

static ENTRY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<h2[^>]*>\s*<a\b[^>]*?\bhref\s*=\s*"([^"]*)"[^>]*>(.*?)</a>"#)
        .expect("entry link regex")
});
static DETAILS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*class\s*=\s*"[^"]*\bdetails\b[^"]*"[^>]*>\s*<h3[^>]*>(.*?)</h3>"#)
        .expect("details regex")
});
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<b[^>]*>(.*?)</b>").expect("bold regex"));
static RELEASE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}\s+[[:alpha:]]+\s+(\d{4}))").expect("release date regex")
});
static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>").expect("anchor regex"));
static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)\bclass\s*=\s*"([^"]*)""#).expect("class regex"));
static HREF_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)\bhref\s*=\s*"([^"]*)""#).expect("href regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("heading regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// One episode block from the listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub title: String,
    /// Episode number label, e.g. `Episode 250828`
    pub number: Option<String>,
    pub page_url: Url,
    /// Release date as printed, e.g. `28 Aug 2025`
    pub release_date: Option<String>,
    pub release_year: Option<i32>,
}

/// Links and heading extracted from an episode page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodePage {
    pub heading: Option<String>,
    pub pdf_url: Option<Url>,
    pub mp3_url: Option<Url>,
}

/// Extract the episode blocks from a listing page.
///
/// The page has a featured block with the latest episode followed by the
/// rest; both share the same markup inside the course content widget. Links
/// are resolved against `base`.
pub fn parse_listing(html: &str, base: &Url) -> Result<Vec<ListingEntry>, ListingError> {
    let section = html
        .find(LISTING_WIDGET)
        .map(|pos| &html[pos..])
        .ok_or_else(|| ListingError::NoEntries {
            url: base.to_string(),
        })?;

    let links: Vec<_> = ENTRY_LINK.captures_iter(section).collect();
    let mut entries = Vec::with_capacity(links.len());

    for (i, caps) in links.iter().enumerate() {
        let (Some(whole), Some(href), Some(text)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Ok(page_url) = base.join(&decode_text(href.as_str())) else {
            tracing::debug!(href = href.as_str(), "skipping entry with unusable link");
            continue;
        };

        // Details for this entry sit between its link and the next one
        let block_end = links
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(section.len(), |m| m.start());
        let block = &section[whole.end()..block_end];

        let details = DETAILS.captures(block).and_then(|c| c.get(1));
        let number = details
            .and_then(|d| BOLD.captures(d.as_str()))
            .and_then(|c| c.get(1))
            .map(|b| decode_text(b.as_str()))
            .filter(|n| !n.is_empty());
        let date = details.and_then(|d| extract_date_and_year(&decode_text(d.as_str())));

        entries.push(ListingEntry {
            title: decode_text(text.as_str()),
            number,
            page_url,
            release_year: date.as_ref().map(|(_, year)| *year),
            release_date: date.map(|(text, _)| text),
        });
    }

    if entries.is_empty() {
        return Err(ListingError::NoEntries {
            url: base.to_string(),
        });
    }

    Ok(entries)
}

/// Pull the release date out of a details line such as
/// `Episode 250828 / 28 Aug 2025`
pub fn extract_date_and_year(text: &str) -> Option<(String, i32)> {
    let raw = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let caps = RELEASE_DATE.captures(&raw)?;
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((caps.get(1)?.as_str().trim().to_string(), year))
}

/// Extract the transcript and audio download links from an episode page
pub fn parse_episode_page(html: &str, base: &Url) -> EpisodePage {
    EpisodePage {
        heading: HEADING
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|h| decode_text(h.as_str()))
            .filter(|h| !h.is_empty()),
        pdf_url: find_download_link(html, base, AssetKind::Pdf),
        mp3_url: find_download_link(html, base, AssetKind::Mp3),
    }
}

fn find_download_link(html: &str, base: &Url, kind: AssetKind) -> Option<Url> {
    let marker = format!("bbcle-download-extension-{}", kind.extension());

    ANCHOR
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|attrs| attrs.as_str())
        .filter(|attrs| {
            CLASS_ATTR
                .captures(attrs)
                .and_then(|c| c.get(1))
                .is_some_and(|class| {
                    let classes: Vec<_> = class.as_str().split_whitespace().collect();
                    classes.contains(&"download") && classes.contains(&marker.as_str())
                })
        })
        .filter_map(|attrs| HREF_ATTR.captures(attrs).and_then(|c| c.get(1)))
        .find_map(|href| base.join(&decode_text(href.as_str())).ok())
}

/// Strip tags, decode entities and collapse whitespace
fn decode_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"<html><body>
<div class="header"><h2><a href="/nav">Navigation</a></h2></div>
<div class="widget widget-bbcle-coursecontentlist">
  <div class="text">
    <h2><a href="/learningenglish/english/features/6-minute-english_2025/ep-250828">Can you learn to be funny?</a></h2>
    <div class="details"><h3><b>Episode 250828</b> / 28 Aug 2025 </h3></div>
    <p>Description</p>
  </div>
  <ul>
    <li class="course-content-item">
      <div class="text">
        <h2><a href="/learningenglish/english/features/6-minute-english_2024/ep-241212">Why we love &amp; hate   winter</a></h2>
        <div class="details"><h3><b>Episode 241212</b>
          / 12 Dec 2024</h3></div>
      </div>
    </li>
    <li class="course-content-item">
      <div class="text">
        <h2><a href="https://www.bbc.co.uk/learningenglish/english/features/6-minute-english/ep-undated">Undated</a></h2>
      </div>
    </li>
  </ul>
</div></body></html>"#;

    const EPISODE_PAGE: &str = r#"<html><body>
<h1>Can you learn to be funny?</h1>
<a class="download bbcle-download-extension-pdf" href="https://downloads.bbc.co.uk/learningenglish/features/6min/250828_6min_english_funny.pdf">Download PDF</a>
<a href="/other">Other</a>
<a data-x="1" href="/audio/250828_6min_english_funny_download.mp3" class="download bbcle-download-extension-mp3">Download Audio</a>
</body></html>"#;

    fn base() -> Url {
        Url::parse("https://www.bbc.co.uk/learningenglish/english/features/6-minute-english").unwrap()
    }

    #[test]
    fn listing_extracts_entries_inside_widget() {
        let entries = parse_listing(LISTING_PAGE, &base()).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "Can you learn to be funny?");
        assert_eq!(entries[0].number.as_deref(), Some("Episode 250828"));
        assert_eq!(
            entries[0].page_url.as_str(),
            "https://www.bbc.co.uk/learningenglish/english/features/6-minute-english_2025/ep-250828"
        );
        assert_eq!(entries[0].release_date.as_deref(), Some("28 Aug 2025"));
        assert_eq!(entries[0].release_year, Some(2025));
    }

    #[test]
    fn listing_decodes_entities_and_whitespace() {
        let entries = parse_listing(LISTING_PAGE, &base()).unwrap();

        assert_eq!(entries[1].title, "Why we love & hate winter");
        assert_eq!(entries[1].release_date.as_deref(), Some("12 Dec 2024"));
        assert_eq!(entries[1].release_year, Some(2024));
    }

    #[test]
    fn listing_keeps_entries_without_details() {
        let entries = parse_listing(LISTING_PAGE, &base()).unwrap();

        assert_eq!(entries[2].title, "Undated");
        assert!(entries[2].number.is_none());
        assert!(entries[2].release_year.is_none());
    }

    #[test]
    fn listing_without_widget_is_malformed() {
        let err = parse_listing("<html><h2><a href=\"/x\">X</a></h2></html>", &base()).unwrap_err();
        assert!(matches!(err, ListingError::NoEntries { .. }));
    }

    #[test]
    fn listing_with_empty_widget_is_malformed() {
        let html = r#"<div class="widget-bbcle-coursecontentlist"></div>"#;
        assert!(matches!(
            parse_listing(html, &base()),
            Err(ListingError::NoEntries { .. })
        ));
    }

    #[test]
    fn extracts_date_from_details_line() {
        assert_eq!(
            extract_date_and_year("Episode 250828  /  28 Aug 2025"),
            Some(("28 Aug 2025".to_string(), 2025))
        );
        assert_eq!(extract_date_and_year("Episode 250828"), None);
    }

    #[test]
    fn episode_page_yields_both_links() {
        let page = parse_episode_page(EPISODE_PAGE, &base());

        assert_eq!(page.heading.as_deref(), Some("Can you learn to be funny?"));
        assert_eq!(
            page.pdf_url.unwrap().as_str(),
            "https://downloads.bbc.co.uk/learningenglish/features/6min/250828_6min_english_funny.pdf"
        );
        assert_eq!(
            page.mp3_url.unwrap().as_str(),
            "https://www.bbc.co.uk/audio/250828_6min_english_funny_download.mp3"
        );
    }

    #[test]
    fn episode_page_without_downloads() {
        let page = parse_episode_page("<html><h1></h1><a href=\"/x\">x</a></html>", &base());
        assert_eq!(page, EpisodePage::default());
    }
}
