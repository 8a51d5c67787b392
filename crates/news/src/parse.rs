use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};
use time::{Duration, OffsetDateTime, PrimitiveDateTime, macros::format_description};
use url::Url;

const SITE_HOST: &str = "news.ycombinator.com";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewsItem {
    pub rank: u32,
    pub title: String,
    pub url: String,
    pub source: String,
    pub score: Option<String>,
    pub author: Option<String>,
    /// Age as shown on the page, e.g. `3 hours ago`.
    pub age: String,
    pub posted_at: Option<OffsetDateTime>,
}

struct Selectors {
    row: Selector,
    rank: Selector,
    title: Selector,
    subtext: Selector,
    score: Selector,
    author: Selector,
    age: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        row: Selector::parse("tr.athing").unwrap(),
        rank: Selector::parse("span.rank").unwrap(),
        title: Selector::parse(".titleline > a, a.titlelink").unwrap(),
        subtext: Selector::parse("td.subtext").unwrap(),
        score: Selector::parse("span.score").unwrap(),
        author: Selector::parse("a.hnuser").unwrap(),
        age: Selector::parse("span.age").unwrap(),
    })
}

fn text(element: ElementRef) -> String { element.text().collect::<String>().trim().to_string() }

/// Extract the ranked stories from one front page.
///
/// Rows that do not look like a story (no rank or title link) are skipped.
pub fn parse_front_page(html: &str, base_url: &Url, now: OffsetDateTime) -> Vec<NewsItem> {
    let selectors = selectors();
    let document = Html::parse_document(html);
    let mut items = Vec::new();
    for row in document.select(&selectors.row) {
        let Some(rank) = row
            .select(&selectors.rank)
            .next()
            .and_then(|r| text(r).trim_end_matches('.').parse::<u32>().ok())
        else {
            tracing::debug!("Skipping story row without rank");
            continue;
        };
        let Some(link) = row.select(&selectors.title).next() else {
            tracing::warn!("Could not find title link for story {}", rank);
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        let resolved = base_url.join(href).ok();
        let url = resolved.as_ref().map(Url::to_string).unwrap_or_else(|| href.to_string());
        let source = match resolved.as_ref().and_then(Url::host_str) {
            Some(host) if href.starts_with("http") => host.to_string(),
            _ => SITE_HOST.to_string(),
        };

        // Metadata lives in the following table row
        let subtext = row
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .and_then(|sibling| sibling.select(&selectors.subtext).next());
        let score = subtext.and_then(|s| s.select(&selectors.score).next()).map(text);
        let author = subtext.and_then(|s| s.select(&selectors.author).next()).map(text);
        let age_element = subtext.and_then(|s| s.select(&selectors.age).next());
        let age = age_element.map(text).unwrap_or_default();
        let posted_at = age_element
            .and_then(|a| a.value().attr("title"))
            .and_then(parse_age_title)
            .or_else(|| parse_relative_age(&age, now));

        items.push(NewsItem {
            rank,
            title: text(link),
            url,
            source,
            score,
            author,
            age,
            posted_at,
        });
    }
    items
}

/// Parse the `title` attribute of an age span: `2024-09-16T08:09:55 1726474195`.
pub fn parse_age_title(value: &str) -> Option<OffsetDateTime> {
    let mut parts = value.split_whitespace();
    let iso = parts.next()?;
    if let Some(unix) = parts.next().and_then(|v| v.parse::<i64>().ok()) {
        return OffsetDateTime::from_unix_timestamp(unix).ok();
    }
    PrimitiveDateTime::parse(iso, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Resolve text like `3 hours ago` against `now`.
pub fn parse_relative_age(value: &str, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let mut parts = value.split_whitespace();
    let amount = parts.next()?.parse::<i64>().ok()?;
    let unit = parts.next()?.trim_end_matches('s');
    if parts.next() != Some("ago") {
        return None;
    }
    let days = |n: i64| n.checked_mul(86_400).map(Duration::seconds);
    let delta = match unit {
        "second" => Some(Duration::seconds(amount)),
        "minute" => amount.checked_mul(60).map(Duration::seconds),
        "hour" => amount.checked_mul(3_600).map(Duration::seconds),
        "day" => days(amount),
        "month" => amount.checked_mul(30).and_then(days),
        "year" => amount.checked_mul(365).and_then(days),
        _ => None,
    }?;
    now.checked_sub(delta)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const FRONT_PAGE: &str = include_str!("../tests/fixtures/front_page.html");

    #[test]
    fn test_parse_front_page() {
        let base = Url::parse("https://news.ycombinator.com/").unwrap();
        let now = datetime!(2024-09-16 16:09:55 UTC);
        let items = parse_front_page(FRONT_PAGE, &base, now);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0], NewsItem {
            rank: 1,
            title: "Test Title".to_string(),
            url: "https://example.com/post".to_string(),
            source: "example.com".to_string(),
            score: Some("100 points".to_string()),
            author: Some("testuser".to_string()),
            age: "8 hours ago".to_string(),
            posted_at: Some(datetime!(2024-09-16 08:09:55 UTC)),
        });

        assert_eq!(items[1].rank, 2);
        assert_eq!(items[1].url, "https://news.ycombinator.com/item?id=2");
        assert_eq!(items[1].source, "news.ycombinator.com");
        assert_eq!(items[1].score, None);
        assert_eq!(items[1].author, None);
        assert_eq!(items[1].posted_at, Some(datetime!(2024-09-16 13:09:55 UTC)));
    }

    #[test]
    fn test_parse_front_page_with_absurd_age() {
        let html = FRONT_PAGE.replace("3 hours ago", "30000000 years ago");
        let base = Url::parse("https://news.ycombinator.com/").unwrap();
        let items = parse_front_page(&html, &base, datetime!(2024-09-16 16:09:55 UTC));
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].age, "30000000 years ago");
        assert_eq!(items[1].posted_at, None);
    }

    #[test]
    fn test_parse_relative_age() {
        let now = datetime!(2024-09-16 12:00 UTC);
        let cases: &[(&str, Option<OffsetDateTime>)] = &[
            ("1 minute ago", Some(datetime!(2024-09-16 11:59 UTC))),
            ("3 hours ago", Some(datetime!(2024-09-16 09:00 UTC))),
            ("2 days ago", Some(datetime!(2024-09-14 12:00 UTC))),
            ("yesterday", None),
            ("3 fortnights ago", None),
            ("3 hours", None),
            ("30000000 years ago", None),
            ("9223372036854775807 minutes ago", None),
        ];
        for &(input, expected) in cases {
            assert_eq!(parse_relative_age(input, now), expected, "{input:?}");
        }
    }

    #[test]
    fn test_parse_age_title_without_unix() {
        assert_eq!(
            parse_age_title("2024-09-16T08:09:55"),
            Some(datetime!(2024-09-16 08:09:55 UTC))
        );
        assert_eq!(parse_age_title(""), None);
    }
}
