use std::fmt;
use std::sync::OnceLock;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upper bound on the extracted text kept per page, in characters.
pub const MAX_EXTRACTED_CHARS: usize = 32_000;

/// Subtrees that never contribute to a page's textual content.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "template", "iframe",
    "svg",
];

/// Which website a page or URL belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteSide {
    Old,
    New,
}

impl SiteSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteSide::Old => "old",
            SiteSide::New => "new",
        }
    }
}

impl fmt::Display for SiteSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a page's whitespace-normalized text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentFingerprint([u8; 32]);

impl ContentFingerprint {
    pub fn of(text: &str) -> Self {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Self(Sha256::digest(normalized.as_bytes()).into())
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A fetched page from one of the two sites.
///
/// The raw content never changes after creation. Extracted text, title and
/// fingerprint are derived lazily and cached for the lifetime of the page;
/// each is computed at most once.
#[derive(Clone, Debug)]
pub struct Page {
    side: SiteSide,
    url: String,
    raw_content: String,
    extracted_text: OnceLock<String>,
    title: OnceLock<String>,
    fingerprint: OnceLock<ContentFingerprint>,
}

impl Page {
    pub fn new(side: SiteSide, url: impl Into<String>, raw_content: impl Into<String>) -> Self {
        Self {
            side,
            url: url.into(),
            raw_content: raw_content.into(),
            extracted_text: OnceLock::new(),
            title: OnceLock::new(),
            fingerprint: OnceLock::new(),
        }
    }

    pub fn side(&self) -> SiteSide {
        self.side
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// Visible text with boilerplate removed, capped at [`MAX_EXTRACTED_CHARS`].
    pub fn extracted_text(&self) -> &str {
        self.extracted_text
            .get_or_init(|| extract_text(&self.raw_content, MAX_EXTRACTED_CHARS))
    }

    /// Contents of `<title>`, falling back to the first `<h1>`.
    pub fn title(&self) -> &str {
        self.title.get_or_init(|| extract_title(&self.raw_content))
    }

    pub fn content_fingerprint(&self) -> ContentFingerprint {
        *self
            .fingerprint
            .get_or_init(|| ContentFingerprint::of(self.extracted_text()))
    }
}

/// Strips markup and boilerplate from an HTML document.
///
/// The first of `<main>`, `<article>` or `<body>` found is used as the
/// content root; whitespace is collapsed to single spaces.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);

    let root = ["main", "article", "body"]
        .iter()
        .filter_map(|name| Selector::parse(name).ok())
        .find_map(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut fragments = Vec::new();
    collect_text(root, &mut fragments);

    let text = fragments
        .iter()
        .flat_map(|fragment| fragment.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");

    truncate_chars(&text, max_chars)
}

fn collect_text<'a>(element: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push(text),
            Node::Element(el) if !SKIPPED_TAGS.contains(&el.name()) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

/// Returns the document title, the first `<h1>` when no title is present, or
/// an empty string.
pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);

    ["title", "h1"]
        .iter()
        .filter_map(|name| Selector::parse(name).ok())
        .find_map(|selector| {
            let text = document
                .select(&selector)
                .next()?
                .text()
                .collect::<String>();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_default()
}

/// Truncates on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <html>
          <head><title> About   Us </title><style>body { color: red; }</style></head>
          <body>
            <header>Site header</header>
            <nav><a href="/">Home</a></nav>
            <main>
              <h1>About our company</h1>
              <p>We build   things.</p>
              <script>var tracking = true;</script>
            </main>
            <footer>Copyright</footer>
          </body>
        </html>
    "#;

    #[test]
    fn extract_text_strips_boilerplate_and_collapses_whitespace() {
        assert_eq!(
            extract_text(ARTICLE, MAX_EXTRACTED_CHARS),
            "About our company We build things."
        );
    }

    #[test]
    fn extract_text_falls_back_to_body() {
        let html = "<html><body><nav>menu</nav><p>Plain body</p></body></html>";
        assert_eq!(extract_text(html, MAX_EXTRACTED_CHARS), "Plain body");
    }

    #[test]
    fn extract_text_respects_character_cap() {
        let html = "<body><p>ééééé</p></body>";
        assert_eq!(extract_text(html, 3), "ééé");
    }

    #[test]
    fn title_falls_back_to_first_heading() {
        assert_eq!(extract_title(ARTICLE), "About Us");
        assert_eq!(
            extract_title("<body><h1>Heading</h1><h1>Second</h1></body>"),
            "Heading"
        );
        assert_eq!(extract_title("<body><p>nothing</p></body>"), "");
    }

    #[test]
    fn derived_fields_are_memoized() {
        let page = Page::new(SiteSide::Old, "https://old.example/about", ARTICLE);

        let first = page.extracted_text() as *const str;
        let second = page.extracted_text() as *const str;

        assert_eq!(first, second);
        assert_eq!(page.content_fingerprint(), page.content_fingerprint());
    }

    #[test]
    fn fingerprint_ignores_markup_differences() {
        let old = Page::new(
            SiteSide::Old,
            "https://old.example/a",
            "<body><div><p>Same   words here</p></div></body>",
        );
        let new = Page::new(
            SiteSide::New,
            "https://new.example/b",
            "<body><section>Same words here</section></body>",
        );
        let other = Page::new(
            SiteSide::New,
            "https://new.example/c",
            "<body><p>Different words</p></body>",
        );

        assert_eq!(old.content_fingerprint(), new.content_fingerprint());
        assert_ne!(old.content_fingerprint(), other.content_fingerprint());
        assert_eq!(old.content_fingerprint().to_string().len(), 64);
    }
}
