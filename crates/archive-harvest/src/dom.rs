//! DOM extraction engine.
//!
//! Drives a browser session through
//! `Launch → AntiDetectionSetup → NavigateAndSettle → ScrollSimulate → WaitForFileList → ExtractDescriptors → Teardown`
//! and scans the rendered document with two data-driven passes:
//!
//! 1. a structured pass over known file-list item patterns, pairing each
//!    `"<name> [<size>]"` label with the item's action control;
//! 2. a generic pass over an ordered list of attribute selectors.
//!
//! Both passes keep images only. Unresolvable URLs are dropped silently.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use url::Url;

use crate::browser::{js_string, ContextProfile, PageSession, SessionFactory};
use crate::classify;
use crate::config::BrowserSettings;
use crate::download::file_name_from_url;
use crate::events::{EventSink, ExtractionStage, HarvestEvent};
use crate::types::{AssetDescriptor, ControlLocator, HarvestResult, SourceMethod};

const FILE_LIST_POLL: Duration = Duration::from_millis(250);

/// Matches `"<name> [<size>]"` labels.
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>.+?)\s*\[\s*(?P<size>[^\[\]]+?)\s*\]\s*$").unwrap()
});

/// A known file-list layout: list items, their label, and their action control.
#[derive(Debug, Clone, Copy)]
pub struct FileListPattern {
    pub items: &'static str,
    pub label: &'static str,
    pub control: &'static str,
}

/// Tried in order; the first pattern matching any item is used.
pub const FILE_LIST_PATTERNS: &[FileListPattern] = &[
    FileListPattern {
        items: "ul.file_list li",
        label: ".file_name, .name, span, a",
        control: "a.btn_down, a.down, button, a",
    },
    FileListPattern {
        items: "ul.file-list li",
        label: ".file-name, .name, span, a",
        control: "a.btn-download, button, a",
    },
    FileListPattern {
        items: ".attach_list li",
        label: ".name, span, a",
        control: "button, a",
    },
    FileListPattern {
        items: ".file_area li",
        label: ".name, span, a",
        control: "button, a",
    },
];

/// An attribute-bearing selector in the generic pass.
#[derive(Debug, Clone, Copy)]
pub struct SelectorRule {
    pub selector: &'static str,
    pub attribute: &'static str,
    pub method: SourceMethod,
}

const fn rule(selector: &'static str, attribute: &'static str, method: SourceMethod) -> SelectorRule {
    SelectorRule {
        selector,
        attribute,
        method,
    }
}

/// Generic pass, in priority order.
pub const GENERIC_RULES: &[SelectorRule] = &[
    rule("img[src]", "src", SourceMethod::DomImageTag),
    rule("img[data-src]", "data-src", SourceMethod::DomImageTag),
    rule("img[data-original]", "data-original", SourceMethod::DomImageTag),
    rule("a[href*='image']", "href", SourceMethod::DomSelector),
    rule("a[href*='photo']", "href", SourceMethod::DomSelector),
    rule("a[href*='media']", "href", SourceMethod::DomSelector),
    rule("a[class*='image']", "href", SourceMethod::DomSelector),
    rule("a[class*='photo']", "href", SourceMethod::DomSelector),
    rule("a[class*='media']", "href", SourceMethod::DomSelector),
    rule("a[href$='.jpg' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.jpeg' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.png' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.gif' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.bmp' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.webp' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.svg' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.tif' i]", "href", SourceMethod::DomSelector),
    rule("a[href$='.tiff' i]", "href", SourceMethod::DomSelector),
];

/// Descriptors found by each pass.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub structured: Vec<AssetDescriptor>,
    pub generic: Vec<AssetDescriptor>,
}

impl Extraction {
    pub fn into_descriptors(self) -> Vec<AssetDescriptor> {
        let mut all = self.structured;
        all.extend(self.generic);
        all
    }
}

/// Drives one session through the extraction stages.
pub struct DomExtractor<'a> {
    settings: &'a BrowserSettings,
    profile: &'a ContextProfile,
    sink: &'a dyn EventSink,
}

impl<'a> DomExtractor<'a> {
    pub fn new(settings: &'a BrowserSettings, profile: &'a ContextProfile, sink: &'a dyn EventSink) -> Self {
        Self {
            settings,
            profile,
            sink,
        }
    }

    fn enter(&self, stage: ExtractionStage) {
        self.sink.emit(HarvestEvent::StageEntered { stage });
    }

    /// Launch and AntiDetectionSetup. The session is torn down if setup fails.
    pub async fn open(&self, factory: &dyn SessionFactory, headless: bool) -> HarvestResult<Box<dyn PageSession>> {
        self.enter(ExtractionStage::Launch);
        let mut session = factory.launch(headless).await?;

        self.enter(ExtractionStage::AntiDetectionSetup);
        if let Err(e) = session.apply_profile(self.profile).await {
            self.teardown(session).await;
            return Err(e);
        }
        Ok(session)
    }

    /// NavigateAndSettle through ExtractDescriptors on an open session.
    pub async fn extract(&self, session: &mut dyn PageSession, page: &Url) -> HarvestResult<Extraction> {
        self.enter(ExtractionStage::NavigateAndSettle);
        let nav = session
            .navigate(
                page.as_str(),
                Duration::from_millis(self.settings.navigation_timeout_ms),
            )
            .await?;
        tokio::time::sleep(Duration::from_millis(self.settings.settle_ms)).await;

        self.enter(ExtractionStage::ScrollSimulate);
        self.scroll(session).await?;

        self.enter(ExtractionStage::WaitForFileList);
        self.wait_for_file_list(session).await;

        self.enter(ExtractionStage::ExtractDescriptors);
        let html = session.html().await?;
        let base = session
            .current_url()
            .await
            .ok()
            .and_then(|current| Url::parse(&current).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .or_else(|| Url::parse(&nav.final_url).ok())
            .unwrap_or_else(|| page.clone());
        let extraction = extract_descriptors(&html, &base);

        self.sink.emit(HarvestEvent::DescriptorsExtracted {
            structured: extraction.structured.len(),
            generic: extraction.generic.len(),
        });
        Ok(extraction)
    }

    /// The whole state machine; the session is always closed.
    pub async fn run(&self, factory: &dyn SessionFactory, headless: bool, page: &Url) -> HarvestResult<Extraction> {
        let mut session = self.open(factory, headless).await?;
        let result = self.extract(session.as_mut(), page).await;
        self.teardown(session).await;
        result
    }

    pub async fn teardown(&self, session: Box<dyn PageSession>) {
        self.enter(ExtractionStage::Teardown);
        if let Err(e) = session.close().await {
            self.sink.emit(HarvestEvent::TeardownFailed {
                error: e.to_string(),
            });
        }
    }

    async fn scroll(&self, session: &mut dyn PageSession) -> HarvestResult<()> {
        let steps = self.settings.scroll_steps.max(1);
        let delay = Duration::from_millis(self.settings.scroll_delay_ms);
        for step in 1..=steps {
            session
                .evaluate(&format!(
                    "window.scrollTo(0, document.body.scrollHeight * {step} / {steps}); true"
                ))
                .await?;
            tokio::time::sleep(delay).await;
        }
        session.evaluate("window.scrollTo(0, 0); true").await?;
        Ok(())
    }

    /// Bounded wait for a file-list container. A timeout is not an error.
    async fn wait_for_file_list(&self, session: &mut dyn PageSession) {
        let selectors: Vec<String> = self
            .settings
            .file_list_selectors
            .iter()
            .map(|s| js_string(s))
            .collect();
        let script = format!(
            "[{}].some(s => document.querySelector(s) !== null)",
            selectors.join(", ")
        );

        let timeout = Duration::from_millis(self.settings.file_list_timeout_ms);
        let start = Instant::now();
        loop {
            if let Ok(serde_json::Value::Bool(true)) = session.evaluate(&script).await {
                return;
            }
            if start.elapsed() >= timeout {
                self.sink.emit(HarvestEvent::FileListTimeout {
                    waited_ms: timeout.as_millis() as u64,
                });
                return;
            }
            tokio::time::sleep(FILE_LIST_POLL).await;
        }
    }
}

/// Run both passes over a rendered document.
pub fn extract_descriptors(html: &str, base: &Url) -> Extraction {
    let document = Html::parse_document(html);
    Extraction {
        structured: structured_pass(&document, base),
        generic: generic_pass(&document, base),
    }
}

fn structured_pass(document: &Html, base: &Url) -> Vec<AssetDescriptor> {
    for pattern in FILE_LIST_PATTERNS {
        let (Ok(items), Ok(label_sel)) = (Selector::parse(pattern.items), Selector::parse(pattern.label))
        else {
            continue;
        };
        let controls = control_selectors(pattern.control);

        let matched: Vec<ElementRef> = document.select(&items).collect();
        if matched.is_empty() {
            continue;
        }

        return matched
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                structured_item(item, index, pattern, &label_sel, &controls, base)
            })
            .filter(|d| classify::is_image(Some(&d.file_name)))
            .collect();
    }
    Vec::new()
}

fn structured_item(
    item: &ElementRef,
    index: usize,
    pattern: &FileListPattern,
    label_sel: &Selector,
    controls: &[(&'static str, Selector)],
    base: &Url,
) -> Option<AssetDescriptor> {
    let (label, name, size) = item
        .select(label_sel)
        .map(|el| text_of(&el))
        .chain(std::iter::once(text_of(item)))
        .find_map(|text| {
            let caps = LABEL_RE.captures(&text)?;
            let name = caps.name("name")?.as_str().to_string();
            let size = caps.name("size")?.as_str().to_string();
            Some((text.clone(), name, size))
        })?;

    let found = controls
        .iter()
        .find_map(|(raw, sel)| item.select(sel).next().map(|el| (*raw, el)));
    let control = found.map(|(_, el)| el);
    let href = control
        .and_then(|c| c.value().attr("href"))
        .filter(|h| is_navigable(h))
        .and_then(|h| resolve(base, h));
    let onclick = control.and_then(|c| c.value().attr("onclick")).map(str::to_string);

    let locator = ControlLocator {
        item_selector: pattern.items.to_string(),
        index,
        control_selector: found.map_or(pattern.control, |(raw, _)| raw).to_string(),
    };

    let (source_method, raw_metadata) = match (&href, control) {
        (Some(_), _) => (
            SourceMethod::DomSelector,
            json!({ "pattern": pattern.items, "index": index, "onclick": onclick }),
        ),
        (None, Some(_)) => (
            SourceMethod::DomSelector,
            json!({ "pattern": pattern.items, "index": index, "onclick": onclick, "control": locator }),
        ),
        (None, None) => (
            SourceMethod::InfoOnly,
            json!({ "pattern": pattern.items, "index": index }),
        ),
    };

    Some(AssetDescriptor {
        url: href,
        display_text: label,
        media_type: classify::media_type(&name),
        file_name: name,
        file_size: size,
        source_method,
        raw_metadata,
    })
}

/// A pattern's comma-separated control list, split so each entry is tried in priority order.
fn control_selectors(list: &'static str) -> Vec<(&'static str, Selector)> {
    list.split(',')
        .map(str::trim)
        .filter_map(|raw| Selector::parse(raw).ok().map(|sel| (raw, sel)))
        .collect()
}

fn generic_pass(document: &Html, base: &Url) -> Vec<AssetDescriptor> {
    let mut found = Vec::new();
    for rule in GENERIC_RULES {
        let Ok(selector) = Selector::parse(rule.selector) else {
            continue;
        };
        for el in document.select(&selector) {
            let Some(raw) = el.value().attr(rule.attribute) else {
                continue;
            };
            if !is_navigable(raw) {
                continue;
            }
            let Some(url) = resolve(base, raw).and_then(|u| Url::parse(&u).ok()) else {
                continue;
            };

            let Some(file_name) = image_name(&el, &url) else {
                continue;
            };

            let display_text = ["alt", "title"]
                .iter()
                .filter_map(|a| el.value().attr(a))
                .map(str::trim)
                .find(|t| !t.is_empty())
                .map(str::to_string)
                .or_else(|| Some(text_of(&el)).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| file_name.clone());

            found.push(AssetDescriptor {
                url: Some(url.to_string()),
                display_text,
                media_type: classify::media_type(&file_name),
                file_name,
                file_size: "Unknown".to_string(),
                source_method: rule.method,
                raw_metadata: json!({ "selector": rule.selector, "attribute": rule.attribute }),
            });
        }
    }
    found
}

/// Image file name from the URL, else from the element's attributes or text.
fn image_name(el: &ElementRef, url: &Url) -> Option<String> {
    let is_image = |n: &str| classify::is_image(Some(n));

    if let Some(name) = file_name_from_url(url).filter(|n| is_image(n)) {
        return Some(name);
    }
    let from_attr = ["download", "title", "alt"]
        .iter()
        .filter_map(|a| el.value().attr(a))
        .map(str::trim)
        .find(|t| is_image(t))
        .map(str::to_string);
    from_attr.or_else(|| {
        let text = text_of(el);
        is_image(&text).then_some(text)
    })
}

/// Collapsed text content of an element.
fn text_of(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_navigable(raw: &str) -> bool {
    let r = raw.trim().to_ascii_lowercase();
    !(r.is_empty() || r == "#" || r.starts_with("javascript:") || r.starts_with("data:") || r.starts_with("mailto:"))
}

fn resolve(base: &Url, raw: &str) -> Option<String> {
    let url = base.join(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::testing::{FakeFactory, FakePage};
    use crate::types::MediaType;

    fn base() -> Url {
        Url::parse("https://www.archives.go.kr/next/viewer/detail.do?medSeq=1").unwrap()
    }

    #[test]
    fn test_single_img_tag() {
        let ex = extract_descriptors(r#"<html><body><img src="/img/x.jpg"></body></html>"#, &base());
        assert!(ex.structured.is_empty());
        assert_eq!(ex.generic.len(), 1);
        let d = &ex.generic[0];
        assert_eq!(d.file_name, "x.jpg");
        assert_eq!(d.url.as_deref(), Some("https://www.archives.go.kr/img/x.jpg"));
        assert_eq!(d.source_method, SourceMethod::DomImageTag);
        assert_eq!(d.media_type, MediaType::Image);
    }

    #[test]
    fn test_structured_list_with_controls() {
        let html = r#"
            <ul class="file_list">
              <li><span class="file_name">photo1.jpg [1.2 MB]</span>
                  <a class="btn_down" href="/down.do?atcflNo=A1">download</a></li>
              <li><span class="file_name">scan.png [300 KB]</span>
                  <a class="btn_down" href="javascript:void(0)" onclick="fnDown('A2')">download</a></li>
              <li><span class="file_name">minutes.pdf [2 MB]</span>
                  <a class="btn_down" href="/down.do?atcflNo=A3">download</a></li>
              <li><span class="file_name">caption.gif [1 KB]</span></li>
            </ul>"#;
        let ex = extract_descriptors(html, &base());
        assert_eq!(ex.structured.len(), 3);

        let linked = &ex.structured[0];
        assert_eq!(linked.file_name, "photo1.jpg");
        assert_eq!(linked.file_size, "1.2 MB");
        assert_eq!(
            linked.url.as_deref(),
            Some("https://www.archives.go.kr/down.do?atcflNo=A1")
        );

        let scripted = &ex.structured[1];
        assert!(scripted.url.is_none());
        assert_eq!(scripted.source_method, SourceMethod::DomSelector);
        let control = scripted.control().unwrap();
        assert_eq!(control.index, 1);
        assert_eq!(control.item_selector, "ul.file_list li");
        assert_eq!(control.control_selector, "a.btn_down");

        let info = &ex.structured[2];
        assert_eq!(info.file_name, "caption.gif");
        assert_eq!(info.source_method, SourceMethod::InfoOnly);
        assert!(info.control().is_none());
    }

    #[test]
    fn test_control_list_order_beats_document_order() {
        let html = r#"
            <ul class="file_list">
              <li><a class="label" href="/viewer.do?seq=1">front.jpg [10 KB]</a>
                  <a class="btn_down" href="/down.do?atcflNo=F1">download</a></li>
              <li><a class="label" href="/viewer.do?seq=2">back.jpg [12 KB]</a>
                  <button type="button" onclick="fnDown('F2')">download</button></li>
            </ul>"#;
        let ex = extract_descriptors(html, &base());
        assert_eq!(ex.structured.len(), 2);
        assert_eq!(
            ex.structured[0].url.as_deref(),
            Some("https://www.archives.go.kr/down.do?atcflNo=F1")
        );

        let back = &ex.structured[1];
        assert!(back.url.is_none());
        assert_eq!(back.control().unwrap().control_selector, "button");
    }

    #[test]
    fn test_generic_anchor_rules_and_drops() {
        let html = r#"
            <a class="photo_link" href="/view/p.do?fileName=big.TIFF">Original</a>
            <a href="https://cdn.archives.go.kr/x/pic.PNG">pic</a>
            <a href="/docs/report.pdf">report</a>
            <a href="javascript:openImage()">js</a>
            <img src="data:image/png;base64,AAAA">
            <img src="http://[bad">
        "#;
        let ex = extract_descriptors(html, &base());
        let names: Vec<&str> = ex.generic.iter().map(|d| d.file_name.as_str()).collect();
        assert!(names.contains(&"big.TIFF"));
        assert!(names.contains(&"pic.PNG"));
        assert!(!names.contains(&"report.pdf"));
        assert!(ex
            .generic
            .iter()
            .all(|d| d.url.as_deref().unwrap().starts_with("https://")));
    }

    #[test]
    fn test_label_regex() {
        let caps = LABEL_RE.captures("  사진 01.jpg  [ 3.5 MB ] ").unwrap();
        assert_eq!(&caps["name"], "사진 01.jpg");
        assert_eq!(&caps["size"], "3.5 MB");
        assert!(LABEL_RE.captures("no size here.jpg").is_none());
    }

    #[tokio::test]
    async fn test_run_walks_stages_and_tears_down() {
        let page = FakePage::new(r#"<img src="/img/x.jpg">"#).without_file_list();
        let factory = FakeFactory::new(page);
        let sink = MemorySink::new();
        let settings = fast_settings();
        let profile = ContextProfile::from_config(&Default::default());

        let ex = DomExtractor::new(&settings, &profile, &sink)
            .run(&factory, true, &base())
            .await
            .unwrap();

        assert_eq!(ex.generic.len(), 1);
        assert_eq!(
            sink.stages(),
            vec![
                ExtractionStage::Launch,
                ExtractionStage::AntiDetectionSetup,
                ExtractionStage::NavigateAndSettle,
                ExtractionStage::ScrollSimulate,
                ExtractionStage::WaitForFileList,
                ExtractionStage::ExtractDescriptors,
                ExtractionStage::Teardown,
            ]
        );
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, HarvestEvent::FileListTimeout { .. })));
        let state = factory.state();
        assert!(state.profile_applied_before_navigation());
        assert!(state.closed());
    }

    #[tokio::test]
    async fn test_relative_links_resolve_against_current_url() {
        let page = FakePage::new(r#"<img src="img/x.jpg">"#)
            .redirected_to("https://www.archives.go.kr/next/archive/view.do?id=7");
        let factory = FakeFactory::new(page);
        let sink = MemorySink::new();
        let settings = fast_settings();
        let profile = ContextProfile::from_config(&Default::default());

        let ex = DomExtractor::new(&settings, &profile, &sink)
            .run(&factory, true, &base())
            .await
            .unwrap();

        assert_eq!(
            ex.generic[0].url.as_deref(),
            Some("https://www.archives.go.kr/next/archive/img/x.jpg")
        );
    }

    #[tokio::test]
    async fn test_navigation_failure_still_tears_down() {
        let page = FakePage::new("").failing_navigation();
        let factory = FakeFactory::new(page);
        let sink = MemorySink::new();
        let settings = fast_settings();
        let profile = ContextProfile::from_config(&Default::default());

        let err = DomExtractor::new(&settings, &profile, &sink)
            .run(&factory, true, &base())
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), "AutomationSessionError");
        assert!(factory.state().closed());
    }

    fn fast_settings() -> BrowserSettings {
        BrowserSettings {
            settle_ms: 0,
            scroll_steps: 2,
            scroll_delay_ms: 0,
            file_list_timeout_ms: 0,
            ..Default::default()
        }
    }
}
