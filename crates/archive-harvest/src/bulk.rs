//! Bulk-download driver.
//!
//! Finds a page's "download all" control, clicks it, and watches the
//! download directory until the new files stop changing. The same click and
//! watch machinery triggers single in-page download controls.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::browser::{js_string, PageSession};
use crate::config::BulkSettings;
use crate::download::DownloadedFile;
use crate::events::{ClickableElement, EventSink, HarvestEvent};
use crate::types::{BulkReport, ControlLocator, HarvestError, HarvestResult};

/// Known "download all" controls, tried in order.
pub const BULK_CONTROL_SELECTORS: &[&str] = &[
    "a.btn_all_down",
    "button.btn_all_down",
    "a.btn_down_all",
    "#btnAllDown",
    "#allDownBtn",
    "a[onclick*='allDown']",
    "a[onclick*='AllDown']",
    "button[onclick*='allDown']",
    "button[onclick*='AllDown']",
    "a[href*='allDown']",
];

/// Words that mark a control as acting on every file.
pub const BULK_TEXT_SYNONYMS: &[&str] = &["전체", "일괄", "모두", "all", "bulk", "every"];

/// Suffixes browsers use for downloads still in flight.
pub const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".tmp", ".part"];

const BULK_MARKER: &str = "data-harvest-bulk";
const TARGET_MARKER: &str = "data-harvest-target";

const CLICKABLE: &str =
    "a, button, input[type=button], input[type=submit], [onclick], [role=button]";

/// How a located control was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMethod {
    /// Native input events through the automation driver.
    Direct,
    /// `element.click()` in page script.
    Scripted,
    /// A synthetic `MouseEvent` dispatched on the element.
    Dispatched,
}

impl ClickMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClickMethod::Direct => "direct",
            ClickMethod::Scripted => "scripted",
            ClickMethod::Dispatched => "dispatched",
        }
    }
}

/// A control located on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundControl {
    /// `"selector"` or `"text"`.
    pub matcher: &'static str,
    /// Selector that addresses the control for clicking.
    pub selector: String,
}

/// Files that settled after a trigger.
#[derive(Debug, Clone)]
pub struct Settled {
    /// Name → size in bytes.
    pub files: BTreeMap<String, u64>,
    pub elapsed_ms: u64,
}

/// Polls a directory for files that appear after a snapshot.
pub struct DirectoryWatcher {
    dir: PathBuf,
    baseline: HashSet<String>,
    poll: Duration,
    quiet: Duration,
    max_wait: Duration,
}

impl DirectoryWatcher {
    /// Create `dir` if needed and record its current contents.
    pub async fn snapshot(dir: &Path, settings: &BulkSettings) -> HarvestResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let baseline = list_dir(dir).await?.into_keys().collect();
        Ok(Self {
            dir: dir.to_path_buf(),
            baseline,
            poll: Duration::from_millis(settings.poll_interval_ms.max(1)),
            quiet: Duration::from_millis(settings.quiet_period_ms),
            max_wait: Duration::from_millis(settings.max_wait_ms),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// New complete files and whether any new partial file exists.
    async fn observe(&self) -> HarvestResult<(BTreeMap<String, u64>, bool)> {
        let mut settled = BTreeMap::new();
        let mut in_flight = false;
        for (name, size) in list_dir(&self.dir).await? {
            if self.baseline.contains(&name) {
                continue;
            }
            if is_partial(&name) {
                in_flight = true;
            } else {
                settled.insert(name, size);
            }
        }
        Ok((settled, in_flight))
    }

    /// Wait until at least `min_files` new files exist, nothing is in flight,
    /// and names and sizes hold still for one quiet period.
    pub async fn wait_for_settled(&self, min_files: usize) -> HarvestResult<Settled> {
        let start = Instant::now();
        let mut last: Option<BTreeMap<String, u64>> = None;
        let mut stable_since = Instant::now();

        loop {
            let (settled, in_flight) = self.observe().await?;

            if last.as_ref() != Some(&settled) {
                stable_since = Instant::now();
                last = Some(settled.clone());
            } else if !in_flight
                && settled.len() >= min_files.max(1)
                && stable_since.elapsed() >= self.quiet
            {
                return Ok(Settled {
                    files: settled,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }

            if start.elapsed() >= self.max_wait {
                return Err(HarvestError::DownloadTimeout {
                    waited_ms: self.max_wait.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}

fn is_partial(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PARTIAL_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

async fn list_dir(dir: &Path) -> HarvestResult<BTreeMap<String, u64>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = BTreeMap::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_file() {
            files.insert(entry.file_name().to_string_lossy().into_owned(), meta.len());
        }
    }
    Ok(files)
}

/// Triggers a page's "download all" control and waits for the result.
pub struct BulkDownloader<'a> {
    settings: &'a BulkSettings,
    sink: &'a dyn EventSink,
}

impl<'a> BulkDownloader<'a> {
    pub fn new(settings: &'a BulkSettings, sink: &'a dyn EventSink) -> Self {
        Self { settings, sink }
    }

    /// Run the driver, folding any failure into the report.
    pub async fn run(&self, session: &dyn PageSession, dir: &Path) -> BulkReport {
        let mut report = BulkReport {
            attempted: true,
            ..Default::default()
        };

        match self.try_run(session, dir, &mut report).await {
            Ok(settled) => {
                self.sink.emit(HarvestEvent::BulkDownloadSettled {
                    files: settled.files.keys().cloned().collect(),
                    elapsed_ms: settled.elapsed_ms,
                });
                report.success = true;
                report.files = settled.files.into_keys().collect();
                report.elapsed_ms = Some(settled.elapsed_ms);
            }
            Err(e) => {
                self.sink.emit(HarvestEvent::BulkDownloadFailed {
                    error: e.to_string(),
                });
                report.error = Some(e.to_string());
                report.error_type = Some(e.error_type().to_string());
            }
        }
        report
    }

    async fn try_run(
        &self,
        session: &dyn PageSession,
        dir: &Path,
        report: &mut BulkReport,
    ) -> HarvestResult<Settled> {
        let watcher = DirectoryWatcher::snapshot(dir, self.settings).await?;
        session.set_download_dir(&absolute(dir)?).await?;

        let control = locate_control(session, self.sink).await?;
        report.control = Some(control.matcher.to_string());

        let method = click_with_fallback(session, &control.selector, self.sink).await?;
        report.click_method = Some(method.as_str().to_string());

        watcher.wait_for_settled(1).await
    }
}

/// Selector cascade, then text heuristic, then a diagnostic dump and failure.
pub async fn locate_control(
    session: &dyn PageSession,
    sink: &dyn EventSink,
) -> HarvestResult<FoundControl> {
    for selector in BULK_CONTROL_SELECTORS {
        let script = format!("document.querySelector({}) !== null", js_string(selector));
        if session.evaluate(&script).await? == serde_json::Value::Bool(true) {
            sink.emit(HarvestEvent::BulkControlFound {
                matcher: "selector".into(),
                selector: selector.to_string(),
            });
            return Ok(FoundControl {
                matcher: "selector",
                selector: selector.to_string(),
            });
        }
    }

    if session.evaluate(&text_scan_script()).await? == serde_json::Value::Bool(true) {
        let selector = format!("[{BULK_MARKER}]");
        sink.emit(HarvestEvent::BulkControlFound {
            matcher: "text".into(),
            selector: selector.clone(),
        });
        return Ok(FoundControl {
            matcher: "text",
            selector,
        });
    }

    let elements: Vec<ClickableElement> = session
        .evaluate(&dump_script())
        .await
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let candidates = elements.len();
    sink.emit(HarvestEvent::ClickableElementsDumped { elements });
    Err(HarvestError::ControlNotFound { candidates })
}

/// Marks the first clickable element whose text carries a synonym.
/// Elements that also mention downloading win over bare matches.
fn text_scan_script() -> String {
    let words = serde_json::to_string(BULK_TEXT_SYNONYMS).unwrap_or_else(|_| "[]".into());
    format!(
        r#"(() => {{
  const words = {words};
  const ascii = /^[\x00-\x7f]+$/;
  const hit = (text) => words.some(w => ascii.test(w)
    ? new RegExp('\\b' + w + '\\b', 'i').test(text)
    : text.includes(w));
  const cue = /down|다운|저장|save/i;
  const els = Array.from(document.querySelectorAll({clickable}));
  const label = (el) => ((el.innerText || el.value || el.title || '') + '').trim();
  const found = els.find(el => hit(label(el)) && cue.test(label(el) + ' ' + (el.getAttribute('onclick') || '')))
    || els.find(el => hit(label(el)));
  if (!found) return false;
  found.setAttribute({marker}, '1');
  return true;
}})()"#,
        clickable = js_string(CLICKABLE),
        marker = js_string(BULK_MARKER),
    )
}

fn dump_script() -> String {
    format!(
        r#"Array.from(document.querySelectorAll({clickable})).map(el => ({{
  tag: el.tagName.toLowerCase(),
  class: typeof el.className === 'string' ? el.className : '',
  id: el.id || '',
  text: ((el.innerText || el.value || '') + '').trim().slice(0, 80)
}}))"#,
        clickable = js_string(CLICKABLE),
    )
}

/// Direct click, then scripted click, then a dispatched event.
pub async fn click_with_fallback(
    session: &dyn PageSession,
    selector: &str,
    sink: &dyn EventSink,
) -> HarvestResult<ClickMethod> {
    match session.click(selector).await {
        Ok(()) => return Ok(ClickMethod::Direct),
        Err(e) => sink.emit(HarvestEvent::ClickFailed {
            method: ClickMethod::Direct.as_str().into(),
            error: e.to_string(),
        }),
    }

    let target = js_string(selector);
    let attempts = [
        (ClickMethod::Scripted, "el.click();"),
        (
            ClickMethod::Dispatched,
            "el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window }));",
        ),
    ];
    for (method, action) in attempts {
        let script = format!(
            "(() => {{ const el = document.querySelector({target}); if (!el) return false; {action} return true; }})()"
        );
        match session.evaluate(&script).await {
            Ok(serde_json::Value::Bool(true)) => return Ok(method),
            Ok(other) => sink.emit(HarvestEvent::ClickFailed {
                method: method.as_str().into(),
                error: format!("element not clickable (returned {other})"),
            }),
            Err(e) => sink.emit(HarvestEvent::ClickFailed {
                method: method.as_str().into(),
                error: e.to_string(),
            }),
        }
    }

    Err(HarvestError::AutomationSession(format!(
        "every click method failed for {selector}"
    )))
}

/// Click one item's in-page download control and wait for its file.
pub async fn trigger_control(
    session: &dyn PageSession,
    locator: &ControlLocator,
    token: usize,
    dir: &Path,
    settings: &BulkSettings,
    sink: &dyn EventSink,
) -> HarvestResult<DownloadedFile> {
    let start = Instant::now();
    let watcher = DirectoryWatcher::snapshot(dir, settings).await?;
    session.set_download_dir(&absolute(dir)?).await?;

    let mark = format!(
        "(() => {{ const item = document.querySelectorAll({items})[{index}]; \
         const el = item && item.querySelector({control}); \
         if (!el) return false; el.setAttribute({marker}, {token}); return true; }})()",
        items = js_string(&locator.item_selector),
        index = locator.index,
        control = js_string(&locator.control_selector),
        marker = js_string(TARGET_MARKER),
        token = js_string(&token.to_string()),
    );
    if session.evaluate(&mark).await? != serde_json::Value::Bool(true) {
        return Err(HarvestError::ControlNotFound { candidates: 0 });
    }

    let selector = format!("[{TARGET_MARKER}=\"{token}\"]");
    click_with_fallback(session, &selector, sink).await?;

    let settled = watcher.wait_for_settled(1).await?;
    let (name, size) = settled
        .files
        .into_iter()
        .next()
        .ok_or(HarvestError::DownloadTimeout {
            waited_ms: settled.elapsed_ms,
        })?;

    Ok(DownloadedFile {
        path: watcher.dir().join(name),
        size_bytes: size,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Browsers want an absolute download directory.
fn absolute(dir: &Path) -> HarvestResult<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::testing::FakePage;

    fn fast() -> BulkSettings {
        BulkSettings {
            enabled: true,
            poll_interval_ms: 20,
            quiet_period_ms: 150,
            max_wait_ms: 3_000,
        }
    }

    #[tokio::test]
    async fn test_partial_download_settles_after_rename() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.jpg"), b"old").unwrap();
        let watcher = DirectoryWatcher::snapshot(tmp.path(), &fast()).await.unwrap();

        let dir = tmp.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(dir.join("report.pdf.crdownload"), b"partial").unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::rename(dir.join("report.pdf.crdownload"), dir.join("report.pdf")).unwrap();
        });

        let settled = watcher.wait_for_settled(1).await.unwrap();
        writer.await.unwrap();

        let names: Vec<&String> = settled.files.keys().collect();
        assert_eq!(names, vec!["report.pdf"]);
        assert_eq!(settled.files["report.pdf"], 7);
        assert!(settled.elapsed_ms >= 200);
    }

    #[tokio::test]
    async fn test_nothing_settles_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = BulkSettings {
            max_wait_ms: 120,
            ..fast()
        };
        let watcher = DirectoryWatcher::snapshot(tmp.path(), &settings).await.unwrap();
        std::fs::write(tmp.path().join("stuck.jpg.part"), b"x").unwrap();

        let err = watcher.wait_for_settled(1).await.unwrap_err();
        assert!(matches!(err, HarvestError::DownloadTimeout { waited_ms: 120 }));
        assert_eq!(err.error_type(), "DownloadTimeoutError");
    }

    #[test]
    fn test_partial_suffixes() {
        assert!(is_partial("a.jpg.crdownload"));
        assert!(is_partial("A.JPG.PART"));
        assert!(is_partial("x.tmp"));
        assert!(!is_partial("report.pdf"));
    }

    #[tokio::test]
    async fn test_selector_cascade_wins_over_text() {
        let page = FakePage::new("")
            .with_element("a[onclick*='allDown']")
            .with_text_control();
        let sink = MemorySink::new();
        let found = locate_control(&page, &sink).await.unwrap();
        assert_eq!(found.matcher, "selector");
        assert_eq!(found.selector, "a[onclick*='allDown']");
    }

    #[tokio::test]
    async fn test_text_heuristic_fallback() {
        let page = FakePage::new("").with_text_control();
        let sink = MemorySink::new();
        let found = locate_control(&page, &sink).await.unwrap();
        assert_eq!(found.matcher, "text");
        assert_eq!(found.selector, "[data-harvest-bulk]");
    }

    #[tokio::test]
    async fn test_missing_control_dumps_clickables() {
        let page = FakePage::new("").with_clickables(serde_json::json!([
            { "tag": "a", "class": "btn", "id": "", "text": "목록" },
            { "tag": "button", "class": "", "id": "print", "text": "인쇄" }
        ]));
        let sink = MemorySink::new();
        let err = locate_control(&page, &sink).await.unwrap_err();

        assert!(matches!(err, HarvestError::ControlNotFound { candidates: 2 }));
        let dumped = sink.events().into_iter().find_map(|e| match e {
            HarvestEvent::ClickableElementsDumped { elements } => Some(elements),
            _ => None,
        });
        assert_eq!(dumped.unwrap()[1].id, "print");
    }

    #[tokio::test]
    async fn test_click_falls_back_to_scripted() {
        let page = FakePage::new("").failing_direct_click().with_scripted_click();
        let sink = MemorySink::new();
        let method = click_with_fallback(&page, "#btnAllDown", &sink).await.unwrap();
        assert_eq!(method, ClickMethod::Scripted);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, HarvestEvent::ClickFailed { method, .. } if method == "direct")));
    }

    #[tokio::test]
    async fn test_every_click_method_failing() {
        let page = FakePage::new("").failing_direct_click();
        let sink = MemorySink::new();
        let err = click_with_fallback(&page, "#btnAllDown", &sink).await.unwrap_err();
        assert_eq!(err.error_type(), "AutomationSessionError");
    }

    #[tokio::test]
    async fn test_bulk_run_reports_settled_files() {
        let tmp = tempfile::tempdir().unwrap();
        let page = FakePage::new("")
            .with_element("#btnAllDown")
            .downloads_on_click(&[("a.jpg", "aaaa"), ("b.png", "bb")]);
        let sink = MemorySink::new();
        let settings = fast();

        let report = BulkDownloader::new(&settings, &sink).run(&page, tmp.path()).await;

        assert!(report.attempted);
        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.files, vec!["a.jpg".to_string(), "b.png".to_string()]);
        assert_eq!(report.control.as_deref(), Some("selector"));
        assert_eq!(report.click_method.as_deref(), Some("direct"));
    }

    #[tokio::test]
    async fn test_bulk_run_records_missing_control() {
        let tmp = tempfile::tempdir().unwrap();
        let page = FakePage::new("");
        let sink = MemorySink::new();
        let settings = fast();

        let report = BulkDownloader::new(&settings, &sink).run(&page, tmp.path()).await;

        assert!(report.attempted);
        assert!(!report.success);
        assert_eq!(report.error_type.as_deref(), Some("ControlNotFoundError"));
    }
}
