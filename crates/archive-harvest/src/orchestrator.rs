//! Acquisition orchestrator.
//!
//! One invocation validates the page reference, then folds over an ordered
//! strategy plan (catalog API, DOM extraction, alternate backend). Each
//! strategy either produces a result or defers to the next one.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alternate::{AlternateBackend, WebDriverBackend};
use crate::browser::{ChromiumSessionFactory, ContextProfile, PageSession, SessionFactory};
use crate::bulk::{self, BulkDownloader};
use crate::catalog::CatalogClient;
use crate::config::HarvestConfig;
use crate::dom::DomExtractor;
use crate::download::Downloader;
use crate::events::{EventSink, HarvestEvent, TracingSink};
use crate::resolver::{self, PageRef};
use crate::types::{
    AlternateReport, AssetDescriptor, BackendPreference, BulkReport, CrawlFailure, CrawlRequest,
    CrawlResult, DownloadOutcome, HarvestError, StrategyKind,
};

/// What a successful strategy produced.
#[derive(Debug, Default)]
pub struct Harvest {
    /// Descriptor count before de-duplication.
    pub links_found: usize,
    pub descriptors: Vec<AssetDescriptor>,
    pub outcomes: Vec<DownloadOutcome>,
    pub bulk: Option<BulkReport>,
    pub alternate: Option<AlternateReport>,
}

/// Result of one strategy.
#[derive(Debug)]
pub enum Outcome {
    CatalogHit(Vec<AssetDescriptor>),
    DomHit(Harvest),
    AutomationHit(AlternateReport),
    /// Try the next strategy.
    Defer(HarvestError),
    Failure(HarvestError),
}

/// Strategies tried for a backend preference, in order.
pub fn plan(backend: BackendPreference) -> &'static [StrategyKind] {
    match backend {
        BackendPreference::Auto => &[StrategyKind::Catalog, StrategyKind::Dom, StrategyKind::Alternate],
        BackendPreference::Primary => &[StrategyKind::Catalog, StrategyKind::Dom],
        BackendPreference::Alternate => &[StrategyKind::Alternate],
    }
}

/// Keep the first descriptor per URL. Descriptors without a URL are all kept.
pub fn dedupe_by_url(descriptors: Vec<AssetDescriptor>) -> Vec<AssetDescriptor> {
    let mut seen = HashSet::new();
    descriptors
        .into_iter()
        .filter(|d| match &d.url {
            Some(url) => seen.insert(url.clone()),
            None => true,
        })
        .collect()
}

#[derive(Debug, Default)]
struct CatalogFlags {
    attempted: bool,
    succeeded: bool,
}

/// Runs crawl invocations. Holds no per-invocation state.
pub struct Harvester {
    config: HarvestConfig,
    profile: ContextProfile,
    catalog: CatalogClient,
    downloader: Downloader,
    sessions: Arc<dyn SessionFactory>,
    alternate: Arc<dyn AlternateBackend>,
    sink: Arc<dyn EventSink>,
}

impl Harvester {
    /// Chromium sessions, the WebDriver alternate, and `tracing` diagnostics.
    pub fn new(config: HarvestConfig) -> Self {
        let profile = ContextProfile::from_config(&config);
        let sessions = Arc::new(ChromiumSessionFactory::new(config.browser.clone()));
        let alternate = Arc::new(WebDriverBackend::new(
            config.alternate.clone(),
            &config.browser,
            profile,
        ));
        Self::with_components(config, sessions, alternate, Arc::new(TracingSink))
    }

    pub fn with_components(
        config: HarvestConfig,
        sessions: Arc<dyn SessionFactory>,
        alternate: Arc<dyn AlternateBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            profile: ContextProfile::from_config(&config),
            catalog: CatalogClient::new(&config.http, &config.portal),
            downloader: Downloader::new(
                &config.http,
                &config.portal,
                &config.download.fallback_prefix,
            ),
            config,
            sessions,
            alternate,
            sink,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Run one invocation. Never panics past this boundary; every failure
    /// comes back as a [`CrawlFailure`] carrying the request.
    pub async fn crawl(&self, request: CrawlRequest) -> Result<CrawlResult, CrawlFailure> {
        let start = Instant::now();

        let page = match resolver::resolve(&request.page_url, &self.config.portal.domain) {
            Ok(page) => page,
            Err(e) => return Err(self.fail(e, request, start)),
        };
        self.sink.emit(HarvestEvent::CrawlStarted {
            url: page.url.to_string(),
            med_seq: page.med_seq.clone(),
        });

        let fallback_allowed = request.backend == BackendPreference::Auto;
        let mut flags = CatalogFlags::default();
        let mut deferred = None;

        for &strategy in plan(request.backend) {
            let outcome = match strategy {
                StrategyKind::Catalog => self.catalog_strategy(&page, &mut flags).await,
                StrategyKind::Dom => self.dom_strategy(&page, &request, fallback_allowed).await,
                StrategyKind::Alternate => self.alternate_strategy(&page, &request).await,
            };

            let harvest = match outcome {
                Outcome::Defer(reason) => {
                    self.sink.emit(HarvestEvent::StrategyDeferred {
                        strategy,
                        reason: reason.to_string(),
                    });
                    deferred = Some(reason);
                    continue;
                }
                Outcome::Failure(e) => return Err(self.fail(e, request, start)),
                Outcome::CatalogHit(images) => self.catalog_harvest(images, &request).await,
                Outcome::DomHit(harvest) => harvest,
                Outcome::AutomationHit(report) => Harvest {
                    alternate: Some(report),
                    ..Default::default()
                },
            };
            return Ok(self.assemble(strategy, harvest, &page, &request, flags, start));
        }

        let error = deferred.unwrap_or_else(|| {
            HarvestError::AutomationSession("no acquisition strategy was available".into())
        });
        Err(self.fail(error, request, start))
    }

    async fn catalog_strategy(&self, page: &PageRef, flags: &mut CatalogFlags) -> Outcome {
        let Some(med_seq) = &page.med_seq else {
            return Outcome::Defer(HarvestError::CatalogUnavailable(
                "page URL carries no medSeq".into(),
            ));
        };

        flags.attempted = true;
        self.sink.emit(HarvestEvent::CatalogRequested {
            med_seq: med_seq.clone(),
            endpoint: self.catalog.endpoint().to_string(),
        });

        let response = self.catalog.fetch(med_seq).await;
        if let Some(error) = response.error() {
            self.sink.emit(HarvestEvent::CatalogUnavailable {
                med_seq: med_seq.clone(),
                detail: error.to_string(),
            });
            return Outcome::Defer(error);
        }

        let images = response.images();
        self.sink.emit(HarvestEvent::CatalogResolved {
            med_seq: med_seq.clone(),
            assets: response.assets.len(),
            images: images.len(),
        });
        if images.is_empty() {
            return Outcome::Defer(HarvestError::CatalogUnavailable(
                "catalog listed no image files".into(),
            ));
        }

        flags.succeeded = true;
        Outcome::CatalogHit(images)
    }

    async fn dom_strategy(&self, page: &PageRef, request: &CrawlRequest, fallback_allowed: bool) -> Outcome {
        let extractor = DomExtractor::new(&self.config.browser, &self.profile, self.sink.as_ref());

        let mut session = match extractor.open(self.sessions.as_ref(), request.headless).await {
            Ok(session) => session,
            Err(e) => return self.session_failure(e, fallback_allowed),
        };

        let result = self
            .dom_session(&extractor, session.as_mut(), page, request)
            .await;
        extractor.teardown(session).await;

        match result {
            Ok(harvest) => Outcome::DomHit(harvest),
            Err(e) => self.session_failure(e, fallback_allowed),
        }
    }

    async fn dom_session(
        &self,
        extractor: &DomExtractor<'_>,
        session: &mut dyn PageSession,
        page: &PageRef,
        request: &CrawlRequest,
    ) -> Result<Harvest, HarvestError> {
        let mut descriptors = extractor.extract(session, &page.url).await?.into_descriptors();

        if let Some(med_seq) = &page.med_seq {
            let generic = self.catalog.fetch_generic(med_seq).await;
            match generic.error() {
                Some(error) => self.sink.emit(HarvestEvent::CatalogUnavailable {
                    med_seq: med_seq.clone(),
                    detail: error.to_string(),
                }),
                None => descriptors.extend(generic.images()),
            }
        }

        let links_found = descriptors.len();
        let descriptors = dedupe_by_url(descriptors);

        if !request.auto_download {
            return Ok(Harvest {
                links_found,
                descriptors,
                ..Default::default()
            });
        }

        let bulk = if self.config.bulk.enabled {
            let report = BulkDownloader::new(&self.config.bulk, self.sink.as_ref())
                .run(&*session, &request.download_path)
                .await;
            Some(report)
        } else {
            None
        };
        let satisfied: HashSet<String> = bulk
            .iter()
            .filter(|b| b.success)
            .flat_map(|b| b.files.iter().cloned())
            .collect();

        let outcomes = self
            .download_all(&descriptors, &request.download_path, Some(&*session), &satisfied)
            .await;

        Ok(Harvest {
            links_found,
            descriptors,
            outcomes,
            bulk,
            alternate: None,
        })
    }

    fn session_failure(&self, error: HarvestError, fallback_allowed: bool) -> Outcome {
        if fallback_allowed && matches!(error, HarvestError::AutomationSession(_)) {
            self.sink.emit(HarvestEvent::AlternateFallback {
                reason: error.to_string(),
            });
            Outcome::Defer(error)
        } else {
            Outcome::Failure(error)
        }
    }

    async fn alternate_strategy(&self, page: &PageRef, request: &CrawlRequest) -> Outcome {
        match self
            .alternate
            .run(&page.url, &request.download_path, request.headless)
            .await
        {
            Ok(report) => Outcome::AutomationHit(report),
            Err(e) => Outcome::Failure(e),
        }
    }

    /// Resolve each descriptor in order. Individual failures are recorded, never raised.
    async fn download_all(
        &self,
        descriptors: &[AssetDescriptor],
        dir: &Path,
        session: Option<&dyn PageSession>,
        satisfied: &HashSet<String>,
    ) -> Vec<DownloadOutcome> {
        let delay = Duration::from_millis(self.config.download.inter_download_delay_ms);
        let mut outcomes = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.iter().enumerate() {
            if satisfied.contains(&descriptor.file_name) {
                self.sink.emit(HarvestEvent::DescriptorSkipped {
                    file_name: descriptor.file_name.clone(),
                    reason: "already saved by bulk download".into(),
                });
                continue;
            }

            let outcome = match (&descriptor.url, descriptor.control(), session) {
                (Some(url), _, _) => {
                    self.sink.emit(HarvestEvent::DownloadStarted {
                        file_name: descriptor.file_name.clone(),
                        url: Some(url.clone()),
                    });
                    self.downloader.download(descriptor, dir).await
                }
                (None, Some(control), Some(session)) => {
                    self.sink.emit(HarvestEvent::DownloadStarted {
                        file_name: descriptor.file_name.clone(),
                        url: None,
                    });
                    let start = Instant::now();
                    match bulk::trigger_control(
                        session,
                        &control,
                        index,
                        dir,
                        &self.config.bulk,
                        self.sink.as_ref(),
                    )
                    .await
                    {
                        Ok(file) => DownloadOutcome::succeeded(
                            descriptor.clone(),
                            file.path,
                            file.size_bytes,
                            file.duration_ms,
                        ),
                        Err(e) => DownloadOutcome::failed(
                            descriptor.clone(),
                            e.to_string(),
                            Some(start.elapsed().as_millis() as u64),
                        ),
                    }
                }
                _ => {
                    let reason = "no download URL and no actionable in-page control";
                    self.sink.emit(HarvestEvent::DescriptorSkipped {
                        file_name: descriptor.file_name.clone(),
                        reason: reason.into(),
                    });
                    outcomes.push(DownloadOutcome::failed(descriptor.clone(), reason, None));
                    continue;
                }
            };

            if outcome.success {
                self.sink.emit(HarvestEvent::DownloadFinished {
                    file_name: descriptor.file_name.clone(),
                    size_bytes: outcome.size_bytes.unwrap_or(0),
                    duration_ms: outcome.duration_ms.unwrap_or(0),
                });
            } else {
                self.sink.emit(HarvestEvent::DownloadFailed {
                    file_name: descriptor.file_name.clone(),
                    error: outcome.error_message.clone().unwrap_or_default(),
                });
            }
            let pause = outcome.success && index + 1 < descriptors.len();
            outcomes.push(outcome);
            if pause {
                tokio::time::sleep(delay).await;
            }
        }
        outcomes
    }

    /// Catalog descriptors are all direct links; no session is involved.
    async fn catalog_harvest(&self, images: Vec<AssetDescriptor>, request: &CrawlRequest) -> Harvest {
        let links_found = images.len();
        let descriptors = dedupe_by_url(images);
        let outcomes = if request.auto_download {
            self.download_all(&descriptors, &request.download_path, None, &HashSet::new())
                .await
        } else {
            Vec::new()
        };
        Harvest {
            links_found,
            descriptors,
            outcomes,
            ..Default::default()
        }
    }

    fn assemble(
        &self,
        strategy: StrategyKind,
        harvest: Harvest,
        page: &PageRef,
        request: &CrawlRequest,
        flags: CatalogFlags,
        start: Instant,
    ) -> CrawlResult {
        let duration_ms = start.elapsed().as_millis() as u64;
        self.sink.emit(HarvestEvent::CrawlFinished {
            strategy,
            descriptors: harvest.descriptors.len(),
            downloads: harvest.outcomes.iter().filter(|o| o.success).count(),
            duration_ms,
        });

        CrawlResult {
            source_url: page.url.to_string(),
            duration_ms,
            strategy,
            links_found: harvest.links_found,
            descriptors: harvest.descriptors,
            download_outcomes: harvest.outcomes,
            auto_download: request.auto_download,
            catalog_attempted: flags.attempted,
            catalog_succeeded: flags.succeeded,
            bulk: harvest.bulk,
            alternate: harvest.alternate,
        }
    }

    fn fail(&self, error: HarvestError, request: CrawlRequest, start: Instant) -> CrawlFailure {
        self.sink.emit(HarvestEvent::CrawlFailed {
            error_type: error.error_type().to_string(),
            error: error.to_string(),
        });
        CrawlFailure {
            error: error.to_string(),
            error_type: error.error_type().to_string(),
            request,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
