//! One case lookup from portal home page to persisted record.
//!
//! The search phase (navigation, CNR entry, CAPTCHA, search) is mandatory:
//! any failure there aborts the run. Everything after it degrades instead.
//! Missing sections become gaps, failed downloads become failures, and
//! whatever was obtained is written to the case directory.

use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::extract::{self, sections};
use crate::history;
use crate::locator;
use crate::modal::{self, ModalTimings, Trigger};
use crate::profile::PortalProfile;
use crate::renderer::PageDriver;
use crate::report::{ExtractionGap, GapKind, RunReport};
use crate::retriever::{self, transfer, Fetcher};
use crate::session::Session;
use crate::sink::{export, RecordSink};
use crate::solver::{CaptchaSolver, SolverAdapter};
use crate::storage::CaseStorage;
use crate::types::CaseRecord;
use crate::wait;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct CaseRun {
    pub record: CaseRecord,
    pub report: RunReport,
    pub storage: CaseStorage,
}

/// Runs case lookups against one portal profile.
pub struct Harvester {
    profile: PortalProfile,
    config: HarvestConfig,
    solver: SolverAdapter,
    sink: Option<Arc<dyn RecordSink>>,
    fetcher: Fetcher,
}

impl Harvester {
    pub fn new(
        profile: PortalProfile,
        config: HarvestConfig,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(config.transfer_timeout(), config.concurrency())?;
        let solver = SolverAdapter::new(solver).with_attempts(config.solver_attempts);
        Ok(Self {
            profile,
            config,
            solver,
            sink: None,
            fetcher,
        })
    }

    /// Persist records through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn profile(&self) -> &PortalProfile {
        &self.profile
    }

    /// Look up `cnr` through `driver`.
    ///
    /// Fails only when the search phase fails or the deadline passes. In the
    /// latter case the report is still written with `error` set.
    pub async fn run(&self, driver: Arc<dyn PageDriver>, cnr: &str) -> Result<CaseRun> {
        let session = Session::new(cnr, driver, self.config.deadline());
        let mut report = RunReport::new(cnr, self.profile.kind);
        info!(cnr, portal = %self.profile.kind, "case lookup started");

        self.search(&session, cnr).await?;

        let mut record = CaseRecord::new();
        self.read_record(&session, &mut record, &mut report).await?;
        record.ensure_identifier(cnr);
        report.fields = record.len();

        let storage = CaseStorage::new(
            &self.config.output_root,
            record.identifier().unwrap_or_default(),
        );
        storage.create()?;
        export::write_csv(&record, &storage.csv_path())?;
        self.persist(&record, &mut report);

        let tail = self.collect_artifacts(&session, &storage, &mut report).await;
        if let Err(e) = &tail {
            warn!(cnr, error = %e, "run aborted after extraction");
            report.error = Some(e.to_string());
        }
        report.finish();
        report.write(&storage.report_path())?;
        tail?;

        info!(
            cnr,
            fields = report.fields,
            gaps = report.gaps.len(),
            documents = report.documents.len(),
            "case lookup finished"
        );
        Ok(CaseRun {
            record,
            report,
            storage,
        })
    }

    async fn settle(&self) {
        let pause = self.config.settle();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    /// Drive the portal to the results view.
    async fn search(&self, session: &Session, cnr: &str) -> Result<()> {
        let driver = session.driver();
        let p = &self.profile;
        let locate = self.config.locate_timeout();

        let nav = driver
            .navigate(&p.home_url, session.budget(self.config.navigation_timeout())?)
            .await?;
        info!(url = %nav.final_url, load_ms = nav.load_time_ms, "portal loaded");

        if !p.entry_link.is_empty() {
            locator::click(driver, &p.entry_link, session.budget(locate)?).await?;
            self.settle().await;
        }

        locator::fill(driver, &p.cnr_input, cnr, session.budget(locate)?).await?;

        let image = match locator::resolve(driver, &p.captcha_image, session.budget(locate)?).await {
            Ok(handle) => driver.screenshot(Some(handle)).await?,
            Err(HarvestError::ElementNotFound { .. }) => {
                warn!("captcha image not found, using a page screenshot");
                driver.screenshot(None).await?
            }
            Err(e) => return Err(e),
        };
        let token = self.solver.solve(&image).await?;
        locator::fill(driver, &p.captcha_input, &token, session.budget(locate)?).await?;

        match locator::click(driver, &p.search_button, session.budget(locate)?).await {
            Ok(_) => {}
            Err(HarvestError::ElementNotFound { attempted, last_error }) => match &p.search_script {
                Some(script) => {
                    warn!("search button not found, invoking the search script");
                    driver.execute_script(script).await?;
                }
                None => return Err(HarvestError::ElementNotFound { attempted, last_error }),
            },
            Err(e) => return Err(e),
        }
        self.settle().await;

        if !p.result_link.is_empty() {
            locator::click(driver, &p.result_link, session.budget(locate)?).await?;
            self.settle().await;
        }

        wait::wait_for(driver, &p.results_ready, session.budget(locate)?).await?;
        info!("results view ready");
        Ok(())
    }

    fn modal_timings(&self, session: &Session) -> Result<ModalTimings> {
        Ok(ModalTimings {
            locate: session.budget(ModalTimings::default().locate)?,
            visible: session.budget(self.config.modal_timeout())?,
            ..ModalTimings::default()
        })
    }

    /// Title, sections and overlay sections folded into `record`.
    async fn read_record(
        &self,
        session: &Session,
        record: &mut CaseRecord,
        report: &mut RunReport,
    ) -> Result<()> {
        let driver = session.driver();
        let p = &self.profile;

        if let Some(title) = &p.title {
            let locate = session.budget(self.config.locate_timeout())?;
            if let Some(gap) = sections::read_title(driver, title, locate, record).await? {
                report.gaps.push(gap);
            }
        }

        let locate = session.budget(self.config.locate_timeout())?;
        let gaps = sections::read_sections(driver, &p.sections, locate, record).await?;
        report.gaps.extend(gaps);

        for spec in &p.modals {
            let mut outcome = modal::run(
                driver,
                &spec.name,
                Trigger::Locate(&spec.trigger),
                &spec.container,
                &spec.close,
                self.modal_timings(session)?,
                |handle| extract::extract(driver, handle, spec.schema, ""),
            )
            .await?;
            record.merge(std::mem::take(&mut outcome.fragment), Some(&spec.prefix));
            if let Some(gap) = outcome.gap.clone() {
                report.gaps.push(gap);
            }
            report.modals.push(outcome);
        }
        Ok(())
    }

    fn persist(&self, record: &CaseRecord, report: &mut RunReport) {
        let Some(sink) = &self.sink else {
            return;
        };
        match sink.upsert(record) {
            Ok(outcome) => {
                info!(outcome = ?outcome, "record persisted");
                report.persistence = Some(outcome);
            }
            Err(e) => {
                warn!(error = %e, "record could not be persisted");
                report.persistence_error = Some(e.to_string());
            }
        }
    }

    /// Documents and business history. Only the deadline aborts this phase.
    async fn collect_artifacts(
        &self,
        session: &Session,
        storage: &CaseStorage,
        report: &mut RunReport,
    ) -> Result<()> {
        let driver = session.driver();
        let p = &self.profile;

        for step in &p.documents.reveal {
            let locate = session.budget(self.config.locate_timeout())?;
            let revealed = async {
                locator::click(driver, &step.control, locate).await?;
                wait::wait_for(driver, &step.wait_for, locate).await
            };
            match revealed.await {
                Ok(_) => self.settle().await,
                Err(HarvestError::DeadlineExceeded) => return Err(HarvestError::DeadlineExceeded),
                Err(e) => {
                    warn!(step = %step.name, error = %e, "reveal step failed");
                    report.gaps.push(ExtractionGap::new(
                        &step.name,
                        match e {
                            HarvestError::ElementNotFound { .. } => GapKind::Missing,
                            other => GapKind::Unreadable {
                                reason: other.to_string(),
                            },
                        },
                    ));
                }
            }
        }

        session.check_deadline()?;
        let page_html = driver.page_html().await?;
        let page_url = url::Url::parse(&driver.current_url().await?)?;
        let links = sections::collect_document_links(&page_html, &p.documents)?;
        let (refs, failures) = retriever::plan(&links, &page_url, &p.documents);
        report.download_failures.extend(failures);

        if !refs.is_empty() {
            let cookies = session.snapshot_cookies().await?;
            let remaining = session.remaining();
            let documents_dir = storage.documents_dir();
            let transfers =
                self.fetcher
                    .fetch_all(&refs, &cookies, Some(page_url.as_str()), &documents_dir);
            let (saved, failed) = match remaining {
                Some(left) => match tokio::time::timeout(left, transfers).await {
                    Ok(done) => done,
                    Err(_) => {
                        let removed = transfer::remove_partials(&documents_dir).await?;
                        warn!(removed, "deadline reached during document retrieval");
                        return Err(HarvestError::DeadlineExceeded);
                    }
                },
                None => transfers.await,
            };
            info!(saved = saved.len(), failed = failed.len(), "documents retrieved");
            report.documents.extend(saved);
            report.download_failures.extend(failed);
        }

        if let (Some(spec), false) = (&p.history, self.config.skip_history) {
            let timings = self.modal_timings(session)?;
            match history::capture(driver, spec, storage, timings).await {
                Ok(Some(note)) => {
                    report.history_file = note
                        .path
                        .as_ref()
                        .and_then(|path| path.file_name())
                        .map(|name| name.to_string_lossy().into_owned());
                    if let Some(gap) = note.modal.gap.clone() {
                        report.gaps.push(gap);
                    }
                    report.modals.push(note.modal);
                }
                Ok(None) => {}
                Err(HarvestError::DeadlineExceeded) => return Err(HarvestError::DeadlineExceeded),
                Err(e) => {
                    warn!(error = %e, "business history unreadable");
                    report.gaps.push(ExtractionGap::new(
                        "history",
                        GapKind::Unreadable {
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }
}
