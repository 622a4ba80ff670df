use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::embedding_extractor::EmbeddingExtractor;
use crate::detection::domain::person_tracker::{PersonTracker, TrackedPerson};
use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::identity::HumanIdentity;
use crate::resolution::identity_resolver::{
    IdentityResolver, RefreshError, RefreshOutcome, Resolution,
};
use crate::resolution::session_state::SessionState;
use crate::shared::config::ReidConfig;
use crate::shared::constants::{
    DEFAULT_DEGRADED_AFTER_STORE_FAILURES, DEFAULT_DETECTION_CONFIDENCE, DEFAULT_REFRESH_INTERVAL,
};
use crate::shared::frame::Frame;
use crate::shared::validation::ValidationError;
use crate::video::domain::frame_source::FrameSource;

use super::scan_error::ScanError;
use super::scan_logger::ScanLogger;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub detection_confidence: f64,
    /// Gallery refresh runs on frames whose 0-based index is a multiple of this.
    pub refresh_interval: usize,
    /// `0` disables the degraded-mode signal.
    pub degraded_after_store_failures: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            detection_confidence: DEFAULT_DETECTION_CONFIDENCE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            degraded_after_store_failures: DEFAULT_DEGRADED_AFTER_STORE_FAILURES,
        }
    }
}

impl From<&ReidConfig> for ScanConfig {
    fn from(config: &ReidConfig) -> Self {
        Self {
            detection_confidence: config.detection_confidence,
            refresh_interval: config.refresh_interval,
            degraded_after_store_failures: config.degraded_after_store_failures,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.refresh_interval == 0 {
            return Err(ValidationError::InvalidRefreshInterval);
        }
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(ValidationError::InvalidConfidence(
                self.detection_confidence,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Completed,
    Aborted,
}

/// Outcome of one completed scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Distinct identities observed in the video.
    pub identities: BTreeSet<HumanIdentity>,
    /// Tracker ids that resolved to each identity; above one when a person
    /// left and re-entered the scene or the tracker lost them.
    pub tracks_per_identity: BTreeMap<HumanIdentity, usize>,
    pub frames_scanned: usize,
    pub detections: usize,
    /// Detections dropped because extraction or resolution failed.
    pub skipped_detections: usize,
    pub store_failures: usize,
    /// Set once consecutive store failures crossed the configured limit;
    /// identities may then be over-minted.
    pub degraded: bool,
    pub minted: usize,
    pub matched: usize,
    /// Refreshes that changed a gallery.
    pub refreshes: usize,
}

/// Scans videos for people and resolves each tracked person to a
/// persistent identity.
///
/// Reusable: every `execute` opens the source afresh, resets the tracker
/// and starts a new session. Several use cases may share one resolver to
/// scan different videos concurrently.
pub struct ScanVideoUseCase {
    source: Box<dyn FrameSource>,
    tracker: Box<dyn PersonTracker>,
    extractor: Box<dyn EmbeddingExtractor>,
    resolver: Arc<IdentityResolver>,
    config: ScanConfig,
    logger: Box<dyn ScanLogger>,
    cancelled: Arc<AtomicBool>,
    state: ScanState,
}

impl ScanVideoUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        tracker: Box<dyn PersonTracker>,
        extractor: Box<dyn EmbeddingExtractor>,
        resolver: Arc<IdentityResolver>,
        config: ScanConfig,
        logger: Box<dyn ScanLogger>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            source,
            tracker,
            extractor,
            resolver,
            config,
            logger,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
            state: ScanState::Idle,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Setting the flag stops the scan at the next frame boundary. The
    /// scan it stops clears it again, so the next `execute` runs normally.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Scans the video at `path` to the end.
    ///
    /// On error the partial identity set is discarded; identities already
    /// minted stay in the gallery store.
    pub fn execute(&mut self, path: &Path) -> Result<ScanReport, ScanError> {
        self.state = ScanState::Idle;
        self.config.validate()?;

        let metadata = match self.source.open(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                return Err(self.abort(ScanError::SourceUnavailable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }))
            }
        };
        self.tracker.reset();

        let result = self.scan(metadata.total_frames);
        self.source.close();

        match result {
            Ok(report) => {
                self.state = ScanState::Completed;
                log::info!(
                    "Scan of {} completed: {} frames, {} identities",
                    path.display(),
                    report.frames_scanned,
                    report.identities.len()
                );
                self.logger.summary();
                Ok(report)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn abort(&mut self, error: ScanError) -> ScanError {
        if matches!(error, ScanError::Cancelled) {
            self.cancelled.store(false, Ordering::Relaxed);
        }
        self.state = ScanState::Aborted;
        log::error!("Scan aborted: {error}");
        self.logger.summary();
        error
    }

    fn scan(&mut self, total_frames: usize) -> Result<ScanReport, ScanError> {
        let mut session = SessionState::new(self.config.degraded_after_store_failures);
        let mut report = ScanReport::default();
        let mut observer = FrameObserver {
            tracker: self.tracker.as_mut(),
            extractor: self.extractor.as_ref(),
            resolver: &self.resolver,
            config: &self.config,
            logger: self.logger.as_mut(),
        };

        let mut frames = self.source.frames();
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(ScanError::Cancelled);
            }
            let Some(item) = frames.next() else {
                break;
            };
            let frame = item.map_err(|e| ScanError::FrameRead {
                frame: session.frames_started(),
                message: e.to_string(),
            })?;
            if self.state == ScanState::Idle {
                self.state = ScanState::Scanning;
                log::info!("Scanning started");
            }

            let frame_index = session.begin_frame();
            observer.process(&frame, frame_index, &mut session, &mut report)?;
            observer.logger.progress(frame_index + 1, total_frames);
        }

        report.frames_scanned = session.frames_started();
        report.store_failures = session.store_failures();
        report.degraded = session.is_degraded();
        report.identities = session.tracks_per_identity().keys().cloned().collect();
        report.tracks_per_identity = session.tracks_per_identity().clone();
        Ok(report)
    }
}

/// Borrowed collaborators for the per-frame work, split from the use case
/// so the frame iterator can hold the source mutably at the same time.
struct FrameObserver<'a> {
    tracker: &'a mut dyn PersonTracker,
    extractor: &'a dyn EmbeddingExtractor,
    resolver: &'a IdentityResolver,
    config: &'a ScanConfig,
    logger: &'a mut dyn ScanLogger,
}

impl FrameObserver<'_> {
    fn process(
        &mut self,
        frame: &Frame,
        frame_index: usize,
        session: &mut SessionState,
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let started = Instant::now();
        let people = match self.tracker.track(frame, self.config.detection_confidence) {
            Ok(people) => people,
            Err(e) => {
                let err = DetectionError::Tracker {
                    frame: frame_index,
                    message: e.to_string(),
                };
                log::warn!("{err}; skipping frame");
                return Ok(());
            }
        };
        self.logger.timing("track", elapsed_ms(started));

        let refresh_due = frame_index % self.config.refresh_interval == 0;
        for person in &people {
            report.detections += 1;

            let started = Instant::now();
            let (crop, embedding) = match self.observe(frame, person) {
                Ok(observation) => observation,
                Err(e) => {
                    log::warn!("Frame {frame_index}: {e}; skipping detection");
                    report.skipped_detections += 1;
                    self.logger.count("skipped");
                    continue;
                }
            };
            self.logger.timing("embed", elapsed_ms(started));

            let started = Instant::now();
            let resolved = self
                .resolver
                .resolve(session, person.track_id, &crop, &embedding);
            let resolution = match resolved {
                Ok(resolution) => resolution,
                Err(e) if e.is_fatal() => return Err(ScanError::Store(e)),
                Err(e) => {
                    log::warn!(
                        "Frame {frame_index}: resolving track {} failed: {e}",
                        person.track_id
                    );
                    session.record_store_failure();
                    report.skipped_detections += 1;
                    self.logger.count("store_failures");
                    continue;
                }
            };
            self.logger.timing("resolve", elapsed_ms(started));

            match &resolution {
                Resolution::Cached(_) => {}
                Resolution::Matched { .. } => {
                    session.record_store_success();
                    report.matched += 1;
                    self.logger.count("matched");
                }
                Resolution::Minted(_) => {
                    session.record_store_success();
                    report.minted += 1;
                    self.logger.count("minted");
                }
            }

            // A just-minted identity already holds this observation.
            if refresh_due && !resolution.is_minted() {
                self.refresh(resolution.identity(), &crop, &embedding, session, report)?;
            }
        }
        Ok(())
    }

    fn observe(
        &self,
        frame: &Frame,
        person: &TrackedPerson,
    ) -> Result<(Frame, Embedding), DetectionError> {
        let track = person.track_id;
        let crop = frame
            .crop(&person.bbox)
            .ok_or(DetectionError::EmptyCrop { track })?;
        let values = self
            .extractor
            .extract(&crop)
            .map_err(|e| DetectionError::Embedding {
                track,
                message: e.to_string(),
            })?;
        Ok((crop, Embedding::new(values)?))
    }

    fn refresh(
        &mut self,
        identity: &HumanIdentity,
        crop: &Frame,
        embedding: &Embedding,
        session: &mut SessionState,
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let started = Instant::now();
        match self.resolver.refresh_if_novel(identity, crop, embedding) {
            Ok(outcome) => {
                session.record_store_success();
                if outcome != RefreshOutcome::Unchanged {
                    report.refreshes += 1;
                    self.logger.count("refreshes");
                }
            }
            Err(RefreshError::Store(e)) if e.is_fatal() => return Err(ScanError::Store(e)),
            Err(RefreshError::Store(e)) => {
                log::warn!("Gallery refresh for {identity} failed: {e}");
                session.record_store_failure();
                self.logger.count("store_failures");
            }
            Err(e) => log::warn!("Gallery refresh for {identity} skipped: {e}"),
        }
        self.logger.timing("refresh", elapsed_ms(started));
        Ok(())
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
