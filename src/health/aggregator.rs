//! Orchestration of one health evaluation.
//!
//! An evaluation moves through `Init -> Probing -> Aggregating -> Rendered`
//! and never revisits a phase. A fatal datastore failure during probing skips
//! the remaining probes and goes straight to aggregation with a forced
//! non-OK status.
//!
//! Two signals leave an evaluation: the HTTP status code and the JSON
//! `status` field. They are allowed to diverge. A slow but working instance
//! answers 416 with `status: OK`, and errors in both the datastore and the
//! cache read as WARN even when the code says 200.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use http::StatusCode;
use serde_json::Value;

use crate::config::DEFAULT_SLOW_THRESHOLD_SECS;
use crate::error::HealthError;

use super::build_info::BuildInfoReader;
use super::cache::{CacheProbe, ObjectCache, CACHE_NAMESPACE, CACHE_SLUG_PREFIX};
use super::datastore::{DatastoreHandles, DatastoreSession, DATASTORE_NAMESPACE};
use super::errors::ErrorCollector;
use super::hooks::{HookRegistry, Payload};
use super::platform::{DisabledRunner, PlatformProbe};
use super::request::{HealthRequest, OutputFormat};
use super::runtime::RuntimeProbe;
use super::timer::Timer;
use super::{Section, SectionResult, Status, STATUS_UNKNOWN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Probing,
    Aggregating,
    Rendered,
}

/// State of a single evaluation, owned by the checker for one request.
#[derive(Debug)]
pub struct HealthEvaluation {
    request: HealthRequest,
    started_at: DateTime<Utc>,
    timer: Timer,
    phase: Phase,
    sections: BTreeMap<Section, Option<SectionResult>>,
    summary_status: Option<Status>,
    top_level_message: Option<String>,
    http_status: StatusCode,
    /// Code the summary status is derived from; differs from `http_status`
    /// only for slow responses
    summary_code: StatusCode,
    datastore_errors: ErrorCollector,
    cache_errors: ErrorCollector,
}

impl HealthEvaluation {
    fn new(request: HealthRequest, timer: Timer) -> Self {
        Self {
            request,
            started_at: Utc::now(),
            timer,
            phase: Phase::Init,
            sections: Section::ALL.into_iter().map(|s| (s, None)).collect(),
            summary_status: None,
            top_level_message: None,
            http_status: StatusCode::OK,
            summary_code: StatusCode::OK,
            datastore_errors: ErrorCollector::new(DATASTORE_NAMESPACE),
            cache_errors: ErrorCollector::new(CACHE_NAMESPACE),
        }
    }

    pub fn request(&self) -> &HealthRequest {
        &self.request
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> f64 {
        self.timer.elapsed()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn section(&self, section: Section) -> Option<&SectionResult> {
        self.sections.get(&section).and_then(Option::as_ref)
    }

    /// Set once the evaluation reaches `Aggregating`.
    pub fn summary_status(&self) -> Option<Status> {
        self.summary_status
    }

    pub fn top_level_message(&self) -> Option<&str> {
        self.top_level_message.as_deref()
    }

    pub fn http_status(&self) -> StatusCode {
        self.http_status
    }

    pub fn datastore_errors(&self) -> &ErrorCollector {
        &self.datastore_errors
    }

    pub fn cache_errors(&self) -> &ErrorCollector {
        &self.cache_errors
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, elapsed = self.timer.elapsed(), "Health evaluation phase");
        self.phase = phase;
    }

    fn set_section(&mut self, section: Section, result: SectionResult) {
        tracing::debug!(section = %section, elapsed = self.timer.elapsed(), "Section complete");
        self.sections.insert(section, Some(result));
    }

    fn fail(&mut self, error: HealthError) {
        tracing::error!(status = error.status().as_u16(), error = %error, "Health evaluation short-circuited");
        self.http_status = error.status();
        self.summary_code = error.status();
        self.top_level_message = Some(error.to_string());
    }

    fn check_latency(&mut self, threshold: f64) {
        if !self.timer.is_slow(threshold) {
            return;
        }
        let elapsed = self.timer.elapsed();
        tracing::warn!(elapsed, threshold, "Health evaluation was slow");
        // The code signals degradation; the summary keeps reading OK
        self.http_status = StatusCode::RANGE_NOT_SATISFIABLE;
        self.summary_code = StatusCode::OK;
        self.top_level_message = Some(format!(
            "Application loaded, but the response time is slow. Current response is {:.3}s.",
            elapsed
        ));
    }

    fn summarize(&mut self) -> Status {
        let status = Status::summarize(
            self.summary_code.as_u16(),
            &self.datastore_errors,
            &self.cache_errors,
        );
        self.summary_status = Some(status);
        status
    }

    fn payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(
            "errors".to_string(),
            self.top_level_message
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        for (section, result) in &self.sections {
            let value = result
                .clone()
                .map(SectionResult::into_value)
                .unwrap_or(Value::Null);
            payload.insert(section.key().to_string(), value);
        }
        payload.insert(
            "status".to_string(),
            Value::from(self.summary_status.unwrap_or(Status::Unknown).as_str()),
        );
        payload
    }
}

/// The outcome handed to the rendering layer.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub http_status: StatusCode,
    pub summary: Status,
    pub format: OutputFormat,
    pub payload: Payload,
    pub elapsed: f64,
}

impl HealthReport {
    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(&self.payload)
        } else {
            serde_json::to_string(&self.payload)
        }
    }
}

/// Runs evaluations against a fixed set of probes.
pub struct HealthChecker {
    datastore: DatastoreHandles,
    cache: Arc<dyn ObjectCache>,
    runtime: RuntimeProbe,
    build: BuildInfoReader,
    platform: PlatformProbe,
    hooks: HookRegistry,
    slow_threshold: f64,
}

impl HealthChecker {
    pub fn new(datastore: DatastoreHandles, cache: Arc<dyn ObjectCache>) -> Self {
        Self {
            datastore,
            cache,
            runtime: RuntimeProbe::new(None),
            build: BuildInfoReader::new(crate::config::DEFAULT_BUILD_ROOT),
            platform: PlatformProbe::new(None, None, Vec::new(), Box::new(DisabledRunner)),
            hooks: HookRegistry::new(),
            slow_threshold: DEFAULT_SLOW_THRESHOLD_SECS,
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeProbe) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_build_info(mut self, build: BuildInfoReader) -> Self {
        self.build = build;
        self
    }

    pub fn with_platform(mut self, platform: PlatformProbe) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_slow_threshold(mut self, seconds: f64) -> Self {
        self.slow_threshold = seconds;
        self
    }

    /// Evaluate once. `started` is when the request arrived.
    pub async fn evaluate(&self, request: HealthRequest, started: Instant) -> HealthReport {
        let mut evaluation = HealthEvaluation::new(request, Timer::starting_at(started));
        tracing::debug!(sections = ?evaluation.request.sections, "Health evaluation started");

        evaluation.enter(Phase::Probing);
        match self.probe(&mut evaluation).await {
            Ok(()) => evaluation.check_latency(self.slow_threshold),
            Err(fatal) => evaluation.fail(fatal),
        }

        evaluation.enter(Phase::Aggregating);
        let summary = evaluation.summarize();
        let mut payload = evaluation.payload();
        self.hooks.run(&evaluation, &mut payload);

        evaluation.enter(Phase::Rendered);
        let elapsed = evaluation.elapsed();
        tracing::info!(
            http_status = evaluation.http_status.as_u16(),
            status = %summary,
            started_at = %evaluation.started_at.to_rfc3339(),
            elapsed,
            "Health evaluation finished"
        );

        HealthReport {
            http_status: evaluation.http_status,
            summary,
            format: evaluation.request.format,
            payload,
            elapsed,
        }
    }

    async fn probe(&self, evaluation: &mut HealthEvaluation) -> Result<(), HealthError> {
        let mut session = sandboxed(self.datastore.connect(&mut evaluation.datastore_errors))
            .await
            .map_err(|panic| HealthError::unavailable(format!("Datastore probe panicked: {}", panic)))??;

        // The mysql section runs after the other datastore users so its
        // query count covers the whole evaluation
        if evaluation.request.wants(Section::ObjectCache) {
            let result = self.probe_cache(evaluation, &mut session).await;
            evaluation.set_section(Section::ObjectCache, result);
        }

        if evaluation.request.wants(Section::Wp) {
            let elevated = evaluation.request.elevated;
            let result = sandboxed(self.platform.probe(&mut session, elevated))
                .await
                .unwrap_or_else(|panic| error_section(Section::Wp, &panic));
            evaluation.set_section(Section::Wp, result);
        }

        if evaluation.request.wants(Section::Mysql) {
            let result = self.probe_datastore(evaluation, &mut session).await;
            evaluation.set_section(Section::Mysql, result);
        }

        if evaluation.request.wants(Section::Php) {
            let result = sandboxed(async { self.runtime.probe() })
                .await
                .unwrap_or_else(|panic| error_section(Section::Php, &panic));
            evaluation.set_section(Section::Php, result);
        }

        if evaluation.request.wants(Section::Build) {
            let result = sandboxed(async { self.build.probe() })
                .await
                .unwrap_or_else(|panic| error_section(Section::Build, &panic));
            evaluation.set_section(Section::Build, result);
        }

        tracing::debug!(
            queries = session.query_count(),
            fallback = session.used_fallback(),
            "Probing complete"
        );
        Ok(())
    }

    async fn probe_datastore(
        &self,
        evaluation: &mut HealthEvaluation,
        session: &mut DatastoreSession,
    ) -> SectionResult {
        let errors = &mut evaluation.datastore_errors;
        match sandboxed(session.probe(errors)).await {
            Ok(result) => result,
            Err(panic) => {
                errors.add(format!("{}-probe-panicked", DATASTORE_NAMESPACE), panic);
                collector_section(errors)
            }
        }
    }

    async fn probe_cache(
        &self,
        evaluation: &mut HealthEvaluation,
        session: &mut DatastoreSession,
    ) -> SectionResult {
        let flush = evaluation.request.should_flush();
        if evaluation.request.flush_requested && !flush {
            tracing::warn!("Cache flush requested without elevated privilege, ignoring");
        }
        let errors = &mut evaluation.cache_errors;
        let probe = CacheProbe::new(self.cache.as_ref());
        match sandboxed(probe.probe(session, errors, flush)).await {
            Ok(result) => result,
            Err(panic) => {
                errors.add(format!("{}-probe-panicked", CACHE_SLUG_PREFIX), panic);
                collector_section(errors)
            }
        }
    }
}

/// Run a probe, turning a panic into its message.
async fn sandboxed<F, T>(probe: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(probe)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Section for a probe that recorded into a collector but could not finish.
fn collector_section(errors: &ErrorCollector) -> SectionResult {
    let mut result = SectionResult::new();
    result.insert("errors", errors.all());
    result.insert("status", STATUS_UNKNOWN);
    result
}

/// Section for an informational probe that could not finish.
fn error_section(section: Section, panic: &str) -> SectionResult {
    tracing::warn!(section = %section, panic, "Health probe panicked");
    let mut result = SectionResult::new();
    result.insert("error", format!("Error: {} probe failed; {}", section, panic));
    result
}
