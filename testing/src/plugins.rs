//! Plugins that record the hooks they receive.

use reqflow_core::error::ServiceError;
use reqflow_core::plugin::{HookOutcome, Plugin, ServiceFn, ServiceFuture};
use reqflow_core::state::PartialState;
use reqflow_core::sync::lock;
use std::sync::{Arc, Mutex};

/// One hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookCall {
    /// `on_init`
    Init,
    /// `on_before`
    Before,
    /// `on_request`
    Request,
    /// `on_success`
    Success,
    /// `on_error`
    Error,
    /// `on_finally`
    Finally,
    /// `on_cancel`
    Cancel,
    /// `on_mutate`
    Mutate,
    /// `on_teardown`
    Teardown,
}

/// A log shared by several [`RecordingPlugin`]s, so tests can assert the
/// order hooks were dispatched across plugins.
#[derive(Debug, Clone, Default)]
pub struct HookLog {
    entries: Arc<Mutex<Vec<(&'static str, HookCall)>>>,
}

impl HookLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A plugin named `name` that records into this log.
    #[must_use]
    pub fn plugin<P, T>(&self, name: &'static str) -> RecordingPlugin<P, T> {
        RecordingPlugin {
            name,
            log: self.clone(),
            before: None,
            success: None,
        }
    }

    fn record(&self, name: &'static str, call: HookCall) {
        lock(&self.entries).push((name, call));
    }

    /// Every recorded call, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, HookCall)> {
        lock(&self.entries).clone()
    }

    /// Calls received by one plugin, oldest first.
    #[must_use]
    pub fn calls_for(&self, name: &str) -> Vec<HookCall> {
        lock(&self.entries)
            .iter()
            .filter(|(plugin, _)| *plugin == name)
            .map(|(_, call)| *call)
            .collect()
    }

    /// How many times `call` was recorded for any plugin.
    #[must_use]
    pub fn count(&self, call: HookCall) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|(_, recorded)| *recorded == call)
            .count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

type BeforeHook<P, T> = Arc<dyn Fn(&P) -> Option<HookOutcome<P, T>> + Send + Sync>;
type SuccessHook<P, T> = Arc<dyn Fn(&T, &P) -> Option<PartialState<P, T>> + Send + Sync>;

/// Records every hook into a [`HookLog`] and optionally answers
/// `on_before` and `on_success`.
pub struct RecordingPlugin<P, T> {
    name: &'static str,
    log: HookLog,
    before: Option<BeforeHook<P, T>>,
    success: Option<SuccessHook<P, T>>,
}

impl<P, T> RecordingPlugin<P, T> {
    /// Answer `on_before` with `hook`.
    #[must_use]
    pub fn with_before(
        mut self,
        hook: impl Fn(&P) -> Option<HookOutcome<P, T>> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    /// Answer `on_success` with `hook`.
    #[must_use]
    pub fn with_success(
        mut self,
        hook: impl Fn(&T, &P) -> Option<PartialState<P, T>> + Send + Sync + 'static,
    ) -> Self {
        self.success = Some(Arc::new(hook));
        self
    }
}

impl<P, T> Plugin<P, T> for RecordingPlugin<P, T>
where
    P: Send + Sync,
    T: Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn on_init(&self) -> Option<PartialState<P, T>> {
        self.log.record(self.name, HookCall::Init);
        None
    }

    fn on_before(&self, params: &P) -> Option<HookOutcome<P, T>> {
        self.log.record(self.name, HookCall::Before);
        self.before.as_ref().and_then(|hook| hook(params))
    }

    fn on_request(&self, _service: &ServiceFn<P, T>, _params: &P) -> Option<ServiceFuture<T>> {
        self.log.record(self.name, HookCall::Request);
        None
    }

    fn on_success(&self, data: &T, params: &P) -> Option<PartialState<P, T>> {
        self.log.record(self.name, HookCall::Success);
        self.success.as_ref().and_then(|hook| hook(data, params))
    }

    fn on_error(&self, _error: &ServiceError, _params: &P) -> Option<PartialState<P, T>> {
        self.log.record(self.name, HookCall::Error);
        None
    }

    fn on_finally(&self, _params: &P, _data: Option<&T>, _error: Option<&ServiceError>) {
        self.log.record(self.name, HookCall::Finally);
    }

    fn on_cancel(&self) {
        self.log.record(self.name, HookCall::Cancel);
    }

    fn on_mutate(&self, _data: &T) {
        self.log.record(self.name, HookCall::Mutate);
    }

    fn on_teardown(&self) {
        self.log.record(self.name, HookCall::Teardown);
    }
}
