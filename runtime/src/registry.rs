//! Ordered hook dispatch.
//!
//! The registry owns the plugins of one controller and calls each hook on
//! every plugin in registration order, merging returned values so that a
//! later plugin overrides an earlier one field by field.

use reqflow_core::error::ServiceError;
use reqflow_core::plugin::{HookOutcome, Plugin, ServiceFn, ServiceFuture};
use reqflow_core::state::PartialState;
use std::fmt;
use std::sync::Arc;

/// The plugins of one controller, in dispatch order.
pub struct PluginRegistry<P, T> {
    plugins: Vec<Arc<dyn Plugin<P, T>>>,
}

impl<P, T> PluginRegistry<P, T> {
    /// An empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Append a plugin.
    pub fn register(&mut self, plugin: Arc<dyn Plugin<P, T>>) {
        tracing::trace!(plugin = plugin.name(), "Plugin registered");
        self.plugins.push(plugin);
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// `true` when no plugin is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered plugin names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    /// Merged initial state.
    #[must_use]
    pub fn init(&self) -> PartialState<P, T> {
        self.plugins
            .iter()
            .filter_map(|plugin| plugin.on_init())
            .fold(PartialState::new(), PartialState::merge)
    }

    /// Merged `on_before` outcome.
    #[must_use]
    pub fn before(&self, params: &P) -> HookOutcome<P, T> {
        self.plugins
            .iter()
            .filter_map(|plugin| plugin.on_before(params))
            .fold(HookOutcome::default(), HookOutcome::merge)
    }

    /// The substitute request offered by the last plugin that offers one.
    #[must_use]
    pub fn request(&self, service: &ServiceFn<P, T>, params: &P) -> Option<ServiceFuture<T>> {
        self.plugins
            .iter()
            .filter_map(|plugin| plugin.on_request(service, params))
            .last()
    }

    /// Merged `on_success` state.
    #[must_use]
    pub fn success(&self, data: &T, params: &P) -> PartialState<P, T> {
        self.plugins
            .iter()
            .filter_map(|plugin| plugin.on_success(data, params))
            .fold(PartialState::new(), PartialState::merge)
    }

    /// Merged `on_error` state.
    #[must_use]
    pub fn error(&self, error: &ServiceError, params: &P) -> PartialState<P, T> {
        self.plugins
            .iter()
            .filter_map(|plugin| plugin.on_error(error, params))
            .fold(PartialState::new(), PartialState::merge)
    }

    /// Dispatch `on_finally`.
    pub fn finally(&self, params: &P, data: Option<&T>, error: Option<&ServiceError>) {
        for plugin in &self.plugins {
            plugin.on_finally(params, data, error);
        }
    }

    /// Dispatch `on_cancel`.
    pub fn cancel(&self) {
        for plugin in &self.plugins {
            plugin.on_cancel();
        }
    }

    /// Dispatch `on_mutate`.
    pub fn mutate(&self, data: &T) {
        for plugin in &self.plugins {
            plugin.on_mutate(data);
        }
    }

    /// Dispatch `on_teardown`.
    pub fn teardown(&self) {
        for plugin in &self.plugins {
            plugin.on_teardown();
        }
    }
}

impl<P, T> Default for PluginRegistry<P, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, T> fmt::Debug for PluginRegistry<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use futures::FutureExt;

    struct Fixed {
        loading: Option<bool>,
        data: Option<u32>,
        stop: Option<bool>,
        substitute: Option<u32>,
    }

    impl Fixed {
        const fn quiet() -> Self {
            Self {
                loading: None,
                data: None,
                stop: None,
                substitute: None,
            }
        }
    }

    impl Plugin<(), u32> for Fixed {
        fn on_init(&self) -> Option<PartialState<(), u32>> {
            let mut patch = PartialState::new();
            patch.loading = self.loading;
            patch.data = self.data.map(Some);
            (!patch.is_empty()).then_some(patch)
        }

        fn on_before(&self, _params: &()) -> Option<HookOutcome<(), u32>> {
            let mut outcome = HookOutcome::state(self.on_init()?);
            outcome.stop_now = self.stop;
            Some(outcome)
        }

        fn on_request(
            &self,
            _service: &ServiceFn<(), u32>,
            _params: &(),
        ) -> Option<ServiceFuture<u32>> {
            let value = self.substitute?;
            Some(async move { Ok(value) }.boxed())
        }
    }

    fn registry(plugins: Vec<Fixed>) -> PluginRegistry<(), u32> {
        let mut registry = PluginRegistry::new();
        for plugin in plugins {
            registry.register(Arc::new(plugin));
        }
        registry
    }

    #[test]
    fn later_plugins_override_earlier_fields() {
        let registry = registry(vec![
            Fixed {
                loading: Some(true),
                data: Some(1),
                ..Fixed::quiet()
            },
            Fixed::quiet(),
            Fixed {
                loading: Some(false),
                ..Fixed::quiet()
            },
        ]);

        let init = registry.init();
        assert_eq!(init.loading, Some(false));
        assert_eq!(init.data(), Some(&1));
    }

    #[test]
    fn a_single_veto_survives_silent_plugins() {
        let registry = registry(vec![
            Fixed {
                loading: Some(true),
                stop: Some(true),
                ..Fixed::quiet()
            },
            Fixed::quiet(),
        ]);

        assert!(registry.before(&()).should_stop());
    }

    #[tokio::test]
    async fn last_substitute_request_wins() {
        let registry = registry(vec![
            Fixed {
                substitute: Some(1),
                ..Fixed::quiet()
            },
            Fixed {
                substitute: Some(2),
                ..Fixed::quiet()
            },
        ]);
        let service: ServiceFn<(), u32> = Arc::new(|()| async { Ok(0) }.boxed());

        let request = registry.request(&service, &()).expect("a substitute");
        assert_eq!(request.await.ok(), Some(2));
    }
}
