//! Request state and the partial updates that plugins return.
//!
//! [`RequestState`] is the single observable record of one controller. It is
//! only ever changed by merging a [`PartialState`] over it, field by field.

use crate::error::ServiceError;

/// Observable state of one request controller.
#[derive(Debug, Clone)]
pub struct RequestState<P, T> {
    /// A request (or a loading-delay timer) is outstanding.
    pub loading: bool,
    /// Params of the most recent run.
    pub params: Option<P>,
    /// Data of the most recent successful run, cache hit or mutation.
    pub data: Option<T>,
    /// Error of the most recent failed run.
    pub error: Option<ServiceError>,
}

impl<P, T> Default for RequestState<P, T> {
    fn default() -> Self {
        Self {
            loading: false,
            params: None,
            data: None,
            error: None,
        }
    }
}

impl<P, T> RequestState<P, T> {
    /// Shallow-merge a partial update into this state.
    pub fn apply(&mut self, patch: PartialState<P, T>) {
        if let Some(loading) = patch.loading {
            self.loading = loading;
        }
        if let Some(params) = patch.params {
            self.params = params;
        }
        if let Some(data) = patch.data {
            self.data = data;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
    }
}

/// A sparse update to a [`RequestState`].
///
/// Each field is `None` when untouched. The inner `Option` distinguishes
/// "set to a value" from "explicitly cleared".
#[derive(Debug, Clone)]
pub struct PartialState<P, T> {
    /// New `loading` flag.
    pub loading: Option<bool>,
    /// New params.
    pub params: Option<Option<P>>,
    /// New data.
    pub data: Option<Option<T>>,
    /// New error.
    pub error: Option<Option<ServiceError>>,
}

impl<P, T> Default for PartialState<P, T> {
    fn default() -> Self {
        Self {
            loading: None,
            params: None,
            data: None,
            error: None,
        }
    }
}

impl<P, T> PartialState<P, T> {
    /// An update that touches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `loading`.
    #[must_use]
    pub fn with_loading(mut self, loading: bool) -> Self {
        self.loading = Some(loading);
        self
    }

    /// Set `params`.
    #[must_use]
    pub fn with_params(mut self, params: P) -> Self {
        self.params = Some(Some(params));
        self
    }

    /// Set `data`.
    #[must_use]
    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(Some(data));
        self
    }

    /// Set `error`.
    #[must_use]
    pub fn with_error(mut self, error: ServiceError) -> Self {
        self.error = Some(Some(error));
        self
    }

    /// Clear `error`.
    #[must_use]
    pub fn without_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    /// `true` when no field is touched.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.loading.is_none()
            && self.params.is_none()
            && self.data.is_none()
            && self.error.is_none()
    }

    /// Merge `later` over `self`; fields present in `later` win.
    #[must_use]
    pub fn merge(mut self, later: Self) -> Self {
        if later.loading.is_some() {
            self.loading = later.loading;
        }
        if later.params.is_some() {
            self.params = later.params;
        }
        if later.data.is_some() {
            self.data = later.data;
        }
        if later.error.is_some() {
            self.error = later.error;
        }
        self
    }

    /// The data this update sets, if any.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref().and_then(Option::as_ref)
    }
}
