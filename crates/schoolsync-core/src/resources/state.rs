use serde::{Deserialize, Serialize};

use crate::api::ErrorInfo;

/// What consumers of a remote collection see: the last good data, whether a
/// fetch is running, and the last failure.
///
/// A failed fetch leaves `data` at its previous value so screens can keep
/// showing the old collection next to an error banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

impl<T> ResourceState<T> {
    /// True once any fetch has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub(crate) fn start(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub(crate) fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.loading = false;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, error: ErrorInfo) {
        self.loading = false;
        self.error = Some(error);
    }
}
