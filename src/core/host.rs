use crate::source::EnablementState;

/// Callbacks the adapter issues to the host graph and its editor.
///
/// These run on the control context only; block processing never calls
/// into the host.
pub trait HostGraph: Send + Sync {
    /// Make the adapter's editor visible in the look matching `state`
    /// (armed when enabled, searching otherwise).
    fn show_editor(&self, state: EnablementState);

    /// Channel metadata changed; redraw the adapter's representation.
    fn request_ui_refresh(&self);

    /// Acquisition ended without the operator asking for it.
    fn disable_callbacks(&self) {}
}

/// Host that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

impl HostGraph for DetachedHost {
    fn show_editor(&self, _state: EnablementState) {}

    fn request_ui_refresh(&self) {}
}
