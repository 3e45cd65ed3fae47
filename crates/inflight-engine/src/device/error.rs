/// Unrecoverable failure while driving a frame.
///
/// Surface staleness never shows up here; it is absorbed by the resize path.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The logical device was lost. There is no recovery within the session.
    #[error("GPU device lost")]
    DeviceLost,

    /// Presentation failed for a reason other than surface staleness.
    #[error("failed to present swapchain image: {0}")]
    Present(String),
}
