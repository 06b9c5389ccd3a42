//! Seam between the protocol engine and the scan pipeline.

use sortjig_core::ScanOutcome;

/// How the protocol engine reaches the scan pipeline.
///
/// The coordinator implements this; the engine never depends on the
/// coordinator's type. The call sequence for one scan cycle is
/// `begin_scan` → zero or more `next_outcome` → `end_scan`, always in that
/// order, always from the single engine task:
///
/// - `begin_scan` arms the pipeline: producers' text starts being accepted.
/// - `next_outcome` waits for the next classification. Matrix outcomes may
///   arrive before the cartridge outcome; the engine consumes them without
///   finishing the cycle.
/// - `end_scan` disarms the pipeline, whether the cycle finished with an
///   outcome, timed out, or was cancelled by shutdown. Text offered after
///   `end_scan` is dropped at the pipeline, never classified late.
pub trait ScanGateway: Send + Sync {
    /// A firmware scan request arrived; start accepting scan text.
    async fn begin_scan(&self, final_attempt: bool);

    /// Wait for the next classification outcome of the armed request.
    ///
    /// Returns `None` if the pipeline has shut down.
    async fn next_outcome(&self) -> Option<ScanOutcome>;

    /// The cycle is over; stop accepting scan text.
    async fn end_scan(&self);
}
