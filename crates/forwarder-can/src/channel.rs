use crate::frame::CanFrame;

/// The external CAN driver contract.
///
/// A real implementation wraps a FlexCAN-style controller; the driver owns
/// its own receive FIFO and deposits frames there from an interrupt. Every
/// method here is non-blocking: `read` returns immediately with `None` if no
/// frame is pending, matching the runner's single read-per-tick ingress
/// policy.
pub trait CanChannel {
    /// Read at most one frame. Returns `None` if none is pending.
    fn read(&mut self) -> eyre::Result<Option<CanFrame>>;

    /// Write one frame to the bus.
    fn write(&mut self, frame: &CanFrame) -> eyre::Result<()>;

    /// Reconfigure the channel's bitrate. Used during autobaud probing and
    /// once more to commit the accepted rate.
    fn set_bitrate(&mut self, bitrate: u32) -> eyre::Result<()>;

    /// Receive-error-counter reading, used by autobaud to detect a rejected
    /// candidate bitrate.
    fn rx_error_count(&self) -> u32;

    /// Zero the receive-error-counter ahead of a new autobaud candidate.
    fn clear_error_counters(&mut self);
}
