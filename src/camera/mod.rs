pub mod session;
pub mod stream;
pub mod v4l2;

pub use session::{CameraSessionManager, CaptureState};
pub use stream::{FrameStream, STREAM_CONTENT_TYPE};
pub use v4l2::V4l2Source;

use crate::error::Result;
use crate::frame::Frame;

/// A single physical capture device.
///
/// The production impl is [`V4l2Source`]; tests use scripted fakes. All
/// access goes through [`CameraSessionManager`], which serializes calls and
/// owns the open/close lifecycle.
pub trait FrameSource: Send {
    /// Open the device. Fails if it cannot be acquired.
    fn open(&mut self) -> Result<()>;

    /// Read one frame. Only valid while open.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Release the device. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
