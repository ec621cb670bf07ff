use log::{debug, warn};

use crate::device::MotionChannel;
use crate::PipelineResult;

/// Owns the motion channel of one device and tracks its raw mode.
///
/// Sessions borrow the connection mutably, so only one can drive the device
/// at a time. Raw mode is marked active before the enter command is sent:
/// a half-entered device still gets an exit on cleanup.
#[derive(Debug)]
pub struct DeviceConnection<C> {
    channel: C,
    raw_mode: bool,
}

impl<C: MotionChannel> DeviceConnection<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            raw_mode: false,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    pub fn is_raw_mode(&self) -> bool {
        self.raw_mode
    }

    pub async fn enter_raw_mode(&mut self) -> PipelineResult<()> {
        self.raw_mode = true;
        debug!("entering raw mode");
        self.channel.enter_raw_mode().await
    }

    /// Leave raw mode. The flag is cleared even if the device reports an error.
    pub async fn end_raw_mode(&mut self) -> PipelineResult<()> {
        debug!("exiting raw mode");
        let result = self.channel.end_raw_mode().await;
        self.raw_mode = false;
        result
    }

    /// Exit raw mode only if it is active.
    pub async fn release(&mut self) -> PipelineResult<()> {
        if self.raw_mode {
            self.end_raw_mode().await
        } else {
            Ok(())
        }
    }

    /// Tear down whatever a previous session left behind.
    pub async fn begin_session(&mut self) -> PipelineResult<()> {
        if self.raw_mode {
            warn!("previous session left raw mode active, exiting it first");
            self.end_raw_mode().await?;
        }
        Ok(())
    }
}
