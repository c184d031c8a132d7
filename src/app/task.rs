//! The control task: the single consumer of the notification word.
//!
//! ```text
//!   loop {
//!       dispatch = notifier.wait().await     // only suspension point; bit cleared
//!       service.process(dispatch, ...)       // one handler + one step
//!   }
//! ```
//!
//! Lower-priority bits stay in the word and produce the next wake
//! immediately.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::events::Notifier;

use super::ports::{ContactorHw, EventSink, TimerPort};
use super::service::ContactorService;

pub struct ControlTask<'a, M: RawMutex> {
    notifier: &'a Notifier<M>,
}

impl<'a, M: RawMutex> ControlTask<'a, M> {
    pub fn new(notifier: &'a Notifier<M>) -> Self {
        Self { notifier }
    }

    /// Wait for the next wake and process it.
    pub async fn run_once(
        &mut self,
        service: &mut ContactorService,
        hw: &mut impl ContactorHw,
        timers: &impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        let dispatch = self.notifier.wait().await;
        service.process(dispatch, hw, timers, sink);
    }

    /// Run forever.
    pub async fn run(
        &mut self,
        service: &mut ContactorService,
        hw: &mut impl ContactorHw,
        timers: &impl TimerPort,
        sink: &mut impl EventSink,
    ) -> ! {
        loop {
            self.run_once(service, hw, timers, sink).await;
        }
    }

    /// Process every wake that is already pending without blocking.
    /// Returns the number of wakes processed.
    pub fn drain(
        &mut self,
        service: &mut ContactorService,
        hw: &mut impl ContactorHw,
        timers: &impl TimerPort,
        sink: &mut impl EventSink,
    ) -> usize {
        let mut wakes = 0;
        while let Some(dispatch) = self.notifier.take() {
            service.process(dispatch, hw, timers, sink);
            wakes += 1;
        }
        wakes
    }
}
