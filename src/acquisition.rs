//! Per-camera acquisition state and the completion signal a blocking
//! capture waits on.

use crate::buffer::{Buffer, Frame};
use crate::error::Error;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;



#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcquisitionState { Idle, Starting, Working, Stopping }

/// How a wait on an acquisition ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Completion {
    Finished,
    Interrupted,
    TimedOut,
    /// Nothing to wait for: the acquisition was started without blocking,
    /// or has been stopped.
    Idle
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal { Finish, Interrupt }



fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// No native call is ever made while one of these locks is held: state
/// changes are split into a `begin_*` and an `end_*` half around the call.
pub(crate) struct Acquisition {
    state: Mutex<AcquisitionState>,
    sender: Mutex<Option<Sender<Signal>>>,
    receiver: Mutex<Option<Receiver<Signal>>>,
    ended: AtomicBool
}

impl Acquisition {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AcquisitionState::Idle),
            sender: Mutex::new(None),
            receiver: Mutex::new(None),
            ended: AtomicBool::new(false)
        }
    }

    pub fn state(&self) -> AcquisitionState {
        *lock(&self.state)
    }

    pub fn is_working(&self) -> bool {
        matches!(self.state(), AcquisitionState::Starting | AcquisitionState::Working)
    }

    fn transition(&self, from: &[AcquisitionState], to: AcquisitionState, err: Error) -> Result<()> {
        let mut state = lock(&self.state);

        if !from.contains(&*state) { return Err(err); }

        tracing::trace!(from = ?*state, to = ?to, "acquisition state");
        *state = to;

        Ok(())
    }

    /// Idle to Starting. With `arm`, a later [`Acquisition::wait`] blocks
    /// until finished or interrupted.
    pub fn begin_start(&self, arm: bool) -> Result<()> {
        self.transition(&[AcquisitionState::Idle], AcquisitionState::Starting, Error::AlreadyWorking)?;
        self.ended.store(false, Ordering::Release);

        if arm {
            let (tx, rx) = mpsc::channel();

            *lock(&self.sender) = Some(tx);
            *lock(&self.receiver) = Some(rx);
        }

        Ok(())
    }

    pub fn end_start(&self, started: bool) {
        let to = if started { AcquisitionState::Working } else { AcquisitionState::Idle };

        if !started { self.disarm(); }

        *lock(&self.state) = to;
    }

    pub fn begin_stop(&self) -> Result<()> {
        self.transition(&[AcquisitionState::Working], AcquisitionState::Stopping, Error::NotWorking)
    }

    pub fn end_stop(&self, stopped: bool) {
        if stopped {
            self.disarm();
            *lock(&self.state) = AcquisitionState::Idle;
        }
        else {
            *lock(&self.state) = AcquisitionState::Working;
        }
    }

    fn disarm(&self) {
        // Dropping the sender first wakes a blocked waiter, which then
        // releases the receiver.
        lock(&self.sender).take();
        lock(&self.receiver).take();
    }

    fn signal(&self, signal: Signal) {
        if let Some(tx) = lock(&self.sender).as_ref() {
            let _ = tx.send(signal);
        }
    }

    pub fn finish(&self) {
        self.signal(Signal::Finish);
    }

    pub fn interrupt(&self) {
        self.signal(Signal::Interrupt);
    }

    /// Records end of stream. True only for the first call per run.
    pub fn mark_end(&self) -> bool {
        !self.ended.swap(true, Ordering::AcqRel)
    }

    pub fn is_collecting(&self) -> bool {
        self.is_working() && !self.ended.load(Ordering::Acquire)
    }

    pub fn wait(&self, timeout: Option<Duration>) -> Completion {
        let receiver = lock(&self.receiver);
        let Some(rx) = receiver.as_ref() else { return Completion::Idle };

        let signal = match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(signal) => signal,
                Err(RecvTimeoutError::Timeout) => return Completion::TimedOut,
                Err(RecvTimeoutError::Disconnected) => return Completion::Idle
            },
            None => match rx.recv() {
                Ok(signal) => signal,
                Err(_) => return Completion::Idle
            }
        };

        match signal {
            Signal::Finish => Completion::Finished,
            Signal::Interrupt => Completion::Interrupted
        }
    }
}



/// Interrupts a blocking capture from another thread.
#[derive(Clone)]
pub struct Interrupter(pub(crate) Arc<Acquisition>);

impl Interrupter {
    pub fn interrupt(&self) {
        tracing::info!("interrupting acquisition");
        self.0.interrupt();
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Interrupter").field(&self.0.state()).finish()
    }
}



/// The callback installed when a camera starts without any of its own:
/// copies every frame while the acquisition runs, and finishes it at the
/// first buffer with a null base address.
pub(crate) fn collector(
    acquisition: Arc<Acquisition>,
    frames: Arc<Mutex<Vec<Frame>>>
) -> impl Fn(&Buffer) + Send + Sync + 'static {
    move |buffer: &Buffer| {
        if !acquisition.is_collecting() { return; }

        match Frame::from_buffer(buffer) {
            Ok(Some(frame)) => lock(&frames).push(frame),
            Ok(None) => {
                if acquisition.mark_end() {
                    tracing::debug!(buffer = buffer.handle(), "end of stream");
                    acquisition.finish();
                }
            },
            Err(e) => tracing::warn!(buffer = buffer.handle(), "could not read buffer: {e}")
        }
    }
}
