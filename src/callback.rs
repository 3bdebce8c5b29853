//! Bridges native buffer-completion callbacks to Rust closures.
//!
//! KYFGLib unregisters a callback by its function pointer, so every live
//! registration needs a distinct one. A fixed table of slots each owns a
//! monomorphized `extern "C"` trampoline; registering a closure claims a
//! free slot and hands the slot's trampoline to the library. The user
//! context passed along is an opaque token, never a pointer to Rust data:
//! a trampoline only dispatches when the token still matches its slot, so
//! a late callback after removal is dropped instead of reaching freed
//! memory.

use crate::api::{Api, BufferCallback, StreamBufferHandle, StreamHandle};
use crate::error::Error;
use crate::{kycall, Result};
use std::any::Any;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use lazy_static::lazy_static;



/// Number of callbacks that can be registered at once, across all streams.
pub const MAX_CALLBACKS: usize = 64;

type Handler = Arc<dyn Fn(StreamBufferHandle) + Send + Sync>;

struct Slot {
    token: u64,
    handler: Handler
}

lazy_static! {
    static ref SLOTS: Mutex<Vec<Option<Slot>>> =
        Mutex::new((0..MAX_CALLBACKS).map(|_| None).collect());
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn slots() -> MutexGuard<'static, Vec<Option<Slot>>> {
    // Handlers never run under the lock, poisoning can only come from a
    // panic in this module's own bookkeeping.
    SLOTS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn claim(token: u64, handler: Handler) -> Result<usize> {
    let mut slots = slots();
    let slot = slots.iter().position(Option::is_none).ok_or(Error::TooManyCallbacks(MAX_CALLBACKS))?;

    slots[slot] = Some(Slot { token, handler });

    Ok(slot)
}

fn release(slot: usize, token: u64) {
    let mut slots = slots();

    if slots[slot].as_ref().map_or(false, |s| s.token == token) {
        slots[slot] = None;
    }
}

/// Number of slots currently claimed.
pub fn active_callbacks() -> usize {
    slots().iter().filter(|s| s.is_some()).count()
}



unsafe extern "C" fn trampoline<const SLOT: usize>(buffer: StreamBufferHandle, user_context: *mut c_void) {
    dispatch(SLOT, user_context as usize as u64, buffer);
}

macro_rules! trampolines {
    ($($slot: literal)*) => {
        [$(trampoline::<$slot> as BufferCallback),*]
    }
}

static TRAMPOLINES: [BufferCallback; MAX_CALLBACKS] = trampolines!(
     0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
    16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
    32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
    48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
);

fn dispatch(slot: usize, token: u64, buffer: StreamBufferHandle) {
    let handler = match &slots()[slot] {
        Some(s) if s.token == token => s.handler.clone(),
        _ => {
            tracing::trace!(slot, token, buffer, "callback for a removed registration dropped");
            return;
        }
    };

    // Unwinding into the native library is undefined behaviour.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(buffer))) {
        tracing::error!(slot, buffer, "buffer callback panicked: {}", panic_message(&*payload));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() { s }
    else if let Some(s) = payload.downcast_ref::<String>() { s }
    else { "non-string panic payload" }
}



/// Registers `handler` on `stream`. The handler runs on the library's
/// acquisition thread with the completed buffer's handle and `context`.
pub fn register<F, C>(api: Arc<dyn Api>, stream: StreamHandle, handler: F, context: C) -> Result<CallbackHandle>
where
    F: Fn(StreamBufferHandle, &C) + Send + Sync + 'static,
    C: Send + Sync + 'static
{
    let handler: Handler = Arc::new(move |buffer| handler(buffer, &context));
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    let slot = claim(token, handler)?;

    let registered = kycall!(api, callback_register, stream, TRAMPOLINES[slot], token as usize as *mut c_void);

    if let Err(e) = registered {
        release(slot, token);
        return Err(e);
    }

    tracing::debug!(stream, slot, "buffer callback registered");

    Ok(CallbackHandle { api, stream, slot, token, removed: AtomicBool::new(false) })
}



/// A live registration. Dropping it unregisters the callback if that has
/// not happened yet.
pub struct CallbackHandle {
    api: Arc<dyn Api>,
    stream: StreamHandle,
    slot: usize,
    token: u64,
    removed: AtomicBool
}

impl CallbackHandle {
    pub fn stream(&self) -> StreamHandle {
        self.stream
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Unregisters the callback. Calling it again is a no-op; if the native
    /// call fails the handle stays registered and can be retried.
    pub fn remove(&self) -> Result<()> {
        if self.removed.swap(true, Ordering::AcqRel) { return Ok(()); }

        match kycall!(self.api, callback_unregister, self.stream, TRAMPOLINES[self.slot]) {
            Ok(()) => {
                release(self.slot, self.token);
                tracing::debug!(stream = self.stream, slot = self.slot, "buffer callback removed");

                Ok(())
            },
            Err(e) => {
                self.removed.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("stream", &self.stream)
            .field("slot", &self.slot)
            .field("removed", &self.is_removed())
            .finish()
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!(stream = self.stream, slot = self.slot, "could not remove callback on drop: {e}");
        }
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CamHandle, INVALID_FGHANDLE};
    use crate::mock::{Call, MockFrame, MockLib};
    use std::sync::atomic::AtomicUsize;

    const CAM: CamHandle = 7;

    fn setup() -> (Arc<MockLib>, StreamHandle) {
        let lib = Arc::new(MockLib::new());
        let fg = lib.add_grabber("Komodo");
        lib.set_cameras(fg, &[CAM]);
        assert_ne!(lib.grabber_open(fg), INVALID_FGHANDLE);
        kycall!(lib, camera_open, CAM, None).unwrap();

        let mut stream = 0;
        kycall!(lib, stream_create, CAM, &mut stream, 4, 0).unwrap();

        (lib, stream)
    }

    #[test]
    fn handler_receives_buffers_and_context() {
        let (lib, stream) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = register(lib.clone(), stream, |_, hits: &Arc<AtomicUsize>| {
            hits.fetch_add(1, Ordering::SeqCst);
        }, hits.clone()).unwrap();

        lib.deliver(stream, MockFrame::new(vec![0; 16])).unwrap();
        lib.deliver(stream, MockFrame::new(vec![0; 16])).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        handle.remove().unwrap();
        lib.deliver(stream, MockFrame::new(vec![0; 16])).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let (lib, stream) = setup();
        let handle = register(lib.clone(), stream, |_, _: &()| {}, ()).unwrap();

        handle.remove().unwrap();
        handle.remove().unwrap();
        drop(handle);

        assert_eq!(lib.calls(Call::CallbackUnregister), 1);
        assert_eq!(lib.callback_count(stream), 0);
    }

    #[test]
    fn failed_unregister_can_be_retried() {
        let (lib, stream) = setup();
        let handle = register(lib.clone(), stream, |_, _: &()| {}, ()).unwrap();

        lib.fail(Call::CallbackUnregister);
        assert!(handle.remove().is_err());
        assert!(!handle.is_removed());

        lib.recover(Call::CallbackUnregister);
        handle.remove().unwrap();
        assert!(handle.is_removed());
    }

    #[test]
    fn failed_register_frees_the_slot() {
        let (lib, stream) = setup();
        lib.fail(Call::CallbackRegister);

        let err = register(lib.clone(), stream, |_, _: &()| {}, ()).unwrap_err();

        assert!(matches!(err, Error::NativeCallFailure { call: "callback_register", .. }));
        assert_eq!(lib.callback_count(stream), 0);
    }

    #[test]
    fn panicking_handler_does_not_unwind_into_the_caller() {
        let (lib, stream) = setup();
        let after = Arc::new(AtomicUsize::new(0));

        let _first = register(lib.clone(), stream, |_, _: &()| panic!("bad handler"), ()).unwrap();
        let _second = register(lib.clone(), stream, |_, after: &Arc<AtomicUsize>| {
            after.fetch_add(1, Ordering::SeqCst);
        }, after.clone()).unwrap();

        assert!(lib.deliver(stream, MockFrame::new(vec![1, 2, 3])).is_some());
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_token_is_ignored() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handler: Handler = Arc::new(move |_| { counter.fetch_add(1, Ordering::SeqCst); });
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        let slot = claim(token, handler).unwrap();

        dispatch(slot, token + 1_000_000, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        dispatch(slot, token, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        release(slot, token);
    }
}
