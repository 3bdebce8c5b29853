use crate::api::{StreamBufferHandle, StreamHandle};
use crate::buffer::{Buffer, Frame};
use crate::callback::CallbackHandle;
use crate::camera::Camera;
use crate::registry::{Kind, Scoped, StreamEntry};
use crate::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;



/// A stream of frame buffers allocated on a camera. Freed when dropped.
pub struct Stream<'a> {
    camera: &'a Camera<'a>,
    scope: Scoped<'a>,
    entry: Arc<StreamEntry>
}

impl<'a> Stream<'a> {
    pub(crate) fn new(camera: &'a Camera<'a>, scope: Scoped<'a>, entry: Arc<StreamEntry>) -> Self {
        Self { camera, scope, entry }
    }

    pub fn handle(&self) -> StreamHandle {
        self.scope.handle()
    }

    pub fn camera(&self) -> &'a Camera<'a> {
        self.camera
    }

    /// Number of buffers the stream was allocated with.
    pub fn buffer_count(&self) -> u32 {
        self.entry.frames
    }

    pub fn is_allocated(&self) -> bool {
        self.scope.registry().is_open(Kind::Stream, self.handle())
    }

    /// Registers a handler taking the raw buffer handle and `context`.
    pub fn register_native_callback<F, C>(&self, handler: F, context: C) -> Result<Arc<CallbackHandle>>
    where
        F: Fn(StreamBufferHandle, &C) + Send + Sync + 'static,
        C: Send + Sync + 'static
    {
        self.entry.register(self.scope.registry().api(), handler, context)
    }

    pub fn register_callback<F>(&self, handler: F) -> Result<Arc<CallbackHandle>>
    where F: Fn(&Buffer) + Send + Sync + 'static {
        self.entry.register_buffer_callback(self.scope.registry().api(), handler)
    }

    /// Runs `f` with `handler` registered, removing it afterwards, also
    /// when `f` panics.
    pub fn with_callback<F, R>(&self, handler: F, f: impl FnOnce(&CallbackHandle) -> Result<R>) -> Result<R>
    where F: Fn(&Buffer) + Send + Sync + 'static {
        let handle = self.register_callback(handler)?;
        let out = panic::catch_unwind(AssertUnwindSafe(|| f(&handle)));
        let removed = handle.remove();

        let out = match out {
            Ok(out) => out,
            Err(payload) => {
                if let Err(e) = &removed {
                    tracing::warn!(stream = self.handle(), "could not remove callback while unwinding: {e}");
                }

                panic::resume_unwind(payload)
            }
        };

        match (out, removed) {
            (Err(e), Err(remove)) => {
                tracing::warn!(stream = self.handle(), "could not remove callback after an error: {remove}");
                Err(e)
            },
            (out, removed) => {
                removed?;
                out
            }
        }
    }

    pub fn callback_count(&self) -> usize {
        self.entry.callback_count()
    }

    /// Unregisters every callback, in registration order.
    pub fn clear_callbacks(&self) -> Result<()> {
        self.entry.clear_callbacks()
    }

    /// Frames gathered by the default callback so far.
    pub fn take_frames(&self) -> Vec<Frame> {
        self.entry.take_frames()
    }

    pub fn frame_count(&self) -> usize {
        self.entry.frame_count()
    }

    pub fn free(self) -> Result<()> {
        self.scope.release()
    }
}

impl<'a> std::fmt::Debug for Stream<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("handle", &self.handle())
            .field("camera", &self.entry.camera)
            .field("buffers", &self.entry.frames)
            .finish()
    }
}
