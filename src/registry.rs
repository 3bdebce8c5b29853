//! Bookkeeping for every open grabber, camera and stream.
//!
//! The registry holds one entry per native handle it opened, so wrappers
//! and callbacks can find the state that belongs to a handle. Entries are
//! inserted only after the native open succeeded and removed only after
//! the native close succeeded, so the tables mirror what the library
//! considers open.

use crate::acquisition::{Acquisition, AcquisitionState};
use crate::api::*;
use crate::buffer::{Buffer, Frame};
use crate::callback::{self, CallbackHandle};
use crate::error::Error;
use crate::kyfg_sys::KY_MAX_CAMERAS;
use crate::util::to_cstring;
use crate::{kycall, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};



fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}



#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind { Grabber, Camera, Stream }

/// What to open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// A grabber by its scan index.
    Grabber { index: i32 },
    /// The `index`th camera detected on an open grabber, optionally with a
    /// GenICam description file overriding the one on the device.
    Camera { grabber: FgHandle, index: usize, xml_file: Option<PathBuf> },
    /// A stream of `frames` buffers on an open camera.
    Stream { camera: CamHandle, frames: u32 }
}

impl Target {
    pub fn kind(&self) -> Kind {
        match self {
            Target::Grabber { .. } => Kind::Grabber,
            Target::Camera { .. } => Kind::Camera,
            Target::Stream { .. } => Kind::Stream
        }
    }
}



pub(crate) struct GrabberEntry {
    pub index: i32
}

pub(crate) struct CameraEntry {
    pub grabber: FgHandle,
    pub index: usize,
    pub acquisition: Arc<Acquisition>
}

pub(crate) struct StreamEntry {
    pub handle: StreamHandle,
    pub camera: CamHandle,
    pub frames: u32,
    callbacks: Mutex<Vec<Arc<CallbackHandle>>>,
    collected: Arc<Mutex<Vec<Frame>>>
}

impl StreamEntry {
    fn new(handle: StreamHandle, camera: CamHandle, frames: u32) -> Self {
        Self {
            handle,
            camera,
            frames,
            callbacks: Mutex::new(Vec::new()),
            collected: Arc::new(Mutex::new(Vec::new()))
        }
    }

    pub fn register<F, C>(&self, api: &Arc<dyn Api>, handler: F, context: C) -> Result<Arc<CallbackHandle>>
    where
        F: Fn(StreamBufferHandle, &C) + Send + Sync + 'static,
        C: Send + Sync + 'static
    {
        let handle = Arc::new(callback::register(api.clone(), self.handle, handler, context)?);
        let mut callbacks = lock(&self.callbacks);

        callbacks.retain(|h| !h.is_removed());
        callbacks.push(handle.clone());

        Ok(handle)
    }

    /// Registers a handler that receives [`Buffer`]s instead of raw handles.
    pub fn register_buffer_callback<F>(&self, api: &Arc<dyn Api>, handler: F) -> Result<Arc<CallbackHandle>>
    where F: Fn(&Buffer) + Send + Sync + 'static {
        self.register(api, move |h, api: &Arc<dyn Api>| handler(&Buffer::new(api.clone(), h)), api.clone())
    }

    /// Callbacks still registered. Handles removed on their own are
    /// dropped from the list here and on every registration.
    pub fn callback_count(&self) -> usize {
        let mut callbacks = lock(&self.callbacks);

        callbacks.retain(|h| !h.is_removed());
        callbacks.len()
    }

    /// Removes every callback in registration order. On failure the failed
    /// callback and those after it stay registered.
    pub fn clear_callbacks(&self) -> Result<()> {
        let pending: Vec<_> = lock(&self.callbacks).drain(..).collect();
        let mut pending = pending.into_iter();

        while let Some(handle) = pending.next() {
            if let Err(e) = handle.remove() {
                let mut callbacks = lock(&self.callbacks);
                let registered_since = std::mem::take(&mut *callbacks);

                callbacks.push(handle);
                callbacks.extend(pending);
                callbacks.extend(registered_since);

                return Err(e);
            }
        }

        Ok(())
    }

    pub fn frames_sink(&self) -> Arc<Mutex<Vec<Frame>>> {
        self.collected.clone()
    }

    pub fn take_frames(&self) -> Vec<Frame> {
        std::mem::take(&mut *lock(&self.collected))
    }

    pub fn frame_count(&self) -> usize {
        lock(&self.collected).len()
    }
}



/// Handle to entry map for one kind of device.
pub(crate) struct HandleTable<T> {
    entries: Mutex<HashMap<u32, Arc<T>>>
}

impl<T> HandleTable<T> {
    fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Arc<T>>> {
        lock(&self.entries)
    }

    pub fn get(&self, handle: u32) -> Option<Arc<T>> {
        self.lock().get(&handle).cloned()
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.lock().contains_key(&handle)
    }

    fn insert(&self, handle: u32, entry: T) -> Arc<T> {
        let entry = Arc::new(entry);
        self.lock().insert(handle, entry.clone());
        entry
    }

    fn remove(&self, handle: u32) -> Option<Arc<T>> {
        self.lock().remove(&handle)
    }

    /// Handles whose entry satisfies `pred`, in ascending order.
    fn handles_where(&self, pred: impl Fn(&T) -> bool) -> Vec<u32> {
        let mut handles: Vec<u32> = self.lock().iter()
            .filter(|(_, e)| pred(e))
            .map(|(&h, _)| h)
            .collect();

        handles.sort_unstable();
        handles
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}



pub struct Registry {
    api: Arc<dyn Api>,
    grabbers: HandleTable<GrabberEntry>,
    cameras: HandleTable<CameraEntry>,
    streams: HandleTable<StreamEntry>
}

impl Registry {
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self {
            api,
            grabbers: HandleTable::new(),
            cameras: HandleTable::new(),
            streams: HandleTable::new()
        }
    }

    pub fn api(&self) -> &Arc<dyn Api> {
        &self.api
    }

    pub fn is_open(&self, kind: Kind, handle: u32) -> bool {
        match kind {
            Kind::Grabber => self.grabbers.contains(handle),
            Kind::Camera => self.cameras.contains(handle),
            Kind::Stream => self.streams.contains(handle)
        }
    }

    pub fn open_count(&self, kind: Kind) -> usize {
        match kind {
            Kind::Grabber => self.grabbers.len(),
            Kind::Camera => self.cameras.len(),
            Kind::Stream => self.streams.len()
        }
    }

    pub(crate) fn camera(&self, handle: CamHandle) -> Option<Arc<CameraEntry>> {
        self.cameras.get(handle)
    }

    pub(crate) fn stream(&self, handle: StreamHandle) -> Option<Arc<StreamEntry>> {
        self.streams.get(handle)
    }

    pub(crate) fn stream_of_camera(&self, camera: CamHandle) -> Option<Arc<StreamEntry>> {
        self.streams.lock().values().find(|s| s.camera == camera).cloned()
    }

    /// Handles of the cameras currently detected on `grabber`.
    pub fn camera_handles(&self, grabber: FgHandle) -> Result<Vec<CamHandle>> {
        let mut cameras = [INVALID_CAMHANDLE; KY_MAX_CAMERAS];
        let mut count = KY_MAX_CAMERAS as i32;

        kycall!(self.api, update_camera_list, grabber, &mut cameras, &mut count)?;

        let count = count.max(0) as usize;

        if count > KY_MAX_CAMERAS {
            tracing::warn!(grabber, count, "more cameras detected than can be listed");
        }

        Ok(cameras[..count.min(KY_MAX_CAMERAS)].to_vec())
    }

    /// Opens `target` and records it. Returns the new native handle.
    pub fn open(&self, target: Target) -> Result<u32> {
        match target {
            Target::Grabber { index } => self.open_grabber(index),
            Target::Camera { grabber, index, xml_file } => self.open_camera(grabber, index, xml_file),
            Target::Stream { camera, frames } => self.open_stream(camera, frames)
        }
    }

    fn open_grabber(&self, index: i32) -> Result<FgHandle> {
        let handle = self.api.grabber_open(index);

        if handle == INVALID_FGHANDLE {
            return Err(Error::DeviceUnavailable(format!("grabber {index} could not be opened")));
        }

        self.grabbers.insert(handle, GrabberEntry { index });
        tracing::info!(index, handle, "grabber opened");

        Ok(handle)
    }

    fn open_camera(&self, grabber: FgHandle, index: usize, xml_file: Option<PathBuf>) -> Result<CamHandle> {
        let handles = self.camera_handles(grabber)?;

        if handles.len() != 1 {
            return Err(Error::AmbiguousDevice { found: handles.len() });
        }

        let handle = *handles.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!("camera index {index} out of range (1 camera detected)"))
        })?;

        if self.cameras.contains(handle) {
            return Err(Error::DeviceUnavailable(format!("camera {handle:#x} is already open")));
        }

        match xml_file {
            Some(path) => {
                let path = to_cstring(&path.to_string_lossy())?;

                kycall!(self.api, camera_open, handle, Some(path.as_c_str()))?;
            },
            None => kycall!(self.api, camera_open, handle, None)?
        }

        self.cameras.insert(handle, CameraEntry { grabber, index, acquisition: Arc::new(Acquisition::new()) });
        tracing::info!(grabber, index, handle, "camera opened");

        Ok(handle)
    }

    fn open_stream(&self, camera: CamHandle, frames: u32) -> Result<StreamHandle> {
        // Held across the native call so two streams can't race past the check.
        let mut streams = self.streams.lock();

        if streams.values().any(|s| s.camera == camera) {
            return Err(Error::StreamBusy);
        }

        let mut handle = INVALID_STREAMHANDLE;
        kycall!(self.api, stream_create, camera, &mut handle, frames, 0)?;

        if handle == INVALID_STREAMHANDLE {
            return Err(Error::DeviceUnavailable(format!("no stream could be created on camera {camera:#x}")));
        }

        streams.insert(handle, Arc::new(StreamEntry::new(handle, camera, frames)));
        tracing::info!(camera, handle, frames, "stream allocated");

        Ok(handle)
    }

    /// Closes a handle this registry opened, along with whatever depends on
    /// it: a camera's stream and running acquisition, a grabber's cameras.
    /// Double close is not guarded here; the native layer decides.
    pub fn close(&self, kind: Kind, handle: u32) -> Result<()> {
        match kind {
            Kind::Grabber => self.close_grabber(handle),
            Kind::Camera => self.close_camera(handle),
            Kind::Stream => self.close_stream(handle)
        }
    }

    fn close_grabber(&self, handle: FgHandle) -> Result<()> {
        for camera in self.cameras.handles_where(|c| c.grabber == handle) {
            self.close_camera(camera)?;
        }

        kycall!(self.api, grabber_close, handle)?;

        if let Some(entry) = self.grabbers.remove(handle) {
            tracing::info!(handle, index = entry.index, "grabber closed");
        }

        Ok(())
    }

    fn stop_if_working(&self, camera: CamHandle) -> Result<()> {
        let Some(entry) = self.cameras.get(camera) else { return Ok(()) };

        if entry.acquisition.state() != AcquisitionState::Working { return Ok(()); }

        tracing::warn!(camera, "camera still working, stopping it first");

        entry.acquisition.begin_stop()?;
        let stopped = kycall!(self.api, camera_stop, camera);
        entry.acquisition.end_stop(stopped.is_ok());

        stopped
    }

    fn close_camera(&self, handle: CamHandle) -> Result<()> {
        self.stop_if_working(handle)?;

        if let Some(stream) = self.stream_of_camera(handle) {
            self.close_stream(stream.handle)?;
        }

        kycall!(self.api, camera_close, handle)?;
        self.cameras.remove(handle);
        tracing::info!(handle, "camera closed");

        Ok(())
    }

    fn close_stream(&self, handle: StreamHandle) -> Result<()> {
        if let Some(entry) = self.streams.get(handle) {
            self.stop_if_working(entry.camera)?;
            entry.clear_callbacks()?;
        }

        kycall!(self.api, stream_delete, handle)?;
        self.streams.remove(handle);
        tracing::info!(handle, "stream freed");

        Ok(())
    }

    /// Opens `target` for the lifetime of the returned guard.
    pub fn scoped(&self, target: Target) -> Result<Scoped<'_>> {
        let kind = target.kind();
        let handle = self.open(target)?;

        Ok(Scoped { registry: self, kind, handle, released: false })
    }

    /// Runs `f` with `target` open and closes it on every way out of `f`,
    /// unwinding included. An error from `f` takes precedence over one
    /// from closing.
    pub fn with<R>(&self, target: Target, f: impl FnOnce(u32) -> Result<R>) -> Result<R> {
        let scoped = self.scoped(target)?;
        let out = f(scoped.handle());
        let released = scoped.release();

        match (out, released) {
            (Err(e), Err(close)) => {
                tracing::warn!("close failed after an earlier error: {close}");
                Err(e)
            },
            (out, released) => {
                released?;
                out
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("grabbers", &self.grabbers.len())
            .field("cameras", &self.cameras.len())
            .field("streams", &self.streams.len())
            .finish()
    }
}



/// An open handle that is closed exactly once: by [`Scoped::release`], or
/// on drop.
#[must_use]
pub struct Scoped<'r> {
    registry: &'r Registry,
    kind: Kind,
    handle: u32,
    released: bool
}

impl<'r> Scoped<'r> {
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn release(mut self) -> Result<()> {
        self.close()
    }

    /// Closes once. A handle already closed through a parent's cascade is
    /// left alone.
    fn close(&mut self) -> Result<()> {
        if self.released { return Ok(()); }

        self.released = true;

        if !self.registry.is_open(self.kind, self.handle) {
            tracing::debug!(kind = ?self.kind, handle = self.handle, "already closed");
            return Ok(());
        }

        self.registry.close(self.kind, self.handle)
    }
}

impl<'r> std::fmt::Debug for Scoped<'r> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scoped").field("kind", &self.kind).field("handle", &self.handle).finish()
    }
}

impl<'r> Drop for Scoped<'r> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(kind = ?self.kind, handle = self.handle, "could not close on drop: {e}");
        }
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockLib};

    fn setup(cameras: &[CamHandle]) -> (Arc<MockLib>, Registry, FgHandle) {
        let lib = Arc::new(MockLib::new());
        let index = lib.add_grabber("Komodo");
        lib.set_cameras(index, cameras);

        let registry = Registry::new(lib.clone());
        let fg = registry.open(Target::Grabber { index }).unwrap();

        (lib, registry, fg)
    }

    fn camera(grabber: FgHandle) -> Target {
        Target::Camera { grabber, index: 0, xml_file: None }
    }

    #[test]
    fn unavailable_grabber() {
        let lib = Arc::new(MockLib::new());
        let index = lib.add_grabber("Komodo");
        lib.set_grabber_available(index, false);
        let registry = Registry::new(lib.clone());

        assert!(matches!(registry.open(Target::Grabber { index }), Err(Error::DeviceUnavailable(_))));
        assert_eq!(registry.open_count(Kind::Grabber), 0);
    }

    #[test]
    fn camera_lists_must_hold_exactly_one() {
        for (cameras, expected) in [(&[][..], Some(0)), (&[5, 9][..], Some(2)), (&[7][..], None)] {
            let (_lib, registry, fg) = setup(cameras);

            match (registry.open(camera(fg)), expected) {
                (Err(Error::AmbiguousDevice { found }), Some(n)) => assert_eq!(found, n),
                (Ok(handle), None) => assert_eq!(handle, 7),
                (other, _) => panic!("unexpected result for {cameras:?}: {other:?}")
            }
        }
    }

    #[test]
    fn second_stream_is_refused() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.open(camera(fg)).unwrap();
        let first = registry.open(Target::Stream { camera: cam, frames: 4 }).unwrap();

        assert!(matches!(registry.open(Target::Stream { camera: cam, frames: 4 }), Err(Error::StreamBusy)));
        assert!(registry.is_open(Kind::Stream, first));
        assert_eq!(lib.stream_count(), 1);
        assert_eq!(lib.calls(Call::StreamCreate), 1);
    }

    #[test]
    fn scoped_releases_once_on_success() {
        let (lib, registry, fg) = setup(&[7]);

        let handle = registry.with(camera(fg), |h| Ok(h)).unwrap();

        assert!(!registry.is_open(Kind::Camera, handle));
        assert_eq!(lib.calls(Call::CameraClose), 1);
    }

    #[test]
    fn scoped_releases_once_on_error() {
        let (lib, registry, fg) = setup(&[7]);

        let err = registry.with(camera(fg), |_| -> Result<()> { Err(Error::NoStream) }).unwrap_err();

        assert!(matches!(err, Error::NoStream));
        assert_eq!(lib.calls(Call::CameraClose), 1);
        assert!(!lib.is_camera_open(7));
    }

    #[test]
    fn scoped_releases_once_on_panic() {
        let (lib, registry, fg) = setup(&[7]);

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.with(camera(fg), |_| -> Result<()> { panic!("body failed") })
        }));

        assert!(caught.is_err());
        assert_eq!(lib.calls(Call::CameraClose), 1);
        assert_eq!(registry.open_count(Kind::Camera), 0);
    }

    #[test]
    fn explicit_release_is_not_repeated_on_drop() {
        let (lib, registry, fg) = setup(&[7]);

        let scoped = registry.scoped(camera(fg)).unwrap();
        scoped.release().unwrap();

        assert_eq!(lib.calls(Call::CameraClose), 1);
    }

    #[test]
    fn closing_a_stream_unregisters_in_order_then_deletes() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.open(camera(fg)).unwrap();
        let stream = registry.open(Target::Stream { camera: cam, frames: 2 }).unwrap();
        let entry = registry.stream(stream).unwrap();
        let api = registry.api().clone();

        let a = entry.register(&api, |_, _: &()| {}, ()).unwrap();
        let b = entry.register(&api, |_, _: &()| {}, ()).unwrap();

        registry.close(Kind::Stream, stream).unwrap();

        assert!(a.is_removed() && b.is_removed());
        assert_eq!(lib.calls(Call::CallbackUnregister), 2);
        assert_eq!(lib.calls(Call::StreamDelete), 1);
        assert!(!registry.is_open(Kind::Stream, stream));
    }

    #[test]
    fn failed_unregister_keeps_the_stream() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.open(camera(fg)).unwrap();
        let stream = registry.open(Target::Stream { camera: cam, frames: 2 }).unwrap();
        let entry = registry.stream(stream).unwrap();
        let api = registry.api().clone();
        entry.register(&api, |_, _: &()| {}, ()).unwrap();

        lib.fail(Call::CallbackUnregister);
        assert!(registry.close(Kind::Stream, stream).is_err());
        assert!(registry.is_open(Kind::Stream, stream));
        assert_eq!(entry.callback_count(), 1);
        assert_eq!(lib.calls(Call::StreamDelete), 0);

        lib.recover(Call::CallbackUnregister);
        registry.close(Kind::Stream, stream).unwrap();
        assert_eq!(lib.stream_count(), 0);
    }

    #[test]
    fn closing_a_grabber_closes_its_cameras_and_streams() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.open(camera(fg)).unwrap();
        registry.open(Target::Stream { camera: cam, frames: 2 }).unwrap();

        registry.close(Kind::Grabber, fg).unwrap();

        assert_eq!(lib.stream_count(), 0);
        assert!(!lib.is_camera_open(cam));
        assert!(!lib.is_grabber_open(0));
        assert_eq!(registry.open_count(Kind::Camera), 0);
    }

    #[test]
    fn removed_callbacks_do_not_pile_up() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.open(camera(fg)).unwrap();
        let stream = registry.open(Target::Stream { camera: cam, frames: 2 }).unwrap();
        let entry = registry.stream(stream).unwrap();
        let api = registry.api().clone();

        for _ in 0..100 {
            entry.register(&api, |_, _: &()| {}, ()).unwrap().remove().unwrap();
        }
        let kept = entry.register(&api, |_, _: &()| {}, ()).unwrap();

        assert_eq!(lock(&entry.callbacks).len(), 1);
        assert_eq!(entry.callback_count(), 1);
        assert_eq!(lib.callback_count(stream), 1);
        assert!(!kept.is_removed());
    }

    #[test]
    fn double_close_reaches_the_native_layer() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.open(camera(fg)).unwrap();

        registry.close(Kind::Camera, cam).unwrap();
        assert!(registry.close(Kind::Camera, cam).is_err());
        assert_eq!(lib.calls(Call::CameraClose), 2);
    }

    #[test]
    fn scoped_skips_what_a_cascade_already_closed() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.scoped(camera(fg)).unwrap();

        registry.close(Kind::Grabber, fg).unwrap();

        assert!(cam.release().is_ok());
        assert_eq!(lib.calls(Call::CameraClose), 1);
    }

    #[test]
    fn native_close_failure_keeps_the_entry() {
        let (lib, registry, fg) = setup(&[7]);
        let cam = registry.open(camera(fg)).unwrap();

        lib.fail(Call::CameraClose);
        assert!(matches!(registry.close(Kind::Camera, cam), Err(Error::NativeCallFailure { call: "camera_close", .. })));
        assert!(registry.is_open(Kind::Camera, cam));
    }
}
