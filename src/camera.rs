use crate::acquisition::{self, AcquisitionState, Completion, Interrupter};
use crate::api::{CamHandle, Device, KYFGCAMERA_INFO2};
use crate::buffer::Frame;
use crate::error::Error;
use crate::format::FrameLayout;
use crate::grabber::FrameGrabber;
use crate::info::CameraInfo;
use crate::property::{self, HasProperties, PropertyType, Value};
use crate::registry::{CameraEntry, Kind, Scoped, Target};
use crate::stream::Stream;
use crate::{kycall, Result};
use std::sync::Arc;
use std::time::Duration;



#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartOptions {
    /// Install the frame-collecting callback if the stream has none.
    pub use_default_callback: bool,
    /// Arm the completion signal so [`Camera::await_acquisition`] blocks.
    pub block: bool
}

impl Default for StartOptions {
    fn default() -> Self {
        Self { use_default_callback: true, block: true }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Roi {
    pub offset_x: i64,
    pub offset_y: i64,
    pub width: i64,
    pub height: i64
}



pub struct Camera<'a> {
    grabber: &'a FrameGrabber<'a>,
    scope: Scoped<'a>,
    entry: Arc<CameraEntry>
}

impl<'a> Camera<'a> {
    pub(crate) fn open(grabber: &'a FrameGrabber<'a>, target: Target) -> Result<Self> {
        let scope = grabber.registry().scoped(target)?;
        let entry = scope.registry().camera(scope.handle()).ok_or_else(|| {
            Error::DeviceUnavailable(format!("camera {:#x} is not registered", scope.handle()))
        })?;

        Ok(Self { grabber, scope, entry })
    }

    pub fn handle(&self) -> CamHandle {
        self.scope.handle()
    }

    /// Position of the camera in its grabber's detection list.
    pub fn index(&self) -> usize {
        self.entry.index
    }

    pub fn grabber(&self) -> &'a FrameGrabber<'a> {
        self.grabber
    }

    pub fn is_connected(&self) -> bool {
        self.scope.registry().is_open(Kind::Camera, self.handle())
    }

    pub fn info(&self) -> Result<CameraInfo> {
        let mut info = KYFGCAMERA_INFO2::default();

        kycall!(self.scope.registry().api(), camera_info, self.handle(), &mut info)?;

        Ok(CameraInfo::from_c_struct(info))
    }

    pub fn open_stream(&self, frames: u32) -> Result<Stream<'_>> {
        let scope = self.scope.registry().scoped(Target::Stream { camera: self.handle(), frames })?;
        let entry = scope.registry().stream(scope.handle()).ok_or_else(|| {
            Error::DeviceUnavailable(format!("stream {:#x} is not registered", scope.handle()))
        })?;

        Ok(Stream::new(self, scope, entry))
    }

    /// Runs `f` with a stream of `frames` buffers, freeing it afterwards.
    pub fn with_stream<R>(&self, frames: u32, f: impl FnOnce(&Stream<'_>) -> Result<R>) -> Result<R> {
        let stream = self.open_stream(frames)?;
        let out = f(&stream);
        let freed = stream.free();

        match (out, freed) {
            (Err(e), Err(free)) => {
                tracing::warn!(camera = self.handle(), "could not free stream after an error: {free}");
                Err(e)
            },
            (out, freed) => {
                freed?;
                out
            }
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.entry.acquisition.state()
    }

    pub fn is_working(&self) -> bool {
        self.entry.acquisition.is_working()
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter(self.entry.acquisition.clone())
    }

    /// Starts acquiring into the open stream. `frames == 0` acquires until
    /// stopped.
    pub fn start(&self, frames: u32, options: StartOptions) -> Result<()> {
        let acquisition = &self.entry.acquisition;
        let registry = self.scope.registry();

        acquisition.begin_start(options.block)?;

        let started = (|| {
            let stream = registry.stream_of_camera(self.handle()).ok_or(Error::NoStream)?;

            if options.use_default_callback && stream.callback_count() == 0 {
                let collector = acquisition::collector(acquisition.clone(), stream.frames_sink());

                stream.register_buffer_callback(registry.api(), collector)?;
            }

            kycall!(registry.api(), camera_start, self.handle(), stream.handle, frames)
        })();

        acquisition.end_start(started.is_ok());

        if started.is_ok() {
            tracing::info!(camera = self.handle(), frames, "acquisition started");
        }

        started
    }

    pub fn stop(&self) -> Result<()> {
        let acquisition = &self.entry.acquisition;

        acquisition.begin_stop()?;

        let stopped = kycall!(self.scope.registry().api(), camera_stop, self.handle());
        acquisition.end_stop(stopped.is_ok());

        if stopped.is_ok() {
            tracing::info!(camera = self.handle(), "acquisition stopped");
        }

        stopped
    }

    /// Blocks until the acquisition is finished or interrupted, or until
    /// `timeout`. Returns at once if the acquisition was started without
    /// blocking.
    pub fn await_acquisition(&self, timeout: Option<Duration>) -> Completion {
        self.entry.acquisition.wait(timeout)
    }

    /// Wakes [`Camera::await_acquisition`]. Meant for callbacks.
    pub fn finish_acquisition(&self) {
        self.entry.acquisition.finish();
    }

    /// Starts, waits, and stops, returning the frames collected by the
    /// default callback. The camera is stopped on every path out once it
    /// has started.
    pub fn capture(&self, frames: u32, timeout: Option<Duration>, block: bool) -> Result<Vec<Frame>> {
        self.start(frames, StartOptions { use_default_callback: true, block })?;

        let completion = self.await_acquisition(timeout);
        let stopped = self.stop();

        if completion == Completion::Interrupted {
            if let Err(e) = stopped {
                tracing::warn!(camera = self.handle(), "could not stop an interrupted acquisition: {e}");
            }

            return Err(Error::Interrupted);
        }

        if completion == Completion::TimedOut {
            tracing::debug!(camera = self.handle(), ?timeout, "capture timed out");
        }

        stopped?;

        let stream = self.scope.registry().stream_of_camera(self.handle()).ok_or(Error::NoStream)?;

        Ok(stream.take_frames())
    }

    /// Refused while acquiring, like [`Camera::set_roi`].
    pub fn roi(&self) -> Result<Roi> {
        if self.is_working() { return Err(Error::AlreadyWorking); }

        Ok(Roi {
            offset_x: self.get_int("OffsetX")?,
            offset_y: self.get_int("OffsetY")?,
            width: self.get_int("Width")?,
            height: self.get_int("Height")?
        })
    }

    pub fn set_roi(&self, roi: Roi) -> Result<()> {
        if self.is_working() { return Err(Error::AlreadyWorking); }

        self.set_properties([
            ("OffsetX", Value::Int(roi.offset_x)),
            ("OffsetY", Value::Int(roi.offset_y)),
            ("Width", Value::Int(roi.width)),
            ("Height", Value::Int(roi.height))
        ])
    }

    /// Centers a `width` x `height` region on the sensor.
    pub fn center_roi(&self, width: i64, height: i64) -> Result<()> {
        let (max_w, max_h) = (self.get_int("WidthMax")?, self.get_int("HeightMax")?);

        if width > max_w || height > max_h || width <= 0 || height <= 0 {
            return Err(Error::InvalidArgument(format!(
                "{width}x{height} does not fit the {max_w}x{max_h} sensor"
            )));
        }

        self.set_roi(Roi { offset_x: (max_w - width) / 2, offset_y: (max_h - height) / 2, width, height })
    }

    pub fn frame_layout(&self) -> Result<FrameLayout> {
        FrameLayout::from_properties(self)
    }

    pub fn close(self) -> Result<()> {
        self.scope.release()
    }
}

impl<'a> HasProperties for Camera<'a> {
    fn property_type(&self, name: &str) -> Result<PropertyType> {
        property::resolve_type(self.scope.registry().api().as_ref(), Device::Camera(self.handle()), name)
    }

    fn get_property(&self, name: &str) -> Result<Option<Value>> {
        property::get(self.scope.registry().api().as_ref(), Device::Camera(self.handle()), name)
    }

    fn set_property(&self, name: &str, value: Value) -> Result<()> {
        property::set(self.scope.registry().api().as_ref(), Device::Camera(self.handle()), name, value)
    }
}

impl<'a> std::fmt::Debug for Camera<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("handle", &self.handle())
            .field("grabber", &self.grabber.handle())
            .field("index", &self.index())
            .finish()
    }
}
