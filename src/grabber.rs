use crate::api::{CamHandle, Device, FgHandle};
use crate::camera::Camera;
use crate::info::DeviceInfo;
use crate::library::KyFg;
use crate::property::{self, HasProperties, PropertyType, Value};
use crate::registry::{Kind, Registry, Scoped, Target};
use crate::Result;
use std::path::Path;



/// An open frame grabber. Closed when dropped, along with any camera
/// still open on it.
pub struct FrameGrabber<'a> {
    lib: &'a KyFg,
    index: i32,
    scope: Scoped<'a>
}

impl<'a> FrameGrabber<'a> {
    pub(crate) fn new(lib: &'a KyFg, index: i32, scope: Scoped<'a>) -> Self {
        Self { lib, index, scope }
    }

    pub fn handle(&self) -> FgHandle {
        self.scope.handle()
    }

    /// Scan index the grabber was opened with.
    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn library(&self) -> &'a KyFg {
        self.lib
    }

    pub(crate) fn registry(&self) -> &'a Registry {
        self.scope.registry()
    }

    pub fn is_connected(&self) -> bool {
        self.registry().is_open(Kind::Grabber, self.handle())
    }

    pub fn info(&self) -> Result<DeviceInfo> {
        self.lib.grabber_info(self.index)
    }

    /// Handles of the cameras the grabber currently detects.
    pub fn camera_handles(&self) -> Result<Vec<CamHandle>> {
        self.registry().camera_handles(self.handle())
    }

    /// Opens a camera. Exactly one camera must be detected on the grabber.
    pub fn open_camera(&self, index: usize) -> Result<Camera<'_>> {
        Camera::open(self, Target::Camera { grabber: self.handle(), index, xml_file: None })
    }

    /// Like [`FrameGrabber::open_camera`], describing the camera with a
    /// GenICam XML file instead of the one stored on the device.
    pub fn open_camera_with_xml(&self, index: usize, xml_file: &Path) -> Result<Camera<'_>> {
        Camera::open(self, Target::Camera {
            grabber: self.handle(),
            index,
            xml_file: Some(xml_file.to_path_buf())
        })
    }

    /// Runs `f` with a camera open, closing it afterwards.
    pub fn with_camera<R>(&self, index: usize, f: impl FnOnce(&Camera<'_>) -> Result<R>) -> Result<R> {
        let camera = self.open_camera(index)?;
        let out = f(&camera);
        let closed = camera.close();

        match (out, closed) {
            (Err(e), Err(close)) => {
                tracing::warn!(grabber = self.handle(), "could not close camera after an error: {close}");
                Err(e)
            },
            (out, closed) => {
                closed?;
                out
            }
        }
    }

    pub fn close(self) -> Result<()> {
        self.scope.release()
    }
}

impl<'a> HasProperties for FrameGrabber<'a> {
    fn property_type(&self, name: &str) -> Result<PropertyType> {
        property::resolve_type(self.lib.api().as_ref(), Device::Grabber(self.handle()), name)
    }

    fn get_property(&self, name: &str) -> Result<Option<Value>> {
        property::get(self.lib.api().as_ref(), Device::Grabber(self.handle()), name)
    }

    fn set_property(&self, name: &str, value: Value) -> Result<()> {
        property::set(self.lib.api().as_ref(), Device::Grabber(self.handle()), name, value)
    }
}

impl<'a> std::fmt::Debug for FrameGrabber<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGrabber")
            .field("handle", &self.handle())
            .field("index", &self.index)
            .finish()
    }
}
