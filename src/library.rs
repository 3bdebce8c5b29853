use crate::api::{Api, KY_DEVICE_INFO, KY_SOFTWARE_VERSION};
use crate::error::Error;
use crate::grabber::FrameGrabber;
use crate::info::{DeviceInfo, InitParams, SoftwareVersion};
use crate::registry::{Registry, Target};
use crate::{kycall, Result};
use std::sync::Arc;



/// Entry point: the native library plus the registry of everything opened
/// through it.
pub struct KyFg {
    api: Arc<dyn Api>,
    registry: Registry
}

impl KyFg {
    /// Wraps an already initialized library.
    pub fn new(api: Arc<dyn Api>) -> Self {
        let registry = Registry::new(api.clone());

        Self { api, registry }
    }

    pub fn with_params(api: Arc<dyn Api>, params: InitParams) -> Result<Self> {
        let lib = Self::new(api);
        lib.init(params)?;

        Ok(lib)
    }

    /// The linked KYFGLib, initialized with `params`.
    #[cfg(feature = "sdk")]
    pub fn sdk(params: InitParams) -> Result<Self> {
        Self::with_params(crate::api::KyfgLib::instance(), params)
    }

    pub fn init(&self, params: InitParams) -> Result<()> {
        kycall!(self.api, initialize, &params.to_c_struct())?;
        tracing::info!(?params, "library initialized");

        Ok(())
    }

    pub fn api(&self) -> &Arc<dyn Api> {
        &self.api
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn software_version(&self) -> Result<SoftwareVersion> {
        let mut version = KY_SOFTWARE_VERSION { struct_version: 2, ..Default::default() };

        kycall!(self.api, software_version, &mut version)?;

        Ok(SoftwareVersion::from_c_struct(version))
    }

    /// Scans for devices and returns how many were found. Device indices
    /// are only meaningful after a scan.
    pub fn scan(&self) -> Result<usize> {
        let mut count: i32 = 0;

        kycall!(self.api, device_scan, &mut count)?;
        tracing::debug!(count, "device scan");

        Ok(count.max(0) as usize)
    }

    pub fn grabber_info(&self, index: i32) -> Result<DeviceInfo> {
        let mut info = KY_DEVICE_INFO::default();

        kycall!(self.api, device_info, index, &mut info)?;

        Ok(DeviceInfo::from_c_struct(info))
    }

    /// Scans, then describes every device found.
    pub fn list_grabbers(&self) -> Result<Vec<DeviceInfo>> {
        (0..self.scan()? as i32).map(|i| self.grabber_info(i)).collect()
    }

    /// Scans, then opens the grabber at `index`.
    pub fn open_grabber(&self, index: i32) -> Result<FrameGrabber<'_>> {
        let count = self.scan()?;

        if index < 0 || index as usize >= count {
            return Err(Error::InvalidArgument(format!("grabber index {index} out of range ({count} found)")));
        }

        let scope = self.registry.scoped(Target::Grabber { index })?;

        Ok(FrameGrabber::new(self, index, scope))
    }

    /// Runs `f` with a grabber open, closing it afterwards.
    pub fn with_grabber<R>(&self, index: i32, f: impl FnOnce(&FrameGrabber<'_>) -> Result<R>) -> Result<R> {
        let grabber = self.open_grabber(index)?;
        let out = f(&grabber);
        let closed = grabber.close();

        match (out, closed) {
            (Err(e), Err(close)) => {
                tracing::warn!(index, "could not close grabber after an error: {close}");
                Err(e)
            },
            (out, closed) => {
                closed?;
                out
            }
        }
    }
}

impl std::fmt::Debug for KyFg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KyFg").field("registry", &self.registry).finish_non_exhaustive()
    }
}
