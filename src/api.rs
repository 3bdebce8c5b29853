//! The seam between this crate and the native library.
//!
//! [`Api`] mirrors the KYFGLib entry points one-to-one: status codes come
//! back untouched, out-parameters stay out-parameters, and a two-phase
//! transfer's "null destination" is spelled `None`. Everything above this
//! module is written against the trait, so the same code drives the real
//! library ([`KyfgLib`], `sdk` feature) or the simulation in
//! [`crate::mock`].

use crate::kyfg_sys::*;
use std::ffi::{c_void, CStr};

pub use crate::kyfg_sys::{
    KYFGCAMERA_INFO2, KYFGLib_InitParameters, KY_DEVICE_INFO, KY_SOFTWARE_VERSION,
    INVALID_CAMHANDLE, INVALID_FGHANDLE, INVALID_STREAMHANDLE,
};



pub type Status = FGSTATUS;
pub type FgHandle = FGHANDLE;
pub type CamHandle = CAMHANDLE;
pub type StreamHandle = STREAM_HANDLE;
pub type StreamBufferHandle = STREAM_BUFFER_HANDLE;
pub type BufferCallback = StreamBufferCallback;

pub const STATUS_OK: Status = FGSTATUS_OK;



/// Owner of a property catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    Grabber(FgHandle),
    Camera(CamHandle),
}

impl Device {
    pub fn handle(&self) -> u32 {
        match *self {
            Device::Grabber(h) | Device::Camera(h) => h,
        }
    }
}



pub trait Api: Send + Sync {
    fn initialize(&self, params: &KYFGLib_InitParameters) -> Status;
    fn software_version(&self, version: &mut KY_SOFTWARE_VERSION) -> Status;

    fn device_scan(&self, count: &mut i32) -> Status;
    fn device_info(&self, index: i32, info: &mut KY_DEVICE_INFO) -> Status;

    /// Returns [`INVALID_FGHANDLE`] when the grabber cannot be opened.
    fn grabber_open(&self, index: i32) -> FgHandle;
    fn grabber_close(&self, grabber: FgHandle) -> Status;

    /// `count` holds the capacity of `cameras` on entry and the number of
    /// detected cameras on return.
    fn update_camera_list(&self, grabber: FgHandle, cameras: &mut [CamHandle], count: &mut i32) -> Status;
    fn camera_open(&self, camera: CamHandle, xml_file: Option<&CStr>) -> Status;
    fn camera_close(&self, camera: CamHandle) -> Status;
    fn camera_info(&self, camera: CamHandle, info: &mut KYFGCAMERA_INFO2) -> Status;

    /// Raw `KY_CAM_PROPERTY_TYPE`. The native call has no status channel.
    fn value_type(&self, device: Device, name: &CStr) -> i32;

    fn get_int(&self, device: Device, name: &CStr, value: &mut i64) -> Status;
    fn get_float(&self, device: Device, name: &CStr, value: &mut f64) -> Status;
    fn get_bool(&self, device: Device, name: &CStr, value: &mut u8) -> Status;
    fn get_enum(&self, device: Device, name: &CStr, value: &mut i64) -> Status;
    fn get_command(&self, device: Device, name: &CStr, executed: &mut u8) -> Status;

    /// Two-phase: `dst == None` reports the required size (NUL included).
    fn get_string(&self, device: Device, name: &CStr, dst: Option<&mut [u8]>, size: &mut u32) -> Status;

    /// Two-phase, like [`Api::get_string`]. Cameras only.
    fn get_register(&self, camera: CamHandle, name: &CStr, dst: Option<&mut [u8]>, size: &mut u32) -> Status;

    fn set_int(&self, device: Device, name: &CStr, value: i64) -> Status;
    fn set_float(&self, device: Device, name: &CStr, value: f64) -> Status;
    fn set_bool(&self, device: Device, name: &CStr, value: u8) -> Status;
    fn set_string(&self, device: Device, name: &CStr, value: &CStr) -> Status;
    fn set_enum(&self, device: Device, name: &CStr, value: i64) -> Status;
    fn set_enum_by_name(&self, device: Device, name: &CStr, value: &CStr) -> Status;
    fn run_command(&self, device: Device, name: &CStr, value: i32) -> Status;
    fn set_register(&self, camera: CamHandle, name: &CStr, value: &[u8]) -> Status;

    fn stream_create(&self, camera: CamHandle, stream: &mut StreamHandle, frames: u32, index: i32) -> Status;
    fn stream_delete(&self, stream: StreamHandle) -> Status;

    fn callback_register(&self, stream: StreamHandle, callback: BufferCallback, user_context: *mut c_void) -> Status;
    fn callback_unregister(&self, stream: StreamHandle, callback: BufferCallback) -> Status;

    /// With `dst == None` reports the attribute's size and `KY_DATA_TYPE`.
    fn buffer_info(
        &self,
        buffer: StreamBufferHandle,
        cmd: i32,
        dst: Option<&mut [u8]>,
        size: Option<&mut u64>,
        data_type: Option<&mut i32>
    ) -> Status;

    fn camera_start(&self, camera: CamHandle, stream: StreamHandle, frames: u32) -> Status;
    fn camera_stop(&self, camera: CamHandle) -> Status;
}



#[cfg(feature = "sdk")]
pub use self::sdk::KyfgLib;

#[cfg(feature = "sdk")]
mod sdk {
    use super::*;
    use std::ffi::{c_char, c_int};
    use std::ptr;
    use std::sync::{Arc, Mutex, PoisonError, Weak};
    use lazy_static::lazy_static;

    lazy_static! {
        static ref INSTANCE: Mutex<Weak<KyfgLib>> = Mutex::new(Weak::new());
    }

    fn slot_ptr(dst: Option<&mut [u8]>) -> *mut c_void {
        match dst {
            Some(buf) => buf.as_mut_ptr() as *mut c_void,
            None => ptr::null_mut()
        }
    }

    /// The linked KYFGLib.
    ///
    /// The library keeps process-wide state, so every caller shares a single
    /// instance.
    pub struct KyfgLib {
        _private: ()
    }

    impl KyfgLib {
        pub fn instance() -> Arc<Self> {
            let mut weak = INSTANCE.lock().unwrap_or_else(PoisonError::into_inner);

            match weak.upgrade() {
                Some(lib) => lib,
                None => {
                    let lib = Arc::new(Self { _private: () });
                    *weak = Arc::downgrade(&lib);

                    lib
                }
            }
        }
    }

    impl Api for KyfgLib {
        fn initialize(&self, params: &KYFGLib_InitParameters) -> Status {
            unsafe { KYFGLib_Initialize(params) }
        }

        fn software_version(&self, version: &mut KY_SOFTWARE_VERSION) -> Status {
            unsafe { KY_GetSoftwareVersion(version) }
        }

        fn device_scan(&self, count: &mut i32) -> Status {
            unsafe { KY_DeviceScan(count) }
        }

        fn device_info(&self, index: i32, info: &mut KY_DEVICE_INFO) -> Status {
            unsafe { KY_DeviceInfo(index, info) }
        }

        fn grabber_open(&self, index: i32) -> FgHandle {
            unsafe { KYFG_Open(index) }
        }

        fn grabber_close(&self, grabber: FgHandle) -> Status {
            unsafe { KYFG_Close(grabber) }
        }

        fn update_camera_list(&self, grabber: FgHandle, cameras: &mut [CamHandle], count: &mut i32) -> Status {
            *count = (*count).min(cameras.len() as i32);

            unsafe { KYFG_UpdateCameraList(grabber, cameras.as_mut_ptr(), count) }
        }

        fn camera_open(&self, camera: CamHandle, xml_file: Option<&CStr>) -> Status {
            let xml = xml_file.map_or(ptr::null(), CStr::as_ptr);

            unsafe { KYFG_CameraOpen2(camera, xml) }
        }

        fn camera_close(&self, camera: CamHandle) -> Status {
            unsafe { KYFG_CameraClose(camera) }
        }

        fn camera_info(&self, camera: CamHandle, info: &mut KYFGCAMERA_INFO2) -> Status {
            unsafe { KYFG_CameraInfo2(camera, info) }
        }

        fn value_type(&self, device: Device, name: &CStr) -> i32 {
            match device {
                Device::Grabber(h) => unsafe { KYFG_GetGrabberValueType(h, name.as_ptr()) },
                Device::Camera(h) => unsafe { KYFG_GetCameraValueType(h, name.as_ptr()) },
            }
        }

        fn get_int(&self, device: Device, name: &CStr, value: &mut i64) -> Status {
            get_value(device, name, value as *mut i64 as *mut c_void)
        }

        fn get_float(&self, device: Device, name: &CStr, value: &mut f64) -> Status {
            get_value(device, name, value as *mut f64 as *mut c_void)
        }

        fn get_bool(&self, device: Device, name: &CStr, value: &mut u8) -> Status {
            get_value(device, name, value as *mut u8 as *mut c_void)
        }

        fn get_enum(&self, device: Device, name: &CStr, value: &mut i64) -> Status {
            get_value(device, name, value as *mut i64 as *mut c_void)
        }

        fn get_command(&self, device: Device, name: &CStr, executed: &mut u8) -> Status {
            get_value(device, name, executed as *mut u8 as *mut c_void)
        }

        fn get_string(&self, device: Device, name: &CStr, dst: Option<&mut [u8]>, size: &mut u32) -> Status {
            let dst = slot_ptr(dst) as *mut c_char;

            match device {
                Device::Grabber(h) => unsafe { KYFG_GetGrabberValueStringCopy(h, name.as_ptr(), dst, size) },
                Device::Camera(h) => unsafe { KYFG_GetCameraValueStringCopy(h, name.as_ptr(), dst, size) },
            }
        }

        fn get_register(&self, camera: CamHandle, name: &CStr, dst: Option<&mut [u8]>, size: &mut u32) -> Status {
            unsafe { KYFG_GetCameraValueRegister(camera, name.as_ptr(), slot_ptr(dst), size) }
        }

        fn set_int(&self, device: Device, name: &CStr, value: i64) -> Status {
            match device {
                Device::Grabber(h) => unsafe { KYFG_SetGrabberValueInt(h, name.as_ptr(), value) },
                Device::Camera(h) => unsafe { KYFG_SetCameraValueInt(h, name.as_ptr(), value) },
            }
        }

        fn set_float(&self, device: Device, name: &CStr, value: f64) -> Status {
            match device {
                Device::Grabber(h) => unsafe { KYFG_SetGrabberValueFloat(h, name.as_ptr(), value) },
                Device::Camera(h) => unsafe { KYFG_SetCameraValueFloat(h, name.as_ptr(), value) },
            }
        }

        fn set_bool(&self, device: Device, name: &CStr, value: u8) -> Status {
            match device {
                Device::Grabber(h) => unsafe { KYFG_SetGrabberValueBool(h, name.as_ptr(), value) },
                Device::Camera(h) => unsafe { KYFG_SetCameraValueBool(h, name.as_ptr(), value) },
            }
        }

        fn set_string(&self, device: Device, name: &CStr, value: &CStr) -> Status {
            match device {
                Device::Grabber(h) => unsafe { KYFG_SetGrabberValueString(h, name.as_ptr(), value.as_ptr()) },
                Device::Camera(h) => unsafe { KYFG_SetCameraValueString(h, name.as_ptr(), value.as_ptr()) },
            }
        }

        fn set_enum(&self, device: Device, name: &CStr, value: i64) -> Status {
            match device {
                Device::Grabber(h) => unsafe { KYFG_SetGrabberValueEnum(h, name.as_ptr(), value) },
                Device::Camera(h) => unsafe { KYFG_SetCameraValueEnum(h, name.as_ptr(), value) },
            }
        }

        fn set_enum_by_name(&self, device: Device, name: &CStr, value: &CStr) -> Status {
            match device {
                Device::Grabber(h) => unsafe {
                    KYFG_SetGrabberValueEnum_ByValueName(h, name.as_ptr(), value.as_ptr())
                },
                Device::Camera(h) => unsafe {
                    KYFG_SetCameraValueEnum_ByValueName(h, name.as_ptr(), value.as_ptr())
                },
            }
        }

        fn run_command(&self, device: Device, name: &CStr, value: i32) -> Status {
            let value: c_int = value;
            let value = &value as *const c_int as *const c_void;

            match device {
                Device::Grabber(h) => unsafe { KYFG_SetGrabberValue(h, name.as_ptr(), value) },
                Device::Camera(h) => unsafe { KYFG_SetCameraValue(h, name.as_ptr(), value) },
            }
        }

        fn set_register(&self, camera: CamHandle, name: &CStr, value: &[u8]) -> Status {
            unsafe { KYFG_SetCameraValue(camera, name.as_ptr(), value.as_ptr() as *const c_void) }
        }

        fn stream_create(&self, camera: CamHandle, stream: &mut StreamHandle, frames: u32, index: i32) -> Status {
            unsafe { KYFG_StreamCreateAndAlloc(camera, stream, frames, index) }
        }

        fn stream_delete(&self, stream: StreamHandle) -> Status {
            unsafe { KYFG_StreamDelete(stream) }
        }

        fn callback_register(&self, stream: StreamHandle, callback: BufferCallback, user_context: *mut c_void) -> Status {
            unsafe { KYFG_StreamBufferCallbackRegister(stream, callback, user_context) }
        }

        fn callback_unregister(&self, stream: StreamHandle, callback: BufferCallback) -> Status {
            unsafe { KYFG_StreamBufferCallbackUnregister(stream, callback) }
        }

        fn buffer_info(
            &self,
            buffer: StreamBufferHandle,
            cmd: i32,
            dst: Option<&mut [u8]>,
            size: Option<&mut u64>,
            data_type: Option<&mut i32>
        ) -> Status {
            let size = size.map_or(ptr::null_mut(), |s| s as *mut u64);
            let data_type = data_type.map_or(ptr::null_mut(), |t| t as *mut i32);

            unsafe { KYFG_BufferGetInfo(buffer, cmd, slot_ptr(dst), size, data_type) }
        }

        fn camera_start(&self, camera: CamHandle, stream: StreamHandle, frames: u32) -> Status {
            unsafe { KYFG_CameraStart(camera, stream, frames) }
        }

        fn camera_stop(&self, camera: CamHandle) -> Status {
            unsafe { KYFG_CameraStop(camera) }
        }
    }

    fn get_value(device: Device, name: &CStr, value: *mut c_void) -> Status {
        match device {
            Device::Grabber(h) => unsafe { KYFG_GetGrabberValue(h, name.as_ptr(), value) },
            Device::Camera(h) => unsafe { KYFG_GetCameraValue(h, name.as_ptr(), value) },
        }
    }
}
