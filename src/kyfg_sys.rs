#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals, dead_code)]

//! Raw declarations mirroring `KYFGLib.h`.

use std::ffi::{c_char, c_int, c_void};



pub type FGSTATUS = u32;
pub type FGHANDLE = u32;
pub type CAMHANDLE = u32;
pub type STREAM_HANDLE = u32;
pub type STREAM_BUFFER_HANDLE = u64;

pub type StreamBufferCallback =
    unsafe extern "C" fn(buffer_handle: STREAM_BUFFER_HANDLE, user_context: *mut c_void);

pub const FGSTATUS_OK: FGSTATUS = 0x3000;

pub const INVALID_FGHANDLE: FGHANDLE = 0xFFFF_FFFF;
pub const INVALID_CAMHANDLE: CAMHANDLE = 0xFFFF_FFFF;
pub const INVALID_STREAMHANDLE: STREAM_HANDLE = 0xFFFF_FFFF;

pub const KY_MAX_DEVICE_INFO_NAME_SIZE: usize = 256;
pub const KY_MAX_CAMERA_INFO_STRING_SIZE: usize = 64;
pub const KY_MAX_CAMERAS: usize = 16;

pub mod KY_CAM_PROPERTY_TYPE {
    pub const PROPERTY_TYPE_UNKNOWN: i32 = -1;
    pub const PROPERTY_TYPE_INT: i32 = 0x00;
    pub const PROPERTY_TYPE_BOOL: i32 = 0x01;
    pub const PROPERTY_TYPE_STRING: i32 = 0x02;
    pub const PROPERTY_TYPE_FLOAT: i32 = 0x03;
    pub const PROPERTY_TYPE_ENUM: i32 = 0x04;
    pub const PROPERTY_TYPE_COMMAND: i32 = 0x05;
    pub const PROPERTY_TYPE_REGISTER: i32 = 0x06;
}

pub mod KY_STREAM_BUFFER_INFO_CMD {
    pub const KY_STREAM_BUFFER_INFO_BASE: i32 = 0;
    pub const KY_STREAM_BUFFER_INFO_SIZE: i32 = 1;
    pub const KY_STREAM_BUFFER_INFO_PTR: i32 = 2;
    pub const KY_STREAM_BUFFER_INFO_TIMESTAMP: i32 = 3;
    pub const KY_STREAM_BUFFER_INFO_INSTANTFPS: i32 = 4;
    pub const KY_STREAM_BUFFER_INFO_IMAGEID: i32 = 16;
    pub const KY_STREAM_BUFFER_INFO_ID: i32 = 1000;
    pub const KY_STREAM_BUFFER_INFO_STREAM_HANDLE: i32 = 1001;
}

pub mod KY_DATA_TYPE {
    pub const KY_DATATYPE_UNKNOWN: i32 = 0;
    pub const KY_DATATYPE_STRING: i32 = 1;
    pub const KY_DATATYPE_STRINGLIST: i32 = 2;
    pub const KY_DATATYPE_INT16: i32 = 3;
    pub const KY_DATATYPE_UINT16: i32 = 4;
    pub const KY_DATATYPE_INT32: i32 = 5;
    pub const KY_DATATYPE_UINT32: i32 = 6;
    pub const KY_DATATYPE_INT64: i32 = 7;
    pub const KY_DATATYPE_UINT64: i32 = 8;
    pub const KY_DATATYPE_FLOAT64: i32 = 9;
    pub const KY_DATATYPE_PTR: i32 = 10;
    pub const KY_DATATYPE_BOOL8: i32 = 11;
    pub const KY_DATATYPE_SIZET: i32 = 12;
    pub const KY_DATATYPE_BUFFER: i32 = 13;
    pub const KY_DATATYPE_HANDLE: i32 = 1001;
    pub const KY_DATATYPE_CAMHANDLE: i32 = 1002;
}

pub mod KY_DEVICE_PROTOCOL {
    pub const KY_DEVICE_PROTOCOL_CoaXPress: u32 = 0x0;
    pub const KY_DEVICE_PROTOCOL_CLHS: u32 = 0x1;
    pub const KY_DEVICE_PROTOCOL_GigE: u32 = 0x2;
    pub const KY_DEVICE_PROTOCOL_Mixed: u32 = 0xFF;
    pub const KY_DEVICE_PROTOCOL_Unknown: u32 = 0xFFFF;
}

pub mod KY_DEVICE_INFO_FLAGS {
    pub const DEVICE_FLAG_GRABBER: u8 = 0x1;
    pub const DEVICE_FLAG_GENERATOR: u8 = 0x2;
    pub const DEVICE_FLAG_MIXER: u8 = 0x4;
}



#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct KYFGLib_InitParameters {
    pub version: u32,
    // since version 1
    pub concurrency_mode: u32,
    pub logging_mode: u32,
    // since version 2
    pub noVideoStreamProcess: bool,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct KY_SOFTWARE_VERSION {
    pub struct_version: u16,
    pub Major: u16,
    pub Minor: u16,
    pub SubMinor: u16,
    // since version 1
    pub Beta: u16,
    pub RC: u16,
    // since version 2
    pub Alpha: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct KY_DEVICE_INFO {
    pub version: u32,
    pub szDeviceDisplayName: [c_char; KY_MAX_DEVICE_INFO_NAME_SIZE],
    pub nBus: c_int,
    pub nSlot: c_int,
    pub nFunction: c_int,
    pub DevicePID: u32,
    pub isVirtual: u8,
    pub m_Flags: u8,
    pub m_Protocol: u32,
    pub DeviceGeneration: u32,
}

impl Default for KY_DEVICE_INFO {
    fn default() -> Self {
        // Plain integers and byte arrays, all-zero is a valid value.
        let mut info: Self = unsafe { std::mem::zeroed() };
        info.version = 4;
        info
    }
}

pub type CameraInfoString = [c_char; KY_MAX_CAMERA_INFO_STRING_SIZE + 1];

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct KYFGCAMERA_INFO2 {
    pub version: c_int,
    pub master_link: u8,
    pub link_mask: u8,
    pub link_speed: c_int,
    pub stream_id: u32,
    pub deviceVersion: CameraInfoString,
    pub deviceVendorName: CameraInfoString,
    pub deviceManufacturerInfo: CameraInfoString,
    pub deviceModelName: CameraInfoString,
    pub deviceID: CameraInfoString,
    pub deviceUserID: CameraInfoString,
    pub outputCamera: bool,
    pub virtualCamera: bool,
    pub deviceFirmwareVersion: CameraInfoString,
}

impl Default for KYFGCAMERA_INFO2 {
    fn default() -> Self {
        let mut info: Self = unsafe { std::mem::zeroed() };
        info.version = 1;
        info
    }
}



#[cfg(feature = "sdk")]
extern "C" {
    pub fn KYFGLib_Initialize(params: *const KYFGLib_InitParameters) -> FGSTATUS;
    pub fn KY_GetSoftwareVersion(version: *mut KY_SOFTWARE_VERSION) -> FGSTATUS;

    pub fn KY_DeviceScan(count: *mut c_int) -> FGSTATUS;
    pub fn KY_DeviceInfo(index: c_int, info: *mut KY_DEVICE_INFO) -> FGSTATUS;

    pub fn KYFG_Open(index: c_int) -> FGHANDLE;
    pub fn KYFG_Close(handle: FGHANDLE) -> FGSTATUS;

    pub fn KYFG_UpdateCameraList(
        handle: FGHANDLE, cameras: *mut CAMHANDLE, count: *mut c_int
    ) -> FGSTATUS;
    pub fn KYFG_CameraOpen2(camera: CAMHANDLE, xml_file: *const c_char) -> FGSTATUS;
    pub fn KYFG_CameraClose(camera: CAMHANDLE) -> FGSTATUS;
    pub fn KYFG_CameraInfo2(camera: CAMHANDLE, info: *mut KYFGCAMERA_INFO2) -> FGSTATUS;

    pub fn KYFG_GetGrabberValueType(handle: FGHANDLE, name: *const c_char) -> c_int;
    pub fn KYFG_GetGrabberValue(handle: FGHANDLE, name: *const c_char, value: *mut c_void) -> FGSTATUS;
    pub fn KYFG_GetGrabberValueStringCopy(
        handle: FGHANDLE, name: *const c_char, value: *mut c_char, size: *mut u32
    ) -> FGSTATUS;
    pub fn KYFG_SetGrabberValue(handle: FGHANDLE, name: *const c_char, value: *const c_void) -> FGSTATUS;
    pub fn KYFG_SetGrabberValueInt(handle: FGHANDLE, name: *const c_char, value: i64) -> FGSTATUS;
    pub fn KYFG_SetGrabberValueFloat(handle: FGHANDLE, name: *const c_char, value: f64) -> FGSTATUS;
    pub fn KYFG_SetGrabberValueBool(handle: FGHANDLE, name: *const c_char, value: u8) -> FGSTATUS;
    pub fn KYFG_SetGrabberValueString(
        handle: FGHANDLE, name: *const c_char, value: *const c_char
    ) -> FGSTATUS;
    pub fn KYFG_SetGrabberValueEnum(handle: FGHANDLE, name: *const c_char, value: i64) -> FGSTATUS;
    pub fn KYFG_SetGrabberValueEnum_ByValueName(
        handle: FGHANDLE, name: *const c_char, value: *const c_char
    ) -> FGSTATUS;

    pub fn KYFG_GetCameraValueType(camera: CAMHANDLE, name: *const c_char) -> c_int;
    pub fn KYFG_GetCameraValue(camera: CAMHANDLE, name: *const c_char, value: *mut c_void) -> FGSTATUS;
    pub fn KYFG_GetCameraValueStringCopy(
        camera: CAMHANDLE, name: *const c_char, value: *mut c_char, size: *mut u32
    ) -> FGSTATUS;
    pub fn KYFG_GetCameraValueRegister(
        camera: CAMHANDLE, name: *const c_char, value: *mut c_void, size: *mut u32
    ) -> FGSTATUS;
    pub fn KYFG_SetCameraValue(camera: CAMHANDLE, name: *const c_char, value: *const c_void) -> FGSTATUS;
    pub fn KYFG_SetCameraValueInt(camera: CAMHANDLE, name: *const c_char, value: i64) -> FGSTATUS;
    pub fn KYFG_SetCameraValueFloat(camera: CAMHANDLE, name: *const c_char, value: f64) -> FGSTATUS;
    pub fn KYFG_SetCameraValueBool(camera: CAMHANDLE, name: *const c_char, value: u8) -> FGSTATUS;
    pub fn KYFG_SetCameraValueString(
        camera: CAMHANDLE, name: *const c_char, value: *const c_char
    ) -> FGSTATUS;
    pub fn KYFG_SetCameraValueEnum(camera: CAMHANDLE, name: *const c_char, value: i64) -> FGSTATUS;
    pub fn KYFG_SetCameraValueEnum_ByValueName(
        camera: CAMHANDLE, name: *const c_char, value: *const c_char
    ) -> FGSTATUS;

    pub fn KYFG_StreamCreateAndAlloc(
        camera: CAMHANDLE, stream: *mut STREAM_HANDLE, frames: u32, index: c_int
    ) -> FGSTATUS;
    pub fn KYFG_StreamDelete(stream: STREAM_HANDLE) -> FGSTATUS;
    pub fn KYFG_StreamBufferCallbackRegister(
        stream: STREAM_HANDLE, callback: StreamBufferCallback, user_context: *mut c_void
    ) -> FGSTATUS;
    pub fn KYFG_StreamBufferCallbackUnregister(
        stream: STREAM_HANDLE, callback: StreamBufferCallback
    ) -> FGSTATUS;
    pub fn KYFG_BufferGetInfo(
        buffer: STREAM_BUFFER_HANDLE,
        cmd: c_int,
        info: *mut c_void,
        size: *mut u64,
        data_type: *mut c_int
    ) -> FGSTATUS;

    pub fn KYFG_CameraStart(camera: CAMHANDLE, stream: STREAM_HANDLE, frames: u32) -> FGSTATUS;
    pub fn KYFG_CameraStop(camera: CAMHANDLE) -> FGSTATUS;
}
