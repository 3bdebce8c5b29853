use crate::api::{KYFGCAMERA_INFO2, KYFGLib_InitParameters, KY_DEVICE_INFO, KY_SOFTWARE_VERSION};
use crate::kyfg_sys::{KY_DEVICE_INFO_FLAGS::*, KY_DEVICE_PROTOCOL::*};
use crate::util::fixed_to_string;
use std::fmt;
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;



/// Library initialization parameters, in the layout of `version` 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitParams {
    pub version: u32,
    pub concurrency_mode: u32,
    pub logging_mode: u32,
    pub no_video_stream_process: bool
}

impl Default for InitParams {
    fn default() -> Self {
        Self { version: 2, concurrency_mode: 0, logging_mode: 0, no_video_stream_process: false }
    }
}

impl InitParams {
    pub(crate) fn to_c_struct(self) -> KYFGLib_InitParameters {
        KYFGLib_InitParameters {
            version: self.version,
            concurrency_mode: self.concurrency_mode,
            logging_mode: self.logging_mode,
            noVideoStreamProcess: self.no_video_stream_process
        }
    }
}



#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftwareVersion {
    pub major: u16,
    pub minor: u16,
    pub sub_minor: u16,
    pub beta: u16,
    pub rc: u16,
    pub alpha: u16
}

impl SoftwareVersion {
    pub(crate) fn from_c_struct(v: KY_SOFTWARE_VERSION) -> Self {
        Self {
            major: v.Major,
            minor: v.Minor,
            sub_minor: v.SubMinor,
            beta: v.Beta,
            rc: v.RC,
            alpha: v.Alpha
        }
    }
}

impl fmt::Display for SoftwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.sub_minor)
    }
}



bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DeviceFlags: u8 {
        const GRABBER = DEVICE_FLAG_GRABBER;
        const GENERATOR = DEVICE_FLAG_GENERATOR;
        const MIXER = DEVICE_FLAG_MIXER;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum DeviceProtocol {
    CoaXPress = KY_DEVICE_PROTOCOL_CoaXPress as isize,
    Clhs = KY_DEVICE_PROTOCOL_CLHS as isize,
    GigE = KY_DEVICE_PROTOCOL_GigE as isize,
    Mixed = KY_DEVICE_PROTOCOL_Mixed as isize,
    Unknown = KY_DEVICE_PROTOCOL_Unknown as isize
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub bus: i32,
    pub slot: i32,
    pub function: i32,
    pub pid: u32,
    pub is_virtual: bool,
    pub flags: DeviceFlags,
    pub protocol: DeviceProtocol,
    pub generation: u32
}

impl DeviceInfo {
    pub(crate) fn from_c_struct(info: KY_DEVICE_INFO) -> Self {
        // Copy out of the packed struct before use.
        let KY_DEVICE_INFO {
            szDeviceDisplayName, nBus, nSlot, nFunction, DevicePID,
            isVirtual, m_Flags, m_Protocol, DeviceGeneration, ..
        } = info;

        Self {
            name: fixed_to_string(&szDeviceDisplayName),
            bus: nBus,
            slot: nSlot,
            function: nFunction,
            pid: DevicePID,
            is_virtual: isVirtual != 0,
            flags: DeviceFlags::from_bits_truncate(m_Flags),
            protocol: DeviceProtocol::from_u32(m_Protocol).unwrap_or(DeviceProtocol::Unknown),
            generation: DeviceGeneration
        }
    }

    pub fn is_grabber(&self) -> bool {
        self.flags.contains(DeviceFlags::GRABBER)
    }
}



#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    pub master_link: u8,
    pub link_mask: u8,
    pub link_speed: i32,
    pub stream_id: u32,
    pub version: String,
    pub vendor_name: String,
    pub manufacturer_info: String,
    pub model_name: String,
    pub id: String,
    pub user_id: String,
    pub firmware_version: String,
    pub output_camera: bool,
    pub virtual_camera: bool
}

impl CameraInfo {
    pub(crate) fn from_c_struct(info: KYFGCAMERA_INFO2) -> Self {
        let KYFGCAMERA_INFO2 {
            master_link, link_mask, link_speed, stream_id, deviceVersion,
            deviceVendorName, deviceManufacturerInfo, deviceModelName, deviceID,
            deviceUserID, outputCamera, virtualCamera, deviceFirmwareVersion, ..
        } = info;

        Self {
            master_link,
            link_mask,
            link_speed,
            stream_id,
            version: fixed_to_string(&deviceVersion),
            vendor_name: fixed_to_string(&deviceVendorName),
            manufacturer_info: fixed_to_string(&deviceManufacturerInfo),
            model_name: fixed_to_string(&deviceModelName),
            id: fixed_to_string(&deviceID),
            user_id: fixed_to_string(&deviceUserID),
            firmware_version: fixed_to_string(&deviceFirmwareVersion),
            output_camera: outputCamera,
            virtual_camera: virtualCamera
        }
    }
}
