//! An in-process stand-in for KYFGLib.
//!
//! `MockLib` implements [`Api`] with the same calling conventions as the
//! real library (status codes, two-phase transfers, function-pointer
//! callbacks) so everything above the seam can be exercised without
//! hardware. A grabber's handle is its scan index.

use crate::api::*;
use crate::kyfg_sys::{KY_DATA_TYPE::*, KY_DEVICE_INFO_FLAGS::*, KY_DEVICE_PROTOCOL::*};
use crate::kyfg_sys::KY_CAM_PROPERTY_TYPE::*;
use crate::kyfg_sys::KY_STREAM_BUFFER_INFO_CMD::*;
use crate::util::string_to_fixed;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;



pub const MOCK_STATUS_FAILURE: Status = 0x3001;
pub const MOCK_STATUS_INVALID_HANDLE: Status = 0x3002;
pub const MOCK_STATUS_NOT_FOUND: Status = 0x3003;
pub const MOCK_STATUS_WRONG_TYPE: Status = 0x3004;
pub const MOCK_STATUS_INVALID_VALUE: Status = 0x3005;
/// Returned when the destination of a two-phase transfer is smaller than
/// the size reported by the probe call. Nothing is written in that case.
pub const MOCK_STATUS_BUFFER_TOO_SMALL: Status = 0x3006;
pub const MOCK_STATUS_INVALID_CALL: Status = 0x3007;

const FIRST_STREAM_HANDLE: StreamHandle = 0x100;



#[derive(Clone, Debug, PartialEq)]
pub enum MockProperty {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Enum { entries: Vec<(i64, String)>, current: usize },
    Command { executed: bool },
    Register(Vec<u8>),
    /// A property whose type code this crate does not decode.
    Opaque(i32),
}

impl MockProperty {
    pub fn enumeration(entries: &[(i64, &str)]) -> Self {
        MockProperty::Enum {
            entries: entries.iter().map(|&(v, n)| (v, n.to_string())).collect(),
            current: 0
        }
    }

    pub fn command() -> Self {
        MockProperty::Command { executed: false }
    }

    fn type_code(&self) -> i32 {
        match self {
            MockProperty::Int(_) => PROPERTY_TYPE_INT,
            MockProperty::Float(_) => PROPERTY_TYPE_FLOAT,
            MockProperty::Bool(_) => PROPERTY_TYPE_BOOL,
            MockProperty::String(_) => PROPERTY_TYPE_STRING,
            MockProperty::Enum { .. } => PROPERTY_TYPE_ENUM,
            MockProperty::Command { .. } => PROPERTY_TYPE_COMMAND,
            MockProperty::Register(_) => PROPERTY_TYPE_REGISTER,
            MockProperty::Opaque(code) => *code,
        }
    }
}



/// One delivered buffer.
#[derive(Clone, Debug, Default)]
pub struct MockFrame {
    pub data: Vec<u8>,
    pub timestamp: u64,
    pub instant_fps: f64,
    pub image_id: u64,
    /// Report a null base address.
    pub null_base: bool,
    pub extra: Vec<(i32, i32, Vec<u8>)>,
}

impl MockFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, ..Self::default() }
    }

    pub fn end_of_stream() -> Self {
        Self { null_base: true, ..Self::default() }
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn image_id(mut self, image_id: u64) -> Self {
        self.image_id = image_id;
        self
    }

    pub fn instant_fps(mut self, fps: f64) -> Self {
        self.instant_fps = fps;
        self
    }

    /// Extra attribute `cmd` of `KY_DATA_TYPE` `data_type` holding `bytes`.
    pub fn attribute(mut self, cmd: i32, data_type: i32, bytes: Vec<u8>) -> Self {
        self.extra.push((cmd, data_type, bytes));
        self
    }
}



#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    GrabberOpen,
    GrabberClose,
    CameraOpen,
    CameraClose,
    StreamCreate,
    StreamDelete,
    CallbackRegister,
    CallbackUnregister,
    CameraStart,
    CameraStop,
    /// Any property get or set (type queries excluded).
    Value,
}

struct MockGrabber {
    name: String,
    available: bool,
    open: bool,
    cameras: Vec<CamHandle>,
}

struct MockStream {
    camera: CamHandle,
    callbacks: Vec<(BufferCallback, usize)>,
    next_id: u32,
}

struct MockBuffer {
    stream: StreamHandle,
    id: u32,
    frame: MockFrame,
}

#[derive(Default)]
struct MockState {
    init: Option<KYFGLib_InitParameters>,
    grabbers: Vec<MockGrabber>,
    open_cameras: HashSet<CamHandle>,
    camera_models: HashMap<CamHandle, (String, String)>,
    properties: HashMap<(Device, String), MockProperty>,
    streams: HashMap<StreamHandle, MockStream>,
    next_stream: StreamHandle,
    buffers: HashMap<StreamBufferHandle, MockBuffer>,
    next_buffer: StreamBufferHandle,
    acquiring: HashMap<CamHandle, (StreamHandle, u32)>,
    calls: HashMap<Call, usize>,
    failing: HashSet<Call>,
}

impl MockState {
    /// Counts the call and reports whether it was told to fail.
    fn record(&mut self, call: Call) -> bool {
        *self.calls.entry(call).or_default() += 1;
        self.failing.contains(&call)
    }

    fn property(&mut self, device: Device, name: &CStr) -> Option<&mut MockProperty> {
        let name = name.to_string_lossy().into_owned();

        self.properties.get_mut(&(device, name))
    }
}



pub struct MockLib {
    state: Mutex<MockState>,
}

impl Default for MockLib {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLib {
    pub fn new() -> Self {
        let state = MockState {
            next_stream: FIRST_STREAM_HANDLE,
            next_buffer: 1,
            ..MockState::default()
        };

        Self { state: Mutex::new(state) }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a grabber to the scan list and returns its index.
    pub fn add_grabber(&self, name: &str) -> i32 {
        let mut state = self.state();

        state.grabbers.push(MockGrabber {
            name: name.to_string(),
            available: true,
            open: false,
            cameras: Vec::new()
        });

        state.grabbers.len() as i32 - 1
    }

    /// An unavailable grabber answers `KYFG_Open` with the invalid handle.
    pub fn set_grabber_available(&self, index: i32, available: bool) {
        if let Some(g) = self.state().grabbers.get_mut(index as usize) {
            g.available = available;
        }
    }

    pub fn set_cameras(&self, grabber: i32, cameras: &[CamHandle]) {
        if let Some(g) = self.state().grabbers.get_mut(grabber as usize) {
            g.cameras = cameras.to_vec();
        }
    }

    pub fn set_camera_model(&self, camera: CamHandle, vendor: &str, model: &str) {
        self.state().camera_models.insert(camera, (vendor.to_string(), model.to_string()));
    }

    pub fn add_property(&self, device: Device, name: &str, property: MockProperty) {
        self.state().properties.insert((device, name.to_string()), property);
    }

    pub fn property(&self, device: Device, name: &str) -> Option<MockProperty> {
        self.state().properties.get(&(device, name.to_string())).cloned()
    }

    /// Makes every later call of this kind fail with [`MOCK_STATUS_FAILURE`].
    pub fn fail(&self, call: Call) {
        self.state().failing.insert(call);
    }

    pub fn recover(&self, call: Call) {
        self.state().failing.remove(&call);
    }

    pub fn calls(&self, call: Call) -> usize {
        self.state().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn value_calls(&self) -> usize {
        self.calls(Call::Value)
    }

    pub fn init_params(&self) -> Option<KYFGLib_InitParameters> {
        self.state().init
    }

    pub fn is_camera_open(&self, camera: CamHandle) -> bool {
        self.state().open_cameras.contains(&camera)
    }

    pub fn is_grabber_open(&self, index: i32) -> bool {
        self.state().grabbers.get(index as usize).map_or(false, |g| g.open)
    }

    pub fn stream_count(&self) -> usize {
        self.state().streams.len()
    }

    pub fn callback_count(&self, stream: StreamHandle) -> usize {
        self.state().streams.get(&stream).map_or(0, |s| s.callbacks.len())
    }

    /// The stream and frame count of a running acquisition.
    pub fn acquisition(&self, camera: CamHandle) -> Option<(StreamHandle, u32)> {
        self.state().acquiring.get(&camera).copied()
    }

    /// Completes one buffer on `stream`: every registered callback runs, in
    /// registration order, on a freshly spawned thread. Returns once they
    /// have all returned.
    pub fn deliver(&self, stream: StreamHandle, frame: MockFrame) -> Option<StreamBufferHandle> {
        let (handle, callbacks) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let handle = state.next_buffer;
            let s = state.streams.get_mut(&stream)?;
            let id = s.next_id;
            let callbacks = s.callbacks.clone();

            s.next_id += 1;
            state.next_buffer += 1;
            state.buffers.insert(handle, MockBuffer { stream, id, frame });

            (handle, callbacks)
        };

        let native = thread::Builder::new()
            .name("kyfg-mock-stream".into())
            .spawn(move || {
                for (callback, ctx) in callbacks {
                    unsafe { callback(handle, ctx as *mut c_void) };
                }
            })
            .ok()?;

        // Callbacks never unwind past the trampoline, join only fails on
        // a broken test handler.
        native.join().ok()?;

        Some(handle)
    }
}



fn two_phase(src: &[u8], dst: Option<&mut [u8]>, size: &mut u32) -> Status {
    let needed = src.len() as u32;

    match dst {
        None => {
            *size = needed;
            STATUS_OK
        },
        Some(dst) if dst.len() < src.len() => {
            *size = needed;
            MOCK_STATUS_BUFFER_TOO_SMALL
        },
        Some(dst) => {
            dst[..src.len()].copy_from_slice(src);
            *size = needed;
            STATUS_OK
        }
    }
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

impl Api for MockLib {
    fn initialize(&self, params: &KYFGLib_InitParameters) -> Status {
        self.state().init = Some(*params);
        STATUS_OK
    }

    fn software_version(&self, version: &mut KY_SOFTWARE_VERSION) -> Status {
        version.Major = 6;
        version.Minor = 3;
        version.SubMinor = 1;

        if version.struct_version >= 1 {
            version.Beta = 0;
            version.RC = 1;
        }
        if version.struct_version >= 2 {
            version.Alpha = 0;
        }

        STATUS_OK
    }

    fn device_scan(&self, count: &mut i32) -> Status {
        *count = self.state().grabbers.len() as i32;
        STATUS_OK
    }

    fn device_info(&self, index: i32, info: &mut KY_DEVICE_INFO) -> Status {
        let state = self.state();
        let Some(grabber) = state.grabbers.get(index as usize) else {
            return MOCK_STATUS_NOT_FOUND;
        };

        info.szDeviceDisplayName = string_to_fixed(&grabber.name);
        info.nBus = 3;
        info.nSlot = 0;
        info.nFunction = index;
        info.DevicePID = 0x5057;
        info.isVirtual = 0;
        info.m_Flags = DEVICE_FLAG_GRABBER;
        info.m_Protocol = KY_DEVICE_PROTOCOL_CoaXPress;
        info.DeviceGeneration = 2;

        STATUS_OK
    }

    fn grabber_open(&self, index: i32) -> FgHandle {
        let mut state = self.state();
        let failing = state.record(Call::GrabberOpen);

        match state.grabbers.get_mut(index as usize) {
            Some(g) if g.available && !failing => {
                g.open = true;
                index as FgHandle
            },
            _ => INVALID_FGHANDLE
        }
    }

    fn grabber_close(&self, grabber: FgHandle) -> Status {
        let mut state = self.state();

        if state.record(Call::GrabberClose) { return MOCK_STATUS_FAILURE; }

        match state.grabbers.get_mut(grabber as usize) {
            Some(g) if g.open => {
                g.open = false;
                STATUS_OK
            },
            _ => MOCK_STATUS_INVALID_HANDLE
        }
    }

    fn update_camera_list(&self, grabber: FgHandle, cameras: &mut [CamHandle], count: &mut i32) -> Status {
        let state = self.state();

        match state.grabbers.get(grabber as usize) {
            Some(g) if g.open => {
                let n = g.cameras.len().min(cameras.len()).min((*count).max(0) as usize);

                cameras[..n].copy_from_slice(&g.cameras[..n]);
                *count = g.cameras.len() as i32;

                STATUS_OK
            },
            _ => MOCK_STATUS_INVALID_HANDLE
        }
    }

    fn camera_open(&self, camera: CamHandle, _xml_file: Option<&CStr>) -> Status {
        let mut state = self.state();

        if state.record(Call::CameraOpen) { return MOCK_STATUS_FAILURE; }

        let known = state.grabbers.iter().any(|g| g.open && g.cameras.contains(&camera));

        if !known { return MOCK_STATUS_NOT_FOUND; }

        state.open_cameras.insert(camera);
        STATUS_OK
    }

    fn camera_close(&self, camera: CamHandle) -> Status {
        let mut state = self.state();

        if state.record(Call::CameraClose) { return MOCK_STATUS_FAILURE; }

        if state.open_cameras.remove(&camera) { STATUS_OK }
        else { MOCK_STATUS_INVALID_HANDLE }
    }

    fn camera_info(&self, camera: CamHandle, info: &mut KYFGCAMERA_INFO2) -> Status {
        let state = self.state();

        if !state.open_cameras.contains(&camera) { return MOCK_STATUS_INVALID_HANDLE; }

        let (vendor, model) = state.camera_models.get(&camera).cloned()
            .unwrap_or_else(|| ("Mock".to_string(), "Camera".to_string()));

        info.master_link = 0;
        info.link_mask = 0x0F;
        info.link_speed = 12500;
        info.stream_id = 0;
        info.deviceVersion = string_to_fixed("1.0");
        info.deviceVendorName = string_to_fixed(&vendor);
        info.deviceManufacturerInfo = string_to_fixed("");
        info.deviceModelName = string_to_fixed(&model);
        info.deviceID = string_to_fixed(&format!("{camera:08X}"));
        info.deviceUserID = string_to_fixed("");
        info.outputCamera = false;
        info.virtualCamera = true;
        info.deviceFirmwareVersion = string_to_fixed("1.0.0");

        STATUS_OK
    }

    fn value_type(&self, device: Device, name: &CStr) -> i32 {
        self.state().property(device, name).map_or(PROPERTY_TYPE_UNKNOWN, |p| p.type_code())
    }

    fn get_int(&self, device: Device, name: &CStr, value: &mut i64) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Int(v)) => { *value = *v; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn get_float(&self, device: Device, name: &CStr, value: &mut f64) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Float(v)) => { *value = *v; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn get_bool(&self, device: Device, name: &CStr, value: &mut u8) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Bool(v)) => { *value = *v as u8; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn get_enum(&self, device: Device, name: &CStr, value: &mut i64) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Enum { entries, current }) => { *value = entries[*current].0; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn get_command(&self, device: Device, name: &CStr, executed: &mut u8) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Command { executed: e }) => { *executed = *e as u8; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn get_string(&self, device: Device, name: &CStr, dst: Option<&mut [u8]>, size: &mut u32) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        let src = match state.property(device, name) {
            Some(MockProperty::String(s)) => nul_terminated(s),
            Some(MockProperty::Enum { entries, current }) => nul_terminated(&entries[*current].1),
            Some(_) => return MOCK_STATUS_WRONG_TYPE,
            None => return MOCK_STATUS_NOT_FOUND
        };

        two_phase(&src, dst, size)
    }

    fn get_register(&self, camera: CamHandle, name: &CStr, dst: Option<&mut [u8]>, size: &mut u32) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        let src = match state.property(Device::Camera(camera), name) {
            Some(MockProperty::Register(bytes)) => bytes.clone(),
            Some(_) => return MOCK_STATUS_WRONG_TYPE,
            None => return MOCK_STATUS_NOT_FOUND
        };

        two_phase(&src, dst, size)
    }

    fn set_int(&self, device: Device, name: &CStr, value: i64) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Int(v)) => { *v = value; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn set_float(&self, device: Device, name: &CStr, value: f64) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Float(v)) => { *v = value; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn set_bool(&self, device: Device, name: &CStr, value: u8) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Bool(v)) => { *v = value != 0; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn set_string(&self, device: Device, name: &CStr, value: &CStr) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::String(v)) => { *v = value.to_string_lossy().into_owned(); STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn set_enum(&self, device: Device, name: &CStr, value: i64) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            Some(MockProperty::Enum { entries, current }) => {
                match entries.iter().position(|(v, _)| *v == value) {
                    Some(i) => { *current = i; STATUS_OK },
                    None => MOCK_STATUS_INVALID_VALUE
                }
            },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn set_enum_by_name(&self, device: Device, name: &CStr, value: &CStr) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        let value = value.to_string_lossy();

        match state.property(device, name) {
            Some(MockProperty::Enum { entries, current }) => {
                match entries.iter().position(|(_, n)| *n == value) {
                    Some(i) => { *current = i; STATUS_OK },
                    None => MOCK_STATUS_INVALID_VALUE
                }
            },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn run_command(&self, device: Device, name: &CStr, _value: i32) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(device, name) {
            // Commands complete immediately here.
            Some(MockProperty::Command { executed }) => { *executed = true; STATUS_OK },
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn set_register(&self, camera: CamHandle, name: &CStr, value: &[u8]) -> Status {
        let mut state = self.state();

        if state.record(Call::Value) { return MOCK_STATUS_FAILURE; }

        match state.property(Device::Camera(camera), name) {
            Some(MockProperty::Register(bytes)) if bytes.len() == value.len() => {
                bytes.copy_from_slice(value);
                STATUS_OK
            },
            Some(MockProperty::Register(_)) => MOCK_STATUS_INVALID_VALUE,
            Some(_) => MOCK_STATUS_WRONG_TYPE,
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn stream_create(&self, camera: CamHandle, stream: &mut StreamHandle, _frames: u32, _index: i32) -> Status {
        let mut state = self.state();

        if state.record(Call::StreamCreate) { return MOCK_STATUS_FAILURE; }
        if !state.open_cameras.contains(&camera) { return MOCK_STATUS_INVALID_HANDLE; }

        let handle = state.next_stream;
        state.next_stream += 1;
        state.streams.insert(handle, MockStream { camera, callbacks: Vec::new(), next_id: 0 });

        *stream = handle;
        STATUS_OK
    }

    fn stream_delete(&self, stream: StreamHandle) -> Status {
        let mut state = self.state();

        if state.record(Call::StreamDelete) { return MOCK_STATUS_FAILURE; }

        let (camera, attached) = match state.streams.get(&stream) {
            Some(s) => (s.camera, !s.callbacks.is_empty()),
            None => return MOCK_STATUS_INVALID_HANDLE
        };
        let running = state.acquiring.get(&camera).map_or(false, |&(h, _)| h == stream);

        // Callbacks have to be unregistered and the camera stopped first.
        if attached || running { return MOCK_STATUS_INVALID_CALL; }

        state.streams.remove(&stream);
        state.buffers.retain(|_, b| b.stream != stream);

        STATUS_OK
    }

    fn callback_register(&self, stream: StreamHandle, callback: BufferCallback, user_context: *mut c_void) -> Status {
        let mut state = self.state();

        if state.record(Call::CallbackRegister) { return MOCK_STATUS_FAILURE; }

        match state.streams.get_mut(&stream) {
            Some(s) => {
                s.callbacks.push((callback, user_context as usize));
                STATUS_OK
            },
            None => MOCK_STATUS_INVALID_HANDLE
        }
    }

    fn callback_unregister(&self, stream: StreamHandle, callback: BufferCallback) -> Status {
        let mut state = self.state();

        if state.record(Call::CallbackUnregister) { return MOCK_STATUS_FAILURE; }

        let Some(s) = state.streams.get_mut(&stream) else {
            return MOCK_STATUS_INVALID_HANDLE;
        };

        match s.callbacks.iter().position(|&(cb, _)| cb as usize == callback as usize) {
            Some(i) => {
                s.callbacks.remove(i);
                STATUS_OK
            },
            None => MOCK_STATUS_NOT_FOUND
        }
    }

    fn buffer_info(
        &self,
        buffer: StreamBufferHandle,
        cmd: i32,
        dst: Option<&mut [u8]>,
        size: Option<&mut u64>,
        data_type: Option<&mut i32>
    ) -> Status {
        let state = self.state();

        let Some(b) = state.buffers.get(&buffer) else {
            return MOCK_STATUS_INVALID_HANDLE;
        };

        let usize_bytes = |v: usize| v.to_ne_bytes().to_vec();

        let (ty, bytes) = match cmd {
            KY_STREAM_BUFFER_INFO_BASE => {
                let base = if b.frame.null_base { 0 } else { b.frame.data.as_ptr() as usize };

                (KY_DATATYPE_PTR, usize_bytes(base))
            },
            KY_STREAM_BUFFER_INFO_SIZE => (KY_DATATYPE_SIZET, usize_bytes(b.frame.data.len())),
            KY_STREAM_BUFFER_INFO_PTR => (KY_DATATYPE_PTR, usize_bytes(0)),
            KY_STREAM_BUFFER_INFO_TIMESTAMP => (KY_DATATYPE_UINT64, b.frame.timestamp.to_ne_bytes().to_vec()),
            KY_STREAM_BUFFER_INFO_INSTANTFPS => (KY_DATATYPE_FLOAT64, b.frame.instant_fps.to_ne_bytes().to_vec()),
            KY_STREAM_BUFFER_INFO_IMAGEID => (KY_DATATYPE_UINT64, b.frame.image_id.to_ne_bytes().to_vec()),
            KY_STREAM_BUFFER_INFO_ID => (KY_DATATYPE_UINT32, b.id.to_ne_bytes().to_vec()),
            KY_STREAM_BUFFER_INFO_STREAM_HANDLE => (KY_DATATYPE_HANDLE, b.stream.to_ne_bytes().to_vec()),
            other => match b.frame.extra.iter().find(|(c, _, _)| *c == other) {
                Some((_, ty, bytes)) => (*ty, bytes.clone()),
                None => (KY_DATATYPE_UNKNOWN, Vec::new())
            }
        };

        if let Some(size) = size {
            *size = bytes.len() as u64;
        }
        if let Some(data_type) = data_type {
            *data_type = ty;
        }

        match dst {
            None => STATUS_OK,
            Some(dst) if dst.len() < bytes.len() => MOCK_STATUS_BUFFER_TOO_SMALL,
            Some(dst) => {
                dst[..bytes.len()].copy_from_slice(&bytes);
                STATUS_OK
            }
        }
    }

    fn camera_start(&self, camera: CamHandle, stream: StreamHandle, frames: u32) -> Status {
        let mut state = self.state();

        if state.record(Call::CameraStart) { return MOCK_STATUS_FAILURE; }
        if !state.open_cameras.contains(&camera) || !state.streams.contains_key(&stream) {
            return MOCK_STATUS_INVALID_HANDLE;
        }

        state.acquiring.insert(camera, (stream, frames));
        STATUS_OK
    }

    fn camera_stop(&self, camera: CamHandle) -> Status {
        let mut state = self.state();

        if state.record(Call::CameraStop) { return MOCK_STATUS_FAILURE; }

        state.acquiring.remove(&camera);
        STATUS_OK
    }
}
