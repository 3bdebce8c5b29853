//! Attributes of completed stream buffers.
//!
//! A buffer attribute is fetched in two calls: a probe that reports the
//! attribute's size and data type, then the copy into a destination of
//! exactly that size. [`get_info`] does the raw transfer and decodes the
//! bytes by type; [`Buffer`] adds typed, cached accessors on top.

use crate::api::{Api, StreamBufferHandle, StreamHandle};
use crate::error::Error;
use crate::kyfg_sys::{KY_DATA_TYPE::*, KY_STREAM_BUFFER_INFO_CMD::*};
use crate::util::bytes_to_string;
use crate::{kycall, Result};
use std::mem;
use std::sync::Arc;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use once_cell::sync::OnceCell;



#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BufferInfo {
    Base = KY_STREAM_BUFFER_INFO_BASE as isize,
    Size = KY_STREAM_BUFFER_INFO_SIZE as isize,
    Ptr = KY_STREAM_BUFFER_INFO_PTR as isize,
    Timestamp = KY_STREAM_BUFFER_INFO_TIMESTAMP as isize,
    InstantFps = KY_STREAM_BUFFER_INFO_INSTANTFPS as isize,
    ImageId = KY_STREAM_BUFFER_INFO_IMAGEID as isize,
    Id = KY_STREAM_BUFFER_INFO_ID as isize,
    StreamHandle = KY_STREAM_BUFFER_INFO_STREAM_HANDLE as isize
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum InfoDataType {
    String = KY_DATATYPE_STRING as isize,
    StringList = KY_DATATYPE_STRINGLIST as isize,
    Int16 = KY_DATATYPE_INT16 as isize,
    Uint16 = KY_DATATYPE_UINT16 as isize,
    Int32 = KY_DATATYPE_INT32 as isize,
    Uint32 = KY_DATATYPE_UINT32 as isize,
    Int64 = KY_DATATYPE_INT64 as isize,
    Uint64 = KY_DATATYPE_UINT64 as isize,
    Float64 = KY_DATATYPE_FLOAT64 as isize,
    Ptr = KY_DATATYPE_PTR as isize,
    Bool8 = KY_DATATYPE_BOOL8 as isize,
    SizeT = KY_DATATYPE_SIZET as isize,
    Buffer = KY_DATATYPE_BUFFER as isize,
    Handle = KY_DATATYPE_HANDLE as isize,
    CamHandle = KY_DATATYPE_CAMHANDLE as isize
}

impl InfoDataType {
    /// Width of fixed-size types; `None` for those sized by the probe.
    fn width(&self) -> Option<usize> {
        use InfoDataType::*;

        match self {
            Int16 | Uint16 => Some(2),
            Int32 | Uint32 | Handle | CamHandle => Some(4),
            Int64 | Uint64 | Float64 => Some(8),
            Ptr | SizeT => Some(mem::size_of::<usize>()),
            Bool8 => Some(1),
            String | StringList | Buffer => None
        }
    }
}

#[derive(Clone, Debug, PartialEq, EnumAsInner)]
pub enum InfoValue {
    String(String),
    StringList(Vec<String>),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float64(f64),
    Ptr(usize),
    Bool8(bool),
    SizeT(usize),
    Buffer(Vec<u8>),
    Handle(u32),
    CamHandle(u32)
}

impl InfoValue {
    /// Widens any integer-like value.
    pub fn as_u64(&self) -> Option<u64> {
        use InfoValue::*;

        match *self {
            Int16(v) => u64::try_from(v).ok(),
            Uint16(v) => Some(v as u64),
            Int32(v) => u64::try_from(v).ok(),
            Uint32(v) | Handle(v) | CamHandle(v) => Some(v as u64),
            Int64(v) => u64::try_from(v).ok(),
            Uint64(v) => Some(v),
            Ptr(v) | SizeT(v) => Some(v as u64),
            Bool8(v) => Some(v as u64),
            _ => None
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            InfoValue::Float64(v) => Some(v),
            _ => self.as_u64().map(|v| v as f64)
        }
    }
}

fn ne_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn decode(ty: InfoDataType, bytes: Vec<u8>) -> InfoValue {
    use InfoDataType as T;

    match ty {
        T::String => InfoValue::String(bytes_to_string(&bytes)),
        T::StringList => InfoValue::StringList(
            bytes.split(|&b| b == 0)
                .take_while(|s| !s.is_empty())
                .map(bytes_to_string)
                .collect()
        ),
        T::Int16 => InfoValue::Int16(i16::from_ne_bytes(ne_bytes(&bytes))),
        T::Uint16 => InfoValue::Uint16(u16::from_ne_bytes(ne_bytes(&bytes))),
        T::Int32 => InfoValue::Int32(i32::from_ne_bytes(ne_bytes(&bytes))),
        T::Uint32 => InfoValue::Uint32(u32::from_ne_bytes(ne_bytes(&bytes))),
        T::Int64 => InfoValue::Int64(i64::from_ne_bytes(ne_bytes(&bytes))),
        T::Uint64 => InfoValue::Uint64(u64::from_ne_bytes(ne_bytes(&bytes))),
        T::Float64 => InfoValue::Float64(f64::from_ne_bytes(ne_bytes(&bytes))),
        T::Ptr => InfoValue::Ptr(usize::from_ne_bytes(ne_bytes(&bytes))),
        T::Bool8 => InfoValue::Bool8(bytes[0] != 0),
        T::SizeT => InfoValue::SizeT(usize::from_ne_bytes(ne_bytes(&bytes))),
        T::Buffer => InfoValue::Buffer(bytes),
        T::Handle => InfoValue::Handle(u32::from_ne_bytes(ne_bytes(&bytes))),
        T::CamHandle => InfoValue::CamHandle(u32::from_ne_bytes(ne_bytes(&bytes)))
    }
}

/// Reads one attribute of `buffer`. Attributes of a type this crate does
/// not decode read as `None`.
pub fn get_info(api: &dyn Api, buffer: StreamBufferHandle, cmd: i32) -> Result<Option<InfoValue>> {
    let mut size: u64 = 0;
    let mut code: i32 = KY_DATATYPE_UNKNOWN;

    kycall!(api, buffer_info, buffer, cmd, None, Some(&mut size), Some(&mut code))?;

    let Some(ty) = InfoDataType::from_i32(code) else {
        tracing::debug!(buffer, cmd, code, "buffer attribute of unsupported type");
        return Ok(None);
    };

    let len = ty.width().unwrap_or(size as usize);
    let mut bytes = vec![0u8; len];

    kycall!(api, buffer_info, buffer, cmd, Some(bytes.as_mut_slice()), None, None)?;

    Ok(Some(decode(ty, bytes)))
}



/// A completed buffer, valid for the duration of the callback it was
/// delivered to. Each attribute is fetched at most once.
///
/// Buffers only come from a stream callback; there is no way to build one
/// from an arbitrary handle:
///
/// ```compile_fail
/// let lib: std::sync::Arc<dyn kyfg::api::Api> = std::sync::Arc::new(kyfg::mock::MockLib::new());
/// let buffer = kyfg::Buffer::new(lib, 0xdead);
/// ```
pub struct Buffer {
    api: Arc<dyn Api>,
    handle: StreamBufferHandle,
    base: OnceCell<Option<usize>>,
    size: OnceCell<usize>,
    ptr: OnceCell<usize>,
    timestamp: OnceCell<u64>,
    instant_fps: OnceCell<f64>,
    image_id: OnceCell<u64>,
    id: OnceCell<u32>,
    stream: OnceCell<StreamHandle>
}

impl Buffer {
    pub(crate) fn new(api: Arc<dyn Api>, handle: StreamBufferHandle) -> Self {
        Self {
            api,
            handle,
            base: OnceCell::new(),
            size: OnceCell::new(),
            ptr: OnceCell::new(),
            timestamp: OnceCell::new(),
            instant_fps: OnceCell::new(),
            image_id: OnceCell::new(),
            id: OnceCell::new(),
            stream: OnceCell::new()
        }
    }

    pub fn handle(&self) -> StreamBufferHandle {
        self.handle
    }

    pub fn info(&self, cmd: BufferInfo) -> Result<Option<InfoValue>> {
        get_info(self.api.as_ref(), self.handle, cmd as i32)
    }

    fn cached<T: Copy>(
        &self,
        cell: &OnceCell<T>,
        cmd: BufferInfo,
        expected: &'static str,
        convert: impl FnOnce(&InfoValue) -> Option<T>
    ) -> Result<T> {
        let value = cell.get_or_try_init(|| {
            self.info(cmd)?.as_ref().and_then(convert).ok_or_else(|| Error::TypeMismatch {
                name: format!("{cmd:?}"),
                expected,
                found: "another buffer attribute type"
            })
        })?;

        Ok(*value)
    }

    /// Start of the frame data, or `None` for a null pointer.
    pub fn base(&self) -> Result<Option<usize>> {
        self.cached(&self.base, BufferInfo::Base, "a pointer", |v| match v {
            InfoValue::Ptr(p) => Some((*p != 0).then_some(*p)),
            _ => None
        })
    }

    pub fn size(&self) -> Result<usize> {
        self.cached(&self.size, BufferInfo::Size, "a size", |v| v.as_u64().map(|s| s as usize))
    }

    pub fn user_ptr(&self) -> Result<usize> {
        self.cached(&self.ptr, BufferInfo::Ptr, "a pointer", |v| v.as_u64().map(|p| p as usize))
    }

    pub fn timestamp(&self) -> Result<u64> {
        self.cached(&self.timestamp, BufferInfo::Timestamp, "an integer", InfoValue::as_u64)
    }

    pub fn instant_fps(&self) -> Result<f64> {
        self.cached(&self.instant_fps, BufferInfo::InstantFps, "a float", InfoValue::as_f64)
    }

    pub fn image_id(&self) -> Result<u64> {
        self.cached(&self.image_id, BufferInfo::ImageId, "an integer", InfoValue::as_u64)
    }

    /// Index of the buffer within its stream.
    pub fn id(&self) -> Result<u32> {
        self.cached(&self.id, BufferInfo::Id, "an integer", |v| v.as_u64().and_then(|id| u32::try_from(id).ok()))
    }

    pub fn stream(&self) -> Result<StreamHandle> {
        self.cached(&self.stream, BufferInfo::StreamHandle, "a handle", |v| v.as_u64().and_then(|h| u32::try_from(h).ok()))
    }

    /// The frame bytes, `None` when the base address is null.
    pub fn data(&self) -> Result<Option<&[u8]>> {
        let Some(base) = self.base()? else { return Ok(None) };
        let size = self.size()?;

        // The library keeps the buffer alive and untouched until the
        // callback delivering it returns, which outlives `&self`.
        Ok(Some(unsafe { std::slice::from_raw_parts(base as *const u8, size) }))
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("handle", &self.handle).finish_non_exhaustive()
    }
}



/// An owned copy of a buffer's payload, taken inside the callback.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub timestamp: u64,
    pub image_id: u64,
    pub buffer_id: u32
}

impl Frame {
    /// `None` for a buffer with a null base address.
    pub fn from_buffer(buffer: &Buffer) -> Result<Option<Self>> {
        let Some(data) = buffer.data()? else { return Ok(None) };

        Ok(Some(Self {
            data: data.to_vec(),
            timestamp: buffer.timestamp()?,
            image_id: buffer.image_id()?,
            buffer_id: buffer.id()?
        }))
    }
}
