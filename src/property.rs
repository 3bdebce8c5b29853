//! Typed access to the GenICam-style property catalogs of grabbers and
//! cameras.
//!
//! The native layer is the source of truth for a property's type, and the
//! type can change with the value of other properties, so nothing here is
//! cached: every read or write resolves the type first and then issues the
//! matching typed call.

use crate::api::{Api, Device};
use crate::error::Error;
use crate::kyfg_sys::KY_CAM_PROPERTY_TYPE::*;
use crate::util::{bytes_to_string, to_cstring};
use crate::{kycall, Result};
use std::ffi::CStr;
use enum_as_inner::EnumAsInner;



#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Int, Bool, String, Float, Enum, Command, Register, Unknown
}

impl TryFrom<i32> for PropertyType {
    type Error = ();

    /// Fails only for `PROPERTY_TYPE_UNKNOWN`, i.e. a name the device does
    /// not know. Codes this crate does not know map to `Unknown`.
    fn try_from(v: i32) -> std::result::Result<Self, Self::Error> {
        use PropertyType::*;

        match v {
            PROPERTY_TYPE_UNKNOWN => Err(()),
            PROPERTY_TYPE_INT => Ok(Int),
            PROPERTY_TYPE_BOOL => Ok(Bool),
            PROPERTY_TYPE_STRING => Ok(String),
            PROPERTY_TYPE_FLOAT => Ok(Float),
            PROPERTY_TYPE_ENUM => Ok(Enum),
            PROPERTY_TYPE_COMMAND => Ok(Command),
            PROPERTY_TYPE_REGISTER => Ok(Register),
            _ => Ok(Unknown)
        }
    }
}

impl PropertyType {
    /// What a setter accepts for this type, for error messages.
    fn expects(&self) -> &'static str {
        match self {
            PropertyType::Int => "an integer",
            PropertyType::Bool => "a boolean",
            PropertyType::String => "a string",
            PropertyType::Float => "a float",
            PropertyType::Enum => "an enum name or integer",
            PropertyType::Command => "an integer command argument",
            PropertyType::Register => "register bytes",
            PropertyType::Unknown => "nothing (unsupported property type)"
        }
    }
}



/// Both representations of an enum property's current entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub value: i64,
    pub name: String
}

#[derive(Clone, Debug, PartialEq, EnumAsInner)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Enum(EnumValue),
    /// Read: whether the command has executed. Never used for writes.
    Command(bool),
    Register(Vec<u8>)
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "an integer",
            Value::Float(_) => "a float",
            Value::Bool(_) => "a boolean",
            Value::String(_) => "a string",
            Value::Enum(_) => "an enum value",
            Value::Command(_) => "a command flag",
            Value::Register(_) => "register bytes"
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::String(v) }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self { Value::Register(v) }
}



pub fn resolve_type(api: &dyn Api, device: Device, name: &str) -> Result<PropertyType> {
    let cname = to_cstring(name)?;

    resolve_c(api, device, name, &cname)
}

fn resolve_c(api: &dyn Api, device: Device, name: &str, cname: &CStr) -> Result<PropertyType> {
    let code = api.value_type(device, cname);

    tracing::trace!(?device, property = name, code, "resolved property type");

    PropertyType::try_from(code).map_err(|_| Error::UnknownProperty(name.to_string()))
}

/// Reads a property with the call matching its current type.
///
/// Returns `None` for property types this crate cannot decode, so optional
/// properties can be probed without failing.
pub fn get(api: &dyn Api, device: Device, name: &str) -> Result<Option<Value>> {
    use PropertyType::*;

    let cname = to_cstring(name)?;
    let cname = cname.as_c_str();

    let value = match resolve_c(api, device, name, cname)? {
        Int => {
            let mut v: i64 = 0;
            kycall!(api, get_int, device, cname, &mut v)?;

            Value::Int(v)
        },
        Float => {
            let mut v: f64 = 0.0;
            kycall!(api, get_float, device, cname, &mut v)?;

            Value::Float(v)
        },
        Bool => {
            let mut v: u8 = 0;
            kycall!(api, get_bool, device, cname, &mut v)?;

            Value::Bool(v != 0)
        },
        Enum => {
            let mut v: i64 = 0;
            kycall!(api, get_enum, device, cname, &mut v)?;
            let name = read_string(api, device, cname)?;

            Value::Enum(EnumValue { value: v, name })
        },
        String => Value::String(read_string(api, device, cname)?),
        Command => {
            let mut executed: u8 = 0;
            kycall!(api, get_command, device, cname, &mut executed)?;

            Value::Command(executed != 0)
        },
        Register => match device {
            Device::Camera(camera) => Value::Register(read_register(api, camera, cname)?),
            Device::Grabber(_) => {
                tracing::debug!(property = name, "grabber properties have no register access");
                return Ok(None);
            }
        },
        Unknown => return Ok(None)
    };

    Ok(Some(value))
}

/// Writes a property, checking `value` against the resolved type before the
/// value call is made.
pub fn set(api: &dyn Api, device: Device, name: &str, value: Value) -> Result<()> {
    use PropertyType as T;

    let cname = to_cstring(name)?;
    let cname = cname.as_c_str();
    let ty = resolve_c(api, device, name, cname)?;

    tracing::debug!(?device, property = name, ?value, "setting property");

    match (ty, value) {
        (T::Int, Value::Int(v)) => kycall!(api, set_int, device, cname, v),
        (T::Float, Value::Float(v)) => kycall!(api, set_float, device, cname, v),
        (T::Bool, Value::Bool(v)) => kycall!(api, set_bool, device, cname, v as u8),
        (T::String, Value::String(v)) => {
            let v = to_cstring(&v)?;

            kycall!(api, set_string, device, cname, &v)
        },
        (T::Enum, Value::String(v)) => {
            let v = to_cstring(&v)?;

            kycall!(api, set_enum_by_name, device, cname, &v)
        },
        (T::Enum, Value::Int(v)) => kycall!(api, set_enum, device, cname, v),
        (T::Enum, Value::Enum(v)) => kycall!(api, set_enum, device, cname, v.value),
        (T::Command, Value::Int(v)) => {
            let v = i32::try_from(v).map_err(|_| {
                Error::InvalidArgument(format!("command argument {v} does not fit in 32 bits"))
            })?;

            kycall!(api, run_command, device, cname, v)
        },
        (T::Register, Value::Register(bytes)) => match device {
            Device::Camera(camera) => write_register(api, camera, cname, &bytes),
            Device::Grabber(_) => Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: "a camera (grabbers have no register access)",
                found: "register bytes"
            })
        },
        (ty, value) => Err(Error::TypeMismatch {
            name: name.to_string(),
            expected: ty.expects(),
            found: value.kind()
        })
    }
}



fn read_string(api: &dyn Api, device: Device, name: &CStr) -> Result<String> {
    let mut size: u32 = 0;
    kycall!(api, get_string, device, name, None, &mut size)?;

    let mut buf = vec![0u8; size as usize];
    kycall!(api, get_string, device, name, Some(buf.as_mut_slice()), &mut size)?;
    buf.truncate(size as usize);

    Ok(bytes_to_string(&buf))
}

fn register_len(api: &dyn Api, camera: u32, name: &CStr) -> Result<u32> {
    let mut size: u32 = 0;
    kycall!(api, get_register, camera, name, None, &mut size)?;

    Ok(size)
}

fn read_register(api: &dyn Api, camera: u32, name: &CStr) -> Result<Vec<u8>> {
    let mut size = register_len(api, camera, name)?;

    let mut buf = vec![0u8; size as usize];
    kycall!(api, get_register, camera, name, Some(buf.as_mut_slice()), &mut size)?;
    buf.truncate(size as usize);

    Ok(buf)
}

fn write_register(api: &dyn Api, camera: u32, name: &CStr, bytes: &[u8]) -> Result<()> {
    let len = register_len(api, camera, name)? as usize;

    if bytes.len() != len {
        return Err(Error::InvalidArgument(format!(
            "register {name:?} is {len} bytes long, got {}", bytes.len()
        )));
    }

    kycall!(api, set_register, camera, name, bytes)
}



/// Named property access, implemented by [`crate::FrameGrabber`] and
/// [`crate::Camera`].
///
/// `get_property` and `set_property` are the primitives; everything else is
/// a typed shortcut on top of them.
pub trait HasProperties {
    fn property_type(&self, name: &str) -> Result<PropertyType>;
    fn get_property(&self, name: &str) -> Result<Option<Value>>;
    fn set_property(&self, name: &str, value: Value) -> Result<()>;

    /// Sets several properties in order, stopping at the first failure.
    fn set_properties<'n, I>(&self, values: I) -> Result<()>
    where I: IntoIterator<Item = (&'n str, Value)> {
        for (name, value) in values {
            self.set_property(name, value)?;
        }

        Ok(())
    }

    fn set_int(&self, name: &str, v: i64) -> Result<()> {
        self.set_property(name, Value::Int(v))
    }

    fn set_float(&self, name: &str, v: f64) -> Result<()> {
        self.set_property(name, Value::Float(v))
    }

    fn set_bool(&self, name: &str, v: bool) -> Result<()> {
        self.set_property(name, Value::Bool(v))
    }

    fn set_string(&self, name: &str, v: &str) -> Result<()> {
        self.set_property(name, Value::String(v.to_string()))
    }

    fn set_enum(&self, name: &str, v: i64) -> Result<()> {
        self.set_property(name, Value::Int(v))
    }

    fn set_enum_by_name(&self, name: &str, v: &str) -> Result<()> {
        self.set_property(name, Value::String(v.to_string()))
    }

    fn set_register(&self, name: &str, v: Vec<u8>) -> Result<()> {
        self.set_property(name, Value::Register(v))
    }

    fn execute(&self, name: &str) -> Result<()> {
        self.set_property(name, Value::Int(1))
    }

    fn get_int(&self, name: &str) -> Result<i64> {
        require(name, "an integer", self.get_property(name)?)?
            .into_int()
            .map_err(|v| mismatch(name, "an integer", &v))
    }

    fn get_float(&self, name: &str) -> Result<f64> {
        require(name, "a float", self.get_property(name)?)?
            .into_float()
            .map_err(|v| mismatch(name, "a float", &v))
    }

    fn get_bool(&self, name: &str) -> Result<bool> {
        require(name, "a boolean", self.get_property(name)?)?
            .into_bool()
            .map_err(|v| mismatch(name, "a boolean", &v))
    }

    fn get_string(&self, name: &str) -> Result<String> {
        require(name, "a string", self.get_property(name)?)?
            .into_string()
            .map_err(|v| mismatch(name, "a string", &v))
    }

    fn get_enum(&self, name: &str) -> Result<EnumValue> {
        require(name, "an enum value", self.get_property(name)?)?
            .into_enum()
            .map_err(|v| mismatch(name, "an enum value", &v))
    }

    fn get_register(&self, name: &str) -> Result<Vec<u8>> {
        require(name, "register bytes", self.get_property(name)?)?
            .into_register()
            .map_err(|v| mismatch(name, "register bytes", &v))
    }

    fn is_command_done(&self, name: &str) -> Result<bool> {
        require(name, "a command flag", self.get_property(name)?)?
            .into_command()
            .map_err(|v| mismatch(name, "a command flag", &v))
    }
}

fn require(name: &str, expected: &'static str, value: Option<Value>) -> Result<Value> {
    value.ok_or_else(|| Error::TypeMismatch {
        name: name.to_string(),
        expected,
        found: "an unsupported property type"
    })
}

fn mismatch(name: &str, expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch { name: name.to_string(), expected, found: found.kind() }
}
