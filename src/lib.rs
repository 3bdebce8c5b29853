// Private modules
mod kyfg_sys;
mod error;
mod util;

// Public modules
pub mod api;
pub mod acquisition;
pub mod buffer;
pub mod callback;
pub mod camera;
pub mod format;
pub mod grabber;
pub mod info;
pub mod library;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod property;
pub mod registry;
pub mod stream;



pub use error::Error;
pub use library::KyFg;
pub use grabber::FrameGrabber;
pub use camera::Camera;
pub use stream::Stream;
pub use buffer::{Buffer, Frame};

pub type Result<T> = std::result::Result<T, Error>;

/// Calls an [`api::Api`] method, logs the status and turns it into a
/// `Result`.
#[doc(hidden)]
#[macro_export]
macro_rules! kycall {
    ($api: expr, $func: ident $(, $arg: expr)*) => {
        {
            let status = $api.$func($($arg),*);
            tracing::trace!(call = stringify!($func), status, "native call");
            $crate::error::status_to_result(stringify!($func), status)
        }
    }
}



pub mod prelude {
    pub use crate::property::{HasProperties, Value, EnumValue, PropertyType};
    pub use crate::library::KyFg;
    pub use crate::grabber::FrameGrabber;
    pub use crate::camera::{Camera, StartOptions};
    pub use crate::stream::Stream;
    pub use crate::buffer::{Buffer, Frame};
    pub use crate::acquisition::{AcquisitionState, Interrupter};
    pub use crate::info::InitParams;
}
