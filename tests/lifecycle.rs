#![cfg(feature = "mock")]

use kyfg::api::{CamHandle, Device};
use kyfg::camera::Roi;
use kyfg::format::PixelFormat;
use kyfg::info::DeviceProtocol;
use kyfg::mock::{Call, MockFrame, MockLib, MockProperty};
use kyfg::prelude::*;
use kyfg::registry::Kind;
use kyfg::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const CAM: CamHandle = 0x40;

fn setup() -> (Arc<MockLib>, KyFg) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let lib = Arc::new(MockLib::new());
    let fg = lib.add_grabber("Predator II");
    lib.set_cameras(fg, &[CAM]);
    lib.set_camera_model(CAM, "Kaya", "Iron 2020");

    let cam = Device::Camera(CAM);
    lib.add_property(cam, "WidthMax", MockProperty::Int(2048));
    lib.add_property(cam, "HeightMax", MockProperty::Int(1536));
    lib.add_property(cam, "Width", MockProperty::Int(2048));
    lib.add_property(cam, "Height", MockProperty::Int(1536));
    lib.add_property(cam, "OffsetX", MockProperty::Int(0));
    lib.add_property(cam, "OffsetY", MockProperty::Int(0));
    lib.add_property(cam, "PixelFormat", MockProperty::enumeration(&[
        (0x01080001, "Mono8"),
        (0x01080009, "BayerRG8")
    ]));
    lib.add_property(cam, "ExposureTime", MockProperty::Float(1000.0));
    lib.add_property(cam, "AcquisitionStart", MockProperty::command());

    let grabber = Device::Grabber(fg as u32);
    lib.add_property(grabber, "DeviceFirmwareVersion", MockProperty::String("3.1".into()));
    lib.add_property(grabber, "CameraSelector", MockProperty::Int(0));

    let kyfg = KyFg::with_params(lib.clone(), InitParams::default()).unwrap();

    (lib, kyfg)
}



#[test]
fn library_reports_version_and_devices() {
    let (lib, kyfg) = setup();

    assert_eq!(kyfg.software_version().unwrap().to_string(), "6.3.1");
    assert_eq!(lib.init_params().map(|p| p.version), Some(2));

    let grabbers = kyfg.list_grabbers().unwrap();
    assert_eq!(grabbers.len(), 1);
    assert_eq!(grabbers[0].name, "Predator II");
    assert_eq!(grabbers[0].protocol, DeviceProtocol::CoaXPress);
    assert!(grabbers[0].is_grabber());
}

#[test]
fn grabber_index_out_of_range() {
    let (_, kyfg) = setup();

    assert!(matches!(kyfg.open_grabber(1), Err(Error::InvalidArgument(_))));
    assert!(matches!(kyfg.open_grabber(-1), Err(Error::InvalidArgument(_))));
}

#[test]
fn unavailable_grabber() {
    let (lib, kyfg) = setup();
    lib.set_grabber_available(0, false);

    assert!(matches!(kyfg.open_grabber(0), Err(Error::DeviceUnavailable(_))));
    assert_eq!(kyfg.registry().open_count(Kind::Grabber), 0);
}

#[test]
fn camera_needs_exactly_one_detected() {
    let (lib, kyfg) = setup();

    let fg = kyfg.open_grabber(0).unwrap();

    lib.set_cameras(0, &[]);
    assert!(matches!(fg.open_camera(0), Err(Error::AmbiguousDevice { found: 0 })));

    lib.set_cameras(0, &[CAM, CAM + 1]);
    assert!(matches!(fg.open_camera(0), Err(Error::AmbiguousDevice { found: 2 })));
    assert_eq!(fg.camera_handles().unwrap(), vec![CAM, CAM + 1]);

    lib.set_cameras(0, &[CAM]);
    let camera = fg.open_camera(0).unwrap();
    assert_eq!(camera.handle(), CAM);
    assert!(camera.is_connected());
}

#[test]
fn camera_info_and_properties() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| {
        assert_eq!(fg.get_string("DeviceFirmwareVersion")?, "3.1");
        fg.set_int("CameraSelector", 0)?;

        fg.with_camera(0, |cam| {
            let info = cam.info()?;
            assert_eq!(info.vendor_name, "Kaya");
            assert_eq!(info.model_name, "Iron 2020");

            cam.set_float("ExposureTime", 250.5)?;
            assert_eq!(cam.get_float("ExposureTime")?, 250.5);

            cam.set_enum_by_name("PixelFormat", "BayerRG8")?;
            assert_eq!(cam.get_enum("PixelFormat")?.value, 0x01080009);

            cam.execute("AcquisitionStart")?;
            assert!(cam.is_command_done("AcquisitionStart")?);

            assert!(matches!(cam.get_int("ExposureTime"), Err(Error::TypeMismatch { .. })));
            assert!(matches!(cam.get_int("Gain"), Err(Error::UnknownProperty(_))));

            Ok(())
        })
    }).unwrap();

    assert_eq!(lib.property(Device::Camera(CAM), "ExposureTime"), Some(MockProperty::Float(250.5)));
}

#[test]
fn roi_is_centered_on_the_sensor() {
    let (_, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| {
        cam.center_roi(1024, 512)?;

        assert_eq!(cam.roi()?, Roi { offset_x: 512, offset_y: 512, width: 1024, height: 512 });
        assert!(matches!(cam.center_roi(4096, 512), Err(Error::InvalidArgument(_))));
        assert!(matches!(cam.center_roi(0, 512), Err(Error::InvalidArgument(_))));

        Ok(())
    })).unwrap();
}

#[test]
fn roi_cannot_change_while_acquiring() {
    let (_, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |_| {
        cam.start(0, StartOptions { block: false, ..Default::default() })?;

        assert!(matches!(cam.center_roi(64, 64), Err(Error::AlreadyWorking)));
        assert!(matches!(cam.roi(), Err(Error::AlreadyWorking)));

        cam.stop()
    }))).unwrap();
}

#[test]
fn captured_bayer_frame_downsamples() {
    let (lib, kyfg) = setup();
    let cam = Device::Camera(CAM);
    lib.add_property(cam, "Width", MockProperty::Int(4));
    lib.add_property(cam, "Height", MockProperty::Int(2));

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        cam.set_enum("PixelFormat", 0x01080009)?;
        let layout = cam.frame_layout()?;
        assert_eq!(layout.format, Some(PixelFormat::BayerRG8));

        cam.start(0, StartOptions { block: false, ..Default::default() })?;
        lib.deliver(stream.handle(), MockFrame::new(vec![10, 20, 11, 21, 30, 40, 31, 41]));
        cam.stop()?;

        let frames = stream.take_frames();
        assert_eq!(frames[0].to_rgb_downsampled(&layout)?, vec![10, 25, 40, 11, 26, 41]);

        Ok(())
    }))).unwrap();
}

#[test]
fn second_stream_on_a_camera_is_refused() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| {
        let first = cam.open_stream(4)?;

        assert!(matches!(cam.open_stream(4), Err(Error::StreamBusy)));
        assert!(first.is_allocated());
        assert_eq!(lib.stream_count(), 1);

        first.free()
    })).unwrap();

    assert_eq!(lib.stream_count(), 0);
}

#[test]
fn scoped_helpers_release_on_error() {
    let (lib, kyfg) = setup();

    let out: Result<(), Error> = kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        stream.register_callback(|_| {})?;
        Err(Error::InvalidArgument("bail".into()))
    })));

    assert!(matches!(out, Err(Error::InvalidArgument(_))));
    assert_eq!(lib.stream_count(), 0);
    assert!(!lib.is_camera_open(CAM));
    assert!(!lib.is_grabber_open(0));
    assert_eq!(lib.calls(Call::CallbackUnregister), 1);
}

#[test]
fn scoped_helpers_release_on_panic() {
    let (lib, kyfg) = setup();

    let out = panic::catch_unwind(AssertUnwindSafe(|| {
        kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |_| -> kyfg::Result<()> {
            cam.start(0, StartOptions { block: false, ..Default::default() })?;
            panic!("operator abort");
        })))
    }));

    assert!(out.is_err());
    assert_eq!(lib.acquisition(CAM), None);
    assert_eq!(lib.stream_count(), 0);
    assert!(!lib.is_camera_open(CAM));
    assert!(!lib.is_grabber_open(0));
    assert_eq!(kyfg.registry().open_count(Kind::Camera), 0);
}

#[test]
fn scoped_callback_is_removed_on_panic() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        let out = panic::catch_unwind(AssertUnwindSafe(|| {
            stream.with_callback(|_| {}, |_| -> kyfg::Result<()> { panic!("handler setup failed") })
        }));

        assert!(out.is_err());
        assert_eq!(lib.callback_count(stream.handle()), 0);
        assert_eq!(stream.callback_count(), 0);
        assert_eq!(lib.calls(Call::CallbackUnregister), 1);

        Ok(())
    }))).unwrap();
}

#[test]
fn every_property_type_round_trips() {
    let (lib, kyfg) = setup();
    let cam = Device::Camera(CAM);
    lib.add_property(cam, "ReverseX", MockProperty::Bool(false));
    lib.add_property(cam, "DeviceUserID", MockProperty::String("left".into()));
    lib.add_property(cam, "LUTValueAll", MockProperty::Register(vec![0; 4]));

    kyfg.with_grabber(0, |fg| {
        fg.set_int("CameraSelector", 3)?;
        assert_eq!(fg.get_int("CameraSelector")?, 3);

        fg.set_string("DeviceFirmwareVersion", "3.2-beta")?;
        assert_eq!(fg.get_string("DeviceFirmwareVersion")?, "3.2-beta");

        fg.with_camera(0, |cam| {
            cam.set_int("Width", 640)?;
            assert_eq!(cam.get_int("Width")?, 640);

            cam.set_float("ExposureTime", 12.25)?;
            assert_eq!(cam.get_float("ExposureTime")?, 12.25);

            cam.set_bool("ReverseX", true)?;
            assert!(cam.get_bool("ReverseX")?);
            cam.set_bool("ReverseX", false)?;
            assert!(!cam.get_bool("ReverseX")?);

            // Longer than before, so the read sizes its buffer again.
            cam.set_string("DeviceUserID", "left-top-camera")?;
            assert_eq!(cam.get_string("DeviceUserID")?, "left-top-camera");

            cam.set_enum_by_name("PixelFormat", "BayerRG8")?;
            let format = cam.get_enum("PixelFormat")?;
            assert_eq!((format.value, format.name.as_str()), (0x01080009, "BayerRG8"));

            cam.set_register("LUTValueAll", vec![4, 3, 2, 1])?;
            assert_eq!(cam.get_register("LUTValueAll")?, vec![4, 3, 2, 1]);

            Ok(())
        })
    }).unwrap();
}

#[test]
fn closing_the_grabber_cascades() {
    let (lib, kyfg) = setup();

    let fg = kyfg.open_grabber(0).unwrap();
    let cam = fg.open_camera(0).unwrap();
    let stream = cam.open_stream(2).unwrap();
    cam.start(0, StartOptions { block: false, ..Default::default() }).unwrap();

    kyfg.registry().close(Kind::Grabber, fg.handle()).unwrap();

    assert!(!stream.is_allocated());
    assert!(!cam.is_connected());
    assert!(!fg.is_connected());
    assert_eq!(lib.calls(Call::CameraStop), 1);
    assert_eq!(lib.stream_count(), 0);
    assert!(!lib.is_grabber_open(0));

    // Already closed: dropping the wrappers is a no-op.
    drop(stream);
    drop(cam);
    drop(fg);
    assert_eq!(lib.calls(Call::GrabberClose), 1);
}

#[test]
fn failed_close_is_reported() {
    let (lib, kyfg) = setup();
    lib.fail(Call::CameraClose);

    let out = kyfg.with_grabber(0, |fg| fg.with_camera(0, |_| Ok(())));

    assert!(matches!(out, Err(Error::NativeCallFailure { call: "camera_close", .. })));
}
