#![cfg(feature = "mock")]

use kyfg::acquisition::{AcquisitionState, Completion};
use kyfg::api::{CamHandle, Device};
use kyfg::camera::StartOptions;
use kyfg::mock::{Call, MockFrame, MockLib, MockProperty};
use kyfg::prelude::*;
use kyfg::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CAM: CamHandle = 0x21;

fn setup() -> (Arc<MockLib>, KyFg) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let lib = Arc::new(MockLib::new());
    let fg = lib.add_grabber("Komodo CXP");
    lib.set_cameras(fg, &[CAM]);
    lib.add_property(Device::Camera(CAM), "Width", MockProperty::Int(4));

    let kyfg = KyFg::with_params(lib.clone(), InitParams::default()).unwrap();

    (lib, kyfg)
}

fn no_block() -> StartOptions {
    StartOptions { block: false, ..Default::default() }
}

/// Delivers `frames` buffers then end of stream once the camera is started.
fn feed(lib: &Arc<MockLib>, stream: u32, frames: u8) -> thread::JoinHandle<()> {
    let lib = lib.clone();

    thread::spawn(move || {
        while lib.acquisition(CAM).is_none() {
            thread::sleep(Duration::from_millis(1));
        }

        for i in 0..frames {
            lib.deliver(stream, MockFrame::new(vec![i; 4]).image_id(i as u64).timestamp(1000 * i as u64));
        }

        lib.deliver(stream, MockFrame::end_of_stream());
    })
}



#[test]
fn default_callback_collects_until_end_of_stream() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(4, |stream| {
        cam.start(0, no_block())?;
        assert_eq!(cam.state(), AcquisitionState::Working);
        assert_eq!(stream.callback_count(), 1);

        lib.deliver(stream.handle(), MockFrame::new(vec![1, 2, 3, 4]).image_id(1));
        lib.deliver(stream.handle(), MockFrame::new(vec![5, 6, 7, 8]).image_id(2));
        lib.deliver(stream.handle(), MockFrame::end_of_stream());
        lib.deliver(stream.handle(), MockFrame::new(vec![9; 4]).image_id(3));

        assert_eq!(cam.await_acquisition(None), Completion::Idle);
        cam.stop()?;

        let frames = stream.take_frames();
        assert_eq!(frames.iter().map(|f| f.image_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(frames[1].data, vec![5, 6, 7, 8]);
        assert_eq!(frames[1].buffer_id, 1);

        Ok(())
    }))).unwrap();

    assert_eq!(lib.calls(Call::CameraStop), 1);
}

#[test]
fn blocking_capture_returns_the_frames() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(4, |stream| {
        let feeder = feed(&lib, stream.handle(), 3);
        let frames = cam.capture(3, Some(Duration::from_secs(10)), true)?;
        feeder.join().unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].timestamp, 2000);
        assert_eq!(cam.state(), AcquisitionState::Idle);
        assert_eq!(lib.acquisition(CAM), None);

        Ok(())
    }))).unwrap();
}

#[test]
fn capture_times_out_and_still_stops() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(4, |_| {
        let frames = cam.capture(0, Some(Duration::from_millis(30)), true)?;

        assert!(frames.is_empty());
        assert_eq!(cam.state(), AcquisitionState::Idle);
        assert_eq!(lib.calls(Call::CameraStop), 1);

        Ok(())
    }))).unwrap();
}

#[test]
fn interrupted_capture_stops_then_reports() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(4, |_| {
        let interrupter = cam.interrupter();
        let watcher = {
            let lib = lib.clone();

            thread::spawn(move || {
                while lib.acquisition(CAM).is_none() {
                    thread::sleep(Duration::from_millis(1));
                }
                interrupter.interrupt();
            })
        };

        let err = cam.capture(0, None, true).unwrap_err();
        watcher.join().unwrap();

        assert!(matches!(err, Error::Interrupted));
        assert_eq!(lib.calls(Call::CameraStop), 1);
        assert!(!cam.is_working());

        Ok(())
    }))).unwrap();
}

#[test]
fn start_requires_a_stream() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| {
        assert!(matches!(cam.start(0, no_block()), Err(Error::NoStream)));
        assert_eq!(cam.state(), AcquisitionState::Idle);
        assert_eq!(lib.calls(Call::CameraStart), 0);

        Ok(())
    })).unwrap();
}

#[test]
fn start_and_stop_are_guarded_by_state() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |_| {
        assert!(matches!(cam.stop(), Err(Error::NotWorking)));

        cam.start(0, no_block())?;
        assert!(matches!(cam.start(0, no_block()), Err(Error::AlreadyWorking)));
        assert_eq!(lib.calls(Call::CameraStart), 1);

        cam.stop()?;
        assert!(matches!(cam.stop(), Err(Error::NotWorking)));

        Ok(())
    }))).unwrap();
}

#[test]
fn failed_native_start_leaves_the_camera_idle() {
    let (lib, kyfg) = setup();
    lib.fail(Call::CameraStart);

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |_| {
        let err = cam.start(0, StartOptions::default()).unwrap_err();

        assert!(matches!(err, Error::NativeCallFailure { call: "camera_start", .. }));
        assert_eq!(cam.state(), AcquisitionState::Idle);
        assert_eq!(cam.await_acquisition(None), Completion::Idle);

        Ok(())
    }))).unwrap();
}

#[test]
fn user_callbacks_replace_the_default_one() {
    let (lib, kyfg) = setup();
    let seen = Arc::new(AtomicUsize::new(0));

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        let counter = seen.clone();
        stream.register_callback(move |buffer| {
            if buffer.base().unwrap().is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })?;

        cam.start(0, no_block())?;
        lib.deliver(stream.handle(), MockFrame::new(vec![0; 4]));
        cam.stop()?;

        assert_eq!(stream.callback_count(), 1);
        assert_eq!(stream.frame_count(), 0);

        Ok(())
    }))).unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn default_callback_is_installed_once() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        for _ in 0..3 {
            cam.start(0, no_block())?;
            cam.stop()?;
        }

        assert_eq!(stream.callback_count(), 1);
        assert_eq!(lib.calls(Call::CallbackRegister), 1);

        Ok(())
    }))).unwrap();
}

#[test]
fn buffers_outside_an_acquisition_are_ignored() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        cam.start(0, no_block())?;
        cam.stop()?;

        lib.deliver(stream.handle(), MockFrame::new(vec![1; 4]));

        assert_eq!(stream.frame_count(), 0);

        Ok(())
    }))).unwrap();
}

#[test]
fn interrupt_from_a_user_callback_ends_the_capture() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        let interrupter = cam.interrupter();
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = frames.clone();

        // Gives up after the second buffer.
        stream.register_callback(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                interrupter.interrupt();
            }
        })?;

        let feeder = feed(&lib, stream.handle(), 5);
        let err = cam.capture(0, Some(Duration::from_secs(10)), true).unwrap_err();
        feeder.join().unwrap();

        assert!(matches!(err, Error::Interrupted));
        assert!(frames.load(Ordering::SeqCst) >= 2);

        Ok(())
    }))).unwrap();
}

#[test]
fn scoped_callback_is_removed_on_error() {
    let (lib, kyfg) = setup();

    kyfg.with_grabber(0, |fg| fg.with_camera(0, |cam| cam.with_stream(2, |stream| {
        let out: kyfg::Result<()> = stream.with_callback(|_| {}, |handle| {
            assert!(!handle.is_removed());
            assert_eq!(lib.callback_count(stream.handle()), 1);

            Err(Error::NoStream)
        });

        assert!(matches!(out, Err(Error::NoStream)));
        assert_eq!(stream.callback_count(), 0);
        assert_eq!(lib.callback_count(stream.handle()), 0);

        // With the scoped one gone, start installs the collector again.
        cam.start(0, no_block())?;
        assert_eq!(stream.callback_count(), 1);
        cam.stop()
    }))).unwrap();
}
