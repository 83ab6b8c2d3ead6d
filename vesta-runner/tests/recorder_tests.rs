//! Recording golden frames from inside a running test
//!
//! The recorder is created in a setup hook, fed one snapshot per
//! iteration by the body, and finalized in teardown; the archive is then
//! replayed and every frame checked against the color ramp the body drew.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use vesta_runner::{
    ArchiveError, Harness, HeadlessProvider, HeadlessSurface, OverrideLayer, Recorder,
    ReferenceArchive, Surface as _, TestCase, TracingNotifier,
};

const MAX: u32 = 10;

fn scratch_root(test: &str) -> PathBuf {
    let root = PathBuf::from(env!("CARGO_TARGET_TMPDIR"))
        .join("recorder")
        .join(test);
    if root.exists() {
        fs::remove_dir_all(&root).unwrap();
    }
    fs::create_dir_all(&root).unwrap();
    root
}

#[expect(clippy::cast_possible_truncation)]
fn ramp_color(frame: u32) -> [u8; 4] {
    let r = ((MAX - frame) * 255 / MAX) as u8;
    let g = (frame * 255 / MAX) as u8;
    [r, g, 0, 255]
}

#[test]
fn recorded_ramp_replays_in_capture_order() {
    let root = scratch_root("ramp");
    let recorder: Rc<RefCell<Option<Recorder>>> = Rc::new(RefCell::new(None));
    let frame = Rc::new(RefCell::new(0_u32));

    let case = TestCase::new("record", {
        let recorder = Rc::clone(&recorder);
        let frame = Rc::clone(&frame);
        move |surface: &mut HeadlessSurface| {
            let current = *frame.borrow();
            surface.clear(ramp_color(current));
            recorder.borrow_mut().as_mut().unwrap().snapshot(surface)?;
            surface.present()?;
            *frame.borrow_mut() += 1;
            Ok(())
        }
    })
    .with_method_layer(
        OverrideLayer::new()
            .with_iterations(MAX + 1)
            .with_fps(0)
            .with_window(8, 8),
    )
    .with_setup({
        let recorder = Rc::clone(&recorder);
        let root = root.clone();
        move |_| {
            *recorder.borrow_mut() = Some(Recorder::create(&root, "record")?);
            Ok(())
        }
    })
    .with_teardown({
        let recorder = Rc::clone(&recorder);
        move |_| {
            if let Some(mut active) = recorder.borrow_mut().take() {
                active.close()?;
            }
            Ok(())
        }
    });

    let result = Harness::new(HeadlessProvider::new(), &root).run(case, &mut TracingNotifier);
    assert!(result.passed(), "failures: {:?}", result.failures());

    let mut archive = ReferenceArchive::open(&root, "record").unwrap();
    assert_eq!(archive.len(), (MAX + 1) as usize);

    for i in 0..=MAX {
        let (name, image) = archive.next_frame().unwrap();
        assert_eq!(name, format!("record_{:04}.png", i + 1), "missing frame {i}");
        let [r, g, b, _] = ramp_color(i);
        assert_eq!(image.get_pixel(0, 0).0, [r, g, b], "frame {i} pixel");
    }
    match archive.next_frame() {
        Err(ArchiveError::ArchiveExhausted { .. }) => {}
        other => panic!("extra frame after the ramp: {other:?}"),
    }
}
