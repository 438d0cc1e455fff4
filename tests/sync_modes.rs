use std::path::Path;

use motif_annotator::media::SyntheticVideoDecoder;
use motif_annotator::sync::{make_driver, DriverKind, DriverSlot, MediaDriver, TimeSync};
use motif_annotator::{EventBus, SyncMode};

fn driver(kind: DriverKind) -> Box<dyn MediaDriver> {
    let mut driver = make_driver(kind, Box::new(SyntheticVideoDecoder::new(25.0, 500)), 8);
    driver.open(Path::new("trial.mp4")).unwrap();
    driver
}

fn settle(sync: &mut TimeSync, bus: &EventBus, kind: DriverKind) {
    for _ in 0..20 {
        sync.pump(bus).unwrap();
        if kind == DriverKind::Streaming {
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
    }
}

#[test]
fn switching_modes_keeps_cursor_and_one_active_driver() {
    for kind in [DriverKind::Buffered, DriverKind::Streaming] {
        for from in SyncMode::ALL {
            for to in SyncMode::ALL {
                let bus = EventBus::new();
                let mut sync = TimeSync::new(from);
                sync.attach(DriverSlot::Video, driver(kind));
                sync.attach(DriverSlot::Stream, driver(kind));
                sync.set_trial(1, &bus);
                sync.seek(6.0, &bus).unwrap();
                settle(&mut sync, &bus, kind);
                let before = sync.cursor();

                sync.set_mode(to, &bus).unwrap();
                assert_eq!(sync.cursor(), before, "{kind:?} {from} -> {to}");
                assert!(sync.playing_drivers() <= 1);

                sync.play(&bus).unwrap();
                assert_eq!(sync.playing_drivers(), 1, "{kind:?} {from} -> {to}");
                sync.stop(&bus);
            }
        }
    }
}
