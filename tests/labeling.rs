use motif_annotator::dataset::{label_runs, InMemoryDataset};
use motif_annotator::labels::ClickOutcome;
use motif_annotator::{AnnotatorConfig, Annotator, Dataset, MotifLibrary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FPS: f64 = 10.0;
const N_FRAMES: usize = 100;

fn motifs() -> MotifLibrary {
    MotifLibrary::parse("0 background 1 1 1\n1 beakTip 255 102 178\n2 wingFlap 0 128 255\n").0
}

fn annotator(snap: bool) -> Annotator {
    let mut config = AnnotatorConfig::default();
    config.editor.snap_enabled = snap;
    let mut data = InMemoryDataset::new(FPS).with_trial(1, N_FRAMES, &["beak"]);
    data.set_changepoints(1, "beak", &[19, 51]).unwrap();
    data.set_feature(1, "beak", "bird", "speed", vec![0.0; N_FRAMES])
        .unwrap();
    let mut annotator = Annotator::new(config, motifs()).unwrap();
    annotator.load_dataset(Box::new(data));
    annotator
}

fn labels(annotator: &Annotator) -> Vec<u16> {
    annotator
        .state()
        .dataset()
        .unwrap()
        .labels(1, "beak")
        .unwrap()
        .to_vec()
}

fn label(annotator: &mut Annotator, motif: u16, first: f64, second: f64) -> ClickOutcome {
    annotator.activate_motif(motif).unwrap();
    annotator.left_click(first).unwrap();
    annotator.left_click(second).unwrap()
}

#[test]
fn two_clicks_label_half_open_range() {
    for (first, second) in [(2.0, 5.0), (5.0, 2.0)] {
        let mut annotator = annotator(false);
        let outcome = label(&mut annotator, 1, first, second);
        let ClickOutcome::Committed(segment) = outcome else {
            panic!("expected a commit, got {outcome:?}");
        };
        assert_eq!((segment.start_time, segment.end_time), (2.0, 5.0));

        let labels = labels(&annotator);
        assert!(labels[20..50].iter().all(|&m| m == 1), "{first} -> {second}");
        assert_eq!(labels[19], 0);
        assert_eq!(labels[50], 0);
    }
}

#[test]
fn clicks_snap_to_nearby_changepoints() {
    let mut annotator = annotator(true);
    label(&mut annotator, 1, 2.05, 4.95);
    let runs = label_runs(&labels(&annotator));
    assert_eq!(runs.len(), 1);
    assert_eq!((runs[0].start, runs[0].end), (19, 51));
}

#[test]
fn zero_length_segment_is_rejected() {
    let mut annotator = annotator(false);
    annotator.activate_motif(1).unwrap();
    annotator.left_click(3.0).unwrap();
    let err = annotator.left_click(3.01).unwrap_err();
    assert!(err.is_validation());
    assert!(labels(&annotator).iter().all(|&m| m == 0));
}

#[test]
fn reversed_clicks_always_store_ordered_segment() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let a = rng.gen_range(0..=N_FRAMES) as f64 / FPS;
        let b = rng.gen_range(0..=N_FRAMES) as f64 / FPS;
        let mut annotator = annotator(false);
        annotator.activate_motif(2).unwrap();
        annotator.left_click(a).unwrap();
        let result = annotator.left_click(b);
        if (a - b).abs() < 1e-9 {
            assert!(result.is_err());
            continue;
        }
        let ClickOutcome::Committed(segment) = result.unwrap() else {
            panic!("second click did not commit");
        };
        assert!(segment.start_time < segment.end_time);
        assert_eq!(segment.start_time, a.min(b));
        assert_eq!(segment.end_time, a.max(b));
    }
}

#[test]
fn commit_overwrites_only_its_own_range() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..30 {
        let mut annotator = annotator(false);
        label(&mut annotator, 1, 1.0, 8.0);
        let before = labels(&annotator);

        let start = rng.gen_range(0..N_FRAMES - 1);
        let end = rng.gen_range(start + 1..=N_FRAMES);
        label(&mut annotator, 2, start as f64 / FPS, end as f64 / FPS);

        let after = labels(&annotator);
        for frame in 0..N_FRAMES {
            if (start..end).contains(&frame) {
                assert_eq!(after[frame], 2);
            } else {
                assert_eq!(after[frame], before[frame]);
            }
        }
    }
}

#[test]
fn delete_removes_only_the_run_under_the_cursor() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..20 {
        let mut annotator = annotator(false);
        label(&mut annotator, 1, 1.0, 2.0);
        label(&mut annotator, 2, 3.0, 4.0);
        label(&mut annotator, 1, 6.0, 7.5);

        let target = rng.gen_range(0..3);
        let cursor = [1.5, 3.5, 6.8][target];
        annotator.seek(cursor).unwrap();
        annotator.delete().unwrap();

        let runs = label_runs(&labels(&annotator));
        assert_eq!(runs.len(), 2);
        let remaining: Vec<_> = runs.iter().map(|r| (r.start, r.end, r.motif_id)).collect();
        let all = [(10, 20, 1), (30, 40, 2), (60, 75, 1)];
        let expected: Vec<_> = all
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target)
            .map(|(_, run)| *run)
            .collect();
        assert_eq!(remaining, expected);
    }
}

#[test]
fn duplicate_motif_id_keeps_later_color() {
    let (library, report) = MotifLibrary::parse("3 peck 255 0 0\n3 peck 0 255 0\n");
    assert_eq!(report.duplicates, vec![3]);
    let color = library.color_of(3).unwrap();
    assert_eq!((color.r, color.g, color.b), (0, 255, 0));
}
