use motif_annotator::utils::logging::verbose;
use motif_annotator::{Annotator, AnnotatorConfig, MotifLibrary};

#[test]
fn debug_config_turns_on_verbose_logging() {
    let mut config = AnnotatorConfig::default();
    config.debug = true;
    let _annotator = Annotator::new(config, MotifLibrary::default()).unwrap();
    assert!(verbose());

    let _quiet = Annotator::new(AnnotatorConfig::default(), MotifLibrary::default()).unwrap();
    assert!(!verbose());
}
