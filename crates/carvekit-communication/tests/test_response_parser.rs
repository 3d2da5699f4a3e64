use carvekit_communication::firmware::grbl::response_parser::{FeedbackMessage, GrblResponse};
use carvekit_communication::firmware::grbl::status_parser::parse_status;
use carvekit_communication::firmware::grbl::error_decoder;
use carvekit_communication::ControllerType;
use carvekit_core::{MachineState, MachineStatus, Position4};

#[test]
fn test_parse_acknowledgements() {
    assert_eq!(GrblResponse::parse("ok"), GrblResponse::Ack { line: None });
    assert_eq!(
        GrblResponse::parse("ok:7"),
        GrblResponse::Ack { line: Some(7) }
    );
}

#[test]
fn test_parse_error_and_alarm() {
    assert_eq!(GrblResponse::parse("error:2"), GrblResponse::Error(2));
    assert_eq!(GrblResponse::parse("ALARM:6"), GrblResponse::Alarm(6));
}

#[test]
fn test_full_status_report() {
    // All the common report fields in one line
    let report = parse_status("<Run|MPos:10.0,0.0,-2.5,0.0|Bf:10,64|Ln:42|F:800|S:12000>").unwrap();

    assert_eq!(report.state, MachineState::Run);
    assert_eq!(
        report.machine_position,
        Some(Position4::new(10.0, 0.0, -2.5, 0.0))
    );
    assert_eq!(report.planner_blocks, Some(10));
    assert_eq!(report.buffer_available, Some(64));
    assert_eq!(report.last_line, Some(42));
    assert_eq!(report.feed_rate, Some(800));
    assert_eq!(report.spindle_speed, Some(12000));
}

#[test]
fn test_status_report_applies_to_model() {
    let mut status = MachineStatus::default();
    parse_status("<Idle|MPos:1.000,2.000,3.000>")
        .unwrap()
        .apply_to(&mut status);

    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.machine_position, Position4::new(1.0, 2.0, 3.0, 0.0));
}

#[test]
fn test_combined_feed_spindle_field() {
    let report = parse_status("<Run|WPos:0.000,0.000,0.000|FS:500.0,8000>").unwrap();
    assert_eq!(report.feed_rate, Some(500));
    assert_eq!(report.spindle_speed, Some(8000));
}

#[test]
fn test_override_and_pin_fields() {
    let report = parse_status("<Hold:0|MPos:0,0,0|Ov:110,100,90|Pn:XP>").unwrap();

    let ov = report.overrides.unwrap();
    assert_eq!((ov.feed, ov.rapid, ov.spindle), (110, 100, 90));

    let pins = report.pins.unwrap();
    assert!(pins.x_limit);
    assert!(pins.probe);
    assert!(!pins.y_limit);
}

#[test]
fn test_malformed_status_is_swallowed() {
    // A corrupted report classifies as Unknown instead of failing
    assert!(matches!(
        GrblResponse::parse("<|||"),
        GrblResponse::Unknown(_)
    ));
    assert!(matches!(
        GrblResponse::parse("<123>"),
        GrblResponse::Unknown(_)
    ));

    // And routing an Unknown line leaves the status model untouched
    let mut status = MachineStatus::default();
    let before = status.clone();
    if let GrblResponse::Status(report) = GrblResponse::parse("<Idle|MPos:nan-garbage>") {
        report.apply_to(&mut status);
        assert_eq!(status.machine_position, before.machine_position);
    }
}

#[test]
fn test_settings_lines() {
    match GrblResponse::parse("$110=1000.000") {
        GrblResponse::Setting(s) => {
            assert_eq!(s.id, 110);
            assert_eq!(s.value, "1000.000");
            assert_eq!(s.description, None);
        }
        other => panic!("unexpected: {:?}", other),
    }

    match GrblResponse::parse("$1=25 (step idle delay, msec)") {
        GrblResponse::Setting(s) => {
            assert_eq!(s.id, 1);
            assert_eq!(s.value, "25");
            assert_eq!(s.description.as_deref(), Some("step idle delay, msec"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_feedback_blocks() {
    assert_eq!(
        GrblResponse::parse("[MSG:Pgm End]"),
        GrblResponse::Feedback(FeedbackMessage::Message("Pgm End".to_string()))
    );
    assert_eq!(
        GrblResponse::parse("[GC:G0 G54 G17 G21 G90 G94]"),
        GrblResponse::Feedback(FeedbackMessage::ParserState(
            "G0 G54 G17 G21 G90 G94".to_string()
        ))
    );

    match GrblResponse::parse("[G54:4.000,0.000,-1.500]") {
        GrblResponse::Feedback(FeedbackMessage::WorkOffset { label, offset }) => {
            assert_eq!(label, "G54");
            assert_eq!(offset, Position4::new(4.0, 0.0, -1.5, 0.0));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_startup_banners() {
    match GrblResponse::parse("Grbl 1.1h ['$' for help]") {
        GrblResponse::Startup { firmware, version } => {
            assert_eq!(firmware, ControllerType::Grbl);
            assert_eq!(version, "1.1h");
        }
        other => panic!("unexpected: {:?}", other),
    }

    assert!(matches!(
        GrblResponse::parse("GrblHAL 1.1f ['$' or '$HELP' for help]"),
        GrblResponse::Startup {
            firmware: ControllerType::GrblHal,
            ..
        }
    ));
}

#[test]
fn test_error_code_table() {
    assert_eq!(
        error_decoder::describe_error(9),
        "Error 9: G-code locked out during alarm or jog state."
    );
    assert_eq!(
        error_decoder::describe_error(1),
        "Error 1: G-code words consist of a letter and a value. Letter was not found."
    );
    // Unknown codes decode to a generic message rather than failing
    assert!(error_decoder::describe_error(250).contains("Unknown error"));
    assert!(error_decoder::describe_alarm(99).contains("Unknown alarm"));
}
