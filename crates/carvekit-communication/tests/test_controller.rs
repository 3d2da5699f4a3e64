use carvekit_communication::{
    Communicator, ConnectionParams, GrblController, GrblControllerConfig, StreamerConfig,
};
use carvekit_core::{
    Axis, ControllerError, ControllerEvent, Error, JobState, MachineState, Position4,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

// Scripted transport: records writes, replays queued incoming chunks
struct ScriptedCommunicator {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
    connected: bool,
}

impl Communicator for ScriptedCommunicator {
    fn connect(&mut self, _params: &ConnectionParams) -> carvekit_core::Result<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> carvekit_core::Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, data: &[u8]) -> carvekit_core::Result<usize> {
        self.sent.lock().push(data.to_vec());
        Ok(data.len())
    }

    fn receive(&mut self) -> carvekit_core::Result<Vec<u8>> {
        Ok(self.incoming.lock().pop_front().unwrap_or_default())
    }
}

struct Harness {
    controller: GrblController,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl Harness {
    /// Controller over an already-open scripted link; no background tasks
    fn new() -> Self {
        Self::with_capacity(100)
    }

    fn with_capacity(safe_capacity: usize) -> Self {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let incoming = Arc::new(Mutex::new(VecDeque::new()));
        let mock = ScriptedCommunicator {
            sent: sent.clone(),
            incoming: incoming.clone(),
            connected: true,
        };
        let config = GrblControllerConfig {
            poll_interval: Duration::from_millis(50),
            streamer: StreamerConfig {
                safe_capacity,
                stall_backoff: Duration::from_millis(10),
                stop_grace: Duration::from_millis(10),
            },
            ..Default::default()
        };
        let controller = GrblController::new(Box::new(mock), config);
        Self {
            controller,
            sent,
            incoming,
        }
    }

    fn push_line(&self, line: &str) {
        self.incoming.lock().push_back(format!("{}\n", line).into_bytes());
    }

    fn wire_text(&self) -> String {
        let chunks = self.sent.lock();
        chunks
            .iter()
            .map(|c| String::from_utf8_lossy(c).to_string())
            .collect()
    }

    fn wire_lines(&self) -> Vec<String> {
        self.wire_text()
            .split(['\n', '?', '!', '~'])
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect()
    }
}

#[test]
fn test_status_report_round_trip() {
    let h = Harness::new();
    h.controller
        .process_response("<Idle|MPos:1.000,2.000,3.000>");

    let status = h.controller.status();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.machine_position, Position4::new(1.0, 2.0, 3.0, 0.0));
}

#[test]
fn test_full_status_scenario() {
    let h = Harness::new();
    h.controller
        .process_response("<Run|MPos:10.0,0.0,-2.5,0.0|Bf:10,64|Ln:42|F:800|S:12000>");

    let status = h.controller.status();
    assert_eq!(status.state, MachineState::Run);
    assert_eq!(
        status.machine_position,
        Position4::new(10.0, 0.0, -2.5, 0.0)
    );
    assert_eq!(status.buffer_available, 64);
    assert_eq!(status.last_line, 42);
    assert_eq!(status.feed_rate, 800);
    assert_eq!(status.spindle_speed, 12000);
}

#[test]
fn test_jog_gated_by_machine_state() {
    let h = Harness::new();

    h.controller.process_response("<Run|MPos:0,0,0>");
    let result = h.controller.jog(Axis::X, 5.0, 1200);
    assert!(matches!(
        result,
        Err(Error::Controller(ControllerError::StateViolation { .. }))
    ));

    h.controller.process_response("<Idle|MPos:0,0,0>");
    h.controller.jog(Axis::X, 5.0, 1200).unwrap();
    assert!(h.wire_text().contains("$J=G91 G21 X5.000 F1200\n"));
}

#[test]
fn test_homing_gated_by_machine_state() {
    let h = Harness::new();

    h.controller.process_response("<Jog|MPos:0,0,0>");
    assert!(h.controller.home().is_err());

    h.controller.process_response("<Idle|MPos:0,0,0>");
    h.controller.home().unwrap();
    assert!(h.wire_text().contains("$H\n"));
}

#[test]
fn test_probe_command_and_result_event() {
    let h = Harness::new();
    let mut events = h.controller.subscribe();

    h.controller.process_response("<Idle|MPos:0,0,0>");
    h.controller.probe(Axis::Z, -10.0, 100).unwrap();
    assert!(h.wire_text().contains("G38.2 Z-10.000 F100\n"));

    h.controller.process_response("[PRB:1.000,2.000,-5.000:1]");

    let mut probe_event = None;
    while let Ok(event) = events.try_recv() {
        if let ControllerEvent::ProbeResult {
            position,
            triggered,
        } = event
        {
            probe_event = Some((position, triggered));
        }
    }
    let (position, triggered) = probe_event.expect("probe event not published");
    assert_eq!(position, Position4::new(1.0, 2.0, -5.0, 0.0));
    assert!(triggered);
}

#[test]
fn test_zero_work_offset_commands() {
    let h = Harness::new();

    h.controller.zero_work_offset(1, &[]).unwrap();
    assert!(h.wire_text().contains("G10 L20 P1 X0 Y0 Z0\n"));

    h.controller.zero_work_offset(3, &[Axis::Z]).unwrap();
    assert!(h.wire_text().contains("G10 L20 P3 Z0\n"));

    assert!(matches!(
        h.controller.zero_work_offset(9, &[]),
        Err(Error::Controller(ControllerError::InvalidRequest { .. }))
    ));
}

#[test]
fn test_startup_banner_resets_status() {
    let h = Harness::new();
    h.controller
        .process_response("<Run|MPos:5.0,0.0,0.0|F:500>");
    assert_eq!(h.controller.status().feed_rate, 500);

    h.controller.process_response("Grbl 1.1h ['$' for help]");

    let status = h.controller.status();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.feed_rate, 0);
    let (firmware, version) = h.controller.firmware().unwrap();
    assert_eq!(firmware.to_string(), "GRBL");
    assert_eq!(version, "1.1h");
}

#[test]
fn test_alarm_response_latches_alarm_state() {
    let h = Harness::new();
    h.controller.process_response("<Idle|MPos:0,0,0>");

    h.controller.process_response("ALARM:1");
    assert_eq!(h.controller.status().state, MachineState::Alarm);

    // Jogging is now locked out until the alarm clears
    assert!(h.controller.jog(Axis::X, 1.0, 600).is_err());
}

#[tokio::test]
async fn test_streamed_job_end_to_end() {
    let h = Harness::new();
    h.controller.process_response("<Idle|MPos:0,0,0>");

    h.controller.connect().unwrap();
    h.push_line("Grbl 1.1h ['$' for help]");

    h.controller
        .send_job(["G0 X0", "; setup", "G1 X10 F500"])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Both surviving lines are on the wire, numbered
    let lines = h.wire_lines();
    assert!(lines.iter().any(|l| l == "N1G0 X0"));
    assert!(lines.iter().any(|l| l == "N2G1 X10 F500"));

    h.push_line("ok");
    h.push_line("ok");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.controller.job_state(), JobState::Completed);
    assert_eq!(h.controller.progress().percent_complete, 100.0);
    assert_eq!(h.controller.progress().bytes_in_flight, 0);
}

#[tokio::test]
async fn test_firmware_error_mid_job() {
    let h = Harness::new();
    h.controller.connect().unwrap();

    h.controller.send_job(["G1 X10"]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.push_line("error:9");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        h.controller.job_state(),
        JobState::Error("Error 9: G-code locked out during alarm or jog state.".to_string())
    );
}

#[tokio::test]
async fn test_disconnect_cancels_session() {
    let h = Harness::new();
    h.controller.connect().unwrap();
    h.controller.send_job(["G0 X1", "G0 X2"]).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.controller.disconnect().unwrap();
    assert!(!h.controller.is_connected());
    assert_eq!(h.controller.job_state(), JobState::Idle);
    assert_eq!(h.controller.progress().total_lines, 0);
}

#[tokio::test]
async fn test_pause_and_resume_mid_job() {
    // Capacity fits one line at a time, so the queue outlives the pause
    let h = Harness::with_capacity(10);
    h.controller.connect().unwrap();

    h.controller.send_job(["G0 X1", "G0 X2"]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.wire_lines().iter().filter(|l| l.starts_with('N')).count(),
        1
    );

    h.controller.pause_job().unwrap();
    assert_eq!(h.controller.job_state(), JobState::Paused);

    // Room opens up, but a paused job must not dispatch
    h.push_line("ok");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        h.wire_lines().iter().filter(|l| l.starts_with('N')).count(),
        1
    );

    h.controller.resume_job().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.wire_lines().iter().any(|l| l == "N2G0 X2"));

    h.push_line("ok");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.controller.job_state(), JobState::Completed);
}
