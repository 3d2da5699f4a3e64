//! GRBL controller session
//!
//! One `GrblController` owns one connection: the transport handle, the
//! streaming engine, the live machine status, and the background tasks
//! (incoming-line reader, status-poll ticker, and the per-job dispatch
//! loop). Construct it explicitly and pass it to whoever needs it; there
//! is no global instance.

use crate::communication::{Communicator, ConnectionParams, TransportHandle};
use crate::firmware::grbl::error_decoder;
use crate::firmware::grbl::realtime::RealtimeCommand;
use crate::firmware::grbl::response_parser::{FeedbackMessage, GrblResponse};
use crate::firmware::ControllerType;
use crate::streaming::{JobStreamer, StreamerConfig};
use carvekit_core::{
    Axis, ControllerError, ControllerEvent, EventDispatcher, JobProgress, JobState, MachineState,
    MachineStatus, Result,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct GrblControllerConfig {
    /// Connection parameters for the transport
    pub connection: ConnectionParams,
    /// Status query interval (the DRO stays live even when idle)
    pub poll_interval: Duration,
    /// Streaming engine configuration
    pub streamer: StreamerConfig,
}

impl Default for GrblControllerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            poll_interval: Duration::from_millis(200),
            streamer: StreamerConfig::default(),
        }
    }
}

/// Background task handles for one connection
#[derive(Default)]
struct TaskHandles {
    reader: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
}

impl TaskHandles {
    fn abort_all(&mut self) {
        for handle in [
            self.reader.take(),
            self.poll.take(),
            self.dispatch.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// Routes classified firmware responses into the status model, the
/// streaming engine, and the event stream
#[derive(Clone)]
struct ResponseRouter {
    status: Arc<RwLock<MachineStatus>>,
    streamer: JobStreamer,
    events: EventDispatcher,
    firmware: Arc<RwLock<Option<(ControllerType, String)>>>,
}

impl ResponseRouter {
    fn route(&self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        match GrblResponse::parse(line) {
            GrblResponse::Ack { line } => {
                self.events
                    .publish(ControllerEvent::LineReceived(raw.to_string()));
                self.streamer.handle_ack(line);
            }
            GrblResponse::Error(code) => {
                self.events
                    .publish(ControllerEvent::LineReceived(raw.to_string()));
                self.streamer.handle_firmware_error(code);
            }
            GrblResponse::Alarm(code) => {
                self.events
                    .publish(ControllerEvent::LineReceived(raw.to_string()));
                self.status.write().state = MachineState::Alarm;
                let message = error_decoder::describe_alarm(code);
                tracing::error!("{}", message);
                self.events.publish(ControllerEvent::AlarmRaised {
                    code,
                    message: message.clone(),
                });
                self.events
                    .publish(ControllerEvent::StateChanged(MachineState::Alarm));
                self.streamer.fail_job(message);
            }
            GrblResponse::Status(report) => {
                // Status reports arrive at poll rate; they update the model
                // but are not echoed to the console.
                let (old_state, new_state) = {
                    let mut status = self.status.write();
                    let old = status.state;
                    report.apply_to(&mut status);
                    (old, status.state)
                };
                if old_state != new_state {
                    self.events
                        .publish(ControllerEvent::StateChanged(new_state));
                    if new_state.is_alarm() {
                        self.streamer.fail_job("Machine entered alarm state");
                    }
                }
            }
            GrblResponse::Startup { firmware, version } => {
                tracing::info!("Controller startup: {} {}", firmware, version);
                self.events
                    .publish(ControllerEvent::LineReceived(raw.to_string()));
                *self.firmware.write() = Some((firmware, version.clone()));
                *self.status.write() = MachineStatus::connected();
                self.events.publish(ControllerEvent::FirmwareDetected {
                    firmware: firmware.to_string(),
                    version,
                });
                self.events
                    .publish(ControllerEvent::StateChanged(MachineState::Idle));
            }
            GrblResponse::Setting(setting) => {
                self.events
                    .publish(ControllerEvent::LineReceived(raw.to_string()));
                self.events.publish(ControllerEvent::SettingReported {
                    id: setting.id,
                    value: setting.value,
                });
            }
            GrblResponse::Feedback(feedback) => {
                self.events
                    .publish(ControllerEvent::LineReceived(raw.to_string()));
                if let FeedbackMessage::Probe {
                    position,
                    triggered,
                } = feedback
                {
                    self.events.publish(ControllerEvent::ProbeResult {
                        position,
                        triggered,
                    });
                }
            }
            GrblResponse::Unknown(text) => {
                tracing::trace!("Unclassified line: {}", text);
                self.events.publish(ControllerEvent::LineReceived(text));
            }
        }
    }
}

/// GRBL controller session
///
/// Drives one connection to a GRBL, grblHAL, or FluidNC controller:
/// job streaming, MDI commands, real-time control, jogging, homing,
/// probing, and work offsets.
pub struct GrblController {
    transport: Arc<TransportHandle>,
    status: Arc<RwLock<MachineStatus>>,
    streamer: JobStreamer,
    events: EventDispatcher,
    router: ResponseRouter,
    firmware: Arc<RwLock<Option<(ControllerType, String)>>>,
    tasks: Arc<Mutex<TaskHandles>>,
    config: GrblControllerConfig,
}

impl GrblController {
    /// Create a controller over a communicator
    ///
    /// The communicator may be one of the built-in transports or a
    /// platform-provided implementation (Bluetooth, WebSocket).
    pub fn new(communicator: Box<dyn Communicator>, config: GrblControllerConfig) -> Self {
        let transport = Arc::new(TransportHandle::new(communicator));
        let status = Arc::new(RwLock::new(MachineStatus::default()));
        let events = EventDispatcher::default();
        let firmware = Arc::new(RwLock::new(None));
        let streamer = JobStreamer::new(
            transport.clone(),
            status.clone(),
            events.clone(),
            config.streamer.clone(),
        );
        let router = ResponseRouter {
            status: status.clone(),
            streamer: streamer.clone(),
            events: events.clone(),
            firmware: firmware.clone(),
        };

        Self {
            transport,
            status,
            streamer,
            events,
            router,
            firmware,
            tasks: Arc::new(Mutex::new(TaskHandles::default())),
            config,
        }
    }

    /// Open the connection and start the reader and poll tasks
    ///
    /// An existing connection is torn down first; one session drives at
    /// most one connection at a time. Must be called from within a tokio
    /// runtime.
    pub fn connect(&self) -> Result<()> {
        if self.transport.is_connected() {
            self.disconnect()?;
        }

        self.transport.connect(&self.config.connection)?;
        *self.status.write() = MachineStatus::default();

        {
            let mut tasks = self.tasks.lock();
            tasks.reader = Some(self.spawn_reader());
            tasks.poll = Some(self.spawn_poll());
        }

        tracing::info!("Connected to {}", self.config.connection.port);
        self.events.publish(ControllerEvent::Connected {
            port: self.config.connection.port.clone(),
        });
        // Prime the DRO rather than waiting out the first poll period
        self.transport
            .send_byte(RealtimeCommand::StatusQuery.byte())
            .ok();
        Ok(())
    }

    /// Close the connection, cancelling all background tasks
    ///
    /// Any active job is dropped and the job state lands on `Idle`.
    pub fn disconnect(&self) -> Result<()> {
        self.tasks.lock().abort_all();
        self.streamer.halt_for_disconnect();
        self.transport.disconnect()?;
        *self.status.write() = MachineStatus::default();
        *self.firmware.write() = None;
        self.events.publish(ControllerEvent::Disconnected);
        Ok(())
    }

    /// Whether the transport is currently connected
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Submit a program and start streaming it
    pub fn send_job<I, S>(&self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.streamer.submit(lines)?;

        let streamer = self.streamer.clone();
        let handle = tokio::spawn(async move {
            streamer.run_dispatch_loop().await;
        });
        if let Some(old) = self.tasks.lock().dispatch.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Pause the active job (dispatch stops, firmware holds motion)
    pub fn pause_job(&self) -> Result<()> {
        self.streamer.pause()
    }

    /// Resume a paused job
    pub fn resume_job(&self) -> Result<()> {
        self.streamer.resume()
    }

    /// Stop the job and soft-reset the controller
    pub async fn stop_job(&self) -> Result<()> {
        self.streamer.stop().await
    }

    /// Current job lifecycle state
    pub fn job_state(&self) -> JobState {
        self.streamer.job_state()
    }

    /// Current job progress
    pub fn progress(&self) -> JobProgress {
        self.streamer.progress()
    }

    /// Snapshot of the live machine status
    pub fn status(&self) -> MachineStatus {
        self.status.read().clone()
    }

    /// Firmware family and version, once the startup banner has been seen
    pub fn firmware(&self) -> Option<(ControllerType, String)> {
        self.firmware.read().clone()
    }

    /// Send a single command line (MDI), bypassing the job queue
    ///
    /// Serialized onto the same wire as streamed lines, so ordering
    /// relative to the job is deterministic. The buffer budget does not
    /// track these; the operator owns that contention.
    pub fn send_command(&self, command: &str) -> Result<()> {
        let command = command.trim();
        self.transport.send_line(command)?;
        self.events
            .publish(ControllerEvent::LineSent(command.to_string()));
        Ok(())
    }

    /// Send a real-time command byte, bypassing queue and budget
    pub fn send_realtime(&self, command: RealtimeCommand) -> Result<()> {
        self.transport.send_byte(command.byte())
    }

    /// Jog one axis incrementally (metric)
    ///
    /// Permitted only while the machine is idle or already jogging.
    pub fn jog(&self, axis: Axis, distance: f64, feed_rate: u32) -> Result<()> {
        let state = self.status.read().state;
        if !state.accepts_jog() {
            return Err(ControllerError::StateViolation {
                operation: "Jog".to_string(),
                state,
            }
            .into());
        }

        self.send_command(&format!(
            "$J=G91 G21 {}{:.3} F{}",
            axis.letter(),
            distance,
            feed_rate
        ))
    }

    /// Cancel an in-progress jog
    pub fn jog_cancel(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::JogCancel)
    }

    /// Run the homing cycle (`$H`); permitted only while idle
    pub fn home(&self) -> Result<()> {
        let state = self.status.read().state;
        if !state.accepts_homing() {
            return Err(ControllerError::StateViolation {
                operation: "Homing".to_string(),
                state,
            }
            .into());
        }
        self.send_command("$H")
    }

    /// Clear an alarm lockout (`$X`)
    pub fn unlock(&self) -> Result<()> {
        self.send_command("$X")
    }

    /// Run a straight probe toward the workpiece (`G38.2`)
    ///
    /// Permitted only while idle; the result arrives as a
    /// [`ControllerEvent::ProbeResult`].
    pub fn probe(&self, axis: Axis, distance: f64, feed_rate: u32) -> Result<()> {
        let state = self.status.read().state;
        if !matches!(state, MachineState::Idle) {
            return Err(ControllerError::StateViolation {
                operation: "Probe".to_string(),
                state,
            }
            .into());
        }

        self.send_command(&format!(
            "G38.2 {}{:.3} F{}",
            axis.letter(),
            distance,
            feed_rate
        ))
    }

    /// Zero the given axes of a work coordinate system (`G10 L20`)
    ///
    /// `wcs` selects G54..G59 as 1..=6. An empty axis list zeroes X, Y,
    /// and Z.
    pub fn zero_work_offset(&self, wcs: u8, axes: &[Axis]) -> Result<()> {
        if !(1..=6).contains(&wcs) {
            return Err(ControllerError::InvalidRequest {
                reason: format!("work coordinate system must be 1-6, got {}", wcs),
            }
            .into());
        }

        let axes: &[Axis] = if axes.is_empty() {
            &[Axis::X, Axis::Y, Axis::Z]
        } else {
            axes
        };

        let mut command = format!("G10 L20 P{}", wcs);
        for axis in axes {
            command.push(' ');
            command.push(axis.letter());
            command.push('0');
        }
        self.send_command(&command)
    }

    /// Feed one incoming line through the response router
    ///
    /// The reader task calls this for every line off the wire; it is
    /// public so host platforms that own their transport's read loop can
    /// inject lines directly.
    pub fn process_response(&self, line: &str) {
        self.router.route(line);
    }

    /// Start the incoming-line reader task
    fn spawn_reader(&self) -> JoinHandle<()> {
        let transport = self.transport.clone();
        let router = self.router.clone();
        let streamer = self.streamer.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut buffer = String::new();
            loop {
                match transport.receive_chunk() {
                    Ok(data) if !data.is_empty() => {
                        buffer.push_str(&String::from_utf8_lossy(&data));
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim_end_matches('\r').to_string();
                            buffer.drain(..=pos);
                            router.route(&line);
                        }
                    }
                    Ok(_) => {
                        // No data pending; yield before polling again
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Err(e) => {
                        tracing::warn!("Receive failed, closing session: {}", e);
                        streamer.fail_job("Connection lost");
                        events.publish(ControllerEvent::Disconnected);
                        break;
                    }
                }
            }
        })
    }

    /// Start the status-poll ticker
    ///
    /// Runs independently of job state so the DRO stays live while idle;
    /// exits when the transport drops.
    fn spawn_poll(&self) -> JoinHandle<()> {
        let transport = self.transport.clone();
        let poll_interval = self.config.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !transport.is_connected() {
                    break;
                }
                if transport
                    .send_byte(RealtimeCommand::StatusQuery.byte())
                    .is_err()
                {
                    break;
                }
            }
        })
    }
}

impl Drop for GrblController {
    fn drop(&mut self) {
        self.tasks.lock().abort_all();
    }
}
