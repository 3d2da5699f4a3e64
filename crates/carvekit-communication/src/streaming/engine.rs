//! The streaming engine
//!
//! Owns the pending-line queue and the byte budget, drives dispatch against
//! the controller's receive buffer, and reacts to acknowledgements and
//! errors. The budget and both line collections are guarded by a single
//! mutex; transmission happens outside it so acknowledgement handling is
//! never blocked behind a slow write.

use crate::communication::TransportHandle;
use crate::firmware::grbl::error_decoder;
use crate::firmware::grbl::realtime::RealtimeCommand;
use crate::streaming::{preprocess_program, QueuedLine};
use carvekit_core::{
    ControllerError, ControllerEvent, EventDispatcher, JobProgress, JobState, MachineStatus,
    Result,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Streaming engine configuration
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Byte ceiling for unacknowledged data. The firmware buffer is 128
    /// bytes; the margin below it absorbs estimation error.
    pub safe_capacity: usize,
    /// How long the dispatch loop sleeps when the buffer is full and no
    /// acknowledgement arrives
    pub stall_backoff: Duration,
    /// Settle time after the soft reset issued by `stop`
    pub stop_grace: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            safe_capacity: 100,
            stall_backoff: Duration::from_millis(50),
            stop_grace: Duration::from_millis(250),
        }
    }
}

/// State shared by the dispatch loop and the response handlers
#[derive(Debug)]
struct StreamerInner {
    /// Lines not yet transmitted
    queue: VecDeque<QueuedLine>,
    /// Transmitted lines awaiting acknowledgement, keyed by sequence
    /// number; the minimum key is the oldest in flight
    pending: BTreeMap<u32, QueuedLine>,
    /// Estimated bytes occupying the controller's receive buffer
    bytes_in_flight: usize,
    /// Job lifecycle state
    job_state: JobState,
    total_lines: usize,
    sent_lines: usize,
    completed_lines: usize,
    current_line: u32,
}

impl Default for StreamerInner {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            pending: BTreeMap::new(),
            bytes_in_flight: 0,
            job_state: JobState::Idle,
            total_lines: 0,
            sent_lines: 0,
            completed_lines: 0,
            current_line: 0,
        }
    }
}

impl StreamerInner {
    fn progress(&self) -> JobProgress {
        let percent = if self.total_lines == 0 {
            0.0
        } else {
            (self.completed_lines as f32 / self.total_lines as f32) * 100.0
        };
        JobProgress {
            total_lines: self.total_lines,
            sent_lines: self.sent_lines,
            completed_lines: self.completed_lines,
            bytes_in_flight: self.bytes_in_flight,
            percent_complete: percent,
            current_line: self.current_line,
        }
    }

    /// Retire a pending line, releasing its bytes from the budget
    fn retire(&mut self, sequence: Option<u32>) -> Option<QueuedLine> {
        let line = match sequence {
            Some(n) => self.pending.remove(&n),
            None => self.pending.pop_first().map(|(_, line)| line),
        }?;
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(line.byte_count);
        Some(line)
    }

    fn complete_if_drained(&mut self) -> bool {
        if self.job_state == JobState::Sending
            && self.queue.is_empty()
            && self.pending.is_empty()
        {
            self.job_state = JobState::Completed;
            true
        } else {
            false
        }
    }

    fn clear_job(&mut self) {
        self.queue.clear();
        self.pending.clear();
        self.bytes_in_flight = 0;
        self.total_lines = 0;
        self.sent_lines = 0;
        self.completed_lines = 0;
        self.current_line = 0;
    }
}

/// Character-counting streaming engine
///
/// Cheap to clone; clones share the same job state, so the controller, the
/// dispatch task, and the response router all operate on one engine.
#[derive(Clone)]
pub struct JobStreamer {
    transport: Arc<TransportHandle>,
    status: Arc<RwLock<MachineStatus>>,
    inner: Arc<Mutex<StreamerInner>>,
    /// Woken on every acknowledgement and state change so a stalled
    /// dispatch loop never waits out its full backoff needlessly
    wakeup: Arc<Notify>,
    events: EventDispatcher,
    config: StreamerConfig,
}

impl JobStreamer {
    /// Create a streaming engine over a transport
    pub fn new(
        transport: Arc<TransportHandle>,
        status: Arc<RwLock<MachineStatus>>,
        events: EventDispatcher,
        config: StreamerConfig,
    ) -> Self {
        Self {
            transport,
            status,
            inner: Arc::new(Mutex::new(StreamerInner::default())),
            wakeup: Arc::new(Notify::new()),
            events,
            config,
        }
    }

    /// Submit a program for streaming
    ///
    /// Lines are trimmed; empty and comment lines are dropped; survivors
    /// are numbered from 1. Fails with `AlreadyStreaming` while a job is
    /// active and `NotConnected` when the transport is down. The caller
    /// (normally the controller) starts the dispatch loop afterwards.
    pub fn submit<I, S>(&self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.transport.is_connected() {
            return Err(ControllerError::NotConnected.into());
        }

        let queued = preprocess_program(lines);
        let progress = {
            let mut inner = self.inner.lock();
            if inner.job_state.is_active() {
                return Err(ControllerError::AlreadyStreaming.into());
            }
            inner.clear_job();
            inner.total_lines = queued.len();
            inner.queue = queued.into();
            inner.job_state = JobState::Sending;
            inner.progress()
        };

        tracing::info!("Job submitted: {} lines", progress.total_lines);
        self.events
            .publish(ControllerEvent::JobStateChanged(JobState::Sending));
        self.events.publish(ControllerEvent::ProgressChanged(progress));
        Ok(())
    }

    /// Transmit as many queued lines as the byte budget allows
    ///
    /// Returns the number of lines sent. A transport failure aborts the
    /// job and propagates the error.
    pub fn try_dispatch(&self) -> Result<usize> {
        let mut sent = 0usize;
        let mut completed = false;

        loop {
            // Decide under the lock, transmit outside it
            let next = {
                let mut inner = self.inner.lock();
                if inner.job_state != JobState::Sending {
                    break;
                }
                let head_fits = inner
                    .queue
                    .front()
                    .map(|line| inner.bytes_in_flight + line.byte_count <= self.config.safe_capacity);
                match head_fits {
                    Some(true) => {
                        let line = inner.queue.pop_front().expect("head checked above");
                        inner.bytes_in_flight += line.byte_count;
                        inner.sent_lines += 1;
                        let wire = line.wire_text();
                        let sequence = line.sequence;
                        inner.pending.insert(sequence, line);
                        Some((wire, sequence))
                    }
                    Some(false) => None,
                    None => {
                        completed = inner.complete_if_drained();
                        None
                    }
                }
            };

            let Some((wire, sequence)) = next else { break };

            if let Err(e) = self.transport.send_line(&wire) {
                // Roll the reservation back; the line never reached the wire
                let state = {
                    let mut inner = self.inner.lock();
                    if inner.retire(Some(sequence)).is_some() {
                        inner.sent_lines -= 1;
                    }
                    inner.job_state = JobState::Error(format!("Transport failure: {}", e));
                    inner.job_state.clone()
                };
                tracing::error!("Send failed, aborting job: {}", e);
                self.wakeup.notify_one();
                self.events.publish(ControllerEvent::JobStateChanged(state));
                return Err(e);
            }

            sent += 1;
            self.events.publish(ControllerEvent::LineSent(wire));
            self.events
                .publish(ControllerEvent::ProgressChanged(self.progress()));
        }

        if completed {
            tracing::info!("Job completed");
            self.events
                .publish(ControllerEvent::JobStateChanged(JobState::Completed));
            self.events
                .publish(ControllerEvent::ProgressChanged(self.progress()));
        }

        Ok(sent)
    }

    /// Dispatch loop body, run as a task for the lifetime of a job
    ///
    /// Suspends while paused, while the buffer is full, and while pending
    /// lines drain at job end; exits when the job reaches a terminal
    /// state. Acknowledgements wake it early via the notify handle.
    pub async fn run_dispatch_loop(&self) {
        loop {
            match self.job_state() {
                JobState::Sending => {
                    if self.status.read().state.is_alarm() {
                        self.fail_job("Machine entered alarm state");
                        continue;
                    }
                    if self.try_dispatch().is_err() {
                        break;
                    }
                    if !self.job_state().is_active() {
                        break;
                    }
                    let _ = tokio::time::timeout(self.config.stall_backoff, self.wakeup.notified())
                        .await;
                }
                JobState::Paused => {
                    let _ = tokio::time::timeout(self.config.stall_backoff, self.wakeup.notified())
                        .await;
                }
                _ => break,
            }
        }
        tracing::debug!("Dispatch loop exited: {}", self.job_state());
    }

    /// Handle a firmware acknowledgement
    ///
    /// A plain `ok` retires the oldest pending line; this is correct only
    /// because GRBL acknowledges strictly in FIFO order. An `ok:N` retires
    /// line N specifically. Acknowledgements with nothing pending belong
    /// to single commands and are ignored.
    pub fn handle_ack(&self, line: Option<u32>) {
        let outcome = {
            let mut inner = self.inner.lock();
            match inner.retire(line) {
                Some(retired) => {
                    inner.completed_lines += 1;
                    inner.current_line = retired.sequence;
                    let completed = inner.complete_if_drained();
                    Some((inner.progress(), completed))
                }
                None => None,
            }
        };

        if let Some((progress, completed)) = outcome {
            self.wakeup.notify_one();
            self.events.publish(ControllerEvent::ProgressChanged(progress));
            if completed {
                tracing::info!("Job completed");
                self.events
                    .publish(ControllerEvent::JobStateChanged(JobState::Completed));
            }
        }
    }

    /// Handle a firmware `error:` response
    ///
    /// Aborts the job and retires the oldest pending line, same as an
    /// acknowledgement, so the byte budget does not leak.
    pub fn handle_firmware_error(&self, code: u8) {
        let message = error_decoder::describe_error(code);
        tracing::error!("{}", message);

        let job_outcome = {
            let mut inner = self.inner.lock();
            inner.retire(None);
            if inner.job_state.is_active() {
                inner.job_state = JobState::Error(message.clone());
                Some((inner.job_state.clone(), inner.progress()))
            } else {
                None
            }
        };

        self.wakeup.notify_one();
        self.events
            .publish(ControllerEvent::FirmwareError { code, message });
        if let Some((state, progress)) = job_outcome {
            self.events.publish(ControllerEvent::JobStateChanged(state));
            self.events.publish(ControllerEvent::ProgressChanged(progress));
        }
    }

    /// Abort the active job (alarm, connection loss)
    ///
    /// No-op when no job is active.
    pub fn fail_job(&self, message: impl Into<String>) {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.job_state.is_active() {
                inner.job_state = JobState::Error(message.into());
                Some(inner.job_state.clone())
            } else {
                None
            }
        };

        if let Some(state) = changed {
            tracing::warn!("Job aborted: {}", state);
            self.wakeup.notify_one();
            self.events.publish(ControllerEvent::JobStateChanged(state));
        }
    }

    /// Pause streaming and issue a firmware feed hold
    pub fn pause(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            match inner.job_state {
                JobState::Sending => inner.job_state = JobState::Paused,
                JobState::Paused => return Ok(()),
                _ => {
                    return Err(ControllerError::InvalidRequest {
                        reason: "no active job to pause".to_string(),
                    }
                    .into())
                }
            }
        }

        self.transport.send_byte(RealtimeCommand::FeedHold.byte())?;
        self.events
            .publish(ControllerEvent::JobStateChanged(JobState::Paused));
        Ok(())
    }

    /// Resume streaming and issue a firmware cycle start
    ///
    /// Dispatch picks up where it left off; pending lines are not resent.
    pub fn resume(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            match inner.job_state {
                JobState::Paused => inner.job_state = JobState::Sending,
                JobState::Sending => return Ok(()),
                _ => {
                    return Err(ControllerError::InvalidRequest {
                        reason: "no paused job to resume".to_string(),
                    }
                    .into())
                }
            }
        }

        self.transport.send_byte(RealtimeCommand::CycleStart.byte())?;
        self.wakeup.notify_one();
        self.events
            .publish(ControllerEvent::JobStateChanged(JobState::Sending));
        Ok(())
    }

    /// Stop the job and soft-reset the controller
    ///
    /// Safe to call from any state, including with the dispatch loop
    /// stalled on a full buffer. The queue, pending set, and budget are
    /// cleared after a short grace delay so the soft reset can settle.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            inner.job_state = JobState::Idle;
        }
        self.wakeup.notify_one();

        if self.transport.is_connected() {
            self.transport
                .send_byte(RealtimeCommand::SoftReset.byte())
                .ok();
            tokio::time::sleep(self.config.stop_grace).await;
        }

        {
            let mut inner = self.inner.lock();
            inner.clear_job();
        }

        self.events
            .publish(ControllerEvent::JobStateChanged(JobState::Idle));
        self.events
            .publish(ControllerEvent::ProgressChanged(self.progress()));
        Ok(())
    }

    /// Drop all job state without touching the wire (connection teardown)
    pub fn halt_for_disconnect(&self) {
        {
            let mut inner = self.inner.lock();
            inner.job_state = JobState::Idle;
            inner.clear_job();
        }
        self.wakeup.notify_one();
    }

    /// Current job lifecycle state
    pub fn job_state(&self) -> JobState {
        self.inner.lock().job_state.clone()
    }

    /// Current progress view
    pub fn progress(&self) -> JobProgress {
        self.inner.lock().progress()
    }

    /// Lines waiting to be transmitted
    pub fn queued_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Lines transmitted but not yet acknowledged
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Estimated bytes in the controller's receive buffer
    pub fn bytes_in_flight(&self) -> usize {
        self.inner.lock().bytes_in_flight
    }
}
