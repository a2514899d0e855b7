//! The compute worker thread and its message protocol.
//!
//! One OS thread, one crossbeam inbox, one request processed to completion
//! at a time. Each request carries a caller-generated id; the response
//! echoes it. Replies travel over a per-request channel that doubles as the
//! caller's promise ([`Pending`]), with a 30 s default timeout.

use crate::decimate::decimate_m4;
use crate::indicators::IndicatorKind;
use bitchart_core::{Bar, StoreHandle};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default per-request timeout enforced by [`Pending::wait`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ComputeError {
    #[error("invalid compute request: {0}")]
    BadRequest(String),
    #[error("no shared data mapping for offset {0}")]
    MissingHandle(usize),
    #[error("compute worker destroyed")]
    Destroyed,
    #[error("compute request {0} timed out")]
    Timeout(u64),
}

/// Operations the worker understands.
pub enum ComputeOp {
    /// Indicator over bars `[offset, offset + count)` of the current data
    /// source. Output is dense, NaN-prefixed, `lanes * count` floats.
    Indicator {
        kind: IndicatorKind,
        offset: usize,
        count: usize,
    },
    /// M4 decimation of bars `[offset, offset + count)` down to at most
    /// `target_count` output bars.
    Decimate {
        offset: usize,
        count: usize,
        target_count: usize,
    },
    /// Install (or clear) the shared mapping the worker reads from.
    SetHandle(Option<StoreHandle>),
    /// Copy-mode data: an owned snapshot replacing the shared mapping.
    SetBars(Vec<Bar>),
    Shutdown,
}

pub struct ComputeRequest {
    pub id: u64,
    pub op: ComputeOp,
    reply: Option<Sender<ComputeResponse>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ComputeReply {
    Indicator(Vec<f64>),
    Decimated(Vec<Bar>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComputeResponse {
    pub id: u64,
    pub result: Result<ComputeReply, ComputeError>,
}

/// A reply that has not arrived yet. Dropping it abandons the request.
pub struct Pending<T> {
    id: u64,
    rx: Receiver<ComputeResponse>,
    timeout: Duration,
    extract: fn(ComputeReply) -> Option<T>,
}

impl<T> Pending<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the response arrives, the default timeout expires, or
    /// the worker goes away (which rejects with [`ComputeError::Destroyed`]).
    pub fn wait(self) -> Result<T, ComputeError> {
        let timeout = self.timeout;
        self.wait_timeout(timeout)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<T, ComputeError> {
        match self.rx.recv_timeout(timeout) {
            Ok(response) => {
                let reply = response.result?;
                (self.extract)(reply).ok_or_else(|| {
                    ComputeError::BadRequest("reply kind does not match request".into())
                })
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(ComputeError::Timeout(self.id))
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(ComputeError::Destroyed),
        }
    }

    /// Non-blocking poll; `None` while the worker is still busy.
    pub fn try_take(&self) -> Option<Result<T, ComputeError>> {
        match self.rx.try_recv() {
            Ok(response) => Some(response.result.and_then(|reply| {
                (self.extract)(reply).ok_or_else(|| {
                    ComputeError::BadRequest("reply kind does not match request".into())
                })
            })),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Some(Err(ComputeError::Destroyed))
            }
        }
    }
}

/// Spawns and owns the worker thread.
pub struct ComputeWorker;

impl ComputeWorker {
    pub fn spawn(handle: Option<StoreHandle>) -> ComputeHandle {
        let (tx, rx) = unbounded::<ComputeRequest>();
        let join = std::thread::Builder::new()
            .name("bitchart-compute".into())
            .spawn(move || run(rx, handle))
            .expect("failed to spawn compute worker thread");
        ComputeHandle {
            tx,
            join: Some(join),
            next_id: 1,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// The caller's side of the worker channel. Owned by the chart controller;
/// dropping it shuts the worker down and rejects anything still pending.
pub struct ComputeHandle {
    tx: Sender<ComputeRequest>,
    join: Option<JoinHandle<()>>,
    next_id: u64,
    timeout: Duration,
}

impl ComputeHandle {
    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn compute_indicator(
        &mut self,
        kind: IndicatorKind,
        offset: usize,
        count: usize,
    ) -> Pending<Vec<f64>> {
        self.request(ComputeOp::Indicator {
            kind,
            offset,
            count,
        })
    }

    pub fn decimate(
        &mut self,
        offset: usize,
        count: usize,
        target_count: usize,
    ) -> Pending<Vec<Bar>> {
        self.request(ComputeOp::Decimate {
            offset,
            count,
            target_count,
        })
    }

    /// Install a (re-)transferred shared mapping.
    pub fn set_handle(&mut self, handle: Option<StoreHandle>) {
        self.send_oneway(ComputeOp::SetHandle(handle));
    }

    /// Copy-mode path: ship an owned snapshot.
    pub fn set_bars(&mut self, bars: Vec<Bar>) {
        self.send_oneway(ComputeOp::SetBars(bars));
    }

    fn request<T>(&mut self, op: ComputeOp) -> Pending<T>
    where
        ComputeReply: Extract<T>,
    {
        let id = self.next_id;
        self.next_id += 1;
        let (reply_tx, reply_rx) = bounded(1);
        // A send failure means the worker is gone; the disconnected reply
        // channel then surfaces Destroyed from wait().
        let _ = self.tx.send(ComputeRequest {
            id,
            op,
            reply: Some(reply_tx),
        });
        Pending {
            id,
            rx: reply_rx,
            timeout: self.timeout,
            extract: <ComputeReply as Extract<T>>::extract,
        }
    }

    fn send_oneway(&mut self, op: ComputeOp) {
        let id = self.next_id;
        self.next_id += 1;
        let _ = self.tx.send(ComputeRequest {
            id,
            op,
            reply: None,
        });
    }

    pub fn shutdown(&mut self) {
        let _ = self.tx.send(ComputeRequest {
            id: 0,
            op: ComputeOp::Shutdown,
            reply: None,
        });
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ComputeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// Typed extraction from the reply union; keeps Pending<T> honest about
// which variant its request produces.
trait Extract<T> {
    fn extract(self) -> Option<T>;
}

impl Extract<Vec<f64>> for ComputeReply {
    fn extract(self) -> Option<Vec<f64>> {
        match self {
            ComputeReply::Indicator(values) => Some(values),
            _ => None,
        }
    }
}

impl Extract<Vec<Bar>> for ComputeReply {
    fn extract(self) -> Option<Vec<Bar>> {
        match self {
            ComputeReply::Decimated(bars) => Some(bars),
            _ => None,
        }
    }
}

//=============================================================================
// Worker loop
//=============================================================================

struct WorkerState {
    handle: Option<StoreHandle>,
    copy_bars: Option<Vec<Bar>>,
}

impl WorkerState {
    /// Fetch bars `[offset, offset + count)` from whichever source is
    /// installed, clamped to what is published.
    fn fetch(&self, offset: usize, count: usize) -> Result<Vec<Bar>, ComputeError> {
        if let Some(handle) = &self.handle {
            return Ok(handle.read_bars(offset, count));
        }
        if let Some(bars) = &self.copy_bars {
            if offset >= bars.len() {
                return Ok(Vec::new());
            }
            let end = (offset + count).min(bars.len());
            return Ok(bars[offset..end].to_vec());
        }
        if offset > 0 {
            return Err(ComputeError::MissingHandle(offset));
        }
        Err(ComputeError::BadRequest("no data source installed".into()))
    }
}

fn run(rx: Receiver<ComputeRequest>, handle: Option<StoreHandle>) {
    let mut state = WorkerState {
        handle,
        copy_bars: None,
    };
    log::debug!("compute worker up");
    while let Ok(request) = rx.recv() {
        let ComputeRequest { id, op, reply } = request;
        match op {
            ComputeOp::Shutdown => break,
            ComputeOp::SetHandle(new_handle) => {
                state.handle = new_handle;
                state.copy_bars = None;
            }
            ComputeOp::SetBars(bars) => {
                state.copy_bars = Some(bars);
                state.handle = None;
            }
            ComputeOp::Indicator {
                kind,
                offset,
                count,
            } => {
                let result = compute_indicator(&state, kind, offset, count);
                respond(reply, id, result.map(ComputeReply::Indicator));
            }
            ComputeOp::Decimate {
                offset,
                count,
                target_count,
            } => {
                let result = state
                    .fetch(offset, count)
                    .map(|bars| ComputeReply::Decimated(decimate_m4(&bars, target_count)));
                respond(reply, id, result);
            }
        }
    }
    log::debug!("compute worker down");
}

fn compute_indicator(
    state: &WorkerState,
    kind: IndicatorKind,
    offset: usize,
    count: usize,
) -> Result<Vec<f64>, ComputeError> {
    kind.validate().map_err(ComputeError::BadRequest)?;
    let bars = state.fetch(offset, count)?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close as f64).collect();
    Ok(kind.compute(&closes))
}

fn respond(
    reply: Option<Sender<ComputeResponse>>,
    id: u64,
    result: Result<ComputeReply, ComputeError>,
) {
    if let Err(ref error) = result {
        log::warn!("compute request {id} failed: {error}");
    }
    if let Some(reply) = reply {
        // Receiver may have been dropped (abandoned request); fine.
        let _ = reply.send(ComputeResponse { id, result });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitchart_core::{SharedStore, StoreMode};

    fn ramp_store(n: usize) -> SharedStore {
        let mut store = SharedStore::with_capacity(StoreMode::Growable, n.next_power_of_two());
        let bars: Vec<Bar> = (0..n)
            .map(|i| {
                let c = 1.0 + i as f32;
                Bar::new(i as f32, c, c + 1.0, c - 1.0, c, 1.0)
            })
            .collect();
        store.set_all(&bars);
        store
    }

    #[test]
    fn indicator_request_round_trip() {
        let store = ramp_store(5);
        let mut handle = ComputeWorker::spawn(store.shared_handle());
        let pending = handle.compute_indicator(IndicatorKind::Sma { period: 3 }, 0, 5);
        let out = pending.wait().unwrap();
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(&out[2..], &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn decimate_request_round_trip() {
        let store = ramp_store(6);
        let mut handle = ComputeWorker::spawn(store.shared_handle());
        let out = handle.decimate(0, 6, 2).wait().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].volume, 3.0);
    }

    #[test]
    fn bad_params_reject_with_id() {
        let store = ramp_store(4);
        let mut handle = ComputeWorker::spawn(store.shared_handle());
        let pending = handle.compute_indicator(IndicatorKind::Sma { period: 0 }, 0, 4);
        let id = pending.id();
        assert!(id > 0);
        match pending.wait() {
            Err(ComputeError::BadRequest(_)) => {}
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn missing_handle_with_offset_errors() {
        let mut handle = ComputeWorker::spawn(None);
        let pending = handle.compute_indicator(IndicatorKind::Sma { period: 2 }, 3, 4);
        match pending.wait() {
            Err(ComputeError::MissingHandle(3)) => {}
            other => panic!("expected MissingHandle, got {other:?}"),
        }
    }

    #[test]
    fn copy_mode_set_bars_feeds_requests() {
        let mut handle = ComputeWorker::spawn(None);
        let bars: Vec<Bar> = (0..4)
            .map(|i| Bar::new(i as f32, 2.0, 3.0, 1.0, 2.0, 1.0))
            .collect();
        handle.set_bars(bars);
        let out = handle
            .compute_indicator(IndicatorKind::Sma { period: 2 }, 0, 4)
            .wait()
            .unwrap();
        assert_eq!(&out[1..], &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn destroyed_worker_rejects_pending() {
        let store = ramp_store(4);
        let mut handle = ComputeWorker::spawn(store.shared_handle());
        let pending = handle.compute_indicator(IndicatorKind::Sma { period: 2 }, 0, 4);
        handle.shutdown();
        // The worker may have answered before the shutdown landed; both a
        // served reply and a Destroyed rejection honor the contract.
        match pending.wait_timeout(Duration::from_millis(200)) {
            Ok(_) | Err(ComputeError::Destroyed) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
