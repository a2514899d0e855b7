//! Realtime market-data ingest.
//!
//! One named OS thread owns the streaming connection; inside it a
//! current-thread tokio runtime drives the websocket. Disconnects trigger
//! exponential-backoff reconnection (base `reconnect_delay`, doubled per
//! attempt, capped at 30 s) until `max_reconnect_attempts` is exhausted,
//! at which point a terminal error is emitted. Parsed ticks aggregate into
//! bars and buffered ticks flush on the batch interval together with a
//! partial re-emit of the bar under construction.

pub mod aggregate;
pub mod parser;

pub use aggregate::{BarBuilder, FeedBar};
pub use parser::{DefaultParser, ExchangeTradeParser, ParsedTicks, TickParser};

use bitchart_core::Tick;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// Reconnect delay ceiling.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::Error => 4,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub url: String,
    pub symbol: String,
    pub channel: String,
    pub timeframe_ms: f64,
    pub batch_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub auto_reconnect: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.binance.com:9443/ws".into(),
            symbol: "btcusdt".into(),
            channel: "trade".into(),
            timeframe_ms: 60_000.0,
            batch_interval: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_attempts: 10,
            auto_reconnect: true,
        }
    }
}

/// Events delivered to the subscriber (the chart controller).
#[derive(Clone, Debug)]
pub enum FeedEvent {
    Connect,
    Disconnect,
    Error(String),
    Tick(Tick),
    /// A completed bar, or (with `partial = true`) the bar still building,
    /// re-emitted on every batch flush.
    Candle { bar: FeedBar, partial: bool },
    Batch(Vec<Tick>),
}

/// Relaxed counters, readable from any thread.
#[derive(Default)]
pub struct FeedStats {
    pub messages_received: AtomicU64,
    pub ticks_parsed: AtomicU64,
    pub parse_errors: AtomicU64,
    pub reconnects: AtomicU64,
}

enum FeedCommand {
    SetTimeframe(f64),
}

pub struct RealtimeFeed;

impl RealtimeFeed {
    pub fn spawn(config: FeedConfig, parser: Box<dyn TickParser>) -> FeedHandle {
        let (event_tx, event_rx) = unbounded();
        let (command_tx, command_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(AtomicU8::new(ConnectionState::Disconnected.as_u8()));
        let stats = Arc::new(FeedStats::default());
        let join = {
            let running = Arc::clone(&running);
            let state = Arc::clone(&state);
            let stats = Arc::clone(&stats);
            std::thread::Builder::new()
                .name("bitchart-ingest".into())
                .spawn(move || feed_loop(config, parser, event_tx, command_rx, running, state, stats))
                .expect("failed to spawn ingest thread")
        };
        FeedHandle {
            events: event_rx,
            commands: command_tx,
            running,
            state,
            stats,
            join: Some(join),
        }
    }
}

pub struct FeedHandle {
    events: Receiver<FeedEvent>,
    commands: Sender<FeedCommand>,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    stats: Arc<FeedStats>,
    join: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn events(&self) -> &Receiver<FeedEvent> {
        &self.events
    }

    /// Switch the aggregation timeframe; the bar under construction is
    /// discarded. Takes effect at the next batch tick.
    pub fn set_timeframe(&self, timeframe_ms: f64) {
        let _ = self.commands.send(FeedCommand::SetTimeframe(timeframe_ms));
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    /// Stop the feed and join the thread. The socket notices at the next
    /// batch tick.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct FeedContext {
    config: FeedConfig,
    parser: Box<dyn TickParser>,
    events: Sender<FeedEvent>,
    commands: Receiver<FeedCommand>,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    stats: Arc<FeedStats>,
    builder: BarBuilder,
    batch: Vec<Tick>,
}

impl FeedContext {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    fn emit(&self, event: FeedEvent) {
        let _ = self.events.send(event);
    }
}

fn feed_loop(
    config: FeedConfig,
    parser: Box<dyn TickParser>,
    events: Sender<FeedEvent>,
    commands: Receiver<FeedCommand>,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    stats: Arc<FeedStats>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(error) => {
            let _ = events.send(FeedEvent::Error(format!("runtime start failed: {error}")));
            return;
        }
    };

    let mut ctx = FeedContext {
        builder: BarBuilder::new(config.timeframe_ms),
        config,
        parser,
        events,
        commands,
        running,
        state,
        stats,
        batch: Vec::new(),
    };

    let mut delay = ctx.config.reconnect_delay;
    let mut attempts = 0u32;

    while ctx.running.load(Ordering::Relaxed) {
        ctx.set_state(if attempts == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });
        match rt.block_on(run_connection(&mut ctx)) {
            Ok(()) => {
                // orderly close; reset the backoff
                delay = ctx.config.reconnect_delay;
                attempts = 0;
                ctx.emit(FeedEvent::Disconnect);
            }
            Err(error) => {
                log::warn!("feed connection error: {error}");
                ctx.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                ctx.emit(FeedEvent::Disconnect);
                attempts += 1;
            }
        }
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }
        if !ctx.config.auto_reconnect {
            ctx.set_state(ConnectionState::Disconnected);
            return;
        }
        if attempts > ctx.config.max_reconnect_attempts {
            ctx.set_state(ConnectionState::Error);
            ctx.emit(FeedEvent::Error(format!(
                "gave up after {} reconnect attempts",
                ctx.config.max_reconnect_attempts
            )));
            return;
        }
        log::info!("reconnecting in {:?} (attempt {attempts})", delay);
        std::thread::sleep(delay);
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }
    ctx.set_state(ConnectionState::Disconnected);
}

async fn run_connection(ctx: &mut FeedContext) -> Result<(), String> {
    let (stream, _) = tokio_tungstenite::connect_async(ctx.config.url.as_str())
        .await
        .map_err(|e| format!("connect failed: {e}"))?;
    let (mut write, mut read) = stream.split();

    let subscribe = serde_json::json!({
        "type": "subscribe",
        "symbol": ctx.config.symbol,
        "channel": ctx.config.channel,
    });
    write
        .send(Message::Text(subscribe.to_string().into()))
        .await
        .map_err(|e| format!("subscribe failed: {e}"))?;

    ctx.set_state(ConnectionState::Connected);
    ctx.emit(FeedEvent::Connect);
    log::info!(
        "feed connected: {} {}@{}",
        ctx.config.url,
        ctx.config.symbol,
        ctx.config.channel
    );

    let mut flush = tokio::time::interval(ctx.config.batch_interval);
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    ctx.stats.messages_received.fetch_add(1, Ordering::Relaxed);
                    handle_payload(ctx, text.as_str());
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(format!("socket error: {error}")),
            },
            _ = flush.tick() => {
                if !ctx.running.load(Ordering::Relaxed) {
                    let unsubscribe = serde_json::json!({
                        "type": "unsubscribe",
                        "symbol": ctx.config.symbol,
                        "channel": ctx.config.channel,
                    });
                    let _ = write.send(Message::Text(unsubscribe.to_string().into())).await;
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                while let Ok(command) = ctx.commands.try_recv() {
                    match command {
                        FeedCommand::SetTimeframe(timeframe_ms) => {
                            ctx.builder.set_timeframe(timeframe_ms);
                        }
                    }
                }
                flush_batch(ctx);
            }
        }
    }
}

fn handle_payload(ctx: &mut FeedContext, raw: &str) {
    let Some(parsed) = ctx.parser.parse(raw) else {
        // malformed ticks never kill the stream
        ctx.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
        log::warn!("dropping malformed feed payload ({} bytes)", raw.len());
        return;
    };
    for tick in parsed.into_vec() {
        ctx.stats.ticks_parsed.fetch_add(1, Ordering::Relaxed);
        if let Some(completed) = ctx.builder.push(&tick) {
            ctx.emit(FeedEvent::Candle {
                bar: completed,
                partial: false,
            });
        }
        ctx.emit(FeedEvent::Tick(tick));
        ctx.batch.push(tick);
    }
}

fn flush_batch(ctx: &mut FeedContext) {
    if !ctx.batch.is_empty() {
        let ticks = std::mem::take(&mut ctx.batch);
        ctx.emit(FeedEvent::Batch(ticks));
        if let Some(current) = ctx.builder.current() {
            ctx.emit(FeedEvent::Candle {
                bar: *current,
                partial: true,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Error,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn subscribe_envelope_shape() {
        let value = serde_json::json!({
            "type": "subscribe",
            "symbol": "btcusdt",
            "channel": "trade",
        });
        let text = value.to_string();
        assert!(text.contains("\"type\":\"subscribe\""));
        assert!(text.contains("\"symbol\":\"btcusdt\""));
    }
}
