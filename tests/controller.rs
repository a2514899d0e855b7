//! Controller-level behavior that doesn't need a GPU surface: the render
//! worker is simply never attached, so every path up to the message sends
//! is exercised for real.

use bitchart::{
    Bar, ChartConfig, ChartController, ChartError, ChartEvent, FeedBar, IndicatorKind, StoreMode,
};
use std::sync::{Arc, Mutex};

fn ramp_bars(n: usize, timeframe: f32) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f32 * 0.7).sin() * 10.0;
            Bar::new(
                i as f32 * timeframe,
                close - 1.0,
                close + 2.0,
                close - 2.0,
                close,
                5.0 + (i % 7) as f32,
            )
        })
        .collect()
}

fn capture(chart: &mut ChartController) -> Arc<Mutex<Vec<ChartEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    chart.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    log
}

#[test]
fn set_data_emits_data_and_viewport_changes() {
    let mut chart = ChartController::new(ChartConfig::default());
    let log = capture(&mut chart);
    chart.set_data(&ramp_bars(100, 60_000.0)).unwrap();

    let events = log.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, ChartEvent::DataChange { count: 100 })));
    let viewport = events
        .iter()
        .find_map(|e| match e {
            ChartEvent::ViewportChange(v) => Some(*v),
            _ => None,
        })
        .expect("no viewport event");
    // fit content: the whole data range is visible, right padding included
    assert!(viewport.time.from <= 0.0);
    assert!(viewport.time.to >= 99.0 * 60_000.0);
    assert!(viewport.price.min < viewport.price.max);
    assert!(viewport.volume.max >= 5.0);
}

#[test]
fn malformed_bars_are_dropped_not_fatal() {
    let mut chart = ChartController::new(ChartConfig::default());
    let mut bars = ramp_bars(10, 1_000.0);
    bars[3] = Bar::new(3_000.0, 10.0, 9.0, 11.0, 10.0, 1.0); // high < low
    chart.set_data(&bars).unwrap();
    assert_eq!(chart.bar_count(), 9);
}

#[test]
fn crosshair_resolves_nearest_bar_and_clears() {
    let mut chart = ChartController::new(ChartConfig::default());
    let log = capture(&mut chart);
    chart.set_data(&ramp_bars(10, 1_000.0)).unwrap();

    // pointer in the middle of the pane
    let extent = chart.time_scale().pixel_extent();
    chart.pointer_move(extent * 0.5, 100.0);
    {
        let events = log.lock().unwrap();
        let crosshair = events
            .iter()
            .rev()
            .find_map(|e| match e {
                ChartEvent::Crosshair(Some(c)) => Some(c.clone()),
                _ => None,
            })
            .expect("no crosshair event");
        let bar = crosshair.bar.expect("crosshair did not resolve a bar");
        // nearest bar to the midpoint of [0, 9000 * 1.05]
        assert!((bar.time - 5_000.0).abs() <= 1_000.0);
    }

    chart.pointer_leave();
    let events = log.lock().unwrap();
    assert!(matches!(events.last(), Some(ChartEvent::Crosshair(None))));
}

#[test]
fn wheel_zoom_narrows_and_double_click_restores() {
    let mut chart = ChartController::new(ChartConfig::default());
    chart.set_data(&ramp_bars(200, 60_000.0)).unwrap();
    let full = chart.time_scale().visible();

    chart.wheel(-1.0, chart.time_scale().pixel_extent() * 0.5);
    chart.wheel(-1.0, chart.time_scale().pixel_extent() * 0.5);
    let zoomed = chart.time_scale().visible();
    assert!(zoomed.span() < full.span());

    chart.double_click();
    let restored = chart.time_scale().visible();
    assert!((restored.span() - full.span()).abs() < 1.0);
}

#[test]
fn drag_pans_and_does_not_click() {
    let mut chart = ChartController::new(ChartConfig::default());
    let log = capture(&mut chart);
    chart.set_data(&ramp_bars(200, 60_000.0)).unwrap();

    // zoom in so there's room to pan
    for _ in 0..5 {
        chart.wheel(-1.0, chart.time_scale().pixel_extent() * 0.5);
    }
    let before = chart.time_scale().visible();
    chart.pointer_down(400.0, 300.0);
    chart.pointer_move(300.0, 300.0); // drag left 100 px
    chart.pointer_up(300.0, 300.0);
    let after = chart.time_scale().visible();
    // dragging left moves the view toward later times
    assert!(after.from > before.from);
    assert!(!log
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ChartEvent::Click { .. })));
}

#[test]
fn still_pointer_release_is_a_click() {
    let mut chart = ChartController::new(ChartConfig::default());
    let log = capture(&mut chart);
    chart.set_data(&ramp_bars(10, 1_000.0)).unwrap();
    chart.pointer_down(100.0, 100.0);
    chart.pointer_up(100.5, 100.0);
    assert!(log
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ChartEvent::Click { .. })));
}

#[test]
fn pan_is_absorbed_at_the_data_edge() {
    let mut chart = ChartController::new(ChartConfig::default());
    chart.set_data(&ramp_bars(100, 1_000.0)).unwrap();
    // fit leaves the view at the padded right edge; panning further right
    // must not move it
    let before = chart.time_scale().visible();
    chart.pointer_down(400.0, 300.0);
    chart.pointer_move(200.0, 300.0); // drag left = pan right
    chart.pointer_up(200.0, 300.0);
    let after = chart.time_scale().visible();
    assert!((after.to - before.to).abs() < 1e-6);
    assert!((after.from - before.from).abs() < 1e-6);
}

#[test]
fn indicator_round_trip_through_controller() {
    let mut chart = ChartController::new(ChartConfig::default());
    let closes = [1.0f32, 2.0, 3.0, 4.0, 5.0];
    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(i as f32, c, c + 0.5, c - 0.5, c, 1.0))
        .collect();
    chart.set_data(&bars).unwrap();
    let result = chart
        .compute_indicator(IndicatorKind::Sma { period: 3 })
        .unwrap()
        .wait()
        .unwrap();
    assert!(result[0].is_nan() && result[1].is_nan());
    assert_eq!(&result[2..], &[2.0, 3.0, 4.0]);
}

#[test]
fn feed_candles_append_then_update() {
    let mut chart = ChartController::new(ChartConfig::default());
    let epoch = 1_700_000_000_000.0;
    let bucket = |i: f64| epoch + i * 60_000.0;
    let feed_bar = |time: f64, close: f64, volume: f64| FeedBar {
        time,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume,
    };

    chart.ingest_candle(feed_bar(bucket(0.0), 100.0, 1.0), true).unwrap();
    assert_eq!(chart.bar_count(), 1);
    // same bucket: update in place
    chart.ingest_candle(feed_bar(bucket(0.0), 105.0, 2.0), true).unwrap();
    assert_eq!(chart.bar_count(), 1);
    assert_eq!(chart.snapshot()[0].close, 105.0);
    // epoch pinned on the first candle: its time is zero
    assert_eq!(chart.snapshot()[0].time, 0.0);

    // next bucket appends
    chart.ingest_candle(feed_bar(bucket(1.0), 110.0, 1.0), false).unwrap();
    assert_eq!(chart.bar_count(), 2);
    assert_eq!(chart.snapshot()[1].time, 60_000.0);

    // stale bucket is dropped, not inserted
    chart.ingest_candle(feed_bar(bucket(0.0), 1.0, 1.0), false).unwrap();
    assert_eq!(chart.bar_count(), 2);
    assert_eq!(chart.snapshot()[1].close, 110.0);
}

#[test]
fn ring_mode_keeps_most_recent_window() {
    let mut chart = ChartController::new(ChartConfig {
        store_mode: StoreMode::Ring,
        ..Default::default()
    });
    chart.set_data(&ramp_bars(10, 1_000.0)).unwrap();
    assert_eq!(chart.bar_count(), 10);
    let first = chart.snapshot()[0];
    assert_eq!(first.time, 0.0);
}

#[test]
fn destroyed_controller_rejects_calls() {
    let mut chart = ChartController::new(ChartConfig::default());
    chart.set_data(&ramp_bars(5, 1_000.0)).unwrap();
    chart.destroy();
    assert!(matches!(
        chart.set_data(&ramp_bars(5, 1_000.0)),
        Err(ChartError::Destroyed)
    ));
    assert!(matches!(
        chart.compute_indicator(IndicatorKind::Rsi { period: 14 }),
        Err(ChartError::Destroyed)
    ));
    // destroy is idempotent
    chart.destroy();
}

#[test]
fn copy_mode_controller_still_computes() {
    let mut chart = ChartController::new(ChartConfig {
        shared_memory: false,
        ..Default::default()
    });
    chart.set_data(&ramp_bars(20, 1_000.0)).unwrap();
    let result = chart
        .compute_indicator(IndicatorKind::Sma { period: 5 })
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(result.len(), 20);
    assert!(!result[19].is_nan());
}
