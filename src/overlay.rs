//! The UI-thread overlay: grid, axis labels, crosshair and tooltip.
//!
//! The painter is stateless; every call renders a complete layer from a
//! `(time scale, price scale, theme, crosshair)` snapshot onto an
//! [`OverlaySurface`]. The surface seam is the platform boundary: a
//! 2D canvas in a host shell, a recording surface in tests.

use crate::events::Crosshair;
use crate::scale::{PriceScale, TimeScale};
use bitchart_core::Theme;
use chrono::{DateTime, Utc};

const FONT_SIZE: f32 = 11.0;
const PRICE_TICK_TARGET: usize = 8;
const TIME_TICK_TARGET: usize = 8;
const LABEL_PAD: f32 = 4.0;
const TOOLTIP_LINE_HEIGHT: f32 = 16.0;
const TOOLTIP_WIDTH: f32 = 148.0;

/// Minimal 2D painting surface, in physical pixels.
pub trait OverlaySurface {
    fn clear(&mut self);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: [f32; 4]);
    fn stroke_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: [f32; 4]);
    fn fill_text(&mut self, text: &str, x: f32, y: f32, size: f32, color: [f32; 4]);
    /// Approximate advance width; implementations with real text metrics
    /// should override.
    fn text_width(&self, text: &str, size: f32) -> f32 {
        text.len() as f32 * size * 0.6
    }
}

pub struct OverlayRenderer {
    /// Device pixel ratio applied to font sizes and paddings.
    pub dpr: f32,
    /// Epoch the bar timestamps are relative to, for absolute labels.
    pub epoch_ms: f64,
}

impl OverlayRenderer {
    pub fn new(dpr: f32) -> Self {
        Self {
            dpr: dpr.max(0.5),
            epoch_ms: 0.0,
        }
    }

    pub fn paint(
        &self,
        surface: &mut dyn OverlaySurface,
        time_scale: &TimeScale,
        price_scale: &PriceScale,
        theme: &Theme,
        crosshair: Option<&Crosshair>,
    ) {
        surface.clear();
        self.paint_grid(surface, time_scale, price_scale, theme);
        self.paint_price_labels(surface, time_scale, price_scale, theme);
        self.paint_time_labels(surface, time_scale, price_scale, theme);
        if let Some(crosshair) = crosshair {
            self.paint_crosshair(surface, time_scale, price_scale, theme, crosshair);
            if crosshair.bar.is_some() {
                self.paint_tooltip(surface, time_scale, theme, crosshair);
            }
        }
    }

    fn px(&self, logical: f32) -> f32 {
        logical * self.dpr
    }

    fn paint_grid(
        &self,
        surface: &mut dyn OverlaySurface,
        time_scale: &TimeScale,
        price_scale: &PriceScale,
        theme: &Theme,
    ) {
        let width = time_scale.pixel_extent() as f32;
        let height = price_scale.pixel_extent() as f32;
        for t in time_scale.grid_ticks(TIME_TICK_TARGET) {
            let x = time_scale.data_to_pixel(t) as f32;
            surface.stroke_line(x, 0.0, x, height, 1.0, theme.grid);
        }
        for p in price_scale.grid_ticks(PRICE_TICK_TARGET) {
            let y = price_scale.data_to_pixel(p) as f32;
            surface.stroke_line(0.0, y, width, y, 1.0, theme.grid);
        }
    }

    fn paint_price_labels(
        &self,
        surface: &mut dyn OverlaySurface,
        time_scale: &TimeScale,
        price_scale: &PriceScale,
        theme: &Theme,
    ) {
        let width = time_scale.pixel_extent() as f32;
        let size = self.px(FONT_SIZE);
        let decimals = price_decimals(price_scale.tick_step(PRICE_TICK_TARGET));
        for p in price_scale.grid_ticks(PRICE_TICK_TARGET) {
            let y = price_scale.data_to_pixel(p) as f32;
            let label = format!("{p:.decimals$}");
            let x = width - surface.text_width(&label, size) - self.px(LABEL_PAD);
            surface.fill_text(&label, x, y - self.px(2.0), size, theme.text);
        }
    }

    fn paint_time_labels(
        &self,
        surface: &mut dyn OverlaySurface,
        time_scale: &TimeScale,
        price_scale: &PriceScale,
        theme: &Theme,
    ) {
        let height = price_scale.pixel_extent() as f32;
        let size = self.px(FONT_SIZE);
        let step = time_scale.tick_step(TIME_TICK_TARGET);
        for t in time_scale.grid_ticks(TIME_TICK_TARGET) {
            let x = time_scale.data_to_pixel(t) as f32;
            let label = format_time(self.epoch_ms + t, step);
            let x = x - surface.text_width(&label, size) * 0.5;
            surface.fill_text(&label, x, height - self.px(LABEL_PAD), size, theme.text);
        }
    }

    fn paint_crosshair(
        &self,
        surface: &mut dyn OverlaySurface,
        time_scale: &TimeScale,
        price_scale: &PriceScale,
        theme: &Theme,
        crosshair: &Crosshair,
    ) {
        let width = time_scale.pixel_extent() as f32;
        let height = price_scale.pixel_extent() as f32;
        let x = crosshair.x as f32;
        let y = crosshair.y as f32;
        surface.stroke_line(x, 0.0, x, height, 1.0, theme.crosshair);
        surface.stroke_line(0.0, y, width, y, 1.0, theme.crosshair);

        // axis badges at the crosshair position
        let size = self.px(FONT_SIZE);
        let decimals = price_decimals(price_scale.tick_step(PRICE_TICK_TARGET));
        let price_label = format!("{:.decimals$}", crosshair.price);
        let label_w = surface.text_width(&price_label, size);
        let label_x = width - label_w - self.px(LABEL_PAD);
        surface.fill_rect(
            label_x - self.px(2.0),
            y - size,
            label_w + self.px(4.0),
            size + self.px(4.0),
            theme.tooltip_background,
        );
        surface.fill_text(&price_label, label_x, y, size, theme.text);
    }

    fn paint_tooltip(
        &self,
        surface: &mut dyn OverlaySurface,
        time_scale: &TimeScale,
        theme: &Theme,
        crosshair: &Crosshair,
    ) {
        let Some(bar) = &crosshair.bar else { return };
        let width = time_scale.pixel_extent() as f32;
        let card_w = self.px(TOOLTIP_WIDTH);
        let line_h = self.px(TOOLTIP_LINE_HEIGHT);
        let card_h = line_h * 6.0 + self.px(8.0);
        // keep the card inside the pane, flipping sides near the right edge
        let mut x = crosshair.x as f32 + self.px(12.0);
        if x + card_w > width {
            x = crosshair.x as f32 - card_w - self.px(12.0);
        }
        let y = self.px(12.0);
        surface.fill_rect(x, y, card_w, card_h, theme.tooltip_background);

        let size = self.px(FONT_SIZE);
        let pad = self.px(6.0);
        let lines = [
            format_time(self.epoch_ms + bar.time as f64, 1_000.0),
            format!("O {:.4}", bar.open),
            format!("H {:.4}", bar.high),
            format!("L {:.4}", bar.low),
            format!("C {:.4}", bar.close),
            format!("V {:.2}", bar.volume),
        ];
        for (i, line) in lines.iter().enumerate() {
            surface.fill_text(line, x + pad, y + line_h * (i as f32 + 1.0), size, theme.text);
        }
    }
}

/// Decimal places needed to tell adjacent ticks of `step` apart.
fn price_decimals(step: f64) -> usize {
    if step >= 1.0 {
        if step.fract().abs() < 1e-9 {
            0
        } else {
            2
        }
    } else {
        (-step.log10().floor() as isize).clamp(1, 8) as usize
    }
}

/// Absolute time label, granularity chosen by the tick step.
fn format_time(ms: f64, step: f64) -> String {
    let Some(dt) = DateTime::<Utc>::from_timestamp_millis(ms as i64) else {
        return String::new();
    };
    if step < 60_000.0 {
        dt.format("%H:%M:%S").to_string()
    } else if step < 86_400_000.0 {
        dt.format("%H:%M").to_string()
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}
