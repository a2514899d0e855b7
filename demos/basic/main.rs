#![allow(deprecated)] // winit 0.30 closure-style event loop

use bitchart::{Bar, ChartConfig, ChartController, ChartEvent};
use std::sync::Arc;

const BAR_COUNT: usize = 50_000;
const TIMEFRAME_MS: f32 = 60_000.0;

/// Deterministic random walk; good enough for a demo data set.
struct Walk {
    state: u64,
}

impl Walk {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_f32(&mut self) -> f32 {
        // xorshift64*
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        let bits = self.state.wrapping_mul(0x2545_F491_4F6C_DD1D);
        (bits >> 40) as f32 / (1u32 << 24) as f32
    }
}

fn synthetic_bars(count: usize) -> Vec<Bar> {
    let mut walk = Walk::new(0x5EED);
    let mut price = 100.0f32;
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let open = price;
        let drift = (walk.next_f32() - 0.5) * 2.0;
        let close = (open + drift).max(1.0);
        let high = open.max(close) + walk.next_f32() * 0.8;
        let low = (open.min(close) - walk.next_f32() * 0.8).max(0.5);
        let volume = 10.0 + walk.next_f32() * 90.0;
        bars.push(Bar::new(
            i as f32 * TIMEFRAME_MS,
            open,
            high,
            low,
            close,
            volume,
        ));
        price = close;
    }
    bars
}

fn main() {
    env_logger::init();

    let event_loop = winit::event_loop::EventLoop::new().unwrap();
    let window_attributes = winit::window::Window::default_attributes()
        .with_title("bitchart-basic")
        .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));
    let window = Arc::new(event_loop.create_window(window_attributes).unwrap());

    let size = window.inner_size();
    let dpr = window.scale_factor() as f32;
    let mut chart = ChartController::new(ChartConfig {
        width: size.width,
        height: size.height,
        dpr,
        ..Default::default()
    });
    chart.subscribe(|event| match event {
        ChartEvent::Ready {
            backend,
            device_name,
        } => println!("chart ready on {device_name} ({backend})"),
        ChartEvent::Error { message } => eprintln!("chart error: {message}"),
        _ => {}
    });
    chart.init(window.clone()).expect("surface init failed");
    chart
        .set_data(&synthetic_bars(BAR_COUNT))
        .expect("data load failed");
    println!("loaded {BAR_COUNT} synthetic bars; drag to pan, wheel to zoom");

    let mut cursor = (0.0f64, 0.0f64);
    event_loop
        .run(|event, target| {
            target.set_control_flow(winit::event_loop::ControlFlow::Poll);
            match event {
                winit::event::Event::AboutToWait => {
                    chart.pump();
                    window.request_redraw();
                }
                winit::event::Event::WindowEvent { event, .. } => match event {
                    winit::event::WindowEvent::Resized(size) => {
                        let dpr = window.scale_factor() as f32;
                        let _ = chart.resize(size.width, size.height, dpr);
                    }
                    winit::event::WindowEvent::CursorMoved { position, .. } => {
                        let dpr = window.scale_factor();
                        cursor = (position.x / dpr, position.y / dpr);
                        chart.pointer_move(cursor.0, cursor.1);
                    }
                    winit::event::WindowEvent::CursorLeft { .. } => chart.pointer_leave(),
                    winit::event::WindowEvent::MouseInput { state, button, .. } => {
                        if button == winit::event::MouseButton::Left {
                            match state {
                                winit::event::ElementState::Pressed => {
                                    chart.pointer_down(cursor.0, cursor.1)
                                }
                                winit::event::ElementState::Released => {
                                    chart.pointer_up(cursor.0, cursor.1)
                                }
                            }
                        }
                    }
                    winit::event::WindowEvent::MouseWheel { delta, .. } => {
                        let dy = match delta {
                            winit::event::MouseScrollDelta::LineDelta(_, y) => -y as f64,
                            winit::event::MouseScrollDelta::PixelDelta(p) => -p.y,
                        };
                        chart.wheel(dy, cursor.0);
                    }
                    winit::event::WindowEvent::KeyboardInput {
                        event:
                            winit::event::KeyEvent {
                                physical_key: winit::keyboard::PhysicalKey::Code(key_code),
                                state: winit::event::ElementState::Pressed,
                                ..
                            },
                        ..
                    } => match key_code {
                        winit::keyboard::KeyCode::Escape => target.exit(),
                        winit::keyboard::KeyCode::Space => chart.double_click(),
                        _ => {}
                    },
                    winit::event::WindowEvent::CloseRequested => target.exit(),
                    _ => {}
                },
                _ => {}
            }
        })
        .unwrap();

    chart.destroy();
}
