//! Entry point for the stereo rig demo viewer.

use anyhow::Result;
use clap::Parser;
use glam::Vec3;
use rig_viewer::{app::App, Args};
use std::sync::Arc;
use winit::{
    event::{ElementState, Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // Create the event loop and the mirror window. Half the DK2 panel per
    // eye, side by side.
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Stereo Rig Viewer")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 800))
            .build(&event_loop)?,
    );

    // Initialise the application (async → sync).
    let mut app = pollster::block_on(App::new(window.clone(), &args))?;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(physical_size) => app.resize(physical_size),
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state != ElementState::Pressed {
                        return;
                    }
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => elwt.exit(),
                        PhysicalKey::Code(KeyCode::KeyE) => app.toggle_eye_per_frame(),
                        PhysicalKey::Code(KeyCode::KeyP) => app.toggle_distortion(),
                        PhysicalKey::Code(KeyCode::BracketLeft) => app.adjust_render_scale(-0.1),
                        PhysicalKey::Code(KeyCode::BracketRight) => app.adjust_render_scale(0.1),
                        PhysicalKey::Code(KeyCode::KeyW) => {
                            app.move_player(Vec3::new(0.0, 0.0, -0.1))
                        }
                        PhysicalKey::Code(KeyCode::KeyS) => {
                            app.move_player(Vec3::new(0.0, 0.0, 0.1))
                        }
                        PhysicalKey::Code(KeyCode::KeyA) => {
                            app.move_player(Vec3::new(-0.1, 0.0, 0.0))
                        }
                        PhysicalKey::Code(KeyCode::KeyD) => {
                            app.move_player(Vec3::new(0.1, 0.0, 0.0))
                        }
                        _ => {}
                    }
                }
                WindowEvent::RedrawRequested => app.render_frame(),
                _ => {}
            },
            Event::AboutToWait => {
                // Request a redraw each frame; the swap chain paces us.
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}
