// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based pipeline viewer
//!
//! Drives the pipeline from the terminal event loop and renders the presented
//! surface using Unicode half-block characters for improved vertical
//! resolution.

use crate::app;
use crate::config::Config;
use crate::constants::TransformMode;
use crate::frame::PixelBuffer;
use crate::pipeline::{PipelineEvent, PipelineLoop, TickReport, TickScheduler};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::cell::RefCell;
use std::io::{self, stdout};
use std::rc::Rc;
use std::time::Duration;
use tracing::{error, info};

/// Input poll interval while the pipeline is idle
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Run the terminal viewer
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // Engine and presenter failures are reported before the screen is taken over
    let mut pipeline = app::assemble(&config)?;
    let mut scheduler = app::scheduler(&config);

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut pipeline, &mut scheduler);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    pipeline.shutdown();
    result
}

/// What the status bar shows, fed by pipeline events
#[derive(Debug, Default)]
struct ViewerStatus {
    report: Option<TickReport>,
    error: Option<String>,
}

impl ViewerStatus {
    fn record(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Tick(report) => self.report = Some(report.clone()),
            PipelineEvent::Started { .. } => {
                self.error = None;
                self.report = None;
            }
            PipelineEvent::Error { message } => self.error = Some(message.clone()),
            PipelineEvent::StateChanged { .. } => {}
        }
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    pipeline: &mut PipelineLoop,
    scheduler: &mut TickScheduler,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = Rc::new(RefCell::new(ViewerStatus::default()));
    let sink = Rc::clone(&status);
    pipeline.add_observer(Box::new(move |event: &PipelineEvent| {
        sink.borrow_mut().record(event);
    }));

    let mut frame_widget = FrameWidget::new();
    let mut show_help = false;

    // Start right away; a failure leaves the pipeline idle and 's' retries
    if let Err(e) = pipeline.start() {
        error!("Failed to start pipeline: {}", e);
    }

    loop {
        if pipeline.is_running() && scheduler.try_begin_tick() {
            match pipeline.tick() {
                Ok(_) => match pipeline.presenter_mut().read_back() {
                    Ok(Some(surface)) => frame_widget.update_frame(surface),
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to read presented frame: {}", e);
                        status.borrow_mut().error = Some(e.to_string());
                    }
                },
                Err(e) => error!("Pipeline tick failed: {}", e),
            }
        }

        let message = if show_help {
            build_help_message()
        } else {
            build_status_message(pipeline, &status.borrow())
        };

        // Draw
        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let frame_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };

            f.render_widget(&frame_widget, frame_area);

            // Render status bar
            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };

            let status = StatusBar { message: &message };
            f.render_widget(status, status_area);
        })?;

        // Handle input until the next tick is due
        let timeout = if pipeline.is_running() {
            scheduler.time_until_next_tick()
        } else {
            IDLE_POLL
        };

        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            // Ctrl+C to quit
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }

            match key.code {
                // 's' to start or stop
                KeyCode::Char('s') => {
                    show_help = false;
                    if pipeline.is_running() {
                        pipeline.stop();
                        frame_widget.clear();
                    } else if let Err(e) = pipeline.start() {
                        error!("Failed to start pipeline: {}", e);
                    }
                }
                // 'e' to toggle edge processing
                KeyCode::Char('e') => {
                    show_help = false;
                    pipeline.toggle_processing();
                }
                // 'm' to cycle the transform mode
                KeyCode::Char('m') => {
                    show_help = false;
                    let next = next_mode(pipeline.mode());
                    pipeline.set_mode(next);
                }
                // 'h' to toggle help
                KeyCode::Char('h') => show_help = !show_help,
                // 'q' also quits
                KeyCode::Char('q') => break,
                _ => {}
            }
        }
    }

    info!("Terminal viewer exiting");
    Ok(())
}

fn next_mode(mode: TransformMode) -> TransformMode {
    let index = TransformMode::ALL
        .iter()
        .position(|m| *m == mode)
        .unwrap_or(0);
    TransformMode::ALL[(index + 1) % TransformMode::ALL.len()]
}

fn build_status_message(pipeline: &PipelineLoop, status: &ViewerStatus) -> String {
    let mut msg = if pipeline.is_running() {
        match &status.report {
            Some(report) => format!(
                "{} fps | {} | {} | {:.2} ms | 's' stop | 'e' edges",
                report.fps, report.mode, report.resolution, report.transform_ms
            ),
            None => format!("Starting... | {}", pipeline.mode_label()),
        }
    } else {
        "Stopped | 's' start".to_string()
    };

    if let Some(error) = &status.error {
        msg.push_str(" | Error: ");
        msg.push_str(error);
    }
    msg.push_str(" | 'h' help | 'q' quit");
    msg
}

fn build_help_message() -> String {
    String::from(
        "s: Start/stop | e: Toggle processing | m: Edge/grayscale | h: Toggle help | q/Ctrl+C: Quit",
    )
}

/// Widget that renders the presented surface using half-block characters
struct FrameWidget {
    frame: Option<PixelBuffer>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, surface: &PixelBuffer) {
        match &mut self.frame {
            Some(frame) => frame.copy_from(surface),
            None => self.frame = Some(surface.clone()),
        }
    }

    fn clear(&mut self) {
        self.frame = None;
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.as_ref().filter(|f| !f.dimensions().is_empty()) else {
            // No frame yet - show placeholder
            let msg = "Waiting for frames...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };
        if area.width == 0 || area.height == 0 {
            return;
        }

        // Calculate display dimensions maintaining aspect ratio
        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = frame.width() as f64 / frame.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64; // *2 because half-blocks

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            // Terminal is taller - fit to width
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        // Scale factors
        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height * 2) as f64;

        // Upper half (▀) colored with fg, lower half with bg
        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let top_color = sample_pixel(frame, src_x, src_y_top);
                let bottom_color = sample_pixel(frame, src_x, src_y_bottom);

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(top_color);
                    cell.set_bg(bottom_color);
                }
            }
        }
    }
}

fn sample_pixel(frame: &PixelBuffer, x: u32, y: u32) -> Color {
    let x = x.min(frame.width().saturating_sub(1));
    let y = y.min(frame.height().saturating_sub(1));
    match frame.pixel(x, y) {
        Some([r, g, b, _]) => Color::Rgb(r, g, b),
        None => Color::Black,
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        // Render text, cut at a character boundary
        let text: String = self.message.chars().take(area.width as usize).collect();

        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}
