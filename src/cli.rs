// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing available capture devices
//! - Running the pipeline headlessly and reporting its throughput

use edgecam::app;
use edgecam::backends;
use edgecam::config::Config;
use edgecam::pipeline::PipelineEvent;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// List all available capture devices
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = backends::list_devices()?;

    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Available capture devices:");
    println!();
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index, device.name);
        println!("      Path: {}", device.path);
        println!();
    }

    Ok(())
}

/// Transform timings collected from tick events
#[derive(Debug, Default)]
struct BenchStats {
    ticks: u64,
    last_fps: u32,
    total_transform_ms: f64,
    max_transform_ms: f64,
}

impl BenchStats {
    fn record(&mut self, event: &PipelineEvent) {
        if let PipelineEvent::Tick(report) = event {
            self.ticks += 1;
            self.last_fps = report.fps;
            self.total_transform_ms += report.transform_ms;
            self.max_transform_ms = self.max_transform_ms.max(report.transform_ms);
        }
    }

    fn mean_transform_ms(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.total_transform_ms / self.ticks as f64
        }
    }
}

/// Run the pipeline for `frames` ticks (0 = until Ctrl+C) and print a summary
pub fn bench(
    mut config: Config,
    frames: u64,
    raw: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if raw {
        config.processing_enabled = false;
    }

    let mut pipeline = app::assemble(&config)?;

    let stats = Rc::new(RefCell::new(BenchStats::default()));
    let sink = Rc::clone(&stats);
    pipeline.add_observer(Box::new(move |event: &PipelineEvent| {
        sink.borrow_mut().record(event);
        if json && let Ok(line) = serde_json::to_string(event) {
            println!("{}", line);
        }
    }));

    // Set up Ctrl+C handler
    let mut scheduler = app::scheduler(&config);
    let stop_flag = scheduler.stop_signal();
    ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::SeqCst);
    })?;

    let dims = pipeline.start()?;
    if !json {
        println!(
            "Running {} at {} ({})",
            pipeline.source().name(),
            dims,
            pipeline.mode_label()
        );
        if frames == 0 {
            println!("Press Ctrl+C to stop");
        }
    }

    let started = Instant::now();
    let limit = (frames > 0).then_some(frames);
    let result = pipeline.run(&mut scheduler, limit);
    let elapsed = started.elapsed();
    pipeline.shutdown();
    result?;

    if !json {
        let stats = stats.borrow();
        let secs = elapsed.as_secs_f64();
        let average_fps = if secs > 0.0 {
            stats.ticks as f64 / secs
        } else {
            0.0
        };
        println!();
        println!("Ticks:          {}", stats.ticks);
        println!("Elapsed:        {:.2}s", secs);
        println!("Average rate:   {:.1} fps", average_fps);
        println!("Last rate:      {} fps", stats.last_fps);
        println!("Transform mean: {:.2} ms", stats.mean_transform_ms());
        println!("Transform max:  {:.2} ms", stats.max_transform_ms);
    }

    Ok(())
}
