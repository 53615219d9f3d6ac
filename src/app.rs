// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline assembly from configuration

use crate::backends::create_source;
use crate::config::Config;
use crate::errors::AppResult;
use crate::pipeline::{PipelineLoop, TickScheduler};
use crate::presenter::create_presenter;
use crate::transform::FrameTransform;
use tracing::info;

/// Build a pipeline for `config`.
///
/// Loads the transform engine (bounded by the configured timeout) and
/// constructs the presenter; either failure is returned before any capture
/// device is touched.
pub fn assemble(config: &Config) -> AppResult<PipelineLoop> {
    config.validate()?;

    let mut transform = FrameTransform::cpu()
        .with_timeout(config.engine_timeout())
        .with_thresholds(config.thresholds());
    transform.initialize()?;

    let presenter = create_presenter(config.presenter)?;
    let source = create_source(config);

    info!(
        source = source.name(),
        presenter = presenter.name(),
        mode = config.processing_mode.display_name(),
        "Pipeline assembled"
    );

    Ok(PipelineLoop::new(source, transform, presenter)
        .with_constraints(config.capture_constraints())
        .with_processing(config.processing_enabled)
        .with_mode(config.processing_mode))
}

/// Scheduler paced at the configured refresh rate
pub fn scheduler(config: &Config) -> TickScheduler {
    TickScheduler::new(config.refresh_hz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use crate::errors::AppError;
    use crate::pipeline::PipelineState;
    use crate::presenter::PresenterKind;

    fn synthetic_config() -> Config {
        Config {
            source: SourceKind::Synthetic,
            presenter: PresenterKind::Software,
            preferred_width: 80,
            preferred_height: 60,
            ..Default::default()
        }
    }

    #[test]
    fn test_assemble_synthetic_pipeline() {
        let mut pipeline = assemble(&synthetic_config()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline.transform().is_ready());
        assert_eq!(pipeline.presenter().name(), "software");

        pipeline.start().unwrap();
        let report = pipeline.tick().unwrap();
        assert_eq!(report.resolution, "80x60");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            low_threshold: 200,
            high_threshold: 100,
            ..synthetic_config()
        };
        assert!(matches!(assemble(&config), Err(AppError::Config(_))));
    }

    #[test]
    fn test_processing_flag_from_config() {
        let config = Config {
            processing_enabled: false,
            ..synthetic_config()
        };
        let pipeline = assemble(&config).unwrap();
        assert_eq!(pipeline.mode_label(), "Raw Feed");
    }
}
