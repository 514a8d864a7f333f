use hcc_raf::config::ScoringConfig;
use hcc_raf::error::AppError;
use hcc_raf::RafCalculator;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Loads reference tables from the configured directory, falling back to the bundled sample.
pub(crate) fn build_calculator(config: &ScoringConfig) -> Result<RafCalculator, AppError> {
    let calculator = match &config.data_dir {
        Some(dir) => {
            info!(data_dir = %dir.display(), "loading reference tables");
            RafCalculator::from_dir(dir)?
        }
        None => {
            info!("loading bundled reference tables");
            RafCalculator::bundled()?
        }
    };

    let calculator = calculator
        .with_default_model(config.default_model)
        .with_claim_filtering(config.filter_claims);

    info!(
        models = calculator.registry().models().len(),
        default_model = %config.default_model,
        filter_claims = config.filter_claims,
        "risk adjustment models loaded"
    );
    Ok(calculator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcc_raf::model::LoadError;
    use hcc_raf::ModelName;
    use std::path::PathBuf;

    #[test]
    fn applies_scoring_defaults() {
        let config = ScoringConfig {
            data_dir: None,
            default_model: ModelName::EsrdV24,
            filter_claims: false,
        };
        let calculator = build_calculator(&config).expect("bundled tables load");
        assert_eq!(calculator.default_model(), ModelName::EsrdV24);
        assert!(!calculator.filters_claims_by_default());
    }

    #[test]
    fn missing_data_dir_is_a_reference_error() {
        let config = ScoringConfig {
            data_dir: Some(PathBuf::from("/nonexistent/hcc-tables")),
            ..ScoringConfig::default()
        };
        assert!(matches!(
            build_calculator(&config),
            Err(AppError::Reference(LoadError::Io { .. }))
        ));
    }
}
