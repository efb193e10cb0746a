use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// configuration file to read
    configuration_filename: std::path::PathBuf,

    /// log debug messages
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// only log warnings and errors
    #[arg(long, default_value_t = false, conflicts_with = "verbose")]
    quiet: bool,

    /// skip the Monte Carlo landing envelope
    #[arg(long, default_value_t = false)]
    no_uncertainty: bool,
}

impl Cli {
    fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else if self.quiet {
            log::LevelFilter::Warn
        } else {
            *balloon_predictor::LOG_LEVEL
        }
    }
}

fn summary(result: &balloon_predictor::prediction::PredictionResult) -> String {
    let metrics = &result.flight_metrics;
    let mut lines = vec![
        format!(
            "burst at {:} at {:} (± {:.0} m)",
            result.burst_site.position,
            result.burst_site.time.format(&balloon_predictor::DATETIME_FORMAT),
            result.burst_site.uncertainty
        ),
        format!(
            "landing at {:} at {:} (± {:.0} m)",
            result.landing_site.position,
            result.landing_site.time.format(&balloon_predictor::DATETIME_FORMAT),
            result.landing_site.uncertainty
        ),
        format!(
            "flight of {:} covering {:.1} km over the ground",
            balloon_predictor::utilities::duration_string(
                balloon_predictor::utilities::seconds_to_duration(metrics.total_duration)
            ),
            metrics.ground_distance
        ),
        format!(
            "{:} quality ({:.0}% confidence) from the {:} method",
            result.quality_assessment.quality,
            100.0 * result.quality_assessment.prediction_confidence,
            result.method
        ),
    ];
    for warning in &result.quality_assessment.warnings {
        lines.push(format!("warning: {:}", warning));
    }
    lines.join("\n")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let arguments = Cli::parse();

    let configuration = balloon_predictor::configuration::RunConfiguration::from_file(
        &arguments.configuration_filename,
    )?;

    let log_path = configuration.log.as_ref().map(|log| log.filename.as_path());
    balloon_predictor::logging::PredictionLogger::new(arguments.log_level(), log_path)?
        .install()?;

    let mut request = configuration.prediction_request()?;
    if arguments.no_uncertainty {
        request.options.include_uncertainty = false;
    }
    log::info!(
        "predicting {:} from {:} at {:}",
        configuration.name,
        request.launch,
        request.launch_time.format(&balloon_predictor::DATETIME_FORMAT)
    );

    let orchestrator = balloon_predictor::prediction::orchestrator::PredictionOrchestrator::new(
        configuration.weather_provider(),
        std::sync::Arc::new(
            balloon_predictor::prediction::validation::RequestValidator::default(),
        ),
        std::sync::Arc::new(configuration.cache()),
    )
    .with_settings(configuration.orchestrator_settings());
    let result = orchestrator.execute(&request)?;

    println!("{:}", summary(&result));

    let output = match &configuration.output {
        Some(output) => output.filename.to_owned(),
        None => std::path::PathBuf::from(format!("{:}_prediction.json", configuration.name)),
    };
    balloon_predictor::prediction::export::write_json(&result, &output)?;
    if let Some(geojson) = &configuration.geojson {
        balloon_predictor::prediction::export::write_geojson(&result, &geojson.filename)?;
    }

    Ok(())
}
