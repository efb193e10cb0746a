/// Pipeline stage of the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPhase {
    Validation,
    Weather,
    Calculation,
    Processing,
    Complete,
    Failed,
}

impl std::fmt::Display for ProcessingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Weather => "weather",
            Self::Calculation => "calculation",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
pub const PHYSICS_VALIDATION_FAILED: &str = "PHYSICS_VALIDATION_FAILED";
pub const CANCELLED: &str = "CANCELLED";

/// Structured diagnostic payload, one shape per kind of failure.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    Unspecified,
    Validation {
        errors: Vec<crate::prediction::validation::ValidationIssue>,
    },
    Weather {
        provider: String,
    },
    Timeout {
        seconds: f64,
    },
    Simulation {
        /// code of the underlying simulation error
        cause: String,
        altitude: Option<f64>,
        elapsed: Option<f64>,
    },
    Processing {
        stage: String,
    },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrchestrationError {
    pub message: String,
    pub code: String,
    pub phase: ProcessingPhase,
    pub recoverable: bool,
    pub details: ErrorDetail,
}

impl std::fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed [{}]: {}", self.phase, self.code, self.message)
    }
}

impl std::error::Error for OrchestrationError {}

impl OrchestrationError {
    pub fn new(
        message: String,
        code: &str,
        phase: ProcessingPhase,
        details: ErrorDetail,
    ) -> Self {
        let recoverable = matches!(classify(code, phase), Some(strategy) if strategy.can_recover);
        Self {
            message,
            code: code.to_string(),
            phase,
            recoverable,
            details,
        }
    }

    pub fn validation(report: &crate::prediction::validation::ValidationReport) -> Self {
        let message = report
            .errors
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect::<Vec<String>>()
            .join("; ");
        Self::new(
            message,
            VALIDATION_FAILED,
            ProcessingPhase::Validation,
            ErrorDetail::Validation {
                errors: report.errors.clone(),
            },
        )
    }

    pub fn weather(error: &crate::weather::WeatherError, provider: &str) -> Self {
        let details = match error {
            crate::weather::WeatherError::Timeout { seconds } => ErrorDetail::Timeout {
                seconds: *seconds,
            },
            _ => ErrorDetail::Weather {
                provider: provider.to_string(),
            },
        };
        Self::new(error.to_string(), error.code(), ProcessingPhase::Weather, details)
    }

    pub fn simulation(error: &crate::simulation::SimulationError) -> Self {
        let (altitude, elapsed) = match error {
            crate::simulation::SimulationError::ConvergenceFailed {
                altitude, elapsed, ..
            } => (Some(*altitude), Some(*elapsed)),
            _ => (None, None),
        };
        let code = match error {
            crate::simulation::SimulationError::Physics {
                source: crate::physics::PhysicsError::InvalidPhysicalParameters { .. },
            } => PHYSICS_VALIDATION_FAILED,
            error if error.is_input_violation() => PHYSICS_VALIDATION_FAILED,
            error => error.code(),
        };
        Self::new(
            error.to_string(),
            code,
            ProcessingPhase::Calculation,
            ErrorDetail::Simulation {
                cause: error.code().to_string(),
                altitude,
                elapsed,
            },
        )
    }

    pub fn processing(error: &crate::prediction::results::ProcessingError) -> Self {
        Self::new(
            error.to_string(),
            error.code(),
            ProcessingPhase::Processing,
            ErrorDetail::Processing {
                stage: "aggregation".to_string(),
            },
        )
    }

    pub fn cancelled(phase: ProcessingPhase) -> Self {
        Self::new(
            format!("deadline passed during {phase}"),
            CANCELLED,
            phase,
            ErrorDetail::Unspecified,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMethod {
    /// reuse the last weather known for the launch site
    Cached,
    /// physics without the failed refinement
    Degraded,
    /// kinematic model
    Simple,
}

impl std::fmt::Display for FallbackMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cached => "cached",
            Self::Degraded => "degraded",
            Self::Simple => "simple",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecoveryStrategy {
    pub can_recover: bool,
    pub fallback_method: Option<FallbackMethod>,
    /// fraction of prediction confidence lost by recovering
    pub confidence_reduction: f64,
}

impl RecoveryStrategy {
    fn recover(fallback_method: FallbackMethod, confidence_reduction: f64) -> Option<Self> {
        Some(Self {
            can_recover: true,
            fallback_method: Some(fallback_method),
            confidence_reduction,
        })
    }

    fn terminal() -> Option<Self> {
        Some(Self {
            can_recover: false,
            fallback_method: None,
            confidence_reduction: 1.0,
        })
    }
}

/// Recovery policy for a failure with `code` during `phase`.
///
/// Cancellation has no strategy at all. Validation failures are terminal unless the request is
/// merely outside the ideal envelope.
pub fn classify(code: &str, phase: ProcessingPhase) -> Option<RecoveryStrategy> {
    if code == CANCELLED {
        return None;
    }

    match (phase, code) {
        (ProcessingPhase::Validation, "LAUNCH_TIME_TOO_FAR" | "HRRR_OUTSIDE_CONUS") => {
            RecoveryStrategy::recover(FallbackMethod::Degraded, 0.2)
        }
        (ProcessingPhase::Validation, _) => RecoveryStrategy::terminal(),

        (ProcessingPhase::Weather, "SERVICE_UNAVAILABLE" | "API_ERROR") => {
            RecoveryStrategy::recover(FallbackMethod::Cached, 0.3)
        }
        (ProcessingPhase::Weather, "POOR_QUALITY") => {
            RecoveryStrategy::recover(FallbackMethod::Degraded, 0.4)
        }
        (ProcessingPhase::Weather, "TIMEOUT" | "WEATHER_TIMEOUT") => {
            RecoveryStrategy::recover(FallbackMethod::Simple, 0.5)
        }
        (ProcessingPhase::Weather, _) => RecoveryStrategy::recover(FallbackMethod::Simple, 0.5),

        (ProcessingPhase::Calculation, "CONVERGENCE_FAILED") => {
            RecoveryStrategy::recover(FallbackMethod::Degraded, 0.3)
        }
        (ProcessingPhase::Calculation, PHYSICS_VALIDATION_FAILED) => {
            RecoveryStrategy::recover(FallbackMethod::Simple, 0.4)
        }
        (ProcessingPhase::Calculation, _) => RecoveryStrategy::recover(FallbackMethod::Simple, 0.6),

        (ProcessingPhase::Processing, "PROCESSING_FAILED") => {
            RecoveryStrategy::recover(FallbackMethod::Degraded, 0.3)
        }
        (ProcessingPhase::Processing, _) => RecoveryStrategy::recover(FallbackMethod::Simple, 0.4),

        (ProcessingPhase::Complete | ProcessingPhase::Failed, _) => {
            RecoveryStrategy::recover(FallbackMethod::Simple, 0.5)
        }
    }
}
