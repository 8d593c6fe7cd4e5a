//! Failures raised while setting up logging or producing metrics.

use std::string::FromUtf8Error;

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global log subscriber could not be installed, typically because one already is.
    #[error("{format} log subscriber could not be installed")]
    Logging {
        /// Requested output format.
        format: &'static str,
        /// Subscriber installation failure.
        #[source]
        source: TryInitError,
    },
    /// One of the binman metrics could not be created or registered.
    #[error("metric {metric} could not be set up")]
    Metric {
        /// Metric family name.
        metric: &'static str,
        /// Prometheus failure.
        #[source]
        source: prometheus::Error,
    },
    /// The registry could not be encoded in the text exposition format.
    #[error("metrics could not be rendered")]
    Render(#[from] prometheus::Error),
    /// The encoder produced bytes that are not UTF-8.
    #[error("rendered metrics are not utf-8")]
    RenderEncoding(#[from] FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn metric_errors_name_the_metric_and_keep_the_cause() {
        let err = TelemetryError::Metric {
            metric: "binman_actions_total",
            source: prometheus::Error::Msg("duplicate".to_string()),
        };
        assert_eq!(err.to_string(), "metric binman_actions_total could not be set up");
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("duplicate".to_string())
        );
    }

    #[test]
    fn render_failures_convert_from_their_causes() {
        let encode: TelemetryError = prometheus::Error::Msg("encode".to_string()).into();
        assert!(matches!(encode, TelemetryError::Render(_)));

        let bytes = String::from_utf8(vec![0, 159]).err();
        let utf8 = bytes.map(TelemetryError::from);
        assert!(matches!(utf8, Some(TelemetryError::RenderEncoding(_))));
        assert_eq!(
            utf8.map(|err| err.to_string()).as_deref(),
            Some("rendered metrics are not utf-8")
        );
    }
}
