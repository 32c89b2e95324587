//! Under-replicated ranges metric extraction.
//!
//! Parses the lines `grep` leaves behind from a `_status/vars` scrape,
//! e.g. `ranges_underreplicated{store="1"} 0`. Parsing and convergence
//! are separate questions: a sample that parses fine may still report
//! ranges waiting to re-replicate.

use std::num::ParseFloatError;

use thiserror::Error;

/// One parsed scrape line.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Value of the `store` label.
    pub store_label: String,
    pub value: f64,
    pub raw: String,
}

impl MetricSample {
    /// Whether this store reports no under-replicated ranges.
    pub fn is_converged(&self) -> bool {
        self.value <= 0.0
    }
}

/// Why a scrape could not be read as a metric value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("non existing ranges_underreplicated metric for replica {replica}")]
    EmptyOutput { replica: u32 },

    #[error(
        "incorrect format of the output for replica {replica}: actual={actual:?} expected to start with {expected:?}"
    )]
    PrefixMismatch {
        replica: u32,
        actual: String,
        expected: String,
    },

    #[error("malformed metric line for replica {replica}: {line:?}")]
    MalformedLine { replica: u32, line: String },

    #[error("invalid metric value {token:?} for replica {replica}: {reason}")]
    NumberFormat {
        replica: u32,
        token: String,
        reason: String,
    },
}

/// Parse a single scrape line.
///
/// The line must start with `expected_prefix`; the value is the second
/// whitespace-separated token.
pub fn extract(
    raw_line: &str,
    expected_prefix: &str,
    replica: u32,
) -> Result<MetricSample, ParseError> {
    if raw_line.is_empty() {
        return Err(ParseError::EmptyOutput { replica });
    }
    let Some(rest) = raw_line.strip_prefix(expected_prefix) else {
        return Err(ParseError::PrefixMismatch {
            replica,
            actual: raw_line.to_string(),
            expected: expected_prefix.to_string(),
        });
    };

    let mut tokens = raw_line.split_whitespace();
    let (Some(_name), Some(value_token)) = (tokens.next(), tokens.next()) else {
        return Err(ParseError::MalformedLine {
            replica,
            line: raw_line.to_string(),
        });
    };
    let value_token = value_token.trim_end_matches(['\r', '\n']);

    let value = parse_value(value_token).map_err(|reason| ParseError::NumberFormat {
        replica,
        token: value_token.to_string(),
        reason,
    })?;

    let store_label = rest.split('"').next().unwrap_or_default().to_string();

    Ok(MetricSample {
        store_label,
        value,
        raw: raw_line.trim_end_matches(['\r', '\n']).to_string(),
    })
}

/// Parse every non-empty line of a scrape. A replica with several stores
/// reports one line per store.
pub fn extract_all(
    output: &str,
    expected_prefix: &str,
    replica: u32,
) -> Result<Vec<MetricSample>, ParseError> {
    let samples = output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| extract(line, expected_prefix, replica))
        .collect::<Result<Vec<_>, _>>()?;

    if samples.is_empty() {
        return Err(ParseError::EmptyOutput { replica });
    }
    Ok(samples)
}

fn parse_value(token: &str) -> Result<f64, String> {
    let value: f64 = token.parse().map_err(|e: ParseFloatError| e.to_string())?;
    if !value.is_finite() {
        return Err("value is not finite".to_string());
    }
    Ok(value)
}
