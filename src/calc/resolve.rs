use crate::model::{DateRange, SubjectAverage, NO_DATA};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Numeric agreement required between the remote and local averages.
pub const AGREEMENT_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageKey {
    pub student_id: String,
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subgroup_id: Option<String>,
    #[serde(flatten)]
    pub range: DateRange,
}

#[derive(Debug)]
pub enum RemoteUnavailable {
    NotConfigured,
    Status(u16),
    Transport(String),
    Malformed(String),
}

impl fmt::Display for RemoteUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteUnavailable::NotConfigured => write!(f, "no averaging endpoint configured"),
            RemoteUnavailable::Status(code) => write!(f, "averaging endpoint answered {}", code),
            RemoteUnavailable::Transport(msg) => write!(f, "averaging endpoint unreachable: {}", msg),
            RemoteUnavailable::Malformed(msg) => write!(f, "malformed averaging payload: {}", msg),
        }
    }
}

impl std::error::Error for RemoteUnavailable {}

/// Precomputed aggregates supplied by an external averaging service.
pub trait RemoteAverages {
    fn fetch(&self, key: &AverageKey) -> Result<SubjectAverage, RemoteUnavailable>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AverageSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAverage {
    #[serde(flatten)]
    pub value: SubjectAverage,
    pub source: AverageSource,
}

fn parse_figure(raw: &str) -> Option<Option<f64>> {
    let t = raw.trim();
    if t == NO_DATA {
        return Some(None);
    }
    let t = t.trim_end_matches('%').trim().replace(',', ".");
    t.parse::<f64>().ok().filter(|v| v.is_finite()).map(Some)
}

/// Rejects payloads a local computation could never have produced.
pub fn validate_remote(avg: SubjectAverage) -> Result<SubjectAverage, RemoteUnavailable> {
    let average = parse_figure(&avg.average)
        .ok_or_else(|| RemoteUnavailable::Malformed(format!("average {:?}", avg.average)))?;
    let percentage = parse_figure(&avg.percentage)
        .ok_or_else(|| RemoteUnavailable::Malformed(format!("percentage {:?}", avg.percentage)))?;
    if average.is_some() != percentage.is_some() {
        return Err(RemoteUnavailable::Malformed(
            "average and percentage disagree on no-data".to_string(),
        ));
    }
    if let Some(p) = percentage {
        if !(0.0..=100.0).contains(&p) {
            return Err(RemoteUnavailable::Malformed(format!("percentage {} out of range", p)));
        }
    }
    if let Some(max) = avg.max_score.as_deref() {
        if parse_figure(max).is_none() {
            return Err(RemoteUnavailable::Malformed(format!("maxScore {:?}", max)));
        }
    }
    Ok(avg)
}

/// Remote result when the service has one, local computation otherwise.
pub fn resolve_subject_average<F>(
    remote: Option<&dyn RemoteAverages>,
    key: &AverageKey,
    local: F,
) -> ResolvedAverage
where
    F: FnOnce() -> SubjectAverage,
{
    let fetched = match remote {
        Some(r) => r.fetch(key).and_then(validate_remote),
        None => Err(RemoteUnavailable::NotConfigured),
    };
    match fetched {
        Ok(value) => {
            debug!(student = %key.student_id, subject = %key.subject_id, "using remote average");
            ResolvedAverage {
                value,
                source: AverageSource::Remote,
            }
        }
        Err(reason) => {
            if !matches!(reason, RemoteUnavailable::NotConfigured) {
                warn!(
                    student = %key.student_id,
                    subject = %key.subject_id,
                    %reason,
                    "remote average unavailable, computing locally"
                );
            }
            ResolvedAverage {
                value: local(),
                source: AverageSource::Local,
            }
        }
    }
}

/// Two averages agree when both are no-data, or when every figure they both
/// carry is within [`AGREEMENT_TOLERANCE`].
pub fn averages_agree(a: &SubjectAverage, b: &SubjectAverage) -> bool {
    let close = |x: &str, y: &str| match (parse_figure(x), parse_figure(y)) {
        (Some(None), Some(None)) => true,
        (Some(Some(l)), Some(Some(r))) => (l - r).abs() <= AGREEMENT_TOLERANCE + 1e-9,
        _ => false,
    };
    let max_ok = match (a.max_score.as_deref(), b.max_score.as_deref()) {
        (Some(l), Some(r)) => close(l, r),
        _ => true,
    };
    close(&a.average, &b.average) && close(&a.percentage, &b.percentage) && max_ok
}
