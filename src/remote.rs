use crate::calc::resolve::{AverageKey, RemoteAverages, RemoteUnavailable};
use crate::config::RemoteAveragesConfig;
use crate::model::SubjectAverage;
use std::time::Duration;
use tracing::debug;

/// Client for the school API's averaging endpoint:
/// `GET {base}/averages?studentId=..&subjectId=..[&subgroupId=..][&fromDate=..][&toDate=..]`
pub struct HttpRemoteAverages {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpRemoteAverages {
    pub fn new(config: &RemoteAveragesConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self {
            endpoint: format!("{}/averages", config.base_url.trim_end_matches('/')),
            agent,
        }
    }
}

impl RemoteAverages for HttpRemoteAverages {
    fn fetch(&self, key: &AverageKey) -> Result<SubjectAverage, RemoteUnavailable> {
        let mut req = self
            .agent
            .get(&self.endpoint)
            .query("studentId", &key.student_id)
            .query("subjectId", &key.subject_id);
        if let Some(subgroup_id) = key.subgroup_id.as_deref() {
            req = req.query("subgroupId", subgroup_id);
        }
        if let Some(from) = key.range.from {
            req = req.query("fromDate", &from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = key.range.to {
            req = req.query("toDate", &to.format("%Y-%m-%d").to_string());
        }

        debug!(url = %req.url(), "requesting remote average");
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::Status(code, _)) => return Err(RemoteUnavailable::Status(code)),
            Err(ureq::Error::Transport(t)) => {
                return Err(RemoteUnavailable::Transport(t.to_string()))
            }
        };
        let avg = resp
            .into_json::<SubjectAverage>()
            .map_err(|e| RemoteUnavailable::Malformed(e.to_string()))?;
        debug!(no_data = avg.is_no_data(), "remote average received");
        Ok(avg)
    }
}
