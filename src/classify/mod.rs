//! Failure-signature classification for pod snapshots.

use crate::watch::PodSnapshot;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Recognized failure patterns. Closed set: a new variant requires a
/// matching enablement flag in [`EventPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentType {
    CrashLoop,
    ImagePullFailure,
    HealthCheckFailure,
    OomKilled,
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentType::CrashLoop => write!(f, "CrashLoop"),
            IncidentType::ImagePullFailure => write!(f, "ImagePullFailure"),
            IncidentType::HealthCheckFailure => write!(f, "HealthCheckFailure"),
            IncidentType::OomKilled => write!(f, "OOMKilled"),
        }
    }
}

impl FromStr for IncidentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CrashLoop" => Ok(IncidentType::CrashLoop),
            "ImagePullFailure" => Ok(IncidentType::ImagePullFailure),
            "HealthCheckFailure" => Ok(IncidentType::HealthCheckFailure),
            "OOMKilled" => Ok(IncidentType::OomKilled),
            other => Err(format!("unknown incident type: {other}")),
        }
    }
}

/// Which incident types the classifier is allowed to emit.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventPolicy {
    pub crash_loop: bool,
    pub image_pull_failure: bool,
    pub health_check_failure: bool,
    pub oom_killed: bool,
}

impl Default for EventPolicy {
    fn default() -> Self {
        Self {
            crash_loop: true,
            image_pull_failure: true,
            health_check_failure: true,
            oom_killed: true,
        }
    }
}

impl EventPolicy {
    pub fn enabled(&self, incident_type: IncidentType) -> bool {
        match incident_type {
            IncidentType::CrashLoop => self.crash_loop,
            IncidentType::ImagePullFailure => self.image_pull_failure,
            IncidentType::HealthCheckFailure => self.health_check_failure,
            IncidentType::OomKilled => self.oom_killed,
        }
    }
}

/// One detected occurrence of a failure pattern. Created fresh on every
/// classification pass, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub pod_name: String,
    pub namespace: String,
    /// Empty when the incident is pod-scoped rather than container-scoped.
    pub container_name: String,
    pub incident_type: IncidentType,
    pub reason: String,
    pub message: String,
}

impl Incident {
    pub fn key(&self) -> IncidentKey {
        IncidentKey {
            namespace: self.namespace.clone(),
            pod_name: self.pod_name.clone(),
            incident_type: self.incident_type,
        }
    }
}

/// Identity used to correlate repeated observations of the same ongoing
/// problem. Container name and diagnostic text are deliberately excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncidentKey {
    pub namespace: String,
    pub pod_name: String,
    pub incident_type: IncidentType,
}

impl fmt::Display for IncidentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod_name, self.incident_type)
    }
}

/// Classify one pod snapshot against the enablement policy.
///
/// Pure function of its inputs; at most one incident per invocation, the
/// first qualifying condition in precedence order:
///
/// 1. pod phase `Failed` -> CrashLoop (pod-scoped);
/// 2. first container waiting on `CrashLoopBackOff` -> CrashLoop, or on
///    `ImagePullBackOff` / `ErrImagePull` -> ImagePullFailure;
/// 3. first container terminated with `OOMKilled` -> OOMKilled.
///
/// A condition whose type is disabled by the policy does not qualify; a
/// disabled `Failed` phase emits nothing at all.
pub fn classify(pod: &PodSnapshot, policy: &EventPolicy) -> Option<Incident> {
    let status = &pod.status;

    if status.phase.as_deref() == Some("Failed") {
        if !policy.enabled(IncidentType::CrashLoop) {
            return None;
        }
        return Some(Incident {
            pod_name: pod.metadata.name.clone(),
            namespace: pod.metadata.namespace.clone(),
            container_name: String::new(),
            incident_type: IncidentType::CrashLoop,
            reason: status.reason.clone().unwrap_or_default(),
            message: status.message.clone().unwrap_or_default(),
        });
    }

    for container in &status.container_statuses {
        let Some(waiting) = &container.state.waiting else {
            continue;
        };
        let incident_type = match waiting.reason.as_deref() {
            Some("CrashLoopBackOff") => IncidentType::CrashLoop,
            Some("ImagePullBackOff") | Some("ErrImagePull") => IncidentType::ImagePullFailure,
            _ => continue,
        };
        if !policy.enabled(incident_type) {
            continue;
        }
        return Some(Incident {
            pod_name: pod.metadata.name.clone(),
            namespace: pod.metadata.namespace.clone(),
            container_name: container.name.clone(),
            incident_type,
            reason: waiting.reason.clone().unwrap_or_default(),
            message: waiting.message.clone().unwrap_or_default(),
        });
    }

    for container in &status.container_statuses {
        let Some(terminated) = &container.state.terminated else {
            continue;
        };
        if terminated.reason.as_deref() == Some("OOMKilled")
            && policy.enabled(IncidentType::OomKilled)
        {
            return Some(Incident {
                pod_name: pod.metadata.name.clone(),
                namespace: pod.metadata.namespace.clone(),
                container_name: container.name.clone(),
                incident_type: IncidentType::OomKilled,
                reason: terminated.reason.clone().unwrap_or_default(),
                message: terminated.message.clone().unwrap_or_default(),
            });
        }
    }

    None
}
