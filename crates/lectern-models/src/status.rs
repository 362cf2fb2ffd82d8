//! Lifecycle status enums for a video and its refinement/engagement runs.
//!
//! Each enum exposes transition functions instead of free assignment, so an
//! illegal move (e.g. starting a run that is already running) surfaces as a
//! [`TransitionError`] at the call site.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Illegal state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot {action} {machine} from '{from}'")]
pub struct TransitionError {
    pub machine: &'static str,
    pub action: &'static str,
    pub from: &'static str,
}

impl TransitionError {
    fn new(machine: &'static str, action: &'static str, from: &'static str) -> Self {
        Self {
            machine,
            action,
            from,
        }
    }
}

/// Top-level processing status of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Uploaded, not yet analyzed
    #[default]
    Uploaded,
    /// Analysis pipeline is running
    Processing,
    /// Timeline is available
    Ready,
    /// Last run failed
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Uploaded => "uploaded",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Ready => "ready",
            ProcessingStatus::Error => "error",
        }
    }

    /// Enter `processing`. Allowed from every state except `processing`
    /// itself, which makes retry an explicit re-trigger.
    pub fn begin(self) -> Result<Self, TransitionError> {
        match self {
            ProcessingStatus::Processing => {
                Err(TransitionError::new("processing", "begin", self.as_str()))
            }
            _ => Ok(ProcessingStatus::Processing),
        }
    }

    pub fn complete(self) -> Result<Self, TransitionError> {
        match self {
            ProcessingStatus::Processing => Ok(ProcessingStatus::Ready),
            _ => Err(TransitionError::new("processing", "complete", self.as_str())),
        }
    }

    pub fn fail(self) -> Result<Self, TransitionError> {
        match self {
            ProcessingStatus::Processing => Ok(ProcessingStatus::Error),
            _ => Err(TransitionError::new("processing", "fail", self.as_str())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Ready | ProcessingStatus::Error)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Advisory sub-state while `status == processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    #[default]
    Initializing,
    UploadingToGemini,
    AnalyzingContent,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Initializing => "initializing",
            ProcessingStage::UploadingToGemini => "uploading_to_gemini",
            ProcessingStage::AnalyzingContent => "analyzing_content",
        }
    }

    /// Advance to `to`; stages only move forward.
    pub fn next(self, to: ProcessingStage) -> Result<Self, TransitionError> {
        if to > self {
            Ok(to)
        } else {
            Err(TransitionError::new("processing stage", "advance", self.as_str()))
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of the refinement suggestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    #[default]
    Idle,
    Refining,
    Complete,
    Error,
}

impl RefinementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefinementStatus::Idle => "idle",
            RefinementStatus::Refining => "refining",
            RefinementStatus::Complete => "complete",
            RefinementStatus::Error => "error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RefinementStatus::Refining)
    }

    pub fn begin(self) -> Result<Self, TransitionError> {
        if self.is_running() {
            return Err(TransitionError::new("refinement", "begin", self.as_str()));
        }
        Ok(RefinementStatus::Refining)
    }

    pub fn complete(self) -> Result<Self, TransitionError> {
        if !self.is_running() {
            return Err(TransitionError::new("refinement", "complete", self.as_str()));
        }
        Ok(RefinementStatus::Complete)
    }

    pub fn fail(self) -> Result<Self, TransitionError> {
        if !self.is_running() {
            return Err(TransitionError::new("refinement", "fail", self.as_str()));
        }
        Ok(RefinementStatus::Error)
    }
}

impl fmt::Display for RefinementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of the engagement analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    #[default]
    Idle,
    Analyzing,
    Complete,
    Error,
}

impl EngagementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementStatus::Idle => "idle",
            EngagementStatus::Analyzing => "analyzing",
            EngagementStatus::Complete => "complete",
            EngagementStatus::Error => "error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, EngagementStatus::Analyzing)
    }

    pub fn begin(self) -> Result<Self, TransitionError> {
        if self.is_running() {
            return Err(TransitionError::new("engagement", "begin", self.as_str()));
        }
        Ok(EngagementStatus::Analyzing)
    }

    pub fn complete(self) -> Result<Self, TransitionError> {
        if !self.is_running() {
            return Err(TransitionError::new("engagement", "complete", self.as_str()));
        }
        Ok(EngagementStatus::Complete)
    }

    pub fn fail(self) -> Result<Self, TransitionError> {
        if !self.is_running() {
            return Err(TransitionError::new("engagement", "fail", self.as_str()));
        }
        Ok(EngagementStatus::Error)
    }
}

impl fmt::Display for EngagementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
