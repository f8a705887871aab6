//! Per-cavity progress stream for front-ends.

use crate::cavity::CavityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandingStatus {
    Started(String),
    Progress(String),
    Finished(String),
    /// Error text of the failed operation.
    Failed(String),
}

impl LandingStatus {
    pub fn message(&self) -> &str {
        match self {
            Self::Started(m) | Self::Progress(m) | Self::Finished(m) | Self::Failed(m) => m,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub cavity: CavityId,
    pub status: LandingStatus,
}
