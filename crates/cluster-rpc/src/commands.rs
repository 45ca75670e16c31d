//! # Command Surface
//!
//! The closed set of remotely invokable commands with typed argument and
//! response schemas. Dispatch is a table lookup on `CommandKind`; there is no
//! runtime command registration beyond building the responder table at
//! startup.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared_types::EventLoopId;

/// One bootable image present on a rack controller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BootImage {
    pub osystem: String,
    pub architecture: String,
    pub subarchitecture: String,
    pub release: String,
    pub label: String,
    pub purpose: String,
}

/// A power driver the rack can manage machines with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerType {
    pub name: String,
    pub description: String,
}

/// A machine architecture the rack can deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub name: String,
    pub description: String,
}

/// Command invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Ask the peer for its event-loop identity.
    Identify,
    /// List the boot images present on the rack.
    ListBootImages,
    /// Describe the power drivers the rack supports.
    DescribePowerTypes,
    /// List the architectures the rack can deploy.
    ListSupportedArchitectures,
    /// Is the rack currently importing boot images?
    IsImportBootImagesRunning,
    /// Report the rack's boot images to the region.
    ReportBootImages {
        uuid: String,
        images: Vec<BootImage>,
    },
}

/// Command results, one variant per command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Identify { ident: EventLoopId },
    BootImages { images: Vec<BootImage> },
    PowerTypes { power_types: Vec<PowerType> },
    Architectures { architectures: Vec<Architecture> },
    ImportRunning { running: bool },
    /// Acknowledgement for commands with an empty response schema.
    Done,
}

/// Command discriminant; the responder table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Identify,
    ListBootImages,
    DescribePowerTypes,
    ListSupportedArchitectures,
    IsImportBootImagesRunning,
    ReportBootImages,
}

impl Request {
    /// The table key for this invocation.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Identify => CommandKind::Identify,
            Self::ListBootImages => CommandKind::ListBootImages,
            Self::DescribePowerTypes => CommandKind::DescribePowerTypes,
            Self::ListSupportedArchitectures => CommandKind::ListSupportedArchitectures,
            Self::IsImportBootImagesRunning => CommandKind::IsImportBootImagesRunning,
            Self::ReportBootImages { .. } => CommandKind::ReportBootImages,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identify => "Identify",
            Self::ListBootImages => "ListBootImages",
            Self::DescribePowerTypes => "DescribePowerTypes",
            Self::ListSupportedArchitectures => "ListSupportedArchitectures",
            Self::IsImportBootImagesRunning => "IsImportBootImagesRunning",
            Self::ReportBootImages => "ReportBootImages",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_kind_mapping() {
        assert_eq!(Request::Identify.kind(), CommandKind::Identify);
        assert_eq!(
            Request::ReportBootImages {
                uuid: "u".into(),
                images: vec![],
            }
            .kind(),
            CommandKind::ReportBootImages
        );
    }

    #[test]
    fn test_boot_image_ordering_is_total() {
        let a = BootImage {
            osystem: "ubuntu".into(),
            architecture: "amd64".into(),
            subarchitecture: "generic".into(),
            release: "noble".into(),
            label: "stable".into(),
            purpose: "commissioning".into(),
        };
        let mut b = a.clone();
        b.release = "jammy".into();
        let mut images = vec![a.clone(), b.clone(), a.clone()];
        images.sort();
        images.dedup();
        assert_eq!(images.len(), 2);
    }
}
