// Archive fetching (HTTP, file://) with checksum verification.
pub mod assets;
// Archive extraction and executable marking.
pub mod compression;
pub mod deadline;
pub mod path_helpers;
// Architecture detection.
pub mod platform;
