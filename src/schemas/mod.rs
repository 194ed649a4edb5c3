// Data shapes shared across devmake.

// Installer and channel error types.
pub mod errors;
// Framework table, descriptors and the registry.
pub mod framework;
