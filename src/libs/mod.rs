// Core of devmake: the installation pipeline and the pieces it is made of.

// Typed questions, the Q/A channel and its drivers.
pub mod interactions;
// The CheckInstalled → ... → Done state machine.
pub mod installation;
// Exec links, desktop entries, icons.
pub mod launcher;
// Finds the archive link for this architecture on a download page.
pub mod link_resolver;
// Default locations and user overrides.
pub mod paths;
// Env registration, symlink farms, licenses, messages.
pub mod post_install;
pub mod utilities;
