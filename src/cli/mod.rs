// Command-line definitions for `devmake`.
pub mod cmd_enums;
