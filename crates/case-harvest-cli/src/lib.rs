//! case-harvest command line: configuration resolution, the interactive
//! CAPTCHA prompt and environment checks.

pub mod config;
pub mod doctor;
pub mod prompt;
