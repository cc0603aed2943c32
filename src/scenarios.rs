//! Built-in acceptance scenarios.

pub mod cloud9;

use clap::ValueEnum;

use crate::lifecycle::TestCase;

const SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    Basic,
    AllFields,
    Import,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Basic, Scenario::AllFields, Scenario::Import];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Basic => "cloud9_basic",
            Scenario::AllFields => "cloud9_all_fields",
            Scenario::Import => "cloud9_import_basic",
        }
    }

    pub fn build(&self, suffix: &str) -> TestCase {
        match self {
            Scenario::Basic => cloud9::basic(suffix),
            Scenario::AllFields => cloud9::all_fields(suffix),
            Scenario::Import => cloud9::import_basic(suffix),
        }
    }
}

/// Eight lowercase letters, used to keep concurrent runs from colliding on names.
pub fn random_suffix() -> String {
    (0..SUFFIX_LEN).map(|_| fastrand::lowercase()).collect()
}
