//! Parsers for repository content

pub mod suite_yaml;

pub use suite_yaml::{
    RocketshipSuite, SuiteParseError, SuiteStep, SuiteTest, SuiteYamlParser, is_suite_file,
    parse_suite,
};
