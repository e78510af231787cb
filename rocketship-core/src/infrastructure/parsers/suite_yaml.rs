//! Rocketship suite YAML parser
//!
//! A suite file declares a name, a DSL version and a list of tests, each made of
//! plugin steps. Only the structure is checked here; step configuration is opaque
//! and templates are never rendered.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SUPPORTED_VERSION: &str = "v1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketshipSuite {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tests: Vec<SuiteTest>,
}

impl RocketshipSuite {
    pub fn test_names(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.name.clone()).collect()
    }

    /// Description with blank values folded to `None`
    pub fn description(&self) -> Option<String> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteTest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<SuiteStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteStep {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub config: serde_yml::Value,
    #[serde(default)]
    pub assertions: Vec<serde_yml::Value>,
    #[serde(default)]
    pub save: Vec<serde_yml::Value>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuiteParseError {
    #[error("suite file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("suite file is not valid UTF-8")]
    NotUtf8,

    #[error("failed to parse YAML: {message}")]
    Syntax { message: String },

    #[error("unsupported version: {version:?}")]
    UnsupportedVersion { version: String },

    #[error("suite name is required")]
    MissingName,

    #[error("no tests defined")]
    NoTests,

    #[error("test {index}: a name is required for each test")]
    TestMissingName { index: usize },

    #[error("test {test:?}: no steps defined for this test")]
    TestWithoutSteps { test: String },

    #[error("test {test:?}: step {index}: a name is required for each step")]
    StepMissingName { test: String, index: usize },

    #[error("test {test:?}: step {step:?}: a plugin is required for each step")]
    StepMissingPlugin { test: String, step: String },
}

/// Parses suite files found directly under a `.rocketship` directory
#[derive(Debug, Clone)]
pub struct SuiteYamlParser {
    max_bytes: usize,
}

impl SuiteYamlParser {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Whether a file name has a suite extension
    pub fn supports_file(&self, path: &str) -> bool {
        is_suite_file(path)
    }

    pub fn parse(&self, content: &[u8]) -> Result<RocketshipSuite, SuiteParseError> {
        if content.len() > self.max_bytes {
            return Err(SuiteParseError::TooLarge {
                size: content.len(),
                limit: self.max_bytes,
            });
        }

        let text = std::str::from_utf8(content).map_err(|_| SuiteParseError::NotUtf8)?;
        parse_suite(text)
    }
}

pub fn is_suite_file(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

/// Parse and structurally validate one suite document
pub fn parse_suite(text: &str) -> Result<RocketshipSuite, SuiteParseError> {
    let suite: RocketshipSuite =
        serde_yml::from_str(text).map_err(|e| SuiteParseError::Syntax {
            message: e.to_string(),
        })?;
    validate(&suite)?;
    Ok(suite)
}

fn validate(suite: &RocketshipSuite) -> Result<(), SuiteParseError> {
    if suite.version != SUPPORTED_VERSION {
        return Err(SuiteParseError::UnsupportedVersion {
            version: suite.version.clone(),
        });
    }
    if suite.name.trim().is_empty() {
        return Err(SuiteParseError::MissingName);
    }
    if suite.tests.is_empty() {
        return Err(SuiteParseError::NoTests);
    }

    for (index, test) in suite.tests.iter().enumerate() {
        if test.name.trim().is_empty() {
            return Err(SuiteParseError::TestMissingName { index });
        }
        if test.steps.is_empty() {
            return Err(SuiteParseError::TestWithoutSteps {
                test: test.name.clone(),
            });
        }
    }

    for test in &suite.tests {
        for (index, step) in test.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(SuiteParseError::StepMissingName {
                    test: test.name.clone(),
                    index,
                });
            }
            if step.plugin.trim().is_empty() {
                return Err(SuiteParseError::StepMissingPlugin {
                    test: test.name.clone(),
                    step: step.name.clone(),
                });
            }
        }
    }

    Ok(())
}
