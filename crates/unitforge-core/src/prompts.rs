//! Oracle request builders for the four artifact transformations:
//! initial generation, refinement, build repair and failed-case pruning.

use std::path::Path;

use tracing::debug;

use crate::domain::{Result, SourceUnit, TestArtifact};
use crate::oracle::OracleRequest;

const RAW_CODE_RULES: &str = "Only return the raw code.\n\
Do not wrap the output in triple backticks or Markdown code blocks like ```cpp.\n\
Just return the code as-is.";

const DEFAULT_GENERATION_RULES: &str = "\
- Use the Google Test framework.
- Include every header the tests need; never include .cpp source files.
- Cover all public functions, edge cases and boundary conditions.
- Use mocks only for external dependencies.";

const DEFAULT_REFINEMENT_RULES: &str = "\
- Remove duplicate test cases.
- Add missing include statements.
- Keep every test compiling against the given source file.";

const DEFAULT_REPAIR_RULES: &str = "\
- Fix every compilation error reported for this file.
- Keep the existing test logic and coverage.
- Resolve include paths from the source and test file locations.";

const DEFAULT_PRUNE_RULES: &str = "\
- Remove only the test cases reported as failing.
- Change nothing else in the file.";

/// System instructions for each oracle task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub generation: String,
    pub refinement: String,
    pub repair: String,
    pub prune: String,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            generation: DEFAULT_GENERATION_RULES.to_string(),
            refinement: DEFAULT_REFINEMENT_RULES.to_string(),
            repair: DEFAULT_REPAIR_RULES.to_string(),
            prune: DEFAULT_PRUNE_RULES.to_string(),
        }
    }
}

impl Instructions {
    /// Load overrides from `dir`. Each of `initial_generation.yaml`,
    /// `refinement.yaml`, `debugging.yaml` and `remove_failed_tests.yaml`
    /// replaces the matching default when present.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut instructions = Self::default();
        let Some(dir) = dir else {
            return Ok(instructions);
        };

        let slots = [
            ("initial_generation.yaml", &mut instructions.generation),
            ("refinement.yaml", &mut instructions.refinement),
            ("debugging.yaml", &mut instructions.repair),
            ("remove_failed_tests.yaml", &mut instructions.prune),
        ];
        for (file, slot) in slots {
            let path = dir.join(file);
            if path.is_file() {
                debug!(path = %path.display(), "loading instruction override");
                *slot = std::fs::read_to_string(&path)?;
            }
        }
        Ok(instructions)
    }
}

fn system_prompt(role: &str, rules: &str) -> String {
    format!("You are an expert C++ {role}. Follow these instructions strictly:\n\n{rules}")
}

/// Request for the initial test file of `source`.
pub fn generation_request(
    instructions: &Instructions,
    source: &SourceUnit,
    test_dir: &Path,
) -> OracleRequest {
    let user = format!(
        "Generate comprehensive unit tests for the following C++ source file:\n\n\
Source File: {name}\n\
Source File Path: {path}\n\
Test Directory: {test_dir} (All test files will be saved here. Resolve header imports accordingly)\n\n\
Source Code:\n```cpp\n{content}\n```\n\n\
Please generate a complete test file with:\n\
1. All necessary include statements\n\
2. Test cases for all public functions\n\
3. Edge cases and boundary conditions\n\
4. Proper test structure using Google Test framework\n\
5. Mock objects where needed for external dependencies\n\
6. Don't import source files. Only import headers in the source and resolve imports based on source file path and test directory\n\n\
{RAW_CODE_RULES}\n\n\
Return only the complete C++ test file code.",
        name = source.name,
        path = source.path.display(),
        test_dir = test_dir.display(),
        content = source.content,
    );
    OracleRequest::new(
        system_prompt("unit test generator", &instructions.generation),
        user,
    )
}

fn artifact_header(artifact: &TestArtifact) -> String {
    format!(
        "Original Source File: {}\n\
Original Source File Path: {}\n\
Test File: {}\n\
Test File Path: {}",
        artifact.source.name,
        artifact.source.path.display(),
        artifact.file_name,
        artifact.path.display(),
    )
}

/// Request to review and improve a generated artifact.
pub fn refinement_request(instructions: &Instructions, artifact: &TestArtifact) -> OracleRequest {
    let user = format!(
        "Review and improve the following generated unit test:\n\n\
{header}\n\n\
Current Test Content:\n```cpp\n{content}\n```\n\n\
Please refine this test by:\n\
1. Removing any duplicate test cases\n\
2. Adding missing include statements\n\
3. Improving test organization and structure\n\
4. Ensuring comprehensive coverage\n\
5. Adding better test documentation\n\
6. Optimizing mock usage\n\
7. Don't import source files. Only import headers in the source and resolve imports based on source file path and test file path\n\n\
{RAW_CODE_RULES}\n\n\
Return only the refined complete C++ test file code.",
        header = artifact_header(artifact),
        content = artifact.content,
    );
    OracleRequest::new(
        system_prompt("code reviewer", &instructions.refinement),
        user,
    )
}

/// Request to fix `artifact` given the full build diagnostics.
pub fn repair_request(
    instructions: &Instructions,
    artifact: &TestArtifact,
    diagnostics: &str,
) -> OracleRequest {
    let user = format!(
        "Fix the compilation errors in the following C++ test file:\n\n\
{header}\n\n\
Build Errors:\n```\n{diagnostics}\n```\n\n\
Current Test Content:\n```cpp\n{content}\n```\n\n\
Please fix all compilation errors while maintaining the test logic and coverage.\n\
Resolve import errors based on source file path and test file path.\n\
Return only the corrected complete C++ test file code.\n\
{RAW_CODE_RULES}",
        header = artifact_header(artifact),
        content = artifact.content,
    );
    OracleRequest::new(system_prompt("developer", &instructions.repair), user)
}

/// Request to strip the failing cases named in `failure_log` from `artifact`.
pub fn prune_request(
    instructions: &Instructions,
    artifact: &TestArtifact,
    failure_log: &str,
) -> OracleRequest {
    let user = format!(
        "Remove the failing test cases from the following C++ test file if they exist. Don't change anything else:\n\n\
Test File: {file}\n\
Test File Path: {path}\n\n\
Test Logs:\n```\n{failure_log}\n```\n\n\
Current Test Content:\n```cpp\n{content}\n```\n\n\
Please remove all the failing test cases if they exist in this file.\n\
Return only the corrected complete C++ test file code.\n\
{RAW_CODE_RULES}",
        file = artifact.file_name,
        path = artifact.path.display(),
        content = artifact.content,
    );
    OracleRequest::new(system_prompt("developer", &instructions.prune), user)
}
