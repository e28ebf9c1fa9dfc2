//! Generated `CMakeLists.txt` for the test build.
//!
//! The descriptor compiles every scanned source directory (non-recursive glob
//! per directory and extension) together with every artifact file into one
//! GoogleTest executable instrumented with `--coverage`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use unitforge_core::toolchain::BuildPlan;

/// Render the descriptor for `plan`.
pub fn render_cmake_lists(plan: &BuildPlan, test_binary: &str, extensions: &[String]) -> String {
    let mut source_globs = String::new();
    for dir in &plan.source_dirs {
        for ext in extensions {
            source_globs.push_str(&format!("    \"{}/*.{}\"\n", cmake_path(dir), ext));
        }
    }

    let test_files: String = plan
        .artifact_paths
        .iter()
        .map(|p| format!("    \"{}\"\n", cmake_path(p)))
        .collect();

    let include_dirs: String = plan
        .source_dirs
        .iter()
        .map(|d| format!("    \"{}\"\n", cmake_path(d)))
        .collect();

    format!(
        r#"cmake_minimum_required(VERSION 3.10)
project(UnitforgeCoverage)

set(CMAKE_CXX_STANDARD 17)
set(CMAKE_CXX_STANDARD_REQUIRED ON)

find_package(GTest REQUIRED)
find_package(Threads REQUIRED)

# Source and test files
file(GLOB SRC_FILES
{source_globs})
set(TEST_FILES
{test_files})

add_executable({test_binary} ${{SRC_FILES}} ${{TEST_FILES}})

target_include_directories({test_binary} PRIVATE
{include_dirs})

target_link_libraries({test_binary}
    GTest::GTest
    GTest::Main
    Threads::Threads
)

# Coverage flags
target_compile_options({test_binary} PRIVATE --coverage)
target_link_options({test_binary} PRIVATE --coverage)

enable_testing()
add_test(NAME unit_tests COMMAND {test_binary})
"#
    )
}

/// Write the descriptor into `build_dir`; unchanged content is not rewritten.
pub fn write_descriptor(
    build_dir: &Path,
    plan: &BuildPlan,
    test_binary: &str,
    extensions: &[String],
) -> Result<PathBuf> {
    std::fs::create_dir_all(build_dir).with_context(|| format!("create {:?}", build_dir))?;
    let path = build_dir.join("CMakeLists.txt");
    let content = render_cmake_lists(plan, test_binary, extensions);

    if std::fs::read_to_string(&path).ok().as_deref() == Some(content.as_str()) {
        debug!(path = %path.display(), "descriptor unchanged");
        return Ok(path);
    }
    std::fs::write(&path, content).with_context(|| format!("write {:?}", path))?;
    Ok(path)
}

fn cmake_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> BuildPlan {
        BuildPlan::new(
            vec![
                PathBuf::from("/p/tests/test_calc.cpp"),
                PathBuf::from("/p/tests/test_net.cpp"),
            ],
            vec![PathBuf::from("/p/src"), PathBuf::from("/p/net")],
        )
    }

    fn extensions() -> Vec<String> {
        vec!["cpp".to_string(), "c".to_string()]
    }

    #[test]
    fn test_render_lists_every_artifact_and_source_glob() {
        let cmake = render_cmake_lists(&plan(), "test_runner", &extensions());
        assert!(cmake.contains("\"/p/tests/test_calc.cpp\""));
        assert!(cmake.contains("\"/p/tests/test_net.cpp\""));
        assert!(cmake.contains("\"/p/src/*.cpp\""));
        assert!(cmake.contains("\"/p/net/*.c\""));
        assert!(cmake.contains("add_executable(test_runner ${SRC_FILES} ${TEST_FILES})"));
        assert!(cmake.contains("set(CMAKE_CXX_STANDARD 17)"));
        assert!(cmake.contains("target_link_options(test_runner PRIVATE --coverage)"));
        assert!(cmake.contains("GTest::Main"));
    }

    #[test]
    fn test_write_descriptor_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let build_dir = dir.path().join("build");

        let path = write_descriptor(&build_dir, &plan(), "test_runner", &extensions())
            .expect("write");
        let first = std::fs::metadata(&path).and_then(|m| m.modified()).expect("mtime");
        let again = write_descriptor(&build_dir, &plan(), "test_runner", &extensions())
            .expect("write");
        let second = std::fs::metadata(&again).and_then(|m| m.modified()).expect("mtime");

        assert_eq!(path, build_dir.join("CMakeLists.txt"));
        assert_eq!(first, second);
    }
}
