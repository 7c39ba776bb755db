//! FileCheck-style test validation for `.dag` files.
//!
//! Directives live in `;` comments of the test file itself:
//!
//! ```text
//! ; RUN: dagsel %s --mattr=+atomics
//! ; RUN: not dagsel %s
//! ; CHECK-LABEL: function f:
//! ; CHECK: ATOMIC_FENCE
//! ; CHECK-NEXT: RETURN
//! ; CHECK-NOT: COMPILER_FENCE
//! ```
//!
//! A `not` RUN line expects the invocation to fail; the diagnostic then
//! becomes the output the CHECK lines are matched against.

use super::Invocation;
use clap::Parser;

/// A CHECK directive extracted from a test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern, anywhere after the previous match
    Check(String),
    /// CHECK-LABEL: pattern, starts a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern, on the line right after the previous match
    CheckNext(String),
    /// CHECK-NOT: pattern, absent up to the next positive match
    CheckNot(String),
    /// CHECK-EMPTY
    CheckEmpty,
    /// COM: comment, ignored
    Comment(String),
}

/// A RUN directive: `[not] dagsel <args...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirective {
    pub expect_failure: bool,
    pub command: String,
    pub args: Vec<String>,
}

/// Test specification extracted from a test file.
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub dag_content: String,
}

impl TestSpec {
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut dag_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run) = trimmed.strip_prefix("; RUN:") {
                let mut parts: Vec<&str> = run.split_whitespace().collect();
                let expect_failure = parts.first() == Some(&"not");
                if expect_failure {
                    parts.remove(0);
                }
                let Some((command, args)) = parts.split_first() else {
                    return Err(format!("empty RUN line: '{trimmed}'"));
                };
                run_directives.push(RunDirective {
                    expect_failure,
                    command: command.to_string(),
                    args: args.iter().map(|s| s.to_string()).collect(),
                });
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                dag_lines.push(line);
            }
        }

        if run_directives.is_empty() {
            return Err("no RUN line".to_string());
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            dag_content: dag_lines.join("\n"),
        })
    }
}

/// Runs `.dag` tests in-process and validates their output.
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        for run in &spec.run_directives {
            let output = self.execute(&spec.dag_content, run)?;
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    /// Execute one RUN line and return the text to check.
    fn execute(&self, source: &str, run: &RunDirective) -> Result<String, String> {
        if run.command != "dagsel" {
            return Err(format!("unknown RUN command '{}'", run.command));
        }
        let invocation = Invocation::try_parse_from(
            std::iter::once("dagsel").chain(run.args.iter().map(String::as_str)),
        )
        .map_err(|e| format!("bad RUN arguments: {e}"))?;

        match (invocation.run(source), run.expect_failure) {
            (Ok(output), false) => Ok(output),
            (Err(e), true) => Ok(format!("error: {e}")),
            (Ok(output), true) => {
                Err(format!("expected failure but selection succeeded:\n{output}"))
            }
            (Err(e), false) => Err(format!("unexpected failure: {e}")),
        }
    }

    /// Validate output against CHECK directives.
    pub fn validate_output(
        &self,
        output: &str,
        directives: &[CheckDirective],
    ) -> Result<(), String> {
        let lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        // CHECK-NOT patterns must not occur in lines[from..to].
        let check_nots = |pending: &mut Vec<&str>, from: usize, to: usize| -> Result<(), String> {
            for pattern in pending.drain(..) {
                if let Some(line) = lines[from..to].iter().find(|line| line.contains(pattern)) {
                    return Err(format!("CHECK-NOT: pattern '{pattern}' found in '{line}'"));
                }
            }
            Ok(())
        };

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));
                    let Some(idx) = found else {
                        let kind = if matches!(directive, CheckDirective::Check(_)) {
                            "CHECK"
                        } else {
                            "CHECK-LABEL"
                        };
                        return Err(format!(
                            "{kind}: pattern '{pattern}' not found in output:\n{output}"
                        ));
                    };
                    check_nots(&mut pending_not, line_idx, line_idx + idx)?;
                    line_idx += idx + 1;
                    if self.verbose {
                        println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    let Some(line) = lines.get(line_idx) else {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{pattern}'"));
                    };
                    if !line.contains(pattern.as_str()) {
                        return Err(format!("CHECK-NEXT: expected '{pattern}' but got '{line}'"));
                    }
                    check_nots(&mut pending_not, line_idx, line_idx)?;
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if let Some(line) = lines.get(line_idx) {
                        if !line.trim().is_empty() {
                            return Err(format!(
                                "CHECK-EMPTY: expected empty line but got '{line}'"
                            ));
                        }
                        line_idx += 1;
                    }
                }
            }
        }

        check_nots(&mut pending_not, line_idx, lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = "; RUN: not dagsel %s --mattr=+atomics\n\
                       ; CHECK-LABEL: function f:\n\
                       ; CHECK-NOT: COMPILER_FENCE\n\
                       ; CHECK: ATOMIC_FENCE\n\
                       ; COM: comment\n\
                       define @f {\n\
                         ret %entry\n\
                       }";
        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(
            spec.run_directives,
            vec![RunDirective {
                expect_failure: true,
                command: "dagsel".into(),
                args: vec!["%s".into(), "--mattr=+atomics".into()],
            }]
        );
        assert_eq!(spec.check_directives.len(), 4);
        assert!(spec.dag_content.contains("define @f"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "function f:\n  t0: ch = EntryToken\n  t1: ch = ATOMIC_FENCE t2, t0\n";
        let directives = vec![
            CheckDirective::CheckLabel("function f:".into()),
            CheckDirective::CheckNot("COMPILER_FENCE".into()),
            CheckDirective::CheckNext("EntryToken".into()),
            CheckDirective::Check("ATOMIC_FENCE".into()),
        ];
        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_not_failure() {
        let runner = TestRunner::new(false);
        let output = "a\nCOMPILER_FENCE\nb\n";
        let directives = vec![
            CheckDirective::Check("a".into()),
            CheckDirective::CheckNot("COMPILER_FENCE".into()),
            CheckDirective::Check("b".into()),
        ];
        let err = runner.validate_output(output, &directives).unwrap_err();
        assert!(err.contains("CHECK-NOT"));

        let trailing = vec![CheckDirective::CheckNot("COMPILER_FENCE".into())];
        assert!(runner.validate_output(output, &trailing).is_err());
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";
        let directives = vec![
            CheckDirective::Check("Line 1".into()),
            CheckDirective::CheckNext("Line 3".into()),
        ];
        let err = runner.validate_output(output, &directives).unwrap_err();
        assert!(err.contains("CHECK-NEXT"));
    }

    #[test]
    fn test_expected_failure_output() {
        let spec = TestSpec::parse(
            "; RUN: not dagsel %s\n\
             ; CHECK: error: in function 'f': cannot use thread-local storage without bulk memory\n\
             define @f {\n\
               %t = tlsaddr.i32 @v\n\
               ret %entry, %t\n\
             }",
        )
        .unwrap();
        TestRunner::new(false).run_test(&spec).unwrap();
    }
}
