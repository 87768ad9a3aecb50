mod common;

use stackup::report::{Probe, Verdict};
use stackup::verify::ProbeContext;
use stackup::{BootstrapError, CommandRunner, CommandSpec, SystemRunner};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_system_runner_captures_output() {
    let output = SystemRunner
        .run(&CommandSpec::shell("echo out; echo err >&2; exit 3"))
        .await
        .unwrap();
    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stdout.trim(), "out");
    assert_eq!(output.last_line(), "err");
}

#[tokio::test]
async fn test_system_runner_missing_binary() {
    let err = SystemRunner
        .run(&CommandSpec::new("stackup-no-such-tool"))
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::MissingTool { .. }));
    assert!(!SystemRunner.has_tool("stackup-no-such-tool").await);
}

/// Whether `pid` is gone or only a zombie waiting to be reaped.
#[cfg(target_os = "linux")]
fn process_finished(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map(|rest| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timed_out_tool_is_killed() {
    let (_dir, root) = common::temp_project();
    let pid_file = root.join("child.pid");

    let ctx = ProbeContext::new(Arc::new(SystemRunner), Duration::from_millis(500));
    let verdict = ctx
        .evaluate(&Probe::Tool {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("echo $$ > {}; exec sleep 30", pid_file.display()),
            ],
            expect: None,
        })
        .await;
    assert!(matches!(verdict, Verdict::Unhealthy(ref d) if d.contains("did not answer")));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    let mut finished = false;
    for _ in 0..40 {
        if process_finished(pid) {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(finished, "child {} still running after the timeout", pid);
}
