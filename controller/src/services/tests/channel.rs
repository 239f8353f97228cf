//! Tests for ShellCommandChannel against a real `sh`

use std::time::Duration;

use tempfile::TempDir;

use crate::core::shell::quote_path;
use crate::error::ControllerError;
use crate::services::channel::ShellCommandChannel;
use crate::traits::CommandChannel;

fn sh(timeout: Duration) -> ShellCommandChannel {
    ShellCommandChannel::new(vec!["sh".to_string(), "-c".to_string()], timeout)
}

#[tokio::test]
async fn test_run_captures_output_and_exit_code() {
    let channel = sh(Duration::from_secs(5));

    let ok = channel.run("echo hello; echo oops >&2").await.unwrap();
    assert!(ok.success());
    assert_eq!(ok.stdout, "hello\n");
    assert_eq!(ok.stderr, "oops\n");

    let failed = channel.run("exit 3").await.unwrap();
    assert_eq!(failed.exit_code, 3);
}

#[tokio::test]
async fn test_run_timeout_is_channel_failure() {
    let channel = sh(Duration::from_millis(100));

    let err = channel.run("sleep 5").await.unwrap_err();
    assert!(err.is_channel_failure(), "{err}");
}

#[tokio::test]
async fn test_missing_shell_is_channel_failure() {
    let channel = ShellCommandChannel::new(vec!["/nonexistent/su".to_string(), "-c".to_string()], Duration::from_secs(1));

    let err = channel.run("true").await.unwrap_err();
    assert!(matches!(err, ControllerError::ChannelUnreachable { .. }));
}

#[tokio::test]
async fn test_spawn_quotes_arguments() {
    let channel = sh(Duration::from_secs(5));

    let process = channel
        .spawn("echo", &["it's one arg".to_string(), "$HOME".to_string()])
        .await
        .unwrap();
    let exit = process.await_exit().await.unwrap();
    assert!(exit.success());
    assert_eq!(exit.stdout, "it's one arg $HOME\n");
}

#[tokio::test]
async fn test_spawn_detached_returns_before_work_finishes() {
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("partial");
    let marker = dir.path().join("done");
    let channel = sh(Duration::from_secs(5));

    let started = std::time::Instant::now();
    channel
        .spawn_detached(&format!(
            "sleep 1; echo ok > {0} && mv {0} {1}",
            quote_path(&scratch),
            quote_path(&marker)
        ))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    for _ in 0..100 {
        if marker.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "ok\n");
}
