//! Tests for SubscriptionRunner and the signal-file protocol

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shared::OperationFailure;

use super::common::{scripted_channel, test_config};
use crate::services::subscription::SubscriptionRunner;
use crate::traits::CommandResult;

const SIGNAL: &str = "'/data/adb/modules/netproxy/config/.sub_status'";

/// Signal file that reads empty for `pending` polls, then `value`
fn signal_script(pending: usize, value: &'static str) -> impl Fn(&str) -> CommandResult + Send + Sync + 'static {
    let reads = AtomicUsize::new(0);
    move |command| {
        if command.starts_with("cat") && reads.fetch_add(1, Ordering::SeqCst) >= pending {
            return CommandResult::ok(format!("{value}\n"));
        }
        CommandResult::ok("\n")
    }
}

#[tokio::test(start_paused = true)]
async fn test_add_completes_through_signal_file() {
    let (channel, log) = scripted_channel(signal_script(2, "success"));
    let runner = SubscriptionRunner::new(Arc::new(channel), &test_config());

    let result = runner.add("Hong Kong", "https://example.org/sub?token=a'b").await.unwrap();
    assert!(result.success, "{result:?}");

    let commands = log.all();
    assert_eq!(commands[0], format!("rm -f {SIGNAL}"));
    assert_eq!(
        commands[1],
        format!(
            "sh '/data/adb/modules/netproxy/scripts/config/subscription.sh' add 'Hong Kong' \
             'https://example.org/sub?token=a'\\''b' && echo success > {SIGNAL} || echo fail > {SIGNAL}"
        )
    );
    assert_eq!(log.matching("cat ").len(), 3);
    // consumed after the terminal read
    assert_eq!(commands.last().unwrap(), &format!("rm -f {SIGNAL}"));
}

#[tokio::test(start_paused = true)]
async fn test_update_failure_signal() {
    let (channel, _log) = scripted_channel(signal_script(0, "fail"));
    let runner = SubscriptionRunner::new(Arc::new(channel), &test_config());

    let result = runner.update("jp").await.unwrap();
    assert!(!result.success);
    assert!(matches!(result.error, Some(OperationFailure::Failed { ref message }) if message.contains("'jp'")));
}

#[tokio::test(start_paused = true)]
async fn test_missing_signal_times_out() {
    let (channel, log) = scripted_channel(|_| CommandResult::ok(""));
    let runner = SubscriptionRunner::new(Arc::new(channel), &test_config());

    let result = runner.update("jp").await.unwrap();
    assert!(result.is_timed_out());
    // 60 s budget polled every 500 ms
    assert_eq!(log.matching("cat ").len(), 120);
}

#[tokio::test]
async fn test_remove_reports_script_error() {
    let (channel, log) = scripted_channel(|_| CommandResult::new(1, "", "subscription not found\n"));
    let runner = SubscriptionRunner::new(Arc::new(channel), &test_config());

    let result = runner.remove("gone").await.unwrap();
    assert!(!result.success);
    assert_eq!(
        result.error,
        Some(OperationFailure::Failed {
            message: "subscription not found".to_string()
        })
    );
    assert_eq!(
        log.all(),
        vec!["sh '/data/adb/modules/netproxy/scripts/config/subscription.sh' remove 'gone'"]
    );
}

#[tokio::test]
async fn test_list_parses_one_round_trip() {
    let (channel, log) = scripted_channel(|_| {
        CommandResult::ok("===SUB:sub_hk===\n4\n{\"name\":\"HK\",\"url\":\"https://e.org/s\"}\n")
    });
    let runner = SubscriptionRunner::new(Arc::new(channel), &test_config());

    let subs = runner.list().await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].name, "HK");
    assert_eq!(subs[0].node_count, 4);
    assert_eq!(log.all().len(), 1);
}
