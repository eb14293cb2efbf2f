//! Integration tests against real child processes, covering the end-to-end
//! scenarios this crate is built around: spawn-and-collect, timeout-kills,
//! line-oriented consumption, partial consumption, large-volume piping, and
//! attach-and-signal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use procweave::command::{AttachedCommand, Command, IoCommand, PipedCommand, ProcessCommand};
use procweave::options::CommandOptions;
use procweave::redirect::RedirectSink;
use tokio_util::sync::CancellationToken;

fn argv(words: &[&str]) -> Vec<String> {
    words.iter().map(|s| s.to_string()).collect()
}

fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("procweave=debug"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

#[tokio::test]
async fn echo_then_cat_round_trips_stdout_to_completion() {
    init_tracing();
    let mut cmd = ProcessCommand::spawn(argv(&["echo", "hello from procweave"]), CommandOptions::default())
        .unwrap();
    let stdout = cmd.take_stdout().unwrap();
    let cancel = CancellationToken::new();
    let mut buf = [0u8; 128];
    let n = stdout.read(&mut buf, None, &cancel).await.unwrap();
    assert_eq!(&buf[..n], b"hello from procweave\n");
    let result = cmd.wait().await.unwrap();
    assert!(result.success);
    assert_eq!(result.exit_code.raw(), 0);
}

#[tokio::test]
async fn timeout_kills_a_long_sleep() {
    init_tracing();
    let options = CommandOptions {
        timeout: Some(Duration::from_millis(100)),
        ..CommandOptions::default()
    };
    let cmd = ProcessCommand::spawn(argv(&["sleep", "30"]), options).unwrap();
    let start = std::time::Instant::now();
    let err = cmd.wait().await.unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, procweave::error::CommandError::Timeout));
}

#[tokio::test]
async fn cancellation_token_kills_a_running_process() {
    init_tracing();
    let cancel = CancellationToken::new();
    let options = CommandOptions {
        cancellation_token: Some(cancel.clone()),
        ..CommandOptions::default()
    };
    let cmd = ProcessCommand::spawn(argv(&["sleep", "30"]), options).unwrap();
    let wait_fut = cmd.wait();
    let cancel_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let err = wait_fut.await.unwrap_err();
    assert!(matches!(err, procweave::error::CommandError::Cancelled));
    cancel_task.await.unwrap();
}

#[tokio::test]
async fn kill_on_one_command_does_not_cancel_a_shared_external_token() {
    init_tracing();
    // Several commands sharing one batch-cancel token is the normal way to
    // group-cancel them; calling `.kill()` on just one must not cancel the
    // shared token itself, or every other command sharing it would die too.
    let shared = CancellationToken::new();
    let options = CommandOptions {
        cancellation_token: Some(shared.clone()),
        ..CommandOptions::default()
    };
    let victim = ProcessCommand::spawn(argv(&["sleep", "30"]), options).unwrap();
    victim.kill();
    let err = tokio::time::timeout(Duration::from_secs(5), victim.wait())
        .await
        .expect("killed command exits promptly")
        .unwrap_err();
    assert!(matches!(err, procweave::error::CommandError::Cancelled));
    assert!(
        !shared.is_cancelled(),
        "kill() must not cancel a caller-owned, externally-shared token"
    );
}

#[tokio::test]
async fn throw_on_error_surfaces_nonzero_exit_as_error() {
    init_tracing();
    let options = CommandOptions {
        throw_on_error: true,
        ..CommandOptions::default()
    };
    let cmd = ProcessCommand::spawn(argv(&["false"]), options).unwrap();
    let err = cmd.wait().await.unwrap_err();
    match err {
        procweave::error::CommandError::ErrorExitCode { exit_code, .. } => assert_eq!(exit_code, 1),
        other => panic!("expected ErrorExitCode, got {other:?}"),
    }
}

#[tokio::test]
async fn line_oriented_consumption_of_multiline_output() {
    init_tracing();
    let mut cmd = ProcessCommand::spawn(
        argv(&["printf", "one\ntwo\nthree\n"]),
        CommandOptions::default(),
    )
    .unwrap();
    let stdout = cmd.take_stdout().unwrap();
    let mut reader = procweave::drainer::PipeLineReader::new(stdout);
    let mut lines = Vec::new();
    while let Some(line) = reader.read_line().await.unwrap() {
        lines.push(line);
    }
    assert_eq!(lines, vec!["one", "two", "three"]);
    cmd.wait().await.unwrap();
}

#[tokio::test]
async fn head_only_partially_consumes_a_chatty_producer() {
    init_tracing();
    // `yes` never terminates on its own; `head -n1` only needs one line and
    // then closes its stdin/exits, so the upstream write into a fixed-length
    // pipe must observe the reader closing rather than hanging forever.
    let mut producer = ProcessCommand::spawn(argv(&["yes", "filler-line"]), CommandOptions::default()).unwrap();
    let stdout = producer.take_stdout().unwrap();
    stdout.set_fixed_length();

    let mut consumer = ProcessCommand::spawn(argv(&["head", "-n", "1"]), CommandOptions::default()).unwrap();
    let mut consumer_stdin = consumer.take_stdin().unwrap();

    let copy_task = tokio::spawn(async move {
        procweave::redirect::copy_pipe_to_stdin(stdout, &mut consumer_stdin).await
    });

    let consumer_stdout = consumer.take_stdout().unwrap();
    let cancel = CancellationToken::new();
    let mut buf = [0u8; 64];
    let n = consumer_stdout.read(&mut buf, None, &cancel).await.unwrap();
    assert_eq!(&buf[..n], b"filler-line\n");

    consumer.wait().await.unwrap();
    // Killing only takes effect once something actually awaits `wait()`,
    // since that's where the kill/timeout race lives.
    producer.kill();
    let (copy_outcome, producer_result) = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join(copy_task, producer.wait()),
    )
    .await
    .expect("producer is killed promptly and the copy task observes EOF");
    copy_outcome.unwrap().unwrap();
    assert!(matches!(
        producer_result,
        Err(procweave::error::CommandError::Cancelled)
    ));
}

#[tokio::test]
async fn large_volume_pipe_to_pipe_delivers_every_byte() {
    init_tracing();
    let producer = ProcessCommand::spawn(
        argv(&["head", "-c", "500000", "/dev/zero"]),
        CommandOptions::default(),
    )
    .unwrap();
    let consumer = ProcessCommand::spawn(argv(&["wc", "-c"]), CommandOptions::default()).unwrap();
    let mut piped = PipedCommand::new(producer, consumer).unwrap();
    let stdout = piped.take_stdout().unwrap();
    let mut reader = procweave::drainer::PipeLineReader::new(stdout);
    let line = reader.read_line().await.unwrap().unwrap();
    assert_eq!(line.trim(), "500000");
    piped.wait().await.unwrap();
}

#[tokio::test]
async fn redirect_stdout_to_a_byte_sink_collects_everything() {
    init_tracing();
    let cmd = ProcessCommand::spawn(argv(&["echo", "redirected"]), CommandOptions::default()).unwrap();
    let sink = Arc::new(Mutex::new(Vec::new()));
    let wrapped = IoCommand::redirect_stdout_to(cmd, RedirectSink::Bytes(sink.clone())).unwrap();
    wrapped.wait().await.unwrap();
    assert_eq!(&*sink.lock().unwrap(), b"redirected\n");
}

#[tokio::test]
async fn attach_and_signal_terminates_an_externally_tracked_process() {
    init_tracing();
    let mut child = tokio::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");
    let pid = child.id().expect("pid");
    let attached = AttachedCommand::attach(pid);
    attached.kill();
    let (attached_result, _) = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join(attached.wait(), child.wait()),
    )
    .await
    .expect("attached command observes exit promptly");
    let result = attached_result.unwrap();
    // `kill()` delivered SIGKILL through this handle, so the aggregate
    // resolves with the signal-exit code rather than a bare success.
    assert_eq!(result.exit_code.raw(), 128 + procweave::signaler::SIGKILL);
    assert!(!result.success);
}
