//! Socket mode end to end over loopback TCP
//!
//! A fake streaming backend stands in for the rented machine; the remote
//! shell and session directory are in-memory fakes.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use drova_core::error::DirectoryError;
use drova_core::types::SessionStatus;
use drova_orchestrator::{bind_listener, SessionWorkflow, SocketDriver};
use drova_relay::{BLOCK_SIZE, HANDSHAKE_ACK};

use common::{desktop_session, fast_config, RecordingShell, ScriptedDirectory};

/// Accept one connection, read the request, optionally acknowledge and
/// half-close. The task then reports whether the relay closed its side.
async fn fake_backend(acknowledge: bool) -> (String, JoinHandle<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let closed = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; BLOCK_SIZE];
        let _ = stream.read(&mut request).await;
        let reply: &[u8] = if acknowledge { &[0x00, HANDSHAKE_ACK] } else { &[0x00] };
        stream.write_all(reply).await.unwrap();
        stream.shutdown().await.unwrap();

        // A reset counts as closed too
        let mut rest = Vec::new();
        let eof = tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut rest));
        eof.await.is_ok()
    });
    (address, closed)
}

/// Acknowledge every connection and keep it open until the relay closes it;
/// counts accepted connections
async fn holding_backend() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = vec![0u8; BLOCK_SIZE];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(&[0x00, HANDSHAKE_ACK]).await;
                while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
            });
        }
    });
    (address, accepted)
}

async fn start_driver(
    backend: String,
    shell: Arc<RecordingShell>,
    directory: Arc<ScriptedDirectory>,
) -> (String, CancellationToken, JoinHandle<anyhow::Result<()>>) {
    let workflow = SessionWorkflow::new(shell, directory, &fast_config());
    let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let cancel = CancellationToken::new();
    let driver = tokio::spawn(SocketDriver::new(workflow, backend, cancel.clone()).serve(listener));
    (address, cancel, driver)
}

async fn wait_for_command(shell: &RecordingShell, pattern: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while shell.position(pattern).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("`{}` never ran: {:?}", pattern, shell.commands()));
}

#[tokio::test]
async fn test_acknowledged_desktop_session_is_provisioned_and_reverted() {
    let (backend, backend_closed) = fake_backend(true).await;
    let shell = Arc::new(RecordingShell::default());
    let directory = Arc::new(ScriptedDirectory::new(vec![
        // Startup recovery: nothing running
        None,
        // Classification after the handshake
        Some(desktop_session(SessionStatus::Handshake)),
        Some(desktop_session(SessionStatus::Active)),
        Some(desktop_session(SessionStatus::Finished)),
    ]));
    let (front, cancel, driver) = start_driver(backend, shell.clone(), directory).await;

    let mut client = TcpStream::connect(&front).await.unwrap();
    client.write_all(b"stream hello").await.unwrap();

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, [0x00, HANDSHAKE_ACK]);
    drop(client);

    wait_for_command(&shell, "/exit:C /reboot").await;
    assert!(backend_closed.await.unwrap(), "relay left the backend open");
    cancel.cancel();
    driver.await.unwrap().unwrap();

    let commands = shell.commands();
    let enter = shell.position("/enter:C /now").unwrap();
    let kills: Vec<usize> = [
        "EpicGamesLauncher.exe",
        "steam.exe",
        "upc.exe",
        "wgc.exe",
        "/IM explorer.exe",
    ]
    .iter()
    .map(|image| shell.position(image).unwrap())
    .collect();
    let first_reg = shell.position("reg add").unwrap();
    let gpupdate = shell.position("gpupdate").unwrap();
    let shell_restart = shell.position("psexec").unwrap();
    let exit = shell.position("/exit:C /reboot").unwrap();

    assert!(enter < kills[0]);
    assert!(kills.windows(2).all(|w| w[0] < w[1]), "{:?}", commands);
    assert!(kills[4] < first_reg);
    assert!(first_reg < gpupdate && gpupdate < shell_restart);
    assert!(shell_restart < exit);
    assert_eq!(exit, commands.len() - 1);
    assert_eq!(shell.closed(), 1);
}

#[tokio::test]
async fn test_directory_outage_after_handshake_is_retried() {
    let (backend, _) = fake_backend(true).await;
    let shell = Arc::new(RecordingShell::default());
    let directory = Arc::new(ScriptedDirectory::with_answers(vec![
        Ok(None),
        Err(DirectoryError::Status(502)),
        Ok(Some(desktop_session(SessionStatus::Active))),
        Ok(Some(desktop_session(SessionStatus::Finished))),
    ]));
    let (front, cancel, driver) = start_driver(backend, shell.clone(), directory).await;

    let mut client = TcpStream::connect(&front).await.unwrap();
    client.write_all(b"stream hello").await.unwrap();
    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    drop(client);

    wait_for_command(&shell, "/exit:C /reboot").await;
    cancel.cancel();
    driver.await.unwrap().unwrap();

    let enters = shell
        .commands()
        .iter()
        .filter(|c| c.contains("/enter:C"))
        .count();
    assert_eq!(enters, 1);
    assert!(shell.position("/enter:C").unwrap() < shell.position("/exit:C /reboot").unwrap());
}

#[tokio::test]
async fn test_second_client_waits_while_session_is_held() {
    let (backend, accepted) = holding_backend().await;
    let shell = Arc::new(RecordingShell::default());
    let directory = Arc::new(ScriptedDirectory::new(vec![
        None,
        Some(desktop_session(SessionStatus::Active)),
    ]));
    let (front, cancel, driver) = start_driver(backend, shell.clone(), directory.clone()).await;

    let mut first = TcpStream::connect(&front).await.unwrap();
    first.write_all(b"first").await.unwrap();
    let mut ack = [0u8; 2];
    first.read_exact(&mut ack).await.unwrap();
    wait_for_command(&shell, "psexec").await;

    // Queued by the kernel at most; never dialed through while the session runs
    let second = tokio::time::timeout(Duration::from_secs(1), TcpStream::connect(&front)).await;
    if let Ok(Ok(mut second)) = second {
        let _ = second.write_all(b"second").await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(shell.position("/exit:").is_none());

    directory.set_latest(Some(desktop_session(SessionStatus::Finished)));
    wait_for_command(&shell, "/exit:C /reboot").await;
    drop(first);

    cancel.cancel();
    driver.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unacknowledged_connection_is_torn_down() {
    let (backend, backend_closed) = fake_backend(false).await;
    let shell = Arc::new(RecordingShell::default());
    let directory = Arc::new(ScriptedDirectory::new(vec![Some(desktop_session(
        SessionStatus::Finished,
    ))]));
    let (front, cancel, driver) = start_driver(backend, shell.clone(), directory).await;

    let mut client = TcpStream::connect(&front).await.unwrap();
    client.write_all(b"stream hello").await.unwrap();

    let mut reply = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut reply))
        .await
        .expect("client connection was not released");
    if read.is_ok() {
        assert!(!reply.contains(&HANDSHAKE_ACK));
    }
    assert!(backend_closed.await.unwrap(), "relay left the backend open");

    cancel.cancel();
    driver.await.unwrap().unwrap();

    assert!(shell.position("/enter:").is_none());
    assert!(shell.position("/exit:").is_none());
}
