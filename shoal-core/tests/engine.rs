//! Socket-level tests of the connection engine: dispatch, cooperative
//! scheduling, receive timeouts and the close sequence, all over real TCP.

use std::{
    io::{Read, Write},
    net::TcpStream,
    os::fd::RawFd,
    time::{Duration, Instant},
};

use shoal_core::{
    config::RuntimeConfig,
    dispatcher,
    io::{recv_async, send_async},
    listener::ListenerBuilder,
    runtime::{TaskFuture, WorkerPool},
};

/// Starts an echo server; returns the bound port. The recv timeout makes
/// every test self-terminating even when assertions fail early.
fn start_echo(workers: usize, recv_timeout: Duration) -> u16 {
    let listener = ListenerBuilder::from_port_str("0", 64)
        .unwrap()
        .build()
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = RuntimeConfig {
        workers,
        ..RuntimeConfig::default()
    };
    let mut pool = WorkerPool::spawn(&config, move || {
        move |fd: RawFd| -> TaskFuture {
            Box::pin(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match recv_async(fd, &mut buf, Some(recv_timeout)).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if send_async(fd, &buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        }
    })
    .unwrap();
    std::thread::spawn(move || {
        let _ = dispatcher::run(listener, &mut pool);
    });
    port
}

/// A server that answers `TIMEOUT` once a receive deadline expires.
fn start_timeout_reporter(recv_timeout: Duration) -> u16 {
    let listener = ListenerBuilder::from_port_str("0", 64)
        .unwrap()
        .build()
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = RuntimeConfig {
        workers: 1,
        ..RuntimeConfig::default()
    };
    let mut pool = WorkerPool::spawn(&config, move || {
        move |fd: RawFd| -> TaskFuture {
            Box::pin(async move {
                let mut buf = [0u8; 64];
                if let Err(shoal_core::Error::Timeout) =
                    recv_async(fd, &mut buf, Some(recv_timeout)).await
                {
                    let _ = send_async(fd, b"TIMEOUT").await;
                }
            })
        }
    })
    .unwrap();
    std::thread::spawn(move || {
        let _ = dispatcher::run(listener, &mut pool);
    });
    port
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

#[test]
fn echoes_across_multiple_yield_cycles() {
    let port = start_echo(1, Duration::from_secs(5));
    let mut stream = connect(port);
    for round in 0..8 {
        let msg = format!("ping-{round}");
        stream.write_all(msg.as_bytes()).unwrap();
        let mut buf = vec![0u8; msg.len()];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, msg.as_bytes());
    }
}

#[test]
fn serves_many_connections_across_workers() {
    let port = start_echo(2, Duration::from_secs(5));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            std::thread::spawn(move || {
                let mut stream = connect(port);
                let msg = format!("client-{i}");
                stream.write_all(msg.as_bytes()).unwrap();
                let mut buf = vec![0u8; msg.len()];
                stream.read_exact(&mut buf).unwrap();
                assert_eq!(buf, msg.as_bytes());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn silent_peer_trips_the_receive_deadline() {
    let timeout = Duration::from_millis(300);
    let port = start_timeout_reporter(timeout);
    let mut stream = connect(port);
    let started = Instant::now();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"TIMEOUT");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(250), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "fired late: {elapsed:?}");
}

#[test]
fn half_close_ends_the_task_and_closes_the_fd() {
    let port = start_echo(1, Duration::from_secs(5));
    let mut stream = connect(port);
    stream.write_all(b"final").unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"final");

    // Half-close our side; the task sees a zero-byte read, exits, and the
    // engine's close sequence surfaces as EOF on this end.
    stream.shutdown(std::net::Shutdown::Write).unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn a_stalled_connection_does_not_starve_others() {
    let port = start_echo(1, Duration::from_secs(5));

    // Parked mid-nothing: connected but silent, keeping a task suspended.
    let _idle = connect(port);

    let started = Instant::now();
    let mut stream = connect(port);
    stream.write_all(b"quick").unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"quick");
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "single worker blocked on an idle peer"
    );
}
