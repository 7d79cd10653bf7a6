//! Integration tests for pactwire.
//!
//! Sessions run over `tokio::io::duplex`. Where the test needs control over
//! the peer's timing, the peer is a hand-driven fake built from the public
//! frame types.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use pactwire::codec::{Codec, CodecRegistry, TypeDescriptor, Value};
use pactwire::contract::Contract;
use pactwire::error::{DispatchError, DispatchErrorKind, TransportError};
use pactwire::protocol::{
    CallOutcome, CallRequest, CallResponse, Frame, HandshakeRequest, HandshakeResponse,
};
use pactwire::{Dispatcher, FrameReader, Invoker, RpcError, SessionConfig};
use tokio::io::{
    split, AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, ReadHalf, WriteHalf,
};
use tokio::sync::{oneshot, Notify};

fn registry() -> Arc<CodecRegistry> {
    Arc::new(CodecRegistry::with_primitives())
}

fn math_contract() -> Arc<Contract> {
    Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(i64,), i64>("factorial")
            .unwrap()
            .with_typed_operation::<(i64, i64), i64>("divide")
            .unwrap()
            .with_typed_operation::<(), ()>("unimplemented")
            .unwrap(),
    )
}

fn factorial(n: i64) -> Result<i64, DispatchError> {
    if n < 0 {
        return Err("factorial of a negative number".into());
    }
    Ok((1..=n).product())
}

fn math_dispatcher(contract: Arc<Contract>) -> Dispatcher {
    Dispatcher::builder(contract)
        .handle_sync("factorial", |(n,): (i64,)| factorial(n))
        .handle_sync("divide", |(a, b): (i64, i64)| {
            if b == 0 {
                return Err(DispatchError::handler_failure("division by zero"));
            }
            Ok(a / b)
        })
        .build()
        .unwrap()
}

/// Start a dispatcher on one end of a duplex pipe and connect an invoker to
/// the other.
async fn connected(dispatcher: Dispatcher, contract: Arc<Contract>) -> Invoker {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { dispatcher.serve(server_io).await });
    Invoker::builder(contract).connect(client_io).await.unwrap()
}

/// Fake dispatcher: answer the handshake as compatible and hand back the halves.
async fn fake_server(
    io: DuplexStream,
) -> (FrameReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>) {
    let (read_half, mut write_half) = split(io);
    let mut reader = FrameReader::new(read_half, &SessionConfig::default());

    match reader.next().await.unwrap() {
        Some(Frame::HandshakeRequest(_)) => {}
        other => panic!("expected handshake request, got {:?}", other),
    }
    let response = Frame::HandshakeResponse(HandshakeResponse::Compatible);
    write_half.write_all(&response.encode()).await.unwrap();

    (reader, write_half)
}

async fn next_call(reader: &mut FrameReader<ReadHalf<DuplexStream>>) -> CallRequest {
    match reader.next().await.unwrap() {
        Some(Frame::CallRequest(request)) => request,
        other => panic!("expected call request, got {:?}", other),
    }
}

fn int_response(id: u64, value: i64) -> Bytes {
    let body = Codec::int().encode(&Value::Int(value)).unwrap();
    Frame::CallResponse(CallResponse::success(id, body)).encode()
}

fn decode_int_arg(request: &CallRequest) -> i64 {
    let codec = Codec::tuple([Codec::int()]);
    match codec.decode_exact(&request.args).unwrap() {
        Value::Tuple(items) => match items[0] {
            Value::Int(n) => n,
            ref other => panic!("unexpected {:?}", other),
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_factorial_end_to_end() {
    let contract = math_contract();
    let invoker = connected(math_dispatcher(contract.clone()), contract).await;

    let result: i64 = invoker.call_typed("factorial", (5i64,)).await.unwrap();
    assert_eq!(result, 120);

    let raw = invoker.call("factorial", vec![Value::Int(3)]).await.unwrap();
    assert_eq!(raw, Value::Int(6));
    assert_eq!(invoker.pending_calls(), 0);
}

#[tokio::test]
async fn test_handshake_mismatch_reports_missing_operation() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    // Server has `factorial`, but over strings
    let server_contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(String,), i64>("factorial")
            .unwrap(),
    );
    let dispatcher = Dispatcher::builder(server_contract)
        .handle_sync("factorial", move |(s,): (String,)| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(s.len() as i64)
        })
        .build()
        .unwrap();

    let client_contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(i64,), i64>("factorial")
            .unwrap(),
    );

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(async move { dispatcher.serve(server_io).await });

    let err = Invoker::builder(client_contract.clone())
        .connect(client_io)
        .await
        .unwrap_err();

    match err {
        RpcError::ProtocolMismatch { missing } => {
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].name, "factorial");
            assert_eq!(
                missing[0].signature,
                client_contract.operation("factorial").unwrap().signature()
            );
        }
        other => panic!("expected protocol mismatch, got {:?}", other),
    }

    let server_result = server.await.unwrap();
    assert!(matches!(server_result, Err(RpcError::ProtocolMismatch { .. })));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handshake_mismatch_against_square_only_server() {
    let server_contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(i64,), i64>("square")
            .unwrap(),
    );
    let dispatcher = Dispatcher::builder(server_contract)
        .handle_sync("square", |(n,): (i64,)| Ok(n * n))
        .build()
        .unwrap();

    let client_contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(i64,), i64>("factorial")
            .unwrap(),
    );

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { dispatcher.serve(server_io).await });

    match Invoker::builder(client_contract).connect(client_io).await {
        Err(RpcError::ProtocolMismatch { missing }) => {
            let names: Vec<&str> = missing.iter().map(|op| op.name.as_str()).collect();
            assert_eq!(names, vec!["factorial"]);
        }
        other => panic!("expected protocol mismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_subset_contract_is_accepted() {
    let client_contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(i64,), i64>("factorial")
            .unwrap(),
    );
    let invoker = connected(math_dispatcher(math_contract()), client_contract).await;

    let result: i64 = invoker.call_typed("factorial", (4i64,)).await.unwrap();
    assert_eq!(result, 24);
}

#[tokio::test]
async fn test_concurrent_calls_answered_in_reverse_order() {
    const CALLS: usize = 16;

    let contract = math_contract();
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = fake_server(server_io).await;
        let mut requests = Vec::new();
        for _ in 0..CALLS {
            requests.push(next_call(&mut reader).await);
        }
        for request in requests.iter().rev() {
            let n = decode_int_arg(request);
            writer
                .write_all(&int_response(request.correlation_id, n * 10))
                .await
                .unwrap();
        }
        // Keep the stream open until the client is done
        let _ = reader.next().await;
    });

    let invoker = Arc::new(Invoker::builder(contract).connect(client_io).await.unwrap());

    let mut handles = Vec::new();
    for n in 0..CALLS as i64 {
        let invoker = invoker.clone();
        handles.push(tokio::spawn(async move {
            let result: i64 = invoker.call_typed("factorial", (n,)).await.unwrap();
            (n, result)
        }));
    }

    for handle in handles {
        let (n, result) = handle.await.unwrap();
        assert_eq!(result, n * 10);
    }
    assert_eq!(invoker.pending_calls(), 0);

    invoker.close();
    server.await.unwrap();
}

#[tokio::test]
async fn test_timed_out_call_is_cleaned_up_and_late_response_discarded() {
    let contract = math_contract();
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (timed_out_tx, timed_out_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = fake_server(server_io).await;

        let slow = next_call(&mut reader).await;
        timed_out_rx.await.unwrap();
        writer
            .write_all(&int_response(slow.correlation_id, -1))
            .await
            .unwrap();

        let next = next_call(&mut reader).await;
        writer
            .write_all(&int_response(next.correlation_id, 720))
            .await
            .unwrap();
        let _ = reader.next().await;
    });

    let invoker = Invoker::builder(contract).connect(client_io).await.unwrap();

    let err = invoker
        .call_with_timeout("factorial", vec![Value::Int(6)], Duration::from_millis(50))
        .await
        .unwrap_err();
    match err {
        RpcError::Timeout { operation, after } => {
            assert_eq!(operation, "factorial");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(invoker.pending_calls(), 0);

    timed_out_tx.send(()).unwrap();

    let result = invoker.call("factorial", vec![Value::Int(6)]).await.unwrap();
    assert_eq!(result, Value::Int(720));
    assert!(!invoker.is_closed());

    invoker.close();
    server.await.unwrap();
}

#[tokio::test]
async fn test_per_call_failures_keep_session_open() {
    let contract = math_contract();
    let invoker = connected(math_dispatcher(contract.clone()), contract).await;

    // Declared, but no handler registered
    match invoker.call("unimplemented", vec![]).await.unwrap_err() {
        RpcError::Dispatch(err) => assert_eq!(err.kind, DispatchErrorKind::UnknownOperation),
        other => panic!("unexpected {:?}", other),
    }

    match invoker.call_typed::<_, i64>("divide", (1i64, 0i64)).await.unwrap_err() {
        RpcError::Dispatch(err) => {
            assert_eq!(err.kind, DispatchErrorKind::HandlerFailure);
            assert_eq!(err.message, "division by zero");
        }
        other => panic!("unexpected {:?}", other),
    }

    let result: i64 = invoker.call_typed("divide", (9i64, 3i64)).await.unwrap();
    assert_eq!(result, 3);
}

#[tokio::test]
async fn test_undeclared_operation_fails_locally() {
    let contract = math_contract();
    let invoker = connected(math_dispatcher(contract.clone()), contract).await;

    let err = invoker.call("cube", vec![Value::Int(2)]).await.unwrap_err();
    assert!(matches!(err, RpcError::UnknownOperation(name) if name == "cube"));

    // Wrong argument shape never leaves the process
    let err = invoker
        .call("factorial", vec![Value::String("5".into())])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Codec(_)));
    assert_eq!(invoker.pending_calls(), 0);
}

#[tokio::test]
async fn test_handler_panic_becomes_handler_failure() {
    let contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(i64,), i64>("explode")
            .unwrap()
            .with_typed_operation::<(i64,), i64>("echo")
            .unwrap(),
    );
    let dispatcher = Dispatcher::builder(contract.clone())
        .handle_sync("explode", |(_n,): (i64,)| -> Result<i64, DispatchError> {
            panic!("handler blew up")
        })
        .handle("echo", |(n,): (i64,), _ctx| async move {
            Ok::<_, DispatchError>(n)
        })
        .build()
        .unwrap();
    let invoker = connected(dispatcher, contract).await;

    match invoker.call("explode", vec![Value::Int(1)]).await.unwrap_err() {
        RpcError::Dispatch(err) => {
            assert_eq!(err.kind, DispatchErrorKind::HandlerFailure);
            assert!(err.message.contains("handler blew up"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let result: i64 = invoker.call_typed("echo", (7i64,)).await.unwrap();
    assert_eq!(result, 7);
}

#[tokio::test]
async fn test_overloaded_when_handler_capacity_reached() {
    let contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(), ()>("block")
            .unwrap(),
    );
    let release = Arc::new(Notify::new());
    let entered = Arc::new(Notify::new());
    let (release_h, entered_h) = (release.clone(), entered.clone());

    let dispatcher = Dispatcher::builder(contract.clone())
        .max_concurrent_handlers(1)
        .handle("block", move |(): (), _ctx| {
            let release = release_h.clone();
            let entered = entered_h.clone();
            async move {
                entered.notify_one();
                release.notified().await;
                Ok::<_, DispatchError>(())
            }
        })
        .build()
        .unwrap();
    let invoker = connected(dispatcher, contract).await;

    let first = invoker.start_call("block", vec![]).await.unwrap();
    entered.notified().await;

    match invoker.call("block", vec![]).await.unwrap_err() {
        RpcError::Dispatch(err) => assert_eq!(err.kind, DispatchErrorKind::Overloaded),
        other => panic!("unexpected {:?}", other),
    }

    release.notify_one();
    assert_eq!(first.wait().await.unwrap(), Value::Unit);
}

#[tokio::test]
async fn test_cancel_removes_pending_call() {
    let contract = math_contract();
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let server = tokio::spawn(async move {
        let (mut reader, _writer) = fake_server(server_io).await;
        // Never answer
        while let Ok(Some(_)) = reader.next().await {}
    });

    let invoker = Invoker::builder(contract).connect(client_io).await.unwrap();

    let dropped = invoker.start_call("factorial", vec![Value::Int(1)]).await.unwrap();
    assert_eq!(invoker.pending_calls(), 1);
    dropped.cancel();
    assert_eq!(invoker.pending_calls(), 0);

    let pending = invoker.start_call("factorial", vec![Value::Int(2)]).await.unwrap();
    let id = pending.id();
    assert!(invoker.cancel(id));
    assert!(!invoker.cancel(id));
    assert!(matches!(pending.wait().await, Err(RpcError::Cancelled)));

    invoker.close();
    server.await.unwrap();
}

#[tokio::test]
async fn test_teardown_fails_every_pending_call() {
    let contract = math_contract();
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let server = tokio::spawn(async move {
        let (mut reader, writer) = fake_server(server_io).await;
        next_call(&mut reader).await;
        next_call(&mut reader).await;
        drop((reader, writer));
    });

    let invoker = Invoker::builder(contract).connect(client_io).await.unwrap();

    let a = invoker.start_call("factorial", vec![Value::Int(1)]).await.unwrap();
    let b = invoker.start_call("factorial", vec![Value::Int(2)]).await.unwrap();
    server.await.unwrap();

    for pending in [a, b] {
        assert!(matches!(
            pending.wait().await,
            Err(RpcError::Transport(TransportError::Closed))
        ));
    }
    assert!(invoker.is_closed());

    let err = invoker.call("factorial", vec![Value::Int(3)]).await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(TransportError::Closed)));
}

/// Stream whose writes start failing once `broken` is set; reads keep working.
struct BreakableStream {
    inner: DuplexStream,
    broken: Arc<AtomicBool>,
}

impl AsyncRead for BreakableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for BreakableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[tokio::test]
async fn test_write_failure_fails_calls_without_waiting_for_deadline() {
    let contract = math_contract();
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let broken = Arc::new(AtomicBool::new(false));
    let stream = BreakableStream {
        inner: client_io,
        broken: broken.clone(),
    };

    // The peer stays connected, so only the local write side fails
    let (done_tx, done_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let peer = fake_server(server_io).await;
        let _ = done_rx.await;
        drop(peer);
    });

    let invoker = Invoker::builder(contract)
        .call_timeout(Duration::from_secs(30))
        .connect(stream)
        .await
        .unwrap();
    broken.store(true, Ordering::SeqCst);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        invoker.call("factorial", vec![Value::Int(3)]),
    )
    .await
    .expect("call should fail as soon as the write fails");
    assert!(
        matches!(result, Err(RpcError::Transport(_))),
        "unexpected {:?}",
        result
    );
    assert!(invoker.is_closed());
    assert_eq!(invoker.pending_calls(), 0);

    let err = invoker.call("factorial", vec![Value::Int(4)]).await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));
    let _ = done_tx.send(());
}

#[tokio::test]
async fn test_oversized_frames_fail_only_their_call() {
    let contract = Arc::new(
        Contract::empty(registry())
            .with_typed_operation::<(u64,), Bytes>("blob")
            .unwrap()
            .with_typed_operation::<(Bytes,), u64>("measure")
            .unwrap(),
    );
    let release = Arc::new(Notify::new());
    let entered = Arc::new(Notify::new());
    let (release_h, entered_h) = (release.clone(), entered.clone());

    let dispatcher = Dispatcher::builder(contract.clone())
        .config(SessionConfig::default().max_frame_size(1024))
        .handle_sync("blob", |(n,): (u64,)| Ok(Bytes::from(vec![7u8; n as usize])))
        .handle("measure", move |(data,): (Bytes,), _ctx| {
            let release = release_h.clone();
            let entered = entered_h.clone();
            async move {
                entered.notify_one();
                release.notified().await;
                Ok::<_, DispatchError>(data.len() as u64)
            }
        })
        .build()
        .unwrap();

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { dispatcher.serve(server_io).await });
    let invoker = Invoker::builder(contract)
        .max_frame_size(1024)
        .connect(client_io)
        .await
        .unwrap();

    // An unrelated call stays in flight throughout
    let slow = invoker
        .start_call("measure", vec![Value::Bytes(Bytes::from_static(b"abc"))])
        .await
        .unwrap();
    entered.notified().await;

    // Result too large for the dispatcher's frame limit
    match invoker.call("blob", vec![Value::UInt(4096)]).await.unwrap_err() {
        RpcError::Dispatch(err) => {
            assert_eq!(err.kind, DispatchErrorKind::HandlerFailure);
            assert!(err.message.contains("exceeds max frame size"), "{}", err.message);
        }
        other => panic!("unexpected {:?}", other),
    }

    // Arguments too large for the invoker's frame limit never leave the process
    let err = invoker
        .call("measure", vec![Value::Bytes(Bytes::from(vec![0u8; 4096]))])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::FrameTooLarge { max: 1024, .. }), "{:?}", err);
    assert_eq!(invoker.pending_calls(), 1);

    let small: Bytes = invoker.call_typed("blob", (16u64,)).await.unwrap();
    assert_eq!(small.len(), 16);

    release.notify_one();
    assert_eq!(slow.wait().await.unwrap(), Value::UInt(3));
    assert!(!invoker.is_closed());
}

#[tokio::test]
async fn test_stalled_peer_ends_dispatcher_session() {
    let contract = math_contract();
    let mut config = SessionConfig::default();
    config.writer.max_pending_frames = 1;
    config.writer.backpressure_timeout = Duration::from_millis(10);
    let dispatcher = Dispatcher::builder(contract.clone())
        .config(config)
        .build()
        .unwrap();

    // Small pipe, and the peer never reads its responses
    let (client_io, server_io) = tokio::io::duplex(64);
    let server = tokio::spawn(async move { dispatcher.serve(server_io).await });

    let (_client_read, mut client_write) = split(client_io);
    tokio::spawn(async move {
        let handshake = Frame::HandshakeRequest(HandshakeRequest::for_contract(&contract));
        client_write.write_all(&handshake.encode()).await?;
        for id in 1..=16u64 {
            let request = Frame::CallRequest(CallRequest {
                correlation_id: id,
                operation: "cube".to_string(),
                signature: contract.signature(),
                args: Bytes::new(),
            });
            client_write.write_all(&request.encode()).await?;
        }
        Ok::<_, io::Error>(client_write)
    });

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("dispatcher should give up on a stalled peer")
        .unwrap();
    assert!(matches!(result, Err(RpcError::BackpressureTimeout)), "{:?}", result);
}

#[tokio::test]
async fn test_call_before_handshake_closes_session() {
    let contract = math_contract();
    let dispatcher = math_dispatcher(contract.clone());
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(async move { dispatcher.serve(server_io).await });

    let (read_half, mut write_half) = split(client_io);
    let op = contract.operation("factorial").unwrap();
    let request = Frame::CallRequest(CallRequest {
        correlation_id: 1,
        operation: "factorial".into(),
        signature: op.signature(),
        args: op.args_codec().encode(&Value::Tuple(vec![Value::Int(5)])).unwrap(),
    });
    write_half.write_all(&request.encode()).await.unwrap();

    let result = server.await.unwrap();
    assert!(matches!(result, Err(RpcError::Protocol(_))));

    // Nothing was answered; the stream just closes
    let mut reader = FrameReader::new(read_half, &SessionConfig::default());
    assert_eq!(reader.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_handshake_timeout() {
    let dispatcher = Dispatcher::builder(math_contract())
        .handshake_timeout(Duration::from_millis(30))
        .build()
        .unwrap();
    let (_client_io, server_io) = tokio::io::duplex(1024);

    let err = dispatcher.serve(server_io).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }));
}

#[tokio::test]
async fn test_fragmented_frames_reassemble() {
    let contract = math_contract();
    let dispatcher = math_dispatcher(contract.clone());
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { dispatcher.serve(server_io).await });

    let (read_half, mut write_half) = split(client_io);
    let op = contract.operation("factorial").unwrap();

    let mut bytes = Frame::HandshakeRequest(HandshakeRequest::for_contract(&contract))
        .encode()
        .to_vec();
    for (id, signature) in [(1, op.signature()), (2, contract.signature())] {
        let request = Frame::CallRequest(CallRequest {
            correlation_id: id,
            operation: "factorial".into(),
            signature,
            args: op.args_codec().encode(&Value::Tuple(vec![Value::Int(5)])).unwrap(),
        });
        bytes.extend_from_slice(&request.encode());
    }

    for byte in bytes {
        write_half.write_all(&[byte]).await.unwrap();
        write_half.flush().await.unwrap();
    }

    let mut reader = FrameReader::new(read_half, &SessionConfig::default());
    assert_eq!(
        reader.next().await.unwrap(),
        Some(Frame::HandshakeResponse(HandshakeResponse::Compatible))
    );

    let mut responses = Vec::new();
    for _ in 0..2 {
        match reader.next().await.unwrap() {
            Some(Frame::CallResponse(response)) => responses.push(response),
            other => panic!("unexpected {:?}", other),
        }
    }
    responses.sort_by_key(|r| r.correlation_id);

    assert_eq!(
        responses[0].outcome,
        CallOutcome::Success(Codec::int().encode(&Value::Int(120)).unwrap())
    );
    match &responses[1].outcome {
        CallOutcome::Failure(err) => assert_eq!(err.kind, DispatchErrorKind::SignatureMismatch),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_composite_types_end_to_end() {
    let contract = Arc::new(
        Contract::empty(registry())
            .with_operation(
                "summarize",
                vec![
                    TypeDescriptor::sequence(TypeDescriptor::Int),
                    TypeDescriptor::optional(TypeDescriptor::String),
                ],
                TypeDescriptor::tuple(vec![TypeDescriptor::Int, TypeDescriptor::String]),
            )
            .unwrap(),
    );
    let dispatcher = Dispatcher::builder(contract.clone())
        .handle_sync("summarize", |(items, label): (Vec<i64>, Option<String>)| {
            Ok((items.iter().sum::<i64>(), label.unwrap_or_else(|| "total".into())))
        })
        .build()
        .unwrap();
    let invoker = connected(dispatcher, contract).await;

    let (sum, label): (i64, String) = invoker
        .call_typed("summarize", (vec![1i64, 2, 3], None::<String>))
        .await
        .unwrap();
    assert_eq!(sum, 6);
    assert_eq!(label, "total");
}

#[cfg(unix)]
#[tokio::test]
async fn test_factorial_over_unix_socket() {
    use pactwire::transport::{connect, generate_socket_path, SocketListener};

    let contract = math_contract();
    let dispatcher = math_dispatcher(contract.clone());

    let path = generate_socket_path();
    let listener = SocketListener::bind(&path).await.unwrap();
    let server = tokio::spawn(async move {
        let stream = listener.accept().await.unwrap();
        dispatcher.serve(stream).await
    });

    let invoker = Invoker::builder(contract)
        .connect(connect(&path).await.unwrap())
        .await
        .unwrap();
    let result: i64 = invoker.call_typed("factorial", (10i64,)).await.unwrap();
    assert_eq!(result, 3_628_800);

    invoker.close();
    drop(invoker);
    assert!(server.await.unwrap().is_ok());
}

#[test]
fn test_session_config_from_json_drives_invoker() {
    let config = SessionConfig::from_json(r#"{ "call_timeout_ms": 75 }"#).unwrap();
    assert_eq!(config.call_timeout, Duration::from_millis(75));
    let _builder = Invoker::builder(math_contract()).config(config);
}
