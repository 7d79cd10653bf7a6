//! Factorial service - one dispatcher and one invoker over a Unix socket.
//!
//! This demo shows:
//! - Declaring a contract shared by both roles
//! - Registering a typed handler on the dispatcher
//! - Connecting an invoker, which checks the contract in the handshake
//! - Printing the contract manifest for out-of-process peers
//!
//! ```text
//! RUST_LOG=pactwire=debug cargo run --example factorial -- 10
//! ```

use std::sync::Arc;

use pactwire::codec::CodecRegistry;
use pactwire::contract::Contract;
use pactwire::error::DispatchError;
use pactwire::{Dispatcher, Invoker};

fn factorial(n: i64) -> Result<i64, DispatchError> {
    if n < 0 {
        return Err(DispatchError::invalid_arguments("n must be non-negative"));
    }
    (1..=n)
        .try_fold(1i64, |acc, k| acc.checked_mul(k))
        .ok_or_else(|| DispatchError::handler_failure(format!("{}! overflows i64", n)))
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use pactwire::transport::{connect, generate_socket_path, SocketListener};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let n: i64 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(5);

    let contract = Arc::new(
        Contract::empty(Arc::new(CodecRegistry::with_primitives()))
            .with_typed_operation::<(i64,), i64>("factorial")?,
    );
    println!("{}", contract.manifest_json()?);

    let dispatcher = Dispatcher::builder(contract.clone())
        .handle_sync("factorial", |(n,): (i64,)| factorial(n))
        .build()?;

    let path = generate_socket_path();
    let listener = SocketListener::bind(&path).await?;
    let server = tokio::spawn(async move {
        let stream = listener.accept().await?;
        dispatcher.serve(stream).await
    });

    let invoker = Invoker::builder(contract)
        .connect(connect(&path).await?)
        .await?;

    match invoker.call_typed::<_, i64>("factorial", (n,)).await {
        Ok(result) => println!("factorial({}) = {}", n, result),
        Err(e) => println!("factorial({}) failed: {}", n, e),
    }

    // Closing the invoker ends the session; the dispatcher sees EOF
    drop(invoker);
    server.await??;

    Ok(())
}

#[cfg(not(unix))]
fn main() {
    let _ = factorial;
    eprintln!("this demo needs Unix domain sockets");
}
