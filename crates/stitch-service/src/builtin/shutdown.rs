use std::future::pending;

use tokio::io::AsyncReadExt;

/// Resolves on Ctrl-C, SIGTERM, or (with `watch_stdin`) when stdin closes.
pub(crate) async fn shutdown_signal(watch_stdin: bool) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = pending::<()>();

    let stdin_closed = async {
        if !watch_stdin {
            return pending::<()>().await;
        }
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        while let Ok(read) = stdin.read(&mut buf).await {
            if read == 0 {
                break;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::debug!("received Ctrl-C"),
        _ = terminate => tracing::debug!("received SIGTERM"),
        _ = stdin_closed => tracing::debug!("stdin closed"),
    }
}
