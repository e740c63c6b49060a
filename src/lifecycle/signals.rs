/// Waits for SIGINT or (on unix) SIGTERM and returns which one arrived.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let reason = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("Received SIGINT");
            "sigint"
        },
        _ = async {
            #[cfg(unix)]
            {
                terminate.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::info!("Received SIGTERM");
            "sigterm"
        }
    };

    Ok(reason)
}
