use std::io::Write;

use tabletop_groups::config::SessionConfig;
use tabletop_groups::replay::replay;
use tabletop_groups::session::GroupSession;
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = SessionConfig::from_env();
    let (mut session, mut outbound) = GroupSession::new(&config);

    // Log what a live session would send upstream.
    let forwarder = tokio::spawn(async move {
        let mut sent = 0usize;
        while let Some(frame) = outbound.recv().await {
            info!(syscall = %frame.syscall, id = %frame.id, "outbound frame");
            sent += 1;
        }
        sent
    });

    let replayed = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path).await?;
            replay(&mut session, BufReader::new(file)).await
        }
        None => replay(&mut session, BufReader::new(tokio::io::stdin())).await,
    };

    let snapshot = serde_json::to_string_pretty(&session.snapshot())?;
    writeln!(std::io::stdout().lock(), "{snapshot}")?;

    session.close();
    drop(session);
    let sent = forwarder.await.unwrap_or_default();
    info!(replayed, sent, "replay finished");
    Ok(())
}
