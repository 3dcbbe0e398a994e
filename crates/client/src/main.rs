//! chatsync client - command-line entry point
//!
//! Signs in with `CHATSYNC_TOKEN`, loads the conversation list, connects the
//! realtime channel and logs every change. Pass a conversation id to open it.

use anyhow::Context;
use chatsync_client::{logging, log_info, log_warn, ClientConfig, SessionContext, SyncEvent};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = ClientConfig::from_env()?;
    let credential = std::env::var("CHATSYNC_TOKEN").context("CHATSYNC_TOKEN must be set")?;

    let ctx = SessionContext::from_config(&config, &credential);
    let mut events = ctx.subscribe();

    ctx.registry().fetch_all().await?;
    ctx.connect(&credential).await;

    if let Some(chat_id) = std::env::args().nth(1) {
        ctx.session().select(&chat_id).await?;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SyncEvent::ConversationsChanged) => {
                    let order: Vec<String> = ctx
                        .registry()
                        .conversations()
                        .into_iter()
                        .map(|c| c.id)
                        .collect();
                    log_info!("conversations: {:?}", order);
                }
                Ok(SyncEvent::MessagesChanged { chat_id }) => {
                    if let Some(last) = ctx.session().messages().last() {
                        log_info!("[{}] {}: {}", chat_id, last.sender_id, last.text);
                    }
                }
                Ok(other) => log_info!("{:?}", other),
                Err(RecvError::Lagged(skipped)) => log_warn!("skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    ctx.logout().await;
    Ok(())
}
