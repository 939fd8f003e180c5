//! Follow article changes.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use insights_model::{tables, Article};
use insights_realtime::{ChangeEvent, ChangeHandler, ChangeKind, ChannelSpec};
use insights_store::{AppContext, Backend};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

const WATCH_CHANNEL: &str = "cli-watch";

/// Print article change events until Ctrl-C.
pub async fn watch(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    ctx.articles.fetch_articles(false).await;
    ctx.watch_articles()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler: ChangeHandler = Arc::new(move |event: ChangeEvent| {
        let _ = tx.send(event);
    });
    let subscription = ctx
        .feed
        .subscribe(ChannelSpec::table(WATCH_CHANNEL, tables::ARTICLES), handler)?;
    ctx.track(subscription);

    if format == OutputFormat::Text {
        println!("Watching article changes (Ctrl-C to stop)");
        if ctx.backend() == Backend::Mock {
            println!("Mock mode: only changes made by this process are visible");
        }
    }
    info!("Watching article changes");

    loop {
        tokio::select! {
            Some(event) = rx.recv() => print_event(ctx, &event, format)?,
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn kind_label(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Insert => "insert",
        ChangeKind::Update => "update",
        ChangeKind::Delete => "delete",
    }
}

fn print_event(ctx: &AppContext, event: &ChangeEvent, format: OutputFormat) -> Result<()> {
    let kind = kind_label(event.kind);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&json!({
                    "kind": kind,
                    "id": event.record_id(),
                    "record": event.new,
                }))?
            );
        }
        OutputFormat::Text => {
            let label = event
                .decode_new::<Article>()
                .map(|a| format!("{} ({})", a.title, a.slug))
                .or_else(|| event.record_id().map(str::to_string))
                .unwrap_or_else(|| "unknown record".to_string());
            let count = ctx.articles.snapshot().articles.len();
            println!("{:<7} {}", kind, label);
            output::print_row("In view", &count.to_string());
        }
    }
    Ok(())
}
