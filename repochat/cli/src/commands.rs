//! Subcommand implementations

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use repochat_core::{
    ChatError, ClientContext, ClientMessage, ConversationReconciler, RepoStatus,
    RepositoryListSync, RepositoryPoller, TurnOutcome, TurnStatus,
};

use crate::render;

/// Notification buffer between the core and the renderer
const NOTIFY_CAPACITY: usize = 256;

pub async fn ingest(
    ctx: &ClientContext,
    url: &str,
    branch: Option<&str>,
    watch: bool,
) -> Result<()> {
    let response = repochat_core::ingest::submit(ctx, url, branch)
        .await
        .context("Ingestion request failed")?;

    println!("{}  {}", response.repo_id, response.status);
    if let Some(ref message) = response.message {
        println!("{message}");
    }

    if watch {
        watch_status(ctx, &response.repo_id).await?;
    }
    Ok(())
}

pub async fn status(ctx: &ClientContext, repo_id: &str, watch: bool) -> Result<()> {
    if watch {
        watch_status(ctx, repo_id).await?;
        return Ok(());
    }

    let record = ctx
        .backend()
        .repository_status(repo_id)
        .await
        .with_context(|| format!("Failed to fetch status of {repo_id}"))?;
    println!("{}", render::record_line(&record));
    Ok(())
}

/// Poll until a terminal status or Ctrl-C, printing every record
async fn watch_status(ctx: &ClientContext, repo_id: &str) -> Result<Option<RepoStatus>> {
    let mut poller = RepositoryPoller::new(ctx.clone(), repo_id).start();
    let mut records = poller.subscribe();

    let terminal = loop {
        tokio::select! {
            biased;
            changed = records.changed() => {
                if changed.is_err() {
                    break None;
                }
                if let Some(record) = records.borrow_and_update().clone() {
                    println!("{}", render::record_line(&record));
                }
            }
            status = poller.finished() => break status,
            _ = tokio::signal::ctrl_c() => {
                info!(repo_id, "Interrupted; stopping status watch");
                break None;
            }
        }
    };

    poller.cancel();
    if terminal == Some(RepoStatus::Failed) {
        bail!("Ingestion of {repo_id} failed");
    }
    Ok(terminal)
}

pub async fn list(ctx: &ClientContext, watch: bool) -> Result<()> {
    let sync = RepositoryListSync::new(ctx.clone());

    if !watch {
        sync.refresh()
            .await
            .context("Failed to fetch repository list")?;
        render::print_repositories(sync.snapshot().repositories());
        return Ok(());
    }

    let handle = sync.start();
    let mut lists = sync.subscribe();
    loop {
        tokio::select! {
            changed = lists.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = lists.borrow_and_update().clone();
                println!();
                render::print_repositories(list.repositories());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping list refresh");
                break;
            }
        }
    }
    handle.cancel();
    Ok(())
}

pub async fn delete(ctx: &ClientContext, repo_id: &str) -> Result<()> {
    RepositoryListSync::new(ctx.clone())
        .delete(repo_id)
        .await
        .with_context(|| format!("Failed to delete {repo_id}"))?;
    println!("Deleted {repo_id}");
    Ok(())
}

pub async fn ask(ctx: ClientContext, repo_id: &str, message: &str, streaming: bool) -> Result<()> {
    let record = ctx
        .backend()
        .repository_status(repo_id)
        .await
        .with_context(|| format!("Failed to fetch status of {repo_id}"))?;

    let (tx, mut rx) = mpsc::channel(NOTIFY_CAPACITY);
    let chat = ConversationReconciler::with_record(ctx.with_notifier(tx), record);

    if let Some(outcome) = run_turn(&chat, &mut rx, message, streaming).await? {
        finish_turn(&chat, &outcome);
    }
    Ok(())
}

pub async fn chat(ctx: ClientContext, repo_id: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(NOTIFY_CAPACITY);
    let ctx = ctx.with_notifier(tx);

    let mut poller = RepositoryPoller::new(ctx.clone(), repo_id).start();
    let chat = ConversationReconciler::new(ctx, repo_id, poller.subscribe());

    eprintln!("Waiting for {repo_id} to finish ingestion...");
    // Updates that arrive while waiting are not part of any turn
    let terminal = loop {
        tokio::select! {
            biased;
            status = poller.finished() => break status,
            Some(_) = rx.recv() => {}
            _ = tokio::signal::ctrl_c() => break None,
        }
    };
    while rx.try_recv().is_ok() {}

    match terminal {
        Some(RepoStatus::Completed) => {}
        Some(status) => bail!("Repository {repo_id} is {status}; cannot chat"),
        None => return Ok(()),
    }

    eprintln!("Ready. Ask a question (Ctrl-D to quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match run_turn(&chat, &mut rx, &line, true).await {
            Ok(Some(outcome)) => finish_turn(&chat, &outcome),
            Ok(None) => eprintln!("(cancelled)"),
            Err(e) => eprintln!("{e}"),
        }
    }

    poller.cancel();
    Ok(())
}

/// Run one turn while rendering its updates; `None` if interrupted
async fn run_turn(
    chat: &ConversationReconciler,
    rx: &mut mpsc::Receiver<ClientMessage>,
    message: &str,
    streaming: bool,
) -> Result<Option<TurnOutcome>, ChatError> {
    let turn = async {
        if streaming {
            chat.send(message).await
        } else {
            chat.query(message).await
        }
    };
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            biased;
            Some(update) = rx.recv() => {
                render::render_turn_message(&update);
            }
            outcome = &mut turn => break Some(outcome?),
            _ = tokio::signal::ctrl_c() => break None,
        }
    };

    // Everything the turn sent is already queued
    while let Ok(update) = rx.try_recv() {
        render::render_turn_message(&update);
    }
    Ok(outcome)
}

/// Print references, or report a failed turn
fn finish_turn(chat: &ConversationReconciler, outcome: &TurnOutcome) {
    let history = chat.history();
    let answer = history.iter().find(|m| m.id == outcome.message_id);

    match outcome.status {
        TurnStatus::Completed => {
            if let Some(answer) = answer {
                render::print_references(&answer.code_references);
            }
            if outcome.malformed_frames > 0 {
                warn!(
                    skipped = outcome.malformed_frames,
                    "Some stream records could not be decoded"
                );
            }
        }
        TurnStatus::Failed(ref error) => {
            if let Some(answer) = answer {
                println!("{}", answer.content);
            }
            warn!(error = %error, "Chat turn failed");
        }
    }
}
