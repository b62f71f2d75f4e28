//! Upload command implementation.
//!
//! Ctrl-C is caught only around the chunk loop: the handler prints a
//! resumption hint and cancels cooperatively, leaving the session record
//! on disk so the next invocation resumes.

use anyhow::Result;

use cirrus_core::error::Error;
use cirrus_core::transfer::TransferOutcome;

use super::UploadArgs;

/// Run the upload command.
pub async fn run(args: UploadArgs) -> Result<()> {
    let client = super::build_client()?;
    let engine = client.upload_engine();

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("Interrupted. Re-run the same command to resume this upload.");
            cancel.cancel();
        }
    });

    let progress_task = if args.quiet {
        None
    } else {
        Some(tokio::spawn(render_progress(engine.progress())))
    };

    let outcome = engine.start_or_resume(&args.local, &args.remote).await;

    if let Some(task) = progress_task {
        task.abort();
        let _ = task.await;
        println!();
    }

    match outcome {
        Ok(TransferOutcome::Completed) => {
            println!("Uploaded {} to {}", args.local.display(), args.remote);
            Ok(())
        }
        Ok(TransferOutcome::Interrupted) => {
            // The hint is already on stderr; stop with a conventional
            // interrupted status instead of pretending success.
            std::process::exit(130);
        }
        Err(Error::ReauthRequired(msg)) => anyhow::bail!("not signed in: {msg}"),
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn render_progress(
    mut progress: tokio::sync::watch::Receiver<cirrus_core::transfer::TransferProgress>,
) {
    while progress.changed().await.is_ok() {
        let snapshot = *progress.borrow();
        if snapshot.total_bytes > 0 {
            crate::ui::draw_progress(
                snapshot.transferred_bytes,
                snapshot.total_bytes,
                snapshot.percentage(),
            );
        }
    }
}
