//! Download command implementation.

use anyhow::Result;

use cirrus_core::error::Error;
use cirrus_core::transfer::TransferOutcome;

use super::DownloadArgs;

/// Run the download command.
pub async fn run(args: DownloadArgs) -> Result<()> {
    let client = super::build_client()?;
    let engine = client.download_engine();

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("Interrupted. Re-run the same command to resume this download.");
            cancel.cancel();
        }
    });

    let progress_task = if args.quiet {
        None
    } else {
        Some(tokio::spawn(super::upload::render_progress(
            engine.progress(),
        )))
    };

    let outcome = engine.start_or_resume(&args.remote, &args.local).await;

    if let Some(task) = progress_task {
        task.abort();
        let _ = task.await;
        println!();
    }

    match outcome {
        Ok(TransferOutcome::Completed) => {
            println!("Downloaded {} to {}", args.remote, args.local.display());
            Ok(())
        }
        Ok(TransferOutcome::Interrupted) => {
            std::process::exit(130);
        }
        Err(Error::ReauthRequired(msg)) => anyhow::bail!("not signed in: {msg}"),
        Err(e) => Err(e.into()),
    }
}
